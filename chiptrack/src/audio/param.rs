// Sample-clock automation for gains and tuning.
//
// A param is a default value plus a time-ordered list of events. Ramps run from
// the previous event's (time, value) to their own; a target event approaches
// its target exponentially until the next event takes over.

#[derive(Clone, Copy, Debug, PartialEq)]
enum Event {
    Set { time: f64, value: f32 },
    Linear { time: f64, value: f32 },
    Exponential { time: f64, value: f32 },
    Target { time: f64, target: f32, tau: f64 },
}

impl Event {
    fn time(&self) -> f64 {
        match *self {
            Event::Set { time, .. }
            | Event::Linear { time, .. }
            | Event::Exponential { time, .. }
            | Event::Target { time, .. } => time,
        }
    }
}

#[derive(Clone, Debug)]
pub struct AudioParam {
    default: f32,
    events: Vec<Event>,
}

impl AudioParam {
    pub fn new(default: f32) -> Self {
        Self {
            default,
            events: Vec::new(),
        }
    }

    // events at the same time keep insertion order
    fn insert(&mut self, event: Event) {
        let at = self.events.partition_point(|e| e.time() <= event.time());
        self.events.insert(at, event);
    }

    pub fn set_value_at(&mut self, value: f32, time: f64) {
        self.insert(Event::Set { time, value });
    }

    pub fn linear_ramp_to(&mut self, value: f32, time: f64) {
        self.insert(Event::Linear { time, value });
    }

    pub fn exponential_ramp_to(&mut self, value: f32, time: f64) {
        self.insert(Event::Exponential { time, value });
    }

    pub fn set_target_at(&mut self, target: f32, time: f64, tau: f64) {
        self.insert(Event::Target { time, target, tau });
    }

    /// Drop everything from `time` on and pin the value the param has there,
    /// so a following ramp or target starts without a jump.
    pub fn cancel_and_hold(&mut self, time: f64) {
        let held = self.value_at(time);
        self.events.clear();
        self.events.push(Event::Set { time, value: held });
    }

    pub fn event_count(&self) -> usize {
        self.events.len()
    }

    pub fn value_at(&self, t: f64) -> f32 {
        let mut value = self.default;
        let mut since = 0.0;

        for (i, event) in self.events.iter().enumerate() {
            match *event {
                Event::Set { time, value: v } => {
                    if time > t {
                        break;
                    }
                    value = v;
                    since = time;
                }
                Event::Linear { time, value: v } => {
                    if time > t {
                        let frac = progress(since, time, t);
                        return value + (v - value) * frac;
                    }
                    value = v;
                    since = time;
                }
                Event::Exponential { time, value: v } => {
                    if time > t {
                        // no exponential path through zero or across signs
                        if value == 0.0 || v == 0.0 || value.signum() != v.signum() {
                            return value;
                        }
                        let frac = progress(since, time, t);
                        return value * (v / value).powf(frac);
                    }
                    value = v;
                    since = time;
                }
                Event::Target { time, target, tau } => {
                    if time > t {
                        break;
                    }
                    match self.events.get(i + 1).map(Event::time) {
                        Some(next) if next <= t => {
                            value = approach(value, target, tau, next - time);
                            since = next;
                        }
                        _ => return approach(value, target, tau, t - time),
                    }
                }
            }
        }
        value
    }
}

fn progress(from: f64, to: f64, t: f64) -> f32 {
    let span = to - from;
    if span <= 0.0 {
        return 1.0;
    }
    ((t - from) / span).clamp(0.0, 1.0) as f32
}

fn approach(from: f32, target: f32, tau: f64, elapsed: f64) -> f32 {
    if tau <= 0.0 {
        return target;
    }
    target + (from - target) * (-elapsed.max(0.0) / tau).exp() as f32
}
