use super::frame::StereoFrame;

// Fixed master-bus processing. Nothing here is user-facing; the chain is
// delay send -> compressor, always on.
pub trait Effect: Send {
    fn process(&mut self, buf: &mut [StereoFrame]);
}

pub const DELAY_TIME: f64 = 0.12;
pub const DELAY_SEND: f32 = 0.15;

/// Feed-forward slapback: each frame gets a quiet copy of the input from
/// `DELAY_TIME` ago. The echo never re-enters the line.
pub struct AmbienceDelay {
    line: Vec<StereoFrame>,
    pos: usize,
    send: f32,
}

impl AmbienceDelay {
    pub fn new(sample_rate: u32) -> Self {
        let len = ((sample_rate as f64 * DELAY_TIME).round() as usize).max(1);
        Self {
            line: vec![StereoFrame::zero(); len],
            pos: 0,
            send: DELAY_SEND,
        }
    }
}

impl Effect for AmbienceDelay {
    fn process(&mut self, buf: &mut [StereoFrame]) {
        for f in buf.iter_mut() {
            let echo = self.line[self.pos];
            self.line[self.pos] = *f;
            self.pos = (self.pos + 1) % self.line.len();
            *f += echo * self.send;
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct CompressorSettings {
    pub threshold_db: f32,
    pub knee_db: f32,
    pub ratio: f32,
    pub attack: f32,  // seconds
    pub release: f32, // seconds
}

impl Default for CompressorSettings {
    fn default() -> Self {
        Self {
            threshold_db: -12.0,
            knee_db: 12.0,
            ratio: 12.0,
            attack: 0.002,
            release: 0.05,
        }
    }
}

impl CompressorSettings {
    /// Static curve: output level in dB for an input level in dB (soft knee).
    pub fn curve(&self, x: f32) -> f32 {
        let t = self.threshold_db;
        let half = self.knee_db * 0.5;
        if x < t - half {
            x
        } else if x <= t + half && self.knee_db > 0.0 {
            let over = x - t + half;
            x + (1.0 / self.ratio - 1.0) * over * over / (2.0 * self.knee_db)
        } else {
            t + (x - t) / self.ratio
        }
    }

    // browsers add back part of the full-scale reduction; so do we
    fn makeup_db(&self) -> f32 {
        -self.curve(0.0) * 0.6
    }
}

/// Peak compressor with a linked stereo detector.
pub struct Compressor {
    settings: CompressorSettings,
    attack_coef: f32,
    release_coef: f32,
    reduction_db: f32, // current smoothed gain change, <= 0
    makeup: f32,
}

impl Compressor {
    pub fn new(settings: CompressorSettings, sample_rate: u32) -> Self {
        let coef = |secs: f32| (-1.0 / (secs.max(1e-4) * sample_rate as f32)).exp();
        Self {
            attack_coef: coef(settings.attack),
            release_coef: coef(settings.release),
            reduction_db: 0.0,
            makeup: db_to_gain(settings.makeup_db()),
            settings,
        }
    }

    pub fn reduction_db(&self) -> f32 {
        self.reduction_db
    }
}

impl Effect for Compressor {
    fn process(&mut self, buf: &mut [StereoFrame]) {
        for f in buf.iter_mut() {
            let level = gain_to_db(f.peak());
            let wanted = self.settings.curve(level) - level;
            let coef = if wanted < self.reduction_db {
                self.attack_coef
            } else {
                self.release_coef
            };
            self.reduction_db = wanted + (self.reduction_db - wanted) * coef;
            *f = *f * (db_to_gain(self.reduction_db) * self.makeup);
        }
    }
}

fn gain_to_db(g: f32) -> f32 {
    20.0 * g.max(1e-6).log10()
}

fn db_to_gain(db: f32) -> f32 {
    10f32.powf(db / 20.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn curve_is_transparent_below_the_knee() {
        let s = CompressorSettings::default();
        assert_eq!(s.curve(-40.0), -40.0);
        assert!((s.curve(0.0) - (-11.0)).abs() < 1e-5);
        assert!(s.curve(-12.0) < -12.0);
    }

    #[test]
    fn loud_input_is_pulled_down() {
        let mut comp = Compressor::new(CompressorSettings::default(), 8000);
        let mut buf = vec![StereoFrame::mono(1.0); 800];
        comp.process(&mut buf);
        assert!(comp.reduction_db() < -8.0);
        assert!(buf[799].left < 1.0);
    }

    #[test]
    fn quiet_input_only_gets_makeup() {
        let mut comp = Compressor::new(CompressorSettings::default(), 8000);
        let mut buf = vec![StereoFrame::mono(0.01); 100];
        comp.process(&mut buf);
        assert_eq!(comp.reduction_db(), 0.0);
        assert!(buf[99].left > 0.01);
    }

    #[test]
    fn delay_echoes_after_120ms() {
        let mut delay = AmbienceDelay::new(1000);
        let mut buf = vec![StereoFrame::zero(); 300];
        buf[0] = StereoFrame::mono(1.0);
        delay.process(&mut buf);
        assert_eq!(buf[0].left, 1.0);
        assert_eq!(buf[120].left, DELAY_SEND);
        // no feedback: the echo doesn't echo
        assert_eq!(buf[240].left, 0.0);
    }
}
