use std::sync::Arc;

use super::envelope::apply_hardware_envelope;
use super::frame::StereoFrame;
use super::param::AudioParam;
use super::sample_buffer::SampleBuffer;
use super::waves::{PulseWave, WaveBank, WaveShape, NOISE_BASE_HZ};
use crate::playback::note::Note;
use crate::shared::{NOISE_CHANNEL, WAVE_CHANNEL};

pub const ARP_STEP: f64 = 0.03;
pub const VIBRATO_HZ: f64 = 6.0;
const VIBRATO_SCALE: f64 = 3.0;
pub const TAIL: f64 = 0.1; // sources keep running past the note so the release finishes
pub const STOP_FADE: f64 = 0.01;
pub const STOP_CUT: f64 = 0.02;
const CONTROL_FRAMES: usize = 32; // automation is evaluated at this granularity

pub fn default_pan(channel: u8) -> f32 {
    match channel {
        1 => -0.2,
        2 => 0.2,
        _ => 0.0,
    }
}

#[derive(Clone, Debug)]
enum Source {
    Pulse { wave: Arc<PulseWave>, phase: f64 },
    // pitch is the playback rate relative to the buffer's base frequency
    Buffer { buffer: Arc<SampleBuffer>, pos: f64 },
}

#[derive(Clone, Copy, Debug)]
struct Vibrato {
    depth: f64,
    start: f64,
    stop: f64,
}

/// One scheduled note on one channel bus.
#[derive(Clone, Debug)]
pub struct Voice {
    pub channel: u8,
    source: Source,
    tuning: AudioParam, // Hz for pulses, playback rate for buffers
    vibrato: Option<Vibrato>,
    gain: AudioParam,
    pan: StereoFrame, // per-side gains
    start: f64,
    stop: f64,
    active: bool,
}

impl Voice {
    pub fn from_note(note: &Note, start: f64, bank: &WaveBank) -> Self {
        let (source, base_hz) = match note.channel {
            NOISE_CHANNEL => (
                Source::Buffer { buffer: bank.noise(note.duty_cycle), pos: 0.0 },
                Some(NOISE_BASE_HZ),
            ),
            WAVE_CHANNEL => (
                Source::Buffer {
                    buffer: bank.wave_ram(WaveShape::for_duty(note.duty_cycle)),
                    pos: 0.0,
                },
                Some(bank.wave_base_hz()),
            ),
            _ => (Source::Pulse { wave: bank.pulse(note.duty_cycle), phase: 0.0 }, None),
        };
        let tuned = |hz: f64| match base_hz {
            Some(base) => (hz / base) as f32,
            None => hz as f32,
        };

        let mut tuning = AudioParam::new(tuned(note.frequency));
        tuning.set_value_at(tuned(note.frequency), start);

        if let Some(offsets) = note.arpeggio.as_ref().filter(|o| !o.is_empty()) {
            let steps = (note.duration / ARP_STEP).ceil() as usize;
            for i in 0..steps {
                let semis = offsets[i % offsets.len()] as f64;
                let hz = note.frequency * 2f64.powf(semis / 12.0);
                tuning.set_value_at(tuned(hz), start + i as f64 * ARP_STEP);
            }
        }
        if let Some(target) = note.slide {
            tuning.exponential_ramp_to(tuned(target), start + note.duration);
        }

        let vibrato = note.vibrato.map(|amount| Vibrato {
            depth: amount as f64 * VIBRATO_SCALE / base_hz.unwrap_or(1.0),
            start,
            stop: start + note.duration,
        });

        let mut gain = AudioParam::new(0.0);
        apply_hardware_envelope(
            &mut gain,
            note.volume,
            note.decay,
            start,
            note.duration,
            note.channel == NOISE_CHANNEL,
        );

        Self {
            channel: note.channel,
            source,
            tuning,
            vibrato,
            gain,
            pan: StereoFrame::panned(1.0, note.panning.unwrap_or(default_pan(note.channel))),
            start,
            stop: start + note.duration + TAIL,
            active: true,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn start_time(&self) -> f64 {
        self.start
    }

    pub fn stop_time(&self) -> f64 {
        self.stop
    }

    pub fn tuning_at(&self, t: f64) -> f32 {
        self.tuning.value_at(t)
    }

    pub fn gain_at(&self, t: f64) -> f32 {
        self.gain.value_at(t)
    }

    /// Fade out from `now` and cut shortly after. Voices that haven't started
    /// yet never sound.
    pub fn stop_at(&mut self, now: f64) {
        self.gain.cancel_and_hold(now);
        self.gain.set_target_at(0.0, now, STOP_FADE);
        self.stop = self.stop.min(now + STOP_CUT);
    }

    // tuning plus the vibrato LFO at time t
    fn pitch_at(&self, base: f32, t: f64) -> f64 {
        let mut value = base as f64;
        if let Some(v) = self.vibrato {
            if t >= v.start && t < v.stop {
                value += v.depth * (std::f64::consts::TAU * VIBRATO_HZ * (t - v.start)).sin();
            }
        }
        value
    }

    /// Mix this voice into `out`, whose first frame sits at `t0` seconds.
    pub fn render_into(&mut self, out: &mut [StereoFrame], t0: f64, sample_rate: f64) {
        if !self.active {
            return;
        }
        let dt = 1.0 / sample_rate;

        for (c, chunk) in out.chunks_mut(CONTROL_FRAMES).enumerate() {
            let chunk_t = t0 + (c * CONTROL_FRAMES) as f64 * dt;
            if chunk_t >= self.stop {
                self.active = false;
                return;
            }
            let chunk_end = chunk_t + chunk.len() as f64 * dt;
            if chunk_end <= self.start {
                continue;
            }

            let g0 = self.gain.value_at(chunk_t);
            let g1 = self.gain.value_at(chunk_end);
            let tune = self.tuning.value_at(chunk_t);
            let n = chunk.len() as f32;

            for (i, frame) in chunk.iter_mut().enumerate() {
                let t = chunk_t + i as f64 * dt;
                if t < self.start {
                    continue;
                }
                if t >= self.stop {
                    self.active = false;
                    return;
                }
                let rate = self.pitch_at(tune, t);
                let s = match &mut self.source {
                    Source::Pulse { wave, phase } => {
                        let s = wave.sample(*phase);
                        *phase = (*phase + rate * dt).rem_euclid(1.0);
                        s
                    }
                    Source::Buffer { buffer, pos } => {
                        let s = buffer.sample_looped(*pos);
                        *pos = buffer.advance(*pos, rate);
                        s
                    }
                };
                let g = g0 + (g1 - g0) * (i as f32 / n);
                *frame += self.pan * (s * g);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::project::DutyCycle;

    const SR: u32 = 8000;

    fn render(voice: &mut Voice, seconds: f64) -> Vec<StereoFrame> {
        let mut out = vec![StereoFrame::zero(); (seconds * SR as f64) as usize];
        voice.render_into(&mut out, 0.0, SR as f64);
        out
    }

    fn energy(frames: &[StereoFrame]) -> f32 {
        frames.iter().map(|f| f.peak()).fold(0.0, f32::max)
    }

    #[test]
    fn silent_before_start_and_after_stop() {
        let bank = WaveBank::new(SR);
        let note = Note::simple(1, 440.0, 0.0, 0.2);
        let mut voice = Voice::from_note(&note, 0.1, &bank);
        let out = render(&mut voice, 0.5);
        let sr = SR as usize;
        assert_eq!(energy(&out[..sr / 10]), 0.0);
        assert!(energy(&out[sr / 10 + 100..sr * 3 / 10]) > 0.1);
        assert_eq!(energy(&out[sr * 41 / 100..]), 0.0);
        assert!(!voice.is_active());
    }

    #[test]
    fn buffer_channels_tune_by_playback_rate() {
        let bank = WaveBank::new(SR);
        let wave = Voice::from_note(&Note::simple(3, 500.0, 0.0, 0.5), 0.0, &bank);
        assert!((wave.tuning_at(0.1) - 2.0).abs() < 1e-6); // 8000 / 32 = 250 Hz base
        let noise = Voice::from_note(&Note::simple(4, 1000.0, 0.0, 0.5), 0.0, &bank);
        assert!((noise.tuning_at(0.1) - 2.0).abs() < 1e-6);
    }

    #[test]
    fn arpeggio_cycles_every_thirty_ms() {
        let bank = WaveBank::new(SR);
        let mut note = Note::simple(1, 440.0, 0.0, 0.2);
        note.arpeggio = Some(vec![0, 12]);
        let voice = Voice::from_note(&note, 1.0, &bank);
        assert_eq!(voice.tuning_at(1.01), 440.0);
        assert_eq!(voice.tuning_at(1.04), 880.0);
        assert_eq!(voice.tuning_at(1.07), 440.0);
    }

    #[test]
    fn slide_ramps_to_the_target_over_the_note() {
        let bank = WaveBank::new(SR);
        let mut note = Note::simple(2, 220.0, 0.0, 1.0);
        note.slide = Some(880.0);
        let voice = Voice::from_note(&note, 0.0, &bank);
        assert!((voice.tuning_at(0.5) - 440.0).abs() < 0.01);
        assert_eq!(voice.tuning_at(1.0), 880.0);
    }

    #[test]
    fn stop_fades_and_cuts() {
        let bank = WaveBank::new(SR);
        let mut voice = Voice::from_note(&Note::simple(1, 440.0, 0.0, 2.0), 0.0, &bank);
        voice.stop_at(0.5);
        assert!(voice.gain_at(0.5) > 0.5);
        assert!(voice.gain_at(0.55) < 0.01);
        assert!((voice.stop_time() - 0.52).abs() < 1e-9);
    }

    #[test]
    fn stopping_before_the_start_never_sounds() {
        let bank = WaveBank::new(SR);
        let mut voice = Voice::from_note(&Note::simple(4, 1000.0, 0.0, 0.3), 1.0, &bank);
        voice.stop_at(0.2);
        let out = render(&mut voice, 1.5);
        assert_eq!(energy(&out), 0.0);
    }

    #[test]
    fn default_pans_spread_the_pulses() {
        let bank = WaveBank::new(SR);
        let left = Voice::from_note(&Note::simple(1, 440.0, 0.0, 0.1), 0.0, &bank);
        assert!(left.pan.left > left.pan.right);
        let mut centered = Note::simple(2, 440.0, 0.0, 0.1);
        centered.panning = Some(0.0);
        let centered = Voice::from_note(&centered, 0.0, &bank);
        assert!((centered.pan.left - centered.pan.right).abs() < 1e-6);
        let metal = Note { duty_cycle: DutyCycle::Eighth, ..Note::simple(4, 1000.0, 0.0, 0.1) };
        assert_eq!(Voice::from_note(&metal, 0.0, &bank).pan, StereoFrame::panned(1.0, 0.0));
    }
}
