use tracing::debug;

use super::analyser::{Analyser, MeterSnapshot};
use super::effect::{AmbienceDelay, Compressor, CompressorSettings, Effect};
use super::frame::StereoFrame;
use super::param::AudioParam;
use super::voice::Voice;
use super::waves::WaveBank;
use crate::audio_api::AudioCommand;
use crate::shared::NUM_CHANNELS;

pub const MASTER_GAIN: f32 = 0.5;
pub const BUS_SMOOTHING: f64 = 0.02;
const VOICE_CAPACITY: usize = 512; // initial pool; grows with the batch

// gain -> analyser -> master
struct Bus {
    gain: AudioParam,
    analyser: Analyser,
    scratch: Vec<StereoFrame>,
}

impl Bus {
    fn new() -> Self {
        Self {
            gain: AudioParam::new(1.0),
            analyser: Analyser::default(),
            scratch: Vec::new(),
        }
    }
}

/// The render side of the engine: owns the clock, every live voice, the four
/// channel buses and the master chain. Runs inside the device callback, or
/// directly when rendering offline.
pub struct Renderer {
    sample_rate: u32,
    frames_rendered: u64,
    bank: WaveBank,
    voices: Vec<Voice>,
    buses: [Bus; NUM_CHANNELS],
    delay: AmbienceDelay,
    compressor: Compressor,
    master_analyser: Analyser,
}

impl Renderer {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            frames_rendered: 0,
            bank: WaveBank::new(sample_rate),
            voices: Vec::with_capacity(VOICE_CAPACITY),
            buses: std::array::from_fn(|_| Bus::new()),
            delay: AmbienceDelay::new(sample_rate),
            compressor: Compressor::new(CompressorSettings::default(), sample_rate),
            master_analyser: Analyser::default(),
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered
    }

    pub fn current_time(&self) -> f64 {
        self.frames_rendered as f64 / self.sample_rate as f64
    }

    pub fn active_voices(&self) -> usize {
        self.voices.len()
    }

    pub fn handle_cmd(&mut self, cmd: AudioCommand) {
        let now = self.current_time();
        match cmd {
            AudioCommand::Schedule { notes, start_time } => {
                debug!(notes = notes.len(), live = self.voices.len(), "segment scheduled");
                self.voices.reserve(notes.len());
                self.voices
                    .extend(notes.iter().map(|note| Voice::from_note(note, start_time + note.time, &self.bank)));
            }
            AudioCommand::SetBusGains(gains) => {
                for (bus, gain) in self.buses.iter_mut().zip(gains) {
                    bus.gain.cancel_and_hold(now);
                    bus.gain.set_target_at(gain, now, BUS_SMOOTHING);
                }
            }
            AudioCommand::StopAll => {
                for voice in &mut self.voices {
                    voice.stop_at(now);
                }
            }
        }
    }

    pub fn bus_gain_at(&self, ch: u8, t: f64) -> Option<f32> {
        let bus = self.buses.get((ch as usize).checked_sub(1)?)?;
        Some(bus.gain.value_at(t))
    }

    pub fn meters(&self) -> MeterSnapshot {
        MeterSnapshot {
            bus_levels: std::array::from_fn(|i| self.buses[i].analyser.rms()),
            master_level: self.master_analyser.rms(),
            master_waveform: self.master_analyser.waveform(),
        }
    }

    pub fn render_block(&mut self, out: &mut [StereoFrame]) {
        let n = out.len();
        let t0 = self.current_time();
        let sr = self.sample_rate as f64;

        for bus in &mut self.buses {
            bus.scratch.clear();
            bus.scratch.resize(n, StereoFrame::zero());
        }

        for voice in &mut self.voices {
            let Some(bus) = (voice.channel as usize)
                .checked_sub(1)
                .and_then(|i| self.buses.get_mut(i))
            else {
                continue;
            };
            voice.render_into(&mut bus.scratch, t0, sr);
        }
        self.voices.retain(Voice::is_active);

        out.fill(StereoFrame::zero());
        for bus in &mut self.buses {
            let g0 = bus.gain.value_at(t0);
            let g1 = bus.gain.value_at(t0 + n as f64 / sr);
            for (i, f) in bus.scratch.iter_mut().enumerate() {
                *f = *f * (g0 + (g1 - g0) * i as f32 / n as f32);
            }
            bus.analyser.push(&bus.scratch);
            for (o, f) in out.iter_mut().zip(&bus.scratch) {
                *o += *f * MASTER_GAIN;
            }
        }

        self.delay.process(out);
        self.compressor.process(out);
        self.master_analyser.push(out);

        self.frames_rendered += n as u64;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playback::note::Note;

    const SR: u32 = 8000;

    fn render(r: &mut Renderer, seconds: f64) -> Vec<StereoFrame> {
        let mut out = vec![StereoFrame::zero(); (seconds * SR as f64) as usize];
        for block in out.chunks_mut(256) {
            r.render_block(block);
        }
        out
    }

    fn peak(frames: &[StereoFrame]) -> f32 {
        frames.iter().map(|f| f.peak()).fold(0.0, f32::max)
    }

    #[test]
    fn clock_advances_with_rendering() {
        let mut r = Renderer::new(SR);
        render(&mut r, 0.5);
        assert_eq!(r.frames_rendered(), 4000);
        assert_eq!(r.current_time(), 0.5);
    }

    #[test]
    fn scheduled_notes_sound_at_their_time() {
        let mut r = Renderer::new(SR);
        r.handle_cmd(AudioCommand::Schedule {
            notes: vec![Note::simple(1, 440.0, 0.1, 0.2)],
            start_time: 0.1,
        });
        let out = render(&mut r, 0.6);
        assert_eq!(peak(&out[..1600]), 0.0);
        assert!(peak(&out[1700..3000]) > 0.05);
        assert_eq!(r.active_voices(), 0);
    }

    #[test]
    fn large_batches_schedule_every_note() {
        let mut r = Renderer::new(SR);
        let notes: Vec<Note> = (0..600).map(|i| Note::simple(1 + (i % 4) as u8, 440.0, i as f64 * 0.01, 0.05)).collect();
        r.handle_cmd(AudioCommand::Schedule { notes, start_time: 0.0 });
        assert_eq!(r.active_voices(), 600);
    }

    #[test]
    fn bus_gains_glide_instead_of_jumping() {
        let mut r = Renderer::new(SR);
        r.handle_cmd(AudioCommand::SetBusGains([0.0, 1.0, 1.0, 1.0]));
        let g = r.bus_gain_at(1, 0.02).unwrap();
        assert!(g > 0.3 && g < 0.4);
        assert!(r.bus_gain_at(1, 0.2).unwrap() < 1e-3);
        assert_eq!(r.bus_gain_at(2, 0.2), Some(1.0));
        assert_eq!(r.bus_gain_at(5, 0.0), None);
    }

    #[test]
    fn muted_bus_is_silent() {
        let mut r = Renderer::new(SR);
        r.handle_cmd(AudioCommand::SetBusGains([0.0; 4]));
        render(&mut r, 0.2);
        r.handle_cmd(AudioCommand::Schedule {
            notes: vec![Note::simple(2, 440.0, 0.0, 0.3)],
            start_time: 0.25,
        });
        let out = render(&mut r, 0.4);
        assert!(peak(&out) < 1e-4);
    }

    #[test]
    fn stop_all_silences_quickly() {
        let mut r = Renderer::new(SR);
        r.handle_cmd(AudioCommand::Schedule {
            notes: vec![Note::simple(3, 220.0, 0.0, 2.0), Note::simple(4, 1000.0, 1.0, 1.0)],
            start_time: 0.0,
        });
        render(&mut r, 0.5);
        r.handle_cmd(AudioCommand::StopAll);
        render(&mut r, 0.05);
        assert_eq!(r.active_voices(), 0);
        // only the delay tail is left
        let after = render(&mut r, 0.5);
        assert!(peak(&after[1000..]) < 1e-4);
    }

    #[test]
    fn meters_follow_the_buses() {
        let mut r = Renderer::new(SR);
        r.handle_cmd(AudioCommand::Schedule {
            notes: vec![Note::simple(1, 440.0, 0.0, 1.0)],
            start_time: 0.0,
        });
        render(&mut r, 0.3);
        let meters = r.meters();
        assert!(meters.bus_levels[0] > 0.05);
        assert_eq!(meters.bus_levels[1], 0.0);
        assert!(meters.master_level > 0.0);
    }
}
