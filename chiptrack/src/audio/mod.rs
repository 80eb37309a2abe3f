use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::{Receiver, Sender};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::audio_api::{AudioCommand, PlaybackWindow, Transport};
use crate::playback::note::Note;
use crate::shared::NUM_CHANNELS;

mod analyser;
mod effect;
mod engine;
mod envelope;
mod frame;
mod param;
mod sample_buffer;
mod voice;
mod waves;

pub use analyser::{MeterSnapshot, FFT_SIZE};
pub use effect::Effect;
pub use engine::Renderer;
pub use frame::StereoFrame;
pub use waves::{Lfsr, WaveShape};

pub const LOOKAHEAD: f64 = 0.05; // fresh segments start this far ahead of the clock

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("no default output device")]
    NoDevice,
    #[error("no default output config: {0}")]
    Config(#[from] cpal::DefaultStreamConfigError),
    #[error("unsupported sample format {0:?} (only f32 is supported)")]
    UnsupportedFormat(cpal::SampleFormat),
    #[error("failed to build output stream: {0}")]
    Build(#[from] cpal::BuildStreamError),
    #[error("failed to play output stream: {0}")]
    Play(#[from] cpal::PlayStreamError),
}

// A live output stream. The render thread owns the Renderer; we only talk to
// it through the command channel and read its frame counter.
struct DeviceHandle {
    tx: Sender<AudioCommand>,
    meters_rx: Receiver<MeterSnapshot>,
    clock: Arc<AtomicU64>,
    sample_rate: u32,
    _stream: cpal::Stream,
}

enum Backend {
    Idle,
    Device(DeviceHandle),
    Offline(Box<Renderer>),
}

/// The synthesis engine as the rest of the app sees it. Starts lazily on the
/// first scheduled segment; a failed start leaves it idle and playback simply
/// doesn't begin.
pub struct AudioEngine {
    backend: Backend,
    bus_gains: [f32; NUM_CHANNELS], // replayed when the device comes up
    meters: MeterSnapshot,
}

impl Default for AudioEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioEngine {
    pub fn new() -> Self {
        Self {
            backend: Backend::Idle,
            bus_gains: [1.0; NUM_CHANNELS],
            meters: MeterSnapshot::default(),
        }
    }

    /// No device; time only moves when `render_offline` is called.
    pub fn offline(sample_rate: u32) -> Self {
        Self {
            backend: Backend::Offline(Box::new(Renderer::new(sample_rate))),
            ..Self::new()
        }
    }

    pub fn is_started(&self) -> bool {
        !matches!(self.backend, Backend::Idle)
    }

    pub fn sample_rate(&self) -> Option<u32> {
        match &self.backend {
            Backend::Idle => None,
            Backend::Device(d) => Some(d.sample_rate),
            Backend::Offline(r) => Some(r.sample_rate()),
        }
    }

    /// Open the default output device. A no-op once started.
    pub fn start(&mut self) -> Result<(), EngineError> {
        if self.is_started() {
            return Ok(());
        }
        let device = start_device()?;
        info!(sample_rate = device.sample_rate, "audio engine started");
        self.backend = Backend::Device(device);
        self.send(AudioCommand::SetBusGains(self.bus_gains));
        Ok(())
    }

    pub fn shutdown(&mut self) {
        if !self.is_started() {
            return;
        }
        self.send(AudioCommand::StopAll);
        self.backend = Backend::Idle;
        self.meters = MeterSnapshot::default();
        info!("audio engine shut down");
    }

    fn send(&mut self, cmd: AudioCommand) {
        match &mut self.backend {
            Backend::Idle => {}
            Backend::Device(d) => {
                if d.tx.try_send(cmd).is_err() {
                    warn!("audio command queue full, command dropped");
                }
            }
            Backend::Offline(r) => r.handle_cmd(cmd),
        }
    }

    /// Pull the latest meter snapshot from the render thread.
    pub fn poll_meters(&mut self) {
        match &self.backend {
            Backend::Device(d) => {
                if let Some(latest) = d.meters_rx.try_iter().last() {
                    self.meters = latest;
                }
            }
            Backend::Offline(r) => self.meters = r.meters(),
            Backend::Idle => {}
        }
    }

    pub fn analyser(&self) -> &MeterSnapshot {
        &self.meters
    }

    /// Advance an offline engine and hand back what it produced. Empty for a
    /// device-backed or idle engine.
    pub fn render_offline(&mut self, frames: usize) -> Vec<StereoFrame> {
        let Backend::Offline(r) = &mut self.backend else {
            return Vec::new();
        };
        let mut out = vec![StereoFrame::zero(); frames];
        for block in out.chunks_mut(512) {
            r.render_block(block);
        }
        out
    }
}

impl Transport for AudioEngine {
    fn current_time(&self) -> f64 {
        match &self.backend {
            Backend::Idle => 0.0,
            Backend::Device(d) => d.clock.load(Ordering::Relaxed) as f64 / d.sample_rate as f64,
            Backend::Offline(r) => r.current_time(),
        }
    }

    fn set_bus_gains(&mut self, gains: [f32; NUM_CHANNELS]) {
        self.bus_gains = gains;
        self.send(AudioCommand::SetBusGains(gains));
    }

    fn play_track(&mut self, notes: &[Note], logical_duration: f64, start_at: Option<f64>)
        -> Option<PlaybackWindow> {
        if let Err(e) = self.start() {
            error!(error = %e, "could not start audio engine");
            return None;
        }
        if start_at.is_none() {
            self.stop_all();
        }
        let start_time = start_at.unwrap_or(self.current_time() + LOOKAHEAD);
        self.send(AudioCommand::Schedule { notes: notes.to_vec(), start_time });
        Some(PlaybackWindow {
            start_time,
            end_time: start_time + logical_duration,
        })
    }

    fn stop_all(&mut self) {
        self.send(AudioCommand::StopAll);
    }
}

// ── Output stream ─────────────────────────────────────────────────

fn start_device() -> Result<DeviceHandle, EngineError> {
    let host = cpal::default_host();
    let device = host.default_output_device().ok_or(EngineError::NoDevice)?;
    let config = device.default_output_config()?;

    let sample_format = config.sample_format();
    if sample_format != cpal::SampleFormat::F32 {
        return Err(EngineError::UnsupportedFormat(sample_format));
    }
    let sample_rate = config.sample_rate().0;
    let channels = config.channels() as usize;

    let (tx, rx) = crossbeam_channel::bounded::<AudioCommand>(1024);
    let (meters_tx, meters_rx) = crossbeam_channel::bounded::<MeterSnapshot>(8);
    let clock = Arc::new(AtomicU64::new(0));

    let stream = build_output_stream_f32(&device, &config.into(), rx, meters_tx, Arc::clone(&clock), channels)?;
    stream.play()?;

    Ok(DeviceHandle {
        tx,
        meters_rx,
        clock,
        sample_rate,
        _stream: stream,
    })
}

fn build_output_stream_f32(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    rx: Receiver<AudioCommand>,
    meters_tx: Sender<MeterSnapshot>,
    clock: Arc<AtomicU64>,
    channels: usize,
) -> Result<cpal::Stream, EngineError> {
    let mut renderer = Renderer::new(config.sample_rate.0);
    let mut scratch: Vec<StereoFrame> = Vec::new();

    let err_fn = |err| error!(%err, "audio output stream error");

    let stream = device.build_output_stream(
        config,
        move |data: &mut [f32], _info: &cpal::OutputCallbackInfo| {
            while let Ok(cmd) = rx.try_recv() {
                renderer.handle_cmd(cmd);
            }

            let n_frames = data.len() / channels.max(1);
            scratch.clear();
            scratch.resize(n_frames, StereoFrame::zero());
            renderer.render_block(&mut scratch);

            // interleave; mono devices get the downmix, extra channels stay silent
            for (out, f) in data.chunks_exact_mut(channels.max(1)).zip(&scratch) {
                match out {
                    [mono] => *mono = f.downmix(),
                    [l, r, rest @ ..] => {
                        *l = f.left;
                        *r = f.right;
                        rest.fill(0.0);
                    }
                    [] => {}
                }
            }

            clock.store(renderer.frames_rendered(), Ordering::Relaxed);
            let _ = meters_tx.try_send(renderer.meters());
        },
        err_fn,
        None,
    )?;

    Ok(stream)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peak(frames: &[StereoFrame]) -> f32 {
        frames.iter().map(|f| f.peak()).fold(0.0, f32::max)
    }

    #[test]
    fn idle_engine_reports_zero_time() {
        let engine = AudioEngine::new();
        assert!(!engine.is_started());
        assert_eq!(engine.current_time(), 0.0);
        assert_eq!(engine.sample_rate(), None);
    }

    #[test]
    fn fresh_segments_start_after_the_lookahead() {
        let mut engine = AudioEngine::offline(8000);
        engine.render_offline(800);
        let window = engine.play_track(&[], 2.0, None).unwrap();
        assert!((window.start_time - 0.15).abs() < 1e-9);
        assert!((window.end_time - 2.15).abs() < 1e-9);
    }

    #[test]
    fn chained_segments_start_where_asked() {
        let mut engine = AudioEngine::offline(8000);
        let first = engine.play_track(&[Note::simple(1, 440.0, 0.0, 0.5)], 1.0, None).unwrap();
        let next = engine.play_track(&[Note::simple(1, 440.0, 0.0, 0.5)], 1.0, Some(first.end_time)).unwrap();
        assert_eq!(next.start_time, first.end_time);
    }

    #[test]
    fn offline_render_plays_and_stops() {
        let mut engine = AudioEngine::offline(8000);
        engine.play_track(&[Note::simple(2, 330.0, 0.0, 1.0)], 1.0, None);
        let playing = engine.render_offline(4000);
        assert!(peak(&playing) > 0.05);

        engine.stop_all();
        engine.render_offline(2000);
        let after = engine.render_offline(2000);
        assert!(peak(&after) < 1e-4);

        engine.poll_meters();
        assert!(engine.analyser().master_level < 1e-3);
    }

    #[test]
    fn restarting_a_segment_replaces_the_old_one() {
        let mut engine = AudioEngine::offline(8000);
        engine.play_track(&[Note::simple(1, 440.0, 0.0, 5.0)], 5.0, None);
        engine.render_offline(4000);
        engine.play_track(&[], 1.0, None);
        engine.render_offline(2000);
        let after = engine.render_offline(2000);
        assert!(peak(&after) < 1e-4);
    }

    #[test]
    fn shutdown_returns_to_idle() {
        let mut engine = AudioEngine::offline(8000);
        engine.shutdown();
        assert!(!engine.is_started());
        assert!(engine.render_offline(10).is_empty());
    }
}
