use crate::playback::note::Note;
use crate::shared::NUM_CHANNELS;

/// Absolute clock times (seconds) of one scheduled segment.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PlaybackWindow {
    pub start_time: f64,
    pub end_time: f64,
}

// Everything the UI side sends into the render thread goes through here.
// `start_time` is absolute on the engine clock; note times are relative to it.
#[derive(Clone, Debug)]
pub enum AudioCommand {
    Schedule { notes: Vec<Note>, start_time: f64 },
    SetBusGains([f32; NUM_CHANNELS]),
    StopAll, // fades from whatever the render clock says is now
}

/// What the scheduler needs from an audio backend. The real engine and the
/// test fakes both implement it.
pub trait Transport {
    /// The backend clock in seconds. Zero before the engine has started.
    fn current_time(&self) -> f64;

    /// Already-resolved mixer gains, one per channel bus.
    fn set_bus_gains(&mut self, gains: [f32; NUM_CHANNELS]);

    /// Schedule a complete segment. Without `start_at` any current playback is
    /// stopped first and the segment starts after a short lookahead; with it
    /// the segment chains onto whatever is already scheduled.
    ///
    /// None when the backend couldn't start.
    fn play_track(&mut self, notes: &[Note], logical_duration: f64, start_at: Option<f64>)
        -> Option<PlaybackWindow>;

    /// Fade out and drop every scheduled or sounding voice. Idempotent.
    fn stop_all(&mut self);
}
