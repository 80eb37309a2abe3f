use tracing::{debug, info, warn};

use super::note::{row_to_note, Note};
use crate::audio_api::{PlaybackWindow, Transport};
use crate::pipeline::mixer::MixerState;
use crate::pipeline::project::ProjectState;
use crate::shared::{StepRange, CHANNELS, STEPS_PER_PATTERN};

// A segment counts as finished this long before its scheduled end, so the next
// loop pass is queued while the current one is still sounding.
pub const LOOP_EPSILON: f64 = 0.05;

pub fn step_duration(bpm: f64) -> f64 {
    60.0 / bpm / 4.0
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PlaybackMode {
    #[default]
    Song,
    Pattern,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlaybackTarget {
    Song { start_idx: usize },
    Pattern,
    Selection { range: StepRange },
}

// What is currently scheduled on the transport
#[derive(Clone, Copy, Debug)]
struct Segment {
    target: PlaybackTarget,
    window: PlaybackWindow,
    step_duration: f64,
}

/// Collect every note of the given patterns, laid end to end.
///
/// A row lasts until the next row on its channel (looking at the whole pattern,
/// not just the range) or to the end of the pattern. Returns the notes and the
/// logical length of the segment in seconds.
pub fn build_track(
    project: &ProjectState,
    mixer: &MixerState,
    pattern_ids: &[String],
    range: Option<StepRange>,
    step_dur: f64,
) -> (Vec<Note>, f64) {
    let range = range.unwrap_or(StepRange::new(0, (STEPS_PER_PATTERN - 1) as u8));
    let mut notes = Vec::new();
    let mut logical = 0.0;

    for pattern in pattern_ids.iter().filter_map(|id| project.pattern(id)) {
        for ch in CHANNELS {
            let mut rows: Vec<_> = pattern.channels.get(ch).iter().collect();
            rows.sort_by_key(|r| r.step);

            for (i, row) in rows.iter().enumerate() {
                if !range.contains(row.step) {
                    continue;
                }
                let steps = match rows.get(i + 1) {
                    Some(next) => next.step as usize - row.step as usize,
                    None => STEPS_PER_PATTERN - row.step as usize,
                };
                let time = logical + (row.step - range.start_step) as f64 * step_dur;
                if let Some(note) = row_to_note(row, ch, time, steps as f64 * step_dur, mixer) {
                    notes.push(note);
                }
            }
        }
        logical += range.len() as f64 * step_dur;
    }
    (notes, logical)
}

/// Transport-side playback state. The cursor is always derived from the
/// backend clock, never counted frame by frame.
#[derive(Debug, Default)]
pub struct Scheduler {
    pub mode: PlaybackMode,
    looping: bool,
    playing: bool,
    target: Option<PlaybackTarget>,
    segment: Option<Segment>,
    current_step: f64,
    current_arr_idx: usize,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn is_looping(&self) -> bool {
        self.looping
    }

    pub fn current_step(&self) -> u8 {
        (self.current_step.max(0.0) as usize).min(STEPS_PER_PATTERN - 1) as u8
    }

    pub fn current_step_exact(&self) -> f64 {
        self.current_step
    }

    pub fn current_arr_idx(&self) -> usize {
        self.current_arr_idx
    }

    pub fn set_current_arr_idx(&mut self, idx: usize) {
        self.current_arr_idx = idx;
    }

    pub fn target(&self) -> Option<PlaybackTarget> {
        self.target
    }

    pub fn window(&self) -> Option<PlaybackWindow> {
        self.segment.map(|s| s.window)
    }

    pub fn toggle_loop(&mut self) {
        self.looping = !self.looping;
    }

    pub fn toggle_mode(&mut self) {
        self.mode = match self.mode {
            PlaybackMode::Song => PlaybackMode::Pattern,
            PlaybackMode::Pattern => PlaybackMode::Song,
        };
    }

    /// Start from the current position. Song mode with an empty arrangement
    /// falls back to pattern mode.
    pub fn play(&mut self, project: &ProjectState, mixer: &MixerState, transport: &mut impl Transport) {
        if self.mode == PlaybackMode::Song && project.arrangement.is_empty() {
            self.mode = PlaybackMode::Pattern;
        }
        let target = match self.mode {
            PlaybackMode::Song => PlaybackTarget::Song { start_idx: self.current_arr_idx },
            PlaybackMode::Pattern => PlaybackTarget::Pattern,
        };
        self.target = Some(target);
        self.execute(target, project, mixer, transport, None);
    }

    pub fn play_selection(
        &mut self,
        range: StepRange,
        project: &ProjectState,
        mixer: &MixerState,
        transport: &mut impl Transport,
    ) {
        self.mode = PlaybackMode::Pattern;
        let target = PlaybackTarget::Selection { range };
        self.target = Some(target);
        self.execute(target, project, mixer, transport, None);
    }

    /// Stop and rewind.
    pub fn stop(&mut self, transport: &mut impl Transport) {
        if self.playing {
            info!("playback stopped");
        }
        self.halt(transport);
        self.current_step = 0.0;
        self.current_arr_idx = 0;
        self.target = None;
    }

    /// Stop but keep the cursor where it is.
    pub fn pause(&mut self, transport: &mut impl Transport) {
        self.halt(transport);
    }

    fn halt(&mut self, transport: &mut impl Transport) {
        transport.stop_all();
        self.playing = false;
        self.segment = None;
    }

    fn execute(
        &mut self,
        target: PlaybackTarget,
        project: &ProjectState,
        mixer: &MixerState,
        transport: &mut impl Transport,
        start_at: Option<f64>,
    ) {
        let (pattern_ids, range): (Vec<String>, Option<StepRange>) = match target {
            PlaybackTarget::Song { start_idx } => {
                (project.arrangement.iter().skip(start_idx).cloned().collect(), None)
            }
            PlaybackTarget::Pattern => (project.active_pattern_id.iter().cloned().collect(), None),
            PlaybackTarget::Selection { range } => {
                (project.active_pattern_id.iter().cloned().collect(), Some(range))
            }
        };
        if pattern_ids.is_empty() {
            debug!(?target, "nothing to play");
            self.stop(transport);
            return;
        }

        // mixer first, so the first notes already land on the right bus gains
        transport.set_bus_gains(mixer.bus_gains());

        let step_dur = step_duration(project.bpm);
        let (notes, logical) = build_track(project, mixer, &pattern_ids, range, step_dur);

        let Some(window) = transport.play_track(&notes, logical, start_at) else {
            warn!("audio backend unavailable, playback not started");
            self.stop(transport);
            return;
        };
        if start_at.is_some() {
            debug!(?target, start = window.start_time, "loop pass scheduled");
        } else {
            info!(?target, notes = notes.len(), logical, "playback started");
        }

        self.playing = true;
        self.segment = Some(Segment { target, window, step_duration: step_dur });
    }

    /// Called once per UI frame. Late or skipped frames are fine: the next
    /// call catches up from the clock.
    pub fn tick(&mut self, project: &ProjectState, mixer: &MixerState, transport: &mut impl Transport) {
        if !self.playing {
            return;
        }
        let Some(segment) = self.segment else {
            return;
        };
        let now = transport.current_time();

        if now >= segment.window.end_time - LOOP_EPSILON {
            match self.target.filter(|_| self.looping) {
                Some(target) => {
                    let next = match target {
                        // song loops always restart at the top of the arrangement
                        PlaybackTarget::Song { .. } => PlaybackTarget::Song { start_idx: 0 },
                        other => other,
                    };
                    self.execute(next, project, mixer, transport, Some(segment.window.end_time));
                }
                None => self.stop(transport),
            }
            return;
        }

        let elapsed = (now - segment.window.start_time).max(0.0);
        let step = elapsed / segment.step_duration;
        let steps = STEPS_PER_PATTERN as f64;
        match segment.target {
            PlaybackTarget::Song { start_idx } => {
                let global = start_idx as f64 * steps + step;
                self.current_arr_idx = (global / steps).floor() as usize;
                self.current_step = global % steps;
            }
            PlaybackTarget::Pattern => self.current_step = step % steps,
            PlaybackTarget::Selection { range } => self.current_step = range.start_step as f64 + step,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::project::TrackerRow;
    use crate::shared::NUM_CHANNELS;

    const LOOKAHEAD: f64 = 0.05;

    #[derive(Default)]
    struct FakeTransport {
        now: f64,
        fail: bool,
        stops: usize,
        gains: Option<[f32; NUM_CHANNELS]>,
        scheduled: Vec<(Vec<Note>, f64, Option<f64>, PlaybackWindow)>,
    }

    impl Transport for FakeTransport {
        fn current_time(&self) -> f64 {
            self.now
        }

        fn set_bus_gains(&mut self, gains: [f32; NUM_CHANNELS]) {
            self.gains = Some(gains);
        }

        fn play_track(&mut self, notes: &[Note], logical: f64, start_at: Option<f64>) -> Option<PlaybackWindow> {
            if self.fail {
                return None;
            }
            if start_at.is_none() {
                self.stop_all();
            }
            let start_time = start_at.unwrap_or(self.now + LOOKAHEAD);
            let window = PlaybackWindow { start_time, end_time: start_time + logical };
            self.scheduled.push((notes.to_vec(), logical, start_at, window));
            Some(window)
        }

        fn stop_all(&mut self) {
            self.stops += 1;
        }
    }

    fn project() -> ProjectState {
        let mut project = ProjectState::new_project();
        project.bpm = 120.0;
        project.update_active_pattern(|p| {
            let mut channels = p.channels.clone();
            channels.set(1, vec![TrackerRow::note(0, "C-4", 1), TrackerRow::note_off(8)]);
            channels.set(4, vec![TrackerRow::note(4, "C-2", 4)]);
            p.with_channels(channels)
        });
        project
    }

    #[test]
    fn step_duration_is_a_sixteenth() {
        assert_eq!(step_duration(120.0), 0.125);
        assert_eq!(step_duration(60.0), 0.25);
    }

    #[test]
    fn track_durations_run_to_the_next_row() {
        let project = project();
        let ids = vec!["pat-start".to_string()];
        let (notes, logical) = build_track(&project, &MixerState::default(), &ids, None, 0.125);
        assert_eq!(logical, 8.0);
        assert_eq!(notes.len(), 2);
        let lead = notes.iter().find(|n| n.channel == 1).unwrap();
        assert_eq!(lead.duration, 1.0);
        let kick = notes.iter().find(|n| n.channel == 4).unwrap();
        assert_eq!(kick.time, 0.5);
        assert_eq!(kick.duration, 60.0 * 0.125);
    }

    #[test]
    fn selection_times_are_relative_to_the_range() {
        let project = project();
        let ids = vec!["pat-start".to_string()];
        let (notes, logical) =
            build_track(&project, &MixerState::default(), &ids, Some(StepRange::new(4, 7)), 0.125);
        assert_eq!(logical, 0.5);
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].time, 0.0);
    }

    #[test]
    fn song_segments_are_laid_end_to_end() {
        let mut project = project();
        project.arrangement = vec!["pat-start".into(), "missing".into(), "pat-start".into()];
        let (notes, logical) =
            build_track(&project, &MixerState::default(), &project.arrangement, None, 0.125);
        assert_eq!(logical, 16.0);
        assert_eq!(notes.len(), 4);
        assert!(notes.iter().any(|n| n.channel == 1 && n.time == 8.0));
    }

    #[test]
    fn empty_arrangement_falls_back_to_pattern_mode() {
        let project = project();
        let mut transport = FakeTransport::default();
        let mut scheduler = Scheduler::new();
        scheduler.play(&project, &MixerState::default(), &mut transport);
        assert_eq!(scheduler.mode, PlaybackMode::Pattern);
        assert_eq!(scheduler.target(), Some(PlaybackTarget::Pattern));
        assert!(scheduler.is_playing());
        assert_eq!(transport.gains, Some([1.0; 4]));
    }

    #[test]
    fn cursor_follows_the_clock() {
        let project = project();
        let mut transport = FakeTransport::default();
        let mut scheduler = Scheduler::new();
        scheduler.play(&project, &MixerState::default(), &mut transport);

        transport.now = LOOKAHEAD + 0.125 * 10.5;
        scheduler.tick(&project, &MixerState::default(), &mut transport);
        assert_eq!(scheduler.current_step(), 10);

        // before the segment starts the cursor stays at zero
        transport.now = 0.01;
        scheduler.tick(&project, &MixerState::default(), &mut transport);
        assert_eq!(scheduler.current_step(), 0);
    }

    #[test]
    fn song_cursor_tracks_the_arrangement_index() {
        let mut project = project();
        project.arrangement = vec!["pat-start".into(), "pat-start".into(), "pat-start".into()];
        let mut transport = FakeTransport::default();
        let mut scheduler = Scheduler::new();
        scheduler.set_current_arr_idx(1);
        scheduler.play(&project, &MixerState::default(), &mut transport);
        assert_eq!(scheduler.target(), Some(PlaybackTarget::Song { start_idx: 1 }));

        transport.now = LOOKAHEAD + 8.0 + 0.125 * 3.0;
        scheduler.tick(&project, &MixerState::default(), &mut transport);
        assert_eq!(scheduler.current_arr_idx(), 2);
        assert_eq!(scheduler.current_step(), 3);
    }

    #[test]
    fn loop_passes_start_exactly_at_the_previous_end() {
        let project = project();
        let mut transport = FakeTransport::default();
        let mut scheduler = Scheduler::new();
        scheduler.toggle_loop();
        scheduler.play(&project, &MixerState::default(), &mut transport);
        let first_end = transport.scheduled[0].3.end_time;

        transport.now = first_end - 0.01;
        scheduler.tick(&project, &MixerState::default(), &mut transport);

        assert_eq!(transport.scheduled.len(), 2);
        let (notes, _, start_at, window) = &transport.scheduled[1];
        assert_eq!(*start_at, Some(first_end));
        assert_eq!(window.start_time, first_end);
        let first_note = notes.iter().map(|n| n.time).fold(f64::INFINITY, f64::min);
        assert_eq!(window.start_time + first_note, first_end);
        assert!(scheduler.is_playing());
        // chaining never stops what's already sounding
        assert_eq!(transport.stops, 1);
    }

    #[test]
    fn song_loops_restart_from_the_top() {
        let mut project = project();
        project.arrangement = vec!["pat-start".into(), "pat-start".into()];
        let mut transport = FakeTransport::default();
        let mut scheduler = Scheduler::new();
        scheduler.toggle_loop();
        scheduler.set_current_arr_idx(1);
        scheduler.play(&project, &MixerState::default(), &mut transport);
        assert_eq!(transport.scheduled[0].1, 8.0);

        transport.now = transport.scheduled[0].3.end_time;
        scheduler.tick(&project, &MixerState::default(), &mut transport);
        assert_eq!(transport.scheduled[1].1, 16.0);
    }

    #[test]
    fn without_loop_the_end_stops_and_rewinds() {
        let project = project();
        let mut transport = FakeTransport::default();
        let mut scheduler = Scheduler::new();
        scheduler.play_selection(StepRange::new(0, 15), &project, &MixerState::default(), &mut transport);

        transport.now = LOOKAHEAD + 0.125 * 5.0;
        scheduler.tick(&project, &MixerState::default(), &mut transport);
        assert_eq!(scheduler.current_step(), 5);

        transport.now = 10.0;
        scheduler.tick(&project, &MixerState::default(), &mut transport);
        assert!(!scheduler.is_playing());
        assert_eq!(scheduler.current_step(), 0);
        assert_eq!(scheduler.target(), None);
    }

    #[test]
    fn pause_keeps_the_position() {
        let mut project = project();
        project.arrangement = vec!["pat-start".into(), "pat-start".into()];
        let mut transport = FakeTransport::default();
        let mut scheduler = Scheduler::new();
        scheduler.play(&project, &MixerState::default(), &mut transport);
        transport.now = LOOKAHEAD + 8.0 + 0.125 * 2.0;
        scheduler.tick(&project, &MixerState::default(), &mut transport);

        scheduler.pause(&mut transport);
        assert!(!scheduler.is_playing());
        assert_eq!(scheduler.current_arr_idx(), 1);
        assert_eq!(scheduler.current_step(), 2);

        scheduler.stop(&mut transport);
        scheduler.stop(&mut transport);
        assert_eq!(scheduler.current_arr_idx(), 0);
    }

    #[test]
    fn backend_failure_leaves_playback_stopped() {
        let project = project();
        let mut transport = FakeTransport { fail: true, ..Default::default() };
        let mut scheduler = Scheduler::new();
        scheduler.play(&project, &MixerState::default(), &mut transport);
        assert!(!scheduler.is_playing());
        assert!(scheduler.window().is_none());
    }

    #[test]
    fn nothing_to_play_stops() {
        let mut project = ProjectState::default();
        project.active_pattern_id = None;
        let mut transport = FakeTransport::default();
        let mut scheduler = Scheduler::new();
        scheduler.play(&project, &MixerState::default(), &mut transport);
        assert!(!scheduler.is_playing());
        assert!(transport.scheduled.is_empty());
    }
}

