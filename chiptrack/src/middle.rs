// Sits between the front-end and everything else: turns input events into
// project / mixer / transport changes and keeps a DisplayState for the view.

use tracing::{debug, info};

use crate::audio::AudioEngine;
use crate::audio_api::Transport;
use crate::pipeline::blocks::rows_to_blocks;
use crate::pipeline::mixer::MixerState;
use crate::pipeline::project::{Pattern, ProjectState};
use crate::playback::scheduler::{PlaybackMode, Scheduler};
use crate::shared::{DisplayState, InputEvent, LaneCell, NUM_CHANNELS, STEPS_PER_PATTERN};

pub struct Middle<T: Transport = AudioEngine> {
    pub project: ProjectState,
    pub mixer: MixerState,
    pub scheduler: Scheduler,
    pub transport: T,
    status: String,
    levels: [f32; NUM_CHANNELS],
}

impl Middle<AudioEngine> {
    pub fn with_project(project: ProjectState) -> Self {
        Self::with_transport(project, AudioEngine::new())
    }

    /// Pull meter levels from the engine; call once per frame before drawing.
    pub fn poll_meters(&mut self) {
        self.transport.poll_meters();
        self.levels = self.transport.analyser().bus_levels;
    }

    pub fn shutdown(&mut self) {
        self.scheduler.stop(&mut self.transport);
        self.transport.shutdown();
    }
}

impl<T: Transport> Middle<T> {
    pub fn with_transport(mut project: ProjectState, transport: T) -> Self {
        project.ensure_active_pattern();
        Self {
            project,
            mixer: MixerState::default(),
            scheduler: Scheduler::new(),
            transport,
            status: String::from("ready"),
            levels: [0.0; NUM_CHANNELS],
        }
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn handle_input(&mut self, event: InputEvent) {
        debug!(?event, "input");
        match event {
            InputEvent::PlayPress => {
                if self.scheduler.is_playing() {
                    self.scheduler.stop(&mut self.transport);
                    self.status = "stopped".into();
                } else {
                    self.scheduler.play(&self.project, &self.mixer, &mut self.transport);
                    self.status = if self.scheduler.is_playing() {
                        "playing".into()
                    } else {
                        "nothing to play".into()
                    };
                }
            }
            InputEvent::Pause => {
                if self.scheduler.is_playing() {
                    self.scheduler.pause(&mut self.transport);
                    self.status = "paused".into();
                }
            }
            InputEvent::ToggleLoop => {
                self.scheduler.toggle_loop();
                self.status = if self.scheduler.is_looping() { "loop on" } else { "loop off" }.into();
            }
            InputEvent::ToggleMode => {
                self.scheduler.toggle_mode();
                self.status = match self.scheduler.mode {
                    PlaybackMode::Song => "song mode",
                    PlaybackMode::Pattern => "pattern mode",
                }
                .into();
            }
            InputEvent::ToggleMute(ch) => {
                self.mixer.toggle_mute(ch);
                self.sync_mixer();
            }
            InputEvent::ToggleSolo(ch) => {
                self.mixer.toggle_solo(ch);
                self.sync_mixer();
            }
            InputEvent::SelectPattern(delta) => self.select_relative_pattern(delta),
            InputEvent::AdjustBpm(delta) => {
                self.project.set_bpm(self.project.bpm + delta);
                self.status = format!("bpm {}", self.project.bpm);
            }
            InputEvent::Undo => {
                self.status = if self.project.undo() { "undone" } else { "nothing to undo" }.into();
            }
            InputEvent::Quit => {} // main saves and exits
        }
    }

    // mixer changes reach the buses right away, playing or not
    fn sync_mixer(&mut self) {
        self.transport.set_bus_gains(self.mixer.bus_gains());
    }

    fn select_relative_pattern(&mut self, delta: i32) {
        let patterns = &self.project.patterns;
        if patterns.is_empty() {
            return;
        }
        let current = self
            .project
            .active_pattern_id
            .as_deref()
            .and_then(|id| patterns.iter().position(|p| p.id == id))
            .unwrap_or(0) as i32;
        let next = (current + delta).clamp(0, patterns.len() as i32 - 1) as usize;
        let id = patterns[next].id.clone();
        info!(pattern = %id, "pattern selected");
        self.project.set_active_pattern(&id);
    }

    /// Advance playback from the transport clock.
    pub fn tick(&mut self) {
        let was_playing = self.scheduler.is_playing();
        self.scheduler.tick(&self.project, &self.mixer, &mut self.transport);
        if was_playing && !self.scheduler.is_playing() {
            self.status = "stopped".into();
        }
    }

    // while a song plays, show whatever the arrangement is on
    fn shown_pattern(&self) -> Option<&Pattern> {
        let playing_song = self.scheduler.is_playing() && self.scheduler.mode == PlaybackMode::Song;
        if playing_song {
            if let Some(p) = self
                .project
                .arrangement
                .get(self.scheduler.current_arr_idx())
                .and_then(|id| self.project.pattern(id))
            {
                return Some(p);
            }
        }
        self.project.active_pattern()
    }

    pub fn display_state(&self) -> DisplayState {
        let mut lanes = [[LaneCell::Empty; STEPS_PER_PATTERN]; NUM_CHANNELS];
        let mut labels: [[Option<String>; STEPS_PER_PATTERN]; NUM_CHANNELS] =
            std::array::from_fn(|_| std::array::from_fn(|_| None));

        let pattern = self.shown_pattern();
        if let Some(pattern) = pattern {
            for (ch, rows) in pattern.channels.iter() {
                let lane = &mut lanes[ch as usize - 1];
                for row in rows.iter().filter(|r| r.is_note_off()) {
                    if let Some(cell) = lane.get_mut(row.step as usize) {
                        *cell = LaneCell::Off;
                    }
                }
            }
            for block in rows_to_blocks(pattern) {
                let lane = &mut lanes[block.channel as usize - 1];
                let (start, end) = (block.step() as usize, block.end_step() as usize);
                lane[start] = LaneCell::NoteStart;
                for cell in lane.iter_mut().take(end + 1).skip(start + 1) {
                    *cell = LaneCell::Sustain;
                }
                labels[block.channel as usize - 1][start] = Some(block.row.pitch.clone());
            }
        }

        DisplayState {
            pattern_name: pattern.map(|p| p.name.clone()).unwrap_or_default(),
            lanes,
            labels,
            playing_step: self.scheduler.is_playing().then(|| self.scheduler.current_step()),
            arrangement_index: self.scheduler.current_arr_idx(),
            arrangement_len: self.project.arrangement.len(),
            playing: self.scheduler.is_playing(),
            looping: self.scheduler.is_looping(),
            song_mode: self.scheduler.mode == PlaybackMode::Song,
            bpm: self.project.bpm,
            muted: self.mixer.channels.map(|c| c.mute),
            soloed: self.mixer.channels.map(|c| c.solo),
            levels: self.levels,
            status: self.status.clone(),
        }
    }
}
