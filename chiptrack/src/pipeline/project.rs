// The project data model: rows, patterns, clips, and the project that owns them.
//
// -- DEFINITIONS --
// "row": one sparse event on one channel at one step. Rows only exist where
//        something changes; a note rings until the next row on its channel
//        (an "OFF" row is how silence is written down).
// "pattern": four channels of rows, 64 steps long.
// "clip": a reusable fragment with the same channel-keyed shape, stamped onto
//         a pattern at a drop step.
// "arrangement": the song, an ordered list of pattern ids (repeats allowed).
//
// Field names serialize in camelCase so saved projects stay readable by the
// rest of the toolchain.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::clip::{self, ClipPayload};
use super::history::{History, Snapshot};
use super::ids::{next_pattern_id, next_row_id, RowId};
use crate::compose::Composition;
use crate::pitch::{self, OFF};
use crate::shared::{CHANNELS, NOISE_CHANNEL, NUM_CHANNELS, STEPS_PER_PATTERN, WAVE_CHANNEL};

pub const DEFAULT_BPM: f64 = 140.0;
pub const DEFAULT_VOLUME: u8 = 12;
pub const MAX_VOLUME: u8 = 15;
pub const MAX_DECAY: u8 = 15;

/// Pulse width on ch1/ch2, waveform on ch3, LFSR width on ch4.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DutyCycle {
    #[serde(rename = "0.125")]
    Eighth,
    #[serde(rename = "0.25")]
    Quarter,
    #[default]
    #[serde(rename = "0.5")]
    Half,
}

impl DutyCycle {
    pub const ALL: [DutyCycle; 3] = [DutyCycle::Eighth, DutyCycle::Quarter, DutyCycle::Half];
    pub const SOFT_NOISE: DutyCycle = DutyCycle::Half; // 15-bit LFSR
    pub const METALLIC_NOISE: DutyCycle = DutyCycle::Eighth; // 7-bit LFSR

    pub fn fraction(self) -> f32 {
        match self {
            DutyCycle::Eighth => 0.125,
            DutyCycle::Quarter => 0.25,
            DutyCycle::Half => 0.5,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DutyCycle::Eighth => "0.125",
            DutyCycle::Quarter => "0.25",
            DutyCycle::Half => "0.5",
        }
    }

    /// Accepts "0.125", ".25", "0.5" and the like; anything else is None.
    pub fn parse(raw: &str) -> Option<Self> {
        let value: f32 = raw.trim().parse().ok()?;
        Self::from_fraction(value)
    }

    pub fn from_fraction(value: f32) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|d| (d.fraction() - value).abs() < 1e-4)
    }

    pub fn channel_default(ch: u8) -> Self {
        if ch == 2 { DutyCycle::Quarter } else { DutyCycle::Half }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Effect {
    #[default]
    None,
    Slide,
    Vibrato,
    Arpeggio,
}

impl Effect {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_uppercase().as_str() {
            "NONE" => Some(Effect::None),
            "SLIDE" => Some(Effect::Slide),
            "VIBRATO" => Some(Effect::Vibrato),
            "ARPEGGIO" => Some(Effect::Arpeggio),
            _ => None,
        }
    }
}

/// Cosmetic tag; the channel decides the actual sound.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Instrument {
    Lead,
    Pluck,
    Sub,
    Kick,
    Snare,
    Hat,
    Sample,
    #[default]
    #[serde(rename = "---")]
    Blank,
}

impl Instrument {
    pub fn channel_default(ch: u8) -> Self {
        match ch {
            WAVE_CHANNEL => Instrument::Sub,
            NOISE_CHANNEL => Instrument::Kick,
            _ => Instrument::Lead,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackerRow {
    pub id: RowId,
    pub step: u8,
    pub pitch: String,
    #[serde(default)]
    pub instrument: Instrument,
    #[serde(default)]
    pub volume: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duty_cycle: Option<DutyCycle>, // None = use the channel's default
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effect: Option<Effect>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arp_notes: Option<String>, // "4,7" semitone offsets
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slide: Option<String>, // target pitch
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decay: Option<u8>, // 0 = sustain until the next event
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub panning: Option<f32>,
}

impl TrackerRow {
    /// A plain note with the channel's defaults.
    pub fn note(step: u8, pitch: &str, ch: u8) -> Self {
        Self {
            id: next_row_id("n"),
            step,
            pitch: pitch.to_string(),
            instrument: Instrument::channel_default(ch),
            volume: DEFAULT_VOLUME,
            duty_cycle: Some(DutyCycle::channel_default(ch)),
            effect: Some(Effect::None),
            arp_notes: None,
            slide: None,
            decay: None,
            panning: None,
        }
    }

    /// The synthetic silence marker that terminates the previous note.
    pub fn note_off(step: u8) -> Self {
        Self {
            id: next_row_id("off"),
            step,
            pitch: OFF.to_string(),
            instrument: Instrument::Blank,
            volume: 0,
            duty_cycle: Some(DutyCycle::Half),
            effect: None,
            arp_notes: None,
            slide: None,
            decay: None,
            panning: None,
        }
    }

    pub fn with_volume(mut self, volume: u8) -> Self {
        self.volume = volume.min(MAX_VOLUME);
        self
    }

    pub fn with_decay(mut self, decay: u8) -> Self {
        self.decay = Some(decay.min(MAX_DECAY));
        self
    }

    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effect = Some(effect);
        self
    }

    pub fn is_sounding(&self) -> bool {
        pitch::is_sounding(&self.pitch)
    }

    pub fn is_note_off(&self) -> bool {
        self.pitch == OFF
    }
}

/// The four channel lanes of a pattern. Saved as `{"1": [...], ..., "4": [...]}`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "BTreeMap<u8, Vec<TrackerRow>>", into = "BTreeMap<u8, Vec<TrackerRow>>")]
pub struct ChannelRows([Vec<TrackerRow>; NUM_CHANNELS]);

impl ChannelRows {
    pub fn get(&self, ch: u8) -> &[TrackerRow] {
        match ch {
            1..=4 => &self.0[ch as usize - 1],
            _ => &[],
        }
    }

    pub fn get_mut(&mut self, ch: u8) -> Option<&mut Vec<TrackerRow>> {
        match ch {
            1..=4 => Some(&mut self.0[ch as usize - 1]),
            _ => None,
        }
    }

    /// Rows past the last step are dropped.
    pub fn set(&mut self, ch: u8, mut rows: Vec<TrackerRow>) {
        rows.retain(|r| (r.step as usize) < STEPS_PER_PATTERN);
        rows.sort_by_key(|r| r.step);
        if let Some(slot) = self.get_mut(ch) {
            *slot = rows;
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (u8, &Vec<TrackerRow>)> {
        CHANNELS.iter().copied().zip(self.0.iter())
    }

    pub fn is_empty(&self) -> bool {
        self.0.iter().all(|rows| rows.is_empty())
    }
}

impl From<BTreeMap<u8, Vec<TrackerRow>>> for ChannelRows {
    fn from(mut map: BTreeMap<u8, Vec<TrackerRow>>) -> Self {
        let mut rows = ChannelRows::default();
        for ch in CHANNELS {
            rows.set(ch, map.remove(&ch).unwrap_or_default());
        }
        rows
    }
}

impl From<ChannelRows> for BTreeMap<u8, Vec<TrackerRow>> {
    fn from(rows: ChannelRows) -> Self {
        CHANNELS.into_iter().zip(rows.0).collect()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Pattern {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub channels: ChannelRows,
}

impl Pattern {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            channels: ChannelRows::default(),
        }
    }

    pub fn with_channels(&self, channels: ChannelRows) -> Self {
        Self {
            id: self.id.clone(),
            name: self.name.clone(),
            channels,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ClipCategory {
    Drums,
    Bass,
    Lead,
    Combo,
    Ai,
}

/// A partial row: anything missing is filled in when the clip is stamped.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClipRow {
    #[serde(default)]
    pub step: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pitch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instrument: Option<Instrument>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duty_cycle: Option<DutyCycle>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effect: Option<Effect>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arp_notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slide: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decay: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub panning: Option<f32>,
}

impl ClipRow {
    pub fn at(step: u8, pitch: &str) -> Self {
        Self {
            step,
            pitch: Some(pitch.to_string()),
            ..Self::default()
        }
    }

    pub fn vol(mut self, volume: u8) -> Self {
        self.volume = Some(volume);
        self
    }

    pub fn decay(mut self, decay: u8) -> Self {
        self.decay = Some(decay);
        self
    }

    pub fn pan(mut self, panning: f32) -> Self {
        self.panning = Some(panning);
        self
    }

    pub fn duty(mut self, duty: DutyCycle) -> Self {
        self.duty_cycle = Some(duty);
        self
    }

    pub fn effect(mut self, effect: Effect) -> Self {
        self.effect = Some(effect);
        self
    }
}

impl From<&TrackerRow> for ClipRow {
    fn from(row: &TrackerRow) -> Self {
        Self {
            step: row.step,
            pitch: Some(row.pitch.clone()),
            instrument: Some(row.instrument),
            volume: Some(row.volume),
            duty_cycle: row.duty_cycle,
            effect: row.effect,
            arp_notes: row.arp_notes.clone(),
            slide: row.slide.clone(),
            decay: row.decay,
            panning: row.panning,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PatternClip {
    pub id: String,
    pub name: String,
    pub category: ClipCategory,
    #[serde(default)]
    pub channels: BTreeMap<u8, Vec<ClipRow>>,
}

fn default_bpm() -> f64 {
    DEFAULT_BPM
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectState {
    #[serde(default = "default_bpm")]
    pub bpm: f64,
    #[serde(default)]
    pub patterns: Vec<Pattern>,
    #[serde(default)]
    pub arrangement: Vec<String>, // pattern ids, repeats allowed
    #[serde(default)]
    pub custom_clips: Vec<PatternClip>,

    // Editor-session state, never saved.
    #[serde(skip)]
    pub active_pattern_id: Option<String>,
    #[serde(skip)]
    pub history: History,
}

impl Default for ProjectState {
    fn default() -> Self {
        Self {
            bpm: DEFAULT_BPM,
            patterns: Vec::new(),
            arrangement: Vec::new(),
            custom_clips: Vec::new(),
            active_pattern_id: None,
            history: History::default(),
        }
    }
}

impl ProjectState {
    /// A fresh project with one empty pattern selected.
    pub fn new_project() -> Self {
        let pattern = Pattern::new("pat-start", "PATTERN 1");
        Self {
            active_pattern_id: Some(pattern.id.clone()),
            patterns: vec![pattern],
            ..Self::default()
        }
    }

    pub fn pattern(&self, id: &str) -> Option<&Pattern> {
        self.patterns.iter().find(|p| p.id == id)
    }

    pub fn active_pattern(&self) -> Option<&Pattern> {
        self.active_pattern_id.as_deref().and_then(|id| self.pattern(id))
    }

    /// Select the first pattern if nothing valid is selected.
    pub fn ensure_active_pattern(&mut self) {
        if self.active_pattern().is_none() {
            self.active_pattern_id = self.patterns.first().map(|p| p.id.clone());
        }
    }

    pub fn set_active_pattern(&mut self, id: &str) {
        if self.pattern(id).is_some() {
            self.active_pattern_id = Some(id.to_string());
        }
    }

    fn snapshot(&self) -> Snapshot {
        Snapshot {
            patterns: self.patterns.clone(),
            arrangement: self.arrangement.clone(),
            bpm: self.bpm,
            custom_clips: self.custom_clips.clone(),
        }
    }

    fn record_history(&mut self) {
        let snapshot = self.snapshot();
        self.history.push(snapshot);
    }

    /// Replace one pattern through a pure transformation. Unknown ids are a no-op.
    pub fn update_pattern(&mut self, id: &str, f: impl FnOnce(&Pattern) -> Pattern) -> bool {
        let Some(index) = self.patterns.iter().position(|p| p.id == id) else {
            debug!(pattern = id, "update on unknown pattern ignored");
            return false;
        };
        let updated = f(&self.patterns[index]);
        if updated == self.patterns[index] {
            return false;
        }
        self.record_history();
        self.patterns[index] = updated;
        true
    }

    pub fn update_active_pattern(&mut self, f: impl FnOnce(&Pattern) -> Pattern) -> bool {
        match self.active_pattern_id.clone() {
            Some(id) => self.update_pattern(&id, f),
            None => false,
        }
    }

    pub fn set_patterns(&mut self, patterns: Vec<Pattern>) {
        self.record_history();
        self.patterns = patterns;
        self.ensure_active_pattern();
    }

    pub fn set_bpm(&mut self, bpm: f64) {
        self.record_history();
        self.bpm = bpm.clamp(30.0, 300.0);
    }

    pub fn add_pattern(&mut self) -> String {
        self.record_history();
        let id = next_pattern_id();
        let name = format!("PATTERN {}", self.patterns.len() + 1);
        self.patterns.push(Pattern::new(id.clone(), name));
        self.active_pattern_id = Some(id.clone());
        id
    }

    pub fn copy_pattern(&mut self, id: &str) -> Option<String> {
        let source = self.pattern(id)?.clone();
        self.record_history();
        let new_id = next_pattern_id();
        self.patterns.push(Pattern {
            id: new_id.clone(),
            name: format!("{} COPY", source.name),
            channels: source.channels,
        });
        self.active_pattern_id = Some(new_id.clone());
        Some(new_id)
    }

    pub fn rename_pattern(&mut self, id: &str, name: &str) {
        if self.pattern(id).is_none() {
            return;
        }
        self.record_history();
        if let Some(p) = self.patterns.iter_mut().find(|p| p.id == id) {
            p.name = name.to_uppercase();
        }
    }

    /// Remove a pattern and every arrangement slot that points at it.
    pub fn delete_pattern(&mut self, id: &str) {
        if self.pattern(id).is_none() {
            return;
        }
        self.record_history();
        self.patterns.retain(|p| p.id != id);
        self.arrangement.retain(|p| p != id);
        if self.active_pattern_id.as_deref() == Some(id) {
            self.active_pattern_id = self.patterns.first().map(|p| p.id.clone());
        }
    }

    pub fn add_to_arrangement(&mut self, id: &str) {
        self.record_history();
        self.arrangement.push(id.to_string());
    }

    pub fn remove_from_arrangement(&mut self, index: usize) {
        if index >= self.arrangement.len() {
            return;
        }
        self.record_history();
        self.arrangement.remove(index);
    }

    /// Move the slot at `from` so it lands before the slot currently at `to`.
    pub fn reorder_arrangement(&mut self, from: usize, to: usize) {
        if from >= self.arrangement.len() {
            return;
        }
        self.record_history();
        let moved = self.arrangement.remove(from);
        let target = if from < to { to - 1 } else { to };
        let target = target.min(self.arrangement.len());
        self.arrangement.insert(target, moved);
    }

    pub fn insert_in_arrangement(&mut self, id: &str, index: usize) {
        self.record_history();
        let index = index.min(self.arrangement.len());
        self.arrangement.insert(index, id.to_string());
    }

    pub fn add_custom_clips(&mut self, clips: Vec<PatternClip>) {
        self.custom_clips.extend(clips);
    }

    pub fn delete_custom_clip(&mut self, id: &str) {
        self.record_history();
        self.custom_clips.retain(|c| c.id != id);
    }

    /// Handle a drag-and-drop payload landing on the active pattern.
    pub fn drop_asset(&mut self, drop_ch: u8, drop_step: u8, payload: &str) -> bool {
        let Some(ClipPayload { clip_id }) = ClipPayload::parse(payload) else {
            debug!(payload, "ignoring unknown drop payload");
            return false;
        };
        let Some(found) = clip::find_clip(clip_id, &self.custom_clips) else {
            debug!(clip_id, "dropped clip not found");
            return false;
        };
        debug!(clip = %found.name, drop_ch, drop_step, "stamping clip");
        self.update_active_pattern(|p| clip::stamp_clip(p, &found, drop_step))
    }

    /// Swap in a finished composition in one go. History restarts here.
    pub fn apply_composition(&mut self, composition: Composition) {
        self.bpm = composition.bpm;
        self.patterns = composition.patterns;
        self.arrangement = composition.arrangement;
        self.active_pattern_id = self.patterns.first().map(|p| p.id.clone());
        self.history.clear();
    }

    pub fn undo(&mut self) -> bool {
        let Some(snapshot) = self.history.pop() else {
            return false;
        };
        self.patterns = snapshot.patterns;
        self.arrangement = snapshot.arrangement;
        self.bpm = snapshot.bpm;
        self.custom_clips = snapshot.custom_clips;
        self.ensure_active_pattern();
        true
    }
}
