// Pattern editing operations. All of them are pure: pattern in, pattern out.
// Anything that can overlap goes through blocks so note-offs come out right;
// per-row tweaks (reverse, tween, jitter, transpose) edit rows directly.

use std::collections::{BTreeSet, HashSet};

use rand::Rng;

use super::blocks::{self, PatternBlock};
use super::ids::{next_row_id, RowId};
use super::project::{Effect, Pattern, TrackerRow, MAX_VOLUME};
use crate::pitch::{self, EMPTY};
use crate::shared::{clamp_channel, clamp_step, Cell, StepDelta, CHANNELS, STEPS_PER_PATTERN};

const PATTERN_END: i32 = STEPS_PER_PATTERN as i32;

pub type CellSet = HashSet<Cell>;
pub type IdSet = HashSet<RowId>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RandomizeMode {
    Volume,
    Panning,
    Both,
}

impl RandomizeMode {
    fn volume(self) -> bool {
        matches!(self, RandomizeMode::Volume | RandomizeMode::Both)
    }

    fn panning(self) -> bool {
        matches!(self, RandomizeMode::Panning | RandomizeMode::Both)
    }
}

/// Move (or copy) the selected blocks by a delta.
///
/// Destinations clamp into the grid. Whatever static block a moved block lands
/// on is overwritten. With `copy`, the originals stay behind under fresh ids.
pub fn apply_move(pattern: &Pattern, selected: &IdSet, delta: StepDelta, copy: bool) -> Pattern {
    let mut moving = Vec::new();
    let mut fixed = Vec::new();

    for block in blocks::rows_to_blocks(pattern) {
        if !selected.contains(&block.row.id) {
            fixed.push(block);
            continue;
        }
        if copy {
            let mut original = block.clone();
            original.row.id = next_row_id("cp");
            fixed.push(original);
        }

        let ch = clamp_channel(block.channel as i32 + delta.ch);
        let step = clamp_step(block.step() as i32 + delta.step);
        let length = (block.length as i32).min(PATTERN_END - step as i32);
        if length <= 0 {
            continue;
        }
        let mut moved = block;
        moved.channel = ch;
        moved.row.step = step;
        moved.length = length as u8;
        moving.push(moved);
    }

    let kill_zone: HashSet<Cell> = moving
        .iter()
        .flat_map(|b| (b.step()..=b.end_step()).map(move |s| Cell::new(b.channel, s)))
        .collect();
    fixed.retain(|b| !(b.step()..=b.end_step()).any(|s| kill_zone.contains(&Cell::new(b.channel, s))));

    fixed.extend(moving);
    blocks::compile(pattern, &fixed)
}

/// Set the length of the block starting at (ch, step). Neighbours it now covers are dropped.
pub fn apply_resize(pattern: &Pattern, ch: u8, start_step: u8, new_length: i32) -> Pattern {
    let mut all = blocks::rows_to_blocks(pattern);
    let Some(index) = all.iter().position(|b| b.channel == ch && b.step() == start_step) else {
        return pattern.clone();
    };

    let mut target = all.remove(index);
    target.length = new_length.clamp(1, PATTERN_END - target.step() as i32) as u8;
    all.retain(|b| !b.overlaps(&target));
    all.push(target);
    blocks::compile(pattern, &all)
}

/// Paste clipboard blocks so that `origin` lands on `target`.
///
/// Every shifted entry, EMPTY_CELL placeholders included, clears the existing
/// blocks it overlaps, so gaps in the clipboard come out as gaps.
pub fn apply_paste(pattern: &Pattern, clipboard: &[PatternBlock], target: Cell, origin: Cell) -> Pattern {
    let delta = StepDelta::between(origin, target);

    let shifted: Vec<PatternBlock> = clipboard
        .iter()
        .filter_map(|b| {
            let ch = b.channel as i32 + delta.ch;
            let step = b.step() as i32 + delta.step;
            if !(1..=4).contains(&ch) || !(0..PATTERN_END).contains(&step) {
                return None;
            }
            let mut block = b.clone();
            block.row.id = next_row_id("p");
            block.row.step = step as u8;
            block.channel = ch as u8;
            block.length = (b.length as i32).clamp(1, PATTERN_END - step) as u8;
            Some(block)
        })
        .collect();

    if shifted.is_empty() {
        return pattern.clone();
    }

    let mut result: Vec<PatternBlock> = blocks::rows_to_blocks(pattern)
        .into_iter()
        .filter(|existing| !shifted.iter().any(|s| claims(s, existing)))
        .collect();
    result.extend(shifted.into_iter().filter(|b| !b.is_empty_cell()));
    blocks::compile(pattern, &result)
}

// placeholders claim just their own cell
fn claims(pasted: &PatternBlock, existing: &PatternBlock) -> bool {
    if pasted.is_empty_cell() {
        existing.covers(pasted.channel, pasted.step())
    } else {
        pasted.overlaps(existing)
    }
}

/// Mirror the selected rows inside the selection's step bounds.
pub fn apply_reverse(pattern: &Pattern, cells: &CellSet) -> Pattern {
    let selected_steps: Vec<u8> = pattern
        .channels
        .iter()
        .flat_map(|(ch, rows)| rows.iter().filter(move |r| cells.contains(&Cell::new(ch, r.step))))
        .map(|r| r.step)
        .collect();
    let (Some(&min), Some(&max)) = (selected_steps.iter().min(), selected_steps.iter().max()) else {
        return pattern.clone();
    };

    let mut channels = pattern.channels.clone();
    for ch in CHANNELS {
        let (picked, mut rest): (Vec<TrackerRow>, Vec<TrackerRow>) = pattern
            .channels
            .get(ch)
            .iter()
            .cloned()
            .partition(|r| cells.contains(&Cell::new(ch, r.step)));
        if picked.is_empty() {
            continue;
        }

        let reversed: Vec<TrackerRow> = picked
            .into_iter()
            .map(|row| TrackerRow {
                id: next_row_id("rev"),
                step: max - (row.step - min),
                ..row
            })
            .collect();
        let landing: BTreeSet<u8> = reversed.iter().map(|r| r.step).collect();
        rest.retain(|r| !landing.contains(&r.step));
        rest.extend(reversed);
        channels.set(ch, rest);
    }
    pattern.with_channels(channels)
}

/// Fill the gaps between consecutive selected rows with tweened rows.
///
/// Volume and panning always interpolate; pitch interpolates by table index
/// when both ends have a pitch, holds the start pitch when only it does.
pub fn apply_interpolate(pattern: &Pattern, cells: &CellSet) -> Pattern {
    let mut channels = pattern.channels.clone();

    for ch in CHANNELS {
        let mut keys: Vec<&TrackerRow> = pattern
            .channels
            .get(ch)
            .iter()
            .filter(|r| cells.contains(&Cell::new(ch, r.step)))
            .collect();
        if keys.len() < 2 {
            continue;
        }
        keys.sort_by_key(|r| r.step);

        let mut generated = Vec::new();
        for pair in keys.windows(2) {
            generated.extend(tween(pair[0], pair[1]));
        }
        if generated.is_empty() {
            continue;
        }

        let taken: BTreeSet<u8> = generated.iter().map(|r| r.step).collect();
        let mut rows: Vec<TrackerRow> = pattern
            .channels
            .get(ch)
            .iter()
            .filter(|r| !taken.contains(&r.step))
            .cloned()
            .collect();
        rows.extend(generated);
        channels.set(ch, rows);
    }
    pattern.with_channels(channels)
}

fn sounding_index(pitch: &str) -> Option<usize> {
    if pitch::is_sounding(pitch) {
        pitch::pitch_to_index(pitch)
    } else {
        None
    }
}

fn tween(start: &TrackerRow, end: &TrackerRow) -> Vec<TrackerRow> {
    let span = end.step as i32 - start.step as i32;
    if span <= 1 {
        return Vec::new();
    }

    let start_idx = sounding_index(&start.pitch);
    let end_idx = sounding_index(&end.pitch);
    let start_pan = start.panning.unwrap_or(0.0);
    let end_pan = end.panning.unwrap_or(0.0);

    (1..span)
        .map(|s| {
            let t = s as f64 / span as f64;
            let volume = (start.volume as f64 + (end.volume as f64 - start.volume as f64) * t).round();
            let panning = round2(start_pan as f64 + (end_pan as f64 - start_pan as f64) * t);
            let pitch = match (start_idx, end_idx) {
                (Some(a), Some(b)) => {
                    let idx = (a as f64 + (b as f64 - a as f64) * t).round();
                    pitch::index_to_pitch(idx as i32).to_string()
                }
                (Some(_), None) => start.pitch.clone(),
                _ => EMPTY.to_string(),
            };

            TrackerRow {
                id: next_row_id("tween"),
                step: start.step + s as u8,
                pitch,
                instrument: start.instrument,
                volume: volume.clamp(0.0, MAX_VOLUME as f64) as u8,
                duty_cycle: start.duty_cycle,
                effect: Some(Effect::None),
                arp_notes: None,
                slide: None,
                decay: None,
                panning: Some(panning as f32),
            }
        })
        .collect()
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// Jitter volume by -2..=2 and/or panning by -0.3..0.3 on selected sounding rows.
pub fn apply_randomize(pattern: &Pattern, cells: &CellSet, mode: RandomizeMode, rng: &mut impl Rng) -> Pattern {
    let mut channels = pattern.channels.clone();
    for ch in CHANNELS {
        let Some(rows) = channels.get_mut(ch) else { continue };
        for row in rows.iter_mut() {
            if !cells.contains(&Cell::new(ch, row.step)) || !row.is_sounding() {
                continue;
            }
            if mode.volume() {
                let jitter: i32 = rng.gen_range(-2..=2);
                row.volume = (row.volume as i32 + jitter).clamp(1, MAX_VOLUME as i32) as u8;
            }
            if mode.panning() {
                let jitter: f64 = rng.gen_range(-0.3..0.3);
                let pan = round2(row.panning.unwrap_or(0.0) as f64 + jitter).clamp(-1.0, 1.0);
                row.panning = Some(pan as f32);
            }
        }
    }
    pattern.with_channels(channels)
}

/// Shift selected sounding rows by semitones, clamped to the table ends.
pub fn apply_transpose(pattern: &Pattern, ids: &IdSet, semitones: i32) -> Pattern {
    let mut channels = pattern.channels.clone();
    for ch in CHANNELS {
        let Some(rows) = channels.get_mut(ch) else { continue };
        for row in rows.iter_mut().filter(|r| ids.contains(&r.id)) {
            if sounding_index(&row.pitch).is_some() {
                row.pitch = pitch::transpose(&row.pitch, semitones);
            }
        }
    }
    pattern.with_channels(channels)
}

/// Drop every row that is selected by id or sits on a selected cell.
pub fn apply_delete(pattern: &Pattern, ids: &IdSet, cells: &CellSet) -> Pattern {
    let mut channels = pattern.channels.clone();
    for ch in CHANNELS {
        if let Some(rows) = channels.get_mut(ch) {
            rows.retain(|r| !ids.contains(&r.id) && !cells.contains(&Cell::new(ch, r.step)));
        }
    }
    pattern.with_channels(channels)
}
