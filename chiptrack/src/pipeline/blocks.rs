// Rows <-> blocks.
//
// Rows are sparse change events; blocks are what the user actually sees and
// drags around: one entry per sounding note with a length. Every editing
// operation goes rows -> blocks -> (edit) -> rows, and compiling back is where
// note-offs get re-inserted.

use super::ids::next_row_id;
use super::project::{ChannelRows, Pattern, TrackerRow};
use crate::pitch::{EMPTY, EMPTY_CELL, OFF};
use crate::shared::{CHANNELS, NOISE_CHANNEL, STEPS_PER_PATTERN};

const PATTERN_END: i32 = STEPS_PER_PATTERN as i32;

#[derive(Clone, Debug, PartialEq)]
pub struct PatternBlock {
    pub row: TrackerRow,
    pub channel: u8,
    pub length: u8,
}

impl PatternBlock {
    pub fn step(&self) -> u8 {
        self.row.step
    }

    pub fn id(&self) -> &str {
        self.row.id.as_str()
    }

    /// Last step this block covers.
    pub fn end_step(&self) -> u8 {
        self.row.step.saturating_add(self.length.max(1) - 1)
    }

    pub fn covers(&self, ch: u8, step: u8) -> bool {
        self.channel == ch && step >= self.step() && step <= self.end_step()
    }

    /// Same channel and at least one shared step.
    pub fn overlaps(&self, other: &PatternBlock) -> bool {
        self.channel == other.channel
            && self.step() <= other.end_step()
            && other.step() <= self.end_step()
    }

    /// Clipboard placeholder: claims one cell of silence, never compiles to a row.
    pub fn empty_cell(ch: u8, step: u8) -> Self {
        let mut row = TrackerRow::note_off(step);
        row.id = next_row_id("empty");
        row.pitch = EMPTY_CELL.to_string();
        Self {
            row,
            channel: ch,
            length: 1,
        }
    }

    pub fn is_empty_cell(&self) -> bool {
        self.row.pitch == EMPTY_CELL
    }
}

/// Derive the sounding blocks of one channel.
///
/// Melodic channels ring until the next event (note, OFF or blank row) or the
/// pattern end. Noise hits are one step long unless the next event is an OFF.
pub fn channel_blocks(ch: u8, rows: &[TrackerRow]) -> Vec<PatternBlock> {
    let mut sorted: Vec<&TrackerRow> = rows.iter().collect();
    sorted.sort_by_key(|r| r.step);

    let mut blocks = Vec::new();
    for (i, row) in sorted.iter().enumerate() {
        if row.pitch == OFF || row.pitch == EMPTY || row.step as i32 >= PATTERN_END {
            continue;
        }
        let next = sorted[i + 1..].iter().find(|r| r.step > row.step);
        let step = row.step as i32;

        let length = if ch == NOISE_CHANNEL {
            match next {
                Some(n) if n.pitch == OFF => n.step as i32 - step,
                _ => 1,
            }
        } else {
            match next {
                Some(n) => n.step as i32 - step,
                None => PATTERN_END - step,
            }
        };

        blocks.push(PatternBlock {
            row: (*row).clone(),
            channel: ch,
            length: length.clamp(1, PATTERN_END - step) as u8,
        });
    }
    blocks
}

pub fn rows_to_blocks(pattern: &Pattern) -> Vec<PatternBlock> {
    CHANNELS
        .iter()
        .flat_map(|&ch| channel_blocks(ch, pattern.channels.get(ch)))
        .collect()
}

/// Compile blocks back into sparse rows.
///
/// Each block emits its row plus an OFF at `step + length` unless that is past
/// the pattern or another block starts there (or earlier). Two blocks on the
/// same start cell collapse to the later one in the input.
pub fn blocks_to_rows(blocks: &[PatternBlock]) -> ChannelRows {
    let mut channels = ChannelRows::default();

    for ch in CHANNELS {
        let mut ch_blocks: Vec<&PatternBlock> = blocks
            .iter()
            .filter(|b| b.channel == ch && (b.step() as i32) < PATTERN_END)
            .collect();
        ch_blocks.sort_by_key(|b| b.step()); // stable: input order kept per step

        let mut deduped: Vec<&PatternBlock> = Vec::with_capacity(ch_blocks.len());
        for block in ch_blocks {
            match deduped.last_mut() {
                Some(last) if last.step() == block.step() => *last = block,
                _ => deduped.push(block),
            }
        }

        let mut rows = Vec::with_capacity(deduped.len() * 2);
        for (i, block) in deduped.iter().enumerate() {
            if block.is_empty_cell() {
                continue;
            }
            rows.push(block.row.clone());

            let end = block.step() as i32 + block.length as i32;
            let next_start = deduped.get(i + 1).map(|b| b.step() as i32);
            if end < PATTERN_END && next_start.is_none_or(|s| s > end) {
                rows.push(TrackerRow::note_off(end as u8));
            }
        }
        channels.set(ch, rows);
    }
    channels
}

/// Rebuild a pattern from edited blocks, keeping its id and name.
pub fn compile(pattern: &Pattern, blocks: &[PatternBlock]) -> Pattern {
    pattern.with_channels(blocks_to_rows(blocks))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pattern_with(ch: u8, rows: Vec<TrackerRow>) -> Pattern {
        let mut p = Pattern::new("p", "TEST");
        p.channels.set(ch, rows);
        p
    }

    fn shape(rows: &[TrackerRow]) -> Vec<(u8, String)> {
        rows.iter().map(|r| (r.step, r.pitch.clone())).collect()
    }

    #[test]
    fn melodic_blocks_ring_to_next_event_or_pattern_end() {
        let p = pattern_with(1, vec![
            TrackerRow::note(0, "C-4", 1),
            TrackerRow::note(4, "E-4", 1),
            TrackerRow::note_off(6),
            TrackerRow::note(10, "G-4", 1),
        ]);
        let blocks = rows_to_blocks(&p);
        let lengths: Vec<(u8, u8)> = blocks.iter().map(|b| (b.step(), b.length)).collect();
        assert_eq!(lengths, vec![(0, 4), (4, 2), (10, 54)]);
    }

    #[test]
    fn noise_hits_default_to_one_step() {
        let p = pattern_with(4, vec![
            TrackerRow::note(0, "C-2", 4),
            TrackerRow::note(4, "C-4", 4),
            TrackerRow::note(8, "C-4", 4),
            TrackerRow::note_off(12),
        ]);
        let lengths: Vec<(u8, u8)> = rows_to_blocks(&p).iter().map(|b| (b.step(), b.length)).collect();
        assert_eq!(lengths, vec![(0, 1), (4, 1), (8, 4)]);
    }

    #[test]
    fn rows_past_the_grid_never_become_blocks() {
        let mut p = pattern_with(4, vec![TrackerRow::note(62, "C-4", 4)]);
        if let Some(rows) = p.channels.get_mut(4) {
            rows.push(TrackerRow::note(64, "C-4", 4));
            rows.push(TrackerRow::note(255, "C-4", 4));
        }
        let blocks = rows_to_blocks(&p);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].step(), 62);
    }

    #[test]
    fn end_step_saturates() {
        let block = PatternBlock {
            row: TrackerRow::note(250, "C-4", 1),
            channel: 1,
            length: 20,
        };
        assert_eq!(block.end_step(), u8::MAX);
        assert!(block.covers(1, 255));
    }

    #[test]
    fn compile_inserts_note_offs_only_where_needed() {
        let p = pattern_with(1, vec![TrackerRow::note(0, "C-4", 1)]);
        let mut blocks = rows_to_blocks(&p);
        // runs to the pattern end: nothing to terminate
        assert_eq!(blocks[0].length, 64);
        assert_eq!(shape(blocks_to_rows(&blocks).get(1)), vec![(0, "C-4".to_string())]);

        blocks[0].length = 4;
        let rows = blocks_to_rows(&blocks);
        assert_eq!(shape(rows.get(1)), vec![(0, "C-4".into()), (4, OFF.into())]);
    }

    #[test]
    fn no_note_off_when_the_next_block_starts_at_the_end() {
        let mut a = TrackerRow::note(0, "C-4", 1);
        a.id = "a".into();
        let mut b = TrackerRow::note(4, "D-4", 1);
        b.id = "b".into();
        let blocks = vec![
            PatternBlock { row: a, channel: 1, length: 4 },
            PatternBlock { row: b, channel: 1, length: 2 },
        ];
        let rows = blocks_to_rows(&blocks);
        assert_eq!(shape(rows.get(1)), vec![(0, "C-4".into()), (4, "D-4".into()), (6, OFF.into())]);
    }

    #[test]
    fn round_trip_keeps_the_sounding_structure() {
        let mut p = pattern_with(1, vec![
            TrackerRow::note(0, "C-4", 1),
            TrackerRow::note_off(3),
            TrackerRow::note(8, "G-4", 1),
        ]);
        p.channels.set(4, vec![TrackerRow::note(0, "C-2", 4), TrackerRow::note(16, "C-7", 4)]);

        let before = rows_to_blocks(&p);
        let compiled = compile(&p, &before);
        let after = rows_to_blocks(&compiled);

        let key = |bs: &[PatternBlock]| -> Vec<(u8, u8, u8, String)> {
            bs.iter().map(|b| (b.channel, b.step(), b.length, b.row.pitch.clone())).collect()
        };
        assert_eq!(key(&before), key(&after));
    }

    #[test]
    fn compiling_twice_is_stable() {
        let p = pattern_with(2, vec![
            TrackerRow::note(2, "A-3", 2),
            TrackerRow::note(5, "B-3", 2),
            TrackerRow::note_off(9),
        ]);
        let once = compile(&p, &rows_to_blocks(&p));
        let twice = compile(&once, &rows_to_blocks(&once));
        assert_eq!(shape(once.channels.get(2)), shape(twice.channels.get(2)));
    }

    #[test]
    fn duplicate_starts_keep_the_last_block() {
        let first = PatternBlock { row: TrackerRow::note(3, "C-4", 1), channel: 1, length: 2 };
        let second = PatternBlock { row: TrackerRow::note(3, "F-4", 1), channel: 1, length: 2 };
        let rows = blocks_to_rows(&[first, second]);
        assert_eq!(shape(rows.get(1)), vec![(3, "F-4".into()), (5, OFF.into())]);
    }
}
