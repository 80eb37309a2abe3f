use std::collections::BTreeSet;

use tracing::debug;

use super::wire::CompactNote;
use crate::pipeline::ids::next_row_id;
use crate::pipeline::project::{Instrument, TrackerRow};
use crate::shared::STEPS_PER_PATTERN;

/// Turn one channel of compact notes into tracker rows.
///
/// Notes are taken in step order. Anything off the grid or without a pitch is
/// dropped, and so is a second note on a step that's already taken. A note's
/// declared length becomes an explicit OFF at `step + length` unless another
/// valid note starts exactly there.
pub fn translate_notes(notes: &[CompactNote], channel: u8) -> Vec<TrackerRow> {
    let mut sorted: Vec<&CompactNote> = notes.iter().collect();
    sorted.sort_by_key(|n| n.step().unwrap_or(0));

    let note_starts: BTreeSet<i64> = sorted
        .iter()
        .filter(|n| n.has_pitch())
        .filter_map(|n| n.step())
        .collect();

    let mut rows = Vec::with_capacity(sorted.len() * 2);
    let mut occupied = BTreeSet::new();
    let mut dropped = 0usize;

    for note in sorted {
        let Some(valid) = note.validate() else {
            dropped += 1;
            continue;
        };
        if !occupied.insert(valid.step) {
            dropped += 1;
            continue;
        }

        rows.push(TrackerRow {
            id: next_row_id("ai"),
            step: valid.step,
            pitch: valid.pitch,
            instrument: Instrument::channel_default(channel),
            volume: valid.volume,
            duty_cycle: Some(valid.duty),
            effect: Some(valid.effect),
            arp_notes: valid.arp_notes,
            slide: valid.slide,
            decay: Some(valid.decay),
            panning: Some(0.0),
        });

        let stop = valid.step as usize + valid.length as usize;
        if stop < STEPS_PER_PATTERN
            && !occupied.contains(&(stop as u8))
            && !note_starts.contains(&(stop as i64))
        {
            occupied.insert(stop as u8);
            rows.push(TrackerRow::note_off(stop as u8));
        }
    }

    debug!(channel, input = notes.len(), rows = rows.len(), dropped, "translated notes");
    rows.sort_by_key(|r| r.step);
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::project::DutyCycle;
    use crate::pitch::OFF;

    fn notes(json: &str) -> Vec<CompactNote> {
        serde_json::from_str(json).unwrap()
    }

    fn shape(rows: &[TrackerRow]) -> Vec<(u8, String)> {
        rows.iter().map(|r| (r.step, r.pitch.clone())).collect()
    }

    #[test]
    fn lengths_become_note_offs() {
        let rows = translate_notes(&notes(r#"[{"s": 0, "p": "C-4", "l": 2}, {"s": 4, "p": "E-4", "l": 4}]"#), 1);
        assert_eq!(
            shape(&rows),
            vec![(0, "C-4".into()), (2, OFF.into()), (4, "E-4".into()), (8, OFF.into())]
        );
    }

    #[test]
    fn no_note_off_where_the_next_note_starts() {
        let rows = translate_notes(&notes(r#"[{"s": 2, "p": "D-4", "l": 2}, {"s": 0, "p": "C-4", "l": 2}]"#), 2);
        assert_eq!(shape(&rows), vec![(0, "C-4".into()), (2, "D-4".into()), (4, OFF.into())]);
    }

    #[test]
    fn blank_notes_do_not_block_the_note_off() {
        let rows = translate_notes(&notes(r#"[{"s": 0, "p": "C-4", "l": 4}, {"s": 4, "p": "---"}]"#), 1);
        assert_eq!(shape(&rows), vec![(0, "C-4".into()), (4, OFF.into())]);
    }

    #[test]
    fn drops_invalid_and_duplicate_steps() {
        let rows = translate_notes(
            &notes(r#"[{"s": 70, "p": "C-4"}, {"s": 3, "p": "C-4"}, {"s": 3, "p": "G-4"}, {"p": "A-4"}]"#),
            3,
        );
        assert_eq!(shape(&rows), vec![(3, "C-4".into()), (4, OFF.into())]);
        assert_eq!(rows[0].instrument, Instrument::Sub);
    }

    #[test]
    fn notes_at_the_end_need_no_note_off() {
        let rows = translate_notes(&notes(r#"[{"s": 60, "p": "C-2", "l": 8, "d": "0.125", "dec": 12}]"#), 4);
        assert_eq!(shape(&rows), vec![(60, "C-2".into())]);
        assert_eq!(rows[0].duty_cycle, Some(DutyCycle::Eighth));
        assert_eq!(rows[0].decay, Some(12));
        assert_eq!(rows[0].instrument, Instrument::Kick);
    }
}
