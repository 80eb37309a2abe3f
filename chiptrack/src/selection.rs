// The editing session: what is selected, what is being dragged or resized,
// and the clipboard. Every edit ends up as one pure pattern transform from
// `pipeline::mutate` applied to the project's active pattern.

use rand::Rng;
use tracing::debug;

use crate::pipeline::blocks::{self, PatternBlock};
use crate::pipeline::ids::RowId;
use crate::pipeline::mutate::{self, CellSet, IdSet, RandomizeMode};
use crate::pipeline::project::{Pattern, ProjectState};
use crate::shared::{Cell, StepDelta, StepRange, MAX_CHANNEL, MIN_CHANNEL};

#[derive(Clone, Debug)]
pub struct Clipboard {
    pub blocks: Vec<PatternBlock>,
    pub origin: Cell,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DragState {
    pub origin: Cell,
    pub delta: StepDelta,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResizeState {
    pub origin: Cell, // start of the block being resized
    pub initial_length: u8,
    pub current_length: u8,
}

#[derive(Debug, Default)]
pub struct EditSession {
    pub selected_ids: IdSet,
    pub selecting: bool,
    pub anchor: Option<Cell>,
    pub current: Option<Cell>,
    pub drag: Option<DragState>,
    pub resize: Option<ResizeState>,
    pub copy_key_active: bool,
    pub clipboard: Option<Clipboard>,
}

impl EditSession {
    pub fn new() -> Self {
        Self::default()
    }

    // -- selection --

    /// Cells covered by the explicit id selection plus the box.
    pub fn selected_cells(&self, pattern: Option<&Pattern>) -> CellSet {
        let mut cells = self.box_cells();
        if let Some(p) = pattern {
            for (ch, rows) in p.channels.iter() {
                for row in rows.iter().filter(|r| self.selected_ids.contains(&r.id)) {
                    cells.insert(Cell::new(ch, row.step));
                }
            }
        }
        cells
    }

    // just the anchor/current rectangle
    fn box_cells(&self) -> CellSet {
        let mut cells = CellSet::new();
        if let (Some(a), Some(b)) = (self.anchor, self.current) {
            for ch in a.ch.min(b.ch)..=a.ch.max(b.ch) {
                for step in a.step.min(b.step)..=a.step.max(b.step) {
                    cells.insert(Cell::new(ch, step));
                }
            }
        }
        cells
    }

    pub fn selected_range(&self, pattern: Option<&Pattern>) -> Option<StepRange> {
        let cells = self.selected_cells(pattern);
        let min = cells.iter().map(|c| c.step).min()?;
        let max = cells.iter().map(|c| c.step).max()?;
        Some(StepRange::new(min, max))
    }

    pub fn start_selection(&mut self, at: Cell) {
        self.selecting = true;
        self.selected_ids.clear();
        self.anchor = Some(at);
        self.current = Some(at);
    }

    pub fn update_selection(&mut self, at: Cell) {
        if self.selecting {
            self.current = Some(at);
        }
    }

    pub fn end_selection(&mut self) {
        self.selecting = false;
    }

    /// Select whole columns, all four channels.
    pub fn select_column_range(&mut self, start_step: u8, end_step: u8) {
        self.selecting = true;
        self.selected_ids.clear();
        self.anchor = Some(Cell::new(MIN_CHANNEL as u8, start_step));
        self.current = Some(Cell::new(MAX_CHANNEL as u8, end_step));
    }

    pub fn toggle_id(&mut self, id: &RowId) {
        if !self.selected_ids.remove(id) {
            self.selected_ids.insert(id.clone());
        }
        self.anchor = None;
        self.current = None;
    }

    pub fn clear(&mut self) {
        self.selected_ids.clear();
        self.anchor = None;
        self.current = None;
    }

    /// Ids of the selected rows plus every block starting inside the box.
    fn ids_in_selection(&self, pattern: &Pattern) -> IdSet {
        let cells = self.selected_cells(Some(pattern));
        let mut ids = self.selected_ids.clone();
        ids.extend(
            blocks::rows_to_blocks(pattern)
                .into_iter()
                .filter(|b| cells.contains(&Cell::new(b.channel, b.step())))
                .map(|b| b.row.id),
        );
        ids
    }

    fn shift_box(&mut self, delta: StepDelta) {
        self.anchor = self.anchor.map(|c| c.shifted(delta));
        self.current = self.current.map(|c| c.shifted(delta));
    }

    // -- drag --

    /// Grab a note. `multi` toggles it in the id selection instead of replacing it.
    pub fn start_drag(&mut self, pattern: Option<&Pattern>, at: Cell, id: &RowId, multi: bool) {
        if multi {
            self.toggle_id(id);
        } else if !self.selected_ids.contains(id) {
            let in_box = self.selected_cells(pattern).contains(&at);
            if !in_box {
                self.selected_ids = IdSet::from([id.clone()]);
                self.anchor = None;
                self.current = None;
            } else if let Some(p) = pattern {
                let cells = self.selected_cells(Some(p));
                self.selected_ids = blocks::rows_to_blocks(p)
                    .into_iter()
                    .filter(|b| cells.contains(&Cell::new(b.channel, b.step())))
                    .map(|b| b.row.id)
                    .collect();
            }
        }
        self.drag = Some(DragState {
            origin: at,
            delta: StepDelta::default(),
        });
    }

    pub fn update_drag(&mut self, at: Cell) {
        if let Some(drag) = self.drag.as_mut() {
            drag.delta = StepDelta::between(drag.origin, at);
        }
    }

    /// Drop the dragged notes (or copies of them) and move the box along.
    pub fn commit_drag(&mut self, project: &mut ProjectState, copy: bool) {
        let Some(drag) = self.drag.take() else { return };
        let Some(pattern) = project.active_pattern() else { return };

        let mut ids = self.selected_ids.clone();
        if ids.is_empty() {
            ids = self.ids_in_selection(pattern);
        }
        if ids.is_empty() {
            return;
        }
        debug!(notes = ids.len(), delta = ?drag.delta, copy, "committing drag");
        project.update_active_pattern(|p| mutate::apply_move(p, &ids, drag.delta, copy));
        if self.anchor.is_some() && self.current.is_some() {
            self.shift_box(drag.delta);
        }
    }

    pub fn cancel_drag(&mut self) {
        self.drag = None;
    }

    /// Arrow-key move; with nothing selected it just moves the cursor.
    pub fn move_selection(&mut self, project: &mut ProjectState, delta: StepDelta) {
        let Some(pattern) = project.active_pattern() else { return };
        let ids = self.ids_in_selection(pattern);

        if !ids.is_empty() {
            let copy = self.copy_key_active;
            project.update_active_pattern(|p| mutate::apply_move(p, &ids, delta, copy));
            if self.anchor.is_some() && self.current.is_some() {
                self.shift_box(delta);
            }
        } else if let Some(anchor) = self.anchor {
            self.anchor = Some(anchor.shifted(delta));
            self.current = None;
        }
    }

    // -- resize --

    pub fn start_resize(&mut self, pattern: Option<&Pattern>, id: &RowId) {
        let Some(p) = pattern else { return };
        if let Some(block) = blocks::rows_to_blocks(p).into_iter().find(|b| &b.row.id == id) {
            self.resize = Some(ResizeState {
                origin: Cell::new(block.channel, block.step()),
                initial_length: block.length,
                current_length: block.length,
            });
        }
    }

    pub fn update_resize(&mut self, at: Cell) {
        if let Some(r) = self.resize.as_mut() {
            let length = (at.step as i32 - r.origin.step as i32 + 1).max(1);
            r.current_length = length.min(u8::MAX as i32) as u8;
        }
    }

    pub fn commit_resize(&mut self, project: &mut ProjectState) {
        let Some(r) = self.resize.take() else { return };
        project.update_active_pattern(|p| {
            mutate::apply_resize(p, r.origin.ch, r.origin.step, r.current_length as i32)
        });
    }

    // -- edits --

    pub fn delete_selection(&mut self, project: &mut ProjectState) {
        let cells = self.selected_cells(project.active_pattern());
        let ids = self.selected_ids.clone();
        project.update_active_pattern(|p| mutate::apply_delete(p, &ids, &cells));
        self.clear();
    }

    /// Capture the selection's bounding box: the box cells plus the full extent
    /// of every id-selected block. With a box, cells outside it that no selected
    /// block covers are skipped. Cells where no block starts (gaps, sustain
    /// tails) are recorded as EMPTY_CELL placeholders.
    pub fn copy_selection(&mut self, pattern: Option<&Pattern>) {
        let Some(p) = pattern else { return };
        let box_cells = self.box_cells();
        let all = blocks::rows_to_blocks(p);
        let picked: Vec<&PatternBlock> = all.iter().filter(|b| self.selected_ids.contains(&b.row.id)).collect();

        let corners: Vec<Cell> = box_cells
            .iter()
            .copied()
            .chain(picked.iter().flat_map(|b| [Cell::new(b.channel, b.step()), Cell::new(b.channel, b.end_step())]))
            .collect();
        let (Some(min_ch), Some(max_ch)) = (corners.iter().map(|c| c.ch).min(), corners.iter().map(|c| c.ch).max())
        else {
            return;
        };
        let min_step = corners.iter().map(|c| c.step).min().unwrap_or(0);
        let max_step = corners.iter().map(|c| c.step).max().unwrap_or(0);

        let mut captured = Vec::new();
        for ch in min_ch..=max_ch {
            for step in min_step..=max_step {
                let in_selection = box_cells.is_empty()
                    || box_cells.contains(&Cell::new(ch, step))
                    || picked.iter().any(|b| b.covers(ch, step));
                if !in_selection {
                    continue;
                }
                match all.iter().find(|b| b.channel == ch && b.step() == step) {
                    Some(block) => captured.push(block.clone()),
                    None => captured.push(PatternBlock::empty_cell(ch, step)),
                }
            }
        }
        debug!(cells = captured.len(), "copied selection");
        self.clipboard = Some(Clipboard {
            blocks: captured,
            origin: Cell::new(min_ch, min_step),
        });
    }

    pub fn cut_selection(&mut self, project: &mut ProjectState) {
        self.copy_selection(project.active_pattern());
        self.delete_selection(project);
    }

    /// Paste at the selection anchor, or at ch1 step 0 without one.
    pub fn paste(&mut self, project: &mut ProjectState) {
        let Some(clipboard) = self.clipboard.as_ref() else { return };
        let target = self.anchor.unwrap_or(Cell::new(MIN_CHANNEL as u8, 0));
        project.update_active_pattern(|p| mutate::apply_paste(p, &clipboard.blocks, target, clipboard.origin));
    }

    pub fn transpose(&mut self, project: &mut ProjectState, semitones: i32) {
        let Some(pattern) = project.active_pattern() else { return };
        let ids = self.ids_in_selection(pattern);
        if ids.is_empty() {
            return;
        }
        project.update_active_pattern(|p| mutate::apply_transpose(p, &ids, semitones));
    }

    pub fn reverse(&mut self, project: &mut ProjectState) {
        let cells = self.selected_cells(project.active_pattern());
        if cells.is_empty() {
            return;
        }
        project.update_active_pattern(|p| mutate::apply_reverse(p, &cells));
    }

    pub fn interpolate(&mut self, project: &mut ProjectState) {
        let cells = self.selected_cells(project.active_pattern());
        if cells.is_empty() {
            return;
        }
        project.update_active_pattern(|p| mutate::apply_interpolate(p, &cells));
    }

    pub fn randomize(&mut self, project: &mut ProjectState, mode: RandomizeMode, rng: &mut impl Rng) {
        let cells = self.selected_cells(project.active_pattern());
        if cells.is_empty() {
            return;
        }
        project.update_active_pattern(|p| mutate::apply_randomize(p, &cells, mode, rng));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::project::TrackerRow;
    use crate::pitch::OFF;

    fn project_with(ch: u8, rows: Vec<TrackerRow>) -> ProjectState {
        let mut project = ProjectState::new_project();
        project.update_active_pattern(|p| {
            let mut channels = p.channels.clone();
            channels.set(ch, rows);
            p.with_channels(channels)
        });
        project
    }

    fn row(id: &str, step: u8, pitch: &str) -> TrackerRow {
        let mut r = TrackerRow::note(step, pitch, 1);
        r.id = id.into();
        r
    }

    fn shape(project: &ProjectState, ch: u8) -> Vec<(u8, String)> {
        project
            .active_pattern()
            .map(|p| p.channels.get(ch).iter().map(|r| (r.step, r.pitch.clone())).collect())
            .unwrap_or_default()
    }

    #[test]
    fn box_selection_covers_the_rectangle() {
        let mut session = EditSession::new();
        session.start_selection(Cell::new(2, 10));
        session.update_selection(Cell::new(1, 8));
        session.end_selection();

        let cells = session.selected_cells(None);
        assert_eq!(cells.len(), 6);
        assert_eq!(session.selected_range(None), Some(StepRange::new(8, 10)));

        // updates after the mouse is released are ignored
        session.update_selection(Cell::new(4, 63));
        assert_eq!(session.selected_cells(None).len(), 6);
    }

    #[test]
    fn drag_moves_the_box_with_the_notes() {
        let mut project = project_with(1, vec![row("a", 0, "C-4"), TrackerRow::note_off(2)]);
        let mut session = EditSession::new();
        session.start_selection(Cell::new(1, 0));
        session.update_selection(Cell::new(1, 1));
        session.end_selection();

        let pattern = project.active_pattern().cloned();
        session.start_drag(pattern.as_ref(), Cell::new(1, 0), &RowId::from("a"), false);
        session.update_drag(Cell::new(2, 4));
        session.commit_drag(&mut project, false);

        assert!(shape(&project, 1).is_empty());
        assert_eq!(shape(&project, 2), vec![(4, "C-4".into()), (6, OFF.into())]);
        assert_eq!(session.anchor, Some(Cell::new(2, 4)));
        assert!(session.drag.is_none());
    }

    #[test]
    fn resize_follows_the_pointer() {
        let mut project = project_with(1, vec![row("a", 4, "C-4"), TrackerRow::note_off(5)]);
        let mut session = EditSession::new();
        let pattern = project.active_pattern().cloned();
        session.start_resize(pattern.as_ref(), &RowId::from("a"));
        session.update_resize(Cell::new(1, 7));
        assert_eq!(session.resize.map(|r| r.current_length), Some(4));
        session.update_resize(Cell::new(1, 0));
        assert_eq!(session.resize.map(|r| r.current_length), Some(1));
        session.update_resize(Cell::new(1, 9));
        session.commit_resize(&mut project);

        assert_eq!(shape(&project, 1), vec![(4, "C-4".into()), (10, OFF.into())]);
    }

    #[test]
    fn copy_paste_reproduces_the_shape() {
        let mut project = project_with(1, vec![
            row("a", 0, "C-4"),
            TrackerRow::note_off(1),
            row("b", 3, "E-4"),
            TrackerRow::note_off(4),
            row("old", 18, "A-5"),
            TrackerRow::note_off(19),
        ]);
        let mut session = EditSession::new();
        session.start_selection(Cell::new(1, 0));
        session.update_selection(Cell::new(1, 3));
        session.end_selection();
        session.copy_selection(project.active_pattern());

        let clip = session.clipboard.as_ref().map(|c| c.blocks.len());
        assert_eq!(clip, Some(4));

        session.start_selection(Cell::new(1, 16));
        session.end_selection();
        session.paste(&mut project);

        let after: Vec<(u8, String)> = shape(&project, 1).into_iter().filter(|(s, _)| *s >= 16).collect();
        assert_eq!(after, vec![(16, "C-4".into()), (17, OFF.into()), (19, "E-4".into()), (20, OFF.into())]);
    }

    #[test]
    fn copying_picked_notes_takes_their_whole_extent() {
        let project = project_with(1, vec![
            row("a", 0, "C-4"),
            TrackerRow::note_off(2),
            row("b", 4, "E-4"),
            TrackerRow::note_off(6),
        ]);
        let mut session = EditSession::new();
        session.toggle_id(&RowId::from("a"));
        session.toggle_id(&RowId::from("b"));
        session.copy_selection(project.active_pattern());

        let Some(clipboard) = session.clipboard.as_ref() else { panic!("nothing copied") };
        assert_eq!(clipboard.origin, Cell::new(1, 0));
        let captured: Vec<(u8, bool)> = clipboard.blocks.iter().map(|b| (b.step(), b.is_empty_cell())).collect();
        assert_eq!(captured, vec![(0, false), (1, true), (2, true), (3, true), (4, false), (5, true)]);
    }

    #[test]
    fn cut_removes_and_keeps_a_clipboard() {
        let mut project = project_with(1, vec![row("a", 0, "C-4"), TrackerRow::note_off(4)]);
        let mut session = EditSession::new();
        session.toggle_id(&RowId::from("a"));
        session.cut_selection(&mut project);

        assert_eq!(shape(&project, 1), vec![(4, OFF.into())]);
        assert!(session.clipboard.is_some());
        assert!(session.selected_ids.is_empty());
    }

    #[test]
    fn transpose_uses_the_box() {
        let mut project = project_with(1, vec![row("a", 0, "C-4"), row("b", 8, "C-4")]);
        let mut session = EditSession::new();
        session.start_selection(Cell::new(1, 0));
        session.end_selection();
        session.transpose(&mut project, -12);

        assert_eq!(shape(&project, 1), vec![(0, "C-3".into()), (8, "C-4".into())]);
    }

    #[test]
    fn arrow_moves_without_notes_only_move_the_cursor() {
        let mut project = ProjectState::new_project();
        let mut session = EditSession::new();
        session.start_selection(Cell::new(1, 0));
        session.end_selection();
        session.move_selection(&mut project, StepDelta::new(1, 2));

        assert_eq!(session.anchor, Some(Cell::new(2, 2)));
        assert_eq!(session.current, None);
        assert!(project.history.is_empty());
    }
}
