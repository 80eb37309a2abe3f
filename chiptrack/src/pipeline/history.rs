use std::collections::VecDeque;

use super::project::{Pattern, PatternClip};

pub const MAX_HISTORY: usize = 50;

/// Everything undo can roll back. Selection and playback are not part of it.
#[derive(Clone, Debug, PartialEq)]
pub struct Snapshot {
    pub patterns: Vec<Pattern>,
    pub arrangement: Vec<String>,
    pub bpm: f64,
    pub custom_clips: Vec<PatternClip>,
}

/// Bounded stack of snapshots taken before each change; the oldest falls off.
#[derive(Clone, Debug, Default)]
pub struct History {
    undos: VecDeque<Snapshot>,
}

impl History {
    pub fn push(&mut self, snapshot: Snapshot) {
        if self.undos.len() == MAX_HISTORY {
            self.undos.pop_front();
        }
        self.undos.push_back(snapshot);
    }

    pub fn pop(&mut self) -> Option<Snapshot> {
        self.undos.pop_back()
    }

    pub fn has_undo(&self) -> bool {
        !self.undos.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.undos.is_empty()
    }

    pub fn len(&self) -> usize {
        self.undos.len()
    }

    pub fn clear(&mut self) {
        self.undos.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snap(bpm: f64) -> Snapshot {
        Snapshot {
            patterns: Vec::new(),
            arrangement: Vec::new(),
            bpm,
            custom_clips: Vec::new(),
        }
    }

    #[test]
    fn should_undo_in_reverse_order() {
        let mut history = History::default();
        history.push(snap(100.0));
        history.push(snap(120.0));

        assert!(history.has_undo());
        assert_eq!(history.pop().map(|s| s.bpm), Some(120.0));
        assert_eq!(history.pop().map(|s| s.bpm), Some(100.0));
        assert_eq!(history.pop(), None);
    }

    #[test]
    fn drops_oldest_past_the_limit() {
        let mut history = History::default();
        for i in 0..(MAX_HISTORY + 5) {
            history.push(snap(i as f64));
        }
        assert_eq!(history.len(), MAX_HISTORY);

        let mut oldest = None;
        while let Some(s) = history.pop() {
            oldest = Some(s.bpm);
        }
        assert_eq!(oldest, Some(5.0));
    }
}
