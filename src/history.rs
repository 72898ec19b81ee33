use std::collections::VecDeque;

use crate::document::Document;

pub const DEFAULT_CAPACITY: usize = 100;

/// Bounded linear undo/redo over whole-document snapshots. Snapshots are
/// full deep clones, so every operation is undoable by construction and a
/// pushed snapshot is never mutated afterward.
#[derive(Debug)]
pub struct History {
    past: VecDeque<Document>,
    future: Vec<Document>,
    capacity: usize,
}

impl History {
    pub fn new(capacity: usize) -> Self {
        History {
            past: VecDeque::new(),
            future: Vec::new(),
            capacity,
        }
    }

    pub fn can_undo(&self) -> bool {
        !self.past.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.future.is_empty()
    }

    /// Records the pre-mutation state. Any mutation forks away from the
    /// redo branch, so the redo stack empties; the oldest snapshot is
    /// evicted beyond the bound.
    pub fn push(&mut self, snapshot: Document) {
        if self.past.len() == self.capacity {
            self.past.pop_front();
        }
        self.past.push_back(snapshot);
        self.future.clear();
    }

    /// Trades `current` for the most recent past snapshot, if any.
    pub fn undo(&mut self, current: Document) -> Option<Document> {
        match self.past.pop_back() {
            Some(previous) => {
                self.future.push(current);
                Some(previous)
            }
            None => None,
        }
    }

    pub fn redo(&mut self, current: Document) -> Option<Document> {
        match self.future.pop() {
            Some(next) => {
                self.past.push_back(current);
                Some(next)
            }
            None => None,
        }
    }

    pub fn clear(&mut self) {
        self.past.clear();
        self.future.clear();
    }
}

impl Default for History {
    fn default() -> Self {
        History::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Waypoint;

    fn doc_with_points(n: usize) -> Document {
        let mut doc = Document::new();
        for i in 0..n {
            doc.waypoints.push(Waypoint::new(i as f64, 0.0));
        }
        doc
    }

    #[test]
    fn undo_redo_round_trip() {
        let mut history = History::new(10);
        let v0 = doc_with_points(0);
        let v1 = doc_with_points(1);

        history.push(v0.clone());
        let mut current = v1.clone();

        current = history.undo(current).unwrap();
        assert_eq!(current, v0);
        assert!(history.can_redo());

        current = history.redo(current).unwrap();
        assert_eq!(current, v1);
        assert!(!history.can_redo());
    }

    #[test]
    fn push_clears_redo() {
        let mut history = History::new(10);
        history.push(doc_with_points(0));
        let _ = history.undo(doc_with_points(1)).unwrap();
        assert!(history.can_redo());
        history.push(doc_with_points(2));
        assert!(!history.can_redo());
    }

    #[test]
    fn oldest_snapshot_is_evicted_beyond_the_bound() {
        let mut history = History::new(2);
        history.push(doc_with_points(1));
        history.push(doc_with_points(2));
        history.push(doc_with_points(3));

        let undone = history.undo(doc_with_points(4)).unwrap();
        assert_eq!(undone.waypoints.len(), 3);
        let undone = history.undo(undone).unwrap();
        assert_eq!(undone.waypoints.len(), 2);
        // the first snapshot fell off
        assert!(history.undo(undone).is_none());
    }
}
