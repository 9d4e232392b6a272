//! Snapshot undo/redo
//!
//! Every mutating operation pushes a snapshot of the state *before* the
//! mutation. The bottom entry is the state right after the document was
//! loaded and is never popped.

use crate::annotation::{AnnotationId, AnnotationStore};
use pagemark_engine::Rotation;
use std::collections::{BTreeMap, VecDeque};

/// Restorable editor state
#[derive(Debug, Clone, PartialEq)]
pub struct EditorSnapshot {
    pub annotations: AnnotationStore,
    pub current_page: u32,
    pub rotations: BTreeMap<u32, Rotation>,
    pub selected: Option<AnnotationId>,
    /// Name of the operation that follows this snapshot
    pub label: String,
}

/// Bounded undo stack over a floor entry, plus a redo stack
#[derive(Debug, Clone)]
pub struct UndoHistory<S> {
    undo_stack: VecDeque<S>,
    redo_stack: Vec<S>,
    max_depth: usize,
}

impl<S: Clone> UndoHistory<S> {
    /// `initial` becomes the floor; `max_depth` bounds the entries above it
    pub fn new(initial: S, max_depth: usize) -> Self {
        let mut undo_stack = VecDeque::with_capacity(max_depth.max(1) + 1);
        undo_stack.push_back(initial);
        Self { undo_stack, redo_stack: Vec::new(), max_depth: max_depth.max(1) }
    }

    /// Record the state preceding a mutation
    pub fn push(&mut self, snapshot: S) {
        self.redo_stack.clear();
        self.undo_stack.push_back(snapshot);
        while self.undo_stack.len() > self.max_depth + 1 {
            // Index 0 is the floor
            self.undo_stack.remove(1);
        }
    }

    /// State to restore, taking `current` onto the redo stack
    pub fn undo(&mut self, current: S) -> Option<S> {
        if self.undo_stack.len() <= 1 {
            return None;
        }
        let previous = self.undo_stack.pop_back()?;
        self.redo_stack.push(current);
        Some(previous)
    }

    /// State to restore, taking `current` back onto the undo stack
    pub fn redo(&mut self, current: S) -> Option<S> {
        let next = self.redo_stack.pop()?;
        self.undo_stack.push_back(current);
        Some(next)
    }

    pub fn can_undo(&self) -> bool {
        self.undo_stack.len() > 1
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    /// Entries that can still be undone
    pub fn undo_len(&self) -> usize {
        self.undo_stack.len() - 1
    }

    pub fn redo_len(&self) -> usize {
        self.redo_stack.len()
    }

    /// State recorded when the history was created
    pub fn floor(&self) -> Option<&S> {
        self.undo_stack.front()
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Forget everything and start over from `initial`
    pub fn reset(&mut self, initial: S) {
        self.undo_stack.clear();
        self.undo_stack.push_back(initial);
        self.redo_stack.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_floor_is_never_popped() {
        let mut history = UndoHistory::new(0, 20);

        assert!(!history.can_undo());
        assert_eq!(history.undo(5), None);
        assert!(!history.can_redo(), "failed undo must not feed redo");
    }

    #[test]
    fn test_undo_returns_pre_mutation_state() {
        let mut history = UndoHistory::new(0, 20);
        // State 0 -> 1 -> 2
        history.push(0);
        history.push(1);

        assert_eq!(history.undo(2), Some(1));
        assert_eq!(history.undo(1), Some(0));
        assert_eq!(history.undo(0), None);
    }

    #[test]
    fn test_redo_mirrors_undo() {
        let mut history = UndoHistory::new(0, 20);
        history.push(0);
        history.push(1);

        let restored = history.undo(2).expect("undo");
        assert_eq!(history.redo(restored), Some(2));
        assert_eq!(history.undo_len(), 2);
        assert!(!history.can_redo());
    }

    #[test]
    fn test_push_clears_redo() {
        let mut history = UndoHistory::new(0, 20);
        history.push(0);
        history.undo(1);
        assert!(history.can_redo());

        history.push(0);
        assert!(!history.can_redo());
    }

    #[test]
    fn test_depth_evicts_oldest_above_floor() {
        let mut history = UndoHistory::new(-1, 3);
        for state in 0..5 {
            history.push(state);
        }

        assert_eq!(history.undo_len(), 3);
        assert_eq!(history.floor(), Some(&-1));
        assert_eq!(history.undo(5), Some(4));
        assert_eq!(history.undo(4), Some(3));
        assert_eq!(history.undo(3), Some(2));
        assert_eq!(history.undo(2), None);
    }

    #[test]
    fn test_reset() {
        let mut history = UndoHistory::new(0, 2);
        history.push(0);
        history.reset(9);

        assert!(!history.can_undo());
        assert_eq!(history.floor(), Some(&9));
    }
}
