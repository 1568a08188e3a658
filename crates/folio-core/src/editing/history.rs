//! Bounded undo/redo history with typing coalescing.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use crate::document::Edit;
use crate::position::Selection;

/// Millisecond time source used to decide whether keystrokes coalesce.
pub trait Clock: Send + Sync {
    /// Milliseconds since an arbitrary fixed origin.
    fn now_ms(&self) -> u64;
}

/// Wall-clock time since the clock was created.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl Default for SystemClock {
    fn default() -> Self {
        Self { origin: Instant::now() }
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        u64::try_from(self.origin.elapsed().as_millis()).unwrap_or(u64::MAX)
    }
}

/// A clock that only moves when told to. Clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<AtomicU64>,
}

impl ManualClock {
    /// A clock at time zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Move the clock forward.
    pub fn advance(&self, ms: u64) {
        self.now.fetch_add(ms, Ordering::SeqCst);
    }

    /// Set the current time.
    pub fn set(&self, ms: u64) {
        self.now.store(ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// One executed command: its edits plus the selection of the pane that ran it.
#[derive(Debug, Clone)]
pub(crate) struct UndoStep {
    pub pane: usize,
    pub edits: Vec<Edit>,
    pub before: Selection,
    pub after: Selection,
}

/// Steps undone and redone together.
#[derive(Debug, Clone)]
pub(crate) struct UndoGroup {
    pub id: usize,
    pub steps: Vec<UndoStep>,
    last_at: u64,
}

#[derive(Debug)]
pub(crate) struct UndoRedoManager {
    undo_stack: Vec<UndoGroup>,
    redo_stack: Vec<UndoGroup>,
    capacity: usize,
    window_ms: u64,
    /// Clean point as an undo stack depth. When `redo_stack` is non-empty it may exceed
    /// `undo_stack.len()`.
    clean_index: Option<usize>,
    next_group_id: usize,
    open_group: bool,
}

impl UndoRedoManager {
    pub fn new(capacity: usize, window_ms: u64) -> Self {
        Self {
            undo_stack: Vec::new(),
            redo_stack: Vec::new(),
            capacity: capacity.max(1),
            window_ms,
            clean_index: Some(0),
            next_group_id: 0,
            open_group: false,
        }
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn undo_depth(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_depth(&self) -> usize {
        self.redo_stack.len()
    }

    #[cfg(test)]
    pub fn open_group_id(&self) -> Option<usize> {
        if self.open_group {
            self.undo_stack.last().map(|g| g.id)
        } else {
            None
        }
    }

    pub fn is_clean(&self) -> bool {
        self.clean_index == Some(self.undo_stack.len())
    }

    pub fn mark_clean(&mut self) {
        self.clean_index = Some(self.undo_stack.len());
        self.end_group();
    }

    pub fn end_group(&mut self) {
        self.open_group = false;
    }

    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
        self.clean_index = None;
        self.open_group = false;
    }

    fn clear_redo_and_adjust_clean(&mut self) {
        if self.redo_stack.is_empty() {
            return;
        }
        // A clean point inside the redo area becomes unreachable.
        if let Some(clean_index) = self.clean_index
            && clean_index > self.undo_stack.len()
        {
            self.clean_index = None;
        }
        self.redo_stack.clear();
    }

    /// Record a step. A `typing` step joins the open group if it continues the previous
    /// step's caret in the same pane within the coalescing window.
    pub fn push_step(&mut self, step: UndoStep, typing: bool, now: u64) -> usize {
        self.clear_redo_and_adjust_clean();

        let window = self.window_ms;
        let clean_here = self.clean_index == Some(self.undo_stack.len());
        if typing
            && self.open_group
            && !clean_here
            && let Some(group) = self.undo_stack.last_mut()
            && let Some(last) = group.steps.last()
            && last.pane == step.pane
            && last.after == step.before
            && now.saturating_sub(group.last_at) <= window
        {
            log::trace!("coalescing typing into undo group {}", group.id);
            group.steps.push(step);
            group.last_at = now;
            return group.id;
        }

        if self.undo_stack.len() >= self.capacity {
            self.undo_stack.remove(0);
            if let Some(clean_index) = self.clean_index {
                self.clean_index = clean_index.checked_sub(1);
            }
        }
        let id = self.next_group_id;
        self.next_group_id = self.next_group_id.wrapping_add(1);
        self.undo_stack.push(UndoGroup {
            id,
            steps: vec![step],
            last_at: now,
        });
        self.open_group = typing;
        log::trace!("new undo group {id} (typing: {typing})");
        id
    }

    pub fn pop_undo_group(&mut self) -> Option<UndoGroup> {
        self.open_group = false;
        self.undo_stack.pop()
    }

    pub fn pop_redo_group(&mut self) -> Option<UndoGroup> {
        self.open_group = false;
        self.redo_stack.pop()
    }

    pub fn push_redo_group(&mut self, group: UndoGroup) {
        self.redo_stack.push(group);
    }

    pub fn push_undo_group(&mut self, group: UndoGroup) {
        self.undo_stack.push(group);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::NodeId;
    use crate::position::Position;

    fn step(pane: usize, from: usize, to: usize) -> UndoStep {
        let p = NodeId::from_raw(1);
        UndoStep {
            pane,
            edits: Vec::new(),
            before: Selection::caret(Position::new(p, from)),
            after: Selection::caret(Position::new(p, to)),
        }
    }

    #[test]
    fn test_typing_coalesces_within_window() {
        let mut history = UndoRedoManager::new(10, 1000);
        let a = history.push_step(step(0, 0, 1), true, 0);
        let b = history.push_step(step(0, 1, 2), true, 900);
        assert_eq!(a, b);
        // Gap longer than the window.
        let c = history.push_step(step(0, 2, 3), true, 2000);
        assert_ne!(b, c);
        // Not at the previous caret.
        let d = history.push_step(step(0, 7, 8), true, 2100);
        assert_ne!(c, d);
        // Another pane.
        let e = history.push_step(step(1, 8, 9), true, 2200);
        assert_ne!(d, e);
        assert_eq!(history.undo_depth(), 4);
    }

    #[test]
    fn test_non_typing_breaks_group() {
        let mut history = UndoRedoManager::new(10, 1000);
        let a = history.push_step(step(0, 0, 1), true, 0);
        let b = history.push_step(step(0, 1, 1), false, 10);
        let c = history.push_step(step(0, 1, 2), true, 20);
        assert!(a != b && b != c);
        assert_eq!(history.open_group_id(), Some(c));
    }

    #[test]
    fn test_capacity_drops_oldest_group() {
        let mut history = UndoRedoManager::new(3, 1000);
        for i in 0..5 {
            history.push_step(step(0, i, i), false, 0);
        }
        assert_eq!(history.undo_depth(), 3);
        let oldest = std::iter::from_fn(|| history.pop_undo_group()).last().unwrap();
        assert_eq!(oldest.id, 2);
    }

    #[test]
    fn test_clean_point_survives_undo_and_redo() {
        let mut history = UndoRedoManager::new(10, 1000);
        history.push_step(step(0, 0, 1), false, 0);
        history.mark_clean();
        assert!(history.is_clean());
        let group = history.pop_undo_group().unwrap();
        assert!(!history.is_clean());
        history.push_redo_group(group);
        let group = history.pop_redo_group().unwrap();
        history.push_undo_group(group);
        assert!(history.is_clean());
    }
}
