//! Full-snapshot undo/redo history.
//!
//! `past` always holds at least one snapshot; its last entry is the current
//! document. `future` holds undone snapshots, most recently undone first.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use super::tree::BlockTree;

/// A full copy of the block collection at one point in edit history
pub type Snapshot = BlockTree;

/// History limits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// Maximum number of past snapshots kept; `None` = unbounded.
    /// At least one snapshot is always retained.
    pub max_entries: Option<usize>,
}

impl HistoryConfig {
    pub fn bounded(max_entries: usize) -> Self {
        Self {
            max_entries: Some(max_entries),
        }
    }
}

#[derive(Debug, Clone)]
pub struct History {
    past: Vec<Snapshot>,
    future: VecDeque<Snapshot>,
    config: HistoryConfig,
}

impl History {
    /// Start a history at `initial`
    pub fn new(initial: Snapshot, config: HistoryConfig) -> Self {
        Self {
            past: vec![initial],
            future: VecDeque::new(),
            config,
        }
    }

    /// Drop all entries and restart at `initial`
    pub fn reset(&mut self, initial: Snapshot) {
        self.past.clear();
        self.past.push(initial);
        self.future.clear();
    }

    /// Record a committed change and discard the redo stack
    pub fn commit(&mut self, snapshot: Snapshot) {
        self.past.push(snapshot);
        self.future.clear();

        let limit = self.config.max_entries.unwrap_or(usize::MAX).max(1);
        if self.past.len() > limit {
            let excess = self.past.len() - limit;
            self.past.drain(..excess);
        }
    }

    /// Step back one entry, returning the new current snapshot.
    ///
    /// No-op (`None`) when only one snapshot remains.
    pub fn undo(&mut self) -> Option<&Snapshot> {
        if self.past.len() <= 1 {
            return None;
        }
        let undone = self.past.pop()?;
        self.future.push_front(undone);
        self.past.last()
    }

    /// Re-apply the most recently undone entry
    pub fn redo(&mut self) -> Option<&Snapshot> {
        let redone = self.future.pop_front()?;
        self.past.push(redone);
        self.past.last()
    }

    pub fn can_undo(&self) -> bool {
        self.past.len() > 1
    }

    pub fn can_redo(&self) -> bool {
        !self.future.is_empty()
    }

    /// The snapshot history currently points at
    pub fn current(&self) -> Option<&Snapshot> {
        self.past.last()
    }

    pub fn past_len(&self) -> usize {
        self.past.len()
    }

    pub fn future_len(&self) -> usize {
        self.future.len()
    }
}

impl Default for History {
    fn default() -> Self {
        Self::new(BlockTree::new(), HistoryConfig::default())
    }
}
