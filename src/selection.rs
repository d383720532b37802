use std::collections::BTreeSet;

use crate::RecordId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionMode {
    Single,
    Multi,
}

/// Tracks selected record ids under an explicit selection policy.
///
/// Keyed by record id, never by tile slot: a selected record keeps its
/// status across eviction and re-materialization. Every mutating call
/// returns the full resulting set (sorted) when it changed, so the caller
/// can emit exactly one notification per mutation.
#[derive(Debug)]
pub struct SelectionController {
    mode: SelectionMode,
    selected: BTreeSet<RecordId>,
}

impl SelectionController {
    pub fn new(mode: SelectionMode) -> Self {
        Self {
            mode,
            selected: BTreeSet::new(),
        }
    }

    pub fn mode(&self) -> SelectionMode {
        self.mode
    }

    /// Switching policy always resets the selection; no silent carry-over.
    /// Returns the (empty) set if anything was cleared.
    pub fn set_mode(&mut self, mode: SelectionMode) -> Option<Vec<RecordId>> {
        let changed = !self.selected.is_empty();
        self.mode = mode;
        self.selected.clear();
        changed.then(Vec::new)
    }

    /// Apply a primary click: replace in single-select, toggle in
    /// multi-select.
    pub fn click(&mut self, id: RecordId) -> Vec<RecordId> {
        match self.mode {
            SelectionMode::Single => {
                self.selected.clear();
                self.selected.insert(id);
            }
            SelectionMode::Multi => {
                if !self.selected.remove(&id) {
                    self.selected.insert(id);
                }
            }
        }
        self.snapshot()
    }

    pub fn select_all<I: IntoIterator<Item = RecordId>>(&mut self, ids: I) -> Vec<RecordId> {
        self.selected = ids.into_iter().collect();
        self.snapshot()
    }

    pub fn clear(&mut self) -> Option<Vec<RecordId>> {
        let changed = !self.selected.is_empty();
        self.selected.clear();
        changed.then(Vec::new)
    }

    pub fn is_selected(&self, id: RecordId) -> bool {
        self.selected.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.selected.len()
    }

    pub fn is_empty(&self) -> bool {
        self.selected.is_empty()
    }

    pub fn snapshot(&self) -> Vec<RecordId> {
        self.selected.iter().copied().collect()
    }
}
