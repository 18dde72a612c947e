//! Selection manager.
//!
//! Selection is scoped to the current directory: only its direct children
//! can be selected, and anything that leaves it is dropped on the next
//! reconcile.

use std::collections::HashSet;

use crate::tree::{NodeId, TreeIndex};

/// Selected nodes of the current directory.
#[derive(Debug, Clone, Default)]
pub struct Selection {
    selected: Vec<NodeId>,
}

impl Selection {
    /// Create an empty selection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Selected ids in selection order.
    pub fn ids(&self) -> &[NodeId] {
        &self.selected
    }

    /// Check if `id` is selected.
    pub fn contains(&self, id: &NodeId) -> bool {
        self.selected.contains(id)
    }

    /// Number of selected nodes.
    pub fn len(&self) -> usize {
        self.selected.len()
    }

    /// Check if nothing is selected.
    pub fn is_empty(&self) -> bool {
        self.selected.is_empty()
    }

    /// Clear the selection.
    pub fn clear(&mut self) {
        self.selected.clear();
    }

    /// Deselect a single node.
    pub fn remove(&mut self, id: &NodeId) {
        self.selected.retain(|s| s != id);
    }

    /// Flip membership of `id`.
    ///
    /// Has no effect unless `id` is a child of `current`. Returns whether
    /// the node is selected afterwards.
    pub fn toggle(&mut self, id: &NodeId, current: Option<&NodeId>, index: &TreeIndex) -> bool {
        if !in_directory(id, current, index) {
            return false;
        }
        if self.contains(id) {
            self.remove(id);
            false
        } else {
            self.selected.push(id.clone());
            true
        }
    }

    /// Replace the selection with `ids`.
    ///
    /// Unless `allow_outside` is set, ids that are not children of
    /// `current` are dropped. Duplicates are kept once.
    pub fn set_exclusive(
        &mut self,
        ids: &[NodeId],
        allow_outside: bool,
        current: Option<&NodeId>,
        index: &TreeIndex,
    ) {
        self.selected.clear();
        for id in ids {
            if self.contains(id) {
                continue;
            }
            if allow_outside || in_directory(id, current, index) {
                self.selected.push(id.clone());
            }
        }
    }

    /// Select every child of `current`, or clear if anything is selected.
    pub fn toggle_all(&mut self, current: Option<&NodeId>, index: &TreeIndex) {
        if !self.selected.is_empty() {
            self.selected.clear();
            return;
        }
        self.selected = index
            .sorted_children(current)
            .into_iter()
            .map(|n| n.id.clone())
            .collect();
    }

    /// Drop ids that vanished or are no longer children of `current`.
    ///
    /// Run after every tree update and every directory change.
    pub fn reconcile(&mut self, current: Option<&NodeId>, index: &TreeIndex) {
        self.selected.retain(|id| in_directory(id, current, index));
    }

    /// Union of the descendants of every selected node, in pre-order.
    ///
    /// Selected nodes themselves are not included.
    pub fn nested(&self, index: &TreeIndex) -> Vec<NodeId> {
        let selected: HashSet<&NodeId> = self.selected.iter().collect();
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for id in &self.selected {
            for node in index.descendants(id) {
                if !selected.contains(&node.id) && seen.insert(node.id.clone()) {
                    out.push(node.id.clone());
                }
            }
        }
        out
    }

    /// Human-readable summary, e.g. `"2 selected (+5 nested)"`.
    pub fn summary(&self, index: &TreeIndex) -> String {
        let nested = self.nested(index).len();
        if nested == 0 {
            format!("{} selected", self.selected.len())
        } else {
            format!("{} selected (+{} nested)", self.selected.len(), nested)
        }
    }
}

fn in_directory(id: &NodeId, current: Option<&NodeId>, index: &TreeIndex) -> bool {
    index.get(id).is_some_and(|n| n.is_child_of(current))
}
