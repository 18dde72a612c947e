//! Tree model for Fallcrate.
//!
//! This module keeps a flat collection of file/folder records behaving like
//! a well-formed tree:
//! - Node types and ids
//! - A per-snapshot lookup index
//! - Invariant repair after every pushed update
//! - Naming and placement checks

pub(crate) mod index;
mod naming;
mod node;
mod repair;

pub use index::{listing_order, TreeIndex};
pub use naming::{
    has_name_conflict, is_ancestor, is_type_compatible, unique_name_for, validate_name,
    DEFAULT_MAX_SUFFIX_ATTEMPTS,
};
pub use node::{FileNode, NewNode, NodeId, NodeKind};
pub use repair::{repair, CorrectiveMove, RepairReason, Repaired};

/// Maximum length for a node name (in characters).
pub const MAX_NAME_LENGTH: usize = 255;

/// A repaired, versioned view of the node collection.
///
/// Replaced wholesale on every push; readers borrow the latest one.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    version: u64,
    index: TreeIndex,
}

impl Snapshot {
    /// Create a snapshot from already-repaired nodes.
    pub fn new(version: u64, nodes: Vec<FileNode>) -> Self {
        Self {
            version,
            index: TreeIndex::new(nodes),
        }
    }

    /// Monotonic version, bumped on every push.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// The lookup index over this snapshot.
    pub fn index(&self) -> &TreeIndex {
        &self.index
    }
}
