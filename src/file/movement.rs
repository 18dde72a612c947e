//! Move engine.
//!
//! Validated re-parenting of one or more nodes. Corrective moves from the
//! repair pass go through the same request path without validation.

use std::collections::HashSet;

use tracing::{debug, warn};

use super::outcome::BatchOutcome;
use crate::store::MetadataStore;
use crate::tree::{
    has_name_conflict, is_ancestor, is_type_compatible, CorrectiveMove, FileNode, NodeId,
    TreeIndex,
};
use crate::{FallcrateError, Result};

/// Moves nodes within one snapshot.
pub struct MoveEngine<'a> {
    metadata: &'a dyn MetadataStore,
    index: &'a TreeIndex,
}

impl<'a> MoveEngine<'a> {
    /// Create a new MoveEngine over a snapshot index.
    pub fn new(metadata: &'a dyn MetadataStore, index: &'a TreeIndex) -> Self {
        Self { metadata, index }
    }

    /// Check whether `id` may be moved under `destination`.
    ///
    /// Checks run in order: unknown node, unknown destination, sibling
    /// name conflict, circular move, non-directory destination.
    pub fn validate(&self, id: &NodeId, destination: Option<&NodeId>) -> Result<&'a FileNode> {
        let node = self
            .index
            .get(id)
            .ok_or_else(|| FallcrateError::NotFound(format!("node {id}")))?;

        if let Some(dest) = destination {
            if !self.index.contains(dest) {
                return Err(FallcrateError::NotFound(format!("destination {dest}")));
            }
        }

        if has_name_conflict(&node.name, Some(id), destination, self.index) {
            return Err(FallcrateError::NameConflict {
                name: node.name.clone(),
            });
        }

        if is_ancestor(id, destination, self.index) {
            return Err(FallcrateError::CircularMove {
                name: node.name.clone(),
            });
        }

        if !is_type_compatible(destination, self.index) {
            return Err(FallcrateError::InvalidDestination {
                name: node.name.clone(),
            });
        }

        Ok(node)
    }

    /// Move every id under `destination`, each independently.
    ///
    /// A name taken by an earlier id of the same batch counts as a
    /// conflict for later ones.
    pub async fn move_nodes(&self, ids: &[NodeId], destination: Option<&NodeId>) -> BatchOutcome {
        let mut outcome = BatchOutcome::new();
        let mut claimed: HashSet<String> = HashSet::new();

        for id in ids {
            let node = match self.validate(id, destination) {
                Ok(node) => node,
                Err(e) => {
                    debug!(node = %id, error = %e, "move rejected");
                    outcome.failure(id.clone(), e);
                    continue;
                }
            };

            if node.is_child_of(destination) {
                outcome.success(id.clone());
                continue;
            }

            if !claimed.insert(node.name.clone()) {
                outcome.failure(
                    id.clone(),
                    FallcrateError::NameConflict {
                        name: node.name.clone(),
                    },
                );
                continue;
            }

            let result = self.request(id, destination).await;
            outcome.record(id.clone(), result);
        }

        outcome
    }

    /// Persist repair relocations to the root.
    ///
    /// Failures are logged only; the next push runs repair again.
    pub async fn apply_corrections(&self, patches: &[CorrectiveMove]) {
        for patch in patches {
            if let Err(e) = self.request(&patch.id, None).await {
                warn!(
                    node = %patch.id,
                    reason = ?patch.reason,
                    error = %e,
                    "corrective move was not accepted"
                );
            }
        }
    }

    /// Issue a re-parent request to the metadata store.
    async fn request(&self, id: &NodeId, destination: Option<&NodeId>) -> Result<FileNode> {
        let moved = self.metadata.move_node(id, destination).await?;
        debug!(node = %id, parent = ?destination.map(NodeId::as_str), "moved node");
        Ok(moved)
    }
}
