//! Delete engine.
//!
//! Removes the union of the closures of several nodes: blobs first, then
//! every record. A blob that fails to delete is logged and its record is
//! removed anyway.

use tracing::{info, warn};

use super::outcome::BatchOutcome;
use crate::store::{BlobStore, MetadataStore};
use crate::tree::{NodeId, TreeIndex};
use crate::{FallcrateError, Result};

/// Result of a delete.
#[derive(Debug, Default)]
pub struct DeleteReport {
    /// Ids the caller asked to delete.
    pub requested: Vec<NodeId>,
    /// Requested ids absent from the snapshot.
    pub missing: Vec<NodeId>,
    /// Every record the metadata store confirmed as deleted.
    pub removed: Vec<NodeId>,
    /// File blobs that could not be deleted.
    pub blob_failures: Vec<(NodeId, FallcrateError)>,
}

impl DeleteReport {
    /// Per requested id outcome: missing ids are `NotFound`, the rest
    /// succeeded once their record is gone.
    pub fn outcome(&self) -> BatchOutcome {
        let mut outcome = BatchOutcome::new();
        for id in &self.requested {
            if self.removed.contains(id) {
                outcome.success(id.clone());
            } else {
                outcome.failure(id.clone(), FallcrateError::NotFound(format!("node {id}")));
            }
        }
        outcome
    }
}

/// Deletes nodes within one snapshot.
pub struct DeleteEngine<'a> {
    metadata: &'a dyn MetadataStore,
    blobs: &'a dyn BlobStore,
    index: &'a TreeIndex,
}

impl<'a> DeleteEngine<'a> {
    /// Create a new DeleteEngine over a snapshot index.
    pub fn new(
        metadata: &'a dyn MetadataStore,
        blobs: &'a dyn BlobStore,
        index: &'a TreeIndex,
    ) -> Self {
        Self {
            metadata,
            blobs,
            index,
        }
    }

    /// Every node removed by deleting `ids`, each once, in pre-order.
    pub fn closure(&self, ids: &[NodeId]) -> Vec<NodeId> {
        self.index
            .union_closure(ids)
            .into_iter()
            .map(|n| n.id.clone())
            .collect()
    }

    /// Delete `ids` and all their descendants.
    ///
    /// Only a metadata store failure is returned as an error.
    pub async fn delete_many(&self, ids: &[NodeId]) -> Result<DeleteReport> {
        let mut report = DeleteReport {
            requested: ids.to_vec(),
            ..DeleteReport::default()
        };

        let present: Vec<NodeId> = ids
            .iter()
            .filter(|id| {
                let found = self.index.contains(id);
                if !found {
                    report.missing.push((*id).clone());
                }
                found
            })
            .cloned()
            .collect();

        let closure = self.index.union_closure(&present);
        if closure.is_empty() {
            return Ok(report);
        }

        let files: Vec<&NodeId> = closure
            .iter()
            .filter(|n| n.is_file())
            .map(|n| &n.id)
            .collect();
        let keys: Vec<String> = files.iter().map(|id| id.blob_key()).collect();

        if !keys.is_empty() {
            let results = self.blobs.delete_many(&keys).await;
            for (id, result) in files.iter().zip(results) {
                if let Err(e) = result {
                    warn!(node = %id, error = %e, "blob delete failed, removing record anyway");
                    report.blob_failures.push(((*id).clone(), e));
                }
            }
        }

        let records: Vec<NodeId> = closure.iter().map(|n| n.id.clone()).collect();
        report.removed = self.metadata.delete_nodes(&records).await?;

        info!(
            requested = ids.len(),
            removed = report.removed.len(),
            blob_failures = report.blob_failures.len(),
            "deleted nodes"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryBlobStore, MemoryMetadataStore};
    use crate::tree::index::tests::{dir, file, id};
    use crate::tree::FileNode;

    async fn setup(nodes: Vec<FileNode>) -> (MemoryMetadataStore, MemoryBlobStore, TreeIndex) {
        let metadata = MemoryMetadataStore::new();
        let blobs = MemoryBlobStore::new();
        for node in nodes.iter().filter(|n| n.is_file()) {
            blobs.upload(&node.id.blob_key(), b"x", None).await.unwrap();
        }
        metadata.inject(nodes.clone());
        (metadata, blobs, TreeIndex::new(nodes))
    }

    #[tokio::test]
    async fn test_overlapping_ids_delete_once() {
        let (metadata, blobs, index) = setup(vec![
            dir("X", None),
            file("inner", Some("X")),
            file("keep", None),
        ])
        .await;
        let engine = DeleteEngine::new(&metadata, &blobs, &index);

        assert_eq!(engine.closure(&[id("X"), id("inner")]), vec![id("X"), id("inner")]);

        let report = engine.delete_many(&[id("X"), id("inner")]).await.unwrap();
        assert_eq!(report.removed, vec![id("X"), id("inner")]);
        assert!(report.blob_failures.is_empty());
        assert!(report.outcome().is_success());
        assert!(!blobs.contains(&id("inner").blob_key()));
        assert!(blobs.contains(&id("keep").blob_key()));
        assert_eq!(metadata.all().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_ids_reported() {
        let (metadata, blobs, index) = setup(vec![file("a", None)]).await;
        let engine = DeleteEngine::new(&metadata, &blobs, &index);

        let report = engine.delete_many(&[id("a"), id("ghost")]).await.unwrap();
        assert_eq!(report.missing, vec![id("ghost")]);

        let outcome = report.outcome();
        assert_eq!(outcome.succeeded, vec![id("a")]);
        assert!(matches!(outcome.failed[0].1, FallcrateError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_nothing_to_delete() {
        let (metadata, blobs, index) = setup(vec![]).await;
        let engine = DeleteEngine::new(&metadata, &blobs, &index);

        let report = engine.delete_many(&[id("ghost")]).await.unwrap();
        assert!(report.removed.is_empty());
        assert_eq!(report.missing, vec![id("ghost")]);
    }
}
