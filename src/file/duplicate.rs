//! Duplicate engine.
//!
//! Clones a node, or a directory with its whole subtree, next to the
//! original under a fresh unique name.

use std::collections::HashMap;

use tracing::{debug, info, warn};

use crate::store::{BlobStore, MetadataStore};
use crate::tree::{unique_name_for, FileNode, NewNode, NodeId, TreeIndex};
use crate::{FallcrateError, Result};

/// Result of duplicating one node.
#[derive(Debug)]
pub struct DuplicateReport {
    /// Id of the clone of the duplicated node.
    pub root: NodeId,
    /// Name given to the clone.
    pub name: String,
    /// Every created record, in persistence order.
    pub created: Vec<NodeId>,
    /// Cloned files whose content could not be copied.
    pub copy_failures: Vec<(NodeId, FallcrateError)>,
}

/// One record of a duplication plan.
#[derive(Debug, Clone)]
pub struct PlannedClone {
    /// The node being cloned.
    pub source: NodeId,
    /// The record to create.
    pub clone: NewNode,
}

/// Duplicates nodes within one snapshot.
pub struct DuplicateEngine<'a> {
    metadata: &'a dyn MetadataStore,
    blobs: &'a dyn BlobStore,
    index: &'a TreeIndex,
    max_suffix_attempts: u32,
}

impl<'a> DuplicateEngine<'a> {
    /// Create a new DuplicateEngine over a snapshot index.
    pub fn new(
        metadata: &'a dyn MetadataStore,
        blobs: &'a dyn BlobStore,
        index: &'a TreeIndex,
        max_suffix_attempts: u32,
    ) -> Self {
        Self {
            metadata,
            blobs,
            index,
            max_suffix_attempts,
        }
    }

    /// Build the records to create, parents always before children.
    ///
    /// Every node of the subtree gets a fresh id; parent links are
    /// rewritten through the duplication map while the clone of `id`
    /// keeps the original parent.
    pub fn plan(&self, id: &NodeId) -> Result<Vec<PlannedClone>> {
        let node = self
            .index
            .get(id)
            .ok_or_else(|| FallcrateError::NotFound(format!("node {id}")))?;

        let name = self.fresh_name(node)?;
        let subtree = self.index.closure(id);

        let mut duplication_map: HashMap<&NodeId, NodeId> = HashMap::with_capacity(subtree.len());
        for original in subtree.iter().copied() {
            duplication_map.insert(&original.id, NodeId::generate());
        }

        let mut plan = Vec::with_capacity(subtree.len());
        for original in subtree {
            let Some(new_id) = duplication_map.get(&original.id) else {
                continue;
            };
            let (clone_name, parent) = if original.id == node.id {
                (name.clone(), node.parent.clone())
            } else {
                let parent = original
                    .parent
                    .as_ref()
                    .and_then(|p| duplication_map.get(p))
                    .cloned();
                (original.name.clone(), parent)
            };

            let clone =
                NewNode::cloned_from(original, new_id.clone(), clone_name).with_parent(parent);
            plan.push(PlannedClone {
                source: original.id.clone(),
                clone,
            });
        }

        Ok(plan)
    }

    /// Duplicate `id`, persisting the plan in order.
    ///
    /// File content is copied right after each file record is created. A
    /// failed copy leaves the record in place and is reported; a failed
    /// record creation stops the rest of the subtree.
    pub async fn duplicate(&self, id: &NodeId) -> Result<DuplicateReport> {
        let plan = self.plan(id)?;
        let Some(first) = plan.first() else {
            return Err(FallcrateError::NotFound(format!("node {id}")));
        };

        let mut report = DuplicateReport {
            root: first.clone.id.clone(),
            name: first.clone.name.clone(),
            created: Vec::with_capacity(plan.len()),
            copy_failures: Vec::new(),
        };

        for PlannedClone { source, clone } in plan {
            let created = self.metadata.create_node(clone).await?;
            debug!(source = %source, clone = %created.id, "created clone");
            report.created.push(created.id.clone());

            if created.is_file() {
                if let Err(e) = self
                    .blobs
                    .copy(&source.blob_key(), &created.id.blob_key())
                    .await
                {
                    warn!(source = %source, clone = %created.id, error = %e, "blob copy failed");
                    report.copy_failures.push((created.id.clone(), e));
                }
            }
        }

        info!(
            source = %id,
            clone = %report.root,
            records = report.created.len(),
            "duplicated node"
        );
        Ok(report)
    }

    fn fresh_name(&self, node: &FileNode) -> Result<String> {
        let siblings = self
            .index
            .children(node.parent.as_ref())
            .map(|n| n.name.as_str());
        let name = unique_name_for(&node.name, siblings, self.max_suffix_attempts);
        if name == node.name {
            return Err(FallcrateError::NameConflict {
                name: node.name.clone(),
            });
        }
        Ok(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryBlobStore, MemoryMetadataStore};
    use crate::tree::index::tests::{dir, file, id};
    use crate::tree::DEFAULT_MAX_SUFFIX_ATTEMPTS;

    #[test]
    fn test_plan_is_topological() {
        let metadata = MemoryMetadataStore::new();
        let blobs = MemoryBlobStore::new();
        let index = TreeIndex::new(vec![
            dir("root", None),
            file("f.txt", Some("sub")),
            dir("sub", Some("root")),
        ]);
        let engine = DuplicateEngine::new(&metadata, &blobs, &index, DEFAULT_MAX_SUFFIX_ATTEMPTS);

        let plan = engine.plan(&id("root")).unwrap();
        assert_eq!(plan.len(), 3);
        assert_eq!(plan[0].source, id("root"));
        assert_eq!(plan[0].clone.name, "root (1)");
        assert_eq!(plan[0].clone.parent, None);

        let sub = plan.iter().find(|p| p.source == id("sub")).unwrap();
        let f = plan.iter().find(|p| p.source == id("f.txt")).unwrap();
        assert_eq!(sub.clone.parent, Some(plan[0].clone.id.clone()));
        assert_eq!(f.clone.parent, Some(sub.clone.id.clone()));
        assert_eq!(f.clone.name, "f.txt");

        let position = |target: &NodeId| plan.iter().position(|p| &p.source == target).unwrap();
        assert!(position(&id("sub")) < position(&id("f.txt")));
    }

    #[tokio::test]
    async fn test_duplicate_file_copies_blob() {
        let metadata = MemoryMetadataStore::new();
        let blobs = MemoryBlobStore::new();
        let nodes = vec![dir("docs", None), file("a.txt", Some("docs"))];
        metadata.inject(nodes.clone());
        blobs.upload(&id("a.txt").blob_key(), b"data", None).await.unwrap();
        let index = TreeIndex::new(nodes);
        let engine = DuplicateEngine::new(&metadata, &blobs, &index, DEFAULT_MAX_SUFFIX_ATTEMPTS);

        let report = engine.duplicate(&id("a.txt")).await.unwrap();

        assert_eq!(report.name, "a (1).txt");
        assert_ne!(report.root, id("a.txt"));
        assert!(report.copy_failures.is_empty());
        let clone = metadata.get(&report.root).unwrap();
        assert_eq!(clone.parent, Some(id("docs")));
        assert_eq!(blobs.get(&report.root.blob_key()), Some(b"data".to_vec()));
    }

    #[tokio::test]
    async fn test_missing_blob_keeps_record() {
        let metadata = MemoryMetadataStore::new();
        let blobs = MemoryBlobStore::new();
        let nodes = vec![file("a.txt", None)];
        metadata.inject(nodes.clone());
        let index = TreeIndex::new(nodes);
        let engine = DuplicateEngine::new(&metadata, &blobs, &index, DEFAULT_MAX_SUFFIX_ATTEMPTS);

        let report = engine.duplicate(&id("a.txt")).await.unwrap();

        assert_eq!(report.copy_failures.len(), 1);
        assert!(metadata.get(&report.root).is_some());
    }

    #[tokio::test]
    async fn test_duplicate_unknown_id() {
        let metadata = MemoryMetadataStore::new();
        let blobs = MemoryBlobStore::new();
        let index = TreeIndex::default();
        let engine = DuplicateEngine::new(&metadata, &blobs, &index, DEFAULT_MAX_SUFFIX_ATTEMPTS);

        let result = engine.duplicate(&id("ghost")).await;
        assert!(matches!(result, Err(FallcrateError::NotFound(_))));
    }

    #[test]
    fn test_no_free_name_is_conflict() {
        let metadata = MemoryMetadataStore::new();
        let blobs = MemoryBlobStore::new();
        let index = TreeIndex::new(vec![file("a", None), file("a (1)", None)]);
        let engine = DuplicateEngine::new(&metadata, &blobs, &index, 1);

        assert!(matches!(
            engine.plan(&id("a")),
            Err(FallcrateError::NameConflict { .. })
        ));
    }
}
