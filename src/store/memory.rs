//! In-memory collaborators.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::debug;

use super::{report_chunks, BlobStore, MetadataStore, ProgressFn};
use crate::tree::{FileNode, NewNode, NodeId, NodeKind};
use crate::{FallcrateError, Result};

fn poisoned() -> FallcrateError {
    FallcrateError::Database("store lock poisoned".to_string())
}

/// Metadata store kept in memory.
///
/// Enforces the same rules as the SQLite store and pushes the whole
/// collection after every successful mutation.
pub struct MemoryMetadataStore {
    nodes: Mutex<Vec<FileNode>>,
    tx: watch::Sender<Vec<FileNode>>,
}

impl MemoryMetadataStore {
    /// Create an empty store.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(Vec::new());
        Self {
            nodes: Mutex::new(Vec::new()),
            tx,
        }
    }

    /// Replace the whole collection without any validation and push it.
    ///
    /// Emulates a concurrent remote writer that may leave cycles, orphans
    /// or self-parented records behind.
    pub fn inject(&self, nodes: Vec<FileNode>) {
        if let Ok(mut guard) = self.nodes.lock() {
            *guard = nodes.clone();
        }
        self.tx.send_replace(nodes);
    }

    /// Current collection as stored.
    pub fn all(&self) -> Vec<FileNode> {
        self.nodes.lock().map(|g| g.clone()).unwrap_or_default()
    }

    /// Get a stored node by ID.
    pub fn get(&self, id: &NodeId) -> Option<FileNode> {
        self.nodes
            .lock()
            .ok()
            .and_then(|g| g.iter().find(|n| &n.id == id).cloned())
    }

    fn update<T>(&self, f: impl FnOnce(&mut Vec<FileNode>) -> Result<T>) -> Result<T> {
        let mut guard = self.nodes.lock().map_err(|_| poisoned())?;
        let out = f(&mut guard)?;
        self.tx.send_replace(guard.clone());
        Ok(out)
    }
}

impl Default for MemoryMetadataStore {
    fn default() -> Self {
        Self::new()
    }
}

fn check_parent(nodes: &[FileNode], parent: Option<&NodeId>) -> Result<()> {
    let Some(parent) = parent else {
        return Ok(());
    };
    match nodes.iter().find(|n| &n.id == parent) {
        Some(n) if n.kind == NodeKind::Directory => Ok(()),
        Some(_) => Err(FallcrateError::Validation(format!(
            "parent {parent} is not a directory"
        ))),
        None => Err(FallcrateError::NotFound(format!("parent {parent}"))),
    }
}

#[async_trait]
impl MetadataStore for MemoryMetadataStore {
    fn subscribe(&self) -> watch::Receiver<Vec<FileNode>> {
        self.tx.subscribe()
    }

    async fn create_node(&self, node: NewNode) -> Result<FileNode> {
        self.update(|nodes| {
            if nodes.iter().any(|n| n.id == node.id) {
                return Err(FallcrateError::Validation(format!(
                    "node {} already exists",
                    node.id
                )));
            }
            check_parent(nodes, node.parent.as_ref())?;
            let created = node.into_node();
            debug!(node = %created.id, name = %created.name, "created node");
            nodes.push(created.clone());
            Ok(created)
        })
    }

    async fn rename_node(&self, id: &NodeId, name: &str) -> Result<FileNode> {
        self.update(|nodes| {
            let node = nodes
                .iter_mut()
                .find(|n| &n.id == id)
                .ok_or_else(|| FallcrateError::NotFound(format!("node {id}")))?;
            node.name = name.to_string();
            Ok(node.clone())
        })
    }

    async fn move_node(&self, id: &NodeId, parent: Option<&NodeId>) -> Result<FileNode> {
        self.update(|nodes| {
            check_parent(nodes, parent)?;
            let node = nodes
                .iter_mut()
                .find(|n| &n.id == id)
                .ok_or_else(|| FallcrateError::NotFound(format!("node {id}")))?;
            node.parent = parent.cloned();
            Ok(node.clone())
        })
    }

    async fn delete_nodes(&self, ids: &[NodeId]) -> Result<Vec<NodeId>> {
        self.update(|nodes| {
            let mut deleted = Vec::new();
            nodes.retain(|n| {
                if ids.contains(&n.id) {
                    deleted.push(n.id.clone());
                    false
                } else {
                    true
                }
            });
            Ok(deleted)
        })
    }
}

/// Blob store kept in memory.
#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryBlobStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if a blob exists.
    pub fn contains(&self, key: &str) -> bool {
        self.blobs
            .lock()
            .map(|g| g.contains_key(key))
            .unwrap_or(false)
    }

    /// Get a copy of a blob's content.
    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.blobs.lock().ok().and_then(|g| g.get(key).cloned())
    }

    /// Number of stored blobs.
    pub fn len(&self) -> usize {
        self.blobs.lock().map(|g| g.len()).unwrap_or(0)
    }

    /// Check if no blob is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn upload(
        &self,
        key: &str,
        content: &[u8],
        progress: Option<&ProgressFn>,
    ) -> Result<String> {
        report_chunks(content.len(), progress);
        self.blobs
            .lock()
            .map_err(|_| poisoned())?
            .insert(key.to_string(), content.to_vec());
        Ok(format!("memory://{key}"))
    }

    async fn download_url(&self, key: &str) -> Result<String> {
        if self.contains(key) {
            Ok(format!("memory://{key}"))
        } else {
            Err(FallcrateError::NotFound(format!("blob {key}")))
        }
    }

    async fn fetch(&self, key: &str) -> Result<Vec<u8>> {
        self.get(key)
            .ok_or_else(|| FallcrateError::NotFound(format!("blob {key}")))
    }

    async fn delete_many(&self, keys: &[String]) -> Vec<Result<()>> {
        let mut guard = match self.blobs.lock() {
            Ok(guard) => guard,
            Err(_) => return keys.iter().map(|_| Err(poisoned())).collect(),
        };
        keys.iter()
            .map(|key| {
                guard.remove(key);
                Ok(())
            })
            .collect()
    }
}
