//! Collaborator interfaces for Fallcrate.
//!
//! The metadata store is the single source of truth for node records and
//! pushes the full collection to subscribers after every change. The blob
//! store holds file content under `uploads/{id}` keys.

mod blob;
mod memory;
mod sqlite;

pub use blob::FsBlobStore;
pub use memory::{MemoryBlobStore, MemoryMetadataStore};
pub use sqlite::SqliteMetadataStore;

use async_trait::async_trait;
use tokio::sync::watch;

use crate::tree::{FileNode, NewNode, NodeId};
use crate::Result;

/// Size of the chunks blob stores report progress for.
pub const PROGRESS_CHUNK_SIZE: usize = 64 * 1024;

/// Upload progress callback: `(bytes_transferred, total_bytes)`.
pub type ProgressFn = dyn Fn(u64, u64) + Send + Sync;

/// Metadata store holding node records.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Subscribe to the full node collection.
    ///
    /// The receiver always holds the latest collection; dropping it
    /// unsubscribes.
    fn subscribe(&self) -> watch::Receiver<Vec<FileNode>>;

    /// Create a node record. The parent must already exist.
    async fn create_node(&self, node: NewNode) -> Result<FileNode>;

    /// Rename a node.
    async fn rename_node(&self, id: &NodeId, name: &str) -> Result<FileNode>;

    /// Re-parent a node.
    async fn move_node(&self, id: &NodeId, parent: Option<&NodeId>) -> Result<FileNode>;

    /// Delete node records, returning the ids actually deleted.
    async fn delete_nodes(&self, ids: &[NodeId]) -> Result<Vec<NodeId>>;
}

/// Blob store holding file content.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `content` under `key`, reporting progress as it goes.
    ///
    /// Returns the download URL of the stored blob.
    async fn upload(
        &self,
        key: &str,
        content: &[u8],
        progress: Option<&ProgressFn>,
    ) -> Result<String>;

    /// Get the download URL of a blob.
    async fn download_url(&self, key: &str) -> Result<String>;

    /// Fetch the content of a blob.
    async fn fetch(&self, key: &str) -> Result<Vec<u8>>;

    /// Delete blobs, one result per key in input order.
    async fn delete_many(&self, keys: &[String]) -> Vec<Result<()>>;

    /// Copy a blob to a new key.
    async fn copy(&self, from: &str, to: &str) -> Result<()> {
        let content = self.fetch(from).await?;
        self.upload(to, &content, None).await?;
        Ok(())
    }
}

/// Report progress for `total` bytes in fixed-size chunks.
pub(crate) fn report_chunks(total: usize, progress: Option<&ProgressFn>) {
    let Some(progress) = progress else {
        return;
    };
    let total = total as u64;
    let mut sent = 0u64;
    progress(0, total);
    while sent < total {
        sent = (sent + PROGRESS_CHUNK_SIZE as u64).min(total);
        progress(sent, total);
    }
}
