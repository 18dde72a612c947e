//! Filesystem blob store for Fallcrate.
//!
//! This module provides physical blob storage:
//! - Keys map to files under a base directory
//! - Directory sharding by first 2 characters of the key's last segment
//! - Chunked writes with progress reporting

use std::io;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use futures::future::join_all;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;
use url::Url;

use super::{BlobStore, ProgressFn, PROGRESS_CHUNK_SIZE};
use crate::{FallcrateError, Result};

/// Blob store backed by a local directory.
///
/// Blobs are stored in a sharded directory structure:
/// ```text
/// {base_path}/
/// └── uploads/
///     ├── ab/
///     │   └── ab12cd34-5678-90ab-cdef-123456789012
///     └── cd/
///         └── cd90ab12-3456-7890-abcd-ef1234567890
/// ```
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    /// Base directory for blob storage.
    base_path: PathBuf,
}

impl FsBlobStore {
    /// Create a new FsBlobStore with the given base path.
    ///
    /// The base directory will be created if it doesn't exist.
    pub fn new(base_path: impl Into<PathBuf>) -> Result<Self> {
        let base_path = base_path.into();
        std::fs::create_dir_all(&base_path)?;

        Ok(Self { base_path })
    }

    /// Get the base path of this storage.
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Check if a blob exists in storage.
    pub fn exists(&self, key: &str) -> bool {
        self.blob_path(key).map(|p| p.exists()).unwrap_or(false)
    }

    /// Get the full file path for a key.
    ///
    /// The path is constructed as: {base_path}/{prefix}/{shard}/{name}
    /// where shard is the first 2 characters of the key's last segment.
    pub fn blob_path(&self, key: &str) -> Result<PathBuf> {
        let relative = Path::new(key);
        let mut segments = Vec::new();
        for component in relative.components() {
            match component {
                Component::Normal(part) => segments.push(part),
                _ => {
                    return Err(FallcrateError::Validation(format!(
                        "invalid blob key: {key}"
                    )))
                }
            }
        }

        let Some((name, prefix)) = segments.split_last() else {
            return Err(FallcrateError::Validation("empty blob key".to_string()));
        };

        let mut path = self.base_path.clone();
        path.extend(prefix);
        let name = name.to_string_lossy();
        path.push(Self::get_shard(&name));
        path.push(name.as_ref());
        Ok(path)
    }

    /// Get the shard directory name for a blob name.
    fn get_shard(name: &str) -> &str {
        match name.char_indices().nth(2) {
            Some((end, _)) => &name[..end],
            None => name,
        }
    }

    async fn delete_one(&self, key: &str) -> Result<()> {
        let path = self.blob_path(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(FallcrateError::TransferFailure(format!(
                "delete {key}: {e}"
            ))),
        }
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn upload(
        &self,
        key: &str,
        content: &[u8],
        progress: Option<&ProgressFn>,
    ) -> Result<String> {
        let path = self.blob_path(key)?;

        // Create the shard directory if it doesn't exist
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let total = content.len() as u64;
        let mut file = fs::File::create(&path).await?;
        let mut sent = 0u64;
        if let Some(progress) = progress {
            progress(0, total);
        }
        for chunk in content.chunks(PROGRESS_CHUNK_SIZE) {
            file.write_all(chunk)
                .await
                .map_err(|e| FallcrateError::TransferFailure(format!("upload {key}: {e}")))?;
            sent += chunk.len() as u64;
            if let Some(progress) = progress {
                progress(sent, total);
            }
        }
        file.flush().await?;

        debug!(key, bytes = total, "stored blob");
        self.download_url(key).await
    }

    async fn download_url(&self, key: &str) -> Result<String> {
        let path = self.blob_path(key)?;
        let absolute = match fs::canonicalize(&path).await {
            Ok(absolute) => absolute,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(FallcrateError::NotFound(format!("blob {key}")))
            }
            Err(e) => return Err(e.into()),
        };
        Url::from_file_path(&absolute)
            .map(String::from)
            .map_err(|_| FallcrateError::Validation(format!("no file URL for {key}")))
    }

    async fn fetch(&self, key: &str) -> Result<Vec<u8>> {
        let path = self.blob_path(key)?;

        match fs::read(&path).await {
            Ok(content) => Ok(content),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(FallcrateError::NotFound(format!("blob {key}")))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn delete_many(&self, keys: &[String]) -> Vec<Result<()>> {
        join_all(keys.iter().map(|key| self.delete_one(key))).await
    }

    async fn copy(&self, from: &str, to: &str) -> Result<()> {
        let source = self.blob_path(from)?;
        let target = self.blob_path(to)?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await?;
        }
        match fs::copy(&source, &target).await {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(FallcrateError::NotFound(format!("blob {from}")))
            }
            Err(e) => Err(FallcrateError::TransferFailure(format!(
                "copy {from} -> {to}: {e}"
            ))),
        }
    }
}
