//! Archive/download engine.
//!
//! A single file downloads as itself; anything else is packed into a zip
//! archive mirroring the directory structure.

use std::collections::HashSet;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};
use zip::write::FileOptions;
use zip::ZipWriter;

use crate::store::BlobStore;
use crate::tree::{FileNode, NodeId, TreeIndex};
use crate::{FallcrateError, Result};

/// A file ready to be saved by the user.
#[derive(Debug)]
pub struct DownloadBundle {
    /// Name to save the content under.
    pub file_name: String,
    /// The file content or the zip archive.
    pub content: Vec<u8>,
    /// Nodes left out of the archive, with the reason.
    pub failures: Vec<(NodeId, FallcrateError)>,
}

impl DownloadBundle {
    /// Check if the content is a zip archive.
    pub fn is_archive(&self) -> bool {
        self.file_name.ends_with(".zip")
    }

    /// Write the content to `dir/{file_name}`, returning the path.
    pub async fn save_to(&self, dir: impl AsRef<Path>) -> Result<PathBuf> {
        let dir = dir.as_ref();
        tokio::fs::create_dir_all(dir).await?;
        let path = dir.join(&self.file_name);
        tokio::fs::write(&path, &self.content).await?;
        info!(path = %path.display(), bytes = self.content.len(), "saved download");
        Ok(path)
    }
}

/// Where one node goes inside the archive.
enum Entry<'n> {
    Folder(String),
    File { path: String, node: &'n FileNode },
}

/// Builds downloads within one snapshot.
pub struct ArchiveEngine<'a> {
    blobs: &'a dyn BlobStore,
    index: &'a TreeIndex,
    default_name: &'a str,
}

impl<'a> ArchiveEngine<'a> {
    /// Create a new ArchiveEngine.
    ///
    /// `default_name` names multi-selection archives made at the root.
    pub fn new(blobs: &'a dyn BlobStore, index: &'a TreeIndex, default_name: &'a str) -> Self {
        Self {
            blobs,
            index,
            default_name,
        }
    }

    /// Download `ids`, selected in directory `current`.
    pub async fn download_many(
        &self,
        ids: &[NodeId],
        current: Option<&NodeId>,
    ) -> Result<DownloadBundle> {
        if ids.is_empty() {
            return Err(FallcrateError::Validation("nothing to download".to_string()));
        }

        let mut failures = Vec::new();
        let mut roots = Vec::new();
        for id in ids {
            match self.index.get(id) {
                Some(node) => roots.push(node),
                None => failures.push((id.clone(), FallcrateError::NotFound(format!("node {id}")))),
            }
        }

        match roots.as_slice() {
            [] => Err(FallcrateError::NotFound(format!("node {}", ids[0]))),
            [node] if node.is_file() && ids.len() == 1 => self.download_file(node).await,
            [node] if ids.len() == 1 => {
                let file_name = format!("{}.zip", node.name);
                self.build_archive(file_name, &roots, failures).await
            }
            _ => {
                let base = current
                    .and_then(|c| self.index.get(c))
                    .map(|n| n.name.as_str())
                    .unwrap_or(self.default_name);
                self.build_archive(format!("{base}.zip"), &roots, failures).await
            }
        }
    }

    async fn download_file(&self, node: &FileNode) -> Result<DownloadBundle> {
        let content = self
            .blobs
            .fetch(&node.id.blob_key())
            .await
            .map_err(|e| FallcrateError::TransferFailure(format!("{}: {e}", node.name)))?;
        Ok(DownloadBundle {
            file_name: node.name.clone(),
            content,
            failures: Vec::new(),
        })
    }

    /// Lay out every root: files at the archive root, directories as
    /// folders with their contents, depth-first.
    fn entries<'n>(&'n self, roots: &[&'n FileNode]) -> Vec<Entry<'n>> {
        let mut entries = Vec::new();
        for root in roots {
            if root.is_directory() {
                self.collect(root, "", &mut entries, &mut HashSet::new());
            } else {
                entries.push(Entry::File {
                    path: root.name.clone(),
                    node: root,
                });
            }
        }
        entries
    }

    fn collect<'n>(
        &'n self,
        dir: &'n FileNode,
        prefix: &str,
        entries: &mut Vec<Entry<'n>>,
        visited: &mut HashSet<&'n NodeId>,
    ) {
        if !visited.insert(&dir.id) {
            return;
        }
        let folder = format!("{prefix}{}/", dir.name);
        entries.push(Entry::Folder(folder.clone()));

        for child in self.index.sorted_children(Some(&dir.id)) {
            if child.is_directory() {
                self.collect(child, &folder, entries, visited);
            } else {
                entries.push(Entry::File {
                    path: format!("{folder}{}", child.name),
                    node: child,
                });
            }
        }
    }

    async fn build_archive(
        &self,
        file_name: String,
        roots: &[&FileNode],
        mut failures: Vec<(NodeId, FallcrateError)>,
    ) -> Result<DownloadBundle> {
        let entries = self.entries(roots);
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let mut written: HashSet<String> = HashSet::new();

        for entry in entries {
            match entry {
                Entry::Folder(path) => {
                    if !written.insert(path.clone()) {
                        continue;
                    }
                    let options = FileOptions::<()>::default()
                        .compression_method(zip::CompressionMethod::Stored);
                    zip.add_directory(path.as_str(), options)?;
                }
                Entry::File { path, node } => {
                    if !written.insert(path.clone()) {
                        failures.push((
                            node.id.clone(),
                            FallcrateError::Archive(format!("duplicate entry {path}")),
                        ));
                        continue;
                    }
                    let content = match self.blobs.fetch(&node.id.blob_key()).await {
                        Ok(content) => content,
                        Err(e) => {
                            warn!(node = %node.id, error = %e, "skipping file in archive");
                            failures.push((
                                node.id.clone(),
                                FallcrateError::TransferFailure(format!("{path}: {e}")),
                            ));
                            continue;
                        }
                    };
                    let options = FileOptions::<()>::default()
                        .compression_method(zip::CompressionMethod::Deflated);
                    zip.start_file(path.as_str(), options)?;
                    zip.write_all(&content)?;
                    debug!(path = %path, bytes = content.len(), "added archive entry");
                }
            }
        }

        let content = zip.finish()?.into_inner();
        info!(
            archive = %file_name,
            bytes = content.len(),
            skipped = failures.len(),
            "built archive"
        );
        Ok(DownloadBundle {
            file_name,
            content,
            failures,
        })
    }
}
