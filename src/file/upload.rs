//! Upload ingestion.
//!
//! This module turns picked files, folder picks and drag-drop entries into
//! an upload plan:
//! - Directories get ids before their children are visited
//! - Names are made unique against the destination and the plan itself
//! - Directory records are created right away, files go to a queue
//!
//! The queue transfers at most one file at a time, in arrival order.

use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::store::{BlobStore, MetadataStore};
use crate::tree::{unique_name_for, validate_name, NewNode, NodeId, TreeIndex};
use crate::{FallcrateError, Result};

/// Where the bytes of a file to upload come from.
#[derive(Debug, Clone)]
pub enum UploadContent {
    /// Content already in memory.
    Memory(Arc<Vec<u8>>),
    /// Content read from a local file when its turn comes.
    Disk(PathBuf),
}

impl UploadContent {
    /// Wrap in-memory bytes.
    pub fn memory(bytes: impl Into<Vec<u8>>) -> Self {
        UploadContent::Memory(Arc::new(bytes.into()))
    }

    /// Load the full content.
    pub async fn read(&self) -> Result<Vec<u8>> {
        match self {
            UploadContent::Memory(bytes) => Ok(bytes.as_ref().clone()),
            UploadContent::Disk(path) => Ok(tokio::fs::read(path).await?),
        }
    }
}

/// A file handed over by a picker or a drop.
#[derive(Debug, Clone)]
pub struct PickedFile {
    /// File name, or a `/`-separated path relative to the picked folder.
    pub path: String,
    /// Size in bytes.
    pub size: u64,
    /// Mime type, guessed from the name when absent.
    pub mime_type: Option<String>,
    /// The content handle.
    pub content: UploadContent,
}

impl PickedFile {
    /// Create a picked file from in-memory bytes.
    pub fn from_bytes(path: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        let bytes = bytes.into();
        Self {
            path: path.into(),
            size: bytes.len() as u64,
            mime_type: None,
            content: UploadContent::memory(bytes),
        }
    }

    /// Create a picked file backed by a local file.
    pub async fn from_disk(path: impl Into<String>, local: impl AsRef<Path>) -> Result<Self> {
        let local = local.as_ref();
        let metadata = tokio::fs::metadata(local).await?;
        Ok(Self {
            path: path.into(),
            size: metadata.len(),
            mime_type: None,
            content: UploadContent::Disk(local.to_path_buf()),
        })
    }

    /// Set the mime type.
    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    /// Last path segment.
    pub fn name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }

    fn resolved_mime_type(&self) -> String {
        match &self.mime_type {
            Some(mime) if !mime.is_empty() => mime.clone(),
            _ => mime_guess::from_path(self.name())
                .first_or_octet_stream()
                .to_string(),
        }
    }
}

/// A dropped file or directory, read lazily.
#[async_trait]
pub trait EntrySource: Send + Sync {
    /// Entry name.
    fn name(&self) -> String;

    /// Check if the entry is a directory.
    fn is_directory(&self) -> bool;

    /// Read the entries of a directory. Empty for files.
    async fn read_entries(&self) -> Result<Vec<Box<dyn EntrySource>>>;

    /// Open a file entry.
    async fn file(&self) -> Result<PickedFile>;
}

/// Entry backed by the local filesystem.
#[derive(Debug, Clone)]
pub struct LocalEntry {
    path: PathBuf,
    is_dir: bool,
}

impl LocalEntry {
    /// Open a local file or directory.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let metadata = tokio::fs::metadata(&path).await?;
        Ok(Self {
            is_dir: metadata.is_dir(),
            path,
        })
    }
}

#[async_trait]
impl EntrySource for LocalEntry {
    fn name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    fn is_directory(&self) -> bool {
        self.is_dir
    }

    async fn read_entries(&self) -> Result<Vec<Box<dyn EntrySource>>> {
        if !self.is_dir {
            return Ok(Vec::new());
        }
        let mut dir = tokio::fs::read_dir(&self.path).await?;
        let mut found = Vec::new();
        while let Some(entry) = dir.next_entry().await? {
            let file_type = entry.file_type().await?;
            if file_type.is_dir() || file_type.is_file() {
                found.push(LocalEntry {
                    path: entry.path(),
                    is_dir: file_type.is_dir(),
                });
            }
        }
        found.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(found
            .into_iter()
            .map(|e| Box::new(e) as Box<dyn EntrySource>)
            .collect())
    }

    async fn file(&self) -> Result<PickedFile> {
        if self.is_dir {
            return Err(FallcrateError::Validation(format!(
                "{} is a directory",
                self.path.display()
            )));
        }
        PickedFile::from_disk(self.name(), &self.path).await
    }
}

/// Entry tree held in memory.
#[derive(Debug, Clone)]
pub enum MemoryEntry {
    /// A file with its content.
    File { name: String, content: Vec<u8> },
    /// A directory with its entries.
    Directory {
        name: String,
        children: Vec<MemoryEntry>,
    },
}

impl MemoryEntry {
    /// Create a file entry.
    pub fn file(name: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        MemoryEntry::File {
            name: name.into(),
            content: content.into(),
        }
    }

    /// Create a directory entry.
    pub fn directory(name: impl Into<String>, children: Vec<MemoryEntry>) -> Self {
        MemoryEntry::Directory {
            name: name.into(),
            children,
        }
    }
}

#[async_trait]
impl EntrySource for MemoryEntry {
    fn name(&self) -> String {
        match self {
            MemoryEntry::File { name, .. } | MemoryEntry::Directory { name, .. } => name.clone(),
        }
    }

    fn is_directory(&self) -> bool {
        matches!(self, MemoryEntry::Directory { .. })
    }

    async fn read_entries(&self) -> Result<Vec<Box<dyn EntrySource>>> {
        match self {
            MemoryEntry::File { .. } => Ok(Vec::new()),
            MemoryEntry::Directory { children, .. } => Ok(children
                .iter()
                .cloned()
                .map(|e| Box::new(e) as Box<dyn EntrySource>)
                .collect()),
        }
    }

    async fn file(&self) -> Result<PickedFile> {
        match self {
            MemoryEntry::File { name, content } => {
                Ok(PickedFile::from_bytes(name.clone(), content.clone()))
            }
            MemoryEntry::Directory { name, .. } => Err(FallcrateError::Validation(format!(
                "{name} is a directory"
            ))),
        }
    }
}

/// A file record waiting for its content to be uploaded.
#[derive(Debug, Clone)]
pub struct PendingFile {
    /// Id allocated for the record and the blob key.
    pub id: NodeId,
    /// Final, unique name.
    pub name: String,
    /// Parent directory (existing or planned).
    pub parent: Option<NodeId>,
    /// Size in bytes.
    pub size: u64,
    /// Mime type.
    pub mime_type: String,
    /// The content handle.
    pub content: UploadContent,
}

/// Everything one enqueue call creates.
#[derive(Debug, Clone, Default)]
pub struct UploadPlan {
    /// Directory records, parents before children.
    pub directories: Vec<NewNode>,
    /// Files, in arrival order.
    pub files: Vec<PendingFile>,
}

impl UploadPlan {
    /// Total size of all planned files.
    pub fn total_bytes(&self) -> u64 {
        self.files.iter().map(|f| f.size).sum()
    }

    /// Check if nothing was planned.
    pub fn is_empty(&self) -> bool {
        self.directories.is_empty() && self.files.is_empty()
    }
}

/// Builds an [`UploadPlan`] into a destination directory.
pub struct PlanBuilder {
    destination: Option<NodeId>,
    owner_id: String,
    max_suffix_attempts: u32,
    names: HashMap<Option<NodeId>, HashSet<String>>,
    folders: HashMap<Vec<String>, NodeId>,
    plan: UploadPlan,
}

impl PlanBuilder {
    /// Start a plan for `destination`, whose current children are read
    /// from `index`.
    pub fn new(
        destination: Option<&NodeId>,
        index: &TreeIndex,
        owner_id: impl Into<String>,
        max_suffix_attempts: u32,
    ) -> Self {
        let taken: HashSet<String> = index
            .children(destination)
            .map(|n| n.name.clone())
            .collect();
        let mut names = HashMap::new();
        names.insert(destination.cloned(), taken);

        Self {
            destination: destination.cloned(),
            owner_id: owner_id.into(),
            max_suffix_attempts,
            names,
            folders: HashMap::new(),
            plan: UploadPlan::default(),
        }
    }

    /// The destination directory.
    pub fn destination(&self) -> Option<&NodeId> {
        self.destination.as_ref()
    }

    /// Plan a directory under `parent`.
    pub fn directory(&mut self, parent: Option<&NodeId>, name: &str) -> Result<NodeId> {
        let name = self.claim(parent, name)?;
        let node = NewNode::directory(name, self.owner_id.clone()).with_parent(parent.cloned());
        let id = node.id.clone();
        self.plan.directories.push(node);
        Ok(id)
    }

    /// Plan a file under `parent`, named after the file's last path segment.
    pub fn file(&mut self, parent: Option<&NodeId>, file: PickedFile) -> Result<NodeId> {
        let name = self.claim(parent, file.name())?;
        let id = NodeId::generate();
        self.plan.files.push(PendingFile {
            id: id.clone(),
            name,
            parent: parent.cloned(),
            size: file.size,
            mime_type: file.resolved_mime_type(),
            content: file.content,
        });
        Ok(id)
    }

    /// Plan a file by its relative path, planning each missing folder.
    pub fn file_at_path(&mut self, file: PickedFile) -> Result<NodeId> {
        let segments: Vec<String> = file
            .path
            .split('/')
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect();
        if segments.is_empty() {
            return Err(FallcrateError::Validation("empty upload path".to_string()));
        }

        let mut parent = self.destination.clone();
        for depth in 1..segments.len() {
            let key = segments[..depth].to_vec();
            let id = match self.folders.get(&key) {
                Some(id) => id.clone(),
                None => {
                    let id = self.directory(parent.as_ref(), &segments[depth - 1])?;
                    self.folders.insert(key, id.clone());
                    id
                }
            };
            parent = Some(id);
        }

        self.file(parent.as_ref(), file)
    }

    /// Plan dropped entries, walking directories breadth-first.
    pub async fn entries(&mut self, entries: Vec<Box<dyn EntrySource>>) -> Result<()> {
        let destination = self.destination.clone();
        let mut pending: VecDeque<(Box<dyn EntrySource>, Option<NodeId>)> = entries
            .into_iter()
            .map(|e| (e, destination.clone()))
            .collect();

        while let Some((entry, parent)) = pending.pop_front() {
            if entry.is_directory() {
                let id = self.directory(parent.as_ref(), &entry.name())?;
                for child in entry.read_entries().await? {
                    pending.push_back((child, Some(id.clone())));
                }
            } else {
                let mut file = entry.file().await?;
                file.path = entry.name();
                self.file(parent.as_ref(), file)?;
            }
        }
        Ok(())
    }

    /// Finish the plan.
    pub fn finish(self) -> UploadPlan {
        self.plan
    }

    fn claim(&mut self, parent: Option<&NodeId>, name: &str) -> Result<String> {
        validate_name(name)?;
        let taken = self.names.entry(parent.cloned()).or_default();
        let unique = unique_name_for(
            name,
            taken.iter().map(String::as_str),
            self.max_suffix_attempts,
        );
        if taken.contains(&unique) {
            return Err(FallcrateError::NameConflict {
                name: name.to_string(),
            });
        }
        taken.insert(unique.clone());
        Ok(unique)
    }
}

/// State of a queued upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadStatus {
    Waiting,
    Uploading,
    Complete,
    Error,
}

impl fmt::Display for UploadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            UploadStatus::Waiting => "waiting",
            UploadStatus::Uploading => "uploading",
            UploadStatus::Complete => "complete",
            UploadStatus::Error => "error",
        };
        f.write_str(s)
    }
}

/// A visible queue entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadEntry {
    /// Id of the file record to create.
    pub id: NodeId,
    /// File name.
    pub name: String,
    /// Parent directory.
    pub parent: Option<NodeId>,
    /// Current state.
    pub status: UploadStatus,
    /// Bytes transferred so far.
    pub bytes_uploaded: u64,
    /// Total bytes to transfer.
    pub total_bytes: u64,
    /// Failure message when `status` is `Error`.
    pub error: Option<String>,
}

struct QueuedFile {
    entry: UploadEntry,
    mime_type: String,
    owner_id: String,
    content: UploadContent,
}

#[derive(Default)]
struct QueueState {
    items: Vec<QueuedFile>,
    cancelled: HashSet<NodeId>,
    /// The entry whose body is transferring, kept even if it was removed.
    in_flight: Option<NodeId>,
}

/// A file taken off the queue for transfer.
struct UploadJob {
    id: NodeId,
    name: String,
    parent: Option<NodeId>,
    size: u64,
    mime_type: String,
    owner_id: String,
    content: UploadContent,
}

/// FIFO queue of file uploads.
///
/// Clones share the same queue.
#[derive(Clone, Default)]
pub struct UploadQueue {
    state: Arc<Mutex<QueueState>>,
    notify: Arc<Notify>,
}

impl UploadQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Append files, all `Waiting`.
    pub fn push(&self, files: Vec<PendingFile>, owner_id: &str) {
        let mut state = self.lock();
        for file in files {
            debug!(upload = %file.id, name = %file.name, "queued upload");
            state.items.push(QueuedFile {
                entry: UploadEntry {
                    id: file.id,
                    name: file.name,
                    parent: file.parent,
                    status: UploadStatus::Waiting,
                    bytes_uploaded: 0,
                    total_bytes: file.size,
                    error: None,
                },
                mime_type: file.mime_type,
                owner_id: owner_id.to_string(),
                content: file.content,
            });
        }
        drop(state);
        self.notify.notify_one();
    }

    /// All visible entries in queue order.
    pub fn entries(&self) -> Vec<UploadEntry> {
        self.lock().items.iter().map(|q| q.entry.clone()).collect()
    }

    /// Get an entry by ID.
    pub fn entry(&self, id: &NodeId) -> Option<UploadEntry> {
        self.lock()
            .items
            .iter()
            .find(|q| &q.entry.id == id)
            .map(|q| q.entry.clone())
    }

    /// Get the status of an entry.
    pub fn status(&self, id: &NodeId) -> Option<UploadStatus> {
        self.entry(id).map(|e| e.status)
    }

    /// Number of visible entries.
    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    /// Check if the queue shows nothing.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Check if nothing is waiting or uploading.
    pub fn is_idle(&self) -> bool {
        self.lock().items.iter().all(|q| {
            !matches!(
                q.entry.status,
                UploadStatus::Waiting | UploadStatus::Uploading
            )
        })
    }

    /// Bytes of entries still waiting or uploading.
    pub fn pending_bytes(&self) -> u64 {
        self.lock()
            .items
            .iter()
            .filter(|q| {
                matches!(
                    q.entry.status,
                    UploadStatus::Waiting | UploadStatus::Uploading
                )
            })
            .map(|q| q.entry.total_bytes)
            .sum()
    }

    /// Remove an entry whatever its status.
    ///
    /// An entry removed mid-transfer is left to finish, then its blob is
    /// deleted and no record is created.
    pub fn remove(&self, id: &NodeId) -> bool {
        let mut state = self.lock();
        let Some(pos) = state.items.iter().position(|q| &q.entry.id == id) else {
            return false;
        };
        let removed = state.items.remove(pos);
        if removed.entry.status == UploadStatus::Uploading {
            state.cancelled.insert(id.clone());
        }
        info!(upload = %id, status = %removed.entry.status, "removed upload");
        true
    }

    /// Put a failed entry back to `Waiting`.
    pub fn retry(&self, id: &NodeId) -> bool {
        let mut state = self.lock();
        let Some(item) = state
            .items
            .iter_mut()
            .find(|q| &q.entry.id == id && q.entry.status == UploadStatus::Error)
        else {
            return false;
        };
        item.entry.status = UploadStatus::Waiting;
        item.entry.bytes_uploaded = 0;
        item.entry.error = None;
        drop(state);
        self.notify.notify_one();
        true
    }

    /// Drop completed entries, returning how many were removed.
    pub fn clear_completed(&self) -> usize {
        let mut state = self.lock();
        let before = state.items.len();
        state
            .items
            .retain(|q| q.entry.status != UploadStatus::Complete);
        before - state.items.len()
    }

    /// Mark the oldest waiting entry as uploading.
    ///
    /// Returns nothing while another transfer is in flight, including one
    /// whose entry was removed.
    fn begin_next(&self) -> Option<InFlight<'_>> {
        let mut state = self.lock();
        if state.in_flight.is_some() {
            return None;
        }
        let item = state
            .items
            .iter_mut()
            .find(|q| q.entry.status == UploadStatus::Waiting)?;
        item.entry.status = UploadStatus::Uploading;
        item.entry.bytes_uploaded = 0;
        let job = UploadJob {
            id: item.entry.id.clone(),
            name: item.entry.name.clone(),
            parent: item.entry.parent.clone(),
            size: item.entry.total_bytes,
            mime_type: item.mime_type.clone(),
            owner_id: item.owner_id.clone(),
            content: item.content.clone(),
        };
        state.in_flight = Some(job.id.clone());
        Some(InFlight { queue: self, job })
    }

    fn update(&self, id: &NodeId, f: impl FnOnce(&mut UploadEntry)) {
        let mut state = self.lock();
        if let Some(item) = state.items.iter_mut().find(|q| &q.entry.id == id) {
            f(&mut item.entry);
        }
    }

    fn set_progress(&self, id: &NodeId, sent: u64, total: u64) {
        self.update(id, |entry| {
            entry.bytes_uploaded = sent;
            entry.total_bytes = total;
        });
    }

    fn complete(&self, id: &NodeId) {
        self.update(id, |entry| {
            entry.status = UploadStatus::Complete;
            entry.bytes_uploaded = entry.total_bytes;
        });
    }

    fn fail(&self, id: &NodeId, error: &FallcrateError) {
        self.update(id, |entry| {
            entry.status = UploadStatus::Error;
            entry.error = Some(error.to_string());
        });
    }

    fn take_cancelled(&self, id: &NodeId) -> bool {
        self.lock().cancelled.remove(id)
    }

    /// Wait until files are pushed or retried.
    pub async fn wait_for_work(&self) {
        self.notify.notified().await;
    }
}

/// A started transfer; frees the queue for the next one when dropped.
struct InFlight<'a> {
    queue: &'a UploadQueue,
    job: UploadJob,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let mut state = self.queue.lock();
        if state.in_flight.as_ref() == Some(&self.job.id) {
            state.in_flight = None;
        }
    }
}

impl fmt::Debug for UploadQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadQueue")
            .field("entries", &self.entries())
            .finish()
    }
}

/// Upload the oldest waiting file and create its record.
///
/// Returns the id of the processed entry, or `None` if nothing could
/// start.
pub async fn process_next(
    queue: &UploadQueue,
    metadata: &dyn MetadataStore,
    blobs: &dyn BlobStore,
) -> Option<NodeId> {
    let started = queue.begin_next()?;
    let job = &started.job;
    let key = job.id.blob_key();

    let content = match job.content.read().await {
        Ok(content) => content,
        Err(e) => {
            warn!(upload = %job.id, name = %job.name, error = %e, "could not read upload content");
            queue.fail(&job.id, &e);
            return Some(job.id.clone());
        }
    };

    let progress_queue = queue.clone();
    let progress_id = job.id.clone();
    let progress =
        move |sent: u64, total: u64| progress_queue.set_progress(&progress_id, sent, total);

    let uploaded = blobs.upload(&key, &content, Some(&progress)).await;

    if queue.take_cancelled(&job.id) {
        if uploaded.is_ok() {
            discard_blob(blobs, &key).await;
        }
        info!(upload = %job.id, name = %job.name, "upload cancelled in flight");
        return Some(job.id.clone());
    }

    if let Err(e) = uploaded {
        let e = FallcrateError::TransferFailure(format!("{}: {e}", job.name));
        warn!(upload = %job.id, error = %e, "upload failed");
        queue.fail(&job.id, &e);
        return Some(job.id.clone());
    }

    let record = NewNode::file(
        job.name.clone(),
        job.size,
        job.mime_type.clone(),
        job.owner_id.clone(),
    )
    .with_id(job.id.clone())
    .with_parent(job.parent.clone());
    match metadata.create_node(record).await {
        Ok(node) => {
            info!(upload = %node.id, name = %node.name, bytes = job.size, "upload complete");
            queue.complete(&job.id);
        }
        Err(e) => {
            warn!(upload = %job.id, name = %job.name, error = %e, "could not record upload");
            discard_blob(blobs, &key).await;
            queue.fail(&job.id, &e);
        }
    }
    Some(job.id.clone())
}

/// Process waiting files one after another until none is left.
///
/// Returns how many entries were processed.
pub async fn drain(
    queue: &UploadQueue,
    metadata: &dyn MetadataStore,
    blobs: &dyn BlobStore,
) -> usize {
    let mut processed = 0;
    while process_next(queue, metadata, blobs).await.is_some() {
        processed += 1;
    }
    processed
}

/// Spawn a task draining the queue whenever files arrive.
pub fn spawn_worker(
    queue: UploadQueue,
    metadata: Arc<dyn MetadataStore>,
    blobs: Arc<dyn BlobStore>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("upload worker started");
        loop {
            drain(&queue, metadata.as_ref(), blobs.as_ref()).await;
            queue.wait_for_work().await;
        }
    })
}

async fn discard_blob(blobs: &dyn BlobStore, key: &str) {
    for result in blobs.delete_many(&[key.to_string()]).await {
        if let Err(e) = result {
            warn!(key, error = %e, "could not delete orphaned upload blob");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryBlobStore, MemoryMetadataStore};
    use crate::tree::{FileNode, DEFAULT_MAX_SUFFIX_ATTEMPTS};
    use tempfile::TempDir;

    fn dir(id: &str, name: &str) -> FileNode {
        NewNode::directory(name, "owner")
            .with_id(NodeId::from(id))
            .into_node()
    }

    fn file(name: &str) -> FileNode {
        NewNode::file(name, 1, "text/plain", "owner").into_node()
    }

    fn builder(index: &TreeIndex) -> PlanBuilder {
        PlanBuilder::new(None, index, "owner", DEFAULT_MAX_SUFFIX_ATTEMPTS)
    }

    #[test]
    fn test_flat_files_get_unique_names() {
        let index = TreeIndex::new(vec![file("a.txt")]);
        let mut builder = builder(&index);

        builder.file(None, PickedFile::from_bytes("a.txt", "1")).unwrap();
        builder.file(None, PickedFile::from_bytes("a.txt", "2")).unwrap();
        let plan = builder.finish();

        let names: Vec<&str> = plan.files.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["a (1).txt", "a (2).txt"]);
        assert_eq!(plan.files[0].mime_type, "text/plain");
    }

    #[test]
    fn test_folder_paths_build_parent_chain() {
        let index = TreeIndex::new(vec![dir("p", "Photos")]);
        let mut builder = builder(&index);

        builder
            .file_at_path(PickedFile::from_bytes("Photos/2023/a.jpg", "a"))
            .unwrap();
        builder
            .file_at_path(PickedFile::from_bytes("Photos/2023/b.jpg", "b"))
            .unwrap();
        builder
            .file_at_path(PickedFile::from_bytes("Photos/c.png", "c").with_mime_type("image/x"))
            .unwrap();
        let plan = builder.finish();

        assert_eq!(plan.directories.len(), 2);
        let top = &plan.directories[0];
        let year = &plan.directories[1];
        assert_eq!(top.name, "Photos (1)");
        assert_eq!(top.parent, None);
        assert_eq!(year.name, "2023");
        assert_eq!(year.parent, Some(top.id.clone()));

        assert_eq!(plan.files.len(), 3);
        assert_eq!(plan.files[0].parent, Some(year.id.clone()));
        assert_eq!(plan.files[1].parent, Some(year.id.clone()));
        assert_eq!(plan.files[2].parent, Some(top.id.clone()));
        assert_eq!(plan.files[0].mime_type, "image/jpeg");
        assert_eq!(plan.files[2].mime_type, "image/x");
        assert_eq!(plan.total_bytes(), 3);
    }

    #[test]
    fn test_invalid_names_rejected() {
        let index = TreeIndex::default();
        let mut builder = builder(&index);

        assert!(builder.file(None, PickedFile::from_bytes("", "x")).is_err());
        assert!(builder.file_at_path(PickedFile::from_bytes("//", "x")).is_err());
        assert!(builder.directory(None, "  ").is_err());
    }

    #[tokio::test]
    async fn test_drop_entries_breadth_first() {
        let index = TreeIndex::default();
        let mut builder = builder(&index);

        let entries: Vec<Box<dyn EntrySource>> = vec![
            Box::new(MemoryEntry::directory(
                "album",
                vec![
                    MemoryEntry::file("1.jpg", "one"),
                    MemoryEntry::directory("empty", vec![]),
                ],
            )),
            Box::new(MemoryEntry::file("notes.md", "hi")),
        ];
        builder.entries(entries).await.unwrap();
        let plan = builder.finish();

        let dirs: Vec<&str> = plan.directories.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(dirs, vec!["album", "empty"]);
        assert_eq!(plan.directories[1].parent, Some(plan.directories[0].id.clone()));

        let files: Vec<&str> = plan.files.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(files, vec!["notes.md", "1.jpg"]);
        assert_eq!(plan.files[1].parent, Some(plan.directories[0].id.clone()));
    }

    #[tokio::test]
    async fn test_local_entries() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("drop");
        std::fs::create_dir_all(root.join("inner")).unwrap();
        std::fs::write(root.join("a.txt"), b"aaa").unwrap();
        std::fs::write(root.join("inner").join("b.txt"), b"bb").unwrap();

        let index = TreeIndex::default();
        let mut builder = builder(&index);
        let entry = LocalEntry::open(&root).await.unwrap();
        builder.entries(vec![Box::new(entry)]).await.unwrap();
        let plan = builder.finish();

        assert_eq!(plan.directories.len(), 2);
        assert_eq!(plan.files.len(), 2);
        assert_eq!(plan.total_bytes(), 5);

        let a = plan.files.iter().find(|f| f.name == "a.txt").unwrap();
        assert_eq!(a.content.read().await.unwrap(), b"aaa");
    }

    fn pending(name: &str, content: &str) -> PendingFile {
        PendingFile {
            id: NodeId::generate(),
            name: name.to_string(),
            parent: None,
            size: content.len() as u64,
            mime_type: "text/plain".to_string(),
            content: UploadContent::memory(content),
        }
    }

    #[tokio::test]
    async fn test_drain_uploads_in_order() {
        let queue = UploadQueue::new();
        let metadata = MemoryMetadataStore::new();
        let blobs = MemoryBlobStore::new();
        let first = pending("first.txt", "1111");
        let second = pending("second.txt", "22");
        queue.push(vec![first.clone(), second.clone()], "owner");

        assert_eq!(queue.pending_bytes(), 6);
        assert_eq!(drain(&queue, &metadata, &blobs).await, 2);

        assert_eq!(queue.status(&first.id), Some(UploadStatus::Complete));
        assert_eq!(queue.status(&second.id), Some(UploadStatus::Complete));
        assert!(queue.is_idle());
        assert_eq!(queue.entry(&first.id).unwrap().bytes_uploaded, 4);
        assert_eq!(blobs.get(&first.id.blob_key()), Some(b"1111".to_vec()));

        let order: Vec<String> = metadata.all().into_iter().map(|n| n.name).collect();
        assert_eq!(order, vec!["first.txt", "second.txt"]);

        assert_eq!(queue.clear_completed(), 2);
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_failed_record_marks_error_and_stays() {
        let queue = UploadQueue::new();
        let metadata = MemoryMetadataStore::new();
        let blobs = MemoryBlobStore::new();
        let mut orphan = pending("orphan.txt", "x");
        orphan.parent = Some(NodeId::from("gone"));
        let ok = pending("ok.txt", "y");
        queue.push(vec![orphan.clone(), ok.clone()], "owner");

        drain(&queue, &metadata, &blobs).await;

        let entry = queue.entry(&orphan.id).unwrap();
        assert_eq!(entry.status, UploadStatus::Error);
        assert!(entry.error.is_some());
        assert!(!blobs.contains(&orphan.id.blob_key()));
        assert_eq!(queue.status(&ok.id), Some(UploadStatus::Complete));

        assert!(queue.retry(&orphan.id));
        assert_eq!(queue.status(&orphan.id), Some(UploadStatus::Waiting));
        assert!(queue.remove(&orphan.id));
        assert_eq!(queue.len(), 1);
    }

    #[tokio::test]
    async fn test_removed_waiting_entry_is_skipped() {
        let queue = UploadQueue::new();
        let metadata = MemoryMetadataStore::new();
        let blobs = MemoryBlobStore::new();
        let file = pending("a.txt", "a");
        queue.push(vec![file.clone()], "owner");

        assert!(queue.remove(&file.id));
        assert!(!queue.remove(&file.id));
        assert_eq!(drain(&queue, &metadata, &blobs).await, 0);
        assert!(metadata.all().is_empty());
        assert!(blobs.is_empty());
    }

    #[test]
    fn test_removed_in_flight_entry_still_blocks_next() {
        let queue = UploadQueue::new();
        let first = pending("a.txt", "a");
        let second = pending("b.txt", "b");
        queue.push(vec![first.clone(), second.clone()], "owner");

        let started = queue.begin_next().unwrap();
        assert_eq!(started.job.id, first.id);
        assert!(queue.remove(&first.id));
        assert!(queue.begin_next().is_none());
        assert_eq!(queue.status(&second.id), Some(UploadStatus::Waiting));

        drop(started);
        let next = queue.begin_next().unwrap();
        assert_eq!(next.job.id, second.id);
    }
}
