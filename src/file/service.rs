//! File service for Fallcrate.
//!
//! This module provides the query and command surface over the tree:
//! - Mirrors the metadata store's pushed collection, repaired
//! - Tracks the current directory and the selection
//! - Runs move/rename/create/delete/duplicate/download commands
//! - Feeds uploads into the serialized queue

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::archive::{ArchiveEngine, DownloadBundle};
use super::delete::{DeleteEngine, DeleteReport};
use super::duplicate::{DuplicateEngine, DuplicateReport};
use super::movement::MoveEngine;
use super::outcome::BatchOutcome;
use super::selection::Selection;
use super::upload::{
    self, EntrySource, PickedFile, PlanBuilder, UploadEntry, UploadPlan, UploadQueue,
    UploadStatus,
};
use crate::config::Config;
use crate::store::{BlobStore, MetadataStore};
use crate::tree::{
    has_name_conflict, repair, unique_name_for, validate_name, FileNode, NewNode, NodeId,
    Repaired, Snapshot, DEFAULT_MAX_SUFFIX_ATTEMPTS,
};
use crate::{FallcrateError, Result};

/// Limits and defaults applied by the service.
#[derive(Debug, Clone)]
pub struct ServiceLimits {
    /// Owner recorded on created nodes.
    pub owner_id: String,
    /// Total storage quota in bytes.
    pub max_storage_bytes: u64,
    /// Maximum size of a single file in bytes.
    pub max_file_size: u64,
    /// Archive name for multi-selections at the root.
    pub archive_name: String,
    /// Bound on `" (n)"` candidates when making names unique.
    pub max_suffix_attempts: u32,
}

impl ServiceLimits {
    /// Take limits from the configuration.
    pub fn from_config(config: &Config) -> Self {
        Self {
            owner_id: config.account.owner_id.clone(),
            max_storage_bytes: config.storage.max_storage_bytes,
            max_file_size: config.storage.max_file_size_bytes(),
            archive_name: config.archive.default_name.clone(),
            max_suffix_attempts: config.naming.max_suffix_attempts,
        }
    }
}

impl Default for ServiceLimits {
    fn default() -> Self {
        Self {
            owner_id: "local".to_string(),
            max_storage_bytes: 1_000_000_000,
            max_file_size: 100 * 1024 * 1024,
            archive_name: "Fallcrate".to_string(),
            max_suffix_attempts: DEFAULT_MAX_SUFFIX_ATTEMPTS,
        }
    }
}

/// Records created by one enqueue call.
#[derive(Debug, Clone, Default)]
pub struct UploadBatch {
    /// Directory records created right away.
    pub directories: Vec<NodeId>,
    /// Files queued for upload, in queue order.
    pub files: Vec<NodeId>,
}

/// File service over a metadata store and a blob store.
pub struct FileService {
    metadata: Arc<dyn MetadataStore>,
    blobs: Arc<dyn BlobStore>,
    updates: watch::Receiver<Vec<FileNode>>,
    primed: bool,
    snapshot: Snapshot,
    current_dir: Option<NodeId>,
    selection: Selection,
    uploads: UploadQueue,
    limits: ServiceLimits,
}

impl FileService {
    /// Create a new FileService subscribed to `metadata`.
    ///
    /// The mirror stays empty until the first [`refresh`](Self::refresh).
    pub fn new(
        metadata: Arc<dyn MetadataStore>,
        blobs: Arc<dyn BlobStore>,
        limits: ServiceLimits,
    ) -> Self {
        let updates = metadata.subscribe();
        Self {
            metadata,
            blobs,
            updates,
            primed: false,
            snapshot: Snapshot::default(),
            current_dir: None,
            selection: Selection::new(),
            uploads: UploadQueue::new(),
            limits,
        }
    }

    /// The limits in effect.
    pub fn limits(&self) -> &ServiceLimits {
        &self.limits
    }

    // ------------------------------------------------------------------
    // Snapshot maintenance
    // ------------------------------------------------------------------

    /// Pull the newest pushed collection, if any, and repair it.
    ///
    /// Relocations made by repair are sent to the metadata store as
    /// moves to the root. Returns whether a new snapshot was taken.
    pub async fn refresh(&mut self) -> bool {
        if self.primed && !self.updates.has_changed().unwrap_or(false) {
            return false;
        }
        let nodes = self.updates.borrow_and_update().clone();
        self.primed = true;

        let Repaired { nodes, patches } = repair(nodes);
        self.snapshot = Snapshot::new(self.snapshot.version() + 1, nodes);
        debug!(
            version = self.snapshot.version(),
            nodes = self.snapshot.index().len(),
            "took snapshot"
        );

        if !patches.is_empty() {
            warn!(count = patches.len(), "repairing tree");
            MoveEngine::new(self.metadata.as_ref(), self.snapshot.index())
                .apply_corrections(&patches)
                .await;
        }

        self.reconcile();
        true
    }

    /// Wait for the metadata store to push, then refresh.
    pub async fn wait_for_update(&mut self) -> Result<()> {
        self.updates
            .changed()
            .await
            .map_err(|_| FallcrateError::Database("metadata store closed".to_string()))?;
        self.refresh().await;
        Ok(())
    }

    fn reconcile(&mut self) {
        let index = self.snapshot.index();
        if let Some(current) = &self.current_dir {
            if !index.get(current).is_some_and(|n| n.is_directory()) {
                info!(directory = %current, "current directory vanished, back to root");
                self.current_dir = None;
            }
        }
        self.selection
            .reconcile(self.current_dir.as_ref(), self.snapshot.index());
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// The latest repaired snapshot.
    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    /// All nodes of the latest snapshot.
    pub fn nodes(&self) -> &[FileNode] {
        self.snapshot.index().nodes()
    }

    /// Get a node by ID.
    pub fn node(&self, id: &NodeId) -> Option<&FileNode> {
        self.snapshot.index().get(id)
    }

    /// The current directory (None for root).
    pub fn current_directory(&self) -> Option<&NodeId> {
        self.current_dir.as_ref()
    }

    /// Children of the current directory, directories first, then by name.
    pub fn current_directory_children(&self) -> Vec<&FileNode> {
        self.snapshot
            .index()
            .sorted_children(self.current_dir.as_ref())
    }

    /// Directories from the root down to the current one.
    pub fn directory_path(&self) -> Vec<&FileNode> {
        self.snapshot.index().path(self.current_dir.as_ref())
    }

    /// Selected ids.
    pub fn selected(&self) -> &[NodeId] {
        self.selection.ids()
    }

    /// Descendants of the selected nodes.
    pub fn nested_selected(&self) -> Vec<NodeId> {
        self.selection.nested(self.snapshot.index())
    }

    /// Summary such as `"2 selected (+3 nested)"`.
    pub fn selection_summary(&self) -> String {
        self.selection.summary(self.snapshot.index())
    }

    /// Nodes anywhere in the tree whose name contains `query`.
    pub fn search(&self, query: &str) -> Vec<&FileNode> {
        self.snapshot.index().search(query)
    }

    /// Bytes used by stored files.
    pub fn storage_used(&self) -> u64 {
        self.snapshot.index().total_size()
    }

    /// Storage quota in bytes.
    pub fn storage_limit(&self) -> u64 {
        self.limits.max_storage_bytes
    }

    /// Check if `bytes` more fit within the quota, counting queued uploads.
    pub fn has_enough_space(&self, bytes: u64) -> bool {
        self.storage_used()
            .saturating_add(self.uploads.pending_bytes())
            .saturating_add(bytes)
            <= self.limits.max_storage_bytes
    }

    /// Visible upload queue entries.
    pub fn upload_entries(&self) -> Vec<UploadEntry> {
        self.uploads.entries()
    }

    /// Status of one upload.
    pub fn upload_status(&self, id: &NodeId) -> Option<UploadStatus> {
        self.uploads.status(id)
    }

    /// Shared handle to the upload queue.
    pub fn upload_queue(&self) -> &UploadQueue {
        &self.uploads
    }

    // ------------------------------------------------------------------
    // Navigation and selection
    // ------------------------------------------------------------------

    /// Make `id` the current directory (None for root).
    pub fn open_directory(&mut self, id: Option<&NodeId>) -> Result<()> {
        if let Some(id) = id {
            let node = self
                .node(id)
                .ok_or_else(|| FallcrateError::NotFound(format!("directory {id}")))?;
            if !node.is_directory() {
                return Err(FallcrateError::Validation(format!(
                    "\"{}\" is not a folder",
                    node.name
                )));
            }
        }
        self.current_dir = id.cloned();
        self.selection
            .reconcile(self.current_dir.as_ref(), self.snapshot.index());
        Ok(())
    }

    /// Open a node: directories become current, files are returned.
    pub fn open(&mut self, id: &NodeId) -> Result<Option<FileNode>> {
        let node = self
            .node(id)
            .cloned()
            .ok_or_else(|| FallcrateError::NotFound(format!("node {id}")))?;
        if node.is_directory() {
            self.open_directory(Some(id))?;
            Ok(None)
        } else {
            Ok(Some(node))
        }
    }

    /// Flip selection of a child of the current directory.
    pub fn toggle_selection(&mut self, id: &NodeId) -> bool {
        self.selection
            .toggle(id, self.current_dir.as_ref(), self.snapshot.index())
    }

    /// Replace the selection.
    pub fn select_exclusive(&mut self, ids: &[NodeId], allow_outside: bool) {
        self.selection.set_exclusive(
            ids,
            allow_outside,
            self.current_dir.as_ref(),
            self.snapshot.index(),
        );
    }

    /// Select all children of the current directory, or clear.
    pub fn toggle_select_all(&mut self) {
        self.selection
            .toggle_all(self.current_dir.as_ref(), self.snapshot.index());
    }

    // ------------------------------------------------------------------
    // Commands
    // ------------------------------------------------------------------

    /// Move nodes under `destination`, each independently.
    pub async fn move_nodes(
        &mut self,
        ids: &[NodeId],
        destination: Option<&NodeId>,
    ) -> BatchOutcome {
        let outcome = MoveEngine::new(self.metadata.as_ref(), self.snapshot.index())
            .move_nodes(ids, destination)
            .await;

        if destination != self.current_dir.as_ref() {
            for id in &outcome.succeeded {
                self.selection.remove(id);
            }
        }
        self.refresh().await;
        outcome
    }

    /// Rename a node, making the name unique among its siblings.
    pub async fn rename(&mut self, id: &NodeId, name: &str) -> Result<FileNode> {
        let name = name.trim();
        validate_name(name)?;

        let index = self.snapshot.index();
        let node = index
            .get(id)
            .ok_or_else(|| FallcrateError::NotFound(format!("node {id}")))?;
        if node.name == name {
            return Ok(node.clone());
        }

        let siblings = index
            .children(node.parent.as_ref())
            .filter(|n| &n.id != id)
            .map(|n| n.name.as_str());
        let unique = unique_name_for(name, siblings, self.limits.max_suffix_attempts);
        if has_name_conflict(&unique, Some(id), node.parent.as_ref(), index) {
            return Err(FallcrateError::NameConflict {
                name: name.to_string(),
            });
        }

        let renamed = self.metadata.rename_node(id, &unique).await?;
        info!(node = %id, name = %renamed.name, "renamed node");
        self.refresh().await;
        Ok(renamed)
    }

    /// Create a folder in the current directory.
    pub async fn create_folder(&mut self, name: &str) -> Result<FileNode> {
        let name = name.trim();
        validate_name(name)?;

        let parent = self.current_dir.clone();
        if has_name_conflict(name, None, parent.as_ref(), self.snapshot.index()) {
            return Err(FallcrateError::NameConflict {
                name: name.to_string(),
            });
        }

        let folder = self
            .metadata
            .create_node(
                NewNode::directory(name, self.limits.owner_id.clone()).with_parent(parent),
            )
            .await?;
        info!(node = %folder.id, name = %folder.name, "created folder");
        self.refresh().await;
        Ok(folder)
    }

    /// Delete nodes with all their descendants.
    pub async fn delete_many(&mut self, ids: &[NodeId]) -> Result<DeleteReport> {
        let report = DeleteEngine::new(
            self.metadata.as_ref(),
            self.blobs.as_ref(),
            self.snapshot.index(),
        )
        .delete_many(ids)
        .await?;

        for id in &report.removed {
            self.selection.remove(id);
        }
        self.refresh().await;
        Ok(report)
    }

    /// Duplicate a node next to itself.
    pub async fn duplicate(&mut self, id: &NodeId) -> Result<DuplicateReport> {
        let result = DuplicateEngine::new(
            self.metadata.as_ref(),
            self.blobs.as_ref(),
            self.snapshot.index(),
            self.limits.max_suffix_attempts,
        )
        .duplicate(id)
        .await;

        // Records may have been created even if a later one failed.
        self.refresh().await;
        result
    }

    /// Duplicate several nodes, each independently.
    pub async fn duplicate_many(&mut self, ids: &[NodeId]) -> BatchOutcome {
        let mut outcome = BatchOutcome::new();
        for id in ids {
            let result = self.duplicate(id).await;
            outcome.record(id.clone(), result);
        }
        outcome
    }

    /// Download nodes as a single file or a zip archive.
    pub async fn download_many(&self, ids: &[NodeId]) -> Result<DownloadBundle> {
        ArchiveEngine::new(
            self.blobs.as_ref(),
            self.snapshot.index(),
            &self.limits.archive_name,
        )
        .download_many(ids, self.current_dir.as_ref())
        .await
    }

    // ------------------------------------------------------------------
    // Uploads
    // ------------------------------------------------------------------

    fn plan_builder(&self) -> PlanBuilder {
        PlanBuilder::new(
            self.current_dir.as_ref(),
            self.snapshot.index(),
            self.limits.owner_id.clone(),
            self.limits.max_suffix_attempts,
        )
    }

    /// Queue picked files into the current directory.
    pub async fn enqueue_files(&mut self, files: Vec<PickedFile>) -> Result<UploadBatch> {
        let mut builder = self.plan_builder();
        let parent = builder.destination().cloned();
        for file in files {
            builder.file(parent.as_ref(), file)?;
        }
        self.submit(builder.finish()).await
    }

    /// Queue a picked folder, each file carrying its relative path.
    pub async fn enqueue_folder(&mut self, files: Vec<PickedFile>) -> Result<UploadBatch> {
        let mut builder = self.plan_builder();
        for file in files {
            builder.file_at_path(file)?;
        }
        self.submit(builder.finish()).await
    }

    /// Queue dropped files and directories.
    pub async fn enqueue_entries(
        &mut self,
        entries: Vec<Box<dyn EntrySource>>,
    ) -> Result<UploadBatch> {
        let mut builder = self.plan_builder();
        builder.entries(entries).await?;
        self.submit(builder.finish()).await
    }

    fn check_quota(&self, plan: &UploadPlan) -> Result<()> {
        if let Some(big) = plan
            .files
            .iter()
            .find(|f| f.size > self.limits.max_file_size)
        {
            return Err(FallcrateError::Validation(format!(
                "\"{}\" exceeds the maximum file size of {} MB",
                big.name,
                self.limits.max_file_size / 1024 / 1024
            )));
        }
        if !self.has_enough_space(plan.total_bytes()) {
            return Err(FallcrateError::Validation(format!(
                "not enough storage space: {} bytes used of {}",
                self.storage_used(),
                self.limits.max_storage_bytes
            )));
        }
        Ok(())
    }

    /// Create the planned directories, then queue the files.
    async fn submit(&mut self, plan: UploadPlan) -> Result<UploadBatch> {
        self.check_quota(&plan)?;

        let mut batch = UploadBatch::default();
        for directory in plan.directories {
            let created = self.metadata.create_node(directory).await?;
            batch.directories.push(created.id);
        }

        batch.files = plan.files.iter().map(|f| f.id.clone()).collect();
        self.uploads.push(plan.files, &self.limits.owner_id);

        info!(
            directories = batch.directories.len(),
            files = batch.files.len(),
            "enqueued uploads"
        );
        self.refresh().await;
        Ok(batch)
    }

    /// Remove an upload from the queue.
    pub fn dequeue_upload(&mut self, id: &NodeId) -> bool {
        self.uploads.remove(id)
    }

    /// Upload every waiting file, one at a time, then refresh.
    pub async fn drain_uploads(&mut self) -> usize {
        let processed =
            upload::drain(&self.uploads, self.metadata.as_ref(), self.blobs.as_ref()).await;
        self.refresh().await;
        processed
    }

    /// Spawn a background task uploading queued files as they arrive.
    ///
    /// Pick up the created records with [`wait_for_update`](Self::wait_for_update).
    pub fn spawn_upload_worker(&self) -> JoinHandle<()> {
        upload::spawn_worker(
            self.uploads.clone(),
            Arc::clone(&self.metadata),
            Arc::clone(&self.blobs),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryBlobStore, MemoryMetadataStore};

    struct Fixture {
        metadata: Arc<MemoryMetadataStore>,
        blobs: Arc<MemoryBlobStore>,
        service: FileService,
    }

    async fn setup_with(limits: ServiceLimits) -> Fixture {
        let metadata = Arc::new(MemoryMetadataStore::new());
        let blobs = Arc::new(MemoryBlobStore::new());
        let mut service = FileService::new(metadata.clone(), blobs.clone(), limits);
        service.refresh().await;
        Fixture {
            metadata,
            blobs,
            service,
        }
    }

    async fn setup() -> Fixture {
        setup_with(ServiceLimits::default()).await
    }

    #[tokio::test]
    async fn test_create_folder_and_listing_order() {
        let mut fx = setup().await;
        fx.service
            .enqueue_files(vec![PickedFile::from_bytes("b.txt", "b")])
            .await
            .unwrap();
        fx.service.drain_uploads().await;
        fx.service.create_folder("Zeta").await.unwrap();
        fx.service.create_folder("Alpha").await.unwrap();

        let names: Vec<&str> = fx
            .service
            .current_directory_children()
            .iter()
            .map(|n| n.name.as_str())
            .collect();
        assert_eq!(names, vec!["Alpha", "Zeta", "b.txt"]);

        assert!(matches!(
            fx.service.create_folder("Alpha").await,
            Err(FallcrateError::NameConflict { .. })
        ));
        assert!(matches!(
            fx.service.create_folder(" ").await,
            Err(FallcrateError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_rename_uniquifies() {
        let mut fx = setup().await;
        let a = fx.service.create_folder("a").await.unwrap();
        fx.service.create_folder("b").await.unwrap();

        let renamed = fx.service.rename(&a.id, "b").await.unwrap();
        assert_eq!(renamed.name, "b (1)");

        let same = fx.service.rename(&a.id, "b (1)").await.unwrap();
        assert_eq!(same.name, "b (1)");

        assert!(matches!(
            fx.service.rename(&a.id, "").await,
            Err(FallcrateError::Validation(_))
        ));
        assert!(matches!(
            fx.service.rename(&NodeId::from("ghost"), "x").await,
            Err(FallcrateError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_navigation_and_breadcrumb() {
        let mut fx = setup().await;
        let docs = fx.service.create_folder("Docs").await.unwrap();
        fx.service.open_directory(Some(&docs.id)).unwrap();
        let sub = fx.service.create_folder("Sub").await.unwrap();
        assert_eq!(sub.parent, Some(docs.id.clone()));

        assert_eq!(fx.service.open(&sub.id).unwrap(), None);
        let path: Vec<&str> = fx
            .service
            .directory_path()
            .iter()
            .map(|n| n.name.as_str())
            .collect();
        assert_eq!(path, vec!["Docs", "Sub"]);

        fx.service.open_directory(None).unwrap();
        assert!(fx.service.directory_path().is_empty());
        assert!(fx.service.open_directory(Some(&NodeId::from("ghost"))).is_err());
    }

    #[tokio::test]
    async fn test_current_directory_falls_back_to_root() {
        let mut fx = setup().await;
        let docs = fx.service.create_folder("Docs").await.unwrap();
        fx.service.open_directory(Some(&docs.id)).unwrap();

        fx.service.delete_many(&[docs.id.clone()]).await.unwrap();
        assert_eq!(fx.service.current_directory(), None);
    }

    #[tokio::test]
    async fn test_move_deselects_nodes_leaving_directory() {
        let mut fx = setup().await;
        let a = fx.service.create_folder("A").await.unwrap();
        let b = fx.service.create_folder("B").await.unwrap();
        fx.service.toggle_select_all();
        assert_eq!(fx.service.selected().len(), 2);

        let outcome = fx.service.move_nodes(&[a.id.clone()], Some(&b.id)).await;
        assert!(outcome.is_success());
        assert_eq!(fx.service.selected(), &[b.id.clone()]);
        assert_eq!(fx.service.node(&a.id).unwrap().parent, Some(b.id.clone()));
        assert_eq!(fx.service.selection_summary(), "1 selected (+1 nested)");
    }

    #[tokio::test]
    async fn test_refresh_repairs_injected_cycle() {
        let mut fx = setup().await;
        let a = NewNode::directory("A", "owner")
            .with_id(NodeId::from("A"))
            .with_parent(Some(NodeId::from("B")))
            .into_node();
        let b = NewNode::directory("B", "owner")
            .with_id(NodeId::from("B"))
            .with_parent(Some(NodeId::from("A")))
            .into_node();
        fx.metadata.inject(vec![a, b]);

        assert!(fx.service.refresh().await);
        assert!(fx.service.nodes().iter().all(|n| n.parent.is_none()));
        assert!(fx.metadata.all().iter().all(|n| n.parent.is_none()));

        // The corrective moves pushed again; nothing left to fix.
        assert!(fx.service.refresh().await);
        assert!(!fx.service.refresh().await);
    }

    #[tokio::test]
    async fn test_enqueue_respects_limits() {
        let mut fx = setup_with(ServiceLimits {
            max_storage_bytes: 10,
            max_file_size: 6,
            ..ServiceLimits::default()
        })
        .await;

        assert!(matches!(
            fx.service
                .enqueue_files(vec![PickedFile::from_bytes("big.bin", vec![0u8; 7])])
                .await,
            Err(FallcrateError::Validation(_))
        ));

        fx.service
            .enqueue_files(vec![PickedFile::from_bytes("a.bin", vec![0u8; 6])])
            .await
            .unwrap();
        assert!(!fx.service.has_enough_space(5));
        assert!(matches!(
            fx.service
                .enqueue_files(vec![PickedFile::from_bytes("b.bin", vec![0u8; 5])])
                .await,
            Err(FallcrateError::Validation(_))
        ));

        fx.service.drain_uploads().await;
        assert_eq!(fx.service.storage_used(), 6);
        assert_eq!(fx.service.storage_limit(), 10);
        assert_eq!(fx.blobs.len(), 1);
    }

    #[tokio::test]
    async fn test_enqueue_folder_creates_directories_first() {
        let mut fx = setup().await;
        let batch = fx
            .service
            .enqueue_folder(vec![
                PickedFile::from_bytes("Trip/day1/a.jpg", "a"),
                PickedFile::from_bytes("Trip/b.jpg", "b"),
            ])
            .await
            .unwrap();

        assert_eq!(batch.directories.len(), 2);
        assert_eq!(batch.files.len(), 2);
        // Directories exist before any file is uploaded.
        assert!(fx.service.node(&batch.directories[1]).is_some());
        assert!(fx
            .service
            .upload_entries()
            .iter()
            .all(|e| e.status == UploadStatus::Waiting));

        assert_eq!(fx.service.drain_uploads().await, 2);
        for id in &batch.files {
            assert_eq!(fx.service.upload_status(id), Some(UploadStatus::Complete));
            assert!(fx.service.node(id).is_some());
        }
        assert_eq!(fx.service.search("JPG").len(), 2);
    }

    #[tokio::test]
    async fn test_dequeue_upload() {
        let mut fx = setup().await;
        let batch = fx
            .service
            .enqueue_files(vec![PickedFile::from_bytes("a.txt", "a")])
            .await
            .unwrap();

        assert!(fx.service.dequeue_upload(&batch.files[0]));
        assert!(fx.service.upload_entries().is_empty());
        assert_eq!(fx.service.drain_uploads().await, 0);
        assert!(fx.service.nodes().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_many_isolates_failures() {
        let mut fx = setup().await;
        let docs = fx.service.create_folder("Docs").await.unwrap();

        let outcome = fx
            .service
            .duplicate_many(&[docs.id.clone(), NodeId::from("ghost"), docs.id.clone()])
            .await;
        assert_eq!(outcome.succeeded.len(), 2);
        assert_eq!(outcome.failed.len(), 1);

        let mut names: Vec<String> = fx.service.nodes().iter().map(|n| n.name.clone()).collect();
        names.sort();
        assert_eq!(names, vec!["Docs", "Docs (1)", "Docs (2)"]);
    }

    #[tokio::test]
    async fn test_wait_for_update_sees_remote_writes() {
        let mut fx = setup().await;
        let metadata = fx.metadata.clone();
        let writer = tokio::spawn(async move {
            metadata
                .create_node(NewNode::directory("Remote", "someone"))
                .await
                .unwrap();
        });

        fx.service.wait_for_update().await.unwrap();
        writer.await.unwrap();
        fx.service.refresh().await;
        assert_eq!(fx.service.nodes().len(), 1);
    }
}
