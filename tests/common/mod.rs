//! Test helpers for integration tests.
//!
//! Provides a recording blob store with fault injection, seeded tree
//! builders and a service factory.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::{Notify, Semaphore};

use fallcrate::file::{FileService, ServiceLimits, UploadQueue, UploadStatus};
use fallcrate::store::ProgressFn;
use fallcrate::{
    BlobStore, FallcrateError, FileNode, MemoryBlobStore, MemoryMetadataStore, MetadataStore,
    NewNode, NodeId, Result,
};

/// Blob store recording every call, with injectable failures.
#[derive(Default)]
pub struct RecordingBlobStore {
    inner: MemoryBlobStore,
    failing: Mutex<HashSet<String>>,
    events: Mutex<Vec<String>>,
    deleted: Mutex<Vec<String>>,
    observed: Mutex<Option<UploadQueue>>,
    max_uploading: AtomicUsize,
}

impl RecordingBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every operation on `key` fail with a transfer failure.
    pub fn fail_on(&self, key: impl Into<String>) {
        self.failing.lock().unwrap().insert(key.into());
    }

    /// Stop failing operations on `key`.
    pub fn recover(&self, key: &str) {
        self.failing.lock().unwrap().remove(key);
    }

    /// Watch `queue` while uploading, recording how many entries are
    /// marked as uploading at once.
    pub fn observe(&self, queue: UploadQueue) {
        *self.observed.lock().unwrap() = Some(queue);
    }

    /// `start:{key}` / `end:{key}` events for every upload, in order.
    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    /// Every key passed to `delete_many`, in call order.
    pub fn deleted(&self) -> Vec<String> {
        self.deleted.lock().unwrap().clone()
    }

    /// Largest number of uploading entries seen during any upload.
    pub fn max_uploading(&self) -> usize {
        self.max_uploading.load(Ordering::SeqCst)
    }

    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.inner.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.inner.contains(key)
    }

    fn check(&self, key: &str) -> Result<()> {
        if self.failing.lock().unwrap().contains(key) {
            return Err(FallcrateError::TransferFailure(format!("injected failure for {key}")));
        }
        Ok(())
    }
}

#[async_trait]
impl BlobStore for RecordingBlobStore {
    async fn upload(
        &self,
        key: &str,
        content: &[u8],
        progress: Option<&ProgressFn>,
    ) -> Result<String> {
        self.events.lock().unwrap().push(format!("start:{key}"));
        let uploading = self.observed.lock().unwrap().as_ref().map(|queue| {
            queue
                .entries()
                .iter()
                .filter(|e| e.status == UploadStatus::Uploading)
                .count()
        });
        if let Some(uploading) = uploading {
            self.max_uploading.fetch_max(uploading, Ordering::SeqCst);
        }

        // Let anything else scheduled run mid-transfer.
        tokio::task::yield_now().await;

        let result = match self.check(key) {
            Ok(()) => self.inner.upload(key, content, progress).await,
            Err(e) => Err(e),
        };
        self.events.lock().unwrap().push(format!("end:{key}"));
        result
    }

    async fn download_url(&self, key: &str) -> Result<String> {
        self.check(key)?;
        self.inner.download_url(key).await
    }

    async fn fetch(&self, key: &str) -> Result<Vec<u8>> {
        self.check(key)?;
        self.inner.fetch(key).await
    }

    async fn delete_many(&self, keys: &[String]) -> Vec<Result<()>> {
        self.deleted.lock().unwrap().extend(keys.iter().cloned());
        let mut results = Vec::with_capacity(keys.len());
        for key in keys {
            match self.check(key) {
                Ok(()) => results.extend(self.inner.delete_many(&[key.clone()]).await),
                Err(e) => results.push(Err(e)),
            }
        }
        results
    }
}

/// Blob store whose uploads block until released.
pub struct GatedBlobStore {
    inner: MemoryBlobStore,
    gate: Semaphore,
    started: Notify,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl GatedBlobStore {
    pub fn new() -> Self {
        Self {
            inner: MemoryBlobStore::new(),
            gate: Semaphore::new(0),
            started: Notify::new(),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
        }
    }

    /// Wait until an upload has reached the gate.
    pub async fn started(&self) {
        self.started.notified().await;
    }

    /// Let every upload through from now on.
    pub fn release(&self) {
        self.gate.add_permits(Semaphore::MAX_PERMITS / 2);
    }

    /// Largest number of uploads in progress at once.
    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.inner.contains(key)
    }
}

#[async_trait]
impl BlobStore for GatedBlobStore {
    async fn upload(
        &self,
        key: &str,
        content: &[u8],
        progress: Option<&ProgressFn>,
    ) -> Result<String> {
        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(active, Ordering::SeqCst);
        self.started.notify_one();

        let result = match self.gate.acquire().await {
            Ok(_permit) => self.inner.upload(key, content, progress).await,
            Err(e) => Err(FallcrateError::TransferFailure(e.to_string())),
        };
        self.active.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn download_url(&self, key: &str) -> Result<String> {
        self.inner.download_url(key).await
    }

    async fn fetch(&self, key: &str) -> Result<Vec<u8>> {
        self.inner.fetch(key).await
    }

    async fn delete_many(&self, keys: &[String]) -> Vec<Result<()>> {
        self.inner.delete_many(keys).await
    }
}

pub fn id(s: &str) -> NodeId {
    NodeId::from(s)
}

pub fn dir(node_id: &str, name: &str, parent: Option<&str>) -> FileNode {
    NewNode::directory(name, "tester")
        .with_id(id(node_id))
        .with_parent(parent.map(id))
        .into_node()
}

pub fn file(node_id: &str, name: &str, parent: Option<&str>) -> FileNode {
    NewNode::file(name, name.len() as u64, "text/plain", "tester")
        .with_id(id(node_id))
        .with_parent(parent.map(id))
        .into_node()
}

/// Store `nodes` as-is and give every file its name as content.
pub async fn seed(metadata: &MemoryMetadataStore, blobs: &dyn BlobStore, nodes: Vec<FileNode>) {
    for node in nodes.iter().filter(|n| n.is_file()) {
        blobs
            .upload(&node.id.blob_key(), node.name.as_bytes(), None)
            .await
            .unwrap();
    }
    metadata.inject(nodes);
}

pub struct Harness {
    pub metadata: Arc<MemoryMetadataStore>,
    pub blobs: Arc<RecordingBlobStore>,
    pub service: FileService,
}

/// A refreshed service over fresh in-memory stores.
pub async fn harness() -> Harness {
    harness_with(ServiceLimits::default()).await
}

pub async fn harness_with(limits: ServiceLimits) -> Harness {
    let metadata = Arc::new(MemoryMetadataStore::new());
    let blobs = Arc::new(RecordingBlobStore::new());
    let mut service = FileService::new(
        metadata.clone() as Arc<dyn MetadataStore>,
        blobs.clone() as Arc<dyn BlobStore>,
        limits,
    );
    service.refresh().await;
    Harness {
        metadata,
        blobs,
        service,
    }
}

/// A harness whose metadata store already holds `nodes`.
pub async fn seeded(nodes: Vec<FileNode>) -> Harness {
    let mut h = harness().await;
    seed(&h.metadata, h.blobs.as_ref(), nodes).await;
    h.service.refresh().await;
    h
}

/// Check that no ancestor chain in `nodes` loops or dangles.
pub fn assert_well_formed(nodes: &[FileNode]) {
    for node in nodes {
        assert_ne!(node.parent.as_ref(), Some(&node.id), "{} is its own parent", node.id);
        let mut steps = 0;
        let mut current = node.parent.clone();
        while let Some(parent) = current {
            steps += 1;
            assert!(steps <= nodes.len(), "cycle through {}", node.id);
            let found = nodes
                .iter()
                .find(|n| n.id == parent)
                .unwrap_or_else(|| panic!("{} has dangling parent {parent}", node.id));
            assert!(found.is_directory(), "{} has a file as parent", node.id);
            current = found.parent.clone();
        }
    }
}

pub fn names_under<'a>(nodes: &'a [FileNode], parent: Option<&NodeId>) -> Vec<&'a str> {
    let mut names: Vec<&str> = nodes
        .iter()
        .filter(|n| n.parent.as_ref() == parent)
        .map(|n| n.name.as_str())
        .collect();
    names.sort();
    names
}
