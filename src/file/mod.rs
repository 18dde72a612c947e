//! File operations for Fallcrate.
//!
//! This module provides the operations on the tree:
//! - Moving, duplicating and deleting whole subtrees
//! - Downloading single files or zip archives
//! - Upload planning and the serialized upload queue
//! - Selection state and the [`FileService`] facade tying it together

mod archive;
mod delete;
mod duplicate;
mod movement;
mod outcome;
mod selection;
mod service;
mod upload;

pub use archive::{ArchiveEngine, DownloadBundle};
pub use delete::{DeleteEngine, DeleteReport};
pub use duplicate::{DuplicateEngine, DuplicateReport, PlannedClone};
pub use movement::MoveEngine;
pub use outcome::BatchOutcome;
pub use selection::Selection;
pub use service::{FileService, ServiceLimits, UploadBatch};
pub use upload::{
    drain, process_next, spawn_worker, EntrySource, LocalEntry, MemoryEntry, PendingFile,
    PickedFile, PlanBuilder, UploadContent, UploadEntry, UploadPlan, UploadQueue, UploadStatus,
};
