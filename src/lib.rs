//! Fallcrate - personal cloud file manager
//!
//! Keeps a tree of files and folders on top of a metadata store and a blob
//! store, and runs the operations of a file browser over it.

pub mod config;
pub mod db;
pub mod error;
pub mod file;
pub mod logging;
pub mod store;
pub mod tree;

pub use config::Config;
pub use db::Database;
pub use error::{FallcrateError, Result};
pub use file::{
    BatchOutcome, DeleteReport, DownloadBundle, DuplicateReport, FileService, PickedFile,
    Selection, ServiceLimits, UploadBatch, UploadQueue, UploadStatus,
};
pub use store::{
    BlobStore, FsBlobStore, MemoryBlobStore, MemoryMetadataStore, MetadataStore,
    SqliteMetadataStore,
};
pub use tree::{FileNode, NewNode, NodeId, NodeKind, Snapshot, TreeIndex};
