//! Error types for Fallcrate.

use thiserror::Error;

/// Common error type for Fallcrate.
#[derive(Error, Debug)]
pub enum FallcrateError {
    /// A sibling in the destination folder already uses this name.
    #[error("an item named \"{name}\" already exists in the destination folder")]
    NameConflict { name: String },

    /// The destination is the moved node itself or one of its descendants.
    #[error("cannot move \"{name}\" into itself or one of its own subfolders")]
    CircularMove { name: String },

    /// The destination is not a folder.
    #[error("cannot move \"{name}\" into something that is not a folder")]
    InvalidDestination { name: String },

    /// Resource not found.
    #[error("{0} not found")]
    NotFound(String),

    /// Blob upload, download, copy or delete failed.
    #[error("transfer failed: {0}")]
    TransferFailure(String),

    /// A batch operation had at least one success and at least one failure.
    #[error("{}", partial_failure_message(.succeeded, .failed))]
    PartialFailure {
        /// Number of ids that were processed successfully.
        succeeded: usize,
        /// Human-readable message per failed id.
        failed: Vec<String>,
    },

    /// Database error.
    ///
    /// Errors from sqlx are converted into this variant.
    #[error("database error: {0}")]
    Database(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Validation error for user input.
    #[error("validation error: {0}")]
    Validation(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Archive assembly error.
    #[error("archive error: {0}")]
    Archive(String),
}

impl From<sqlx::Error> for FallcrateError {
    fn from(e: sqlx::Error) -> Self {
        FallcrateError::Database(e.to_string())
    }
}

impl From<zip::result::ZipError> for FallcrateError {
    fn from(e: zip::result::ZipError) -> Self {
        FallcrateError::Archive(e.to_string())
    }
}

fn partial_failure_message(succeeded: &usize, failed: &[String]) -> String {
    format!(
        "{} of {} operations failed: {}",
        failed.len(),
        succeeded + failed.len(),
        failed.join("; ")
    )
}

/// Result type alias for Fallcrate operations.
pub type Result<T> = std::result::Result<T, FallcrateError>;
