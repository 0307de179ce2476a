//! Error types for mod-ingest
//!
//! This module provides the error taxonomy for the ingestion pipeline:
//! - Configuration errors with the offending key
//! - Archive errors, split so that "not actually an archive" is distinguishable from I/O faults
//! - Extraction and relocation failures with path context
//! - Cancellation, which callers log at informational level rather than as a failure

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for mod-ingest operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for mod-ingest
///
/// Each variant includes contextual information to help diagnose issues.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "mod_destination")
        key: Option<String>,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The file could not be opened as an archive (unrecognized or corrupt format)
    ///
    /// Treated as terminal for the file: it is not retried.
    #[error("invalid archive {path}: {reason}")]
    InvalidArchive {
        /// The file that failed to open as an archive
        path: PathBuf,
        /// The reason reported by the archive reader
        reason: String,
    },

    /// Extraction or relocation error
    #[error("extraction error: {0}")]
    Extraction(#[from] ExtractionError),

    /// Folder watching error
    #[error("folder watch error: {0}")]
    FolderWatch(String),

    /// Operation was cancelled through the service cancellation token
    #[error("operation cancelled")]
    Cancelled,

    /// Shutdown in progress - not accepting new work
    #[error("shutdown in progress: not accepting new work")]
    ShuttingDown,

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Errors raised while extracting archive members or relocating files
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// A single archive member failed to extract
    #[error("failed to extract {entry} from {archive}: {reason}")]
    EntryFailed {
        /// The archive being extracted
        archive: PathBuf,
        /// Relative path of the member inside the archive
        entry: String,
        /// The reason extraction failed
        reason: String,
    },

    /// Member path would escape the extraction directory
    #[error("unsafe member path {entry} in {archive}")]
    UnsafePath {
        /// The archive containing the member
        archive: PathBuf,
        /// The offending relative path
        entry: String,
    },

    /// File move failed
    #[error("failed to move {source_path} to {dest_path}: {reason}")]
    MoveFailed {
        /// The source path of the file being moved
        source_path: PathBuf,
        /// The destination path where the file should be moved
        dest_path: PathBuf,
        /// The reason the move failed
        reason: String,
    },

    /// File collision at destination
    #[error("file collision at {path}: {reason}")]
    FileCollision {
        /// The path where the collision occurred
        path: PathBuf,
        /// The reason for the collision (e.g., "file already exists")
        reason: String,
    },

    /// Invalid path encountered while relocating or extracting
    #[error("invalid path {path}: {reason}")]
    InvalidPath {
        /// The invalid path that was encountered
        path: PathBuf,
        /// The reason the path is invalid
        reason: String,
    },
}

impl Error {
    /// Shorthand for building an [`Error::InvalidArchive`]
    pub fn invalid_archive(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Error::InvalidArchive {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Whether the error means the file is not a readable archive
    pub fn is_invalid_archive(&self) -> bool {
        matches!(self, Error::InvalidArchive { .. })
    }

    /// Whether the error is a cooperative cancellation
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }
}
