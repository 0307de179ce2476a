//! Core types and events

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Opaque identifier correlating a unit of work with its status messages
///
/// Ids minted by the service are UUID v4 strings; ids received from the UI are
/// taken verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub String);

impl TaskId {
    /// Generate a fresh task id
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Borrow the id as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TaskId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for TaskId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// A file path awaiting processing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueEntry {
    /// Normalized absolute path (the queue key)
    pub path: PathBuf,
    /// When the path was (re)enqueued
    pub enqueued_at: DateTime<Utc>,
    /// Number of polling passes that found the file not ready
    pub retry_count: u32,
}

impl QueueEntry {
    /// Create a fresh entry with a zero retry count
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            enqueued_at: Utc::now(),
            retry_count: 0,
        }
    }
}

/// One archive member as reported by inspection
///
/// Serialized (camelCase) into the selection request sent to the UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveEntryInfo {
    /// Final path component of the member
    pub file_name: String,
    /// Path of the member inside the archive, `/`-separated
    pub relative_path: String,
    /// Uncompressed size in bytes
    pub size_bytes: u64,
    /// Lowercased extension without the dot
    pub extension: String,
    /// Whether the extension is in the mod-file set
    pub is_mod_file: bool,
    /// Whether the member targets a pre-update game version
    pub is_legacy_flagged: bool,
    /// Last modification time recorded in the archive, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<DateTime<Utc>>,
}

/// Event emitted by the ingestion service
///
/// Consumers subscribe via [`IngestService::subscribe`](crate::IngestService::subscribe).
/// Events that the UI cares about map onto wire messages through
/// [`Event::to_outbound`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A path entered the ingestion queue
    FileQueued {
        /// Normalized path
        path: PathBuf,
    },

    /// A path left the ingestion queue without being processed
    FileRemoved {
        /// Normalized path
        path: PathBuf,
    },

    /// A directly installable mod file was detected (and possibly relocated)
    FileMoved {
        /// Task id
        task_id: TaskId,
        /// Where the file was found
        source: PathBuf,
        /// Where the file now lives
        destination: PathBuf,
    },

    /// The user must pick which members of an archive to extract
    SelectionRequested {
        /// Task id the selection must be answered with
        task_id: TaskId,
        /// Archive being inspected
        archive: PathBuf,
        /// Inspection result
        entries: Vec<ArchiveEntryInfo>,
    },

    /// Extraction progress update
    ExtractionProgress {
        /// Task id
        task_id: TaskId,
        /// Progress percentage (0 to 100)
        progress: u8,
        /// Human-readable progress message
        message: String,
    },

    /// Extraction finished
    FilesExtracted {
        /// Task id
        task_id: TaskId,
        /// Source archive
        archive: PathBuf,
        /// Every file written to disk
        files: Vec<PathBuf>,
    },

    /// A task finished without extracting anything (cancelled or empty selection)
    TaskCompleted {
        /// Task id
        task_id: TaskId,
        /// Human-readable completion message
        message: String,
    },

    /// A task failed
    TaskFailed {
        /// Task id
        task_id: TaskId,
        /// Path being processed
        path: PathBuf,
        /// Error message
        error: String,
    },

    /// Service is shutting down
    Shutdown,
}
