//! Message contract with the remote UI
//!
//! The transport is owned by the embedding application; this module only defines
//! the shape of what travels over it. Every message is a JSON object:
//!
//! ```json
//! {"type": "status", "taskId": "…", "status": "in_progress", "progress": 40, "message": "…"}
//! ```

use crate::types::{Event, TaskId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Logical endpoint a message is addressed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Endpoint {
    /// Install and extraction progress notifications
    Status,
    /// Selection requests
    Install,
    /// Selection responses coming back from the UI
    Extract,
}

impl Endpoint {
    /// Wire name of the endpoint
    pub fn as_str(&self) -> &'static str {
        match self {
            Endpoint::Status => "status",
            Endpoint::Install => "install",
            Endpoint::Extract => "extract",
        }
    }

    /// Parse a wire name
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "status" => Some(Endpoint::Status),
            "install" => Some(Endpoint::Install),
            "extract" => Some(Endpoint::Extract),
            _ => None,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Message kind; always `"status"` on the wire
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    /// Status message
    #[default]
    Status,
}

/// Task status carried by a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Work is ongoing
    InProgress,
    /// Work finished (possibly with nothing to do)
    Completed,
    /// Outward: the user must pick archive members
    SelectArchiveFiles,
    /// Inward: the user's pick
    UserArchiveSelection,
}

/// A single message exchanged with the UI
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusMessage {
    /// Always [`MessageType::Status`]
    #[serde(rename = "type", default)]
    pub kind: MessageType,
    /// Task the message belongs to
    pub task_id: TaskId,
    /// Task status
    pub status: TaskStatus,
    /// Progress percentage (0 to 100)
    #[serde(default)]
    pub progress: u8,
    /// Free text, or a JSON payload for selection requests/responses
    #[serde(default)]
    pub message: String,
}

impl StatusMessage {
    /// Build a status message
    pub fn new(
        task_id: TaskId,
        status: TaskStatus,
        progress: u8,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind: MessageType::Status,
            task_id,
            status,
            progress: progress.min(100),
            message: message.into(),
        }
    }

    /// Decode the selected relative paths of a `user_archive_selection` message
    pub fn selected_paths(&self) -> serde_json::Result<Vec<String>> {
        if self.message.trim().is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str(&self.message)
    }
}

/// A message ready to be handed to the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    /// Endpoint to send to
    pub endpoint: Endpoint,
    /// Payload
    pub message: StatusMessage,
}

impl Event {
    /// Map an event onto the UI message it produces, if any
    ///
    /// Queue bookkeeping events and shutdown stay local.
    pub fn to_outbound(&self) -> Option<OutboundMessage> {
        let (endpoint, message) = match self {
            Event::FileMoved {
                task_id,
                destination,
                ..
            } => (
                Endpoint::Status,
                StatusMessage::new(
                    task_id.clone(),
                    TaskStatus::Completed,
                    100,
                    format!("File moved to {}", destination.display()),
                ),
            ),
            Event::SelectionRequested {
                task_id, entries, ..
            } => {
                let listing = match serde_json::to_string(entries) {
                    Ok(listing) => listing,
                    Err(e) => {
                        tracing::error!(task_id = %task_id, error = %e, "failed to serialize archive listing");
                        return None;
                    }
                };
                (
                    Endpoint::Install,
                    StatusMessage::new(task_id.clone(), TaskStatus::SelectArchiveFiles, 0, listing),
                )
            }
            Event::ExtractionProgress {
                task_id,
                progress,
                message,
            } => (
                Endpoint::Status,
                StatusMessage::new(
                    task_id.clone(),
                    TaskStatus::InProgress,
                    *progress,
                    message.clone(),
                ),
            ),
            Event::FilesExtracted { task_id, files, .. } => (
                Endpoint::Status,
                StatusMessage::new(
                    task_id.clone(),
                    TaskStatus::Completed,
                    100,
                    format!("Extracted {} file(s)", files.len()),
                ),
            ),
            Event::TaskCompleted { task_id, message } => (
                Endpoint::Status,
                StatusMessage::new(task_id.clone(), TaskStatus::Completed, 100, message.clone()),
            ),
            Event::TaskFailed { task_id, error, .. } => (
                Endpoint::Status,
                StatusMessage::new(
                    task_id.clone(),
                    TaskStatus::Completed,
                    100,
                    format!("Failed: {error}"),
                ),
            ),
            Event::FileQueued { .. } | Event::FileRemoved { .. } | Event::Shutdown => {
                return None;
            }
        };

        Some(OutboundMessage { endpoint, message })
    }
}
