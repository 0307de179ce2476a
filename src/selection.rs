//! Selection handshake between an inspected archive and the UI
//!
//! A request publishes [`Event::SelectionRequested`] and parks until the UI
//! answers through [`SelectionCoordinator::resolve`], the deadline passes or the
//! service shuts down. Waiting happens on a spawned task, never on the polling
//! loop.

use crate::error::Result;
use crate::extraction::Extractor;
use crate::types::{ArchiveEntryInfo, Event, TaskId};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{broadcast, oneshot};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

struct PendingSelection {
    archive_path: PathBuf,
    deadline: Instant,
    registration: u64,
    resolver: oneshot::Sender<Vec<String>>,
}

/// Tracks outstanding selection requests, at most one per task id
pub struct SelectionCoordinator {
    pending: Mutex<HashMap<TaskId, PendingSelection>>,
    next_registration: AtomicU64,
    timeout: Duration,
    event_tx: broadcast::Sender<Event>,
    cancel: CancellationToken,
}

impl SelectionCoordinator {
    /// Create a coordinator whose requests expire after `timeout`
    pub fn new(
        timeout: Duration,
        event_tx: broadcast::Sender<Event>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            pending: Mutex::new(HashMap::new()),
            next_registration: AtomicU64::new(0),
            timeout,
            event_tx,
            cancel,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<TaskId, PendingSelection>> {
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Publish the listing and wait for the user's choice
    ///
    /// Returns the selected relative paths; an empty list on timeout,
    /// cancellation or an explicit empty answer.
    pub async fn request(
        &self,
        task_id: &TaskId,
        archive: &Path,
        entries: Vec<ArchiveEntryInfo>,
    ) -> Vec<String> {
        let (tx, rx) = oneshot::channel();
        let registration = self.next_registration.fetch_add(1, Ordering::Relaxed);
        let deadline = Instant::now() + self.timeout;

        // Register before publishing so an immediate answer is never lost
        let replaced = self.lock().insert(
            task_id.clone(),
            PendingSelection {
                archive_path: archive.to_path_buf(),
                deadline,
                registration,
                resolver: tx,
            },
        );
        if let Some(old) = replaced {
            warn!(task_id = %task_id, archive = ?old.archive_path, "replacing outstanding selection request");
        }

        debug!(task_id = %task_id, ?archive, entries = entries.len(), "requesting archive selection");
        self.event_tx
            .send(Event::SelectionRequested {
                task_id: task_id.clone(),
                archive: archive.to_path_buf(),
                entries,
            })
            .ok();

        let selection = tokio::select! {
            answer = rx => answer.unwrap_or_default(),
            _ = tokio::time::sleep_until(deadline) => {
                info!(task_id = %task_id, ?archive, "selection timed out");
                Vec::new()
            }
            _ = self.cancel.cancelled() => {
                debug!(task_id = %task_id, "selection abandoned on shutdown");
                Vec::new()
            }
        };

        let mut pending = self.lock();
        if pending
            .get(task_id)
            .is_some_and(|p| p.registration == registration)
        {
            pending.remove(task_id);
        }

        selection
    }

    /// Deliver a selection to the waiting request
    ///
    /// Returns `false` (with a warning) when no request is waiting for `task_id`,
    /// e.g. after a timeout or on a duplicate answer.
    pub fn resolve(&self, task_id: &TaskId, paths: Vec<String>) -> bool {
        let Some(pending) = self.lock().remove(task_id) else {
            warn!(task_id = %task_id, "selection received for unknown or expired task");
            return false;
        };

        if Instant::now() > pending.deadline {
            warn!(task_id = %task_id, "selection arrived after its deadline");
        }

        debug!(task_id = %task_id, selected = paths.len(), archive = ?pending.archive_path, "selection received");
        pending.resolver.send(paths).is_ok()
    }

    /// Release every waiting request with an empty selection
    pub fn cancel_all(&self) -> usize {
        let drained: Vec<_> = self.lock().drain().collect();
        let count = drained.len();
        if count > 0 {
            info!(count, "cancelling outstanding selection requests");
        }
        // Dropping the senders wakes each waiter with an empty selection
        drop(drained);
        count
    }

    /// Number of requests waiting for an answer
    pub fn pending_count(&self) -> usize {
        self.lock().len()
    }

    /// Whether a request for `task_id` is waiting
    pub fn is_pending(&self, task_id: &TaskId) -> bool {
        self.lock().contains_key(task_id)
    }

    /// Run the handshake for an archive and extract whatever the user picked
    pub async fn request_and_extract(
        &self,
        extractor: &Extractor,
        task_id: &TaskId,
        archive: &Path,
        entries: Vec<ArchiveEntryInfo>,
    ) -> Result<Vec<PathBuf>> {
        let selection = self.request(task_id, archive, entries).await;

        if selection.is_empty() {
            info!(task_id = %task_id, ?archive, "nothing selected");
            self.event_tx
                .send(Event::TaskCompleted {
                    task_id: task_id.clone(),
                    message: "nothing selected".to_string(),
                })
                .ok();
            return Ok(Vec::new());
        }

        extractor.extract_selected(archive, &selection, task_id).await
    }
}
