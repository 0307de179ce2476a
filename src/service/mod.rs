//! Service composition root split into focused submodules.
//!
//! The `IngestService` struct wires the components together:
//! - [`pipeline`] - classification and archive handling behind the polling loop
//! - [`lifecycle`] - background task startup and graceful shutdown
//!
//! Inbound UI messages are routed here as well.

mod lifecycle;
mod pipeline;


use crate::classifier::Classifier;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::extraction::Extractor;
use crate::messages::{Endpoint, StatusMessage, TaskStatus};
use crate::queue::IngestQueue;
use crate::selection::SelectionCoordinator;
use crate::types::Event;
use pipeline::Pipeline;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

/// Main service instance (cloneable - all fields are Arc-wrapped)
#[derive(Clone)]
pub struct IngestService {
    /// Configuration (wrapped in Arc for sharing across tasks)
    pub(crate) config: Arc<Config>,
    /// Event broadcast channel sender (multiple subscribers supported)
    pub(crate) event_tx: tokio::sync::broadcast::Sender<Event>,
    /// Ingestion queue shared with the watcher and the polling loop
    pub(crate) queue: Arc<IngestQueue>,
    /// Outstanding selection handshakes
    pub(crate) coordinator: Arc<SelectionCoordinator>,
    /// Classifier/extractor behind the polling loop
    pub(crate) pipeline: Arc<Pipeline>,
    /// Service-wide cancellation (fired by shutdown)
    pub(crate) cancel: CancellationToken,
    /// Tracks every spawned background task so shutdown can wait for them
    pub(crate) tracker: TaskTracker,
    /// Flag to indicate whether new files are accepted (set to false during shutdown)
    pub(crate) accepting_new: Arc<AtomicBool>,
    /// Set once background tasks have been spawned
    pub(crate) started: Arc<AtomicBool>,
}

impl IngestService {
    /// Create a new service instance
    ///
    /// This validates the configuration, sets up the event broadcast channel and
    /// restores the queue from its snapshot. Nothing runs until [`start`](Self::start).
    ///
    /// # Errors
    /// Returns [`Error::Config`] when the configuration is inconsistent.
    pub async fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let config = Arc::new(config);

        // Create broadcast channel with buffer size of 1000 events
        let (event_tx, _rx) = tokio::sync::broadcast::channel(1000);

        let cancel = CancellationToken::new();
        let tracker = TaskTracker::new();

        let queue = Arc::new(IngestQueue::new(&config, event_tx.clone()));
        let restored = queue.load_snapshot().await;

        let coordinator = Arc::new(SelectionCoordinator::new(
            config.selection.timeout,
            event_tx.clone(),
            cancel.clone(),
        ));
        let extractor = Extractor::new(Arc::clone(&config), event_tx.clone(), cancel.clone());
        let classifier = Classifier::new(Arc::clone(&config), event_tx.clone())?;

        let pipeline = Arc::new(Pipeline::new(
            Arc::clone(&config),
            classifier,
            extractor,
            Arc::clone(&coordinator),
            tracker.clone(),
            cancel.clone(),
        ));

        info!(
            directories = config.watch.directories.len(),
            restored, "ingest service created"
        );

        Ok(Self {
            config,
            event_tx,
            queue,
            coordinator,
            pipeline,
            cancel,
            tracker,
            accepting_new: Arc::new(AtomicBool::new(true)),
            started: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Subscribe to service events
    ///
    /// Multiple subscribers are supported. A subscriber that falls more than
    /// 1000 events behind receives `RecvError::Lagged`.
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Get the current configuration
    pub fn get_config(&self) -> Arc<Config> {
        Arc::clone(&self.config)
    }

    /// The ingestion queue
    pub fn queue(&self) -> &Arc<IngestQueue> {
        &self.queue
    }

    /// The selection coordinator
    pub fn selections(&self) -> &Arc<SelectionCoordinator> {
        &self.coordinator
    }

    /// Enqueue a path by hand (e.g. a file dropped onto the UI)
    ///
    /// Rejected once shutdown has begun, for ignored paths and for unwatched extensions.
    pub fn enqueue(&self, path: &Path) -> bool {
        if !self.accepting_new.load(Ordering::SeqCst) {
            debug!(?path, "shutting down, not accepting new files");
            return false;
        }
        if !self.queue.allows(path) {
            debug!(?path, "not a watched file type");
            return false;
        }
        self.queue.enqueue(path)
    }

    /// Never ingest `path` again, purging it from the queue
    pub fn ignore(&self, path: &Path) -> bool {
        self.queue.ignore(path)
    }

    /// Route a message received from the UI
    ///
    /// Only archive selections on the `extract` endpoint are acted upon. A
    /// selection payload that is not a JSON list of paths counts as an empty
    /// selection. Returns whether a waiting task consumed the message.
    pub fn handle_inbound(&self, endpoint: Endpoint, message: StatusMessage) -> bool {
        if endpoint != Endpoint::Extract || message.status != TaskStatus::UserArchiveSelection {
            debug!(%endpoint, status = ?message.status, task_id = %message.task_id, "ignoring inbound message");
            return false;
        }

        let paths = message.selected_paths().unwrap_or_else(|e| {
            warn!(task_id = %message.task_id, error = %e, "malformed selection payload, treating as empty");
            Vec::new()
        });

        self.coordinator.resolve(&message.task_id, paths)
    }

    /// Parse and route a raw inbound message
    ///
    /// # Errors
    /// Returns [`Error::Serialization`] if `payload` is not a status message.
    pub fn handle_inbound_json(&self, endpoint: &str, payload: &str) -> Result<bool> {
        let Some(endpoint) = Endpoint::parse(endpoint) else {
            debug!(endpoint, "ignoring message for unknown endpoint");
            return Ok(false);
        };
        let message: StatusMessage = serde_json::from_str(payload).map_err(Error::from)?;
        Ok(self.handle_inbound(endpoint, message))
    }
}
