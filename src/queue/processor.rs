use crate::error::Result;
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{Level, debug, error, info, warn};

use super::IngestQueue;

/// Not-ready attempts logged at info before dropping to debug
const INFO_RETRY_LIMIT: u32 = 3;

/// From this many attempts on, every multiple is logged as a warning
const WARN_RETRY_INTERVAL: u32 = 120;

/// Shortest tick accepted by the polling and snapshot loops
pub(crate) const MIN_TICK: Duration = Duration::from_millis(1);

/// What the polling loop does with a queued file
#[async_trait]
pub trait FileProcessor: Send + Sync {
    /// Whether the file has finished downloading
    async fn is_ready(&self, path: &Path) -> bool;

    /// Handle a ready file. The path leaves the queue afterwards either way.
    async fn process(&self, path: &Path) -> Result<()>;
}

/// Counters from one pass over the queue
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PassSummary {
    /// Files handed to the processor
    pub processed: usize,
    /// Files left queued because they are not ready
    pub waiting: usize,
    /// Files dropped because they were ignored or vanished
    pub dropped: usize,
}

fn not_ready_level(attempt: u32) -> Level {
    if attempt >= WARN_RETRY_INTERVAL && attempt % WARN_RETRY_INTERVAL == 0 {
        Level::WARN
    } else if attempt <= INFO_RETRY_LIMIT {
        Level::INFO
    } else {
        Level::DEBUG
    }
}

fn log_not_ready(path: &Path, attempt: u32) {
    let level = not_ready_level(attempt);
    if level == Level::WARN {
        warn!(?path, attempt, "file still not ready");
    } else if level == Level::INFO {
        info!(?path, attempt, "file not ready yet");
    } else {
        debug!(?path, attempt, "file not ready yet");
    }
}

impl IngestQueue {
    /// Process every queued path once
    ///
    /// Works on a copy of the keys, so paths enqueued meanwhile wait for the next pass.
    pub async fn process_pass(
        &self,
        processor: &dyn FileProcessor,
        cancel: &CancellationToken,
    ) -> PassSummary {
        let mut summary = PassSummary::default();

        for path in self.keys() {
            if cancel.is_cancelled() {
                break;
            }

            if self.is_ignored(&path) {
                self.remove(&path);
                summary.dropped += 1;
                continue;
            }

            if !path.exists() {
                debug!(?path, "queued file vanished");
                self.remove(&path);
                summary.dropped += 1;
                continue;
            }

            if !processor.is_ready(&path).await {
                if let Some(attempt) = self.increment_retry(&path) {
                    log_not_ready(&path, attempt);
                }
                summary.waiting += 1;
                continue;
            }

            self.reset_retry(&path);
            if let Err(e) = processor.process(&path).await {
                error!(?path, error = %e, "failed to process file");
            }
            self.remove(&path);
            summary.processed += 1;
        }

        summary
    }

    /// Poll the queue every `poll_interval` until cancelled
    ///
    /// The snapshot is rewritten after any pass that changed the queue.
    pub async fn run(
        self: Arc<Self>,
        processor: Arc<dyn FileProcessor>,
        poll_interval: Duration,
        cancel: CancellationToken,
    ) {
        let poll_interval = poll_interval.max(MIN_TICK);
        info!(interval_ms = poll_interval.as_millis() as u64, "queue processor started");

        let mut ticker = tokio::time::interval(poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let summary = self.process_pass(processor.as_ref(), &cancel).await;
            if summary != PassSummary::default() {
                debug!(
                    processed = summary.processed,
                    waiting = summary.waiting,
                    dropped = summary.dropped,
                    "queue pass finished"
                );
            }

            if self.is_dirty() {
                self.persist_snapshot().await;
            }
        }

        info!("queue processor stopped");
    }
}
