use crate::types::QueueEntry;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::IngestQueue;
use super::processor::MIN_TICK;

/// On-disk form: `{ "<absolute path>": "<RFC 3339 timestamp>" }`
type Snapshot = IndexMap<PathBuf, DateTime<Utc>>;

impl IngestQueue {
    /// Restore queued paths from the snapshot file
    ///
    /// Ignored and vanished paths are dropped and every restored entry starts
    /// with a zero retry count. Never fails: a missing file is an empty queue, a
    /// malformed one is logged and skipped. Returns the number of paths restored.
    pub async fn load_snapshot(&self) -> usize {
        let contents = match tokio::fs::read_to_string(&self.snapshot_path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = ?self.snapshot_path, "no queue snapshot found");
                return 0;
            }
            Err(e) => {
                warn!(path = ?self.snapshot_path, error = %e, "failed to read queue snapshot");
                return 0;
            }
        };

        let snapshot: Snapshot = match serde_json::from_str(&contents) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(path = ?self.snapshot_path, error = %e, "malformed queue snapshot, starting empty");
                return 0;
            }
        };

        let mut restored = 0;
        let mut dropped = 0;
        {
            let mut entries = self.lock();
            for (path, enqueued_at) in snapshot {
                if self.ignored.contains(&path) || !path.exists() {
                    dropped += 1;
                    continue;
                }
                entries.insert(
                    path.clone(),
                    QueueEntry {
                        path,
                        enqueued_at,
                        retry_count: 0,
                    },
                );
                restored += 1;
            }
        }

        if dropped > 0 {
            self.mark_dirty();
        }
        info!(restored, dropped, "restored queue snapshot");
        restored
    }

    /// Write the current queue to the snapshot file
    ///
    /// Writes a temporary sibling first and renames it over the snapshot.
    /// Failures are logged and reported as `false`.
    pub async fn persist_snapshot(&self) -> bool {
        let snapshot: Snapshot = self
            .lock()
            .values()
            .map(|entry| (entry.path.clone(), entry.enqueued_at))
            .collect();
        // Cleared up front so changes made while writing are not lost
        self.dirty.store(false, Ordering::SeqCst);

        match self.write_snapshot(&snapshot).await {
            Ok(()) => {
                debug!(path = ?self.snapshot_path, entries = snapshot.len(), "queue snapshot written");
                true
            }
            Err(e) => {
                self.mark_dirty();
                error!(path = ?self.snapshot_path, error = %e, "failed to write queue snapshot");
                false
            }
        }
    }

    async fn write_snapshot(&self, snapshot: &Snapshot) -> crate::Result<()> {
        let json = serde_json::to_string_pretty(snapshot)?;

        if let Some(parent) = self.snapshot_path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut tmp = self.snapshot_path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &self.snapshot_path).await?;
        Ok(())
    }

    /// Persist the snapshot every `interval` until cancelled
    pub async fn run_snapshot_timer(self: Arc<Self>, interval: Duration, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(interval.max(MIN_TICK));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    self.persist_snapshot().await;
                }
            }
        }
        debug!("snapshot timer stopped");
    }
}
