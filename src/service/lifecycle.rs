//! Startup and shutdown coordination.

use crate::error::{Error, Result};
use crate::folder_watcher::DirectoryWatcher;
use crate::queue::FileProcessor;
use crate::types::Event;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use super::IngestService;

/// How long shutdown waits for in-flight extractions
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

impl IngestService {
    /// Start the background tasks
    ///
    /// Spawns the directory watcher, the queue polling loop and the snapshot
    /// timer. Calling it again is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if the filesystem watcher cannot be created or a
    /// directory cannot be watched, and [`Error::ShuttingDown`] after shutdown.
    pub fn start(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(Error::ShuttingDown);
        }
        if self.started.swap(true, Ordering::SeqCst) {
            tracing::debug!("ingest service already started");
            return Ok(());
        }

        let mut watcher = match DirectoryWatcher::new(Arc::clone(&self.queue)) {
            Ok(watcher) => watcher,
            Err(e) => {
                self.started.store(false, Ordering::SeqCst);
                return Err(e);
            }
        };
        if let Err(e) = watcher.start(&self.config.watch.directories) {
            self.started.store(false, Ordering::SeqCst);
            return Err(e);
        }
        self.tracker.spawn(watcher.run(self.cancel.clone()));

        let processor: Arc<dyn FileProcessor> = self.pipeline.clone();
        self.tracker.spawn(Arc::clone(&self.queue).run(
            processor,
            self.config.watch.poll_interval,
            self.cancel.clone(),
        ));

        self.tracker.spawn(
            Arc::clone(&self.queue)
                .run_snapshot_timer(self.config.watch.snapshot_interval, self.cancel.clone()),
        );

        tracing::info!("ingest service started");
        Ok(())
    }

    /// Gracefully shut down the service
    ///
    /// This method performs a graceful shutdown sequence:
    /// 1. Stops accepting new files
    /// 2. Cancels background loops and releases pending selections
    /// 3. Waits for in-flight tasks with a timeout (30 seconds)
    /// 4. Persists the queue snapshot
    /// 5. Emits [`Event::Shutdown`]
    ///
    /// # Errors
    ///
    /// Currently infallible; the `Result` leaves room for persistence backends
    /// that can fail.
    pub async fn shutdown(&self) -> Result<()> {
        tracing::info!("Initiating graceful shutdown");

        // 1. Stop accepting new files
        self.accepting_new.store(false, Ordering::SeqCst);

        // 2. Stop loops and wake every selection wait
        self.cancel.cancel();
        let released = self.coordinator.cancel_all();
        tracing::info!(released, "Cancelled background work");

        // 3. Wait for tracked tasks with timeout
        self.tracker.close();
        match tokio::time::timeout(SHUTDOWN_TIMEOUT, self.tracker.wait()).await {
            Ok(()) => tracing::info!("All background tasks finished"),
            Err(_) => {
                tracing::warn!("Timeout waiting for background tasks, proceeding with shutdown")
            }
        }

        // 4. Persist final state
        if self.queue.persist_snapshot().await {
            tracing::info!("Final queue snapshot persisted");
        }

        // 5. Emit shutdown event
        let _ = self.event_tx.send(Event::Shutdown);

        tracing::info!("Graceful shutdown complete");
        Ok(())
    }

    /// Whether shutdown has begun
    pub fn is_shutting_down(&self) -> bool {
        !self.accepting_new.load(Ordering::SeqCst)
    }
}
