//! Download directory watching
//!
//! Observes each configured download directory (non-recursively) and feeds new
//! or renamed files with a watched extension into the [`IngestQueue`]. Browsers
//! usually write `name.zip.part` and rename it to `name.zip` when finished, so
//! renames matter as much as creations.
//!
//! # Example
//!
//! ```no_run
//! use mod_ingest::{config::Config, folder_watcher::DirectoryWatcher, queue::IngestQueue};
//! use std::sync::Arc;
//! use tokio::sync::broadcast;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::default();
//! let (event_tx, _rx) = broadcast::channel(1000);
//! let queue = Arc::new(IngestQueue::new(&config, event_tx));
//!
//! let mut watcher = DirectoryWatcher::new(queue)?;
//! watcher.start(&["/home/me/Downloads".into()])?;
//!
//! // Runs until the token is cancelled
//! watcher.run(CancellationToken::new()).await;
//! # Ok(())
//! # }
//! ```

use crate::error::{Error, Result};
use crate::queue::IngestQueue;
use crate::utils::normalize_path;
use notify::event::{ModifyKind, RenameMode};
use notify::{
    Config as NotifyConfig, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Watches download directories and forwards matching files to the queue
pub struct DirectoryWatcher {
    /// Filesystem watcher instance
    watcher: RecommendedWatcher,

    /// Channel for receiving filesystem events
    rx: mpsc::UnboundedReceiver<notify::Result<Event>>,

    queue: Arc<IngestQueue>,

    /// Directories currently registered with the watcher
    watched: Vec<PathBuf>,
}

impl DirectoryWatcher {
    /// Create a watcher that feeds `queue`
    ///
    /// # Errors
    /// Returns error if the filesystem watcher cannot be initialized
    pub fn new(queue: Arc<IngestQueue>) -> Result<Self> {
        let (tx, rx) = mpsc::unbounded_channel();

        let watcher = RecommendedWatcher::new(
            move |res| {
                if let Err(e) = tx.send(res) {
                    error!(error = %e, "failed to forward filesystem event");
                }
            },
            NotifyConfig::default(),
        )
        .map_err(|e| Error::FolderWatch(e.to_string()))?;

        Ok(Self {
            watcher,
            rx,
            queue,
            watched: Vec::new(),
        })
    }

    /// Register `directories` with the watcher
    ///
    /// Missing directories are skipped with a warning and duplicates are
    /// watched once. Returns the number of directories now being watched.
    ///
    /// # Errors
    /// Returns error if an existing directory cannot be watched (e.g. permission denied)
    pub fn start(&mut self, directories: &[PathBuf]) -> Result<usize> {
        for dir in directories {
            let dir = normalize_path(dir);

            if self.watched.contains(&dir) {
                debug!(path = ?dir, "directory already watched");
                continue;
            }

            if !dir.is_dir() {
                warn!(path = ?dir, "watch directory does not exist, skipping");
                continue;
            }

            self.watcher
                .watch(&dir, RecursiveMode::NonRecursive)
                .map_err(|e| Error::FolderWatch(format!("Failed to watch {}: {}", dir.display(), e)))?;

            info!(path = ?dir, "watching directory");
            self.watched.push(dir);
        }

        Ok(self.watched.len())
    }

    /// Directories currently being watched
    pub fn watched(&self) -> &[PathBuf] {
        &self.watched
    }

    /// Run the event loop until `cancel` fires
    ///
    /// Flushes the queue snapshot before the watch handles are released.
    pub async fn run(mut self, cancel: CancellationToken) {
        info!(directories = self.watched.len(), "directory watcher started");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                received = self.rx.recv() => match received {
                    Some(Ok(event)) => self.handle_event(event),
                    Some(Err(e)) => error!(error = %e, "filesystem watcher error"),
                    None => break,
                },
            }
        }

        self.queue.persist_snapshot().await;
        drop(self.watcher);
        info!("directory watcher stopped");
    }

    /// Translate one filesystem event into queue operations
    fn handle_event(&self, event: Event) {
        match event.kind {
            EventKind::Create(_) => {
                for path in &event.paths {
                    if self.queue.allows(path) {
                        self.queue.enqueue(path);
                    } else if !self.queue.is_partial(path) {
                        debug!(?path, "ignoring file with unwatched extension");
                    }
                }
            }
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
                if let [from, to] = event.paths.as_slice() {
                    debug!(?from, ?to, "file renamed");
                    self.queue.rename(from, to);
                }
            }
            EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
                for path in &event.paths {
                    if self.queue.allows(path) {
                        self.queue.enqueue(path);
                    }
                }
            }
            EventKind::Modify(ModifyKind::Name(RenameMode::Any | RenameMode::Other)) => {
                // Unpaired rename: only the side that still exists is interesting
                for path in &event.paths {
                    if path.is_file() && self.queue.allows(path) {
                        self.queue.enqueue(path);
                    }
                }
            }
            _ => {}
        }
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use notify::event::CreateKind;
    use tempfile::TempDir;
    use tokio::sync::broadcast;
    use tokio::time::{Duration, sleep};

    fn create_watcher(temp_dir: &TempDir) -> (DirectoryWatcher, Arc<IngestQueue>) {
        let mut config = Config::default();
        config.persistence.snapshot_path = temp_dir.path().join("queue.json");
        let (tx, _rx) = broadcast::channel(64);
        let queue = Arc::new(IngestQueue::new(&config, tx));
        (DirectoryWatcher::new(Arc::clone(&queue)).unwrap(), queue)
    }

    fn event(kind: EventKind, paths: &[PathBuf]) -> Event {
        paths
            .iter()
            .fold(Event::new(kind), |event, path| event.add_path(path.clone()))
    }

    #[test]
    fn start_skips_missing_and_duplicate_directories() {
        let temp_dir = TempDir::new().unwrap();
        let (mut watcher, _queue) = create_watcher(&temp_dir);
        let downloads = temp_dir.path().join("downloads");
        std::fs::create_dir(&downloads).unwrap();

        let count = watcher
            .start(&[
                downloads.clone(),
                temp_dir.path().join("missing"),
                downloads.clone(),
            ])
            .unwrap();

        assert_eq!(count, 1);
        assert_eq!(watcher.watched(), &[downloads]);
    }

    #[test]
    fn create_enqueues_watched_extensions_only() {
        let temp_dir = TempDir::new().unwrap();
        let (watcher, queue) = create_watcher(&temp_dir);
        let archive = temp_dir.path().join("pack.zip");
        let partial = temp_dir.path().join("pack.zip.part");
        let other = temp_dir.path().join("notes.txt");

        watcher.handle_event(event(
            EventKind::Create(CreateKind::File),
            &[archive.clone(), partial.clone(), other.clone()],
        ));

        assert!(queue.contains(&archive));
        assert!(!queue.contains(&partial));
        assert!(!queue.contains(&other));
    }

    #[test]
    fn partial_download_rename_enqueues_final_name() {
        let temp_dir = TempDir::new().unwrap();
        let (watcher, queue) = create_watcher(&temp_dir);
        let partial = temp_dir.path().join("pack.zip.part");
        let finished = temp_dir.path().join("pack.zip");

        watcher.handle_event(event(
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)),
            &[partial, finished.clone()],
        ));

        assert_eq!(queue.keys(), vec![finished]);
    }

    #[test]
    fn rename_of_tracked_file_keeps_retries() {
        let temp_dir = TempDir::new().unwrap();
        let (watcher, queue) = create_watcher(&temp_dir);
        let old = temp_dir.path().join("a.pmp");
        let new = temp_dir.path().join("b.pmp");
        queue.enqueue(&old);
        queue.increment_retry(&old);

        watcher.handle_event(event(
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)),
            &[old.clone(), new.clone()],
        ));

        assert!(!queue.contains(&old));
        assert_eq!(queue.get(&new).unwrap().retry_count, 1);
    }

    #[test]
    fn rename_target_only_is_a_fresh_arrival() {
        let temp_dir = TempDir::new().unwrap();
        let (watcher, queue) = create_watcher(&temp_dir);
        let target = temp_dir.path().join("hat.ttmp2");

        watcher.handle_event(event(
            EventKind::Modify(ModifyKind::Name(RenameMode::To)),
            &[target.clone()],
        ));
        watcher.handle_event(event(
            EventKind::Modify(ModifyKind::Name(RenameMode::From)),
            &[temp_dir.path().join("gone.pmp")],
        ));

        assert_eq!(queue.keys(), vec![target]);
    }

    #[tokio::test]
    async fn run_flushes_snapshot_on_cancel() {
        let temp_dir = TempDir::new().unwrap();
        let (mut watcher, queue) = create_watcher(&temp_dir);
        let downloads = temp_dir.path().join("downloads");
        std::fs::create_dir(&downloads).unwrap();
        watcher.start(&[downloads.clone()]).unwrap();

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(watcher.run(cancel.clone()));

        let file = downloads.join("hat.pmp");
        std::fs::write(&file, b"mod").unwrap();

        // Wait for the OS notification to arrive
        for _ in 0..100 {
            if queue.contains(&file) {
                break;
            }
            sleep(Duration::from_millis(20)).await;
        }
        assert!(queue.contains(&file));

        cancel.cancel();
        handle.await.unwrap();

        let raw = std::fs::read_to_string(queue.snapshot_path()).unwrap();
        assert!(raw.contains("hat.pmp"));
    }
}
