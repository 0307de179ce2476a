//! Deduplicated, persistent ingestion queue
//!
//! The queue is keyed by normalized absolute path and keeps insertion order.
//! Watcher events feed it, the polling loop ([`IngestQueue::run`]) drains it,
//! and a JSON snapshot lets it survive restarts.

mod ignore;
mod processor;
mod snapshot;


pub use ignore::IgnoreList;
pub use processor::{FileProcessor, PassSummary};

use crate::config::{Config, has_extension};
use crate::types::{Event, QueueEntry};
use crate::utils::normalize_path;
use indexmap::IndexMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::broadcast;
use tracing::debug;

/// Ordered set of files waiting to be ingested
pub struct IngestQueue {
    entries: Mutex<IndexMap<PathBuf, QueueEntry>>,
    ignored: IgnoreList,
    allowed_extensions: Vec<String>,
    partial_suffix: String,
    snapshot_path: PathBuf,
    dirty: AtomicBool,
    event_tx: broadcast::Sender<Event>,
}

impl IngestQueue {
    /// Create an empty queue from the watch/extraction/persistence settings
    pub fn new(config: &Config, event_tx: broadcast::Sender<Event>) -> Self {
        Self {
            entries: Mutex::new(IndexMap::new()),
            ignored: IgnoreList::new(&config.watch.ignored_paths),
            allowed_extensions: config.watched_extensions(),
            partial_suffix: config.watch.partial_suffix.trim_start_matches('.').to_string(),
            snapshot_path: config.persistence.snapshot_path.clone(),
            dirty: AtomicBool::new(false),
            event_tx,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, IndexMap<PathBuf, QueueEntry>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::SeqCst);
    }

    /// Whether the queue changed since the last successful snapshot
    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::SeqCst)
    }

    /// Whether `path` ends in the partial-download suffix
    pub fn is_partial(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case(&self.partial_suffix))
    }

    /// Whether `path` has an extension the pipeline cares about
    pub fn allows(&self, path: &Path) -> bool {
        !self.is_partial(path) && has_extension(path, &self.allowed_extensions)
    }

    /// Add or refresh a path
    ///
    /// Ignored paths are rejected (and purged if somehow present). A path that is
    /// already queued gets a fresh timestamp and a zero retry count.
    pub fn enqueue(&self, path: &Path) -> bool {
        let path = normalize_path(path);
        if self.ignored.contains(&path) {
            debug!(?path, "ignored path not enqueued");
            self.remove(&path);
            return false;
        }

        self.lock()
            .insert(path.clone(), QueueEntry::new(path.clone()));
        self.mark_dirty();
        debug!(?path, "file queued");
        self.event_tx.send(Event::FileQueued { path }).ok();
        true
    }

    /// Follow a rename of `old` to `new`
    ///
    /// A tracked entry keeps its retry count. An untracked source is treated
    /// as a fresh arrival of `new` when `new` has an allowed extension.
    pub fn rename(&self, old: &Path, new: &Path) -> bool {
        let old = normalize_path(old);
        let new = normalize_path(new);

        if self.ignored.contains(&new) || self.is_partial(&new) {
            self.remove(&old);
            return false;
        }

        let moved = {
            let mut entries = self.lock();
            match entries.shift_remove(&old) {
                Some(mut entry) => {
                    entry.path = new.clone();
                    entries.insert(new.clone(), entry);
                    true
                }
                None => false,
            }
        };

        if moved {
            self.mark_dirty();
            debug!(?old, ?new, "queued file renamed");
            self.event_tx.send(Event::FileRemoved { path: old }).ok();
            self.event_tx.send(Event::FileQueued { path: new }).ok();
            return true;
        }

        if self.allows(&new) {
            return self.enqueue(&new);
        }
        false
    }

    /// Drop a path from the queue; returns whether it was present
    pub fn remove(&self, path: &Path) -> bool {
        let path = normalize_path(path);
        let removed = self.lock().shift_remove(&path).is_some();
        if removed {
            self.mark_dirty();
            debug!(?path, "file removed from queue");
            self.event_tx.send(Event::FileRemoved { path }).ok();
        }
        removed
    }

    /// Whether `path` is queued
    pub fn contains(&self, path: &Path) -> bool {
        self.lock().contains_key(&normalize_path(path))
    }

    /// Entry for `path`, if queued
    pub fn get(&self, path: &Path) -> Option<QueueEntry> {
        self.lock().get(&normalize_path(path)).cloned()
    }

    /// Number of queued paths
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether the queue is empty
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Queued paths in insertion order
    pub fn keys(&self) -> Vec<PathBuf> {
        self.lock().keys().cloned().collect()
    }

    /// Queued entries in insertion order
    pub fn entries(&self) -> Vec<QueueEntry> {
        self.lock().values().cloned().collect()
    }

    /// Bump the retry counter; returns the new count if the path is queued
    pub fn increment_retry(&self, path: &Path) -> Option<u32> {
        let mut entries = self.lock();
        let entry = entries.get_mut(&normalize_path(path))?;
        entry.retry_count = entry.retry_count.saturating_add(1);
        Some(entry.retry_count)
    }

    /// Reset the retry counter of a queued path
    pub fn reset_retry(&self, path: &Path) {
        if let Some(entry) = self.lock().get_mut(&normalize_path(path)) {
            entry.retry_count = 0;
        }
    }

    /// The ignore list consulted by this queue
    pub fn ignore_list(&self) -> &IgnoreList {
        &self.ignored
    }

    /// Ignore `path` from now on, purging it from the queue
    pub fn ignore(&self, path: &Path) -> bool {
        let added = self.ignored.add(path);
        self.remove(path);
        added
    }

    /// Stop ignoring `path`; it is not re-enqueued automatically
    pub fn unignore(&self, path: &Path) -> bool {
        self.ignored.remove(path)
    }

    /// Whether `path` is on the ignore list
    pub fn is_ignored(&self, path: &Path) -> bool {
        self.ignored.contains(path)
    }

    /// Location of the snapshot file
    pub fn snapshot_path(&self) -> &Path {
        &self.snapshot_path
    }
}
