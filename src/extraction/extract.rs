use crate::config::Config;
use crate::error::{Error, Result};
use crate::types::{Event, TaskId};
use crate::utils::remove_file_with_retry;
use futures::{StreamExt, TryStreamExt};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::{Semaphore, broadcast};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::shared::{extraction_dir, member_destination};
use super::{ArchiveReader, open_archive};

/// Selective, bounded-parallel archive extraction
#[derive(Clone)]
pub struct Extractor {
    config: Arc<Config>,
    event_tx: broadcast::Sender<Event>,
    cancel: CancellationToken,
}

impl Extractor {
    /// Create an extractor that reports through `event_tx` and stops when `cancel` fires
    pub fn new(
        config: Arc<Config>,
        event_tx: broadcast::Sender<Event>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config,
            event_tx,
            cancel,
        }
    }

    fn emit_progress(&self, task_id: &TaskId, progress: u8, message: impl Into<String>) {
        self.event_tx
            .send(Event::ExtractionProgress {
                task_id: task_id.clone(),
                progress,
                message: message.into(),
            })
            .ok();
    }

    /// Publish [`Event::TaskFailed`] for `path`
    pub fn report_failure(&self, task_id: &TaskId, path: &Path, error: &Error) {
        self.event_tx
            .send(Event::TaskFailed {
                task_id: task_id.clone(),
                path: path.to_path_buf(),
                error: error.to_string(),
            })
            .ok();
    }

    /// Extract the members of `archive` listed in `selected`
    ///
    /// Members not present in the archive are ignored. Returns every file
    /// written. Failures are reported here (events and logs) before being
    /// returned: an invalid archive is deleted and reported as failed,
    /// cancellation is logged at info, anything else emits [`Event::TaskFailed`].
    /// Files already written are kept.
    pub async fn extract_selected(
        &self,
        archive: &Path,
        selected: &[String],
        task_id: &TaskId,
    ) -> Result<Vec<PathBuf>> {
        match self.try_extract(archive, selected, task_id).await {
            Ok(files) => Ok(files),
            Err(e) if e.is_invalid_archive() => {
                warn!(task_id = %task_id, path = ?archive, error = %e, "invalid archive, deleting");
                let _ = remove_file_with_retry(archive, &self.config.delete_retry).await;
                self.report_failure(task_id, archive, &e);
                Err(e)
            }
            Err(e) if e.is_cancelled() => {
                info!(task_id = %task_id, path = ?archive, "extraction cancelled");
                Err(e)
            }
            Err(e) => {
                error!(task_id = %task_id, path = ?archive, error = %e, "extraction failed");
                self.report_failure(task_id, archive, &e);
                Err(e)
            }
        }
    }

    async fn try_extract(
        &self,
        archive: &Path,
        selected: &[String],
        task_id: &TaskId,
    ) -> Result<Vec<PathBuf>> {
        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let archive_path = archive.to_path_buf();
        let (reader, members) = tokio::task::spawn_blocking(move || {
            let mut reader = open_archive(&archive_path)?;
            let members = reader.entries()?;
            Ok::<_, Error>((reader, members))
        })
        .await
        .map_err(|e| Error::Other(format!("archive open task panicked: {e}")))??;

        let wanted: HashSet<&str> = selected.iter().map(String::as_str).collect();
        let chosen: Vec<String> = members
            .into_iter()
            .filter(|m| !m.is_dir && wanted.contains(m.relative_path.as_str()))
            .map(|m| m.relative_path)
            .collect();

        if chosen.is_empty() {
            debug!(task_id = %task_id, path = ?archive, "selection matches no archive members");
            self.emit_progress(task_id, 100, "Nothing to extract");
            self.event_tx
                .send(Event::TaskCompleted {
                    task_id: task_id.clone(),
                    message: "Nothing to extract".to_string(),
                })
                .ok();
            return Ok(vec![]);
        }

        let dest_root = extraction_dir(archive)?;
        let targets = chosen
            .into_iter()
            .map(|rel| member_destination(&dest_root, archive, &rel).map(|dest| (rel, dest)))
            .collect::<Result<Vec<_>>>()?;

        let total = targets.len();
        let parallelism = self.config.extraction.parallelism();
        info!(
            task_id = %task_id,
            path = ?archive,
            members = total,
            parallelism,
            "extracting selected members"
        );

        let reader: Arc<std::sync::Mutex<Box<dyn ArchiveReader>>> =
            Arc::new(std::sync::Mutex::new(reader));
        let permits = Arc::new(Semaphore::new(parallelism * 2));
        let completed = Arc::new(AtomicUsize::new(0));

        let files: Vec<PathBuf> = futures::stream::iter(targets.into_iter().map(|(rel, dest)| {
            let reader = Arc::clone(&reader);
            let permits = Arc::clone(&permits);
            let completed = Arc::clone(&completed);
            async move {
                if self.cancel.is_cancelled() {
                    return Err(Error::Cancelled);
                }
                let _permit = permits.acquire_owned().await.map_err(|_| Error::ShuttingDown)?;

                if let Some(parent) = dest.parent() {
                    tokio::fs::create_dir_all(parent).await?;
                }

                let dest_bg = dest.clone();
                let rel_bg = rel.clone();
                tokio::task::spawn_blocking(move || {
                    // Archive readers are not reentrant; one member at a time
                    let mut guard = reader.lock().unwrap_or_else(|e| e.into_inner());
                    guard.extract_entry(&rel_bg, &dest_bg)
                })
                .await
                .map_err(|e| Error::Other(format!("extraction task panicked: {e}")))??;

                let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
                let progress = (done * 100 / total) as u8;
                debug!(task_id = %task_id, member = %rel, progress, "extracted member");
                self.emit_progress(task_id, progress, format!("Extracted {rel}"));

                Ok::<_, Error>(dest)
            }
        }))
        .buffer_unordered(parallelism)
        .try_collect()
        .await?;

        // Release the archive handle before any deletion attempt
        drop(reader);

        self.emit_progress(task_id, 100, "Extraction complete");
        self.event_tx
            .send(Event::FilesExtracted {
                task_id: task_id.clone(),
                archive: archive.to_path_buf(),
                files: files.clone(),
            })
            .ok();

        info!(task_id = %task_id, path = ?archive, files = files.len(), "extraction finished");

        if self.config.install.auto_delete_archives {
            tokio::time::sleep(self.config.extraction.auto_delete_delay).await;
            if remove_file_with_retry(archive, &self.config.delete_retry)
                .await
                .is_ok()
            {
                info!(task_id = %task_id, path = ?archive, "deleted extracted archive");
            }
        }

        Ok(files)
    }
}
