//! What happens to a queued file once it is ready.

use crate::classifier::{Classification, Classifier};
use crate::config::Config;
use crate::error::Result;
use crate::extraction::{Extractor, is_ready};
use crate::queue::FileProcessor;
use crate::selection::SelectionCoordinator;
use crate::types::{ArchiveEntryInfo, TaskId};
use crate::utils::remove_file_with_retry;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, warn};

/// Classifier and extractor as seen by the polling loop
pub(crate) struct Pipeline {
    config: Arc<Config>,
    classifier: Classifier,
    extractor: Extractor,
    coordinator: Arc<SelectionCoordinator>,
    tracker: TaskTracker,
    cancel: CancellationToken,
}

impl Pipeline {
    pub(crate) fn new(
        config: Arc<Config>,
        classifier: Classifier,
        extractor: Extractor,
        coordinator: Arc<SelectionCoordinator>,
        tracker: TaskTracker,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config,
            classifier,
            extractor,
            coordinator,
            tracker,
            cancel,
        }
    }

    /// Hand an inspected archive to a tracked task so the polling loop keeps moving
    fn spawn_archive_task(&self, task_id: TaskId, archive: PathBuf, entries: Vec<ArchiveEntryInfo>) {
        if self.cancel.is_cancelled() {
            debug!(task_id = %task_id, ?archive, "shutting down, archive left for next start");
            return;
        }

        let auto_install = self.config.install.auto_install_all;
        let extractor = self.extractor.clone();
        let coordinator = Arc::clone(&self.coordinator);

        self.tracker.spawn(async move {
            let result = if auto_install {
                let all: Vec<String> = entries.into_iter().map(|e| e.relative_path).collect();
                debug!(task_id = %task_id, ?archive, members = all.len(), "auto-installing archive");
                extractor.extract_selected(&archive, &all, &task_id).await
            } else {
                coordinator
                    .request_and_extract(&extractor, &task_id, &archive, entries)
                    .await
            };

            // Failures were already reported by the extractor
            if let Ok(files) = result {
                debug!(task_id = %task_id, ?archive, files = files.len(), "archive task finished");
            }
        });
    }
}

#[async_trait]
impl FileProcessor for Pipeline {
    async fn is_ready(&self, path: &Path) -> bool {
        is_ready(path, &self.config.readiness, &self.config.watch.partial_suffix).await
    }

    async fn process(&self, path: &Path) -> Result<()> {
        let task_id = TaskId::new();

        match self.classifier.classify(path, &task_id).await {
            Ok(Classification::Archive { path: archive, entries }) => {
                self.spawn_archive_task(task_id, archive, entries);
                Ok(())
            }
            Ok(_) => Ok(()),
            Err(e) if e.is_invalid_archive() => {
                warn!(task_id = %task_id, ?path, error = %e, "invalid archive, deleting");
                let _ = remove_file_with_retry(path, &self.config.delete_retry).await;
                Ok(())
            }
            Err(e) => {
                self.extractor.report_failure(&task_id, path, &e);
                Err(e)
            }
        }
    }
}
