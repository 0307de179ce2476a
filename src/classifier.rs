//! Decide what a finished download is and move it where it belongs

use crate::config::Config;
use crate::error::Result;
use crate::extraction::{LegacyMatcher, build_listing, list_members};
use crate::types::{ArchiveEntryInfo, Event, TaskId};
use crate::utils::relocate_file;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info};

/// Outcome of classifying one ready file
#[derive(Debug, Clone, PartialEq)]
pub enum Classification {
    /// A directly installable mod file; `destination` is where it now lives
    ModFile {
        /// Final location (unchanged when relocation is disabled)
        destination: PathBuf,
    },
    /// An archive containing mod files, ready for the selection step
    Archive {
        /// Final location of the archive
        path: PathBuf,
        /// Installable members
        entries: Vec<ArchiveEntryInfo>,
    },
    /// An archive without any mod files; left where it was
    NoModFiles,
    /// Neither a mod file nor an archive
    Unhandled,
}

/// Classifies ready files and relocates the interesting ones
pub struct Classifier {
    config: Arc<Config>,
    legacy: LegacyMatcher,
    event_tx: broadcast::Sender<Event>,
}

impl Classifier {
    /// Build a classifier; fails when a legacy pattern does not compile
    pub fn new(config: Arc<Config>, event_tx: broadcast::Sender<Event>) -> Result<Self> {
        let legacy = LegacyMatcher::new(&config.extraction.legacy_patterns)?;
        Ok(Self {
            config,
            legacy,
            event_tx,
        })
    }

    async fn relocate(&self, path: &Path) -> Result<PathBuf> {
        let install = &self.config.install;
        match (install.relocate_files, &install.mod_destination) {
            (true, Some(root)) => {
                relocate_file(path, root, install.file_collision, &self.config.delete_retry).await
            }
            _ => Ok(path.to_path_buf()),
        }
    }

    /// Classify `path` and relocate it when it is a mod file or a mod archive
    ///
    /// # Errors
    /// Archive errors ([`Error::InvalidArchive`](crate::Error::InvalidArchive)
    /// included) and relocation failures are returned to the caller.
    pub async fn classify(&self, path: &Path, task_id: &TaskId) -> Result<Classification> {
        let extraction = &self.config.extraction;

        if extraction.is_mod_file(path) {
            let destination = self.relocate(path).await?;
            info!(task_id = %task_id, source = ?path, ?destination, "mod file detected");
            self.event_tx
                .send(Event::FileMoved {
                    task_id: task_id.clone(),
                    source: path.to_path_buf(),
                    destination: destination.clone(),
                })
                .ok();
            return Ok(Classification::ModFile { destination });
        }

        if extraction.is_archive(path) {
            let raw = list_members(path).await?;
            let has_mods = raw
                .iter()
                .any(|m| !m.is_dir && extraction.is_mod_file(Path::new(&m.relative_path)));
            if !has_mods {
                info!(task_id = %task_id, ?path, "archive contains no mod files, leaving it alone");
                return Ok(Classification::NoModFiles);
            }

            let archive = self.relocate(path).await?;
            let entries = build_listing(raw, extraction, &self.legacy, self.config.install.skip_legacy);
            debug!(
                task_id = %task_id,
                path = ?archive,
                entries = entries.len(),
                "archive ready for selection"
            );
            return Ok(Classification::Archive {
                path: archive,
                entries,
            });
        }

        info!(task_id = %task_id, ?path, "unhandled file type");
        Ok(Classification::Unhandled)
    }
}
