use crate::error::{Error, ExtractionError, Result};
use std::path::{Path, PathBuf};
use tracing::debug;

use super::shared::normalize_member_path;
use super::{ArchiveFormat, ArchiveReader, RawEntry};

/// Archive reader for RAR files
///
/// unrar exposes a forward-only cursor, so every operation reopens the archive.
pub struct RarReader {
    path: PathBuf,
}

impl RarReader {
    /// Open a RAR archive, verifying that its headers can be read
    pub fn open(path: &Path) -> Result<Self> {
        std::fs::metadata(path)?;

        unrar::Archive::new(path)
            .open_for_listing()
            .map_err(|e| Error::invalid_archive(path, e))?;

        debug!(?path, "opened RAR archive");

        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    fn entry_failed(&self, entry: &str, reason: impl ToString) -> Error {
        ExtractionError::EntryFailed {
            archive: self.path.clone(),
            entry: entry.to_string(),
            reason: reason.to_string(),
        }
        .into()
    }
}

/// RAR stores Windows separators; normalize to the `/` form used everywhere else
fn header_path(filename: &Path) -> String {
    normalize_member_path(&filename.to_string_lossy())
}

impl ArchiveReader for RarReader {
    fn format(&self) -> ArchiveFormat {
        ArchiveFormat::Rar
    }

    fn entries(&mut self) -> Result<Vec<RawEntry>> {
        let listing = unrar::Archive::new(&self.path)
            .open_for_listing()
            .map_err(|e| Error::invalid_archive(&self.path, e))?;

        let mut entries = Vec::new();
        for header in listing {
            let header = header.map_err(|e| Error::invalid_archive(&self.path, e))?;
            entries.push(RawEntry {
                relative_path: header_path(Path::new(&header.filename)),
                size_bytes: header.unpacked_size,
                is_dir: header.is_directory(),
                last_modified: None,
            });
        }

        Ok(entries)
    }

    fn extract_entry(&mut self, relative_path: &str, dest_file: &Path) -> Result<()> {
        let mut at_header = unrar::Archive::new(&self.path)
            .open_for_processing()
            .map_err(|e| Error::invalid_archive(&self.path, e))?;

        loop {
            let at_file = match at_header.read_header() {
                Ok(Some(entry_processor)) => entry_processor,
                Ok(None) => return Err(self.entry_failed(relative_path, "member not found")),
                Err(e) => return Err(self.entry_failed(relative_path, e)),
            };

            let header = at_file.entry();
            if !header.is_directory() && header_path(Path::new(&header.filename)) == relative_path {
                at_file
                    .extract_to(dest_file)
                    .map_err(|e| self.entry_failed(relative_path, e))?;
                return Ok(());
            }

            at_header = at_file
                .skip()
                .map_err(|e| self.entry_failed(relative_path, e))?;
        }
    }
}
