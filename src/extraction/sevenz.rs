use crate::error::{Error, ExtractionError, Result};
use sevenz_rust::{Password, SevenZReader};
use std::path::{Path, PathBuf};
use tracing::debug;

use super::shared::normalize_member_path;
use super::{ArchiveFormat, ArchiveReader, RawEntry};

/// Archive reader for 7z files
///
/// Solid 7z blocks can only be decoded front to back, so extracting a single
/// member streams through the block and discards everything before it.
pub struct SevenZipReader {
    path: PathBuf,
    reader: SevenZReader<std::fs::File>,
}

impl SevenZipReader {
    /// Open a 7z archive and parse its header
    pub fn open(path: &Path) -> Result<Self> {
        // Surface missing/unreadable files as I/O rather than format errors
        std::fs::metadata(path)?;

        let reader = SevenZReader::open(path, Password::empty())
            .map_err(|e| Error::invalid_archive(path, e))?;

        debug!(?path, "opened 7z archive");

        Ok(Self {
            path: path.to_path_buf(),
            reader,
        })
    }
}

impl ArchiveReader for SevenZipReader {
    fn format(&self) -> ArchiveFormat {
        ArchiveFormat::SevenZip
    }

    fn entries(&mut self) -> Result<Vec<RawEntry>> {
        Ok(self
            .reader
            .archive()
            .files
            .iter()
            .map(|entry| RawEntry {
                relative_path: normalize_member_path(&entry.name),
                size_bytes: entry.size,
                is_dir: entry.is_directory,
                last_modified: None,
            })
            .collect())
    }

    fn extract_entry(&mut self, relative_path: &str, dest_file: &Path) -> Result<()> {
        let mut outcome: Option<std::io::Result<u64>> = None;

        let walk = self.reader.for_each_entries(|entry, reader| {
            if !entry.is_directory && normalize_member_path(&entry.name) == relative_path {
                outcome = Some(
                    std::fs::File::create(dest_file).and_then(|mut out| std::io::copy(reader, &mut out)),
                );
                return Ok(false);
            }
            // Keep the solid stream aligned for the next member
            let _ = std::io::copy(reader, &mut std::io::sink());
            Ok(true)
        });

        if let Err(e) = walk {
            return Err(ExtractionError::EntryFailed {
                archive: self.path.clone(),
                entry: relative_path.to_string(),
                reason: e.to_string(),
            }
            .into());
        }

        match outcome {
            Some(Ok(_)) => Ok(()),
            Some(Err(e)) => Err(ExtractionError::EntryFailed {
                archive: self.path.clone(),
                entry: relative_path.to_string(),
                reason: e.to_string(),
            }
            .into()),
            None => Err(ExtractionError::EntryFailed {
                archive: self.path.clone(),
                entry: relative_path.to_string(),
                reason: "member not found".to_string(),
            }
            .into()),
        }
    }
}
