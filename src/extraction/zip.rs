use crate::error::{Error, ExtractionError, Result};
use chrono::{DateTime, NaiveDate, Utc};
use std::path::{Path, PathBuf};
use tracing::debug;

use super::shared::normalize_member_path;
use super::{ArchiveFormat, ArchiveReader, RawEntry};

/// Archive reader for ZIP files
pub struct ZipReader {
    path: PathBuf,
    archive: zip::ZipArchive<std::fs::File>,
}

impl ZipReader {
    /// Open a ZIP archive and parse its central directory
    pub fn open(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        let archive = zip::ZipArchive::new(file).map_err(|e| match e {
            zip::result::ZipError::Io(io) => Error::Io(io),
            other => Error::invalid_archive(path, other),
        })?;

        debug!(?path, members = archive.len(), "opened ZIP archive");

        Ok(Self {
            path: path.to_path_buf(),
            archive,
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

/// Convert the MS-DOS timestamp stored in ZIP headers
fn zip_datetime(dt: zip::DateTime) -> Option<DateTime<Utc>> {
    NaiveDate::from_ymd_opt(dt.year() as i32, dt.month() as u32, dt.day() as u32)?
        .and_hms_opt(dt.hour() as u32, dt.minute() as u32, dt.second() as u32)
        .map(|naive| naive.and_utc())
}

impl ArchiveReader for ZipReader {
    fn format(&self) -> ArchiveFormat {
        ArchiveFormat::Zip
    }

    fn entries(&mut self) -> Result<Vec<RawEntry>> {
        let mut entries = Vec::with_capacity(self.archive.len());

        for i in 0..self.archive.len() {
            // Raw access skips decryption, so encrypted archives still list
            let file = self
                .archive
                .by_index_raw(i)
                .map_err(|e| Error::invalid_archive(&self.path, e))?;

            entries.push(RawEntry {
                relative_path: normalize_member_path(file.name()),
                size_bytes: file.size(),
                is_dir: file.is_dir(),
                last_modified: zip_datetime(file.last_modified()),
            });
        }

        Ok(entries)
    }

    fn extract_entry(&mut self, relative_path: &str, dest_file: &Path) -> Result<()> {
        let path = self.path.clone();

        let mut index = None;
        for i in 0..self.archive.len() {
            let file = self
                .archive
                .by_index_raw(i)
                .map_err(|e| Error::invalid_archive(&path, e))?;
            if normalize_member_path(file.name()) == relative_path {
                index = Some(i);
                break;
            }
        }
        let index = index.ok_or_else(|| self.entry_failed(relative_path, "member not found"))?;

        let mut file = self.archive.by_index(index).map_err(|e| {
            Error::from(ExtractionError::EntryFailed {
                archive: path.clone(),
                entry: relative_path.to_string(),
                reason: e.to_string(),
            })
        })?;

        let mut out = std::fs::File::create(dest_file)?;
        std::io::copy(&mut file, &mut out).map_err(|e| ExtractionError::EntryFailed {
            archive: path,
            entry: relative_path.to_string(),
            reason: e.to_string(),
        })?;

        Ok(())
    }
}
