//! Archive inspection, readiness probing and selective extraction
//!
//! This module handles everything that touches file contents:
//! - [`is_ready`] decides whether a download has finished writing
//! - [`inspect_archive`] lists the mod files inside a ZIP, 7z or RAR archive
//! - [`Extractor::extract_selected`] writes a chosen subset of members to disk
//!
//! All three archive formats sit behind the [`ArchiveReader`] trait. Readers are
//! blocking and not safe for concurrent extraction calls, so callers run them
//! on the blocking pool and serialize access.

mod extract;
mod inspect;
mod rar;
mod readiness;
mod sevenz;
mod shared;
mod zip;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

// Re-exports
pub use extract::Extractor;
pub use inspect::{LegacyMatcher, build_listing, inspect_archive, list_members};
pub use rar::RarReader;
pub use readiness::{has_partial_marker, is_ready};
pub use sevenz::SevenZipReader;
pub use shared::{extraction_dir, member_destination, normalize_member_path};
pub use zip::ZipReader;

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use std::io::Read;
use std::path::Path;
use tracing::debug;

/// Supported archive container formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    /// ZIP archive
    Zip,
    /// 7-Zip archive
    SevenZip,
    /// RAR archive (v4 or v5)
    Rar,
}

/// A member as reported by an archive reader, before any filtering
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEntry {
    /// Path inside the archive, `/`-separated
    pub relative_path: String,
    /// Uncompressed size in bytes
    pub size_bytes: u64,
    /// Whether the member is a directory
    pub is_dir: bool,
    /// Modification time recorded in the archive
    pub last_modified: Option<DateTime<Utc>>,
}

/// Blocking reader over one archive file
pub trait ArchiveReader: Send {
    /// Container format of the archive
    fn format(&self) -> ArchiveFormat;

    /// Enumerate every member (files and directories)
    fn entries(&mut self) -> Result<Vec<RawEntry>>;

    /// Write the member at `relative_path` to `dest_file`
    ///
    /// The parent directory of `dest_file` must already exist.
    fn extract_entry(&mut self, relative_path: &str, dest_file: &Path) -> Result<()>;
}

const ZIP_MAGIC: &[&[u8]] = &[b"PK\x03\x04", b"PK\x05\x06", b"PK\x07\x08"];
const SEVENZ_MAGIC: &[u8] = b"7z\xBC\xAF\x27\x1C";
const RAR_MAGIC: &[u8] = b"Rar!\x1A\x07";

/// Detect the archive format from the file signature
///
/// Returns `Ok(None)` when the signature matches none of the supported formats.
pub fn detect_archive_format(path: &Path) -> Result<Option<ArchiveFormat>> {
    let mut header = [0u8; 8];
    let mut file = std::fs::File::open(path)?;
    let mut filled = 0;
    while filled < header.len() {
        let n = file.read(&mut header[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    let header = &header[..filled];

    if ZIP_MAGIC.iter().any(|magic| header.starts_with(magic)) {
        return Ok(Some(ArchiveFormat::Zip));
    }
    if header.starts_with(SEVENZ_MAGIC) {
        return Ok(Some(ArchiveFormat::SevenZip));
    }
    if header.starts_with(RAR_MAGIC) {
        return Ok(Some(ArchiveFormat::Rar));
    }
    Ok(None)
}

/// Open an archive with the reader matching its signature
///
/// # Errors
/// [`Error::InvalidArchive`] when the file is not a supported archive or its
/// directory cannot be parsed; [`Error::Io`] when the file cannot be read.
pub fn open_archive(path: &Path) -> Result<Box<dyn ArchiveReader>> {
    let format = detect_archive_format(path)?
        .ok_or_else(|| Error::invalid_archive(path, "unrecognized archive signature"))?;

    debug!(?path, ?format, "opening archive");

    let reader: Box<dyn ArchiveReader> = match format {
        ArchiveFormat::Zip => Box::new(ZipReader::open(path)?),
        ArchiveFormat::SevenZip => Box::new(SevenZipReader::open(path)?),
        ArchiveFormat::Rar => Box::new(RarReader::open(path)?),
    };
    Ok(reader)
}
