use crate::config::{ExtractionConfig, has_extension};
use crate::error::{Error, Result};
use crate::types::ArchiveEntryInfo;
use regex::{Regex, RegexBuilder};
use std::path::{Path, PathBuf};
use tracing::debug;

use super::{RawEntry, open_archive};

/// Compiled set of legacy-member patterns
#[derive(Debug, Clone)]
pub struct LegacyMatcher {
    patterns: Vec<Regex>,
}

impl LegacyMatcher {
    /// Compile the configured patterns
    pub fn new(patterns: &[String]) -> Result<Self> {
        let patterns = patterns
            .iter()
            .map(|p| {
                RegexBuilder::new(p)
                    .case_insensitive(true)
                    .build()
                    .map_err(|e| Error::Config {
                        message: format!("invalid legacy pattern {p:?}: {e}"),
                        key: Some("legacy_patterns".to_string()),
                    })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { patterns })
    }

    /// Whether a member path looks like a legacy/pre-update release
    pub fn is_legacy(&self, relative_path: &str) -> bool {
        self.patterns.iter().any(|re| re.is_match(relative_path))
    }
}

/// Read every member of an archive on the blocking pool
pub async fn list_members(path: &Path) -> Result<Vec<RawEntry>> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || {
        let mut reader = open_archive(&path)?;
        reader.entries()
    })
    .await
    .map_err(|e| Error::Other(format!("archive listing task panicked: {e}")))?
}

/// Turn raw members into the listing shown to the user
///
/// Keeps mod files only, flags legacy members (dropping them when `skip_legacy`
/// is set) and orders the result by relative path.
pub fn build_listing(
    raw: Vec<RawEntry>,
    config: &ExtractionConfig,
    legacy: &LegacyMatcher,
    skip_legacy: bool,
) -> Vec<ArchiveEntryInfo> {
    let mut listing: Vec<ArchiveEntryInfo> = raw
        .into_iter()
        .filter(|entry| !entry.is_dir)
        .filter(|entry| has_extension(Path::new(&entry.relative_path), &config.mod_extensions))
        .map(|entry| {
            let member = PathBuf::from(&entry.relative_path);
            let is_legacy_flagged = legacy.is_legacy(&entry.relative_path);
            ArchiveEntryInfo {
                file_name: member
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default(),
                extension: member
                    .extension()
                    .map(|e| e.to_string_lossy().to_lowercase())
                    .unwrap_or_default(),
                relative_path: entry.relative_path,
                size_bytes: entry.size_bytes,
                is_mod_file: true,
                is_legacy_flagged,
                last_modified: entry.last_modified,
            }
        })
        .filter(|info| !(skip_legacy && info.is_legacy_flagged))
        .collect();

    listing.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
    listing
}

/// List the installable members of an archive
///
/// # Errors
/// [`Error::InvalidArchive`] for unrecognized or corrupt archives, [`Error::Io`]
/// when the file cannot be read.
pub async fn inspect_archive(
    path: &Path,
    config: &ExtractionConfig,
    legacy: &LegacyMatcher,
    skip_legacy: bool,
) -> Result<Vec<ArchiveEntryInfo>> {
    let raw = list_members(path).await?;
    let total = raw.len();
    let listing = build_listing(raw, config, legacy, skip_legacy);

    debug!(?path, members = total, mod_files = listing.len(), "inspected archive");

    Ok(listing)
}
