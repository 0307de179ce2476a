//! Configuration types for mod-ingest

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{path::Path, path::PathBuf, time::Duration};

/// Watch folder and queue settings
///
/// Groups settings related to which directories are observed and how the
/// ingestion queue polls and persists.
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WatchConfig {
    /// Download directories to watch (non-recursive)
    #[serde(default)]
    pub directories: Vec<PathBuf>,

    /// Suffix browsers use for in-progress downloads (default: "part")
    ///
    /// Paths ending in this suffix are recognized by the watcher but never enqueued.
    #[serde(default = "default_partial_suffix")]
    pub partial_suffix: String,

    /// Delay between polling passes over the queue (default: 500 ms)
    #[serde(default = "default_poll_interval", with = "duration_ms_serde")]
    pub poll_interval: Duration,

    /// Interval of the independent snapshot timer (default: 30 seconds)
    #[serde(default = "default_snapshot_interval", with = "duration_serde")]
    pub snapshot_interval: Duration,

    /// Paths that must never be ingested
    #[serde(default)]
    pub ignored_paths: Vec<PathBuf>,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            directories: vec![],
            partial_suffix: default_partial_suffix(),
            poll_interval: default_poll_interval(),
            snapshot_interval: default_snapshot_interval(),
            ignored_paths: vec![],
        }
    }
}

/// Install policy switches
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InstallConfig {
    /// Extract every mod file of an archive without asking the UI (default: false)
    #[serde(default)]
    pub auto_install_all: bool,

    /// Drop legacy/pre-update members from archive listings (default: true)
    #[serde(default = "default_true")]
    pub skip_legacy: bool,

    /// Move detected files into `mod_destination` (default: true)
    #[serde(default = "default_true")]
    pub relocate_files: bool,

    /// Destination mod folder for relocated files
    #[serde(default)]
    pub mod_destination: Option<PathBuf>,

    /// Delete the source archive after a successful extraction (default: false)
    #[serde(default)]
    pub auto_delete_archives: bool,

    /// File collision handling when relocating
    #[serde(default)]
    pub file_collision: FileCollisionAction,
}

impl Default for InstallConfig {
    fn default() -> Self {
        Self {
            auto_install_all: false,
            skip_legacy: true,
            relocate_files: true,
            mod_destination: None,
            auto_delete_archives: false,
            file_collision: FileCollisionAction::default(),
        }
    }
}

/// Archive extraction configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExtractionConfig {
    /// Extensions of directly installable mod files (without dots)
    #[serde(default = "default_mod_extensions")]
    pub mod_extensions: Vec<String>,

    /// File extensions to treat as archives (without dots)
    #[serde(default = "default_archive_extensions")]
    pub archive_extensions: Vec<String>,

    /// Case-insensitive regular expressions marking legacy/pre-update members
    #[serde(default = "default_legacy_patterns")]
    pub legacy_patterns: Vec<String>,

    /// Maximum parallel member extractions (None = available CPUs)
    #[serde(default)]
    pub max_parallelism: Option<usize>,

    /// Delay before deleting an extracted archive (default: 1000 ms)
    #[serde(default = "default_auto_delete_delay", with = "duration_ms_serde")]
    pub auto_delete_delay: Duration,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            mod_extensions: default_mod_extensions(),
            archive_extensions: default_archive_extensions(),
            legacy_patterns: default_legacy_patterns(),
            max_parallelism: None,
            auto_delete_delay: default_auto_delete_delay(),
        }
    }
}

impl ExtractionConfig {
    /// Whether the path has one of the configured mod-file extensions
    pub fn is_mod_file(&self, path: &Path) -> bool {
        has_extension(path, &self.mod_extensions)
    }

    /// Whether the path has one of the configured archive extensions
    pub fn is_archive(&self, path: &Path) -> bool {
        has_extension(path, &self.archive_extensions)
    }

    /// Parallelism degree for member extraction
    pub fn parallelism(&self) -> usize {
        self.max_parallelism
            .unwrap_or_else(|| {
                std::thread::available_parallelism()
                    .map(|n| n.get())
                    .unwrap_or(1)
            })
            .max(1)
    }
}

/// Readiness probe settings ("is the download finished?")
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReadinessConfig {
    /// Number of size samples that must agree (default: 3)
    #[serde(default = "default_sample_count")]
    pub sample_count: u32,

    /// Delay between size samples (default: 500 ms)
    #[serde(default = "default_sample_delay", with = "duration_ms_serde")]
    pub sample_delay: Duration,
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            sample_count: default_sample_count(),
            sample_delay: default_sample_delay(),
        }
    }
}

/// Selection handshake settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SelectionConfig {
    /// How long to wait for the UI to answer a selection request (default: 300 seconds)
    #[serde(default = "default_selection_timeout", with = "duration_serde")]
    pub timeout: Duration,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            timeout: default_selection_timeout(),
        }
    }
}

/// Data storage and state management configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Queue snapshot path (default: "./ingest-queue.json")
    #[serde(default = "default_snapshot_path")]
    pub snapshot_path: PathBuf,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            snapshot_path: default_snapshot_path(),
        }
    }
}

/// Retry configuration for transient failures (file deletes under contention)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (default: 3)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial delay before first retry (default: 250 ms)
    #[serde(default = "default_initial_delay", with = "duration_ms_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 2000 ms)
    #[serde(default = "default_max_delay", with = "duration_ms_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: false)
    #[serde(default)]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: false,
        }
    }
}

/// File collision handling strategy
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileCollisionAction {
    /// Append (1), (2), etc. to filename (default)
    #[default]
    Rename,
    /// Overwrite existing file
    Overwrite,
    /// Skip the file if it already exists
    Skip,
}

/// Main configuration for [`IngestService`](crate::IngestService)
///
/// Read, never written, by the pipeline. Every field has a default, so an
/// empty JSON object is a valid configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Watched directories, polling and snapshot timing
    #[serde(default)]
    pub watch: WatchConfig,

    /// Install policy switches
    #[serde(default)]
    pub install: InstallConfig,

    /// Extension sets, legacy detection, extraction parallelism
    #[serde(default)]
    pub extraction: ExtractionConfig,

    /// Readiness probe timing
    #[serde(default)]
    pub readiness: ReadinessConfig,

    /// Selection handshake timing
    #[serde(default)]
    pub selection: SelectionConfig,

    /// Snapshot location
    #[serde(default)]
    pub persistence: PersistenceConfig,

    /// Retry policy for deleting files that may still be locked
    #[serde(default)]
    pub delete_retry: RetryConfig,
}

impl Config {
    /// Load a configuration from a JSON file
    ///
    /// # Errors
    /// Returns an I/O error if the file cannot be read, a serialization error if it
    /// is not valid JSON, or a configuration error if [`Config::validate`] fails.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field invariants
    pub fn validate(&self) -> Result<()> {
        if self.extraction.mod_extensions.is_empty() {
            return Err(Error::Config {
                message: "at least one mod file extension is required".to_string(),
                key: Some("mod_extensions".to_string()),
            });
        }

        if self.install.relocate_files && self.install.mod_destination.is_none() {
            return Err(Error::Config {
                message: "relocate_files is enabled but no mod_destination is set".to_string(),
                key: Some("mod_destination".to_string()),
            });
        }

        for pattern in &self.extraction.legacy_patterns {
            if let Err(e) = regex::Regex::new(pattern) {
                return Err(Error::Config {
                    message: format!("invalid legacy pattern {pattern:?}: {e}"),
                    key: Some("legacy_patterns".to_string()),
                });
            }
        }

        if self.readiness.sample_count == 0 {
            return Err(Error::Config {
                message: "sample_count must be at least 1".to_string(),
                key: Some("sample_count".to_string()),
            });
        }

        for (key, interval) in [
            ("poll_interval", self.watch.poll_interval),
            ("snapshot_interval", self.watch.snapshot_interval),
        ] {
            if interval.is_zero() {
                return Err(Error::Config {
                    message: format!("{key} must be greater than zero"),
                    key: Some(key.to_string()),
                });
            }
        }

        let multiplier = self.delete_retry.backoff_multiplier;
        if !multiplier.is_finite() || multiplier < 1.0 {
            return Err(Error::Config {
                message: format!(
                    "backoff_multiplier must be finite and at least 1.0, got {multiplier}"
                ),
                key: Some("backoff_multiplier".to_string()),
            });
        }

        Ok(())
    }

    /// Every extension the watcher should react to (mod files and archives)
    pub fn watched_extensions(&self) -> Vec<String> {
        let mut all: Vec<String> = self
            .extraction
            .mod_extensions
            .iter()
            .chain(self.extraction.archive_extensions.iter())
            .map(|ext| ext.trim_start_matches('.').to_lowercase())
            .collect();
        all.sort();
        all.dedup();
        all
    }
}

/// Case-insensitive extension match against a list of extensions (dots optional)
pub(crate) fn has_extension(path: &Path, extensions: &[String]) -> bool {
    let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
        return false;
    };
    extensions
        .iter()
        .any(|candidate| candidate.trim_start_matches('.').eq_ignore_ascii_case(ext))
}

fn default_partial_suffix() -> String {
    "part".to_string()
}

fn default_poll_interval() -> Duration {
    Duration::from_millis(500)
}

fn default_snapshot_interval() -> Duration {
    Duration::from_secs(30)
}

fn default_true() -> bool {
    true
}

fn default_mod_extensions() -> Vec<String> {
    vec!["pmp".to_string(), "ttmp".to_string(), "ttmp2".to_string()]
}

fn default_archive_extensions() -> Vec<String> {
    vec!["zip".to_string(), "7z".to_string(), "rar".to_string()]
}

fn default_legacy_patterns() -> Vec<String> {
    vec![
        r"(?i)\bpre[\s._-]*dt\b".to_string(),
        r"(?i)\[\s*ew\s*\]".to_string(),
        r"(?i)\bendwalker\b".to_string(),
    ]
}

fn default_auto_delete_delay() -> Duration {
    Duration::from_millis(1000)
}

fn default_sample_count() -> u32 {
    3
}

fn default_sample_delay() -> Duration {
    Duration::from_millis(500)
}

fn default_selection_timeout() -> Duration {
    Duration::from_secs(300)
}

fn default_snapshot_path() -> PathBuf {
    PathBuf::from("./ingest-queue.json")
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay() -> Duration {
    Duration::from_millis(250)
}

fn default_max_delay() -> Duration {
    Duration::from_millis(2000)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

// Duration serialization helper
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

// Millisecond Duration serialization helper
mod duration_ms_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
