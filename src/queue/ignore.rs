use crate::utils::normalize_path;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Paths that must never be ingested
///
/// Entries are stored normalized, so lookups work with relative or absolute
/// spellings of the same path.
#[derive(Debug, Default)]
pub struct IgnoreList {
    paths: Mutex<HashSet<PathBuf>>,
}

impl IgnoreList {
    /// Create an ignore list seeded with `paths`
    pub fn new<I, P>(paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        Self {
            paths: Mutex::new(paths.into_iter().map(|p| normalize_path(p.as_ref())).collect()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashSet<PathBuf>> {
        self.paths.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Whether `path` is ignored
    pub fn contains(&self, path: &Path) -> bool {
        self.lock().contains(&normalize_path(path))
    }

    /// Add a path; returns `false` if it was already ignored
    pub fn add(&self, path: &Path) -> bool {
        self.lock().insert(normalize_path(path))
    }

    /// Remove a path; returns `false` if it was not ignored
    pub fn remove(&self, path: &Path) -> bool {
        self.lock().remove(&normalize_path(path))
    }

    /// Snapshot of the ignored paths, sorted
    pub fn paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self.lock().iter().cloned().collect();
        paths.sort();
        paths
    }

    /// Number of ignored paths
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether nothing is ignored
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
