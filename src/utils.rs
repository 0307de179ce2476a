//! Utility functions for file operations and path manipulation

use crate::config::{FileCollisionAction, RetryConfig};
use crate::error::{Error, ExtractionError, Result};
use crate::retry::with_retry;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};

/// Maximum number of rename attempts when resolving file collisions
const MAX_RENAME_ATTEMPTS: u32 = 9999;

/// Normalize a path into the queue key form
///
/// Makes the path absolute against the current directory without touching the
/// filesystem, so files that have already disappeared still normalize.
pub fn normalize_path(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

/// Get a unique path for a file, handling collisions according to the specified action
///
/// For Rename, a ` (n)` suffix is inserted before the extension. For Skip, an
/// existing file is an error. For Overwrite, the original path is returned.
///
/// # Examples
///
/// ```
/// use mod_ingest::utils::get_unique_path;
/// use mod_ingest::config::FileCollisionAction;
/// use std::path::Path;
///
/// let path = Path::new("/tmp/hair.pmp");
/// let unique = get_unique_path(path, FileCollisionAction::Rename).unwrap();
/// // If /tmp/hair.pmp exists, returns /tmp/hair (1).pmp
/// ```
pub fn get_unique_path(path: &Path, action: FileCollisionAction) -> Result<PathBuf> {
    match action {
        FileCollisionAction::Overwrite => Ok(path.to_path_buf()),
        FileCollisionAction::Skip => {
            if path.exists() {
                return Err(ExtractionError::FileCollision {
                    path: path.to_path_buf(),
                    reason: "File already exists and collision action is Skip".to_string(),
                }
                .into());
            }
            Ok(path.to_path_buf())
        }
        FileCollisionAction::Rename => {
            if !path.exists() {
                return Ok(path.to_path_buf());
            }

            let stem = path.file_stem().and_then(|s| s.to_str()).ok_or_else(|| {
                ExtractionError::InvalidPath {
                    path: path.to_path_buf(),
                    reason: "Cannot extract file stem".to_string(),
                }
            })?;

            let extension = path.extension().and_then(|e| e.to_str());

            let parent = path.parent().ok_or_else(|| ExtractionError::InvalidPath {
                path: path.to_path_buf(),
                reason: "Cannot extract parent directory".to_string(),
            })?;

            for i in 1..=MAX_RENAME_ATTEMPTS {
                let new_name = match extension {
                    Some(ext) => format!("{} ({}).{}", stem, i, ext),
                    None => format!("{} ({})", stem, i),
                };
                let new_path = parent.join(new_name);
                if !new_path.exists() {
                    return Ok(new_path);
                }
            }

            Err(ExtractionError::FileCollision {
                path: path.to_path_buf(),
                reason: "Could not find unique filename after 9999 attempts".to_string(),
            }
            .into())
        }
    }
}

/// Delete a file, retrying with increasing delay while it is locked
///
/// A file that is already gone counts as deleted. When every attempt fails the
/// failure is logged as an error and returned; callers treat it as non-fatal.
pub async fn remove_file_with_retry(path: &Path, config: &RetryConfig) -> Result<()> {
    let result = with_retry(config, || async move {
        match tokio::fs::remove_file(path).await {
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    })
    .await;

    match result {
        Ok(()) => {
            debug!(?path, "deleted file");
            Ok(())
        }
        Err(e) => {
            error!(?path, error = %e, "failed to delete file after retries");
            Err(Error::Io(e))
        }
    }
}

/// Relocation target directory for a file: `<root>/<file stem>`
pub fn relocation_dir(root: &Path, file: &Path) -> Result<PathBuf> {
    let stem = file
        .file_stem()
        .ok_or_else(|| ExtractionError::InvalidPath {
            path: file.to_path_buf(),
            reason: "Cannot extract file stem".to_string(),
        })?;
    Ok(root.join(stem))
}

/// Move a detected file into `<root>/<file stem>/<file name>`
///
/// Tries an atomic rename first; across filesystems (or while the source is
/// still held open) falls back to copy followed by a retried delete of the
/// original. A failed delete is logged but the copy is kept and returned.
///
/// Returns the final location. A file that already lives at its relocation
/// target is returned unchanged.
pub async fn relocate_file(
    source: &Path,
    root: &Path,
    collision: FileCollisionAction,
    retry: &RetryConfig,
) -> Result<PathBuf> {
    let file_name = source
        .file_name()
        .ok_or_else(|| ExtractionError::InvalidPath {
            path: source.to_path_buf(),
            reason: "File has no filename".to_string(),
        })?;
    let target_dir = relocation_dir(root, source)?;
    let natural_target = target_dir.join(file_name);

    if natural_target == source {
        debug!(?source, "file already at its relocation target");
        return Ok(source.to_path_buf());
    }

    tokio::fs::create_dir_all(&target_dir).await?;
    let target = get_unique_path(&natural_target, collision)?;

    match tokio::fs::rename(source, &target).await {
        Ok(()) => {
            info!(?source, ?target, "moved file");
            return Ok(target);
        }
        Err(e) => {
            debug!(?source, ?target, error = %e, "rename failed, falling back to copy");
        }
    }

    tokio::fs::copy(source, &target)
        .await
        .map_err(|e| ExtractionError::MoveFailed {
            source_path: source.to_path_buf(),
            dest_path: target.clone(),
            reason: e.to_string(),
        })?;

    // The copy is complete; a stubborn original is left behind rather than failing the move
    let _ = remove_file_with_retry(source, retry).await;

    info!(?source, ?target, "copied file");
    Ok(target)
}
