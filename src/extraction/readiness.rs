use crate::config::ReadinessConfig;
use std::path::Path;
use tracing::trace;

/// Whether a partial-download marker for `path` exists next to it
///
/// Browsers write either `<name>.<suffix>` or `<name>.<random>.<suffix>` while a
/// download is in flight.
pub fn has_partial_marker(path: &Path, suffix: &str) -> bool {
    let (Some(parent), Some(name)) = (path.parent(), path.file_name()) else {
        return false;
    };
    let name = name.to_string_lossy();
    let suffix = suffix.trim_start_matches('.');

    if parent.join(format!("{name}.{suffix}")).exists() {
        return true;
    }

    let Ok(siblings) = std::fs::read_dir(parent) else {
        return false;
    };
    let prefix = format!("{name}.");
    let ending = format!(".{suffix}");
    siblings.flatten().any(|sibling| {
        let sibling = sibling.file_name();
        let sibling = sibling.to_string_lossy();
        sibling.len() > prefix.len() + ending.len()
            && sibling.starts_with(&prefix)
            && sibling.ends_with(&ending)
    })
}

async fn sample_size(path: &Path) -> Option<u64> {
    tokio::fs::metadata(path).await.ok().map(|m| m.len())
}

#[cfg(windows)]
fn open_exclusive(path: &Path) -> std::io::Result<std::fs::File> {
    use std::os::windows::fs::OpenOptionsExt;
    // Sharing mode 0 fails while the browser still holds a handle
    std::fs::OpenOptions::new().read(true).share_mode(0).open(path)
}

#[cfg(not(windows))]
fn open_exclusive(path: &Path) -> std::io::Result<std::fs::File> {
    std::fs::File::open(path)
}

/// Decide whether a download has finished writing
///
/// Never fails: any error while probing means "not ready yet".
pub async fn is_ready(path: &Path, config: &ReadinessConfig, partial_suffix: &str) -> bool {
    if has_partial_marker(path, partial_suffix) {
        trace!(?path, "partial download marker present");
        return false;
    }

    let Some(first) = sample_size(path).await else {
        return false;
    };
    if first == 0 {
        return false;
    }

    for _ in 1..config.sample_count {
        tokio::time::sleep(config.sample_delay).await;
        match sample_size(path).await {
            Some(size) if size == first => {}
            other => {
                trace!(?path, first, ?other, "file size still changing");
                return false;
            }
        }
    }

    open_exclusive(path).is_ok()
}
