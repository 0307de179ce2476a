use crate::error::{ExtractionError, Result};
use std::path::{Component, Path, PathBuf};

/// Normalize an archive member name to `/`-separated relative form
///
/// Backslashes become slashes; leading `./` and `/` and trailing `/` are removed.
pub fn normalize_member_path(name: &str) -> String {
    let unified = name.replace('\\', "/");
    let mut trimmed = unified.as_str();
    loop {
        if let Some(rest) = trimmed.strip_prefix("./") {
            trimmed = rest;
        } else if let Some(rest) = trimmed.strip_prefix('/') {
            trimmed = rest;
        } else {
            break;
        }
    }
    trimmed.trim_end_matches('/').to_string()
}

/// Resolve where a member is written below `dest_root`
///
/// Rejects member paths that would escape the destination (`..`, absolute paths,
/// drive prefixes) instead of silently rewriting them.
pub fn member_destination(dest_root: &Path, archive: &Path, relative_path: &str) -> Result<PathBuf> {
    let mut resolved = dest_root.to_path_buf();
    let mut depth = 0usize;

    for component in Path::new(relative_path).components() {
        match component {
            Component::Normal(part) => {
                resolved.push(part);
                depth += 1;
            }
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(ExtractionError::UnsafePath {
                    archive: archive.to_path_buf(),
                    entry: relative_path.to_string(),
                }
                .into());
            }
        }
    }

    if depth == 0 {
        return Err(ExtractionError::UnsafePath {
            archive: archive.to_path_buf(),
            entry: relative_path.to_string(),
        }
        .into());
    }

    Ok(resolved)
}

/// Directory that receives the members of `archive`
///
/// A relocated archive already sits in a folder named after its stem and is
/// extracted in place; otherwise a sibling folder named after the stem is used,
/// which keeps extracted files out of the (non-recursive) watched directory.
pub fn extraction_dir(archive: &Path) -> Result<PathBuf> {
    let invalid = |reason: &str| ExtractionError::InvalidPath {
        path: archive.to_path_buf(),
        reason: reason.to_string(),
    };

    let parent = archive
        .parent()
        .ok_or_else(|| invalid("Cannot extract parent directory"))?;
    let stem = archive
        .file_stem()
        .ok_or_else(|| invalid("Cannot extract file stem"))?;

    if parent.file_name() == Some(stem) {
        Ok(parent.to_path_buf())
    } else {
        Ok(parent.join(stem))
    }
}
