//! Completion marker: a processed file is renamed to its dot-prefixed name.

use std::path::{Path, PathBuf};
use tracing::{debug, error};

/// True when the basename already carries the `.` prefix.
pub fn is_marked(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.starts_with('.'))
}

/// Path the file is renamed to once processed: `dir/name` -> `dir/.name`.
pub fn marked_path(path: &Path) -> Option<PathBuf> {
    let name = path.file_name()?.to_str()?;
    Some(path.with_file_name(format!(".{name}")))
}

/// Rename `path` to its marked form.
///
/// Returns the new path, or `None` when the file was already marked or the
/// rename failed. Failures are logged, never propagated.
pub fn mark_processed(path: &Path) -> Option<PathBuf> {
    if is_marked(path) {
        debug!("{} is already marked as processed", path.display());
        return None;
    }

    let Some(target) = marked_path(path) else {
        error!("Cannot derive marker name for {}", path.display());
        return None;
    };

    match std::fs::rename(path, &target) {
        Ok(()) => {
            debug!("Renamed {} -> {}", path.display(), target.display());
            Some(target)
        }
        Err(e) => {
            error!(
                "Failed to rename {} to {}: {}",
                path.display(),
                target.display(),
                e
            );
            None
        }
    }
}
