//! Filesystem helpers shared by the pipeline stages.

use mfe_bundle_core::error::{BundleError, Result};
use std::path::{Component, Path, PathBuf};

/// Run filesystem-heavy work off the async executor.
pub(crate) async fn run_blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| BundleError::Other(format!("Blocking task failed: {}", e)))?
}

/// Lexically normalize a path: `.` is dropped and `..` pops the previous
/// component. Nothing is read from disk.
pub fn normalize_lexically(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

/// Remove a directory tree, logging instead of failing.
pub(crate) fn remove_dir_best_effort(path: &Path) {
    if !path.exists() {
        return;
    }
    if let Err(e) = std::fs::remove_dir_all(path) {
        tracing::warn!(path = %path.display(), error = %e, "Failed to remove directory");
    }
}

/// Remove a file, logging instead of failing.
pub(crate) fn remove_file_best_effort(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!(path = %path.display(), error = %e, "Failed to remove file");
        }
    }
}
