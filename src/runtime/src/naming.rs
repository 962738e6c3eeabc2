//! Working-directory resolution.
//!
//! Decides where a pipeline stage stages its files. Every successful
//! resolution yields a directory that exists on disk; a bad logical name never
//! fails resolution, it degrades to an isolated temporary directory.

use std::path::{Path, PathBuf};

use mfe_bundle_core::error::{BundleError, Result};
use mfe_bundle_core::NamingStrategy;

/// File name used when the location is not derived from a logical name.
pub const DEFAULT_TARBALL_NAME: &str = "bundle.tar.gz";

/// Prefix of directories created by `IsolatedTempDir`.
const TEMP_DIR_PREFIX: &str = "mfe";

/// A resolved working location for one pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedLocation {
    /// Existing directory owned by the run
    pub directory: PathBuf,
    /// File name for the tarball materialized in `directory`
    pub base_filename: String,
}

impl ResolvedLocation {
    /// Full path of the tarball inside this location.
    pub fn tarball_path(&self) -> PathBuf {
        self.directory.join(&self.base_filename)
    }
}

/// Replace characters that are unsafe in file and directory names.
///
/// Path separators become `-`, then everything outside `[A-Za-z0-9-_]`
/// becomes `_`.
pub fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '/' | '\\' => '-',
            c if c.is_ascii_alphanumeric() || c == '-' || c == '_' => c,
            _ => '_',
        })
        .collect()
}

/// Resolve a working location under `base_path`.
///
/// `purpose` tags the directory (e.g. `fetch`, `extract`) so that two stages
/// of the same run never share an isolated or UUID directory.
pub fn resolve(
    strategy: NamingStrategy,
    base_path: &Path,
    logical_name: &str,
    purpose: &str,
) -> Result<ResolvedLocation> {
    std::fs::create_dir_all(base_path)
        .map_err(|e| BundleError::io("Create base directory", base_path, e))?;

    match strategy {
        NamingStrategy::IsolatedTempDir => {
            tracing::debug!(purpose, "Using strategy: isolated-temp-dir");
            isolated(base_path, purpose)
        }
        NamingStrategy::UseName => {
            let sanitized = sanitize_name(logical_name);
            if sanitized.chars().all(|c| c == '_') {
                // Covers the empty string as well. One hop only.
                tracing::warn!(
                    name = logical_name,
                    purpose,
                    "Unusable logical name, falling back to isolated-temp-dir"
                );
                return isolated(base_path, purpose);
            }

            let directory = base_path.join(&sanitized);
            std::fs::create_dir_all(&directory)
                .map_err(|e| BundleError::io("Create named directory", &directory, e))?;

            tracing::debug!(
                purpose,
                directory = %directory.display(),
                "Using strategy: use-name"
            );
            Ok(ResolvedLocation {
                directory,
                base_filename: format!("{sanitized}.tar.gz"),
            })
        }
        NamingStrategy::UseUuid => {
            let directory = base_path.join(format!("{}-{}", purpose, uuid::Uuid::new_v4()));
            std::fs::create_dir_all(&directory)
                .map_err(|e| BundleError::io("Create uuid directory", &directory, e))?;

            tracing::debug!(
                purpose,
                directory = %directory.display(),
                "Using strategy: use-uuid"
            );
            Ok(ResolvedLocation {
                directory,
                base_filename: DEFAULT_TARBALL_NAME.to_string(),
            })
        }
    }
}

fn isolated(base_path: &Path, purpose: &str) -> Result<ResolvedLocation> {
    let dir = tempfile::Builder::new()
        .prefix(&format!("{TEMP_DIR_PREFIX}-{purpose}-"))
        .tempdir_in(base_path)
        .map_err(|e| BundleError::io("Create temp directory", base_path, e))?;

    // The run owns the directory from here on; it must survive this guard.
    let directory = dir.into_path();
    Ok(ResolvedLocation {
        directory,
        base_filename: DEFAULT_TARBALL_NAME.to_string(),
    })
}
