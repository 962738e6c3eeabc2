//! Bundle tarball extraction.
//!
//! Streams a tar.gz archive entry by entry into a destination directory.
//! Every entry is checked against the canonical destination before anything
//! is written; a single escaping entry fails the whole extraction.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use mfe_bundle_core::error::{BundleError, Result};
use tar::{Archive, EntryType};
use tokio_util::sync::CancellationToken;

use crate::fs::{normalize_lexically, run_blocking};

/// Result of a successful extraction.
#[derive(Debug, Clone)]
pub struct ExtractedBundle {
    /// Canonical extraction root
    pub root: PathBuf,
    /// Regular files written, relative to `root`, in archive order
    pub files: Vec<PathBuf>,
    /// Entries that were not extracted
    pub skipped: Vec<SkippedEntry>,
}

/// An archive entry skipped because of its type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedEntry {
    /// Entry name as recorded in the archive
    pub name: String,
    /// Entry type, e.g. `Symlink`
    pub entry_type: String,
}

/// Extract `tarball` into `destination` on a blocking thread.
pub async fn extract(
    tarball: &Path,
    destination: &Path,
    cancel: &CancellationToken,
) -> Result<ExtractedBundle> {
    let tarball = tarball.to_path_buf();
    let destination = destination.to_path_buf();
    let cancel = cancel.clone();
    run_blocking(move || extract_tarball(&tarball, &destination, &cancel)).await
}

/// Extract a tar.gz archive into `destination`.
///
/// # Errors
///
/// Returns error if:
/// - The tarball cannot be opened or decoded
/// - An entry resolves outside `destination` (`PathTraversal`)
/// - A directory or file cannot be written
/// - `cancel` fires between entries
pub fn extract_tarball(
    tarball: &Path,
    destination: &Path,
    cancel: &CancellationToken,
) -> Result<ExtractedBundle> {
    std::fs::create_dir_all(destination)
        .map_err(|e| BundleError::io("Create extraction directory", destination, e))?;
    let root = destination
        .canonicalize()
        .map_err(|e| BundleError::io("Canonicalize extraction directory", destination, e))?;

    let file = File::open(tarball).map_err(|e| BundleError::io("Open tarball", tarball, e))?;
    let mut archive = Archive::new(GzDecoder::new(BufReader::new(file)));

    tracing::info!(
        tarball = %tarball.display(),
        destination = %root.display(),
        "Extracting tarball"
    );

    let mut bundle = ExtractedBundle {
        root: root.clone(),
        files: Vec::new(),
        skipped: Vec::new(),
    };

    let entries = archive
        .entries()
        .map_err(|e| BundleError::io("Read tarball", tarball, e))?;

    for entry in entries {
        if cancel.is_cancelled() {
            return Err(BundleError::Cancelled(format!(
                "extract {}",
                tarball.display()
            )));
        }

        let mut entry = entry.map_err(|e| BundleError::io("Read tar entry", tarball, e))?;
        let name = entry
            .path()
            .map_err(|e| BundleError::io("Read tar entry name", tarball, e))?
            .into_owned();
        let target = contained_path(&root, &name)?;

        match entry.header().entry_type() {
            EntryType::Directory => {
                create_contained_dirs(&root, &target, &name)?;
            }
            EntryType::Regular | EntryType::Continuous => {
                if target == root {
                    return Err(traversal(&name, &root));
                }
                prepare_file_target(&root, &target, &name)?;

                let mut out = File::create(&target)
                    .map_err(|e| BundleError::io("Create file", &target, e))?;
                std::io::copy(&mut entry, &mut out)
                    .map_err(|e| BundleError::io("Write file", &target, e))?;

                if let Ok(relative) = target.strip_prefix(&root) {
                    bundle.files.push(relative.to_path_buf());
                }
            }
            other => {
                let skipped = SkippedEntry {
                    name: name.to_string_lossy().to_string(),
                    entry_type: format!("{:?}", other),
                };
                tracing::warn!(
                    entry = %skipped.name,
                    entry_type = %skipped.entry_type,
                    "Skipping unsupported tar entry"
                );
                bundle.skipped.push(skipped);
            }
        }
    }

    tracing::info!(
        destination = %root.display(),
        files = bundle.files.len(),
        skipped = bundle.skipped.len(),
        "Extraction completed"
    );

    Ok(bundle)
}

/// Resolve an entry name against the canonical root, rejecting escapes.
///
/// Containment is component-wise, so `/work/dest-evil` is not inside
/// `/work/dest`. Absolute names replace the root when joined and are
/// rejected the same way.
fn contained_path(root: &Path, name: &Path) -> Result<PathBuf> {
    let candidate = normalize_lexically(&root.join(name));
    if !candidate.starts_with(root) {
        return Err(traversal(name, root));
    }
    Ok(candidate)
}

/// Create the parent of a file entry and refuse a target that is already a
/// symlink.
fn prepare_file_target(root: &Path, target: &Path, name: &Path) -> Result<()> {
    let parent = target.parent().unwrap_or(root);
    create_contained_dirs(root, parent, name)?;

    if let Ok(meta) = std::fs::symlink_metadata(target) {
        if meta.file_type().is_symlink() {
            return Err(traversal(name, root));
        }
    }
    Ok(())
}

/// Create `dir` below `root` one component at a time.
///
/// `dir` must already be lexically contained in `root`. A component that
/// exists as a symlink fails the entry, so nothing is ever created through
/// a link planted in the destination.
fn create_contained_dirs(root: &Path, dir: &Path, name: &Path) -> Result<()> {
    let relative = dir.strip_prefix(root).map_err(|_| traversal(name, root))?;
    let mut current = root.to_path_buf();

    for component in relative.components() {
        current.push(component);
        match std::fs::symlink_metadata(&current) {
            Ok(meta) if meta.file_type().is_symlink() => return Err(traversal(name, root)),
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => {
                return Err(BundleError::io(
                    "Create directory",
                    &current,
                    std::io::Error::new(std::io::ErrorKind::AlreadyExists, "not a directory"),
                ));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                std::fs::create_dir(&current)
                    .map_err(|e| BundleError::io("Create directory", &current, e))?;
            }
            Err(e) => return Err(BundleError::io("Inspect directory", &current, e)),
        }
    }
    Ok(())
}

fn traversal(name: &Path, root: &Path) -> BundleError {
    BundleError::PathTraversal {
        entry: name.to_string_lossy().to_string(),
        root: root.to_path_buf(),
    }
}
