//! Shared-module discovery for module-federation bundles.
//!
//! A federated bundle ships one or more `remoteEntry.js` files that name the
//! shared dependencies they were built against as `"name@x.y.z"` string
//! literals. Those references are what the vendor publish uploads under
//! `vendor/{name}@{version}/{entry}`.

use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};

use mfe_bundle_core::error::{BundleError, Result};
use mfe_bundle_core::ModulePolicy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

/// File name of a module-federation entry point.
pub const REMOTE_ENTRY_FILE: &str = "remoteEntry.js";

/// Default manifest file name.
pub const MANIFEST_FILE: &str = "shared-modules.json";

const SHARED_MODULE_PATTERN: &str = r#""([A-Za-z0-9\-_]+)@([0-9]+\.[0-9]+\.[0-9]+)""#;

/// A shared dependency referenced by a remote entry file.
///
/// Identity is `(name, version, entry)`; where the entry file was found is
/// bookkeeping for the vendor publish and is not serialized.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharedModule {
    /// Package name, e.g. `react`
    pub name: String,
    /// Semantic version, `major.minor.patch`
    pub version: String,
    /// Base name of the file the reference was found in
    pub entry: String,
    /// Entry file location relative to the analyzed root
    #[serde(skip)]
    pub source: PathBuf,
}

impl SharedModule {
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        entry: impl Into<String>,
    ) -> Self {
        let entry = entry.into();
        Self {
            name: name.into(),
            version: version.into(),
            source: PathBuf::from(&entry),
            entry,
        }
    }

    /// `name@version`
    pub fn id(&self) -> String {
        format!("{}@{}", self.name, self.version)
    }

    /// Destination under the CDN: `vendor/{name}@{version}/{entry}`.
    pub fn vendor_path(&self) -> String {
        format!("vendor/{}/{}", self.id(), self.entry)
    }
}

impl PartialEq for SharedModule {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.version == other.version && self.entry == other.entry
    }
}

impl Eq for SharedModule {}

impl Hash for SharedModule {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
        self.version.hash(state);
        self.entry.hash(state);
    }
}

/// Scan `root` for shared-module references, keeping every match.
pub fn analyze(root: &Path) -> Result<Vec<SharedModule>> {
    analyze_with_policy(root, ModulePolicy::Raw)
}

/// Scan `root` for shared-module references.
///
/// Files are visited depth-first in name order so results are stable across
/// runs. Any entry file that cannot be read as UTF-8 fails the analysis.
pub fn analyze_with_policy(root: &Path, policy: ModulePolicy) -> Result<Vec<SharedModule>> {
    let pattern = Regex::new(SHARED_MODULE_PATTERN)
        .map_err(|e| BundleError::Other(format!("Invalid shared module pattern: {}", e)))?;

    let mut modules = Vec::new();
    let mut entry_files = 0usize;

    for entry in WalkDir::new(root)
        .follow_links(false)
        .sort_by(|a, b| a.file_name().cmp(b.file_name()))
    {
        let entry = entry.map_err(|e| walk_error(root, e))?;
        if !entry.file_type().is_file() || entry.file_name() != REMOTE_ENTRY_FILE {
            continue;
        }
        entry_files += 1;

        let path = entry.path();
        let content = std::fs::read_to_string(path)
            .map_err(|e| BundleError::io("Read remote entry", path, e))?;
        let source = path.strip_prefix(root).unwrap_or(path).to_path_buf();

        for captures in pattern.captures_iter(&content) {
            let module = SharedModule {
                name: captures[1].to_string(),
                version: captures[2].to_string(),
                entry: REMOTE_ENTRY_FILE.to_string(),
                source: source.clone(),
            };
            if policy == ModulePolicy::Deduplicated && modules.contains(&module) {
                continue;
            }
            tracing::debug!(module = %module.id(), source = %source.display(), "Found shared module");
            modules.push(module);
        }
    }

    tracing::info!(
        root = %root.display(),
        entry_files,
        modules = modules.len(),
        "Shared module analysis completed"
    );

    Ok(modules)
}

/// Write modules as a pretty-printed JSON array of `{name, version, entry}`.
pub fn write_manifest(path: &Path, modules: &[SharedModule]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .map_err(|e| BundleError::io("Create manifest directory", parent, e))?;
    }
    let json = serde_json::to_string_pretty(modules)?;
    std::fs::write(path, json).map_err(|e| BundleError::io("Write manifest", path, e))?;
    tracing::info!(path = %path.display(), modules = modules.len(), "Manifest written");
    Ok(())
}

/// Read a manifest written by [`write_manifest`].
pub fn read_manifest(path: &Path) -> Result<Vec<SharedModule>> {
    let data =
        std::fs::read_to_string(path).map_err(|e| BundleError::io("Read manifest", path, e))?;
    let modules: Vec<SharedModule> = serde_json::from_str(&data)?;
    Ok(modules
        .into_iter()
        .map(|m| SharedModule::new(m.name, m.version, m.entry))
        .collect())
}

fn walk_error(root: &Path, err: walkdir::Error) -> BundleError {
    let path = err.path().unwrap_or(root).to_path_buf();
    match err.into_io_error() {
        Some(source) => BundleError::io("Walk bundle", &path, source),
        None => BundleError::Other(format!("Filesystem loop under {}", path.display())),
    }
}
