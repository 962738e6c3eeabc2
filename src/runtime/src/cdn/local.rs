//! Local directory backend.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use mfe_bundle_core::error::{BundleError, Result};
use mfe_bundle_core::LocalConfig;
use object_store::local::LocalFileSystem;
use object_store::Attributes;

use super::object::put_file;
use super::CdnUploader;

/// Writes into a directory served by a static file server.
///
/// The filesystem store cannot persist object attributes, so no content type
/// is recorded; the file server derives it from the extension.
#[derive(Debug)]
pub struct LocalUploader {
    store: LocalFileSystem,
    root: PathBuf,
}

impl LocalUploader {
    pub fn new(config: &LocalConfig) -> Result<Self> {
        std::fs::create_dir_all(&config.root)
            .map_err(|e| BundleError::io("Create CDN root", &config.root, e))?;
        let store = LocalFileSystem::new_with_prefix(&config.root).map_err(|e| {
            BundleError::ConfigError(format!(
                "Invalid local CDN root {}: {}",
                config.root.display(),
                e
            ))
        })?;

        Ok(Self {
            store,
            root: config.root.clone(),
        })
    }
}

#[async_trait]
impl CdnUploader for LocalUploader {
    async fn upload(&self, local_path: &Path, remote_path: &str) -> Result<()> {
        put_file(&self.store, local_path, remote_path, Attributes::new()).await
    }

    fn target(&self) -> String {
        format!("file://{}", self.root.display())
    }
}
