//! CDN publication.
//!
//! Every backend implements [`CdnUploader`] independently on top of
//! `object_store`; [`from_config`] picks one from a [`CdnConfig`] at startup.
//! [`publish`] drives an uploader over a whole directory or over the shared
//! modules found by the analyzer.

mod azure;
mod gcs;
mod local;
mod object;
pub mod publish;
mod s3;

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use mfe_bundle_core::error::Result;
use mfe_bundle_core::CdnConfig;

pub use azure::AzureBlobUploader;
pub use gcs::GcsUploader;
pub use local::LocalUploader;
pub use object::{content_type_for, join_remote, normalize_remote_path, MULTIPART_THRESHOLD};
pub use publish::{publish_directory, publish_shared_modules, PublishOptions, UploadTask};
pub use s3::S3Uploader;

/// Uploads single files to a CDN-backed object store.
#[async_trait]
pub trait CdnUploader: Send + Sync {
    /// Upload `local_path` to `remote_path`, overwriting any existing object.
    ///
    /// `remote_path` is normalized before use. Dropping the future aborts the
    /// transfer.
    async fn upload(&self, local_path: &Path, remote_path: &str) -> Result<()>;

    /// Human-readable destination, e.g. `s3://bucket`.
    fn target(&self) -> String;
}

/// Build the uploader selected by `config`.
pub fn from_config(config: &CdnConfig) -> Result<Arc<dyn CdnUploader>> {
    let uploader: Arc<dyn CdnUploader> = match config {
        CdnConfig::S3(c) => Arc::new(S3Uploader::new(c)?),
        CdnConfig::Gcs(c) => Arc::new(GcsUploader::new(c)?),
        CdnConfig::Azure(c) => Arc::new(AzureBlobUploader::new(c)?),
        CdnConfig::Local(c) => Arc::new(LocalUploader::new(c)?),
    };
    tracing::debug!(target_store = %uploader.target(), "CDN uploader ready");
    Ok(uploader)
}
