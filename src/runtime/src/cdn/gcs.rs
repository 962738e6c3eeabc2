//! Google Cloud Storage backend.

use std::path::Path;

use async_trait::async_trait;
use mfe_bundle_core::error::{BundleError, Result};
use mfe_bundle_core::GcsConfig;
use object_store::gcp::{GoogleCloudStorage, GoogleCloudStorageBuilder};

use super::object::{content_attributes, put_file};
use super::CdnUploader;

/// Uploads into a GCS bucket.
///
/// Without a service account path, credentials come from the `GOOGLE_*`
/// environment variables or application default credentials.
#[derive(Debug)]
pub struct GcsUploader {
    store: GoogleCloudStorage,
    bucket: String,
}

impl GcsUploader {
    pub fn new(config: &GcsConfig) -> Result<Self> {
        let mut builder = GoogleCloudStorageBuilder::from_env().with_bucket_name(&config.bucket);
        if let Some(path) = &config.service_account_path {
            builder = builder.with_service_account_path(path.to_string_lossy());
        }

        let store = builder.build().map_err(|e| {
            BundleError::ConfigError(format!("Invalid GCS target {}: {}", config.bucket, e))
        })?;

        Ok(Self {
            store,
            bucket: config.bucket.clone(),
        })
    }
}

#[async_trait]
impl CdnUploader for GcsUploader {
    async fn upload(&self, local_path: &Path, remote_path: &str) -> Result<()> {
        put_file(&self.store, local_path, remote_path, content_attributes(local_path)).await
    }

    fn target(&self) -> String {
        format!("gs://{}", self.bucket)
    }
}
