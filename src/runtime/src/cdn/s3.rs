//! Amazon S3 backend.

use std::path::Path;

use async_trait::async_trait;
use mfe_bundle_core::error::{BundleError, Result};
use mfe_bundle_core::S3Config;
use object_store::aws::{AmazonS3, AmazonS3Builder};

use super::object::{content_attributes, put_file};
use super::CdnUploader;

/// Uploads into an S3 (or S3-compatible) bucket.
///
/// Credentials not present in the configuration are taken from the standard
/// `AWS_*` environment variables.
#[derive(Debug)]
pub struct S3Uploader {
    store: AmazonS3,
    bucket: String,
}

impl S3Uploader {
    pub fn new(config: &S3Config) -> Result<Self> {
        let mut builder = AmazonS3Builder::from_env().with_bucket_name(&config.bucket);

        if let Some(region) = &config.region {
            builder = builder.with_region(region);
        }
        if let Some(endpoint) = &config.endpoint {
            builder = builder.with_endpoint(endpoint);
        }
        if let (Some(key_id), Some(secret)) = (&config.access_key_id, &config.secret_access_key) {
            builder = builder
                .with_access_key_id(key_id)
                .with_secret_access_key(secret);
        }
        if config.allow_http {
            builder = builder.with_allow_http(true);
        }

        let store = builder.build().map_err(|e| {
            BundleError::ConfigError(format!("Invalid S3 target {}: {}", config.bucket, e))
        })?;

        Ok(Self {
            store,
            bucket: config.bucket.clone(),
        })
    }
}

#[async_trait]
impl CdnUploader for S3Uploader {
    async fn upload(&self, local_path: &Path, remote_path: &str) -> Result<()> {
        put_file(&self.store, local_path, remote_path, content_attributes(local_path)).await
    }

    fn target(&self) -> String {
        format!("s3://{}", self.bucket)
    }
}
