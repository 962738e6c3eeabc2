//! Azure Blob Storage backend.

use std::path::Path;

use async_trait::async_trait;
use mfe_bundle_core::error::{BundleError, Result};
use mfe_bundle_core::AzureConfig;
use object_store::azure::{MicrosoftAzure, MicrosoftAzureBuilder};

use super::object::{content_attributes, put_file};
use super::CdnUploader;

/// Uploads into an Azure Blob Storage container.
#[derive(Debug)]
pub struct AzureBlobUploader {
    store: MicrosoftAzure,
    account: String,
    container: String,
}

impl AzureBlobUploader {
    pub fn new(config: &AzureConfig) -> Result<Self> {
        let mut builder = MicrosoftAzureBuilder::from_env()
            .with_account(&config.account)
            .with_container_name(&config.container);
        if let Some(key) = &config.access_key {
            builder = builder.with_access_key(key);
        }

        let store = builder.build().map_err(|e| {
            BundleError::ConfigError(format!(
                "Invalid Azure target {}/{}: {}",
                config.account, config.container, e
            ))
        })?;

        Ok(Self {
            store,
            account: config.account.clone(),
            container: config.container.clone(),
        })
    }
}

#[async_trait]
impl CdnUploader for AzureBlobUploader {
    async fn upload(&self, local_path: &Path, remote_path: &str) -> Result<()> {
        put_file(&self.store, local_path, remote_path, content_attributes(local_path)).await
    }

    fn target(&self) -> String {
        format!("azure://{}/{}", self.account, self.container)
    }
}
