//! OCI registry client for pulling bundle artifacts.
//!
//! Uses the `oci-distribution` crate to talk to container registries
//! (GHCR, Docker Hub, Harbor, a local `registry:2`, ...).

use async_trait::async_trait;
use mfe_bundle_core::error::{BundleError, Result};
use mfe_bundle_core::RegistryConfig;
use oci_distribution::client::{ClientConfig, ClientProtocol};
use oci_distribution::manifest::{OciDescriptor, OciImageManifest};
use oci_distribution::secrets::RegistryAuth as OciRegistryAuth;
use oci_distribution::{Client, Reference};
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

use super::layout::{is_gzip_tarball_layer, pack_layers, verify_blob, ContentStore};
use super::reference::ArtifactReference;
use super::{ArtifactFetcher, BundleArtifact};
use crate::fs::run_blocking;
use crate::naming::ResolvedLocation;

/// Authentication credentials for a container registry.
#[derive(Debug, Clone)]
pub struct RegistryAuth {
    username: Option<String>,
    password: Option<String>,
}

impl RegistryAuth {
    /// Create anonymous authentication (no credentials).
    pub fn anonymous() -> Self {
        Self {
            username: None,
            password: None,
        }
    }

    /// Create basic authentication with username and password.
    pub fn basic(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: Some(username.into()),
            password: Some(password.into()),
        }
    }

    /// Create authentication from environment variables.
    ///
    /// Reads `REGISTRY_USERNAME` and `REGISTRY_PASSWORD`.
    /// Falls back to anonymous if not set.
    pub fn from_env() -> Self {
        let username = std::env::var("REGISTRY_USERNAME").ok();
        let password = std::env::var("REGISTRY_PASSWORD").ok();

        if username.is_some() && password.is_some() {
            Self { username, password }
        } else {
            Self::anonymous()
        }
    }

    /// Credentials from configuration, falling back to env vars, then
    /// anonymous.
    pub fn from_config(config: &RegistryConfig) -> Self {
        match (&config.username, &config.password) {
            (Some(u), Some(p)) => Self::basic(u.clone(), p.clone()),
            _ => Self::from_env(),
        }
    }

    /// Convert to oci-distribution auth type.
    fn to_oci_auth(&self) -> OciRegistryAuth {
        match (&self.username, &self.password) {
            (Some(u), Some(p)) => OciRegistryAuth::Basic(u.clone(), p.clone()),
            _ => OciRegistryAuth::Anonymous,
        }
    }
}

/// Pulls bundle artifacts from container registries.
pub struct RegistryFetcher {
    client: Client,
    auth: RegistryAuth,
}

impl RegistryFetcher {
    /// Create a new fetcher with anonymous authentication.
    pub fn new() -> Self {
        Self::with_auth(RegistryAuth::anonymous())
    }

    /// Create a new fetcher with the given authentication.
    pub fn with_auth(auth: RegistryAuth) -> Self {
        Self::build(auth, ClientProtocol::Https)
    }

    /// Create a fetcher from registry configuration.
    pub fn from_config(config: &RegistryConfig) -> Self {
        let protocol = if config.insecure_registries.is_empty() {
            ClientProtocol::Https
        } else {
            ClientProtocol::HttpsExcept(config.insecure_registries.clone())
        };
        Self::build(RegistryAuth::from_config(config), protocol)
    }

    fn build(auth: RegistryAuth, protocol: ClientProtocol) -> Self {
        let config = ClientConfig {
            protocol,
            ..Default::default()
        };
        Self {
            client: Client::new(config),
            auth,
        }
    }

    /// Pull an artifact into `location` and materialize its tarball.
    async fn pull(
        &self,
        reference: &ArtifactReference,
        location: &ResolvedLocation,
    ) -> Result<BundleArtifact> {
        let oci_ref = to_oci_reference(reference)?;
        let registry = reference.registry.as_str();

        tracing::info!(
            reference = %reference,
            target = %location.directory.display(),
            "Pulling artifact from registry"
        );

        let store = ContentStore::create(&location.directory)?;

        let auth = self.auth.to_oci_auth();
        let (manifest, manifest_digest) = self
            .client
            .pull_image_manifest(&oci_ref, &auth)
            .await
            .map_err(|e| registry_error(registry, format!("Failed to pull manifest: {}", e)))?;

        let manifest_json = serde_json::to_vec(&manifest)?;
        let manifest_path = store.blob_path(&manifest_digest)?;
        tokio::fs::write(&manifest_path, &manifest_json)
            .await
            .map_err(|e| BundleError::io("Write manifest blob", &manifest_path, e))?;

        self.pull_blob(&oci_ref, &manifest.config, &store, registry)
            .await?;
        for layer in &manifest.layers {
            tracing::debug!(digest = %layer.digest, size = layer.size, "Pulling layer");
            self.pull_blob(&oci_ref, layer, &store, registry).await?;
        }

        store.write_index(&manifest_digest, manifest_json.len())?;

        let tarball = location.tarball_path();
        materialize(&store, &manifest, &tarball, registry).await?;

        tracing::info!(
            reference = %reference,
            digest = %manifest_digest,
            tarball = %tarball.display(),
            "Artifact saved"
        );

        Ok(BundleArtifact {
            reference: reference.full_reference(),
            tarball,
        })
    }

    /// Stream one blob to the content store and verify its digest.
    async fn pull_blob(
        &self,
        oci_ref: &Reference,
        descriptor: &OciDescriptor,
        store: &ContentStore,
        registry: &str,
    ) -> Result<()> {
        let path = store.blob_path(&descriptor.digest)?;
        let mut file = tokio::fs::File::create(&path)
            .await
            .map_err(|e| BundleError::io("Create blob", &path, e))?;

        self.client
            .pull_blob(oci_ref, descriptor, &mut file)
            .await
            .map_err(|e| {
                registry_error(
                    registry,
                    format!("Failed to pull blob {}: {}", descriptor.digest, e),
                )
            })?;
        file.flush()
            .await
            .map_err(|e| BundleError::io("Flush blob", &path, e))?;

        let digest = descriptor.digest.clone();
        let registry = registry.to_string();
        run_blocking(move || verify_blob(&path, &digest, &registry)).await
    }
}

impl Default for RegistryFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ArtifactFetcher for RegistryFetcher {
    async fn fetch(
        &self,
        reference: &str,
        location: &ResolvedLocation,
        cancel: &CancellationToken,
    ) -> Result<BundleArtifact> {
        let parsed = ArtifactReference::parse(reference)?;

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::warn!(reference = %parsed, "Fetch cancelled");
                Err(BundleError::Cancelled(format!("fetch {}", parsed)))
            }
            result = self.pull(&parsed, location) => result,
        }
    }
}

/// Produce the single bundle tarball from the pulled layers.
async fn materialize(
    store: &ContentStore,
    manifest: &OciImageManifest,
    target: &std::path::Path,
    registry: &str,
) -> Result<()> {
    match manifest.layers.as_slice() {
        [] => Err(registry_error(
            registry,
            "Artifact manifest has no layers".to_string(),
        )),
        [single] if is_gzip_tarball_layer(single) => {
            let blob = store.blob_path(&single.digest)?;
            tokio::fs::copy(&blob, target)
                .await
                .map_err(|e| BundleError::io("Write tarball", target, e))?;
            Ok(())
        }
        layers => {
            let store = store.clone();
            let layers = layers.to_vec();
            let target = target.to_path_buf();
            run_blocking(move || pack_layers(&store, &layers, &target)).await
        }
    }
}

/// Convert an ArtifactReference to an oci-distribution Reference.
fn to_oci_reference(reference: &ArtifactReference) -> Result<Reference> {
    let ref_str = reference.pull_reference();
    ref_str
        .parse::<Reference>()
        .map_err(|e| BundleError::InvalidReference {
            reference: ref_str.clone(),
            message: e.to_string(),
        })
}

fn registry_error(registry: &str, message: String) -> BundleError {
    BundleError::RegistryError {
        registry: registry.to_string(),
        message,
    }
}
