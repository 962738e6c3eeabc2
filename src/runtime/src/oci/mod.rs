//! OCI artifact retrieval.
//!
//! A micro-frontend bundle is distributed as an OCI artifact. Fetching copies
//! the artifact's blobs into a content store inside the resolved location and
//! materializes one tar+gzip archive next to it:
//!
//! ```text
//! {location.directory}/
//! ├── oci-layout
//! ├── index.json
//! ├── blobs/sha256/<manifest|config|layers>
//! └── {location.base_filename}      (the bundle tarball)
//! ```

mod layout;
pub mod reference;
pub mod registry;

use std::path::PathBuf;

use async_trait::async_trait;
use mfe_bundle_core::error::Result;
use tokio_util::sync::CancellationToken;

use crate::naming::ResolvedLocation;

pub use layout::is_gzip_tarball_layer;
pub use reference::ArtifactReference;
pub use registry::{RegistryAuth, RegistryFetcher};

/// A fetched bundle tarball on local disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleArtifact {
    /// Registry coordinates the artifact was pulled from
    pub reference: String,
    /// Local tar+gzip archive
    pub tarball: PathBuf,
}

/// Retrieves an artifact and materializes it as a local tarball.
#[async_trait]
pub trait ArtifactFetcher: Send + Sync {
    /// Fetch `reference` into `location`, returning the tarball path.
    ///
    /// Must return `BundleError::Cancelled` promptly once `cancel` fires.
    async fn fetch(
        &self,
        reference: &str,
        location: &ResolvedLocation,
        cancel: &CancellationToken,
    ) -> Result<BundleArtifact>;
}
