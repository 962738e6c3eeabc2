//! MFE Bundle Runtime - bundle pipeline implementation.
//!
//! This crate provides the stages of the micro-frontend bundle pipeline:
//! working-directory resolution, OCI artifact fetching, safe tarball
//! extraction, shared-module analysis and CDN publication, plus the
//! orchestrator that runs them in order.

#![allow(clippy::result_large_err)]

pub mod cdn;
pub mod extract;
pub mod fs;
pub mod module;
pub mod naming;
pub mod oci;
pub mod pipeline;

// Re-export common types
pub use cdn::{
    from_config as uploader_from_config, publish_directory, publish_shared_modules,
    AzureBlobUploader, CdnUploader, GcsUploader, LocalUploader, PublishOptions, S3Uploader,
    UploadTask,
};
pub use extract::{extract, extract_tarball, ExtractedBundle, SkippedEntry};
pub use module::{analyze, analyze_with_policy, read_manifest, write_manifest, SharedModule};
pub use naming::{resolve, ResolvedLocation};
pub use oci::{ArtifactFetcher, ArtifactReference, BundleArtifact, RegistryAuth, RegistryFetcher};
pub use pipeline::{Pipeline, PipelineOutcome, PipelineReport, PipelineRequest};

/// MFE Bundle Runtime version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
