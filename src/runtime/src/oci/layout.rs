//! Local content store written by the fetcher.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use flate2::write::GzEncoder;
use flate2::Compression;
use mfe_bundle_core::error::{BundleError, Result};
use oci_distribution::manifest::OciDescriptor;
use sha2::{Digest, Sha256};

/// Annotation carrying a layer's original file name.
pub(crate) const TITLE_ANNOTATION: &str = "org.opencontainers.image.title";

const OCI_LAYOUT: &str = r#"{"imageLayoutVersion":"1.0.0"}"#;

/// Content store rooted at a resolved directory.
#[derive(Debug, Clone)]
pub(crate) struct ContentStore {
    root: PathBuf,
    blobs_dir: PathBuf,
}

impl ContentStore {
    pub(crate) fn create(root: &Path) -> Result<Self> {
        let blobs_dir = root.join("blobs").join("sha256");
        std::fs::create_dir_all(&blobs_dir)
            .map_err(|e| BundleError::io("Create blobs directory", &blobs_dir, e))?;
        Ok(Self {
            root: root.to_path_buf(),
            blobs_dir,
        })
    }

    /// Path of the blob with the given `algorithm:hex` digest.
    ///
    /// The digest comes from the registry, so it is validated before it
    /// becomes a path component.
    pub(crate) fn blob_path(&self, digest: &str) -> Result<PathBuf> {
        let encoded = digest_encoded(digest)?;
        Ok(self.blobs_dir.join(encoded))
    }

    /// Write the `oci-layout` marker and an `index.json` pointing at the
    /// manifest.
    pub(crate) fn write_index(&self, manifest_digest: &str, manifest_size: usize) -> Result<()> {
        let layout_path = self.root.join("oci-layout");
        std::fs::write(&layout_path, OCI_LAYOUT)
            .map_err(|e| BundleError::io("Write oci-layout", &layout_path, e))?;

        let index = serde_json::json!({
            "schemaVersion": 2,
            "manifests": [{
                "mediaType": "application/vnd.oci.image.manifest.v1+json",
                "digest": manifest_digest,
                "size": manifest_size
            }]
        });
        let index_path = self.root.join("index.json");
        std::fs::write(&index_path, serde_json::to_string_pretty(&index)?)
            .map_err(|e| BundleError::io("Write index.json", &index_path, e))?;
        Ok(())
    }
}

/// Split a digest and return its encoded part.
///
/// `sha256` digests must carry exactly 64 lowercase hex characters. Other
/// algorithms must use a lowercase alphanumeric name and an alphanumeric
/// value.
pub(crate) fn digest_encoded(digest: &str) -> Result<&str> {
    let invalid = |message: &str| BundleError::InvalidReference {
        reference: digest.to_string(),
        message: message.to_string(),
    };

    let (algorithm, encoded) = digest
        .split_once(':')
        .ok_or_else(|| invalid("digest must have the form algorithm:value"))?;

    if algorithm == "sha256" {
        let is_lower_hex = |c: char| c.is_ascii_digit() || ('a'..='f').contains(&c);
        if encoded.len() != 64 || !encoded.chars().all(is_lower_hex) {
            return Err(invalid("sha256 digest must be 64 lowercase hex characters"));
        }
        return Ok(encoded);
    }

    let algorithm_ok = !algorithm.is_empty()
        && algorithm
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit());
    let encoded_ok = !encoded.is_empty() && encoded.chars().all(|c| c.is_ascii_alphanumeric());
    if !algorithm_ok || !encoded_ok {
        return Err(invalid("digest must be alphanumeric"));
    }
    Ok(encoded)
}

/// Check a blob on disk against its `sha256:` digest. Other algorithms are
/// accepted unverified.
pub(crate) fn verify_blob(path: &Path, digest: &str, registry: &str) -> Result<()> {
    let Some(expected) = digest.strip_prefix("sha256:") else {
        tracing::debug!(digest, "Skipping verification for non-sha256 digest");
        return Ok(());
    };

    let file = File::open(path).map_err(|e| BundleError::io("Open blob", path, e))?;
    let mut hasher = Sha256::new();
    std::io::copy(&mut BufReader::new(file), &mut hasher)
        .map_err(|e| BundleError::io("Hash blob", path, e))?;
    let actual = hex::encode(hasher.finalize());

    if actual != expected {
        return Err(BundleError::RegistryError {
            registry: registry.to_string(),
            message: format!(
                "Digest mismatch for {}: expected sha256:{}, got sha256:{}",
                path.display(),
                expected,
                actual
            ),
        });
    }
    Ok(())
}

/// Whether a layer is itself a gzip-compressed tarball that can be used as
/// the bundle archive without repacking.
pub fn is_gzip_tarball_layer(layer: &OciDescriptor) -> bool {
    let media_type = layer.media_type.as_str();
    if media_type.ends_with("tar+gzip") || media_type.ends_with("tar.gzip") {
        return true;
    }
    layer_title(layer)
        .map(|t| t.ends_with(".tar.gz") || t.ends_with(".tgz"))
        .unwrap_or(false)
}

/// File name recorded for a layer, falling back to its digest hex.
pub(crate) fn layer_name(layer: &OciDescriptor) -> String {
    match layer_title(layer) {
        Some(title) => title.to_string(),
        None => layer
            .digest
            .split_once(':')
            .map(|(_, h)| h.to_string())
            .unwrap_or_else(|| layer.digest.clone()),
    }
}

fn layer_title(layer: &OciDescriptor) -> Option<&str> {
    layer
        .annotations
        .as_ref()
        .and_then(|a| a.get(TITLE_ANNOTATION))
        .map(String::as_str)
}

/// Pack several blobs into one tar+gzip archive at `target`.
///
/// Entry names come from the layer titles; the tar builder rejects names
/// that would escape the archive root.
pub(crate) fn pack_layers(store: &ContentStore, layers: &[OciDescriptor], target: &Path) -> Result<()> {
    let file = File::create(target).map_err(|e| BundleError::io("Create tarball", target, e))?;
    let encoder = GzEncoder::new(file, Compression::default());
    let mut builder = tar::Builder::new(encoder);

    for layer in layers {
        let name = layer_name(layer);
        let blob = store.blob_path(&layer.digest)?;
        builder
            .append_path_with_name(&blob, &name)
            .map_err(|e| BundleError::io("Append layer to tarball", &blob, e))?;
    }

    let encoder = builder
        .into_inner()
        .map_err(|e| BundleError::io("Finish tarball", target, e))?;
    encoder
        .finish()
        .map_err(|e| BundleError::io("Finish tarball", target, e))?;
    Ok(())
}
