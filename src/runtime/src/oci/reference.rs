//! OCI artifact reference parsing.
//!
//! Parses references like `ghcr.io/team/checkout-mfe:1.4.0` or
//! `ghcr.io/team/checkout-mfe@sha256:...` into structured components.

use mfe_bundle_core::error::{BundleError, Result};

/// Default registry when none is specified.
const DEFAULT_REGISTRY: &str = "docker.io";

/// Default tag when neither tag nor digest is specified.
const DEFAULT_TAG: &str = "latest";

/// Parsed OCI artifact reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactReference {
    /// Registry hostname, optionally with port (e.g., "ghcr.io", "localhost:5000")
    pub registry: String,
    /// Repository path (e.g., "team/checkout-mfe")
    pub repository: String,
    /// Tag (e.g., "1.4.0")
    pub tag: Option<String>,
    /// Digest (e.g., "sha256:abc123...")
    pub digest: Option<String>,
}

impl ArtifactReference {
    /// Parse an artifact reference string.
    ///
    /// Supports formats:
    /// - `checkout` → docker.io/library/checkout:latest
    /// - `team/checkout:1.4.0` → docker.io/team/checkout:1.4.0
    /// - `ghcr.io/team/checkout:1.4.0`
    /// - `ghcr.io/team/checkout@sha256:abc...`
    /// - `localhost:5000/checkout:dev`
    pub fn parse(reference: &str) -> Result<Self> {
        let reference = reference.trim();
        if reference.is_empty() {
            return Err(invalid(reference, "empty reference"));
        }

        let (name_tag, digest) = match reference.rsplit_once('@') {
            Some((name, digest)) => {
                if !digest.contains(':') {
                    return Err(invalid(reference, "expected digest as algorithm:hex"));
                }
                (name, Some(digest.to_string()))
            }
            None => (reference, None),
        };

        let (name, tag) = split_tag(name_tag);
        let (registry, repository) = split_registry_repository(name)
            .ok_or_else(|| invalid(reference, "empty repository"))?;

        let tag = match (tag, &digest) {
            (None, None) => Some(DEFAULT_TAG.to_string()),
            (tag, _) => tag.map(str::to_string),
        };

        Ok(ArtifactReference {
            registry,
            repository,
            tag,
            digest,
        })
    }

    /// Get the full reference string.
    pub fn full_reference(&self) -> String {
        let mut s = format!("{}/{}", self.registry, self.repository);
        if let Some(ref tag) = self.tag {
            s.push(':');
            s.push_str(tag);
        }
        if let Some(ref digest) = self.digest {
            s.push('@');
            s.push_str(digest);
        }
        s
    }

    /// Reference string as pulled: the digest wins over the tag when both
    /// are present.
    pub fn pull_reference(&self) -> String {
        match (&self.digest, &self.tag) {
            (Some(digest), _) => format!("{}/{}@{}", self.registry, self.repository, digest),
            (None, Some(tag)) => format!("{}/{}:{}", self.registry, self.repository, tag),
            (None, None) => format!("{}/{}:{}", self.registry, self.repository, DEFAULT_TAG),
        }
    }
}

impl std::fmt::Display for ArtifactReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.full_reference())
    }
}

impl std::str::FromStr for ArtifactReference {
    type Err = BundleError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

fn invalid(reference: &str, message: &str) -> BundleError {
    BundleError::InvalidReference {
        reference: reference.to_string(),
        message: message.to_string(),
    }
}

/// Split `name[:tag]`. A colon only starts a tag after the last `/`; a
/// trailing numeric segment with no slash is a registry port.
fn split_tag(name_tag: &str) -> (&str, Option<&str>) {
    let last_segment_start = name_tag.rfind('/').map(|p| p + 1).unwrap_or(0);
    let last_segment = &name_tag[last_segment_start..];

    match last_segment.rfind(':') {
        Some(colon) => {
            let tag = &last_segment[colon + 1..];
            if last_segment_start == 0 && tag.chars().all(|c| c.is_ascii_digit()) {
                return (name_tag, None);
            }
            (&name_tag[..last_segment_start + colon], Some(tag))
        }
        None => (name_tag, None),
    }
}

/// Split a name into registry and repository components.
fn split_registry_repository(name: &str) -> Option<(String, String)> {
    if let Some((first, rest)) = name.split_once('/') {
        // The first component is a registry if it looks like a hostname.
        if first.contains('.') || first.contains(':') || first == "localhost" {
            if rest.is_empty() {
                return None;
            }
            return Some((first.to_string(), rest.to_string()));
        }
    }

    if name.is_empty() {
        return None;
    }

    let repository = if name.contains('/') {
        name.to_string()
    } else {
        format!("library/{}", name)
    };

    Some((DEFAULT_REGISTRY.to_string(), repository))
}
