use std::path::{Path, PathBuf};

use thiserror::Error;

/// Bundle pipeline error types
#[derive(Error, Debug)]
pub enum BundleError {
    /// Configuration error (bad backend identity, missing entry point, ...)
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Artifact reference could not be parsed
    #[error("Invalid artifact reference '{reference}': {message}")]
    InvalidReference { reference: String, message: String },

    /// Container registry error
    #[error("Registry error: {registry} - {message}")]
    RegistryError { registry: String, message: String },

    /// CDN backend rejected or failed an upload
    #[error("Upload failed: {path} - {message}")]
    UploadError { path: String, message: String },

    /// Archive entry would be written outside the extraction root
    #[error("Path traversal detected: entry '{entry}' escapes {}", .root.display())]
    PathTraversal { entry: String, root: PathBuf },

    /// Filesystem operation failed on a specific path
    #[error("{operation} failed for {}: {source}", .path.display())]
    Io {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Operation aborted by its cancellation token
    #[error("Cancelled: {0}")]
    Cancelled(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

/// Coarse classification used by callers deciding whether to retry a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad registry, bucket or request input. Not retried within a run.
    Configuration,
    /// Network failure during fetch or upload.
    Transport,
    /// Path traversal. Never retried.
    Security,
    /// Filesystem permission/space/serialization failure.
    Resource,
    /// The caller cancelled the operation.
    Cancelled,
}

impl BundleError {
    /// Wrap an I/O error with the operation and path that failed.
    pub fn io(operation: &'static str, path: impl AsRef<Path>, source: std::io::Error) -> Self {
        BundleError::Io {
            operation,
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            BundleError::ConfigError(_) | BundleError::InvalidReference { .. } => {
                ErrorKind::Configuration
            }
            BundleError::RegistryError { .. } | BundleError::UploadError { .. } => {
                ErrorKind::Transport
            }
            BundleError::PathTraversal { .. } => ErrorKind::Security,
            BundleError::Cancelled(_) => ErrorKind::Cancelled,
            BundleError::Io { .. }
            | BundleError::SerializationError(_)
            | BundleError::Other(_) => ErrorKind::Resource,
        }
    }

    /// Whether re-running the whole pipeline may succeed.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Transport
    }
}

impl From<serde_json::Error> for BundleError {
    fn from(err: serde_json::Error) -> Self {
        BundleError::SerializationError(err.to_string())
    }
}

impl From<serde_yaml::Error> for BundleError {
    fn from(err: serde_yaml::Error) -> Self {
        BundleError::SerializationError(err.to_string())
    }
}

/// Result type alias for bundle pipeline operations
pub type Result<T> = std::result::Result<T, BundleError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_error_display() {
        let error = BundleError::RegistryError {
            registry: "ghcr.io".to_string(),
            message: "Authentication failed".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Registry error: ghcr.io - Authentication failed"
        );
        assert_eq!(error.kind(), ErrorKind::Transport);
        assert!(error.is_retryable());
    }

    #[test]
    fn test_path_traversal_display() {
        let error = BundleError::PathTraversal {
            entry: "../escape.txt".to_string(),
            root: PathBuf::from("/work/extract"),
        };
        assert_eq!(
            error.to_string(),
            "Path traversal detected: entry '../escape.txt' escapes /work/extract"
        );
        assert_eq!(error.kind(), ErrorKind::Security);
        assert!(!error.is_retryable());
    }

    #[test]
    fn test_io_error_carries_path() {
        let source = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let error = BundleError::io("Create directory", "/srv/bundles", source);
        assert_eq!(
            error.to_string(),
            "Create directory failed for /srv/bundles: denied"
        );
        assert_eq!(error.kind(), ErrorKind::Resource);
        assert!(std::error::Error::source(&error).is_some());
    }

    #[test]
    fn test_upload_error_display() {
        let error = BundleError::UploadError {
            path: "cdn/mfe/index.html".to_string(),
            message: "503 Slow Down".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Upload failed: cdn/mfe/index.html - 503 Slow Down"
        );
        assert!(error.is_retryable());
    }

    #[test]
    fn test_config_and_reference_are_not_retryable() {
        let config = BundleError::ConfigError("empty bucket".to_string());
        let reference = BundleError::InvalidReference {
            reference: "".to_string(),
            message: "empty".to_string(),
        };
        assert_eq!(config.kind(), ErrorKind::Configuration);
        assert_eq!(reference.kind(), ErrorKind::Configuration);
        assert!(!config.is_retryable());
        assert!(!reference.is_retryable());
    }

    #[test]
    fn test_cancelled_kind() {
        let error = BundleError::Cancelled("fetch ghcr.io/org/app:v1".to_string());
        assert_eq!(error.to_string(), "Cancelled: fetch ghcr.io/org/app:v1");
        assert_eq!(error.kind(), ErrorKind::Cancelled);
    }

    #[test]
    fn test_serde_json_error_conversion() {
        let result: std::result::Result<serde_json::Value, _> = serde_json::from_str("{ nope");
        let error: BundleError = result.unwrap_err().into();
        assert!(matches!(error, BundleError::SerializationError(_)));
    }

    #[test]
    fn test_serde_yaml_error_conversion() {
        let result: std::result::Result<serde_yaml::Value, _> =
            serde_yaml::from_str("invalid: yaml: content:");
        let error: BundleError = result.unwrap_err().into();
        assert!(matches!(error, BundleError::SerializationError(_)));
    }
}
