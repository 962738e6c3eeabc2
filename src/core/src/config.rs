//! Pipeline configuration.
//!
//! A [`PipelineConfig`] is constructed once at startup (from a YAML or JSON
//! file, or from defaults) and passed by reference into every component that
//! needs it. Nothing here reads ambient global state except the optional
//! credential fallbacks documented on each backend.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{BundleError, Result};

/// Default number of concurrent uploads per publish.
pub const DEFAULT_UPLOAD_CONCURRENCY: usize = 4;

/// Pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Base directory under which fetch and extract locations are resolved
    pub work_dir: PathBuf,

    /// How working directories are named
    pub naming_strategy: NamingStrategy,

    /// Maximum in-flight uploads during a directory publish
    pub upload_concurrency: usize,

    /// Whether repeated shared-module matches are kept or collapsed
    pub module_policy: ModulePolicy,

    /// Keep the fetched tarball after a successful extraction
    pub keep_tarball: bool,

    /// Keep the per-run fetch and extraction directories after the run
    pub keep_workdir: bool,

    /// Log level used when `RUST_LOG` is not set
    pub log_level: LogLevel,

    /// Registry access
    pub registry: RegistryConfig,

    /// CDN backend
    pub cdn: CdnConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            work_dir: std::env::temp_dir().join("mfe-bundle"),
            naming_strategy: NamingStrategy::default(),
            upload_concurrency: DEFAULT_UPLOAD_CONCURRENCY,
            module_policy: ModulePolicy::default(),
            keep_tarball: false,
            keep_workdir: false,
            log_level: LogLevel::Info,
            registry: RegistryConfig::default(),
            cdn: CdnConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Load a configuration file. `.json` files are parsed as JSON, anything
    /// else as YAML.
    pub fn from_file(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .map_err(|e| BundleError::io("Read config", path, e))?;

        let config: PipelineConfig = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => serde_json::from_str(&data)?,
            _ => serde_yaml::from_str(&data)?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject configurations that can never produce a successful run.
    pub fn validate(&self) -> Result<()> {
        if self.upload_concurrency == 0 {
            return Err(BundleError::ConfigError(
                "upload_concurrency must be at least 1".to_string(),
            ));
        }
        self.cdn.validate()
    }
}

/// Working-directory naming strategy.
///
/// Parsing never fails: unrecognized values fall back to
/// [`NamingStrategy::IsolatedTempDir`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", from = "StrategySelector")]
pub enum NamingStrategy {
    /// Fresh unique directory per invocation
    #[default]
    IsolatedTempDir,
    /// Directory derived from the sanitized logical name
    UseName,
    /// Directory suffixed with a random UUID
    UseUuid,
}

impl NamingStrategy {
    /// Parse a strategy selector, degrading to `IsolatedTempDir`.
    ///
    /// Accepts kebab/snake/camel spellings and the numeric selectors `0`, `1`
    /// and `2`.
    pub fn parse_lossy(value: &str) -> Self {
        let normalized: String = value
            .trim()
            .chars()
            .filter(|c| *c != '-' && *c != '_')
            .collect::<String>()
            .to_ascii_lowercase();

        match normalized.as_str() {
            "isolatedtempdir" | "isolated" | "0" => Self::IsolatedTempDir,
            "usename" | "usecrname" | "name" | "1" => Self::UseName,
            "useuuid" | "uuid" | "2" => Self::UseUuid,
            _ => {
                tracing::warn!(
                    strategy = value,
                    "Unknown naming strategy, falling back to isolated-temp-dir"
                );
                Self::IsolatedTempDir
            }
        }
    }
}

impl From<String> for NamingStrategy {
    fn from(value: String) -> Self {
        Self::parse_lossy(&value)
    }
}

/// Raw `naming_strategy` value: a name or a bare numeric selector.
#[derive(Deserialize)]
#[serde(untagged)]
enum StrategySelector {
    Number(i64),
    Name(String),
}

impl From<StrategySelector> for NamingStrategy {
    fn from(selector: StrategySelector) -> Self {
        match selector {
            StrategySelector::Number(n) => Self::parse_lossy(&n.to_string()),
            StrategySelector::Name(name) => Self::parse_lossy(&name),
        }
    }
}

impl std::str::FromStr for NamingStrategy {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self::parse_lossy(s))
    }
}

impl std::fmt::Display for NamingStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::IsolatedTempDir => write!(f, "isolated-temp-dir"),
            Self::UseName => write!(f, "use-name"),
            Self::UseUuid => write!(f, "use-uuid"),
        }
    }
}

/// How repeated shared-module references in one entry file are reported
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ModulePolicy {
    /// Every match is reported, duplicates included
    #[default]
    Raw,
    /// First occurrence of each (name, version, entry) only
    Deduplicated,
}

/// Registry access configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Basic-auth username (falls back to `REGISTRY_USERNAME`)
    pub username: Option<String>,

    /// Basic-auth password (falls back to `REGISTRY_PASSWORD`)
    pub password: Option<String>,

    /// Registry hosts reached over plain HTTP (e.g. `localhost:5000`)
    pub insecure_registries: Vec<String>,
}

/// CDN backend selection. Exactly one backend is active per configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum CdnConfig {
    S3(S3Config),
    Gcs(GcsConfig),
    Azure(AzureConfig),
    Local(LocalConfig),
}

impl Default for CdnConfig {
    fn default() -> Self {
        CdnConfig::Local(LocalConfig {
            root: PathBuf::from("cdn"),
        })
    }
}

impl CdnConfig {
    /// Human-readable identity of the target, e.g. `s3://assets`.
    pub fn identity(&self) -> String {
        match self {
            CdnConfig::S3(c) => format!("s3://{}", c.bucket),
            CdnConfig::Gcs(c) => format!("gs://{}", c.bucket),
            CdnConfig::Azure(c) => format!("azure://{}/{}", c.account, c.container),
            CdnConfig::Local(c) => format!("file://{}", c.root.display()),
        }
    }

    fn validate(&self) -> Result<()> {
        let missing = match self {
            CdnConfig::S3(c) if c.bucket.trim().is_empty() => Some("s3 bucket"),
            CdnConfig::Gcs(c) if c.bucket.trim().is_empty() => Some("gcs bucket"),
            CdnConfig::Azure(c) if c.account.trim().is_empty() => Some("azure account"),
            CdnConfig::Azure(c) if c.container.trim().is_empty() => Some("azure container"),
            CdnConfig::Local(c) if c.root.as_os_str().is_empty() => Some("local root"),
            _ => None,
        };

        match missing {
            Some(field) => Err(BundleError::ConfigError(format!("{field} must not be empty"))),
            None => Ok(()),
        }
    }
}

/// Amazon S3 (or S3-compatible) bucket
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct S3Config {
    pub bucket: String,
    #[serde(default)]
    pub region: Option<String>,
    /// Custom endpoint for S3-compatible stores
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub access_key_id: Option<String>,
    #[serde(default)]
    pub secret_access_key: Option<String>,
    /// Permit `http://` endpoints
    #[serde(default)]
    pub allow_http: bool,
}

/// Google Cloud Storage bucket
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GcsConfig {
    pub bucket: String,
    #[serde(default)]
    pub service_account_path: Option<PathBuf>,
}

/// Azure Blob Storage container
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AzureConfig {
    pub account: String,
    pub container: String,
    #[serde(default)]
    pub access_key: Option<String>,
}

/// Directory on local disk served as a CDN origin
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LocalConfig {
    pub root: PathBuf,
}

/// Log level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Directive string for an `EnvFilter`.
    pub fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }
}
