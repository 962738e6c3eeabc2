//! MFE Bundle Core - Foundational Types
//!
//! Errors, configuration and progress events shared by the bundle pipeline
//! runtime and its command-line front end.

pub mod config;
pub mod error;
pub mod event;

// Re-export commonly used types
pub use config::{
    AzureConfig, CdnConfig, GcsConfig, LocalConfig, LogLevel, ModulePolicy, NamingStrategy,
    PipelineConfig, RegistryConfig, S3Config,
};
pub use error::{BundleError, ErrorKind, Result};
pub use event::{EventEmitter, EventPayload, PipelineEvent};

/// MFE Bundle version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
