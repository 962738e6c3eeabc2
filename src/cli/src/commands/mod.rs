//! CLI command definitions and dispatch.

mod analyze;
mod extract;
mod fetch;
mod publish;

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use mfe_bundle_core::PipelineConfig;
use tokio_util::sync::CancellationToken;

/// MFE Bundle - publish micro-frontend bundles from OCI registries to a CDN.
#[derive(Parser)]
#[command(name = "mfe-bundle", version, about)]
pub struct Cli {
    /// Configuration file (YAML, or JSON with a `.json` extension)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Subcommand)]
pub enum Command {
    /// Run the whole pipeline for one artifact
    Publish(publish::PublishArgs),
    /// Pull an artifact and materialize its tarball
    Fetch(fetch::FetchArgs),
    /// Extract a bundle tarball into a directory
    Extract(extract::ExtractArgs),
    /// List the shared modules referenced by a bundle directory
    Analyze(analyze::AnalyzeArgs),
}

/// Return the default configuration file (~/.mfe-bundle/config.yaml).
pub(crate) fn default_config_path() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(".mfe-bundle"))
        .unwrap_or_else(|| PathBuf::from(".mfe-bundle"))
        .join("config.yaml")
}

/// Load the configuration named on the command line, else the default file
/// when present, else built-in defaults.
pub fn load_config(path: Option<&Path>) -> mfe_bundle_core::Result<PipelineConfig> {
    match path {
        Some(path) => PipelineConfig::from_file(path),
        None => {
            let default = default_config_path();
            if default.is_file() {
                PipelineConfig::from_file(&default)
            } else {
                Ok(PipelineConfig::default())
            }
        }
    }
}

/// Token cancelled on the first Ctrl-C.
pub fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling");
            trigger.cancel();
        }
    });
    cancel
}

/// Dispatch a parsed command to the appropriate handler.
pub async fn dispatch(
    command: Command,
    config: PipelineConfig,
    cancel: CancellationToken,
) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Command::Publish(args) => publish::execute(args, config, cancel).await,
        Command::Fetch(args) => fetch::execute(args, config, cancel).await,
        Command::Extract(args) => extract::execute(args, cancel).await,
        Command::Analyze(args) => analyze::execute(args, config).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_publish() {
        let cli = Cli::try_parse_from([
            "mfe-bundle",
            "--config",
            "pipeline.yaml",
            "publish",
            "ghcr.io/team/checkout:1.4.0",
            "--name",
            "checkout",
            "--cdn-base-path",
            "apps/checkout/1.4.0",
            "--entry-point",
            "index.html",
            "--expose",
            "./Cart",
            "--expose",
            "./Button",
        ])
        .unwrap();

        assert_eq!(cli.config, Some(PathBuf::from("pipeline.yaml")));
        match cli.command {
            Command::Publish(args) => {
                assert_eq!(args.artifact, "ghcr.io/team/checkout:1.4.0");
                assert_eq!(args.name, "checkout");
                assert_eq!(args.cdn_base_path, "apps/checkout/1.4.0");
                assert_eq!(args.exposed_modules, vec!["./Cart", "./Button"]);
            }
            _ => panic!("expected publish"),
        }
    }

    #[test]
    fn test_config_flag_after_subcommand() {
        let cli = Cli::try_parse_from(["mfe-bundle", "analyze", "dist", "--dedup", "--config", "c.json"])
            .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("c.json")));
        assert!(matches!(cli.command, Command::Analyze(ref a) if a.dedup));
    }

    #[test]
    fn test_publish_requires_name() {
        assert!(Cli::try_parse_from([
            "mfe-bundle",
            "publish",
            "ghcr.io/team/checkout:1.4.0",
            "--cdn-base-path",
            "apps"
        ])
        .is_err());
    }

    #[test]
    fn test_load_config_from_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("pipeline.yaml");
        std::fs::write(
            &path,
            "upload_concurrency: 8\ncdn:\n  backend: local\n  root: /srv/cdn\n",
        )
        .unwrap();

        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.upload_concurrency, 8);
    }

    #[test]
    fn test_load_config_missing_file() {
        let tmp = TempDir::new().unwrap();
        assert!(load_config(Some(&tmp.path().join("missing.yaml"))).is_err());
    }
}
