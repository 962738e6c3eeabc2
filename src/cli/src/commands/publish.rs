//! `mfe-bundle publish` command.

use std::path::PathBuf;

use clap::Args;
use mfe_bundle_core::PipelineConfig;
use mfe_bundle_runtime::{Pipeline, PipelineRequest};
use tokio_util::sync::CancellationToken;

#[derive(Args)]
pub struct PublishArgs {
    /// Artifact reference (e.g., "ghcr.io/org/checkout:1.4.0")
    pub artifact: String,

    /// Logical micro-frontend name
    #[arg(long)]
    pub name: String,

    /// CDN prefix the bundle is published under
    #[arg(long)]
    pub cdn_base_path: String,

    /// File that must exist in the bundle (e.g., "index.html")
    #[arg(long, default_value = "")]
    pub entry_point: String,

    /// Exposed module name (repeatable)
    #[arg(long = "expose")]
    pub exposed_modules: Vec<String>,

    /// Where to write the shared-module manifest
    #[arg(long)]
    pub manifest: Option<PathBuf>,
}

pub async fn execute(
    args: PublishArgs,
    config: PipelineConfig,
    cancel: CancellationToken,
) -> Result<(), Box<dyn std::error::Error>> {
    let pipeline = Pipeline::from_config(config)?;

    let request = PipelineRequest {
        name: args.name,
        artifact: args.artifact,
        cdn_base_path: args.cdn_base_path,
        entry_point: args.entry_point,
        exposed_modules: args.exposed_modules,
        manifest_path: args.manifest,
    };

    let outcome = pipeline.run(&request, &cancel).await;
    println!("{}", serde_json::to_string_pretty(&outcome)?);

    if !outcome.success {
        return Err(outcome.message.into());
    }
    Ok(())
}
