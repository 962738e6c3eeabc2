//! `mfe-bundle fetch` command.

use clap::Args;
use mfe_bundle_core::PipelineConfig;
use mfe_bundle_runtime::naming;
use mfe_bundle_runtime::pipeline::FETCH_DIR;
use mfe_bundle_runtime::{ArtifactFetcher, ArtifactReference, RegistryFetcher};
use tokio_util::sync::CancellationToken;

#[derive(Args)]
pub struct FetchArgs {
    /// Artifact reference (e.g., "ghcr.io/org/checkout:1.4.0")
    pub artifact: String,

    /// Logical name for the working directory (defaults to the repository)
    #[arg(long)]
    pub name: Option<String>,

    /// Suppress progress output
    #[arg(short, long)]
    pub quiet: bool,
}

pub async fn execute(
    args: FetchArgs,
    config: PipelineConfig,
    cancel: CancellationToken,
) -> Result<(), Box<dyn std::error::Error>> {
    let reference = ArtifactReference::parse(&args.artifact)?;
    let name = args.name.unwrap_or_else(|| reference.repository.clone());

    let location = naming::resolve(
        config.naming_strategy,
        &config.work_dir.join(FETCH_DIR),
        &name,
        "fetch",
    )?;
    let fetcher = RegistryFetcher::from_config(&config.registry);

    if !args.quiet {
        println!("Fetching {}...", reference);
    }
    let artifact = fetcher.fetch(&args.artifact, &location, &cancel).await?;

    if args.quiet {
        println!("{}", artifact.tarball.display());
    } else {
        println!("Fetched: {} ({})", artifact.reference, artifact.tarball.display());
    }

    Ok(())
}
