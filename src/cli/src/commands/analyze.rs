//! `mfe-bundle analyze` command.

use std::path::PathBuf;

use clap::Args;
use mfe_bundle_core::{ModulePolicy, PipelineConfig};

#[derive(Args)]
pub struct AnalyzeArgs {
    /// Extracted bundle directory
    pub directory: PathBuf,

    /// Report each (name, version, entry) once
    #[arg(long)]
    pub dedup: bool,

    /// Also write the modules to this manifest file
    #[arg(long)]
    pub manifest: Option<PathBuf>,
}

pub async fn execute(
    args: AnalyzeArgs,
    config: PipelineConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let policy = if args.dedup {
        ModulePolicy::Deduplicated
    } else {
        config.module_policy
    };

    let modules = mfe_bundle_runtime::analyze_with_policy(&args.directory, policy)?;
    println!("{}", serde_json::to_string_pretty(&modules)?);

    if let Some(path) = &args.manifest {
        mfe_bundle_runtime::write_manifest(path, &modules)?;
    }

    Ok(())
}
