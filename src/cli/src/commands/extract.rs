//! `mfe-bundle extract` command.

use std::path::PathBuf;

use clap::Args;
use tokio_util::sync::CancellationToken;

#[derive(Args)]
pub struct ExtractArgs {
    /// Bundle tarball (tar+gzip)
    pub tarball: PathBuf,

    /// Destination directory
    pub destination: PathBuf,
}

pub async fn execute(
    args: ExtractArgs,
    cancel: CancellationToken,
) -> Result<(), Box<dyn std::error::Error>> {
    let bundle = mfe_bundle_runtime::extract(&args.tarball, &args.destination, &cancel).await?;

    println!(
        "Extracted {} files to {}",
        bundle.files.len(),
        bundle.root.display()
    );
    for skipped in &bundle.skipped {
        println!("  skipped {} ({})", skipped.name, skipped.entry_type);
    }

    Ok(())
}
