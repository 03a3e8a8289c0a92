//! Step 1: download the inputs listed in a manifest.
//!
//! phenoharm fetch --manifest inputs.json

use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use clap::Args;
use tracing::info;

use phenoharm_data::fetch::{FetchOutcome, Fetcher};
use phenoharm_data::manifest::Manifest;

#[derive(Args)]
pub struct FetchArgs {
    /// JSON manifest listing study files and the relatedness matrix
    #[arg(long)]
    manifest: String,

    /// HTTP timeout in seconds
    #[arg(long, default_value = "300")]
    timeout_secs: u64,
}

pub fn run(args: FetchArgs) -> Result<()> {
    info!("=== Fetch inputs ===");
    let manifest = Manifest::load(Path::new(&args.manifest))?;
    fetch_manifest(&manifest, args.timeout_secs)
}

/// Fetch everything in `manifest` that is not already on disk.
pub fn fetch_manifest(manifest: &Manifest, timeout_secs: u64) -> Result<()> {
    let fetcher = Fetcher::new(Duration::from_secs(timeout_secs))?;
    for (path, outcome) in fetcher.fetch_all(manifest)? {
        match outcome {
            FetchOutcome::AlreadyPresent => println!("present     {}", path.display()),
            FetchOutcome::Downloaded { bytes } => {
                println!("downloaded  {} ({} bytes)", path.display(), bytes)
            }
        }
    }
    Ok(())
}
