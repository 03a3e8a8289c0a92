//! Step 2: check and concatenate the study tables.
//!
//! phenoharm harmonize --manifest inputs.json --output combined.tsv

use std::path::Path;

use anyhow::Result;
use clap::Args;
use tracing::info;

use phenoharm_data::manifest::Manifest;
use phenoharm_data::table::write_table;

use crate::pipeline::load_combined;

#[derive(Args)]
pub struct HarmonizeArgs {
    /// JSON manifest listing study files
    #[arg(long)]
    manifest: String,

    /// Output path of the combined table (tab-delimited)
    #[arg(long, default_value = "combined.tsv")]
    output: String,
}

pub fn run(args: HarmonizeArgs) -> Result<()> {
    info!("=== Harmonize study tables ===");
    let manifest = Manifest::load(Path::new(&args.manifest))?;
    let combined = load_combined(&manifest.study_paths(), &manifest.subject_column)?;

    let output = Path::new(&args.output);
    write_table(&combined, output)?;
    info!("Combined table written to {}", output.display());
    println!(
        "{} rows, columns: {}",
        combined.n_rows(),
        combined.column_names().join(", ")
    );
    Ok(())
}
