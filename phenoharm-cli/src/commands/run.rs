//! Steps 1-7 from a manifest: fetch, harmonize, describe, align, fit,
//! compare and residual diagnostics.
//!
//! phenoharm run --manifest inputs.json --out-dir results

use std::path::Path;

use anyhow::Result;
use clap::Args;
use tracing::info;

use phenoharm_core::compare::PreferredModel;
use phenoharm_data::manifest::Manifest;
use phenoharm_data::relatedness::read_relatedness;
use phenoharm_data::table::write_table;
use phenoharm_data::{IdScheme, SAMPLE_ID_COLUMN};

use crate::commands::fetch::fetch_manifest;
use crate::pipeline::{
    describe, fit_and_compare, load_combined, prepare, residual_diagnostics, ModelArgs,
};

#[derive(Args)]
pub struct RunArgs {
    /// JSON manifest listing study files, the relatedness matrix and
    /// column descriptions
    #[arg(long)]
    manifest: String,

    /// Output directory
    #[arg(long, default_value = "phenoharm_out")]
    out_dir: String,

    /// How sample IDs are built: subject, study-subject or row-number
    #[arg(long, default_value = "subject")]
    id_scheme: String,

    /// Sex column for the split boxplot
    #[arg(long, default_value = "sex")]
    sex_col: String,

    /// Do not download anything; every input must already exist
    #[arg(long, default_value = "false")]
    skip_fetch: bool,

    /// HTTP timeout in seconds
    #[arg(long, default_value = "300")]
    timeout_secs: u64,

    #[command(flatten)]
    model: ModelArgs,
}

pub fn run(args: RunArgs) -> Result<()> {
    let scheme: IdScheme = args.id_scheme.parse()?;
    let manifest = Manifest::load(Path::new(&args.manifest))?;
    let out_dir = Path::new(&args.out_dir);
    std::fs::create_dir_all(out_dir)?;

    if args.skip_fetch {
        info!("Skipping downloads");
    } else {
        info!("=== Step 1: fetch inputs ===");
        fetch_manifest(&manifest, args.timeout_secs)?;
    }

    info!("=== Step 2: harmonize ===");
    let mut combined = load_combined(&manifest.study_paths(), &manifest.subject_column)?;
    write_table(&combined, &out_dir.join("combined.tsv"))?;

    info!("=== Step 3: describe ===");
    describe(
        &combined,
        &args.model.outcome,
        &args.model.group_col,
        &args.sex_col,
        &[manifest.subject_column.as_str(), SAMPLE_ID_COLUMN],
        out_dir,
    )?;

    info!("=== Step 4: align to the relatedness matrix ===");
    let grm = read_relatedness(&manifest.relatedness_path())?;
    let (annotated, grm) = prepare(
        &mut combined,
        &grm,
        &manifest.column_descriptions,
        &args.model,
        &manifest.subject_column,
        scheme,
    )?;

    info!("=== Steps 5-6: fit and compare ===");
    let (hom, het, preferred) = fit_and_compare(&annotated, &grm, &args.model, out_dir)?;

    info!("=== Step 7: residual diagnostics ({} model) ===", preferred);
    let chosen = match preferred {
        PreferredModel::Homoskedastic => &hom,
        PreferredModel::Heteroskedastic => &het,
    };
    residual_diagnostics(&mut combined, chosen, &args.model.group_col, out_dir)
}
