//! Steps 4-7: align, fit both variance structures, compare, and attach
//! residuals.
//!
//! phenoharm fit --pheno-file combined.tsv --grm-file grm.mtx --descriptions desc.json ...

use std::path::Path;

use anyhow::Result;
use clap::Args;
use tracing::info;

use phenoharm_core::compare::PreferredModel;
use phenoharm_data::annotated::load_descriptions;
use phenoharm_data::relatedness::read_relatedness;
use phenoharm_data::IdScheme;

use crate::pipeline::{fit_and_compare, prepare, read_pheno, residual_diagnostics, ModelArgs};

#[derive(Args)]
pub struct FitArgs {
    /// Combined phenotype table (output of `harmonize`)
    #[arg(long)]
    pheno_file: String,

    /// Relatedness matrix (.mtx, .phrm or dense text)
    #[arg(long)]
    grm_file: String,

    /// JSON object with a description for every column
    #[arg(long)]
    descriptions: String,

    /// Subject identifier column
    #[arg(long, default_value = "subject_id")]
    subject_col: String,

    /// How sample IDs are built: subject, study-subject or row-number
    #[arg(long, default_value = "subject")]
    id_scheme: String,

    /// Output directory
    #[arg(long, default_value = "phenoharm_out")]
    out_dir: String,

    #[command(flatten)]
    model: ModelArgs,
}

pub fn run(args: FitArgs) -> Result<()> {
    info!("=== Fit homoskedastic and heteroskedastic models ===");
    let scheme: IdScheme = args.id_scheme.parse()?;
    let out_dir = Path::new(&args.out_dir);

    let mut combined = read_pheno(Path::new(&args.pheno_file), &args.subject_col)?;
    let grm = read_relatedness(Path::new(&args.grm_file))?;
    info!("Relatedness matrix: {} samples", grm.n_samples());
    let descriptions = load_descriptions(Path::new(&args.descriptions))?;

    let (annotated, grm) = prepare(
        &mut combined,
        &grm,
        &descriptions,
        &args.model,
        &args.subject_col,
        scheme,
    )?;
    let (hom, het, preferred) = fit_and_compare(&annotated, &grm, &args.model, out_dir)?;
    let chosen = match preferred {
        PreferredModel::Homoskedastic => &hom,
        PreferredModel::Heteroskedastic => &het,
    };
    residual_diagnostics(&mut combined, chosen, &args.model.group_col, out_dir)
}
