//! Step 6 on saved models: LRT of the variance structures.
//!
//! phenoharm compare --null-model out/hom.phmd --alt-model out/het.phmd

use std::path::Path;

use anyhow::Result;
use clap::Args;

use phenoharm_core::compare::{
    comparison_report, likelihood_ratio_test, preferred_model, wald_test, PreferredModel,
};
use phenoharm_core::model::serialization::load_model;
use phenoharm_data::STUDY_COLUMN;

#[derive(Args)]
pub struct CompareArgs {
    /// Homoskedastic model file (.phmd)
    #[arg(long)]
    null_model: String,

    /// Heteroskedastic model file (.phmd)
    #[arg(long)]
    alt_model: String,

    /// Covariate term for the Wald test
    #[arg(long, default_value = STUDY_COLUMN)]
    wald_term: String,

    /// Significance level
    #[arg(long, default_value = "0.05")]
    alpha: f64,
}

pub fn run(args: CompareArgs) -> Result<()> {
    let null = load_model(Path::new(&args.null_model))?;
    let alt = load_model(Path::new(&args.alt_model))?;

    let lrt = likelihood_ratio_test(&null, &alt)?;
    let preferred = preferred_model(&lrt, args.alpha);
    let chosen = match preferred {
        PreferredModel::Homoskedastic => &null,
        PreferredModel::Heteroskedastic => &alt,
    };
    let wald = vec![wald_test(chosen, &args.wald_term)?];

    println!(
        "{}",
        comparison_report(&null, &alt, &lrt, &wald, args.alpha, preferred)
    );
    Ok(())
}
