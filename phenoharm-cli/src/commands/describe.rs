//! Step 3: descriptive summaries and boxplots of a combined table.
//!
//! phenoharm describe --pheno-file combined.tsv --out-dir results

use std::path::Path;

use anyhow::Result;
use clap::Args;
use tracing::info;

use phenoharm_data::{SAMPLE_ID_COLUMN, STUDY_COLUMN};

use crate::pipeline::{describe, read_pheno};

#[derive(Args)]
pub struct DescribeArgs {
    /// Combined phenotype table
    #[arg(long)]
    pheno_file: String,

    /// Outcome column to plot
    #[arg(long, default_value = "height")]
    outcome: String,

    /// Grouping column
    #[arg(long, default_value = STUDY_COLUMN)]
    group_col: String,

    /// Sex column for the split boxplot
    #[arg(long, default_value = "sex")]
    sex_col: String,

    /// Subject identifier column (left out of the summaries)
    #[arg(long, default_value = "subject_id")]
    subject_col: String,

    /// Output directory
    #[arg(long, default_value = "phenoharm_out")]
    out_dir: String,
}

pub fn run(args: DescribeArgs) -> Result<()> {
    info!("=== Describe combined table ===");
    let table = read_pheno(Path::new(&args.pheno_file), &args.subject_col)?;
    describe(
        &table,
        &args.outcome,
        &args.group_col,
        &args.sex_col,
        &[args.subject_col.as_str(), SAMPLE_ID_COLUMN],
        Path::new(&args.out_dir),
    )
}
