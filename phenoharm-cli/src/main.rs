//! phenoharm: diagnostics for harmonizing a phenotype across studies.
//!
//! CLI entry point using clap for argument parsing.

mod commands;
mod pipeline;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "phenoharm",
    version,
    about = "Multi-study phenotype harmonization diagnostics",
    long_about = "Combines per-study phenotype tables, summarises them by study, and fits\n\
                   linear mixed models with shared or per-study residual variance against\n\
                   a relatedness matrix to decide whether the studies can be pooled."
)]
struct Cli {
    /// Number of threads to use
    #[arg(long, default_value = "1", global = true)]
    threads: usize,

    /// Verbosity level (can be repeated: -v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download missing inputs listed in a manifest
    Fetch(commands::fetch::FetchArgs),

    /// Check study tables and concatenate them with a study column
    Harmonize(commands::harmonize::HarmonizeArgs),

    /// Per-study summaries and boxplots of a combined table
    Describe(commands::describe::DescribeArgs),

    /// Fit homoskedastic and heteroskedastic mixed models and compare them
    Fit(commands::fit::FitArgs),

    /// Likelihood-ratio test between two saved models
    Compare(commands::compare::CompareArgs),

    /// Convert a relatedness matrix to another on-disk format
    PackGrm(commands::pack_grm::PackGrmArgs),

    /// Run every step from a manifest
    Run(commands::run::RunArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    rayon::ThreadPoolBuilder::new()
        .num_threads(cli.threads)
        .build_global()
        .ok();

    tracing::info!("phenoharm v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Using {} threads", cli.threads);

    match cli.command {
        Commands::Fetch(args) => commands::fetch::run(args),
        Commands::Harmonize(args) => commands::harmonize::run(args),
        Commands::Describe(args) => commands::describe::run(args),
        Commands::Fit(args) => commands::fit::run(args),
        Commands::Compare(args) => commands::compare::run(args),
        Commands::PackGrm(args) => commands::pack_grm::run(args),
        Commands::Run(args) => commands::run::run(args),
    }
}
