//! Pipeline stages shared by the subcommands.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use tracing::{info, warn};

use phenoharm_core::compare::{
    comparison_report, likelihood_ratio_test, preferred_model, wald_test, PreferredModel,
};
use phenoharm_core::describe::plots::{
    boxplot_by_group, boxplot_by_group_split, ensure_plots_dir, plot_path,
};
use phenoharm_core::describe::{numeric_summaries_by, render_summaries, summary_report};
use phenoharm_core::lmm::{fit_null_model, CovarianceMatrix, RemlConfig};
use phenoharm_core::model::serialization::{model_summary, save_model, save_model_json};
use phenoharm_core::model::FittedModel;
use phenoharm_core::residuals::attach_residuals;
use phenoharm_data::sample::{align_to_matrix, attach_sample_ids, complete_cases};
use phenoharm_data::table::{read_table, write_table};
use phenoharm_data::{
    concatenate, AnnotatedTable, IdScheme, RelatednessMatrix, StudyTable, Table, SAMPLE_ID_COLUMN,
    STUDY_COLUMN,
};

/// Name of the residual column added to the combined table.
pub const RESIDUAL_COLUMN: &str = "resid";

/// Outcome, covariates and solver settings for the two model fits.
#[derive(Args, Debug, Clone)]
pub struct ModelArgs {
    /// Outcome column
    #[arg(long, default_value = "height")]
    pub outcome: String,

    /// Covariate column names (comma-separated)
    #[arg(long, default_value = "sex,age,study")]
    pub covar_cols: String,

    /// Column defining residual-variance groups in the heteroskedastic model
    #[arg(long, default_value = STUDY_COLUMN)]
    pub group_col: String,

    /// Significance level for preferring the heteroskedastic model
    #[arg(long, default_value = "0.05")]
    pub alpha: f64,

    /// Maximum AI-REML iterations
    #[arg(long, default_value = "100")]
    pub max_iter: usize,

    /// Convergence tolerance
    #[arg(long, default_value = "1e-4")]
    pub tol: f64,

    /// Also write JSON sidecars of the fitted models
    #[arg(long, default_value = "false")]
    pub save_json: bool,
}

impl ModelArgs {
    pub fn covariates(&self) -> Vec<String> {
        parse_list(&self.covar_cols)
    }

    pub fn reml_config(&self) -> RemlConfig {
        RemlConfig {
            max_iter: self.max_iter,
            tol: self.tol,
            ..RemlConfig::default()
        }
    }

    /// Outcome, covariates and group column, without repeats.
    pub fn model_columns(&self) -> Vec<String> {
        let mut cols = vec![self.outcome.clone()];
        for c in self.covariates().into_iter().chain([self.group_col.clone()]) {
            if !cols.contains(&c) {
                cols.push(c);
            }
        }
        cols
    }
}

pub fn parse_list(s: &str) -> Vec<String> {
    s.split(',')
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .collect()
}

/// Read a table keeping identifier and study columns as text.
pub fn read_pheno(path: &Path, subject_col: &str) -> Result<Table> {
    read_table(
        path,
        &[
            subject_col.to_string(),
            SAMPLE_ID_COLUMN.to_string(),
            STUDY_COLUMN.to_string(),
        ],
    )
}

/// Read every study file and stack them with a `study` column.
pub fn load_combined(studies: &[(String, PathBuf)], subject_col: &str) -> Result<Table> {
    let mut tables = Vec::with_capacity(studies.len());
    for (name, path) in studies {
        let table = read_pheno(path, subject_col)
            .with_context(|| format!("Failed to load study '{}'", name))?;
        info!("Study {}: {} rows, {} columns", name, table.n_rows(), table.n_cols());
        tables.push(StudyTable::new(name.clone(), table));
    }
    let combined = concatenate(&tables)?;
    info!(
        "Combined table: {} rows from {} studies",
        combined.n_rows(),
        tables.len()
    );
    Ok(combined)
}

/// Summary report to stdout and `summary.txt`, plus outcome boxplots.
pub fn describe(
    table: &Table,
    outcome: &str,
    group_col: &str,
    sex_col: &str,
    skip: &[&str],
    out_dir: &Path,
) -> Result<()> {
    std::fs::create_dir_all(out_dir)
        .with_context(|| format!("Failed to create {}", out_dir.display()))?;

    let report = summary_report(table, group_col, skip)?;
    println!("{}", report);
    let summary_path = out_dir.join("summary.txt");
    std::fs::write(&summary_path, &report)
        .with_context(|| format!("Failed to write {}", summary_path.display()))?;
    info!("Summary written to {}", summary_path.display());

    let plots = ensure_plots_dir(out_dir)?;
    boxplot_by_group(
        table,
        group_col,
        outcome,
        &format!("{} by {}", outcome, group_col),
        &plot_path(&plots, &format!("{}_by_{}", outcome, group_col)),
    )?;
    if table.has_column(sex_col) {
        boxplot_by_group_split(
            table,
            group_col,
            sex_col,
            outcome,
            &format!("{} by {} and {}", outcome, group_col, sex_col),
            &plot_path(&plots, &format!("{}_by_{}_{}", outcome, group_col, sex_col)),
        )?;
    } else {
        warn!("No '{}' column; skipping the split boxplot", sex_col);
    }
    Ok(())
}

/// Descriptions for the columns the pipeline itself adds.
pub fn with_default_descriptions(descriptions: &BTreeMap<String, String>) -> BTreeMap<String, String> {
    let mut out = descriptions.clone();
    out.entry(STUDY_COLUMN.to_string())
        .or_insert_with(|| "Study the subject was measured in".to_string());
    out.entry(SAMPLE_ID_COLUMN.to_string())
        .or_insert_with(|| "Identifier matching the relatedness matrix".to_string());
    out
}

/// Attach sample IDs, drop incomplete rows and put the table in matrix
/// order. The returned matrix is subset to the same samples.
pub fn prepare(
    combined: &mut Table,
    grm: &RelatednessMatrix,
    descriptions: &BTreeMap<String, String>,
    model: &ModelArgs,
    subject_col: &str,
    scheme: IdScheme,
) -> Result<(AnnotatedTable, RelatednessMatrix)> {
    if combined.has_column(SAMPLE_ID_COLUMN) {
        info!("Using the existing '{}' column", SAMPLE_ID_COLUMN);
    } else {
        attach_sample_ids(combined, subject_col, scheme)?;
        info!("Sample IDs derived with scheme '{}'", scheme);
    }

    let columns = model.model_columns();
    let column_refs: Vec<&str> = columns.iter().map(String::as_str).collect();
    let (complete, _) = complete_cases(combined, &column_refs)?;
    let aligned = align_to_matrix(&complete, SAMPLE_ID_COLUMN, grm)?;
    info!(
        "Aligned {} samples to the relatedness matrix",
        aligned.matrix.n_samples()
    );
    let annotated = AnnotatedTable::new(
        aligned.table,
        &with_default_descriptions(descriptions),
        SAMPLE_ID_COLUMN,
    )?;
    Ok((annotated, aligned.matrix))
}

/// Fit both variance structures, save them and write the comparison.
/// Returns (homoskedastic, heteroskedastic, preferred).
pub fn fit_and_compare(
    annotated: &AnnotatedTable,
    grm: &RelatednessMatrix,
    model: &ModelArgs,
    out_dir: &Path,
) -> Result<(FittedModel, FittedModel, PreferredModel)> {
    std::fs::create_dir_all(out_dir)
        .with_context(|| format!("Failed to create {}", out_dir.display()))?;
    let covariates = model.covariates();
    let config = model.reml_config();
    let covs = [CovarianceMatrix {
        name: "grm",
        matrix: grm,
    }];

    info!("Fitting homoskedastic model...");
    let hom = fit_null_model(annotated, &model.outcome, &covariates, &covs, None, &config)?;
    info!("Fitting heteroskedastic model (residual variance by '{}')...", model.group_col);
    let het = fit_null_model(
        annotated,
        &model.outcome,
        &covariates,
        &covs,
        Some(&model.group_col),
        &config,
    )?;

    for (name, fitted) in [("hom", &hom), ("het", &het)] {
        let path = out_dir.join(format!("{}.phmd", name));
        save_model(fitted, &path)?;
        info!("Model saved to {}", path.display());
        if model.save_json {
            save_model_json(fitted, &path.with_extension("phmd.json"))?;
        }
        println!("{}", model_summary(fitted));
    }

    let lrt = likelihood_ratio_test(&hom, &het)?;
    let preferred = preferred_model(&lrt, model.alpha);
    let chosen = match preferred {
        PreferredModel::Homoskedastic => &hom,
        PreferredModel::Heteroskedastic => &het,
    };
    let wald = if chosen.term(&model.group_col).is_some() {
        vec![wald_test(chosen, &model.group_col)?]
    } else {
        Vec::new()
    };

    let report = comparison_report(&hom, &het, &lrt, &wald, model.alpha, preferred);
    println!("{}", report);
    let report_path = out_dir.join("comparison.txt");
    std::fs::write(&report_path, &report)
        .with_context(|| format!("Failed to write {}", report_path.display()))?;
    info!("Comparison written to {}", report_path.display());

    Ok((hom, het, preferred))
}

/// Attach the chosen model's residuals to the combined table, summarise
/// and plot them by group, and write the table.
pub fn residual_diagnostics(
    combined: &mut Table,
    chosen: &FittedModel,
    group_col: &str,
    out_dir: &Path,
) -> Result<()> {
    let matched = attach_residuals(combined, SAMPLE_ID_COLUMN, chosen, RESIDUAL_COLUMN)?;
    if matched < combined.n_rows() {
        info!(
            "{} rows were not modelled and have no residual",
            combined.n_rows() - matched
        );
    }

    let summaries = render_summaries(
        &format!("{} by {}", RESIDUAL_COLUMN, group_col),
        group_col,
        &numeric_summaries_by(combined, group_col, RESIDUAL_COLUMN)?,
    );
    println!("{}", summaries);
    let summary_path = out_dir.join("residuals.txt");
    std::fs::write(&summary_path, &summaries)
        .with_context(|| format!("Failed to write {}", summary_path.display()))?;

    let plots = ensure_plots_dir(out_dir)?;
    boxplot_by_group(
        combined,
        group_col,
        RESIDUAL_COLUMN,
        &format!("Marginal residuals by {}", group_col),
        &plot_path(&plots, &format!("residuals_by_{}", group_col)),
    )?;

    let table_path = out_dir.join("combined_with_residuals.tsv");
    write_table(combined, &table_path)?;
    info!("Table with residuals written to {}", table_path.display());
    Ok(())
}
