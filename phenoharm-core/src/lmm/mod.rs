//! Linear mixed model fitting.
//!
//! [`fit_null_model`] takes an annotated table already aligned to its
//! covariance matrices, builds the design and variance components, runs
//! AI-REML and packages a [`FittedModel`].

pub mod design;
pub mod reml;

use tracing::info;

use phenoharm_data::sample::check_alignment;
use phenoharm_data::{AnnotatedTable, RelatednessMatrix};

use crate::error::FitError;
use crate::model::fitted::{FittedModel, FixedEffect, VarianceEstimate};
use crate::util::math::chi2_sf;

pub use design::{build_design, Design, Term};
pub use reml::{fit_reml, ComponentMatrix, RemlConfig, RemlFit, VarianceComponent};

/// Name of the shared residual component; per-group ones append `.<level>`.
pub const RESID_COMPONENT: &str = "V_resid";

/// A named covariance matrix for a random effect.
#[derive(Debug, Clone, Copy)]
pub struct CovarianceMatrix<'a> {
    pub name: &'a str,
    pub matrix: &'a RelatednessMatrix,
}

/// Fit y = X*beta + sum_k u_k + e with u_k ~ N(0, sigma_k * K_k).
///
/// Residual variance is shared, or one per level of `group_var`. The table
/// rows must already be in each matrix's sample order and have no missing
/// values in the model columns.
pub fn fit_null_model(
    annotated: &AnnotatedTable,
    outcome: &str,
    covariates: &[String],
    covariance_matrices: &[CovarianceMatrix<'_>],
    group_var: Option<&str>,
    config: &RemlConfig,
) -> Result<FittedModel, FitError> {
    if covariance_matrices.is_empty() {
        return Err(FitError::NoCovarianceMatrices);
    }
    let table = annotated.table();
    let sample_ids = annotated.sample_ids()?;
    for cov in covariance_matrices {
        check_alignment(&sample_ids, cov.matrix.sample_ids()).map_err(|source| {
            FitError::SampleOrder {
                name: cov.name.to_string(),
                source,
            }
        })?;
    }

    let y = outcome_values(table, outcome)?;
    let design = build_design(table, covariates)?;
    let n = y.len();

    let mut components: Vec<VarianceComponent> = covariance_matrices
        .iter()
        .map(|cov| VarianceComponent {
            name: format!("V_{}", cov.name),
            matrix: ComponentMatrix::Dense(cov.matrix.matrix().clone()),
        })
        .collect();
    components.extend(residual_components(table, group_var, n)?);

    info!(
        "Fitting {} model: outcome '{}', {} fixed effects, {} variance components",
        if group_var.is_some() { "heteroskedastic" } else { "homoskedastic" },
        outcome,
        design.n_params(),
        components.len()
    );

    let fit = fit_reml(&y, &design.x, &components, config)?;
    Ok(assemble(outcome, sample_ids, y, &design, &components, fit, group_var))
}

fn outcome_values(table: &phenoharm_data::Table, outcome: &str) -> Result<Vec<f64>, FitError> {
    let values = table
        .numeric(outcome)
        .map_err(|_| FitError::NonNumericOutcome(outcome.to_string()))?;
    if let Some(row) = values.iter().position(|v| v.is_nan()) {
        return Err(FitError::MissingValue {
            column: outcome.to_string(),
            row: row + 1,
        });
    }
    let var = crate::util::math::sample_variance(values);
    if var.is_nan() || var <= 0.0 {
        return Err(FitError::ZeroVariance(outcome.to_string()));
    }
    Ok(values.to_vec())
}

/// One identity component, or one diagonal indicator per group level.
fn residual_components(
    table: &phenoharm_data::Table,
    group_var: Option<&str>,
    n: usize,
) -> Result<Vec<VarianceComponent>, FitError> {
    let Some(group) = group_var else {
        return Ok(vec![VarianceComponent {
            name: RESID_COMPONENT.to_string(),
            matrix: ComponentMatrix::Diagonal(vec![1.0; n]),
        }]);
    };

    let column = table.column(group)?.to_categorical();
    if let Some(row) = (0..n).find(|&r| column.is_missing(r)) {
        return Err(FitError::MissingValue {
            column: group.to_string(),
            row: row + 1,
        });
    }
    let values: Vec<String> = (0..n).map(|r| column.display_value(r)).collect();
    Ok(column
        .levels()
        .into_iter()
        .map(|level| VarianceComponent {
            name: format!("{}.{}", RESID_COMPONENT, level),
            matrix: ComponentMatrix::Diagonal(
                values.iter().map(|v| if *v == level { 1.0 } else { 0.0 }).collect(),
            ),
        })
        .collect())
}

fn assemble(
    outcome: &str,
    sample_ids: Vec<String>,
    y: Vec<f64>,
    design: &Design,
    components: &[VarianceComponent],
    fit: RemlFit,
    group_var: Option<&str>,
) -> FittedModel {
    let fixed_effects = design
        .column_names
        .iter()
        .enumerate()
        .map(|(j, name)| {
            let estimate = fit.beta[j];
            let std_error = fit.beta_cov.get(j, j).sqrt();
            let wald_chisq = (estimate / std_error).powi(2);
            FixedEffect {
                name: name.clone(),
                estimate,
                std_error,
                wald_chisq,
                p_value: chi2_sf(wald_chisq, 1.0),
            }
        })
        .collect();

    let variance_components = components
        .iter()
        .enumerate()
        .map(|(k, comp)| VarianceEstimate {
            name: comp.name.clone(),
            estimate: fit.sigma[k],
            std_error: fit.sigma_cov.get(k, k).sqrt(),
            at_boundary: fit.at_boundary[k],
        })
        .collect();

    // BLUP_k = sigma_k * K_k * Sigma^{-1} (y - X*beta) = sigma_k * K_k * P*y
    let blups = components
        .iter()
        .zip(&fit.sigma)
        .filter(|(comp, _)| matches!(comp.matrix, ComponentMatrix::Dense(_)))
        .map(|(comp, &s)| {
            let kpy = comp.matrix.mul_vec(&fit.py);
            (comp.name.clone(), kpy.into_iter().map(|v| s * v).collect())
        })
        .collect();

    let fitted = design.x.mat_vec(&fit.beta);
    let residuals: Vec<f64> = y.iter().zip(&fitted).map(|(a, b)| a - b).collect();

    FittedModel {
        magic: FittedModel::MAGIC,
        version: FittedModel::VERSION,
        outcome: outcome.to_string(),
        n_samples: sample_ids.len(),
        sample_ids,
        fixed_effects,
        terms: design.terms.clone(),
        beta_cov_flat: fit.beta_cov.to_col_major(),
        variance_components,
        variance_cov_flat: fit.sigma_cov.to_col_major(),
        y,
        fitted,
        residuals,
        blups,
        reml_loglik: fit.reml_loglik,
        ml_loglik: fit.ml_loglik,
        iterations: fit.iterations,
        converged: fit.converged,
        het_resid: group_var.is_some(),
        group_var: group_var.map(str::to_string),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use phenoharm_data::{Column, Table};
    use phenoharm_linalg::DenseMatrix;

    fn annotated(ids: &[&str], heights: Vec<f64>, groups: &[&str]) -> AnnotatedTable {
        let table = Table::from_columns(vec![
            Column::categorical("sample.id", ids.iter().map(|s| Some(s.to_string())).collect()),
            Column::numeric("height", heights),
            Column::categorical("study", groups.iter().map(|s| Some(s.to_string())).collect()),
        ])
        .unwrap();
        let desc: BTreeMap<String, String> = ["sample.id", "height", "study"]
            .iter()
            .map(|c| (c.to_string(), c.to_string()))
            .collect();
        AnnotatedTable::new(table, &desc, "sample.id").unwrap()
    }

    #[test]
    fn test_rejects_order_mismatch() {
        let table = annotated(&["a", "b", "c"], vec![1.0, 2.0, 4.0], &["x", "x", "y"]);
        let ids = vec!["b".to_string(), "a".to_string(), "c".to_string()];
        let grm = RelatednessMatrix::new(ids, DenseMatrix::identity(3)).unwrap();
        let err = fit_null_model(
            &table,
            "height",
            &[],
            &[CovarianceMatrix { name: "grm", matrix: &grm }],
            None,
            &RemlConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, FitError::SampleOrder { .. }));
    }

    #[test]
    fn test_component_names_and_flags() {
        let n = 40;
        let ids: Vec<String> = (0..n).map(|i| format!("s{}", i)).collect();
        let id_refs: Vec<&str> = ids.iter().map(String::as_str).collect();
        let groups: Vec<&str> = (0..n).map(|i| if i % 2 == 0 { "g1" } else { "g2" }).collect();
        let heights: Vec<f64> = (0..n).map(|i| 150.0 + ((i * 7) % 11) as f64).collect();
        let table = annotated(&id_refs, heights, &groups);
        let k = DenseMatrix::from_fn(n, n, |i, j| {
            if i == j {
                1.0
            } else if i / 2 == j / 2 {
                0.5
            } else {
                0.0
            }
        });
        let grm = RelatednessMatrix::new(ids.clone(), k).unwrap();
        let covs = [CovarianceMatrix { name: "grm", matrix: &grm }];

        let hom = fit_null_model(&table, "height", &[], &covs, None, &RemlConfig::default()).unwrap();
        let names: Vec<_> = hom.variance_components.iter().map(|v| v.name.as_str()).collect();
        assert_eq!(names, vec!["V_grm", "V_resid"]);
        assert!(!hom.het_resid);
        assert_eq!(hom.blups.len(), 1);
        assert_eq!(hom.residuals.len(), n);

        let het = fit_null_model(
            &table,
            "height",
            &["study".to_string()],
            &covs,
            Some("study"),
            &RemlConfig::default(),
        )
        .unwrap();
        let names: Vec<_> = het.variance_components.iter().map(|v| v.name.as_str()).collect();
        assert_eq!(names, vec!["V_grm", "V_resid.g1", "V_resid.g2"]);
        assert!(het.het_resid);
        assert_eq!(het.fixed_effect_names(), vec!["(Intercept)", "studyg2"]);
        assert!(het.reml_loglik.is_finite());
    }

    #[test]
    fn test_missing_outcome_is_an_error() {
        let table = annotated(&["a", "b", "c"], vec![1.0, f64::NAN, 4.0], &["x", "x", "y"]);
        let ids = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let grm = RelatednessMatrix::new(ids, DenseMatrix::identity(3)).unwrap();
        let err = fit_null_model(
            &table,
            "height",
            &[],
            &[CovarianceMatrix { name: "grm", matrix: &grm }],
            None,
            &RemlConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, FitError::MissingValue { row: 2, .. }));
    }
}
