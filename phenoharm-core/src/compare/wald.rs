//! Joint Wald test on the coefficients of one covariate term.

use serde::{Deserialize, Serialize};

use phenoharm_linalg::decomposition::solve_spd;
use phenoharm_linalg::DenseMatrix;

use crate::error::FitError;
use crate::model::FittedModel;
use crate::util::math::chi2_sf;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WaldResult {
    pub term: String,
    pub coefficients: Vec<String>,
    /// b' V^{-1} b
    pub statistic: f64,
    pub df: usize,
    pub p_value: f64,
}

/// Test that every coefficient of `term` is zero. For a categorical term
/// such as `study` this tests equality of adjusted group means.
pub fn wald_test(model: &FittedModel, term: &str) -> Result<WaldResult, FitError> {
    let t = model
        .term(term)
        .filter(|t| !t.columns.is_empty())
        .ok_or_else(|| FitError::UnknownTerm(term.to_string()))?;

    let beta = model.beta();
    let b: Vec<f64> = t.columns.iter().map(|&j| beta[j]).collect();
    let v = model.beta_cov().select(&t.columns);
    let statistic = DenseMatrix::dot(&b, &solve_spd(&v, &b)?);
    let df = t.columns.len();

    Ok(WaldResult {
        term: term.to_string(),
        coefficients: t
            .columns
            .iter()
            .map(|&j| model.fixed_effects[j].name.clone())
            .collect(),
        statistic,
        df,
        p_value: chi2_sf(statistic, df as f64),
    })
}
