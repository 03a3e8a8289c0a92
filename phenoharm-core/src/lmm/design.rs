//! Fixed-effect design matrices.
//!
//! Column 0 is the intercept. Numeric covariates add one column each;
//! categorical covariates use treatment coding against their first sorted
//! level, one indicator column `<covariate><level>` per other level.

use serde::{Deserialize, Serialize};

use phenoharm_data::{ColumnData, Table};
use phenoharm_linalg::{CholeskyDecomp, DenseMatrix};

use crate::error::FitError;

pub const INTERCEPT: &str = "(Intercept)";

/// Relative pivot below which a design column counts as collinear.
const RANK_TOL: f64 = 1e-10;

/// A covariate and the design columns it contributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Term {
    pub name: String,
    pub columns: Vec<usize>,
    /// Reference level for categorical terms.
    pub reference: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Design {
    pub x: DenseMatrix,
    pub column_names: Vec<String>,
    pub terms: Vec<Term>,
}

impl Design {
    pub fn n_params(&self) -> usize {
        self.column_names.len()
    }
}

/// Build the design matrix for `covariates`.
///
/// Every covariate cell must be present and the result must have full
/// column rank.
pub fn build_design(table: &Table, covariates: &[String]) -> Result<Design, FitError> {
    let n = table.n_rows();
    let mut columns: Vec<Vec<f64>> = vec![vec![1.0; n]];
    let mut column_names = vec![INTERCEPT.to_string()];
    let mut terms = vec![Term {
        name: INTERCEPT.to_string(),
        columns: vec![0],
        reference: None,
    }];

    for name in covariates {
        let column = table.column(name)?;
        if let Some(row) = (0..n).find(|&r| column.is_missing(r)) {
            return Err(FitError::MissingValue {
                column: name.clone(),
                row: row + 1,
            });
        }
        match &column.data {
            ColumnData::Numeric(values) => {
                terms.push(Term {
                    name: name.clone(),
                    columns: vec![columns.len()],
                    reference: None,
                });
                columns.push(values.clone());
                column_names.push(name.clone());
            }
            ColumnData::Categorical(values) => {
                let levels = column.levels();
                let mut term = Term {
                    name: name.clone(),
                    columns: Vec::new(),
                    reference: levels.first().cloned(),
                };
                for level in levels.iter().skip(1) {
                    term.columns.push(columns.len());
                    columns.push(
                        values
                            .iter()
                            .map(|v| if v.as_deref() == Some(level.as_str()) { 1.0 } else { 0.0 })
                            .collect(),
                    );
                    column_names.push(format!("{}{}", name, level));
                }
                terms.push(term);
            }
        }
    }

    let p = columns.len();
    let x = DenseMatrix::from_col_major(n, p, columns.into_iter().flatten().collect());
    check_full_rank(&x, &column_names)?;
    Ok(Design {
        x,
        column_names,
        terms,
    })
}

fn check_full_rank(x: &DenseMatrix, names: &[String]) -> Result<(), FitError> {
    let xtx = x.t_mat_mul(x);
    let first_bad = |i: usize| FitError::RankDeficient(names[i].clone());
    let chol = CholeskyDecomp::new(&xtx).map_err(|e| match e {
        phenoharm_linalg::LinalgError::NotPositiveDefinite { pivot, .. } => first_bad(pivot),
        other => FitError::Linalg(other),
    })?;
    for i in 0..xtx.nrows() {
        let pivot = chol.l(i, i).powi(2);
        if pivot < RANK_TOL * xtx.get(i, i).max(1.0) {
            return Err(first_bad(i));
        }
    }
    Ok(())
}
