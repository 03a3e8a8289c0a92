//! FittedModel: a fitted linear mixed model, consumed by model comparison
//! and residual diagnostics.

use serde::{Deserialize, Serialize};

use phenoharm_linalg::DenseMatrix;

use crate::lmm::design::Term;

/// One fixed-effect coefficient with its Wald test.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FixedEffect {
    pub name: String,
    pub estimate: f64,
    pub std_error: f64,
    /// (estimate / std_error)^2, chi-square with 1 df.
    pub wald_chisq: f64,
    pub p_value: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VarianceEstimate {
    /// `V_<matrix>`, `V_resid` or `V_resid.<level>`.
    pub name: String,
    pub estimate: f64,
    pub std_error: f64,
    /// Fixed at zero during estimation.
    pub at_boundary: bool,
}

/// The fitted model, serialized to `.phmd` files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FittedModel {
    /// Magic bytes for validation.
    pub magic: [u8; 4],
    /// Version number for forward compatibility.
    pub version: u32,
    pub outcome: String,
    /// Sample IDs in model order.
    pub sample_ids: Vec<String>,
    pub n_samples: usize,
    pub fixed_effects: Vec<FixedEffect>,
    /// Covariate terms and the coefficients they own.
    pub terms: Vec<Term>,
    /// Cov(beta) as flat col-major (p x p).
    pub beta_cov_flat: Vec<f64>,
    pub variance_components: Vec<VarianceEstimate>,
    /// Covariance of the variance components as flat col-major (m x m).
    pub variance_cov_flat: Vec<f64>,
    /// Outcome values (y).
    pub y: Vec<f64>,
    /// X * beta
    pub fitted: Vec<f64>,
    /// Marginal residuals y - X * beta.
    pub residuals: Vec<f64>,
    /// BLUP of each random effect, keyed by component name.
    pub blups: Vec<(String, Vec<f64>)>,
    pub reml_loglik: f64,
    pub ml_loglik: f64,
    pub iterations: usize,
    pub converged: bool,
    /// Residual variance differs by `group_var`.
    pub het_resid: bool,
    pub group_var: Option<String>,
}

impl FittedModel {
    /// Magic bytes: "PHMD" (PhenoHarm MoDel).
    pub const MAGIC: [u8; 4] = [b'P', b'H', b'M', b'D'];
    /// Current model version.
    pub const VERSION: u32 = 1;

    pub fn n_fixed_params(&self) -> usize {
        self.fixed_effects.len()
    }

    pub fn n_variance_params(&self) -> usize {
        self.variance_components.len()
    }

    pub fn beta(&self) -> Vec<f64> {
        self.fixed_effects.iter().map(|f| f.estimate).collect()
    }

    pub fn fixed_effect_names(&self) -> Vec<String> {
        self.fixed_effects.iter().map(|f| f.name.clone()).collect()
    }

    pub fn beta_cov(&self) -> DenseMatrix {
        let p = self.n_fixed_params();
        DenseMatrix::from_col_major(p, p, self.beta_cov_flat.clone())
    }

    pub fn variance_cov(&self) -> DenseMatrix {
        let m = self.n_variance_params();
        DenseMatrix::from_col_major(m, m, self.variance_cov_flat.clone())
    }

    pub fn term(&self, name: &str) -> Option<&Term> {
        self.terms.iter().find(|t| t.name == name)
    }

    pub fn variance_component(&self, name: &str) -> Option<&VarianceEstimate> {
        self.variance_components.iter().find(|v| v.name == name)
    }
}
