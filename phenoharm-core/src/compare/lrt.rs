//! Likelihood-ratio test between nested variance structures.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::FitError;
use crate::model::FittedModel;
use crate::util::math::chi2_sf;

/// Statistics within this relative distance below zero are treated as
/// optimizer noise.
const NEGATIVE_STAT_TOL: f64 = 1e-6;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LrtResult {
    pub null_loglik: f64,
    pub alt_loglik: f64,
    /// 2 * (alt - null), never negative.
    pub statistic: f64,
    pub df: usize,
    pub p_value: f64,
}

/// Which model the comparison favours.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PreferredModel {
    Homoskedastic,
    Heteroskedastic,
}

impl std::fmt::Display for PreferredModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PreferredModel::Homoskedastic => write!(f, "homoskedastic"),
            PreferredModel::Heteroskedastic => write!(f, "heteroskedastic"),
        }
    }
}

/// Compare REML log-likelihoods of two models with identical fixed effects.
///
/// `alt` must have more variance parameters than `null`.
pub fn likelihood_ratio_test(null: &FittedModel, alt: &FittedModel) -> Result<LrtResult, FitError> {
    let null_fe = null.fixed_effect_names();
    let alt_fe = alt.fixed_effect_names();
    if null_fe != alt_fe || null.sample_ids != alt.sample_ids {
        return Err(FitError::IncompatibleModels {
            null: null_fe,
            alt: alt_fe,
        });
    }
    let (k0, k1) = (null.n_variance_params(), alt.n_variance_params());
    if k1 <= k0 {
        return Err(FitError::NotNested { null: k0, alt: k1 });
    }

    let mut statistic = 2.0 * (alt.reml_loglik - null.reml_loglik);
    if statistic < 0.0 {
        let scale = null.reml_loglik.abs().max(alt.reml_loglik.abs()).max(1.0);
        if statistic >= -NEGATIVE_STAT_TOL * scale {
            warn!(
                "Likelihood-ratio statistic {:.3e} is slightly negative; clamping to zero",
                statistic
            );
            statistic = 0.0;
        } else {
            return Err(FitError::NegativeStatistic(statistic));
        }
    }

    let df = k1 - k0;
    Ok(LrtResult {
        null_loglik: null.reml_loglik,
        alt_loglik: alt.reml_loglik,
        statistic,
        df,
        p_value: chi2_sf(statistic, df as f64),
    })
}

/// Heteroskedastic when the LRT rejects at `alpha`.
pub fn preferred_model(lrt: &LrtResult, alpha: f64) -> PreferredModel {
    if lrt.p_value < alpha {
        PreferredModel::Heteroskedastic
    } else {
        PreferredModel::Homoskedastic
    }
}
