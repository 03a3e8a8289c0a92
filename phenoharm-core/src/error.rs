use thiserror::Error;

use phenoharm_data::DataError;
use phenoharm_linalg::LinalgError;

/// Failures in model fitting and model comparison.
#[derive(Debug, Error)]
pub enum FitError {
    #[error("column '{column}' has a missing value at row {row}; drop incomplete rows first")]
    MissingValue { column: String, row: usize },

    #[error("outcome '{0}' must be numeric")]
    NonNumericOutcome(String),

    #[error("design matrix is rank deficient (column '{0}' is constant or collinear)")]
    RankDeficient(String),

    #[error("no covariance matrices supplied")]
    NoCovarianceMatrices,

    #[error("outcome '{0}' has zero variance")]
    ZeroVariance(String),

    #[error("covariance matrix '{name}' does not match the table's samples: {source}")]
    SampleOrder {
        name: String,
        #[source]
        source: DataError,
    },

    #[error("models have different fixed effects ({null:?} vs {alt:?})")]
    IncompatibleModels { null: Vec<String>, alt: Vec<String> },

    #[error("alternative model has {alt} variance parameters, null has {null}; expected more")]
    NotNested { null: usize, alt: usize },

    #[error("likelihood-ratio statistic {0:.6} is negative; the alternative fit is worse than the null")]
    NegativeStatistic(f64),

    #[error("term '{0}' has no coefficients in the model")]
    UnknownTerm(String),

    #[error(transparent)]
    Data(#[from] DataError),

    #[error(transparent)]
    Linalg(#[from] LinalgError),
}
