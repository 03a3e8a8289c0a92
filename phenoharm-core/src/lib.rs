//! phenoharm-core: statistics for phenotype harmonization diagnostics
//!
//! Descriptive summaries and boxplots, linear mixed models fitted by
//! AI-REML with optional per-group residual variances, likelihood-ratio
//! and Wald comparisons, residual diagnostics, and model serialization.

pub mod compare;
pub mod describe;
pub mod error;
pub mod lmm;
pub mod model;
pub mod residuals;
pub mod util;

pub use error::FitError;
