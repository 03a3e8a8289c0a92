//! Comparison of the homoskedastic and heteroskedastic fits.

pub mod lrt;
pub mod report;
pub mod wald;

pub use lrt::{likelihood_ratio_test, preferred_model, LrtResult, PreferredModel};
pub use report::comparison_report;
pub use wald::{wald_test, WaldResult};
