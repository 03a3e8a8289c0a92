//! Descriptive diagnostics of the combined table.
//!
//! Counts and numeric summaries per study, and boxplots of the outcome
//! (and later the model residuals) by study.

pub mod plots;
pub mod summary;

pub use summary::{
    category_counts, numeric_summaries_by, numeric_summary, render_counts, render_summaries,
    summary_report, CategoryCounts, NumericSummary,
};
