//! Fitted-model type and its on-disk formats.

pub mod fitted;
pub mod serialization;

pub use fitted::{FittedModel, FixedEffect, VarianceEstimate};
