//! phenoharm-linalg: Linear algebra wrappers for phenoharm
//!
//! Dense and sparse matrices plus the Cholesky factorization used by the
//! REML engine to form Sigma^{-1}, log-determinants and GLS solves.

pub mod decomposition;
pub mod dense;
pub mod sparse;

pub use decomposition::{CholeskyDecomp, LinalgError};
pub use dense::DenseMatrix;
pub use sparse::SparseMatrix;
