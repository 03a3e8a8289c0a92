#![allow(clippy::needless_range_loop)]
//! Cholesky factorization of symmetric positive definite matrices.
//!
//! The mixed-model engine needs Sigma^{-1}, log|Sigma| and solves against
//! X'Sigma^{-1}X at every iteration, so the factor is stored as a packed
//! row-major lower triangle and multi-column solves run on the rayon pool.

use rayon::prelude::*;
use thiserror::Error;

use crate::dense::DenseMatrix;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LinalgError {
    #[error("matrix is not positive definite (pivot {pivot} = {value:.3e})")]
    NotPositiveDefinite { pivot: usize, value: f64 },

    #[error("matrix is not square: {nrows} x {ncols}")]
    NotSquare { nrows: usize, ncols: usize },

    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
}

/// Lower-triangular factor L with A = L * L'.
#[derive(Debug, Clone)]
pub struct CholeskyDecomp {
    n: usize,
    /// Row-major n x n storage; only the lower triangle is meaningful.
    l: Vec<f64>,
}

impl CholeskyDecomp {
    /// Factor a symmetric positive definite matrix. Only the lower triangle
    /// of `a` is read.
    pub fn new(a: &DenseMatrix) -> Result<Self, LinalgError> {
        if !a.is_square() {
            return Err(LinalgError::NotSquare {
                nrows: a.nrows(),
                ncols: a.ncols(),
            });
        }
        let n = a.nrows();
        let mut l = vec![0.0; n * n];

        for j in 0..n {
            let row_j = j * n;
            let mut sum = 0.0;
            for k in 0..j {
                sum += l[row_j + k] * l[row_j + k];
            }
            let diag = a.get(j, j) - sum;
            if diag <= 0.0 || !diag.is_finite() {
                return Err(LinalgError::NotPositiveDefinite {
                    pivot: j,
                    value: diag,
                });
            }
            let ljj = diag.sqrt();
            l[row_j + j] = ljj;

            for i in (j + 1)..n {
                let row_i = i * n;
                let mut sum = 0.0;
                for k in 0..j {
                    sum += l[row_i + k] * l[row_j + k];
                }
                l[row_i + j] = (a.get(i, j) - sum) / ljj;
            }
        }

        Ok(CholeskyDecomp { n, l })
    }

    pub fn dim(&self) -> usize {
        self.n
    }

    /// L[i, j] for i >= j.
    pub fn l(&self, i: usize, j: usize) -> f64 {
        if j > i {
            0.0
        } else {
            self.l[i * self.n + j]
        }
    }

    /// Solve L * L' * x = b.
    pub fn solve(&self, b: &[f64]) -> Vec<f64> {
        let n = self.n;
        assert_eq!(b.len(), n);

        // L * y = b
        let mut y = vec![0.0; n];
        for i in 0..n {
            let row = &self.l[i * n..i * n + i];
            let mut sum = 0.0;
            for (lij, yj) in row.iter().zip(y.iter()) {
                sum += lij * yj;
            }
            y[i] = (b[i] - sum) / self.l[i * n + i];
        }

        // L' * x = y, column-oriented so that row i of L is read contiguously
        for i in (0..n).rev() {
            let xi = y[i] / self.l[i * n + i];
            y[i] = xi;
            let row = &self.l[i * n..i * n + i];
            for (yk, lik) in y[..i].iter_mut().zip(row.iter()) {
                *yk -= lik * xi;
            }
        }
        y
    }

    /// Solve A * X = B column by column.
    pub fn solve_mat(&self, b: &DenseMatrix) -> DenseMatrix {
        assert_eq!(b.nrows(), self.n);
        let cols: Vec<Vec<f64>> = (0..b.ncols())
            .into_par_iter()
            .map(|j| self.solve(&b.col(j)))
            .collect();
        let mut out = DenseMatrix::zeros(self.n, b.ncols());
        for (j, c) in cols.iter().enumerate() {
            out.set_col(j, c);
        }
        out
    }

    /// A^{-1}, symmetrized.
    pub fn inverse(&self) -> DenseMatrix {
        let n = self.n;
        let cols: Vec<Vec<f64>> = (0..n)
            .into_par_iter()
            .map(|j| {
                let mut e = vec![0.0; n];
                e[j] = 1.0;
                self.solve(&e)
            })
            .collect();
        DenseMatrix::from_fn(n, n, |i, j| 0.5 * (cols[j][i] + cols[i][j]))
    }

    /// log|A| = 2 * sum(log L_ii)
    pub fn log_det(&self) -> f64 {
        2.0 * (0..self.n).map(|i| self.l[i * self.n + i].ln()).sum::<f64>()
    }
}

/// Solve a symmetric positive definite system A*x = b using Cholesky.
pub fn solve_spd(a: &DenseMatrix, b: &[f64]) -> Result<Vec<f64>, LinalgError> {
    if a.nrows() != b.len() {
        return Err(LinalgError::DimensionMismatch {
            expected: a.nrows(),
            got: b.len(),
        });
    }
    Ok(CholeskyDecomp::new(a)?.solve(b))
}

/// Inverse of a symmetric positive definite matrix.
pub fn inverse_spd(a: &DenseMatrix) -> Result<DenseMatrix, LinalgError> {
    Ok(CholeskyDecomp::new(a)?.inverse())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spd3() -> DenseMatrix {
        DenseMatrix::from_row_major(3, 3, &[4.0, 2.0, 1.0, 2.0, 5.0, 3.0, 1.0, 3.0, 6.0])
    }

    #[test]
    fn test_cholesky_factor() {
        let a = DenseMatrix::from_row_major(2, 2, &[4.0, 2.0, 2.0, 3.0]);
        let chol = CholeskyDecomp::new(&a).unwrap();
        assert!((chol.l(0, 0) - 2.0).abs() < 1e-12);
        assert!((chol.l(1, 0) - 1.0).abs() < 1e-12);
        assert!((chol.l(1, 1) - 2.0f64.sqrt()).abs() < 1e-12);
        assert_eq!(chol.l(0, 1), 0.0);
    }

    #[test]
    fn test_cholesky_solve() {
        let a = spd3();
        let b = vec![1.0, 2.0, 3.0];
        let x = CholeskyDecomp::new(&a).unwrap().solve(&b);
        let ax = a.mat_vec(&x);
        for i in 0..3 {
            assert!((ax[i] - b[i]).abs() < 1e-10, "ax[{}]={} b={}", i, ax[i], b[i]);
        }
    }

    #[test]
    fn test_cholesky_not_pd() {
        let a = DenseMatrix::from_row_major(2, 2, &[1.0, 3.0, 3.0, 1.0]);
        match CholeskyDecomp::new(&a) {
            Err(LinalgError::NotPositiveDefinite { pivot, .. }) => assert_eq!(pivot, 1),
            other => panic!("expected NotPositiveDefinite, got {:?}", other),
        }
    }

    #[test]
    fn test_cholesky_not_square() {
        assert!(matches!(
            CholeskyDecomp::new(&DenseMatrix::zeros(2, 3)),
            Err(LinalgError::NotSquare { .. })
        ));
    }

    #[test]
    fn test_inverse_spd() {
        let a = spd3();
        let inv = inverse_spd(&a).unwrap();
        let prod = a.mat_mul(&inv);
        for i in 0..3 {
            for j in 0..3 {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert!((prod.get(i, j) - expected).abs() < 1e-10);
            }
        }
        assert!(inv.is_symmetric(1e-14));
    }

    #[test]
    fn test_solve_mat() {
        let a = spd3();
        let b = DenseMatrix::from_row_major(3, 2, &[1.0, 0.0, 0.0, 1.0, 2.0, 1.0]);
        let x = CholeskyDecomp::new(&a).unwrap().solve_mat(&b);
        let ax = a.mat_mul(&x);
        for i in 0..3 {
            for j in 0..2 {
                assert!((ax.get(i, j) - b.get(i, j)).abs() < 1e-10);
            }
        }
    }

    #[test]
    fn test_log_det() {
        // det = 4*3 - 2*2 = 8
        let a = DenseMatrix::from_row_major(2, 2, &[4.0, 2.0, 2.0, 3.0]);
        let chol = CholeskyDecomp::new(&a).unwrap();
        assert!((chol.log_det() - 8.0f64.ln()).abs() < 1e-12);
    }

    #[test]
    fn test_solve_spd_dimension_mismatch() {
        let err = solve_spd(&spd3(), &[1.0, 2.0]).unwrap_err();
        assert_eq!(err, LinalgError::DimensionMismatch { expected: 3, got: 2 });
    }
}
