#![allow(clippy::needless_range_loop)]
//! Dense matrix operations backed by faer.
//!
//! Wraps faer's column-major `Mat<f64>` with the handful of operations the
//! mixed-model engine needs: products, symmetric sub-selection, traces of
//! products and in-place accumulation of scaled covariance terms.

use faer::Mat;

/// A dense matrix wrapper around faer's `Mat<f64>`.
#[derive(Debug, Clone)]
pub struct DenseMatrix {
    inner: Mat<f64>,
}

impl DenseMatrix {
    /// Create a new dense matrix filled with zeros.
    pub fn zeros(nrows: usize, ncols: usize) -> Self {
        Self {
            inner: Mat::zeros(nrows, ncols),
        }
    }

    /// Create a matrix whose entry (i, j) is `f(i, j)`.
    pub fn from_fn<F>(nrows: usize, ncols: usize, f: F) -> Self
    where
        F: FnMut(usize, usize) -> f64,
    {
        Self {
            inner: Mat::from_fn(nrows, ncols, f),
        }
    }

    /// Create a dense matrix from a flat vec (column-major order).
    pub fn from_col_major(nrows: usize, ncols: usize, data: Vec<f64>) -> Self {
        assert_eq!(data.len(), nrows * ncols);
        let inner = Mat::from_fn(nrows, ncols, |i, j| data[j * nrows + i]);
        Self { inner }
    }

    /// Create a dense matrix from a flat slice in row-major order.
    pub fn from_row_major(nrows: usize, ncols: usize, data: &[f64]) -> Self {
        assert_eq!(data.len(), nrows * ncols);
        let inner = Mat::from_fn(nrows, ncols, |i, j| data[i * ncols + j]);
        Self { inner }
    }

    /// Create an identity matrix of size n x n.
    pub fn identity(n: usize) -> Self {
        Self::from_diag(&vec![1.0; n])
    }

    /// Create a diagonal matrix from a vector.
    pub fn from_diag(diag: &[f64]) -> Self {
        let n = diag.len();
        let inner = Mat::from_fn(n, n, |i, j| if i == j { diag[i] } else { 0.0 });
        Self { inner }
    }

    pub fn nrows(&self) -> usize {
        self.inner.nrows()
    }

    pub fn ncols(&self) -> usize {
        self.inner.ncols()
    }

    pub fn is_square(&self) -> bool {
        self.nrows() == self.ncols()
    }

    /// Get element at (row, col).
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.inner.read(row, col)
    }

    /// Set element at (row, col).
    pub fn set(&mut self, row: usize, col: usize, value: f64) {
        self.inner.write(row, col, value);
    }

    /// Matrix-vector product: self * v.
    pub fn mat_vec(&self, v: &[f64]) -> Vec<f64> {
        assert_eq!(self.ncols(), v.len());
        let n = self.nrows();
        let mut result = vec![0.0; n];
        for j in 0..self.ncols() {
            let vj = v[j];
            if vj == 0.0 {
                continue;
            }
            for i in 0..n {
                result[i] += self.inner.read(i, j) * vj;
            }
        }
        result
    }

    /// Transposed matrix-vector product: self' * v.
    pub fn t_mat_vec(&self, v: &[f64]) -> Vec<f64> {
        assert_eq!(self.nrows(), v.len());
        (0..self.ncols())
            .map(|j| {
                let mut s = 0.0;
                for i in 0..self.nrows() {
                    s += self.inner.read(i, j) * v[i];
                }
                s
            })
            .collect()
    }

    /// Matrix-matrix product: self * other.
    pub fn mat_mul(&self, other: &DenseMatrix) -> DenseMatrix {
        assert_eq!(self.ncols(), other.nrows());
        DenseMatrix {
            inner: &self.inner * &other.inner,
        }
    }

    /// Cross-product: self' * other.
    pub fn t_mat_mul(&self, other: &DenseMatrix) -> DenseMatrix {
        assert_eq!(self.nrows(), other.nrows());
        self.transpose().mat_mul(other)
    }

    pub fn transpose(&self) -> DenseMatrix {
        DenseMatrix {
            inner: self.inner.transpose().to_owned(),
        }
    }

    /// Extract column as a Vec<f64>.
    pub fn col(&self, j: usize) -> Vec<f64> {
        (0..self.nrows()).map(|i| self.inner.read(i, j)).collect()
    }

    /// Set an entire column from a slice.
    pub fn set_col(&mut self, j: usize, data: &[f64]) {
        assert_eq!(data.len(), self.nrows());
        for i in 0..self.nrows() {
            self.inner.write(i, j, data[i]);
        }
    }

    /// Element-wise subtraction: self - other.
    pub fn sub(&self, other: &DenseMatrix) -> DenseMatrix {
        assert_eq!(self.nrows(), other.nrows());
        assert_eq!(self.ncols(), other.ncols());
        let inner = Mat::from_fn(self.nrows(), self.ncols(), |i, j| {
            self.inner.read(i, j) - other.inner.read(i, j)
        });
        DenseMatrix { inner }
    }

    /// Scalar multiplication.
    pub fn scale(&self, s: f64) -> DenseMatrix {
        let inner = Mat::from_fn(self.nrows(), self.ncols(), |i, j| self.inner.read(i, j) * s);
        DenseMatrix { inner }
    }

    /// self += s * other
    pub fn add_scaled_assign(&mut self, other: &DenseMatrix, s: f64) {
        assert_eq!(self.nrows(), other.nrows());
        assert_eq!(self.ncols(), other.ncols());
        for j in 0..self.ncols() {
            for i in 0..self.nrows() {
                let v = self.inner.read(i, j) + s * other.inner.read(i, j);
                self.inner.write(i, j, v);
            }
        }
    }

    /// self[i, i] += s * d[i]
    pub fn add_diag_assign(&mut self, d: &[f64], s: f64) {
        assert!(self.is_square());
        assert_eq!(d.len(), self.nrows());
        for i in 0..d.len() {
            let v = self.inner.read(i, i) + s * d[i];
            self.inner.write(i, i, v);
        }
    }

    /// Diagonal of a square matrix.
    pub fn diag(&self) -> Vec<f64> {
        let n = self.nrows().min(self.ncols());
        (0..n).map(|i| self.inner.read(i, i)).collect()
    }

    /// Symmetric sub-selection: rows and columns `indices`, in that order.
    pub fn select(&self, indices: &[usize]) -> DenseMatrix {
        let k = indices.len();
        let inner = Mat::from_fn(k, k, |i, j| self.inner.read(indices[i], indices[j]));
        DenseMatrix { inner }
    }

    /// Largest absolute asymmetry max |a_ij - a_ji|; `None` if not square.
    pub fn max_asymmetry(&self) -> Option<f64> {
        if !self.is_square() {
            return None;
        }
        let n = self.nrows();
        let mut worst = 0.0_f64;
        for j in 0..n {
            for i in (j + 1)..n {
                worst = worst.max((self.inner.read(i, j) - self.inner.read(j, i)).abs());
            }
        }
        Some(worst)
    }

    pub fn is_symmetric(&self, tol: f64) -> bool {
        self.max_asymmetry().is_some_and(|d| d <= tol)
    }

    /// tr(self * other) = sum_ij a_ij * b_ji
    pub fn trace_of_product(&self, other: &DenseMatrix) -> f64 {
        assert_eq!(self.nrows(), other.ncols());
        assert_eq!(self.ncols(), other.nrows());
        let mut s = 0.0;
        for j in 0..self.ncols() {
            for i in 0..self.nrows() {
                s += self.inner.read(i, j) * other.inner.read(j, i);
            }
        }
        s
    }

    /// Dot product of two vectors.
    pub fn dot(a: &[f64], b: &[f64]) -> f64 {
        assert_eq!(a.len(), b.len());
        a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
    }

    /// Extract data as a flat Vec in column-major order.
    pub fn to_col_major(&self) -> Vec<f64> {
        let mut data = Vec::with_capacity(self.nrows() * self.ncols());
        for j in 0..self.ncols() {
            for i in 0..self.nrows() {
                data.push(self.inner.read(i, j));
            }
        }
        data
    }
}

impl std::fmt::Display for DenseMatrix {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for i in 0..self.nrows() {
            for j in 0..self.ncols() {
                if j > 0 {
                    write!(f, "\t")?;
                }
                write!(f, "{:.6}", self.inner.read(i, j))?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
