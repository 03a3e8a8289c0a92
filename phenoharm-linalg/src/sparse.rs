//! Sparse matrix storage backed by sprs.
//!
//! Block-diagonal kinship matrices are usually distributed in coordinate
//! form; they are held here in CSR and densified before model fitting.

use sprs::{CsMatI, TriMat};

use crate::dense::DenseMatrix;

/// A sparse matrix wrapper around sprs CSR format.
#[derive(Debug, Clone)]
pub struct SparseMatrix {
    inner: CsMatI<f64, usize>,
}

impl SparseMatrix {
    /// Build from COO triplets. Duplicate coordinates are summed.
    pub fn from_triplets(
        nrows: usize,
        ncols: usize,
        rows: &[usize],
        cols: &[usize],
        vals: &[f64],
    ) -> Self {
        assert_eq!(rows.len(), cols.len());
        assert_eq!(rows.len(), vals.len());
        let mut tri = TriMat::new((nrows, ncols));
        for ((&r, &c), &v) in rows.iter().zip(cols).zip(vals) {
            tri.add_triplet(r, c, v);
        }
        Self { inner: tri.to_csr() }
    }

    /// Sparsify a dense matrix, keeping entries with |value| > `drop_below`.
    pub fn from_dense(dense: &DenseMatrix, drop_below: f64) -> Self {
        let mut tri = TriMat::new((dense.nrows(), dense.ncols()));
        for j in 0..dense.ncols() {
            for i in 0..dense.nrows() {
                let v = dense.get(i, j);
                if v.abs() > drop_below {
                    tri.add_triplet(i, j, v);
                }
            }
        }
        Self { inner: tri.to_csr() }
    }

    pub fn nrows(&self) -> usize {
        self.inner.rows()
    }

    pub fn ncols(&self) -> usize {
        self.inner.cols()
    }

    /// Number of stored entries.
    pub fn nnz(&self) -> usize {
        self.inner.nnz()
    }

    /// Element at (row, col); 0.0 if not stored.
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.inner.get(row, col).copied().unwrap_or(0.0)
    }

    /// Stored entries as (row, col, value), row-major.
    pub fn triplets(&self) -> Vec<(usize, usize, f64)> {
        self.inner
            .iter()
            .map(|(&v, (r, c))| (r, c, v))
            .collect()
    }

    /// Stored entries on or above the diagonal.
    pub fn upper_triplets(&self) -> Vec<(usize, usize, f64)> {
        self.triplets()
            .into_iter()
            .filter(|&(r, c, _)| c >= r)
            .collect()
    }

    pub fn to_dense(&self) -> DenseMatrix {
        let mut out = DenseMatrix::zeros(self.nrows(), self.ncols());
        for (r, c, v) in self.triplets() {
            out.set(r, c, v);
        }
        out
    }
}
