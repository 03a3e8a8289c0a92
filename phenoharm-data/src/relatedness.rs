//! Genetic relatedness matrix I/O.
//!
//! Three encodings, chosen by file name:
//! - `*.mtx`: MatrixMarket coordinate entries (1-indexed; `symmetric` files
//!   store one triangle, `general` files both) plus
//!   `<file>.sampleIDs.txt` with one sample ID per line
//! - `*.phrm`: binary object file, magic bytes (PHRM) + version + bincode
//!   payload of sample IDs and column-major values
//! - anything else: delimited text, header row of sample IDs after a label
//!   cell, then one row per sample (ID followed by values)

use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use phenoharm_linalg::{DenseMatrix, SparseMatrix};

use crate::error::DataError;
use crate::table::parse_value;

/// Largest tolerated |a_ij - a_ji|.
pub const SYMMETRY_TOL: f64 = 1e-6;

/// A symmetric matrix of pairwise relatedness indexed by sample ID.
#[derive(Debug, Clone)]
pub struct RelatednessMatrix {
    sample_ids: Vec<String>,
    matrix: DenseMatrix,
}

impl RelatednessMatrix {
    /// Validates squareness, ID count, ID uniqueness and symmetry.
    pub fn new(sample_ids: Vec<String>, matrix: DenseMatrix) -> Result<Self, DataError> {
        if !matrix.is_square() {
            return Err(DataError::NotSquare {
                nrows: matrix.nrows(),
                ncols: matrix.ncols(),
            });
        }
        if matrix.nrows() != sample_ids.len() {
            return Err(DataError::IdCountMismatch {
                n: matrix.nrows(),
                ids: sample_ids.len(),
            });
        }
        let mut seen = HashSet::with_capacity(sample_ids.len());
        for id in &sample_ids {
            if !seen.insert(id.as_str()) {
                return Err(DataError::DuplicateSampleId(id.clone()));
            }
        }
        let asym = matrix.max_asymmetry().unwrap_or(0.0);
        if asym > SYMMETRY_TOL {
            return Err(DataError::Asymmetric(asym));
        }
        Ok(Self { sample_ids, matrix })
    }

    pub fn sample_ids(&self) -> &[String] {
        &self.sample_ids
    }

    pub fn matrix(&self) -> &DenseMatrix {
        &self.matrix
    }

    pub fn n_samples(&self) -> usize {
        self.sample_ids.len()
    }

    /// Restrict to samples at `indices`, in that order.
    pub fn subset(&self, indices: &[usize]) -> RelatednessMatrix {
        RelatednessMatrix {
            sample_ids: indices.iter().map(|&i| self.sample_ids[i].clone()).collect(),
            matrix: self.matrix.select(indices),
        }
    }
}

/// On-disk encoding of a relatedness matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelatednessFormat {
    MatrixMarket,
    Binary,
    DenseText,
}

impl RelatednessFormat {
    pub fn detect(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("mtx") => RelatednessFormat::MatrixMarket,
            Some("phrm") => RelatednessFormat::Binary,
            _ => RelatednessFormat::DenseText,
        }
    }
}

/// Sample-ID sidecar of a MatrixMarket file: `<file>.sampleIDs.txt`.
pub fn sample_ids_path(mtx_path: &Path) -> PathBuf {
    let mut s = mtx_path.as_os_str().to_owned();
    s.push(".sampleIDs.txt");
    PathBuf::from(s)
}

/// Read a relatedness matrix in the format implied by its file name.
pub fn read_relatedness(path: &Path) -> Result<RelatednessMatrix> {
    let grm = match RelatednessFormat::detect(path) {
        RelatednessFormat::MatrixMarket => read_matrix_market(path, &sample_ids_path(path))?,
        RelatednessFormat::Binary => load_binary(path)?,
        RelatednessFormat::DenseText => read_dense_text(path)?,
    };
    info!(
        "Loaded relatedness matrix {} ({} samples)",
        path.display(),
        grm.n_samples()
    );
    Ok(grm)
}

/// Write a relatedness matrix in the format implied by its file name.
pub fn write_relatedness(grm: &RelatednessMatrix, path: &Path) -> Result<()> {
    match RelatednessFormat::detect(path) {
        RelatednessFormat::MatrixMarket => write_matrix_market(grm, path, &sample_ids_path(path)),
        RelatednessFormat::Binary => save_binary(grm, path),
        RelatednessFormat::DenseText => write_dense_text(grm, path),
    }
}

/// Storage layout declared by a MatrixMarket banner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MtxSymmetry {
    /// One triangle stored; off-diagonal entries are mirrored.
    Symmetric,
    /// Every stored entry is taken as-is.
    General,
}

/// Parse `%%MatrixMarket matrix coordinate <field> <symmetry>`.
fn parse_mtx_banner(line: &str) -> Result<MtxSymmetry, DataError> {
    let words: Vec<String> = line.split_whitespace().map(str::to_ascii_lowercase).collect();
    let unsupported = || DataError::UnsupportedMatrixMarket(line.to_string());
    if words.len() != 5 || words[1] != "matrix" || words[2] != "coordinate" {
        return Err(unsupported());
    }
    if !matches!(words[3].as_str(), "real" | "integer" | "double") {
        return Err(unsupported());
    }
    match words[4].as_str() {
        "symmetric" => Ok(MtxSymmetry::Symmetric),
        "general" => Ok(MtxSymmetry::General),
        _ => Err(unsupported()),
    }
}

/// Read a MatrixMarket coordinate file. Off-diagonal entries are mirrored
/// for `symmetric` files and files without a banner; a `general` file must
/// store both triangles itself.
pub fn read_matrix_market(mtx_path: &Path, sample_ids_path: &Path) -> Result<RelatednessMatrix> {
    let sample_ids: Vec<String> = std::fs::read_to_string(sample_ids_path)
        .with_context(|| format!("Failed to read sample IDs: {}", sample_ids_path.display()))?
        .lines()
        .map(|l| l.trim().to_string())
        .filter(|l| !l.is_empty())
        .collect();
    let n = sample_ids.len();

    let contents = std::fs::read_to_string(mtx_path)
        .with_context(|| format!("Failed to read relatedness matrix: {}", mtx_path.display()))?;

    let mut symmetry = MtxSymmetry::Symmetric;
    let mut rows = Vec::new();
    let mut cols = Vec::new();
    let mut vals = Vec::new();
    let mut seen: HashSet<(usize, usize)> = HashSet::new();
    let mut header_done = false;

    for (idx, line) in contents.lines().enumerate() {
        let line = line.trim();
        if idx == 0 && line.starts_with("%%MatrixMarket") {
            symmetry = parse_mtx_banner(line)?;
            continue;
        }
        if line.is_empty() || line.starts_with('%') || line.starts_with('#') {
            continue;
        }
        let fields: Vec<&str> = line.split_whitespace().collect();
        if !header_done {
            // nrows ncols nnz
            header_done = true;
            let dim: usize = fields
                .first()
                .context("MatrixMarket size line is empty")?
                .parse()
                .with_context(|| format!("Bad MatrixMarket size line: '{}'", line))?;
            if dim != n {
                return Err(DataError::IdCountMismatch { n: dim, ids: n }.into());
            }
            continue;
        }
        if fields.len() < 3 {
            anyhow::bail!("Bad MatrixMarket entry: '{}'", line);
        }
        let row: usize = fields[0].parse()?;
        let col: usize = fields[1].parse()?;
        let val: f64 = fields[2].parse()?;
        if row == 0 || col == 0 || row > n || col > n {
            return Err(DataError::EntryOutOfRange { row, col, n }.into());
        }
        let (r, c) = (row - 1, col - 1);
        let key = match symmetry {
            MtxSymmetry::Symmetric => (r.min(c), r.max(c)),
            MtxSymmetry::General => (r, c),
        };
        if !seen.insert(key) {
            return Err(DataError::DuplicateEntry { row, col }.into());
        }
        rows.push(r);
        cols.push(c);
        vals.push(val);
        if symmetry == MtxSymmetry::Symmetric && r != c {
            rows.push(c);
            cols.push(r);
            vals.push(val);
        }
    }

    let sparse = SparseMatrix::from_triplets(n, n, &rows, &cols, &vals);
    info!(
        "Read {} stored relatedness entries for {} samples ({:?})",
        sparse.nnz(),
        n,
        symmetry
    );
    Ok(RelatednessMatrix::new(sample_ids, sparse.to_dense())?)
}

/// Write the upper triangle (non-zero entries) as MatrixMarket coordinates.
pub fn write_matrix_market(
    grm: &RelatednessMatrix,
    mtx_path: &Path,
    sample_ids_path: &Path,
) -> Result<()> {
    let mut f = std::fs::File::create(sample_ids_path)
        .with_context(|| format!("Failed to create {}", sample_ids_path.display()))?;
    for id in grm.sample_ids() {
        writeln!(f, "{}", id)?;
    }

    let sparse = SparseMatrix::from_dense(grm.matrix(), 0.0);
    let entries = sparse.upper_triplets();
    let n = grm.n_samples();

    let mut f = std::io::BufWriter::new(
        std::fs::File::create(mtx_path)
            .with_context(|| format!("Failed to create {}", mtx_path.display()))?,
    );
    writeln!(f, "%%MatrixMarket matrix coordinate real symmetric")?;
    writeln!(f, "{} {} {}", n, n, entries.len())?;
    for (i, j, v) in entries {
        writeln!(f, "{} {} {:.10}", i + 1, j + 1, v)?;
    }
    f.flush()?;
    Ok(())
}

/// Read a dense delimited matrix with a header row of sample IDs.
pub fn read_dense_text(path: &Path) -> Result<RelatednessMatrix> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read relatedness matrix: {}", path.display()))?;
    let mut lines = contents.lines().filter(|l| !l.trim().is_empty());
    let header = lines
        .next()
        .ok_or_else(|| DataError::EmptyFile(path.display().to_string()))?;
    let tab = header.contains('\t');
    let split = |line: &str| -> Vec<String> {
        if tab {
            line.split('\t').map(|s| s.trim().to_string()).collect()
        } else {
            line.split_whitespace().map(str::to_string).collect()
        }
    };

    let col_ids: Vec<String> = split(header).into_iter().skip(1).collect();
    let n = col_ids.len();
    let mut row_ids = Vec::with_capacity(n);
    let mut data = Vec::with_capacity(n * n);
    for (idx, line) in lines.enumerate() {
        let fields = split(line);
        if fields.len() != n + 1 {
            return Err(DataError::MalformedRow {
                path: path.display().to_string(),
                line: idx + 2,
                expected: n + 1,
                found: fields.len(),
            }
            .into());
        }
        row_ids.push(fields[0].clone());
        data.extend(fields[1..].iter().map(|s| parse_value(s)));
    }
    if row_ids != col_ids {
        anyhow::bail!(
            "{}: row sample IDs do not match header sample IDs",
            path.display()
        );
    }
    let matrix = DenseMatrix::from_row_major(row_ids.len(), n, &data);
    Ok(RelatednessMatrix::new(row_ids, matrix)?)
}

pub fn write_dense_text(grm: &RelatednessMatrix, path: &Path) -> Result<()> {
    let mut f = std::io::BufWriter::new(
        std::fs::File::create(path).with_context(|| format!("Failed to create {}", path.display()))?,
    );
    writeln!(f, "sample.id\t{}", grm.sample_ids().join("\t"))?;
    let m = grm.matrix();
    for (i, id) in grm.sample_ids().iter().enumerate() {
        write!(f, "{}", id)?;
        for j in 0..grm.n_samples() {
            write!(f, "\t{}", m.get(i, j))?;
        }
        writeln!(f)?;
    }
    f.flush()?;
    Ok(())
}

#[derive(Serialize, Deserialize)]
struct RelatednessFile {
    magic: [u8; 4],
    version: u32,
    sample_ids: Vec<String>,
    values: Vec<f64>,
}

/// Magic bytes of the binary object file.
pub const MAGIC: [u8; 4] = *b"PHRM";
pub const VERSION: u32 = 1;

pub fn save_binary(grm: &RelatednessMatrix, path: &Path) -> Result<()> {
    let file = RelatednessFile {
        magic: MAGIC,
        version: VERSION,
        sample_ids: grm.sample_ids.clone(),
        values: grm.matrix.to_col_major(),
    };
    let encoded = bincode::serialize(&file)?;
    std::fs::write(path, encoded).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

pub fn load_binary(path: &Path) -> Result<RelatednessMatrix> {
    let data =
        std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let file: RelatednessFile = bincode::deserialize(&data)
        .with_context(|| format!("{} is not a relatedness object file", path.display()))?;
    if file.magic != MAGIC {
        return Err(DataError::BadMagic {
            expected: MAGIC,
            found: file.magic,
        }
        .into());
    }
    let n = file.sample_ids.len();
    if file.values.len() != n * n {
        return Err(DataError::IdCountMismatch {
            n: (file.values.len() as f64).sqrt() as usize,
            ids: n,
        }
        .into());
    }
    let matrix = DenseMatrix::from_col_major(n, n, file.values);
    Ok(RelatednessMatrix::new(file.sample_ids, matrix)?)
}
