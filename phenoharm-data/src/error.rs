use thiserror::Error;

use crate::table::ColumnKind;

/// Validation failures in table handling, harmonization and sample matching.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("column '{0}' not found")]
    MissingColumn(String),

    #[error("column '{column}' is {found}, expected {expected}")]
    KindMismatch {
        column: String,
        expected: ColumnKind,
        found: ColumnKind,
    },

    #[error("duplicate column '{0}'")]
    DuplicateColumn(String),

    #[error("column '{column}' has {found} rows, table has {expected}")]
    LengthMismatch {
        column: String,
        expected: usize,
        found: usize,
    },

    #[error("{path}: line {line} has {found} fields, header has {expected}")]
    MalformedRow {
        path: String,
        line: usize,
        expected: usize,
        found: usize,
    },

    #[error("{0}: no header row")]
    EmptyFile(String),

    #[error("no study tables supplied")]
    NoStudies,

    #[error("duplicate study name '{0}'")]
    DuplicateStudy(String),

    #[error("study '{study}' has columns {found:?}, study '{reference}' has {expected:?}")]
    ColumnMismatch {
        study: String,
        reference: String,
        expected: Vec<String>,
        found: Vec<String>,
    },

    #[error("column '{column}' is {found} in study '{study}' but {expected} in study '{reference}'")]
    StudyKindMismatch {
        column: String,
        study: String,
        reference: String,
        expected: ColumnKind,
        found: ColumnKind,
    },

    #[error("study '{study}' already has a '{column}' column")]
    ReservedColumn { study: String, column: String },

    #[error("duplicate sample ID '{0}'")]
    DuplicateSampleId(String),

    #[error("missing sample ID at row {0}")]
    MissingSampleId(usize),

    #[error("relatedness matrix is {nrows} x {ncols}, expected square")]
    NotSquare { nrows: usize, ncols: usize },

    #[error("relatedness matrix has {n} rows but {ids} sample IDs")]
    IdCountMismatch { n: usize, ids: usize },

    #[error("relatedness matrix is not symmetric (max |a_ij - a_ji| = {0:.3e})")]
    Asymmetric(f64),

    #[error("relatedness matrix entry ({row}, {col}) is outside a {n} x {n} matrix")]
    EntryOutOfRange { row: usize, col: usize, n: usize },

    #[error("unsupported MatrixMarket banner '{0}' (expected coordinate real/integer, symmetric or general)")]
    UnsupportedMatrixMarket(String),

    #[error("symmetric MatrixMarket file stores entry ({row}, {col}) twice")]
    DuplicateEntry { row: usize, col: usize },

    #[error("invalid relatedness file: expected magic {expected:?}, got {found:?}")]
    BadMagic { expected: [u8; 4], found: [u8; 4] },

    #[error("no samples shared between phenotype table and relatedness matrix")]
    EmptyIntersection,

    #[error("table has {table} samples but relatedness matrix has {matrix}")]
    SampleCountMismatch { table: usize, matrix: usize },

    #[error(
        "sample order differs from relatedness matrix at position {position}: \
         table has '{table}', matrix has '{matrix}'"
    )]
    OrderMismatch {
        position: usize,
        table: String,
        matrix: String,
    },

    #[error("column '{0}' has no description")]
    MissingDescription(String),

    #[error("'{0}' does not exist and has no download URL")]
    MissingSource(String),

    #[error("unknown sample ID scheme '{0}' (expected subject, study-subject or row-number)")]
    UnknownIdScheme(String),

    #[error("invalid manifest: {0}")]
    InvalidManifest(String),
}
