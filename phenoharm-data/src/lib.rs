//! phenoharm-data: phenotype tables, harmonization and sample matching.
//!
//! Reads per-study phenotype tables, concatenates them into one combined
//! table, loads the relatedness matrix in any of its encodings, and aligns
//! the table to the matrix's sample order. Also fetches missing inputs.

pub mod annotated;
pub mod error;
pub mod fetch;
pub mod harmonize;
pub mod manifest;
pub mod relatedness;
pub mod sample;
pub mod table;

pub use annotated::AnnotatedTable;
pub use error::DataError;
pub use harmonize::{check_columns, concatenate, StudyTable, STUDY_COLUMN};
pub use relatedness::RelatednessMatrix;
pub use sample::{IdScheme, SAMPLE_ID_COLUMN};
pub use table::{Column, ColumnData, ColumnKind, Table};
