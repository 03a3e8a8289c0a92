//! Sample identifiers and matching against the relatedness matrix.
//!
//! The combined table gets a `sample.id` column, loses rows with missing
//! model values, and is then reordered to the relatedness matrix's sample
//! order. Samples present on only one side are dropped.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

use tracing::{info, warn};

use crate::error::DataError;
use crate::harmonize::STUDY_COLUMN;
use crate::relatedness::RelatednessMatrix;
use crate::table::{Column, Table};

/// Column added by [`attach_sample_ids`].
pub const SAMPLE_ID_COLUMN: &str = "sample.id";

/// Result of intersecting sample IDs from multiple sources.
#[derive(Debug, Clone)]
pub struct SampleIntersection {
    /// Shared IDs, in primary-source order.
    pub ids: Vec<String>,
    /// Per source, the row of each shared ID.
    pub indices: Vec<Vec<usize>>,
}

/// Intersect sample IDs; the first source is primary and fixes the order.
pub fn intersect_samples(sources: &[&[String]]) -> SampleIntersection {
    let Some((primary, others)) = sources.split_first() else {
        return SampleIntersection {
            ids: Vec::new(),
            indices: Vec::new(),
        };
    };

    let maps: Vec<HashMap<&str, usize>> = others
        .iter()
        .map(|ids| {
            ids.iter()
                .enumerate()
                .map(|(i, id)| (id.as_str(), i))
                .collect()
        })
        .collect();

    let mut ids = Vec::new();
    let mut indices: Vec<Vec<usize>> = vec![Vec::new(); sources.len()];
    for (primary_idx, id) in primary.iter().enumerate() {
        let rows: Option<Vec<usize>> = maps.iter().map(|m| m.get(id.as_str()).copied()).collect();
        if let Some(rows) = rows {
            ids.push(id.clone());
            indices[0].push(primary_idx);
            for (src, row) in rows.into_iter().enumerate() {
                indices[src + 1].push(row);
            }
        }
    }
    SampleIntersection { ids, indices }
}

/// How `sample.id` is derived from a combined-table row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdScheme {
    /// The subject identifier as-is.
    Subject,
    /// `<study>_<subject>`, for matrices keyed across studies.
    StudySubject,
    /// 1-based row number in insertion order.
    RowNumber,
}

impl FromStr for IdScheme {
    type Err = DataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "subject" => Ok(IdScheme::Subject),
            "study-subject" | "study_subject" => Ok(IdScheme::StudySubject),
            "row-number" | "row_number" => Ok(IdScheme::RowNumber),
            other => Err(DataError::UnknownIdScheme(other.to_string())),
        }
    }
}

impl fmt::Display for IdScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdScheme::Subject => write!(f, "subject"),
            IdScheme::StudySubject => write!(f, "study-subject"),
            IdScheme::RowNumber => write!(f, "row-number"),
        }
    }
}

/// Add (or replace) the `sample.id` column.
///
/// Every row must end up with a distinct, non-missing ID.
pub fn attach_sample_ids(
    table: &mut Table,
    subject_column: &str,
    scheme: IdScheme,
) -> Result<(), DataError> {
    let ids: Vec<String> = match scheme {
        IdScheme::RowNumber => (1..=table.n_rows()).map(|i| i.to_string()).collect(),
        IdScheme::Subject => {
            let subjects = table.column(subject_column)?.to_categorical();
            subject_ids(&subjects)?
        }
        IdScheme::StudySubject => {
            let subjects = subject_ids(&table.column(subject_column)?.to_categorical())?;
            let studies = subject_ids(&table.column(STUDY_COLUMN)?.to_categorical())?;
            studies
                .iter()
                .zip(&subjects)
                .map(|(study, subject)| format!("{}_{}", study, subject))
                .collect()
        }
    };

    let mut seen = HashSet::with_capacity(ids.len());
    for id in &ids {
        if !seen.insert(id.as_str()) {
            return Err(DataError::DuplicateSampleId(id.clone()));
        }
    }

    table.set_column(Column::categorical(
        SAMPLE_ID_COLUMN,
        ids.into_iter().map(Some).collect(),
    ))
}

fn subject_ids(column: &Column) -> Result<Vec<String>, DataError> {
    (0..column.len())
        .map(|row| {
            if column.is_missing(row) {
                Err(DataError::MissingSampleId(row + 1))
            } else {
                Ok(column.display_value(row))
            }
        })
        .collect()
}

/// Read the ID column of a table as plain strings.
pub fn sample_ids(table: &Table, id_column: &str) -> Result<Vec<String>, DataError> {
    subject_ids(&table.column(id_column)?.to_categorical())
}

/// Keep only rows with a value in every named column.
///
/// Returns the reduced table and the kept row indices of the input.
pub fn complete_cases(table: &Table, columns: &[&str]) -> Result<(Table, Vec<usize>), DataError> {
    let cols: Vec<&Column> = columns
        .iter()
        .map(|name| table.column(name))
        .collect::<Result<_, _>>()?;

    let keep: Vec<usize> = (0..table.n_rows())
        .filter(|&row| cols.iter().all(|c| !c.is_missing(row)))
        .collect();

    let dropped = table.n_rows() - keep.len();
    if dropped > 0 {
        info!(
            "Dropped {} of {} rows with missing values in [{}]",
            dropped,
            table.n_rows(),
            columns.join(", ")
        );
    }
    Ok((table.select_rows(&keep), keep))
}

/// Table and relatedness matrix restricted to shared samples, in matrix order.
#[derive(Debug, Clone)]
pub struct Aligned {
    pub table: Table,
    pub matrix: RelatednessMatrix,
    /// Table rows whose ID is not in the matrix.
    pub dropped_from_table: usize,
    /// Matrix samples with no table row.
    pub dropped_from_matrix: usize,
}

/// Reorder `table` to the sample order of `matrix`, subsetting both to the
/// samples they share.
pub fn align_to_matrix(
    table: &Table,
    id_column: &str,
    matrix: &RelatednessMatrix,
) -> Result<Aligned, DataError> {
    let table_ids = sample_ids(table, id_column)?;
    let matrix_ids = matrix.sample_ids();

    let shared = intersect_samples(&[matrix_ids, &table_ids]);
    if shared.ids.is_empty() {
        return Err(DataError::EmptyIntersection);
    }

    let dropped_from_table = table_ids.len() - shared.ids.len();
    let dropped_from_matrix = matrix_ids.len() - shared.ids.len();
    if dropped_from_table > 0 {
        warn!(
            "{} table samples are not in the relatedness matrix and were dropped",
            dropped_from_table
        );
    }
    if dropped_from_matrix > 0 {
        info!(
            "{} relatedness-matrix samples have no phenotype row and were dropped",
            dropped_from_matrix
        );
    }
    info!("Aligned {} samples to relatedness-matrix order", shared.ids.len());

    Ok(Aligned {
        table: table.select_rows(&shared.indices[1]),
        matrix: matrix.subset(&shared.indices[0]),
        dropped_from_table,
        dropped_from_matrix,
    })
}

/// Require `ids` to equal `expected` position by position.
pub fn check_alignment(ids: &[String], expected: &[String]) -> Result<(), DataError> {
    if ids.len() != expected.len() {
        return Err(DataError::SampleCountMismatch {
            table: ids.len(),
            matrix: expected.len(),
        });
    }
    match ids.iter().zip(expected).position(|(a, b)| a != b) {
        Some(position) => Err(DataError::OrderMismatch {
            position,
            table: ids[position].clone(),
            matrix: expected[position].clone(),
        }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use phenoharm_linalg::DenseMatrix;

    fn strings(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    fn combined() -> Table {
        Table::from_columns(vec![
            Column::categorical(
                "subject_id",
                vec![Some("1".into()), Some("2".into()), Some("1".into())],
            ),
            Column::numeric("height", vec![170.0, f64::NAN, 158.0]),
            Column::categorical(
                STUDY_COLUMN,
                vec![Some("s1".into()), Some("s1".into()), Some("s2".into())],
            ),
        ])
        .unwrap()
    }

    #[test]
    fn test_intersect_two_sources() {
        let src1 = strings(&["A", "B", "C", "D"]);
        let src2 = strings(&["C", "A", "E"]);

        let result = intersect_samples(&[&src1, &src2]);
        assert_eq!(result.ids, vec!["A", "C"]);
        assert_eq!(result.indices[0], vec![0, 2]);
        assert_eq!(result.indices[1], vec![1, 0]);
    }

    #[test]
    fn test_intersect_empty() {
        let s1 = strings(&["A", "B"]);
        let s2 = strings(&["C", "D"]);
        assert!(intersect_samples(&[&s1, &s2]).ids.is_empty());
        assert!(intersect_samples(&[]).ids.is_empty());
    }

    #[test]
    fn test_id_scheme_parse() {
        assert_eq!("subject".parse::<IdScheme>().unwrap(), IdScheme::Subject);
        assert_eq!("study-subject".parse::<IdScheme>().unwrap(), IdScheme::StudySubject);
        assert_eq!(IdScheme::RowNumber.to_string(), "row-number");
        assert!("bogus".parse::<IdScheme>().is_err());
    }

    #[test]
    fn test_subject_scheme_rejects_duplicates() {
        let mut table = combined();
        assert!(matches!(
            attach_sample_ids(&mut table, "subject_id", IdScheme::Subject),
            Err(DataError::DuplicateSampleId(ref id)) if id == "1"
        ));
    }

    #[test]
    fn test_study_subject_and_row_number_schemes() {
        let mut table = combined();
        attach_sample_ids(&mut table, "subject_id", IdScheme::StudySubject).unwrap();
        assert_eq!(
            sample_ids(&table, SAMPLE_ID_COLUMN).unwrap(),
            strings(&["s1_1", "s1_2", "s2_1"])
        );

        attach_sample_ids(&mut table, "subject_id", IdScheme::RowNumber).unwrap();
        assert_eq!(
            sample_ids(&table, SAMPLE_ID_COLUMN).unwrap(),
            strings(&["1", "2", "3"])
        );
    }

    #[test]
    fn test_complete_cases() {
        let (kept, rows) = complete_cases(&combined(), &["height", STUDY_COLUMN]).unwrap();
        assert_eq!(rows, vec![0, 2]);
        assert_eq!(kept.numeric("height").unwrap(), &[170.0, 158.0]);
    }

    #[test]
    fn test_align_to_matrix_follows_matrix_order() {
        let mut table = combined();
        attach_sample_ids(&mut table, "subject_id", IdScheme::StudySubject).unwrap();

        // Matrix lists s2_1 first and carries one sample absent from the table.
        let m = DenseMatrix::from_row_major(
            3,
            3,
            &[1.0, 0.1, 0.2, 0.1, 1.0, 0.3, 0.2, 0.3, 1.0],
        );
        let grm = RelatednessMatrix::new(strings(&["s2_1", "x", "s1_1"]), m).unwrap();

        let aligned = align_to_matrix(&table, SAMPLE_ID_COLUMN, &grm).unwrap();
        let ids = sample_ids(&aligned.table, SAMPLE_ID_COLUMN).unwrap();
        assert_eq!(ids, strings(&["s2_1", "s1_1"]));
        assert_eq!(aligned.matrix.sample_ids(), &ids[..]);
        assert_eq!(aligned.matrix.matrix().get(0, 1), 0.2);
        assert_eq!(aligned.dropped_from_table, 1);
        assert_eq!(aligned.dropped_from_matrix, 1);
        check_alignment(&ids, aligned.matrix.sample_ids()).unwrap();
    }

    #[test]
    fn test_align_empty_intersection() {
        let mut table = combined();
        attach_sample_ids(&mut table, "subject_id", IdScheme::RowNumber).unwrap();
        let grm = RelatednessMatrix::new(strings(&["z"]), DenseMatrix::identity(1)).unwrap();
        assert!(matches!(
            align_to_matrix(&table, SAMPLE_ID_COLUMN, &grm),
            Err(DataError::EmptyIntersection)
        ));
    }

    #[test]
    fn test_check_alignment_reports_position() {
        let err = check_alignment(&strings(&["a", "b"]), &strings(&["a", "c"])).unwrap_err();
        assert!(matches!(err, DataError::OrderMismatch { position: 1, .. }));
        assert!(matches!(
            check_alignment(&strings(&["a"]), &strings(&["a", "c"])),
            Err(DataError::SampleCountMismatch { .. })
        ));
    }
}
