//! Assembly of per-study tables into one combined table.
//!
//! Concatenation is only valid when every study carries the same columns,
//! in the same order, with the same kinds. A column that is entirely
//! missing in one study takes the kind the other studies agree on.

use tracing::{debug, info};

use crate::error::DataError;
use crate::table::{Column, ColumnData, ColumnKind, Table};

/// Name of the study-identifier column added by [`concatenate`].
pub const STUDY_COLUMN: &str = "study";

/// One study's phenotype table.
#[derive(Debug, Clone)]
pub struct StudyTable {
    pub name: String,
    pub table: Table,
}

impl StudyTable {
    pub fn new(name: impl Into<String>, table: Table) -> Self {
        Self {
            name: name.into(),
            table,
        }
    }
}

/// Verify that all studies share column names (set and order) and kinds.
///
/// Returns the agreed kind of each column.
pub fn check_columns(studies: &[StudyTable]) -> Result<Vec<ColumnKind>, DataError> {
    let reference = studies.first().ok_or(DataError::NoStudies)?;
    let expected = reference.table.column_names();

    let mut seen = std::collections::HashSet::new();
    for study in studies {
        if !seen.insert(study.name.as_str()) {
            return Err(DataError::DuplicateStudy(study.name.clone()));
        }
        let found = study.table.column_names();
        if found != expected {
            return Err(DataError::ColumnMismatch {
                study: study.name.clone(),
                reference: reference.name.clone(),
                expected,
                found,
            });
        }
    }

    let mut kinds = Vec::with_capacity(expected.len());
    for (idx, name) in expected.iter().enumerate() {
        // First study with data in this column sets the kind.
        let mut agreed: Option<(ColumnKind, &str)> = None;
        for study in studies {
            let column = &study.table.columns()[idx];
            if column.all_missing() {
                continue;
            }
            match agreed {
                None => agreed = Some((column.kind(), &study.name)),
                Some((kind, owner)) if kind != column.kind() => {
                    return Err(DataError::StudyKindMismatch {
                        column: name.clone(),
                        study: study.name.clone(),
                        reference: owner.to_string(),
                        expected: kind,
                        found: column.kind(),
                    });
                }
                Some(_) => {}
            }
        }
        kinds.push(agreed.map_or(ColumnKind::Numeric, |(k, _)| k));
    }
    Ok(kinds)
}

/// Concatenate study tables row-wise, tagging each row with its study name.
///
/// Rows keep insertion order: studies in the order given, then file order.
pub fn concatenate(studies: &[StudyTable]) -> Result<Table, DataError> {
    let kinds = check_columns(studies)?;
    for study in studies {
        if study.table.has_column(STUDY_COLUMN) {
            return Err(DataError::ReservedColumn {
                study: study.name.clone(),
                column: STUDY_COLUMN.to_string(),
            });
        }
    }

    let names = studies[0].table.column_names();
    let mut combined = Table::default();
    for (idx, (name, kind)) in names.iter().zip(kinds).enumerate() {
        let data = match kind {
            ColumnKind::Numeric => {
                let mut values = Vec::new();
                for study in studies {
                    let column = &study.table.columns()[idx];
                    match &column.data {
                        ColumnData::Numeric(v) => values.extend_from_slice(v),
                        ColumnData::Categorical(v) => values.extend(v.iter().map(|_| f64::NAN)),
                    }
                }
                ColumnData::Numeric(values)
            }
            ColumnKind::Categorical => {
                let mut values = Vec::new();
                for study in studies {
                    let column = &study.table.columns()[idx];
                    match &column.data {
                        ColumnData::Categorical(v) => values.extend(v.iter().cloned()),
                        ColumnData::Numeric(v) => values.extend(v.iter().map(|_| None)),
                    }
                }
                ColumnData::Categorical(values)
            }
        };
        combined.push_column(Column {
            name: name.clone(),
            data,
        })?;
    }

    let study_ids: Vec<Option<String>> = studies
        .iter()
        .flat_map(|s| std::iter::repeat(Some(s.name.clone())).take(s.table.n_rows()))
        .collect();
    combined.push_column(Column::categorical(STUDY_COLUMN, study_ids))?;

    for study in studies {
        debug!("Study '{}': {} rows", study.name, study.table.n_rows());
    }
    info!(
        "Combined {} studies into {} rows x {} columns",
        studies.len(),
        combined.n_rows(),
        combined.n_cols()
    );
    Ok(combined)
}
