//! Delimited phenotype tables.
//!
//! Reads tab- or whitespace-delimited files with a header row into a
//! column-oriented [`Table`]. A column is numeric when every non-missing
//! cell parses as `f64`, otherwise categorical; columns named in
//! `text_columns` (identifiers) are always kept as text.

use std::collections::BTreeSet;
use std::fmt;
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::DataError;

/// Storage kind of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnKind {
    Numeric,
    Categorical,
}

impl fmt::Display for ColumnKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnKind::Numeric => write!(f, "numeric"),
            ColumnKind::Categorical => write!(f, "categorical"),
        }
    }
}

/// Column values. Missing numeric cells are NaN, missing text cells `None`.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnData {
    Numeric(Vec<f64>),
    Categorical(Vec<Option<String>>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub data: ColumnData,
}

impl Column {
    pub fn numeric(name: impl Into<String>, values: Vec<f64>) -> Self {
        Self {
            name: name.into(),
            data: ColumnData::Numeric(values),
        }
    }

    pub fn categorical(name: impl Into<String>, values: Vec<Option<String>>) -> Self {
        Self {
            name: name.into(),
            data: ColumnData::Categorical(values),
        }
    }

    /// A column of `n` missing cells.
    pub fn missing(name: impl Into<String>, kind: ColumnKind, n: usize) -> Self {
        match kind {
            ColumnKind::Numeric => Self::numeric(name, vec![f64::NAN; n]),
            ColumnKind::Categorical => Self::categorical(name, vec![None; n]),
        }
    }

    pub fn kind(&self) -> ColumnKind {
        match self.data {
            ColumnData::Numeric(_) => ColumnKind::Numeric,
            ColumnData::Categorical(_) => ColumnKind::Categorical,
        }
    }

    pub fn len(&self) -> usize {
        match &self.data {
            ColumnData::Numeric(v) => v.len(),
            ColumnData::Categorical(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_missing(&self, row: usize) -> bool {
        match &self.data {
            ColumnData::Numeric(v) => v[row].is_nan(),
            ColumnData::Categorical(v) => v[row].is_none(),
        }
    }

    /// True when no cell has a value.
    pub fn all_missing(&self) -> bool {
        (0..self.len()).all(|i| self.is_missing(i))
    }

    /// Cell rendered as text, `NA` when missing.
    pub fn display_value(&self, row: usize) -> String {
        match &self.data {
            ColumnData::Numeric(v) if v[row].is_nan() => "NA".to_string(),
            ColumnData::Numeric(v) => format!("{}", v[row]),
            ColumnData::Categorical(v) => v[row].clone().unwrap_or_else(|| "NA".to_string()),
        }
    }

    /// Sorted distinct non-missing values of a categorical column.
    pub fn levels(&self) -> Vec<String> {
        match &self.data {
            ColumnData::Categorical(v) => v
                .iter()
                .flatten()
                .cloned()
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect(),
            ColumnData::Numeric(_) => Vec::new(),
        }
    }

    /// Rows `indices`, in that order.
    pub fn select(&self, indices: &[usize]) -> Column {
        let data = match &self.data {
            ColumnData::Numeric(v) => ColumnData::Numeric(indices.iter().map(|&i| v[i]).collect()),
            ColumnData::Categorical(v) => {
                ColumnData::Categorical(indices.iter().map(|&i| v[i].clone()).collect())
            }
        };
        Column {
            name: self.name.clone(),
            data,
        }
    }

    /// Same cells stored as text.
    pub fn to_categorical(&self) -> Column {
        match &self.data {
            ColumnData::Categorical(_) => self.clone(),
            ColumnData::Numeric(_) => Column::categorical(
                self.name.clone(),
                (0..self.len())
                    .map(|i| (!self.is_missing(i)).then(|| self.display_value(i)))
                    .collect(),
            ),
        }
    }
}

/// A rectangular table of named, equally long columns.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    columns: Vec<Column>,
    n_rows: usize,
}

impl Table {
    pub fn from_columns(columns: Vec<Column>) -> Result<Self, DataError> {
        let mut table = Table::default();
        for column in columns {
            table.push_column(column)?;
        }
        Ok(table)
    }

    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    pub fn n_cols(&self) -> usize {
        self.columns.len()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }

    pub fn column(&self, name: &str) -> Result<&Column, DataError> {
        self.columns
            .iter()
            .find(|c| c.name == name)
            .ok_or_else(|| DataError::MissingColumn(name.to_string()))
    }

    pub fn numeric(&self, name: &str) -> Result<&[f64], DataError> {
        let column = self.column(name)?;
        match &column.data {
            ColumnData::Numeric(v) => Ok(v),
            ColumnData::Categorical(_) => Err(DataError::KindMismatch {
                column: name.to_string(),
                expected: ColumnKind::Numeric,
                found: ColumnKind::Categorical,
            }),
        }
    }

    pub fn categorical(&self, name: &str) -> Result<&[Option<String>], DataError> {
        let column = self.column(name)?;
        match &column.data {
            ColumnData::Categorical(v) => Ok(v),
            ColumnData::Numeric(_) => Err(DataError::KindMismatch {
                column: name.to_string(),
                expected: ColumnKind::Categorical,
                found: ColumnKind::Numeric,
            }),
        }
    }

    /// Append a column. The first column fixes the row count.
    pub fn push_column(&mut self, column: Column) -> Result<(), DataError> {
        if self.has_column(&column.name) {
            return Err(DataError::DuplicateColumn(column.name));
        }
        if self.columns.is_empty() {
            self.n_rows = column.len();
        } else if column.len() != self.n_rows {
            let found = column.len();
            return Err(DataError::LengthMismatch {
                column: column.name,
                expected: self.n_rows,
                found,
            });
        }
        self.columns.push(column);
        Ok(())
    }

    /// Replace an existing column of the same name, or append it.
    pub fn set_column(&mut self, column: Column) -> Result<(), DataError> {
        match self.columns.iter().position(|c| c.name == column.name) {
            Some(idx) if column.len() == self.n_rows => {
                self.columns[idx] = column;
                Ok(())
            }
            Some(_) => Err(DataError::LengthMismatch {
                column: column.name.clone(),
                expected: self.n_rows,
                found: column.len(),
            }),
            None => self.push_column(column),
        }
    }

    /// New table holding rows `indices`, in that order.
    pub fn select_rows(&self, indices: &[usize]) -> Table {
        Table {
            columns: self.columns.iter().map(|c| c.select(indices)).collect(),
            n_rows: indices.len(),
        }
    }
}

/// Parse a cell, treating NA/missing markers as NaN.
pub fn parse_value(s: &str) -> f64 {
    if is_missing_marker(s) {
        return f64::NAN;
    }
    s.parse().unwrap_or(f64::NAN)
}

fn is_missing_marker(s: &str) -> bool {
    matches!(s, "NA" | "na" | "Na" | "." | "" | "-" | "NaN" | "nan")
}

/// Read a delimited table with a header row.
///
/// Tab-delimited when the header contains a tab, whitespace-delimited
/// otherwise. Blank lines are skipped.
pub fn read_table(path: &Path, text_columns: &[String]) -> Result<Table> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read phenotype table: {}", path.display()))?;
    parse_table(&contents, &path.display().to_string(), text_columns)
}

/// Parse table text; `source` names the input in error messages.
pub fn parse_table(contents: &str, source: &str, text_columns: &[String]) -> Result<Table> {
    let mut lines = contents.lines().enumerate();
    let header_line = loop {
        match lines.next() {
            Some((_, l)) if l.trim().is_empty() => continue,
            Some((_, l)) => break l,
            None => return Err(DataError::EmptyFile(source.to_string()).into()),
        }
    };

    let tab = header_line.contains('\t');
    let split = |line: &str| -> Vec<String> {
        if tab {
            line.split('\t').map(|s| s.trim().to_string()).collect()
        } else {
            line.split_whitespace().map(str::to_string).collect()
        }
    };

    let headers = split(header_line);
    let mut cells: Vec<Vec<String>> = vec![Vec::new(); headers.len()];

    for (line_idx, line) in lines {
        if line.trim().is_empty() {
            continue;
        }
        let fields = split(line.trim_end_matches('\r'));
        if fields.len() != headers.len() {
            return Err(DataError::MalformedRow {
                path: source.to_string(),
                line: line_idx + 1,
                expected: headers.len(),
                found: fields.len(),
            }
            .into());
        }
        for (col, field) in cells.iter_mut().zip(fields) {
            col.push(field);
        }
    }

    let mut columns = Vec::with_capacity(headers.len());
    for (name, raw) in headers.into_iter().zip(cells) {
        let force_text = text_columns.iter().any(|t| *t == name);
        let numeric = !force_text
            && raw
                .iter()
                .all(|s| is_missing_marker(s) || s.parse::<f64>().is_ok());
        let column = if numeric {
            Column::numeric(name, raw.iter().map(|s| parse_value(s)).collect())
        } else {
            Column::categorical(
                name,
                raw.into_iter()
                    .map(|s| (!is_missing_marker(&s)).then_some(s))
                    .collect(),
            )
        };
        columns.push(column);
    }

    Ok(Table::from_columns(columns)?)
}

/// Write a table as tab-delimited text with `NA` for missing cells.
pub fn write_table(table: &Table, path: &Path) -> Result<()> {
    let file = std::fs::File::create(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    let mut out = std::io::BufWriter::new(file);
    writeln!(out, "{}", table.column_names().join("\t"))?;
    for row in 0..table.n_rows() {
        let fields: Vec<String> = table
            .columns()
            .iter()
            .map(|c| c.display_value(row))
            .collect();
        writeln!(out, "{}", fields.join("\t"))?;
    }
    out.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_value() {
        assert_eq!(parse_value("1.5"), 1.5);
        assert_eq!(parse_value("0"), 0.0);
        assert!(parse_value("NA").is_nan());
        assert!(parse_value(".").is_nan());
        assert!(parse_value("").is_nan());
    }

    #[test]
    fn test_parse_table_infers_kinds() {
        let text = "subject_id\tsex\tage\theight\n1\tM\t45\t170.2\n2\tF\tNA\t160\n3\tNA\t52\t.\n";
        let table = parse_table(text, "mem", &["subject_id".to_string()]).unwrap();

        assert_eq!(table.n_rows(), 3);
        assert_eq!(table.column_names(), vec!["subject_id", "sex", "age", "height"]);
        assert_eq!(table.column("subject_id").unwrap().kind(), ColumnKind::Categorical);
        assert_eq!(table.column("sex").unwrap().kind(), ColumnKind::Categorical);
        assert_eq!(table.column("age").unwrap().kind(), ColumnKind::Numeric);

        let age = table.numeric("age").unwrap();
        assert_eq!(age[0], 45.0);
        assert!(age[1].is_nan());
        assert_eq!(table.categorical("sex").unwrap()[2], None);
        assert_eq!(table.categorical("subject_id").unwrap()[0].as_deref(), Some("1"));
        assert_eq!(table.column("sex").unwrap().levels(), vec!["F", "M"]);
    }

    #[test]
    fn test_parse_table_whitespace_delimited() {
        let text = "id  y\nA   1\nB   2\n";
        let table = parse_table(text, "mem", &[]).unwrap();
        assert_eq!(table.numeric("y").unwrap(), &[1.0, 2.0]);
    }

    #[test]
    fn test_malformed_row_names_line() {
        let text = "a\tb\n1\t2\n3\n";
        let err = parse_table(text, "mem", &[]).unwrap_err();
        match err.downcast_ref::<DataError>() {
            Some(DataError::MalformedRow { line, expected, found, .. }) => {
                assert_eq!((*line, *expected, *found), (3, 2, 1));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_empty_file() {
        assert!(parse_table("\n\n", "mem", &[]).is_err());
    }

    #[test]
    fn test_push_column_checks_length_and_name() {
        let mut table = Table::from_columns(vec![Column::numeric("a", vec![1.0, 2.0])]).unwrap();
        assert!(matches!(
            table.push_column(Column::numeric("b", vec![1.0])),
            Err(DataError::LengthMismatch { ref column, expected: 2, found: 1 }) if column == "b"
        ));
        assert!(matches!(
            table.push_column(Column::numeric("a", vec![1.0, 2.0])),
            Err(DataError::DuplicateColumn(_))
        ));
        assert!(matches!(table.categorical("a"), Err(DataError::KindMismatch { .. })));
    }

    #[test]
    fn test_select_rows_and_write() {
        let table = Table::from_columns(vec![
            Column::categorical("id", vec![Some("x".into()), Some("y".into()), None]),
            Column::numeric("v", vec![1.0, f64::NAN, 3.5]),
        ])
        .unwrap();
        let sub = table.select_rows(&[2, 0]);
        assert_eq!(sub.n_rows(), 2);
        assert_eq!(sub.numeric("v").unwrap(), &[3.5, 1.0]);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.tsv");
        write_table(&table, &path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text, "id\tv\nx\t1\ny\tNA\nNA\t3.5\n");
    }
}
