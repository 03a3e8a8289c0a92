//! Per-group category counts and numeric summaries, rendered as text.

use std::fmt::Write as _;

use phenoharm_data::{Column, DataError, Table};

use crate::util::math::{mean, quantile_sorted, sample_variance};

/// Label for rows whose group or category is missing.
pub const MISSING_LABEL: &str = "NA";

/// Five-number summary plus mean, SD and counts.
#[derive(Debug, Clone, PartialEq)]
pub struct NumericSummary {
    pub n: usize,
    pub n_missing: usize,
    pub min: f64,
    pub q1: f64,
    pub median: f64,
    pub mean: f64,
    pub q3: f64,
    pub max: f64,
    /// Sample standard deviation (n - 1).
    pub sd: f64,
}

pub fn numeric_summary(values: &[f64]) -> NumericSummary {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
    sorted.sort_by(f64::total_cmp);
    let n = sorted.len();
    NumericSummary {
        n,
        n_missing: values.len() - n,
        min: sorted.first().copied().unwrap_or(f64::NAN),
        q1: quantile_sorted(&sorted, 0.25),
        median: quantile_sorted(&sorted, 0.5),
        mean: mean(&sorted),
        q3: quantile_sorted(&sorted, 0.75),
        max: sorted.last().copied().unwrap_or(f64::NAN),
        sd: sample_variance(&sorted).sqrt(),
    }
}

/// Group label of each row: the cell text, or `NA`.
fn group_labels(column: &Column) -> Vec<String> {
    (0..column.len()).map(|r| column.display_value(r)).collect()
}

/// Sorted group levels, with `NA` last when any row lacks a group.
fn group_order(column: &Column) -> Vec<String> {
    let categorical = column.to_categorical();
    let mut levels = categorical.levels();
    if (0..categorical.len()).any(|r| categorical.is_missing(r)) {
        levels.push(MISSING_LABEL.to_string());
    }
    levels
}

/// Counts of each level of one categorical column within each group.
#[derive(Debug, Clone, PartialEq)]
pub struct CategoryCounts {
    pub group_col: String,
    pub category_col: String,
    /// Category levels, `NA` last when present.
    pub levels: Vec<String>,
    /// Per group: label and one count per level.
    pub groups: Vec<(String, Vec<usize>)>,
}

pub fn category_counts(
    table: &Table,
    group_col: &str,
    category_col: &str,
) -> Result<CategoryCounts, DataError> {
    let group = table.column(group_col)?.to_categorical();
    let category = table.column(category_col)?.to_categorical();
    let group_of = group_labels(&group);
    let category_of = group_labels(&category);
    let levels = group_order(&category);

    let groups = group_order(&group)
        .into_iter()
        .map(|g| {
            let counts = levels
                .iter()
                .map(|level| {
                    group_of
                        .iter()
                        .zip(&category_of)
                        .filter(|(a, b)| **a == g && *b == level)
                        .count()
                })
                .collect();
            (g, counts)
        })
        .collect();

    Ok(CategoryCounts {
        group_col: group_col.to_string(),
        category_col: category_col.to_string(),
        levels,
        groups,
    })
}

/// Summaries of a numeric column within each group.
pub fn numeric_summaries_by(
    table: &Table,
    group_col: &str,
    value_col: &str,
) -> Result<Vec<(String, NumericSummary)>, DataError> {
    let group = table.column(group_col)?.to_categorical();
    let values = table.numeric(value_col)?;
    let group_of = group_labels(&group);
    Ok(group_order(&group)
        .into_iter()
        .map(|g| {
            let in_group: Vec<f64> = values
                .iter()
                .zip(&group_of)
                .filter(|(_, label)| **label == g)
                .map(|(v, _)| *v)
                .collect();
            let summary = numeric_summary(&in_group);
            (g, summary)
        })
        .collect())
}

pub fn render_counts(counts: &CategoryCounts) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{} by {}", counts.category_col, counts.group_col);
    let _ = write!(out, "{:<16}", counts.group_col);
    for level in &counts.levels {
        let _ = write!(out, " {:>10}", level);
    }
    let _ = writeln!(out);
    for (group, row) in &counts.groups {
        let _ = write!(out, "{:<16}", group);
        for c in row {
            let _ = write!(out, " {:>10}", c);
        }
        let _ = writeln!(out);
    }
    out
}

pub fn render_summaries(title: &str, group_col: &str, rows: &[(String, NumericSummary)]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", title);
    let _ = writeln!(
        out,
        "{:<16} {:>6} {:>6} {:>10} {:>10} {:>10} {:>10} {:>10} {:>10} {:>10}",
        group_col, "n", "NA", "min", "q1", "median", "mean", "q3", "max", "sd"
    );
    for (group, s) in rows {
        let _ = writeln!(
            out,
            "{:<16} {:>6} {:>6} {:>10.3} {:>10.3} {:>10.3} {:>10.3} {:>10.3} {:>10.3} {:>10.3}",
            group, s.n, s.n_missing, s.min, s.q1, s.median, s.mean, s.q3, s.max, s.sd
        );
    }
    out
}

/// Counts for every categorical column and summaries for every numeric
/// column, each split by `group_col`. `skip` names columns to leave out
/// (identifiers).
pub fn summary_report(table: &Table, group_col: &str, skip: &[&str]) -> Result<String, DataError> {
    table.column(group_col)?;
    let mut out = String::new();
    for column in table.columns() {
        if column.name == group_col || skip.contains(&column.name.as_str()) {
            continue;
        }
        let section = match column.kind() {
            phenoharm_data::ColumnKind::Categorical => {
                render_counts(&category_counts(table, group_col, &column.name)?)
            }
            phenoharm_data::ColumnKind::Numeric => render_summaries(
                &format!("{} by {}", column.name, group_col),
                group_col,
                &numeric_summaries_by(table, group_col, &column.name)?,
            ),
        };
        out.push_str(&section);
        out.push('\n');
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> Table {
        let some = |v: &[&str]| -> Vec<Option<String>> {
            v.iter()
                .map(|s| (*s != "NA").then(|| s.to_string()))
                .collect()
        };
        Table::from_columns(vec![
            Column::categorical("sex", some(&["M", "F", "M", "NA", "F"])),
            Column::numeric("height", vec![170.0, 160.0, 180.0, 150.0, f64::NAN]),
            Column::categorical("study", some(&["a", "a", "a", "b", "b"])),
        ])
        .unwrap()
    }

    #[test]
    fn test_numeric_summary() {
        let s = numeric_summary(&[4.0, 1.0, f64::NAN, 3.0, 2.0]);
        assert_eq!(s.n, 4);
        assert_eq!(s.n_missing, 1);
        assert_eq!(s.min, 1.0);
        assert_eq!(s.max, 4.0);
        assert!((s.q1 - 1.75).abs() < 1e-12);
        assert!((s.median - 2.5).abs() < 1e-12);
        assert!((s.mean - 2.5).abs() < 1e-12);
        assert!((s.sd - (5.0f64 / 3.0).sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_numeric_summary_empty() {
        let s = numeric_summary(&[f64::NAN]);
        assert_eq!(s.n, 0);
        assert!(s.min.is_nan() && s.median.is_nan());
    }

    #[test]
    fn test_category_counts_by_study() {
        let counts = category_counts(&table(), "study", "sex").unwrap();
        assert_eq!(counts.levels, vec!["F", "M", "NA"]);
        assert_eq!(
            counts.groups,
            vec![("a".to_string(), vec![1, 2, 0]), ("b".to_string(), vec![1, 0, 1])]
        );
    }

    #[test]
    fn test_numeric_summaries_by_study() {
        let rows = numeric_summaries_by(&table(), "study", "height").unwrap();
        assert_eq!(rows[0].0, "a");
        assert_eq!(rows[0].1.n, 3);
        assert_eq!(rows[0].1.median, 170.0);
        assert_eq!(rows[1].1.n, 1);
        assert_eq!(rows[1].1.n_missing, 1);
    }

    #[test]
    fn test_report_mentions_each_column() {
        let report = summary_report(&table(), "study", &[]).unwrap();
        assert!(report.contains("sex by study"));
        assert!(report.contains("height by study"));
        assert!(summary_report(&table(), "cohort", &[]).is_err());
    }
}
