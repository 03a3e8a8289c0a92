//! Boxplots written as standalone HTML.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use plotly::layout::{Axis, BoxMode};
use plotly::{BoxPlot, Layout, Plot};

use phenoharm_data::Table;

pub fn ensure_plots_dir(out_dir: &Path) -> Result<PathBuf> {
    let dir = out_dir.join("plots");
    std::fs::create_dir_all(&dir).context("create plots directory")?;
    Ok(dir)
}

pub fn plot_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{name}.html"))
}

/// Non-missing (group, value) pairs.
fn grouped_values(table: &Table, group_col: &str, value_col: &str) -> Result<(Vec<String>, Vec<f64>)> {
    let group = table.column(group_col)?.to_categorical();
    let values = table.numeric(value_col)?;
    let (labels, ys) = values
        .iter()
        .enumerate()
        .filter(|(r, v)| !v.is_nan() && !group.is_missing(*r))
        .map(|(r, v)| (group.display_value(r), *v))
        .unzip();
    Ok((labels, ys))
}

fn layout(title: &str, group_col: &str, value_col: &str) -> Layout {
    Layout::new()
        .title(title.to_string())
        .x_axis(Axis::new().title(group_col.to_string()))
        .y_axis(Axis::new().title(value_col.to_string()))
}

/// One box per level of `group_col`.
pub fn boxplot_by_group(
    table: &Table,
    group_col: &str,
    value_col: &str,
    title: &str,
    path: &Path,
) -> Result<()> {
    let (labels, ys) = grouped_values(table, group_col, value_col)?;
    let mut plot = Plot::new();
    plot.add_trace(BoxPlot::new_xy(labels, ys).name(value_col));
    plot.set_layout(layout(title, group_col, value_col));
    plot.write_html(path);
    tracing::info!("Wrote {}", path.display());
    Ok(())
}

/// Boxes per level of `group_col`, one coloured trace per level of
/// `split_col` side by side.
pub fn boxplot_by_group_split(
    table: &Table,
    group_col: &str,
    split_col: &str,
    value_col: &str,
    title: &str,
    path: &Path,
) -> Result<()> {
    let split = table.column(split_col)?.to_categorical();
    let group = table.column(group_col)?.to_categorical();
    let values = table.numeric(value_col)?;

    let mut plot = Plot::new();
    for level in split.levels() {
        let (labels, ys): (Vec<String>, Vec<f64>) = (0..table.n_rows())
            .filter(|&r| {
                !values[r].is_nan()
                    && !group.is_missing(r)
                    && split.display_value(r) == level
                    && !split.is_missing(r)
            })
            .map(|r| (group.display_value(r), values[r]))
            .unzip();
        plot.add_trace(BoxPlot::new_xy(labels, ys).name(level.as_str()));
    }
    plot.set_layout(layout(title, group_col, value_col).box_mode(BoxMode::Group));
    plot.write_html(path);
    tracing::info!("Wrote {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use phenoharm_data::Column;

    fn table() -> Table {
        Table::from_columns(vec![
            Column::categorical(
                "study",
                vec![Some("a".into()), Some("a".into()), Some("b".into()), None],
            ),
            Column::categorical(
                "sex",
                vec![Some("F".into()), Some("M".into()), Some("F".into()), Some("M".into())],
            ),
            Column::numeric("height", vec![160.0, 175.0, f64::NAN, 170.0]),
        ])
        .unwrap()
    }

    #[test]
    fn test_grouped_values_skip_missing() {
        let (labels, ys) = grouped_values(&table(), "study", "height").unwrap();
        assert_eq!(labels, vec!["a", "a"]);
        assert_eq!(ys, vec![160.0, 175.0]);
    }

    #[test]
    fn test_boxplots_write_html() {
        let dir = tempfile::tempdir().unwrap();
        let plots = ensure_plots_dir(dir.path()).unwrap();

        let by_study = plot_path(&plots, "height_by_study");
        boxplot_by_group(&table(), "study", "height", "Height by study", &by_study).unwrap();
        assert!(std::fs::read_to_string(&by_study).unwrap().contains("Height by study"));

        let by_sex = plot_path(&plots, "height_by_study_sex");
        boxplot_by_group_split(&table(), "study", "sex", "height", "Height by study and sex", &by_sex)
            .unwrap();
        assert!(by_sex.exists());
    }

    #[test]
    fn test_unknown_column_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x.html");
        assert!(boxplot_by_group(&table(), "cohort", "height", "t", &path).is_err());
    }
}
