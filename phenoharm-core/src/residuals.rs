//! Mapping model residuals back onto table rows.

use std::collections::HashMap;

use tracing::info;

use phenoharm_data::sample::sample_ids;
use phenoharm_data::{Column, DataError, Table};

use crate::model::FittedModel;

/// Add `column_name` holding each row's marginal residual, matched by
/// sample ID. Rows the model did not use get a missing value.
///
/// Returns the number of rows that received a residual.
pub fn attach_residuals(
    table: &mut Table,
    id_column: &str,
    model: &FittedModel,
    column_name: &str,
) -> Result<usize, DataError> {
    let by_id: HashMap<&str, f64> = model
        .sample_ids
        .iter()
        .map(String::as_str)
        .zip(model.residuals.iter().copied())
        .collect();

    let ids = sample_ids(table, id_column)?;
    let values: Vec<f64> = ids
        .iter()
        .map(|id| by_id.get(id.as_str()).copied().unwrap_or(f64::NAN))
        .collect();
    let matched = values.iter().filter(|v| !v.is_nan()).count();

    table.set_column(Column::numeric(column_name, values))?;
    info!(
        "Attached {} residuals to {} of {} rows",
        model.n_samples,
        matched,
        table.n_rows()
    );
    Ok(matched)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::fitted::tests::toy_model;

    #[test]
    fn test_matches_by_id_not_position() {
        // Model order is S1, S2, S3 with residuals -2, 1, 1.
        let model = toy_model(false, -1.0);
        let mut table = Table::from_columns(vec![Column::categorical(
            "sample.id",
            vec![Some("S3".into()), Some("X".into()), Some("S1".into())],
        )])
        .unwrap();

        let matched = attach_residuals(&mut table, "sample.id", &model, "resid").unwrap();
        assert_eq!(matched, 2);
        let resid = table.numeric("resid").unwrap();
        assert_eq!(resid[0], 1.0);
        assert!(resid[1].is_nan());
        assert_eq!(resid[2], -2.0);
    }
}
