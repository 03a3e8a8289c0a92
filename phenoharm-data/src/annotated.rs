//! A table whose every column carries a free-text description.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};

use crate::error::DataError;
use crate::sample::sample_ids;
use crate::table::Table;

#[derive(Debug, Clone)]
pub struct AnnotatedTable {
    table: Table,
    descriptions: BTreeMap<String, String>,
    id_column: String,
}

impl AnnotatedTable {
    /// Fails if a column has no description, or `id_column` is absent.
    /// Descriptions for columns not in the table are ignored.
    pub fn new(
        table: Table,
        descriptions: &BTreeMap<String, String>,
        id_column: &str,
    ) -> Result<Self, DataError> {
        table.column(id_column)?;
        let mut kept = BTreeMap::new();
        for name in table.column_names() {
            match descriptions.get(&name) {
                Some(text) => {
                    kept.insert(name, text.clone());
                }
                None => return Err(DataError::MissingDescription(name)),
            }
        }
        Ok(Self {
            table,
            descriptions: kept,
            id_column: id_column.to_string(),
        })
    }

    pub fn table(&self) -> &Table {
        &self.table
    }

    pub fn id_column(&self) -> &str {
        &self.id_column
    }

    pub fn sample_ids(&self) -> Result<Vec<String>, DataError> {
        sample_ids(&self.table, &self.id_column)
    }

    pub fn description(&self, column: &str) -> Option<&str> {
        self.descriptions.get(column).map(String::as_str)
    }

    pub fn descriptions(&self) -> &BTreeMap<String, String> {
        &self.descriptions
    }

    pub fn into_table(self) -> Table {
        self.table
    }
}

/// Read a JSON object mapping column name to description.
pub fn load_descriptions(path: &Path) -> Result<BTreeMap<String, String>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&text)
        .with_context(|| format!("Invalid column descriptions in {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::Column;

    fn table() -> Table {
        Table::from_columns(vec![
            Column::categorical("sample.id", vec![Some("a".into()), Some("b".into())]),
            Column::numeric("height", vec![170.0, 160.0]),
        ])
        .unwrap()
    }

    #[test]
    fn test_requires_every_description() {
        let mut desc = BTreeMap::new();
        desc.insert("sample.id".to_string(), "sample identifier".to_string());
        assert!(matches!(
            AnnotatedTable::new(table(), &desc, "sample.id"),
            Err(DataError::MissingDescription(ref c)) if c == "height"
        ));

        desc.insert("height".to_string(), "height (cm)".to_string());
        desc.insert("unused".to_string(), "ignored".to_string());
        let annotated = AnnotatedTable::new(table(), &desc, "sample.id").unwrap();
        assert_eq!(annotated.description("height"), Some("height (cm)"));
        assert_eq!(annotated.descriptions().len(), 2);
        assert_eq!(annotated.sample_ids().unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn test_id_column_must_exist() {
        let mut desc = BTreeMap::new();
        desc.insert("sample.id".to_string(), "x".to_string());
        desc.insert("height".to_string(), "y".to_string());
        assert!(matches!(
            AnnotatedTable::new(table(), &desc, "subject"),
            Err(DataError::MissingColumn(_))
        ));
    }

    #[test]
    fn test_load_descriptions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("desc.json");
        std::fs::write(&path, r#"{"height": "height (cm)", "sex": "M or F"}"#).unwrap();
        let desc = load_descriptions(&path).unwrap();
        assert_eq!(desc.len(), 2);
        assert_eq!(desc["sex"], "M or F");

        std::fs::write(&path, "[1, 2]").unwrap();
        assert!(load_descriptions(&path).is_err());
    }
}
