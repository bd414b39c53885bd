//! Untyped tables as handed over by a dataset loader

use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Read;

use crate::error::CoreError;

/// Which source dataset a table comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatasetKind {
    /// Suggestion/usage events
    Suggestions,
    /// Sales per unit and month
    Sales,
}

impl DatasetKind {
    /// File-name suffix, e.g. `trixeo_suggestions.csv`
    pub fn slug(&self) -> &'static str {
        match self {
            DatasetKind::Suggestions => "suggestions",
            DatasetKind::Sales => "sales",
        }
    }
}

impl fmt::Display for DatasetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

/// Columnar source table: a header row plus string cells
#[derive(Debug, Clone)]
pub struct RawTable {
    kind: DatasetKind,
    headers: Vec<String>,
    rows: Vec<csv::StringRecord>,
}

impl RawTable {
    /// Parse CSV with a header row
    pub fn from_csv<R: Read>(kind: DatasetKind, source_name: &str, reader: R) -> Result<Self, CoreError> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(false)
            .from_reader(reader);

        let csv_err = |source| CoreError::CsvParse {
            source_name: source_name.to_string(),
            source,
        };

        let headers = csv_reader
            .headers()
            .map_err(csv_err)?
            .iter()
            .map(|h| h.to_string())
            .collect();

        let rows = csv_reader
            .records()
            .collect::<Result<Vec<_>, _>>()
            .map_err(csv_err)?;

        tracing::debug!("Parsed {} {} rows from {}", rows.len(), kind, source_name);

        Ok(Self { kind, headers, rows })
    }

    /// Build a table from in-memory rows (fixtures, other loaders)
    pub fn from_rows<S: AsRef<str>>(kind: DatasetKind, headers: &[&str], rows: Vec<Vec<S>>) -> Self {
        Self {
            kind,
            headers: headers.iter().map(|h| h.to_string()).collect(),
            rows: rows
                .iter()
                .map(|row| row.iter().map(|cell| cell.as_ref()).collect())
                .collect(),
        }
    }

    pub fn kind(&self) -> DatasetKind {
        self.kind
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn rows(&self) -> &[csv::StringRecord] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of a required column
    pub fn column_index(&self, column: &str) -> Result<usize, CoreError> {
        self.headers
            .iter()
            .position(|h| h == column)
            .ok_or_else(|| CoreError::MissingColumn {
                dataset: self.kind,
                column: column.to_string(),
            })
    }

    /// Resolve every required column up front so schema errors surface before any row is read
    pub fn require_columns(&self, columns: &[&str]) -> Result<Vec<usize>, CoreError> {
        columns.iter().map(|c| self.column_index(c)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_csv_trims_cells() {
        let data = "brick, sales\nB1 , 10\nB2,20\n";
        let table = RawTable::from_csv(DatasetKind::Sales, "inline", data.as_bytes()).unwrap();
        assert_eq!(table.headers(), &["brick".to_string(), "sales".to_string()]);
        assert_eq!(table.len(), 2);
        assert_eq!(&table.rows()[0][0], "B1");
    }

    #[test]
    fn test_ragged_csv_is_rejected() {
        let data = "brick,sales\nB1,10,extra\n";
        let result = RawTable::from_csv(DatasetKind::Sales, "inline", data.as_bytes());
        assert!(matches!(result, Err(CoreError::CsvParse { .. })));
    }

    #[test]
    fn test_missing_column_names_dataset() {
        let table = RawTable::from_rows(DatasetKind::Suggestions, &["brick"], vec![vec!["B1"]]);
        let err = table.require_columns(&["brick", "month"]).unwrap_err();
        match err {
            CoreError::MissingColumn { dataset, column } => {
                assert_eq!(dataset, DatasetKind::Suggestions);
                assert_eq!(column, "month");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
