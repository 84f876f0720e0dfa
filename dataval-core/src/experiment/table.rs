//! Experiment outputs and the flattened per-evaluator result table.

use crate::data::csv::{escape_field, split_line};
use crate::error::DatavalError;
use crate::persistence::atomic_write;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Label column of every written table.
pub const EVALUATOR_COLUMN: &str = "evaluator";

/// Named, equal-length float columns produced by one experiment method for
/// one evaluator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExperimentOutput {
    columns: Vec<(String, Vec<f64>)>,
}

impl ExperimentOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_column(mut self, name: impl Into<String>, values: Vec<f64>) -> Self {
        self.columns.push((name.into(), values));
        self
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|(n, _)| n.as_str()).collect()
    }

    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.columns
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_slice())
    }

    /// Row count; errors when columns disagree.
    pub fn len(&self) -> Result<usize, DatavalError> {
        let len = self.columns.first().map_or(0, |(_, v)| v.len());
        if let Some((name, v)) = self.columns.iter().find(|(_, v)| v.len() != len) {
            return Err(DatavalError::invalid_input(format!(
                "column '{name}' has {} rows, expected {len}",
                v.len()
            )));
        }
        Ok(len)
    }

    pub fn is_empty(&self) -> bool {
        self.columns.iter().all(|(_, v)| v.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRow {
    pub evaluator: String,
    pub values: Vec<f64>,
}

/// Rows keyed by evaluator identity with named float columns.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultTable {
    pub columns: Vec<String>,
    pub rows: Vec<ResultRow>,
}

impl ResultTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Explode `output` into one row per position under `evaluator`.
    ///
    /// The first appended output fixes the column set.
    pub fn append(&mut self, evaluator: &str, output: &ExperimentOutput) -> Result<(), DatavalError> {
        let names = output.column_names();
        if self.columns.is_empty() && self.rows.is_empty() {
            self.columns = names.iter().map(|s| s.to_string()).collect();
        } else if self.columns != names {
            return Err(DatavalError::invalid_input(format!(
                "columns {names:?} do not match table columns {:?}",
                self.columns
            )));
        }
        for r in 0..output.len()? {
            self.rows.push(ResultRow {
                evaluator: evaluator.to_string(),
                values: output.columns.iter().map(|(_, v)| v[r]).collect(),
            });
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Distinct evaluator identities in first-seen order.
    pub fn evaluators(&self) -> Vec<&str> {
        let mut seen: Vec<&str> = Vec::new();
        for row in &self.rows {
            if !seen.contains(&row.evaluator.as_str()) {
                seen.push(&row.evaluator);
            }
        }
        seen
    }

    /// Values of `column` for the rows of one evaluator.
    pub fn column_for(&self, evaluator: &str, column: &str) -> Option<Vec<f64>> {
        let c = self.columns.iter().position(|n| n == column)?;
        Some(
            self.rows
                .iter()
                .filter(|r| r.evaluator == evaluator)
                .map(|r| r.values[c])
                .collect(),
        )
    }

    pub fn to_csv(&self) -> String {
        let mut out = String::new();
        out.push_str(EVALUATOR_COLUMN);
        for column in &self.columns {
            out.push(',');
            out.push_str(&escape_field(column, ','));
        }
        out.push('\n');
        for row in &self.rows {
            out.push_str(&escape_field(&row.evaluator, ','));
            for v in &row.values {
                out.push(',');
                out.push_str(&v.to_string());
            }
            out.push('\n');
        }
        out
    }

    pub fn from_csv(content: &str) -> Result<Self, DatavalError> {
        let mut lines = content.lines().filter(|l| !l.trim().is_empty());
        let header = lines
            .next()
            .ok_or_else(|| DatavalError::invalid_input("empty result table"))?;
        let mut header = split_line(header, ',');
        if header.first().map(String::as_str) != Some(EVALUATOR_COLUMN) {
            return Err(DatavalError::invalid_input(format!(
                "result table must start with an '{EVALUATOR_COLUMN}' column"
            )));
        }
        header.remove(0);

        let mut table = Self {
            columns: header,
            rows: Vec::new(),
        };
        for (line_no, line) in lines.enumerate() {
            let mut fields = split_line(line, ',');
            if fields.len() != table.columns.len() + 1 {
                return Err(DatavalError::invalid_input(format!(
                    "row {} has {} fields, expected {}",
                    line_no + 1,
                    fields.len(),
                    table.columns.len() + 1
                )));
            }
            let evaluator = fields.remove(0);
            let values = fields
                .iter()
                .map(|f| {
                    f.parse::<f64>().map_err(|_| {
                        DatavalError::invalid_input(format!("non-numeric value '{f}'"))
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            table.rows.push(ResultRow { evaluator, values });
        }
        Ok(table)
    }

    /// Write as CSV, atomically, creating parent directories.
    pub fn write_csv(&self, path: &Path) -> Result<(), DatavalError> {
        atomic_write(path, self.to_csv().as_bytes())?;
        tracing::debug!(path = %path.display(), rows = self.len(), "Wrote result table");
        Ok(())
    }
}

/// Read a table previously written by `save_data_values` or `evaluate`.
pub fn load_mediator_output(path: &Path) -> Result<ResultTable, DatavalError> {
    if !path.exists() {
        return Err(DatavalError::not_found(format!(
            "result table {}",
            path.display()
        )));
    }
    ResultTable::from_csv(&std::fs::read_to_string(path)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn values(indices: &[f64], data: &[f64]) -> ExperimentOutput {
        ExperimentOutput::new()
            .with_column("indices", indices.to_vec())
            .with_column("data_values", data.to_vec())
    }

    #[test]
    fn test_append_explodes_rows() {
        let mut table = ResultTable::new();
        table.append("RandomEvaluator", &values(&[4.0, 9.0], &[0.1, 0.2])).unwrap();
        table
            .append("BetaShapley(alpha=4,beta=1)", &values(&[4.0, 9.0], &[-0.5, 0.5]))
            .unwrap();
        assert_eq!(table.len(), 4);
        assert_eq!(
            table.evaluators(),
            vec!["RandomEvaluator", "BetaShapley(alpha=4,beta=1)"]
        );
        assert_eq!(
            table.column_for("BetaShapley(alpha=4,beta=1)", "data_values"),
            Some(vec![-0.5, 0.5])
        );
    }

    #[test]
    fn test_mismatched_columns_rejected() {
        let mut table = ResultTable::new();
        table.append("A", &values(&[0.0], &[1.0])).unwrap();
        let other = ExperimentOutput::new().with_column("kmeans_f1", vec![0.5]);
        assert!(table.append("B", &other).is_err());
        let ragged = ExperimentOutput::new()
            .with_column("indices", vec![0.0, 1.0])
            .with_column("data_values", vec![1.0]);
        assert!(table.append("C", &ragged).is_err());
    }

    #[test]
    fn test_write_and_load_preserves_identities_with_commas() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out").join("save_dataval.csv");
        let mut table = ResultTable::new();
        table
            .append("BetaShapley(alpha=4,beta=1)", &values(&[3.0, 1.0], &[0.25, -1.5]))
            .unwrap();
        table.write_csv(&path).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("evaluator,indices,data_values\n"));
        assert_eq!(load_mediator_output(&path).unwrap(), table);
    }

    #[test]
    fn test_load_missing_is_not_found() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            load_mediator_output(&dir.path().join("nope.csv")),
            Err(DatavalError::NotFound(_))
        ));
    }

    #[test]
    fn test_from_csv_rejects_bad_rows() {
        assert!(ResultTable::from_csv("").is_err());
        assert!(ResultTable::from_csv("name,x\nA,1\n").is_err());
        assert!(ResultTable::from_csv("evaluator,x\nA,1,2\n").is_err());
        assert!(ResultTable::from_csv("evaluator,x\nA,abc\n").is_err());
    }
}
