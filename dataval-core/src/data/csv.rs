//! Minimal CSV frame: parsing, dummy encoding, conversion to covariates and labels.

use crate::data::matrix::Matrix;
use crate::error::DatavalError;
use std::collections::{BTreeMap, BTreeSet};

/// A string-typed table parsed from CSV.
#[derive(Debug, Clone, Default)]
pub struct Frame {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Frame {
    /// Parse CSV text. Without a header, columns are named `0..n`.
    pub fn parse(content: &str, delimiter: char, has_header: bool) -> Result<Self, DatavalError> {
        let mut lines = content.lines().filter(|l| !l.trim().is_empty());
        let mut rows: Vec<Vec<String>> = Vec::new();

        let columns = if has_header {
            let header = lines
                .next()
                .ok_or_else(|| DatavalError::dataset("Empty CSV file"))?;
            split_line(header, delimiter)
        } else {
            Vec::new()
        };

        for line in lines {
            rows.push(split_line(line, delimiter));
        }

        let columns = if has_header {
            columns
        } else {
            let width = rows.first().map(|r| r.len()).unwrap_or(0);
            (0..width).map(|i| i.to_string()).collect()
        };

        for (i, row) in rows.iter().enumerate() {
            if row.len() != columns.len() {
                return Err(DatavalError::dataset(format!(
                    "CSV row {} has {} fields, expected {}",
                    i + 1,
                    row.len(),
                    columns.len()
                )));
            }
        }

        Ok(Self { columns, rows })
    }

    /// Append the rows of another frame with the same width.
    pub fn concat(mut self, other: Frame) -> Result<Self, DatavalError> {
        if other.columns.len() != self.columns.len() {
            return Err(DatavalError::dataset(format!(
                "cannot concatenate frames with {} and {} columns",
                self.columns.len(),
                other.columns.len()
            )));
        }
        self.rows.extend(other.rows);
        Ok(self)
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Resolve a column by name, or by position (negative counts from the end).
    pub fn column_index(&self, column: &str) -> Result<usize, DatavalError> {
        if let Some(idx) = self.columns.iter().position(|c| c == column) {
            return Ok(idx);
        }
        if let Ok(pos) = column.parse::<i64>() {
            let width = self.columns.len() as i64;
            let idx = if pos < 0 { width + pos } else { pos };
            if (0..width).contains(&idx) {
                return Ok(idx as usize);
            }
        }
        Err(DatavalError::not_found(format!("CSV column '{column}'")))
    }

    /// Split into covariates and labels.
    ///
    /// Numeric columns are kept as-is; any column holding a non-numeric value is
    /// dummy encoded with one indicator per distinct value (sorted). Labels that
    /// all parse as non-negative integers are used directly, otherwise distinct
    /// label strings are coded in sorted order.
    pub fn into_covariates_and_labels(
        self,
        label_column: &str,
    ) -> Result<(Matrix, Vec<usize>), DatavalError> {
        let label_idx = self.column_index(label_column)?;
        let labels = encode_labels(self.rows.iter().map(|r| r[label_idx].as_str()))?;

        let mut features: Vec<Vec<f64>> = vec![Vec::new(); self.rows.len()];
        for col in 0..self.columns.len() {
            if col == label_idx {
                continue;
            }
            let parsed: Option<Vec<f64>> = self
                .rows
                .iter()
                .map(|r| r[col].parse::<f64>().ok())
                .collect();
            match parsed {
                Some(values) => {
                    for (row, v) in features.iter_mut().zip(values) {
                        row.push(v);
                    }
                }
                None => {
                    let categories: BTreeSet<&str> =
                        self.rows.iter().map(|r| r[col].as_str()).collect();
                    for category in categories {
                        for (row, src) in features.iter_mut().zip(&self.rows) {
                            row.push(if src[col] == category { 1.0 } else { 0.0 });
                        }
                    }
                }
            }
        }

        Ok((Matrix::from_rows(&features)?, labels))
    }
}

/// Split one record. Fields wrapped in double quotes may contain the
/// delimiter; `""` inside a quoted field is a literal quote.
pub(crate) fn split_line(line: &str, delimiter: char) -> Vec<String> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut quoted = false;
    let mut chars = line.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '"' if quoted && chars.peek() == Some(&'"') => {
                field.push('"');
                chars.next();
            }
            '"' => quoted = !quoted,
            c if c == delimiter && !quoted => {
                fields.push(field.trim().to_string());
                field.clear();
            }
            c => field.push(c),
        }
    }
    fields.push(field.trim().to_string());
    fields
}

/// Quote a field for writing when it contains the delimiter or a quote.
pub(crate) fn escape_field(field: &str, delimiter: char) -> String {
    if field.contains(delimiter) || field.contains('"') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

fn encode_labels<'a>(values: impl Iterator<Item = &'a str>) -> Result<Vec<usize>, DatavalError> {
    let raw: Vec<&str> = values.collect();
    let numeric: Option<Vec<usize>> = raw.iter().map(|v| v.parse::<usize>().ok()).collect();
    if let Some(labels) = numeric {
        return Ok(labels);
    }
    let codes: BTreeMap<&str, usize> = raw
        .iter()
        .copied()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .enumerate()
        .map(|(i, v)| (v, i))
        .collect();
    Ok(raw.iter().map(|v| codes[v]).collect())
}
