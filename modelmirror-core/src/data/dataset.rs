//! In-memory tabular dataset.

use crate::data::value::{ColumnKind, Label, Value};
use crate::error::{AuditError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// A named column of cell values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub values: Vec<Value>,
}

impl Column {
    pub fn new(name: impl Into<String>, values: Vec<Value>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }

    /// Convenience constructor for numeric columns.
    pub fn numeric(name: impl Into<String>, values: impl IntoIterator<Item = f64>) -> Self {
        Self::new(name, values.into_iter().map(Value::Number).collect())
    }

    /// Convenience constructor for text columns.
    pub fn text<S: Into<String>>(name: impl Into<String>, values: impl IntoIterator<Item = S>) -> Self {
        Self::new(
            name,
            values.into_iter().map(|s| Value::Text(s.into())).collect(),
        )
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn kind(&self) -> ColumnKind {
        ColumnKind::infer(&self.values)
    }

    pub fn null_count(&self) -> usize {
        self.values.iter().filter(|v| v.is_null()).count()
    }

    pub fn unique_count(&self) -> usize {
        self.labels().into_iter().collect::<HashSet<_>>().len()
    }

    /// Numeric view of the column; `None` for missing or non-numeric cells.
    pub fn numeric_values(&self) -> Vec<Option<f64>> {
        self.values.iter().map(Value::as_f64).collect()
    }

    /// Label view of the column, used for targets and group attributes.
    pub fn labels(&self) -> Vec<Label> {
        self.values.iter().map(Label::from).collect()
    }
}

/// An ordered collection of equally long, uniquely named columns.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    columns: Vec<Column>,
}

impl Dataset {
    /// Build a dataset, checking that names are unique and lengths agree.
    pub fn new(columns: Vec<Column>) -> Result<Self> {
        let mut seen = HashSet::new();
        for column in &columns {
            if !seen.insert(column.name.as_str()) {
                return Err(AuditError::dataset(format!(
                    "Duplicate column name '{}'",
                    column.name
                )));
            }
        }
        if let Some(first) = columns.first() {
            let expected = first.len();
            if let Some(bad) = columns.iter().find(|c| c.len() != expected) {
                return Err(AuditError::dataset(format!(
                    "Column '{}' has {} rows, expected {}",
                    bad.name,
                    bad.len(),
                    expected
                )));
            }
        }
        Ok(Self { columns })
    }

    /// Build a dataset from a header and row-major cells. Short rows are
    /// padded with nulls; long rows are rejected.
    pub fn from_rows(headers: Vec<String>, rows: Vec<Vec<Value>>) -> Result<Self> {
        let width = headers.len();
        let mut columns: Vec<Vec<Value>> = vec![Vec::with_capacity(rows.len()); width];
        for (i, row) in rows.into_iter().enumerate() {
            if row.len() > width {
                return Err(AuditError::dataset(format!(
                    "Row {} has {} fields but the header has {}",
                    i + 1,
                    row.len(),
                    width
                )));
            }
            let mut cells = row.into_iter();
            for column in columns.iter_mut() {
                column.push(cells.next().unwrap_or(Value::Null));
            }
        }
        Self::new(
            headers
                .into_iter()
                .zip(columns)
                .map(|(name, values)| Column::new(name, values))
                .collect(),
        )
    }

    pub fn n_rows(&self) -> usize {
        self.columns.first().map_or(0, Column::len)
    }

    pub fn n_cols(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.n_rows() == 0 || self.columns.is_empty()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }

    pub fn column(&self, name: &str) -> Result<&Column> {
        self.columns
            .iter()
            .find(|c| c.name == name)
            .ok_or_else(|| AuditError::column_not_found(name))
    }

    /// Cells of row `index` in column order.
    pub fn row(&self, index: usize) -> Vec<&Value> {
        self.columns.iter().map(|c| &c.values[index]).collect()
    }

    /// New dataset with only the named columns, in the given order.
    pub fn select<S: AsRef<str>>(&self, names: &[S]) -> Result<Self> {
        let columns = names
            .iter()
            .map(|n| self.column(n.as_ref()).cloned())
            .collect::<Result<Vec<_>>>()?;
        Self::new(columns)
    }

    /// New dataset without the named column. Unknown names are ignored.
    pub fn without(&self, name: &str) -> Self {
        Self {
            columns: self
                .columns
                .iter()
                .filter(|c| c.name != name)
                .cloned()
                .collect(),
        }
    }

    /// New dataset with the rows at `indices`, in that order.
    pub fn take_rows(&self, indices: &[usize]) -> Self {
        Self {
            columns: self
                .columns
                .iter()
                .map(|c| Column::new(c.name.clone(), indices.iter().map(|&i| c.values[i].clone()).collect()))
                .collect(),
        }
    }

    /// New dataset with the first `n` rows.
    pub fn head(&self, n: usize) -> Self {
        let indices: Vec<usize> = (0..n.min(self.n_rows())).collect();
        self.take_rows(&indices)
    }

    /// New dataset where `name` holds `values` instead.
    pub fn with_column_replaced(&self, name: &str, values: Vec<Value>) -> Result<Self> {
        if values.len() != self.n_rows() {
            return Err(AuditError::dataset(format!(
                "Replacement for '{}' has {} rows, expected {}",
                name,
                values.len(),
                self.n_rows()
            )));
        }
        let mut replaced = false;
        let columns = self
            .columns
            .iter()
            .map(|c| {
                if c.name == name {
                    replaced = true;
                    Column::new(name, values.clone())
                } else {
                    c.clone()
                }
            })
            .collect();
        if !replaced {
            return Err(AuditError::column_not_found(name));
        }
        Ok(Self { columns })
    }

    /// Names of the numeric (including boolean) columns in column order.
    pub fn numeric_column_names(&self) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|c| c.kind().is_numeric())
            .map(|c| c.name.as_str())
            .collect()
    }

    /// Label view of a column.
    pub fn labels(&self, name: &str) -> Result<Vec<Label>> {
        Ok(self.column(name)?.labels())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Dataset {
        Dataset::new(vec![
            Column::numeric("age", [25.0, 30.0, 35.0]),
            Column::text("sex", ["F", "M", "F"]),
            Column::numeric("target", [0.0, 1.0, 1.0]),
        ])
        .unwrap()
    }

    #[test]
    fn test_rejects_duplicate_names() {
        let result = Dataset::new(vec![
            Column::numeric("a", [1.0]),
            Column::numeric("a", [2.0]),
        ]);
        assert!(matches!(result, Err(AuditError::Dataset(_))));
    }

    #[test]
    fn test_rejects_ragged_columns() {
        let result = Dataset::new(vec![
            Column::numeric("a", [1.0, 2.0]),
            Column::numeric("b", [2.0]),
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_from_rows_pads_short_rows() {
        let ds = Dataset::from_rows(
            vec!["a".into(), "b".into()],
            vec![vec![Value::Number(1.0)], vec![Value::Number(2.0), Value::Bool(true)]],
        )
        .unwrap();
        assert_eq!(ds.n_rows(), 2);
        assert_eq!(ds.column("b").unwrap().values[0], Value::Null);
    }

    #[test]
    fn test_select_and_without() {
        let ds = sample();
        let selected = ds.select(&["target", "age"]).unwrap();
        assert_eq!(selected.column_names(), vec!["target", "age"]);
        assert!(matches!(
            ds.select(&["missing"]),
            Err(AuditError::ColumnNotFound(_))
        ));
        assert_eq!(ds.without("sex").column_names(), vec!["age", "target"]);
    }

    #[test]
    fn test_numeric_columns_skip_text() {
        assert_eq!(sample().numeric_column_names(), vec!["age", "target"]);
    }

    #[test]
    fn test_take_rows_and_replace() {
        let ds = sample();
        let taken = ds.take_rows(&[2, 0]);
        assert_eq!(
            taken.column("age").unwrap().values,
            vec![Value::Number(35.0), Value::Number(25.0)]
        );
        let replaced = ds
            .with_column_replaced("age", vec![Value::Null; 3])
            .unwrap();
        assert_eq!(replaced.column("age").unwrap().null_count(), 3);
        assert!(ds.with_column_replaced("age", vec![]).is_err());
    }
}
