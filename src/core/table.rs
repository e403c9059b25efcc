//! Immutable column table.
//!
//! Columns are shared between tables through `Arc`, so deriving a table with
//! extra or replaced columns copies no data and leaves the source table
//! usable. Row order never changes once a table is built.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use serde_json::{json, Map, Value};
use thiserror::Error;

use crate::align::Alignment;

#[derive(Error, Debug)]
pub enum TableError {
    #[error("Duplicate value '{value}' in column {column}")]
    DuplicateId { column: String, value: String },

    #[error("Tables do not share the same columns: {expected:?} vs {found:?}")]
    SchemaMismatch {
        expected: Vec<String>,
        found: Vec<String>,
    },

    #[error("Table already contains columns: {}", .0.join(", "))]
    ColumnCollision(Vec<String>),

    #[error("Duplicate column name: {0}")]
    DuplicateColumn(String),

    #[error("Missing required column: {0}")]
    MissingColumn(String),

    #[error("Column {column} holds {found} values, expected {expected}")]
    ColumnType {
        column: String,
        expected: ColumnKind,
        found: ColumnKind,
    },

    #[error("Column {column} has {found} rows, expected {expected}")]
    RowCount {
        column: String,
        expected: usize,
        found: usize,
    },

    #[error("Read {id}: sequence length {sequence} differs from quality length {qualities}")]
    LengthMismatch {
        id: String,
        sequence: usize,
        qualities: usize,
    },
}

/// Value type held by a column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKind {
    Bool,
    Int,
    Float,
    Text,
    Qualities,
    Alignment,
    List,
}

impl fmt::Display for ColumnKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Bool => "bool",
            Self::Int => "int",
            Self::Float => "float",
            Self::Text => "text",
            Self::Qualities => "qualities",
            Self::Alignment => "alignment",
            Self::List => "list",
        };
        write!(f, "{name}")
    }
}

/// Values of one column, one entry per row
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnData {
    Bool(Vec<bool>),
    Int(Vec<i64>),
    Float(Vec<f64>),
    Text(Vec<String>),
    Qualities(Vec<Vec<u8>>),
    Alignment(Vec<Option<Arc<Alignment>>>),
    List(Vec<Vec<String>>),
}

impl ColumnData {
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Bool(v) => v.len(),
            Self::Int(v) => v.len(),
            Self::Float(v) => v.len(),
            Self::Text(v) => v.len(),
            Self::Qualities(v) => v.len(),
            Self::Alignment(v) => v.len(),
            Self::List(v) => v.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn kind(&self) -> ColumnKind {
        match self {
            Self::Bool(_) => ColumnKind::Bool,
            Self::Int(_) => ColumnKind::Int,
            Self::Float(_) => ColumnKind::Float,
            Self::Text(_) => ColumnKind::Text,
            Self::Qualities(_) => ColumnKind::Qualities,
            Self::Alignment(_) => ColumnKind::Alignment,
            Self::List(_) => ColumnKind::List,
        }
    }

    /// Append the rows of `other`; returns false if the kinds differ
    fn extend_from(&mut self, other: &ColumnData) -> bool {
        match (self, other) {
            (Self::Bool(a), Self::Bool(b)) => a.extend_from_slice(b),
            (Self::Int(a), Self::Int(b)) => a.extend_from_slice(b),
            (Self::Float(a), Self::Float(b)) => a.extend_from_slice(b),
            (Self::Text(a), Self::Text(b)) => a.extend_from_slice(b),
            (Self::Qualities(a), Self::Qualities(b)) => a.extend_from_slice(b),
            (Self::Alignment(a), Self::Alignment(b)) => a.extend_from_slice(b),
            (Self::List(a), Self::List(b)) => a.extend_from_slice(b),
            _ => return false,
        }
        true
    }
}

/// A named column
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    name: String,
    data: ColumnData,
}

impl Column {
    pub fn new(name: impl Into<String>, data: ColumnData) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn data(&self) -> &ColumnData {
        &self.data
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[must_use]
    pub fn kind(&self) -> ColumnKind {
        self.data.kind()
    }

    fn type_error(&self, expected: ColumnKind) -> TableError {
        TableError::ColumnType {
            column: self.name.clone(),
            expected,
            found: self.kind(),
        }
    }

    /// # Errors
    ///
    /// Returns `TableError::ColumnType` if the column is not boolean.
    pub fn as_bools(&self) -> Result<&[bool], TableError> {
        match &self.data {
            ColumnData::Bool(v) => Ok(v),
            _ => Err(self.type_error(ColumnKind::Bool)),
        }
    }

    /// # Errors
    ///
    /// Returns `TableError::ColumnType` if the column is not integer.
    pub fn as_ints(&self) -> Result<&[i64], TableError> {
        match &self.data {
            ColumnData::Int(v) => Ok(v),
            _ => Err(self.type_error(ColumnKind::Int)),
        }
    }

    /// # Errors
    ///
    /// Returns `TableError::ColumnType` if the column is not floating point.
    pub fn as_floats(&self) -> Result<&[f64], TableError> {
        match &self.data {
            ColumnData::Float(v) => Ok(v),
            _ => Err(self.type_error(ColumnKind::Float)),
        }
    }

    /// # Errors
    ///
    /// Returns `TableError::ColumnType` if the column is not text.
    pub fn as_text(&self) -> Result<&[String], TableError> {
        match &self.data {
            ColumnData::Text(v) => Ok(v),
            _ => Err(self.type_error(ColumnKind::Text)),
        }
    }

    /// # Errors
    ///
    /// Returns `TableError::ColumnType` if the column does not hold qualities.
    pub fn as_qualities(&self) -> Result<&[Vec<u8>], TableError> {
        match &self.data {
            ColumnData::Qualities(v) => Ok(v),
            _ => Err(self.type_error(ColumnKind::Qualities)),
        }
    }

    /// # Errors
    ///
    /// Returns `TableError::ColumnType` if the column does not hold alignments.
    pub fn as_alignments(&self) -> Result<&[Option<Arc<Alignment>>], TableError> {
        match &self.data {
            ColumnData::Alignment(v) => Ok(v),
            _ => Err(self.type_error(ColumnKind::Alignment)),
        }
    }

    /// # Errors
    ///
    /// Returns `TableError::ColumnType` if the column does not hold lists.
    pub fn as_lists(&self) -> Result<&[Vec<String>], TableError> {
        match &self.data {
            ColumnData::List(v) => Ok(v),
            _ => Err(self.type_error(ColumnKind::List)),
        }
    }

    /// Render one cell for tab-separated output
    #[must_use]
    pub fn cell_text(&self, row: usize) -> String {
        match &self.data {
            ColumnData::Bool(v) => v[row].to_string(),
            ColumnData::Int(v) => v[row].to_string(),
            ColumnData::Float(v) => {
                if v[row].is_nan() {
                    "nan".to_string()
                } else {
                    v[row].to_string()
                }
            }
            ColumnData::Text(v) => v[row].clone(),
            ColumnData::Qualities(v) => join(v[row].iter()),
            ColumnData::Alignment(v) => v[row]
                .as_ref()
                .map_or_else(String::new, |a| a.summary()),
            ColumnData::List(v) => v[row].join(","),
        }
    }

    /// Render one cell for JSON output
    #[must_use]
    pub fn cell_json(&self, row: usize) -> Value {
        match &self.data {
            ColumnData::Bool(v) => json!(v[row]),
            ColumnData::Int(v) => json!(v[row]),
            ColumnData::Float(v) => json!(v[row]),
            ColumnData::Text(v) => json!(v[row]),
            ColumnData::Qualities(v) => json!(v[row]),
            ColumnData::Alignment(v) => v[row]
                .as_ref()
                .map_or(Value::Null, |a| json!(a.as_ref())),
            ColumnData::List(v) => json!(v[row]),
        }
    }
}

fn join<T: ToString>(values: impl Iterator<Item = T>) -> String {
    values.map(|v| v.to_string()).collect::<Vec<_>>().join(",")
}

/// Immutable table of equally long, uniquely named columns
#[derive(Debug, Clone, Default)]
pub struct Table {
    columns: Vec<Arc<Column>>,
    n_rows: usize,
}

impl Table {
    /// Build a table from columns.
    ///
    /// # Errors
    ///
    /// Returns `TableError::DuplicateColumn` if two columns share a name and
    /// `TableError::RowCount` if the columns differ in length.
    pub fn new(columns: Vec<Column>) -> Result<Self, TableError> {
        Self::default().with_columns(columns, false)
    }

    #[must_use]
    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    #[must_use]
    pub fn n_columns(&self) -> usize {
        self.columns.len()
    }

    #[must_use]
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name()).collect()
    }

    pub fn columns(&self) -> impl Iterator<Item = &Column> {
        self.columns.iter().map(AsRef::as_ref)
    }

    #[must_use]
    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name() == name)
    }

    /// # Errors
    ///
    /// Returns `TableError::MissingColumn` if there is no such column.
    pub fn column(&self, name: &str) -> Result<&Column, TableError> {
        self.columns
            .iter()
            .find(|c| c.name() == name)
            .map(AsRef::as_ref)
            .ok_or_else(|| TableError::MissingColumn(name.to_string()))
    }

    /// Text values of column `name`
    ///
    /// # Errors
    ///
    /// Returns an error if the column is missing or not text.
    pub fn text(&self, name: &str) -> Result<&[String], TableError> {
        self.column(name)?.as_text()
    }

    /// # Errors
    ///
    /// Returns an error if the column is missing or does not hold qualities.
    pub fn qualities(&self, name: &str) -> Result<&[Vec<u8>], TableError> {
        self.column(name)?.as_qualities()
    }

    /// # Errors
    ///
    /// Returns an error if the column is missing or not boolean.
    pub fn bools(&self, name: &str) -> Result<&[bool], TableError> {
        self.column(name)?.as_bools()
    }

    /// # Errors
    ///
    /// Returns an error if the column is missing or does not hold alignments.
    pub fn alignments(&self, name: &str) -> Result<&[Option<Arc<Alignment>>], TableError> {
        self.column(name)?.as_alignments()
    }

    /// Column names with their value kinds, in order
    #[must_use]
    pub fn schema(&self) -> Vec<(String, ColumnKind)> {
        self.columns
            .iter()
            .map(|c| (c.name().to_string(), c.kind()))
            .collect()
    }

    /// New table with `new` appended after the existing columns.
    ///
    /// With `overwrite`, existing columns sharing a name with a new column
    /// are dropped first, so the replacement lands at the end.
    ///
    /// # Errors
    ///
    /// Returns `TableError::ColumnCollision` if a name already exists and
    /// `overwrite` is false, `TableError::DuplicateColumn` if `new` repeats
    /// a name, and `TableError::RowCount` on a length mismatch.
    pub fn with_columns(&self, new: Vec<Column>, overwrite: bool) -> Result<Table, TableError> {
        let mut seen = HashSet::new();
        for column in &new {
            if !seen.insert(column.name()) {
                return Err(TableError::DuplicateColumn(column.name().to_string()));
            }
        }

        let collisions: Vec<String> = self
            .columns
            .iter()
            .filter(|c| seen.contains(c.name()))
            .map(|c| c.name().to_string())
            .collect();
        if !collisions.is_empty() && !overwrite {
            return Err(TableError::ColumnCollision(collisions));
        }

        let mut columns: Vec<Arc<Column>> = self
            .columns
            .iter()
            .filter(|c| !seen.contains(c.name()))
            .cloned()
            .collect();

        let n_rows = match (columns.first(), new.first()) {
            (Some(_), _) => self.n_rows,
            (None, Some(first)) => first.len(),
            (None, None) => 0,
        };

        for column in new {
            if column.len() != n_rows {
                return Err(TableError::RowCount {
                    column: column.name,
                    expected: n_rows,
                    found: column.data.len(),
                });
            }
            columns.push(Arc::new(column));
        }

        Ok(Table { columns, n_rows })
    }

    /// New table with the column of the same name swapped in at its
    /// existing position.
    ///
    /// # Errors
    ///
    /// Returns `TableError::MissingColumn` if no column has that name and
    /// `TableError::RowCount` on a length mismatch.
    pub fn replace_column(&self, column: Column) -> Result<Table, TableError> {
        let position = self
            .columns
            .iter()
            .position(|c| c.name() == column.name())
            .ok_or_else(|| TableError::MissingColumn(column.name().to_string()))?;

        if column.len() != self.n_rows {
            return Err(TableError::RowCount {
                column: column.name,
                expected: self.n_rows,
                found: column.data.len(),
            });
        }

        let mut columns = self.columns.clone();
        columns[position] = Arc::new(column);
        Ok(Table {
            columns,
            n_rows: self.n_rows,
        })
    }

    /// Stack tables that share one schema, preserving row order.
    ///
    /// # Errors
    ///
    /// Returns `TableError::SchemaMismatch` if any table's column names or
    /// kinds differ from the first table's.
    pub fn concat(tables: &[Table]) -> Result<Table, TableError> {
        let Some((first, rest)) = tables.split_first() else {
            return Ok(Table::default());
        };

        let expected = first.schema();
        for table in rest {
            let found = table.schema();
            if found != expected {
                return Err(TableError::SchemaMismatch {
                    expected: describe(&expected),
                    found: describe(&found),
                });
            }
        }

        let mut columns: Vec<Column> = first.columns().cloned().collect();
        for table in rest {
            for (column, other) in columns.iter_mut().zip(table.columns()) {
                if !column.data.extend_from(other.data()) {
                    return Err(column.type_error(other.kind()));
                }
            }
        }

        Table::new(columns)
    }

    /// One row as a JSON object keyed by column name
    #[must_use]
    pub fn row_json(&self, row: usize) -> Map<String, Value> {
        self.columns
            .iter()
            .map(|c| (c.name().to_string(), c.cell_json(row)))
            .collect()
    }
}

fn describe(schema: &[(String, ColumnKind)]) -> Vec<String> {
    schema
        .iter()
        .map(|(name, kind)| format!("{name}:{kind}"))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(name: &str, values: &[&str]) -> Column {
        Column::new(
            name,
            ColumnData::Text(values.iter().map(ToString::to_string).collect()),
        )
    }

    fn sample_table() -> Table {
        Table::new(vec![
            text("name", &["r1", "r2"]),
            Column::new("CCS_length", ColumnData::Int(vec![12, 14])),
        ])
        .unwrap()
    }

    #[test]
    fn test_new_rejects_ragged_columns() {
        let err = Table::new(vec![
            text("name", &["r1", "r2"]),
            Column::new("n", ColumnData::Int(vec![1])),
        ])
        .unwrap_err();
        assert!(matches!(err, TableError::RowCount { expected: 2, found: 1, .. }));
    }

    #[test]
    fn test_with_columns_is_non_destructive() {
        let table = sample_table();
        let extended = table
            .with_columns(vec![Column::new("flag", ColumnData::Bool(vec![true, false]))], false)
            .unwrap();

        assert_eq!(table.column_names(), vec!["name", "CCS_length"]);
        assert_eq!(extended.column_names(), vec!["name", "CCS_length", "flag"]);
        assert_eq!(extended.bools("flag").unwrap(), &[true, false]);
    }

    #[test]
    fn test_collision_requires_overwrite() {
        let table = sample_table();
        let replacement = Column::new("CCS_length", ColumnData::Int(vec![0, 0]));

        let err = table.with_columns(vec![replacement.clone()], false).unwrap_err();
        assert!(matches!(err, TableError::ColumnCollision(ref cols) if cols == &["CCS_length"]));

        let replaced = table.with_columns(vec![replacement], true).unwrap();
        assert_eq!(replaced.column_names(), vec!["name", "CCS_length"]);
        assert_eq!(replaced.column("CCS_length").unwrap().as_ints().unwrap(), &[0, 0]);
    }

    #[test]
    fn test_replace_column_keeps_position() {
        let table = sample_table();
        let replaced = table.replace_column(text("name", &["a", "b"])).unwrap();
        assert_eq!(replaced.column_names(), vec!["name", "CCS_length"]);
        assert_eq!(replaced.text("name").unwrap(), &["a", "b"]);
        assert_eq!(table.text("name").unwrap(), &["r1", "r2"]);
    }

    #[test]
    fn test_concat() {
        let a = sample_table();
        let b = Table::new(vec![
            text("name", &["r3"]),
            Column::new("CCS_length", ColumnData::Int(vec![9])),
        ])
        .unwrap();

        let both = Table::concat(&[a, b]).unwrap();
        assert_eq!(both.n_rows(), 3);
        assert_eq!(both.text("name").unwrap(), &["r1", "r2", "r3"]);
    }

    #[test]
    fn test_concat_schema_mismatch() {
        let a = sample_table();
        let b = Table::new(vec![text("name", &["r3"])]).unwrap();
        assert!(matches!(
            Table::concat(&[a, b]),
            Err(TableError::SchemaMismatch { .. })
        ));
    }

    #[test]
    fn test_type_error() {
        let table = sample_table();
        assert!(matches!(
            table.text("CCS_length"),
            Err(TableError::ColumnType { expected: ColumnKind::Text, found: ColumnKind::Int, .. })
        ));
        assert!(matches!(table.text("missing"), Err(TableError::MissingColumn(_))));
    }

    #[test]
    fn test_cell_rendering() {
        let column = Column::new("acc", ColumnData::Float(vec![f64::NAN, 0.5]));
        assert_eq!(column.cell_text(0), "nan");
        assert_eq!(column.cell_text(1), "0.5");
        assert_eq!(column.cell_json(0), Value::Null);

        let quals = Column::new("q", ColumnData::Qualities(vec![vec![30, 20]]));
        assert_eq!(quals.cell_text(0), "30,20");
        assert_eq!(quals.cell_json(0), json!([30, 20]));
    }
}
