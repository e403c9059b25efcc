//! Centralized validation of annotator inputs.
//!
//! Every check here guards a fatal condition: the annotators call them
//! before doing any per-row work so a bad table fails fast.

use std::collections::HashSet;

use crate::core::table::{Table, TableError};

/// Check that every value of a text column is distinct.
///
/// # Errors
///
/// Returns `TableError::DuplicateId` naming the first repeated value, or an
/// error if the column is missing or not text.
pub fn ensure_unique(table: &Table, column: &str) -> Result<(), TableError> {
    let mut seen = HashSet::with_capacity(table.n_rows());
    for value in table.text(column)? {
        if !seen.insert(value.as_str()) {
            return Err(TableError::DuplicateId {
                column: column.to_string(),
                value: value.clone(),
            });
        }
    }
    Ok(())
}

/// Check that none of `new_columns` already exists in `table` unless
/// overwriting is allowed, and that `new_columns` has no repeats.
///
/// # Examples
///
/// ```
/// use ccs_match::core::table::{Column, ColumnData, Table};
/// use ccs_match::utils::validation::ensure_no_collisions;
///
/// let table = Table::new(vec![Column::new("name", ColumnData::Text(vec!["r1".into()]))]).unwrap();
/// assert!(ensure_no_collisions(&table, &["matched".to_string()], false).is_ok());
/// assert!(ensure_no_collisions(&table, &["name".to_string()], false).is_err());
/// assert!(ensure_no_collisions(&table, &["name".to_string()], true).is_ok());
/// ```
///
/// # Errors
///
/// Returns `TableError::ColumnCollision` listing the clashing names, or
/// `TableError::DuplicateColumn` for a repeated new name.
pub fn ensure_no_collisions(
    table: &Table,
    new_columns: &[String],
    overwrite: bool,
) -> Result<(), TableError> {
    let mut seen = HashSet::with_capacity(new_columns.len());
    for name in new_columns {
        if !seen.insert(name.as_str()) {
            return Err(TableError::DuplicateColumn(name.clone()));
        }
    }

    if overwrite {
        return Ok(());
    }

    let collisions: Vec<String> = new_columns
        .iter()
        .filter(|name| table.has_column(name))
        .cloned()
        .collect();
    if collisions.is_empty() {
        Ok(())
    } else {
        Err(TableError::ColumnCollision(collisions))
    }
}

/// Check that `table` has a column called `column`.
///
/// # Errors
///
/// Returns `TableError::MissingColumn` otherwise.
pub fn ensure_column(table: &Table, column: &str) -> Result<(), TableError> {
    if table.has_column(column) {
        Ok(())
    } else {
        Err(TableError::MissingColumn(column.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::table::{Column, ColumnData};

    fn names(values: &[&str]) -> Table {
        Table::new(vec![Column::new(
            "name",
            ColumnData::Text(values.iter().map(ToString::to_string).collect()),
        )])
        .unwrap()
    }

    #[test]
    fn test_ensure_unique() {
        assert!(ensure_unique(&names(&["a", "b"]), "name").is_ok());
        assert!(matches!(
            ensure_unique(&names(&["a", "b", "a"]), "name"),
            Err(TableError::DuplicateId { value, .. }) if value == "a"
        ));
        assert!(matches!(
            ensure_unique(&names(&["a"]), "id"),
            Err(TableError::MissingColumn(_))
        ));
    }

    #[test]
    fn test_ensure_no_collisions() {
        let table = names(&["a"]);
        let new = vec!["name".to_string(), "flag".to_string()];

        assert!(matches!(
            ensure_no_collisions(&table, &new, false),
            Err(TableError::ColumnCollision(cols)) if cols == vec!["name".to_string()]
        ));
        assert!(ensure_no_collisions(&table, &new, true).is_ok());

        let repeated = vec!["flag".to_string(), "flag".to_string()];
        assert!(matches!(
            ensure_no_collisions(&table, &repeated, true),
            Err(TableError::DuplicateColumn(_))
        ));
    }

    #[test]
    fn test_ensure_column() {
        let table = names(&["a"]);
        assert!(ensure_column(&table, "name").is_ok());
        assert!(ensure_column(&table, "CCS_qvals").is_err());
    }
}
