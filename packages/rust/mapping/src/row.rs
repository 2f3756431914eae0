//! Query result rows as seen by the mapper.

use std::collections::BTreeSet;

use fieldmap_shared::{FieldMapError, Result};

/// One query result, addressable by column label.
///
/// Both accessors may fail; a failure aborts the row being mapped.
pub trait Row {
    /// Column labels available in this row.
    fn column_names(&self) -> Result<BTreeSet<String>>;

    /// Value of `column`, `None` for SQL `NULL`.
    fn get_string(&self, column: &str) -> Result<Option<String>>;
}

/// In-memory row holding labelled, nullable string values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordRow {
    columns: Vec<(String, Option<String>)>,
}

impl RecordRow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a column. With duplicate labels the first column wins on lookup.
    pub fn with(mut self, column: impl Into<String>, value: Option<impl Into<String>>) -> Self {
        self.columns.push((column.into(), value.map(Into::into)));
        self
    }

    /// Add a non-null column.
    pub fn with_value(self, column: impl Into<String>, value: impl Into<String>) -> Self {
        self.with(column, Some(value))
    }

    /// Add a `NULL` column.
    pub fn with_null(self, column: impl Into<String>) -> Self {
        self.with(column, None::<String>)
    }
}

impl Row for RecordRow {
    fn column_names(&self) -> Result<BTreeSet<String>> {
        Ok(self.columns.iter().map(|(name, _)| name.clone()).collect())
    }

    fn get_string(&self, column: &str) -> Result<Option<String>> {
        self.columns
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value.clone())
            .ok_or_else(|| FieldMapError::data_access(column, "no such column"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_row_lookup() {
        let row = RecordRow::new().with_value("id", "7").with_null("note");
        assert_eq!(row.get_string("id").unwrap().as_deref(), Some("7"));
        assert_eq!(row.get_string("note").unwrap(), None);
        assert!(row.get_string("missing").is_err());
    }

    #[test]
    fn column_names_are_case_sensitive() {
        let row = RecordRow::new().with_value("Title", "x");
        let names = row.column_names().unwrap();
        assert!(names.contains("Title"));
        assert!(!names.contains("title"));
    }
}
