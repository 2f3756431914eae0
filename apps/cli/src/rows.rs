//! JSON input rows.

use std::collections::BTreeSet;
use std::path::Path;

use serde_json::{Map, Value};

use fieldmap_mapping::Row;
use fieldmap_shared::{FieldMapError, Result};

/// Load a JSON array of objects.
pub(crate) fn load_rows(path: &Path) -> Result<Vec<Map<String, Value>>> {
    let raw = std::fs::read_to_string(path).map_err(|e| FieldMapError::io(path, e))?;
    parse_rows(&raw)
}

pub(crate) fn parse_rows(raw: &str) -> Result<Vec<Map<String, Value>>> {
    let values: Vec<Value> = serde_json::from_str(raw)
        .map_err(|e| FieldMapError::parse(format!("rows must be a JSON array: {e}")))?;

    values
        .into_iter()
        .enumerate()
        .map(|(i, value)| match value {
            Value::Object(object) => Ok(object),
            other => Err(FieldMapError::parse(format!(
                "row {i} is not an object: {other}"
            ))),
        })
        .collect()
}

/// One JSON object viewed as a query row. `null` is a null column and
/// scalars are stringified.
pub(crate) struct JsonRow<'a> {
    object: &'a Map<String, Value>,
}

impl<'a> JsonRow<'a> {
    pub(crate) fn new(object: &'a Map<String, Value>) -> Self {
        Self { object }
    }
}

impl Row for JsonRow<'_> {
    fn column_names(&self) -> Result<BTreeSet<String>> {
        Ok(self.object.keys().cloned().collect())
    }

    fn get_string(&self, column: &str) -> Result<Option<String>> {
        match self.object.get(column) {
            None => Err(FieldMapError::data_access(column, "no such column")),
            Some(Value::Null) => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.clone())),
            Some(scalar @ (Value::Bool(_) | Value::Number(_))) => Ok(Some(scalar.to_string())),
            Some(Value::Array(_) | Value::Object(_)) => Err(FieldMapError::data_access(
                column,
                "nested JSON values are not supported",
            )),
        }
    }
}
