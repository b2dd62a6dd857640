use serde::{Deserialize, Serialize};

use super::value::Value;

/// One result row: ordered column names plus the values in the same order.
/// Column order is the driver's projection order, so callers iterating a
/// `Row` observe the columns as the statement selected them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Row {
    pub columns: Vec<String>,
    pub values: Vec<Value>,
}

impl Row {
    #[must_use]
    pub fn new(columns: Vec<String>, values: Vec<Value>) -> Self {
        Self { columns, values }
    }

    /// Single-column convenience used by scalar results.
    #[must_use]
    pub fn scalar(value: Value) -> Self {
        Self {
            columns: vec!["value".to_string()],
            values: vec![value],
        }
    }

    #[must_use]
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|c| c == column)
            .map(|i| &self.values[i])
    }

    /// First column of the row, for single-value results.
    #[must_use]
    pub fn first(&self) -> Option<&Value> {
        self.values.first()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// JSON object view of the row, used by the typed mapping path.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        let mut object = serde_json::Map::new();
        for (column, value) in self.columns.iter().zip(&self.values) {
            object.insert(column.clone(), value.to_json());
        }
        serde_json::Value::Object(object)
    }
}
