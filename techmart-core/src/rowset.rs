//! Named-column result sets handed to presenters and typed decoders.

use rusqlite::types::ValueRef;
use serde::{Deserialize, Serialize};

/// A batch of result rows with named columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<serde_json::Value>>,
}

impl RowSet {
    pub fn empty() -> Self {
        Self {
            columns: Vec::new(),
            rows: Vec::new(),
        }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of a column by name.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Cell at `row` in the named column. `None` if either is out of range.
    pub fn get(&self, row: usize, column: &str) -> Option<&serde_json::Value> {
        let idx = self.column_index(column)?;
        self.rows.get(row).and_then(|r| r.get(idx))
    }

    /// Every value of the named column, top to bottom.
    pub fn column_values(&self, column: &str) -> Vec<&serde_json::Value> {
        match self.column_index(column) {
            Some(idx) => self.rows.iter().filter_map(|r| r.get(idx)).collect(),
            None => Vec::new(),
        }
    }

    pub fn f64_at(&self, row: usize, column: &str) -> Option<f64> {
        self.get(row, column).and_then(cell_as_f64)
    }

    pub fn i64_at(&self, row: usize, column: &str) -> Option<i64> {
        self.get(row, column).and_then(cell_as_i64)
    }

    pub fn text_at(&self, row: usize, column: &str) -> Option<String> {
        self.get(row, column).and_then(cell_as_text)
    }
}

/// Convert a borrowed SQLite value into a JSON cell.
pub(crate) fn cell_from_sql(value: ValueRef<'_>) -> serde_json::Value {
    match value {
        ValueRef::Null => serde_json::Value::Null,
        ValueRef::Integer(n) => serde_json::json!(n),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        ValueRef::Text(t) => serde_json::Value::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => serde_json::Value::String(format!("<blob {} bytes>", b.len())),
    }
}

pub fn cell_as_f64(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim_ascii().parse().ok(),
        _ => None,
    }
}

pub fn cell_as_i64(value: &serde_json::Value) -> Option<i64> {
    match value {
        serde_json::Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        serde_json::Value::String(s) => s.trim_ascii().parse().ok(),
        _ => None,
    }
}

/// Render a cell as text. Null stays `None`.
pub fn cell_as_text(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::Null => None,
        serde_json::Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}
