//! Rendering of row-sets for terminals and machine consumers.

use crate::rowset::RowSet;
use serde_json::{Map, Value};

/// Turns a row-set into display text.
pub trait ResultPresenter {
    fn render(&self, rows: &RowSet) -> String;
}

/// Pipe-separated text table:
///
/// ```text
/// store_location | avg_sales
/// --------------------------
/// Paris | 7000.0
///
/// (1 rows)
/// ```
#[derive(Debug, Clone)]
pub struct TablePresenter {
    /// Rows beyond this are elided with a marker line.
    pub max_rows: usize,
}

impl Default for TablePresenter {
    fn default() -> Self {
        Self { max_rows: 1000 }
    }
}

impl TablePresenter {
    pub fn new(max_rows: usize) -> Self {
        Self { max_rows }
    }
}

fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

impl ResultPresenter for TablePresenter {
    fn render(&self, rows: &RowSet) -> String {
        let header = rows.columns.join(" | ");
        let mut out = vec![header.clone(), "-".repeat(header.chars().count())];
        for row in rows.rows.iter().take(self.max_rows) {
            let vals: Vec<String> = row.iter().map(cell_text).collect();
            out.push(vals.join(" | "));
        }
        if rows.row_count() > self.max_rows {
            out.push(format!("... (truncated at {} rows)", self.max_rows));
        }
        out.push(String::new());
        out.push(format!("({} rows)", rows.row_count()));
        out.join("\n")
    }
}

/// Pretty-printed JSON array with one object per row.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonPresenter;

impl JsonPresenter {
    pub fn to_value(rows: &RowSet) -> Value {
        Value::Array(
            rows.rows
                .iter()
                .map(|row| {
                    let obj: Map<String, Value> = rows
                        .columns
                        .iter()
                        .cloned()
                        .zip(row.iter().cloned())
                        .collect();
                    Value::Object(obj)
                })
                .collect(),
        )
    }
}

impl ResultPresenter for JsonPresenter {
    fn render(&self, rows: &RowSet) -> String {
        format!("{:#}", Self::to_value(rows))
    }
}
