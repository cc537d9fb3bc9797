//! Data-quality detection: missing values and non-numeric leftovers.
//!
//! Both scans are read-only. Running them twice without an intervening
//! mutation yields identical reports.

use crate::error::AnalysisError;
use crate::rowset::{cell_as_i64, cell_as_text};
use crate::schema::{quote_ident, require_columns};
use crate::session::QueryExecutor;
use rusqlite::types::ToSql;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// The literal placeholder that marks a missing value.
pub const NAN_SENTINEL: &str = "nan";

/// Maximum number of offending values kept as samples.
const MAX_SAMPLES: usize = 10;

/// Missing-value counts for one column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMissing {
    pub column: String,
    pub missing: u64,
}

/// Summary row of a missing-value scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissingValueReport {
    pub table: String,
    pub total_rows: u64,
    pub columns: Vec<ColumnMissing>,
}

impl MissingValueReport {
    pub fn missing(&self, column: &str) -> Option<u64> {
        self.columns
            .iter()
            .find(|c| c.column == column)
            .map(|c| c.missing)
    }

    pub fn total_missing(&self) -> u64 {
        self.columns.iter().map(|c| c.missing).sum()
    }
}

/// Present values that are neither the `nan` sentinel nor a valid number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvalidValueReport {
    pub table: String,
    pub column: String,
    pub invalid_rows: u64,
    /// Distinct offending values, most frequent first.
    pub samples: Vec<String>,
}

impl InvalidValueReport {
    pub fn is_clean(&self) -> bool {
        self.invalid_rows == 0
    }

    pub fn into_error(self) -> AnalysisError {
        AnalysisError::NonNumeric {
            table: self.table,
            column: self.column,
            count: self.invalid_rows,
            samples: self.samples,
        }
    }
}

/// Whether `value` reads as a number once surrounding ASCII whitespace is
/// removed.
///
/// SQLite's numeric conversion only skips ASCII whitespace, so a value padded
/// with anything else (a non-breaking space, say) would cast to 0.
pub fn is_numeric_text(value: &str) -> bool {
    let trimmed = value.trim_ascii();
    !trimmed.is_empty() && trimmed.parse::<f64>().is_ok_and(f64::is_finite)
}

/// Count rows per column that are NULL or equal to the `nan` sentinel.
///
/// Issues one aggregate statement: `COUNT(*)` plus one conditional `SUM` per
/// suspect column.
pub fn detect_missing<E>(
    exec: &E,
    table: &str,
    columns: &[&str],
) -> Result<MissingValueReport, AnalysisError>
where
    E: QueryExecutor + ?Sized,
{
    require_columns(exec, table, columns)?;

    let mut select = vec!["COUNT(*) AS total_rows".to_string()];
    for column in columns {
        let quoted = quote_ident(column)?;
        select.push(format!(
            "SUM(CASE WHEN {quoted} IS NULL OR {quoted} = ?1 THEN 1 ELSE 0 END) AS {}",
            quote_ident(&format!("missing_{column}"))?
        ));
    }
    let sql = format!("SELECT {} FROM {}", select.join(",\n       "), quote_ident(table)?);

    let label = format!("detect missing in {table}");
    let sentinel: &dyn ToSql = &NAN_SENTINEL;
    let params: &[&dyn ToSql] = if columns.is_empty() {
        &[]
    } else {
        std::slice::from_ref(&sentinel)
    };
    let rs = exec.query_rows(&label, &sql, params)?;

    // SUM over zero rows is NULL; read it as zero.
    let read = |name: &str| -> u64 {
        rs.get(0, name)
            .and_then(cell_as_i64)
            .map(|n| n.max(0) as u64)
            .unwrap_or(0)
    };

    let report = MissingValueReport {
        table: table.to_string(),
        total_rows: read("total_rows"),
        columns: columns
            .iter()
            .map(|c| ColumnMissing {
                column: c.to_string(),
                missing: read(&format!("missing_{c}")),
            })
            .collect(),
    };

    info!(
        table,
        total_rows = report.total_rows,
        total_missing = report.total_missing(),
        "missing-value scan"
    );
    Ok(report)
}

/// Find present values in `column` that are not the sentinel and do not
/// parse as a number.
///
/// Such values are data-quality defects: they are reported here and block
/// numeric aggregation rather than being coerced to zero.
pub fn detect_invalid_numeric<E>(
    exec: &E,
    table: &str,
    column: &str,
) -> Result<InvalidValueReport, AnalysisError>
where
    E: QueryExecutor + ?Sized,
{
    require_columns(exec, table, &[column])?;

    let quoted = quote_ident(column)?;
    // Only text cells can be malformed; INTEGER/REAL storage is numeric already.
    let sql = format!(
        "SELECT {quoted} AS value, COUNT(*) AS occurrences
         FROM {table_q}
         WHERE {quoted} IS NOT NULL AND {quoted} <> ?1 AND typeof({quoted}) = 'text'
         GROUP BY {quoted}
         ORDER BY occurrences DESC, value",
        table_q = quote_ident(table)?
    );

    let label = format!("detect invalid numeric in {table}.{column}");
    let rs = exec.query_rows(&label, &sql, &[&NAN_SENTINEL])?;

    let mut invalid_rows = 0u64;
    let mut samples = Vec::new();
    for row in 0..rs.row_count() {
        let Some(value) = rs.get(row, "value").and_then(cell_as_text) else {
            continue;
        };
        if is_numeric_text(&value) {
            continue;
        }
        invalid_rows += rs.i64_at(row, "occurrences").unwrap_or(0).max(0) as u64;
        if samples.len() < MAX_SAMPLES {
            samples.push(value);
        }
    }

    if invalid_rows > 0 {
        warn!(table, column, invalid_rows, ?samples, "non-numeric values present");
    }

    Ok(InvalidValueReport {
        table: table.to_string(),
        column: column.to_string(),
        invalid_rows,
        samples,
    })
}
