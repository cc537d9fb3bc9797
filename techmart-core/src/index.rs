//! Secondary indexes for repeated equality-filtered scans.
//!
//! Indexes are built after normalization; a later bulk rewrite should be
//! followed by [`rebuild_index`] or [`drop_index`].

use crate::error::AnalysisError;
use crate::rowset::cell_as_text;
use crate::schema::{quote_ident, require_columns, validate_identifier};
use crate::session::QueryExecutor;
use rusqlite::types::ToSql;
use serde::{Deserialize, Serialize};
use tracing::info;

/// An index to build on `table(column)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSpec {
    pub table: String,
    pub column: String,
    /// Defaults to `idx_<table>_<column>`, lowercased.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl IndexSpec {
    pub fn new(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            column: column.into(),
            name: None,
        }
    }

    pub fn index_name(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| format!("idx_{}_{}", self.table, self.column).to_lowercase())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexOutcome {
    pub name: String,
    pub table: String,
    pub column: String,
    /// False when the index was already present.
    pub created: bool,
}

/// Names of every index on `table`.
pub fn list_indexes<E>(exec: &E, table: &str) -> Result<Vec<String>, AnalysisError>
where
    E: QueryExecutor + ?Sized,
{
    let sql = format!("PRAGMA index_list({})", quote_ident(table)?);
    let rs = exec.query_rows("index list", &sql, &[])?;
    Ok(rs
        .column_values("name")
        .into_iter()
        .filter_map(cell_as_text)
        .collect())
}

fn index_exists<E>(exec: &E, name: &str) -> Result<bool, AnalysisError>
where
    E: QueryExecutor + ?Sized,
{
    let rs = exec.query_rows(
        "index exists",
        "SELECT 1 FROM sqlite_master WHERE type = 'index' AND name = ?1",
        &[&name],
    )?;
    Ok(!rs.is_empty())
}

/// Build the index once; later calls are no-ops.
pub fn ensure_index<E>(exec: &E, spec: &IndexSpec) -> Result<IndexOutcome, AnalysisError>
where
    E: QueryExecutor + ?Sized,
{
    require_columns(exec, &spec.table, &[spec.column.as_str()])?;
    let name = spec.index_name();
    validate_identifier(&name)?;

    let created = !index_exists(exec, &name)?;
    if created {
        let sql = format!(
            "CREATE INDEX IF NOT EXISTS {} ON {}({})",
            quote_ident(&name)?,
            quote_ident(&spec.table)?,
            quote_ident(&spec.column)?
        );
        exec.execute_statement(&format!("create index {name}"), &sql, &[])?;
        info!(index = %name, table = %spec.table, column = %spec.column, "created index");
    }

    Ok(IndexOutcome {
        name,
        table: spec.table.clone(),
        column: spec.column.clone(),
        created,
    })
}

/// Rebuild an existing index from its table's current contents.
pub fn rebuild_index<E>(exec: &E, name: &str) -> Result<(), AnalysisError>
where
    E: QueryExecutor + ?Sized,
{
    let sql = format!("REINDEX {}", quote_ident(name)?);
    exec.execute_statement(&format!("reindex {name}"), &sql, &[])?;
    info!(index = name, "rebuilt index");
    Ok(())
}

/// Drop an index. Returns whether it existed.
pub fn drop_index<E>(exec: &E, name: &str) -> Result<bool, AnalysisError>
where
    E: QueryExecutor + ?Sized,
{
    let existed = index_exists(exec, name)?;
    let sql = format!("DROP INDEX IF EXISTS {}", quote_ident(name)?);
    exec.execute_statement(&format!("drop index {name}"), &sql, &[])?;
    Ok(existed)
}

/// Planner steps SQLite would take for `sql`.
pub fn query_plan<E>(
    exec: &E,
    sql: &str,
    params: &[&dyn ToSql],
) -> Result<Vec<String>, AnalysisError>
where
    E: QueryExecutor + ?Sized,
{
    let plan = exec.query_rows("query plan", &format!("EXPLAIN QUERY PLAN {sql}"), params)?;
    Ok(plan
        .column_values("detail")
        .into_iter()
        .filter_map(cell_as_text)
        .collect())
}

/// Whether the plan for `sql` goes through the named index.
pub fn uses_index<E>(
    exec: &E,
    sql: &str,
    params: &[&dyn ToSql],
    index: &str,
) -> Result<bool, AnalysisError>
where
    E: QueryExecutor + ?Sized,
{
    let needle = format!("INDEX {index}");
    Ok(query_plan(exec, sql, params)?
        .iter()
        .any(|step| step.contains(&needle)))
}
