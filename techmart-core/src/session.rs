//! Scoped access to the SQLite store.
//!
//! A [`Session`] owns the single connection used for a run. It is opened once,
//! passed explicitly to every operation, and released either through
//! [`Session::close`] or on drop, so a failing step never leaks the handle.

use crate::error::AnalysisError;
use crate::rowset::{RowSet, cell_from_sql};
use rusqlite::types::ToSql;
use rusqlite::{Connection, OpenFlags, Transaction, TransactionBehavior};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Runs labelled SQL statements and returns named-column results.
///
/// The label identifies the statement in errors and logs.
pub trait QueryExecutor {
    /// Run a row-returning statement.
    fn query_rows(
        &self,
        label: &str,
        sql: &str,
        params: &[&dyn ToSql],
    ) -> Result<RowSet, AnalysisError>;

    /// Run a mutating statement and return the number of rows changed.
    fn execute_statement(
        &self,
        label: &str,
        sql: &str,
        params: &[&dyn ToSql],
    ) -> Result<usize, AnalysisError>;
}

impl QueryExecutor for Connection {
    fn query_rows(
        &self,
        label: &str,
        sql: &str,
        params: &[&dyn ToSql],
    ) -> Result<RowSet, AnalysisError> {
        debug!(label, sql, "query");
        let wrap = |e: rusqlite::Error| AnalysisError::statement(label, sql, e);

        let mut stmt = self.prepare(sql).map_err(wrap)?;
        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let column_count = columns.len();

        let mut rows = Vec::new();
        let mut result_rows = stmt.query(params).map_err(wrap)?;
        while let Some(row) = result_rows.next().map_err(wrap)? {
            let mut values = Vec::with_capacity(column_count);
            for i in 0..column_count {
                values.push(cell_from_sql(row.get_ref(i).map_err(wrap)?));
            }
            rows.push(values);
        }

        debug!(label, rows = rows.len(), "query complete");
        Ok(RowSet { columns, rows })
    }

    fn execute_statement(
        &self,
        label: &str,
        sql: &str,
        params: &[&dyn ToSql],
    ) -> Result<usize, AnalysisError> {
        debug!(label, sql, "execute");
        let changed = self
            .execute(sql, params)
            .map_err(|e| AnalysisError::statement(label, sql, e))?;
        debug!(label, changed, "execute complete");
        Ok(changed)
    }
}

/// An open connection to the TechMart store.
#[derive(Debug)]
pub struct Session {
    conn: Connection,
    path: PathBuf,
}

impl Session {
    /// Open an existing store. The file is never created here; seeding is the
    /// job of the setup routine that runs before the pipeline.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, AnalysisError> {
        let path = path.as_ref().to_path_buf();
        let unreachable = |source: rusqlite::Error| AnalysisError::StoreUnreachable {
            path: path.clone(),
            source,
        };

        let conn = Connection::open_with_flags(
            &path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_URI
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(unreachable)?;

        // Opening is lazy; a non-database file only fails on first read.
        conn.query_row("PRAGMA schema_version", [], |row| row.get::<_, i64>(0))
            .map_err(unreachable)?;

        info!(path = %path.display(), "opened store");
        Ok(Self { conn, path })
    }

    /// Private in-memory store, mostly for tests.
    pub fn open_in_memory() -> Result<Self, AnalysisError> {
        let path = PathBuf::from(":memory:");
        let conn = Connection::open_in_memory().map_err(|source| {
            AnalysisError::StoreUnreachable {
                path: path.clone(),
                source,
            }
        })?;
        Ok(Self { conn, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Run `f` inside an immediate transaction.
    ///
    /// Commits when `f` returns `Ok`, rolls back otherwise. No partial effect
    /// of `f` survives a failure.
    pub fn in_transaction<T, F>(&mut self, label: &str, f: F) -> Result<T, AnalysisError>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T, AnalysisError>,
    {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| AnalysisError::statement(label, "BEGIN IMMEDIATE", e))?;

        match f(&tx) {
            Ok(value) => {
                tx.commit()
                    .map_err(|e| AnalysisError::statement(label, "COMMIT", e))?;
                Ok(value)
            }
            Err(e) => {
                warn!(label, error = %e, "rolling back");
                if let Err(rollback_err) = tx.rollback() {
                    warn!(label, error = %rollback_err, "rollback failed");
                }
                Err(e)
            }
        }
    }

    /// Release the connection, surfacing any error SQLite reports on close.
    pub fn close(self) -> Result<(), AnalysisError> {
        let path = self.path;
        self.conn
            .close()
            .map_err(|(_, e)| AnalysisError::statement("close", "sqlite3_close", e))?;
        info!(path = %path.display(), "closed store");
        Ok(())
    }
}

impl QueryExecutor for Session {
    fn query_rows(
        &self,
        label: &str,
        sql: &str,
        params: &[&dyn ToSql],
    ) -> Result<RowSet, AnalysisError> {
        self.conn.query_rows(label, sql, params)
    }

    fn execute_statement(
        &self,
        label: &str,
        sql: &str,
        params: &[&dyn ToSql],
    ) -> Result<usize, AnalysisError> {
        self.conn.execute_statement(label, sql, params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_open_missing_file_is_unreachable() {
        let dir = TempDir::new().unwrap();
        let result = Session::open(dir.path().join("absent.db"));
        assert!(matches!(
            result,
            Err(AnalysisError::StoreUnreachable { .. })
        ));
    }

    #[test]
    fn test_open_non_database_is_unreachable() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("notes.db");
        std::fs::write(&path, "this is definitely not a sqlite file, just some text").unwrap();
        assert!(matches!(
            Session::open(&path),
            Err(AnalysisError::StoreUnreachable { .. })
        ));
    }

    #[test]
    fn test_query_rows_names_columns() {
        let session = Session::open_in_memory().unwrap();
        let rs = session
            .query_rows("probe", "SELECT 1 AS one, 'x' AS label", &[])
            .unwrap();
        assert_eq!(rs.columns, vec!["one", "label"]);
        assert_eq!(rs.i64_at(0, "one"), Some(1));
    }

    #[test]
    fn test_malformed_statement_keeps_identity() {
        let session = Session::open_in_memory().unwrap();
        let err = session
            .query_rows("bad probe", "SELECT * FROM No_Such_Table", &[])
            .unwrap_err();
        match err {
            AnalysisError::Statement { label, sql, .. } => {
                assert_eq!(label, "bad probe");
                assert!(sql.contains("No_Such_Table"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_transaction_rolls_back_on_error() {
        let mut session = Session::open_in_memory().unwrap();
        session
            .execute_statement("ddl", "CREATE TABLE t (v TEXT)", &[])
            .unwrap();

        let result: Result<(), AnalysisError> = session.in_transaction("failing", |tx| {
            tx.execute_statement("insert", "INSERT INTO t VALUES ('a')", &[])?;
            Err(AnalysisError::config("boom"))
        });
        assert!(result.is_err());

        let rs = session
            .query_rows("count", "SELECT COUNT(*) AS n FROM t", &[])
            .unwrap();
        assert_eq!(rs.i64_at(0, "n"), Some(0));
    }

    #[test]
    fn test_close_releases_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store.db");
        Connection::open(&path)
            .unwrap()
            .execute_batch("CREATE TABLE t (v TEXT)")
            .unwrap();
        let session = Session::open(&path).unwrap();
        session.close().unwrap();
    }
}
