//! Error types for the techmart-core crate.

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for analysis operations.
///
/// Every variant carries enough context (table, column, statement) to
/// diagnose a failed run by hand. Nothing is retried.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("Store unreachable at {}: {source}", path.display())]
    StoreUnreachable {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    #[error("Statement '{label}' failed: {source}\n  SQL: {sql}")]
    Statement {
        label: String,
        sql: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("Unknown table: {0}")]
    UnknownTable(String),

    #[error("Unknown column: {table}.{column}")]
    UnknownColumn { table: String, column: String },

    #[error("Invalid identifier: {0:?}")]
    InvalidIdentifier(String),

    #[error("Non-numeric values in {table}.{column}: {count} row(s), e.g. {samples:?}")]
    NonNumeric {
        table: String,
        column: String,
        count: u64,
        samples: Vec<String>,
    },

    #[error("Pipeline stage '{stage}' failed: {source}")]
    Stage {
        stage: String,
        #[source]
        source: Box<AnalysisError>,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

impl AnalysisError {
    pub fn statement(
        label: impl Into<String>,
        sql: impl Into<String>,
        source: rusqlite::Error,
    ) -> Self {
        Self::Statement {
            label: label.into(),
            sql: sql.into(),
            source,
        }
    }

    pub fn unknown_column(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self::UnknownColumn {
            table: table.into(),
            column: column.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn stage(stage: impl Into<String>, source: AnalysisError) -> Self {
        Self::Stage {
            stage: stage.into(),
            source: Box::new(source),
        }
    }

    /// The underlying failure, looking through stage context.
    pub fn root_cause(&self) -> &AnalysisError {
        match self {
            Self::Stage { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

impl From<figment::Error> for AnalysisError {
    fn from(e: figment::Error) -> Self {
        Self::Config(e.to_string())
    }
}
