//! Sentinel rewriting for text-stored columns.
//!
//! One rule table (`match value -> replacement or NULL`) drives every
//! column's cleanup; each call issues a single conditional `UPDATE` inside its
//! own transaction.

use crate::detect::NAN_SENTINEL;
use crate::error::AnalysisError;
use crate::schema::{quote_ident, require_columns};
use crate::session::{QueryExecutor, Session};
use rusqlite::types::ToSql;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Exact-match rewrite: `matches` becomes `replacement` (`None` = NULL).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewriteRule {
    pub matches: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replacement: Option<String>,
}

/// Ordered set of rewrite rules. The first rule with a given key wins.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RewriteRules {
    pub rules: Vec<RewriteRule>,
}

impl RewriteRules {
    pub fn new() -> Self {
        Self { rules: Vec::new() }
    }

    pub fn rule(mut self, matches: impl Into<String>, replacement: Option<&str>) -> Self {
        let matches = matches.into();
        if !self.rules.iter().any(|r| r.matches == matches) {
            self.rules.push(RewriteRule {
                matches,
                replacement: replacement.map(String::from),
            });
        }
        self
    }

    /// `"nan" -> NULL`, `"five thousand" -> "5000"`.
    pub fn numeric_defaults() -> Self {
        Self::new()
            .rule(NAN_SENTINEL, None)
            .rule("five thousand", Some("5000"))
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Replacement for `value`, if some rule matches it.
    pub fn lookup(&self, value: &str) -> Option<Option<&str>> {
        self.rules
            .iter()
            .find(|r| r.matches == value)
            .map(|r| r.replacement.as_deref())
    }

    /// Reject chains (`a -> b`, `b -> c`): a second pass would rewrite again.
    pub fn validate(&self) -> Result<(), AnalysisError> {
        for rule in &self.rules {
            if let Some(replacement) = &rule.replacement {
                if self.lookup(replacement).is_some() {
                    return Err(AnalysisError::config(format!(
                        "rewrite rule '{}' -> '{}' feeds another rule",
                        rule.matches, replacement
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Result of one normalization call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizeOutcome {
    pub table: String,
    pub column: String,
    pub rows_rewritten: usize,
    pub applied_at: chrono::DateTime<chrono::Utc>,
}

/// Build the conditional rewrite statement and its bound values.
fn build_update<'a>(
    table: &str,
    column: &str,
    rules: &'a RewriteRules,
) -> Result<(String, Vec<&'a dyn ToSql>), AnalysisError> {
    let quoted = quote_ident(column)?;
    let mut params: Vec<&dyn ToSql> = Vec::with_capacity(rules.len() * 2);
    let mut arms = Vec::with_capacity(rules.len());
    let mut keys = Vec::with_capacity(rules.len());

    for rule in &rules.rules {
        params.push(&rule.matches);
        let key = params.len();
        params.push(&rule.replacement);
        let value = params.len();
        arms.push(format!("WHEN {quoted} = ?{key} THEN ?{value}"));
        keys.push(format!("?{key}"));
    }

    let sql = format!(
        "UPDATE {table_q} SET {quoted} = CASE {arms} ELSE {quoted} END WHERE {quoted} IN ({keys})",
        table_q = quote_ident(table)?,
        arms = arms.join(" "),
        keys = keys.join(", "),
    );
    Ok((sql, params))
}

/// Rewrite every value of `table.column` that matches a rule key.
///
/// Rows matching no rule are untouched. All-or-nothing: a failure rolls the
/// whole rewrite back. Applying the same rules twice is a no-op the second time.
pub fn normalize(
    session: &mut Session,
    table: &str,
    column: &str,
    rules: &RewriteRules,
) -> Result<NormalizeOutcome, AnalysisError> {
    rules.validate()?;
    require_columns(&*session, table, &[column])?;

    let rows_rewritten = if rules.is_empty() {
        0
    } else {
        let (sql, params) = build_update(table, column, rules)?;
        let label = format!("normalize {table}.{column}");
        session.in_transaction(&label, |tx| tx.execute_statement(&label, &sql, &params))?
    };

    info!(table, column, rows_rewritten, rules = rules.len(), "normalized column");
    Ok(NormalizeOutcome {
        table: table.to_string(),
        column: column.to_string(),
        rows_rewritten,
        applied_at: chrono::Utc::now(),
    })
}
