//! Share-of-total window aggregates.
//!
//! Every group row participates, including groups without detail rows: the
//! group table is LEFT JOINed to the details and an empty sum reads as zero.

use crate::detect::{NAN_SENTINEL, detect_invalid_numeric};
use crate::error::AnalysisError;
use crate::rowset::{RowSet, cell_as_f64, cell_as_i64, cell_as_text};
use crate::schema::{quote_ident, require_columns, validate_identifier};
use crate::session::QueryExecutor;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Output column names of a share-of-total query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareNames {
    pub count: String,
    pub total: String,
    pub average: String,
    pub rank: String,
    pub grand_total: String,
    pub percentage: String,
}

impl Default for ShareNames {
    fn default() -> Self {
        Self {
            count: "detail_count".to_string(),
            total: "total".to_string(),
            average: "average".to_string(),
            rank: "rank".to_string(),
            grand_total: "grand_total".to_string(),
            percentage: "percentage".to_string(),
        }
    }
}

/// Per-group total, its rank, the grand total, and the group's share.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareOfTotal {
    pub group_table: String,
    pub group_key: String,
    /// Extra group-table columns carried into the output (e.g. loyalty tier).
    #[serde(default)]
    pub group_attrs: Vec<String>,
    pub detail_table: String,
    /// Join column in the detail table; same name as `group_key` by default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail_key: Option<String>,
    pub measure: String,
    #[serde(default)]
    pub names: ShareNames,
}

/// One decoded output row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShareRow {
    pub key: Option<String>,
    pub attrs: Vec<Option<String>>,
    pub detail_count: u64,
    pub total: f64,
    pub average: f64,
    pub rank: u64,
    pub grand_total: f64,
    pub percentage: f64,
}

/// Raw row-set plus its typed decoding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShareReport {
    pub rows: RowSet,
    pub shares: Vec<ShareRow>,
}

impl ShareReport {
    pub fn grand_total(&self) -> f64 {
        self.shares.first().map(|s| s.grand_total).unwrap_or(0.0)
    }

    pub fn percentage_sum(&self) -> f64 {
        self.shares.iter().map(|s| s.percentage).sum()
    }
}

impl ShareOfTotal {
    pub fn new(
        group_table: impl Into<String>,
        group_key: impl Into<String>,
        detail_table: impl Into<String>,
        measure: impl Into<String>,
    ) -> Self {
        Self {
            group_table: group_table.into(),
            group_key: group_key.into(),
            group_attrs: Vec::new(),
            detail_table: detail_table.into(),
            detail_key: None,
            measure: measure.into(),
            names: ShareNames::default(),
        }
    }

    pub fn with_attr(mut self, column: impl Into<String>) -> Self {
        self.group_attrs.push(column.into());
        self
    }

    pub fn with_names(mut self, names: ShareNames) -> Self {
        self.names = names;
        self
    }

    fn detail_key(&self) -> &str {
        self.detail_key.as_deref().unwrap_or(&self.group_key)
    }

    fn output_names(&self) -> Vec<&str> {
        let mut names = vec![self.group_key.as_str()];
        names.extend(self.group_attrs.iter().map(String::as_str));
        names.extend([
            self.names.count.as_str(),
            self.names.total.as_str(),
            self.names.average.as_str(),
            self.names.rank.as_str(),
            self.names.grand_total.as_str(),
            self.names.percentage.as_str(),
        ]);
        names
    }

    fn validate(&self) -> Result<(), AnalysisError> {
        let names = self.output_names();
        for name in &names {
            validate_identifier(name)?;
        }
        let mut sorted = names.clone();
        sorted.sort_unstable();
        sorted.dedup();
        if sorted.len() != names.len() {
            return Err(AnalysisError::config(format!(
                "output column names collide: {}",
                names.join(", ")
            )));
        }
        Ok(())
    }

    pub fn to_sql(&self) -> Result<String, AnalysisError> {
        self.validate()?;
        let g = quote_ident(&self.group_table)?;
        let d = quote_ident(&self.detail_table)?;
        let key = quote_ident(&self.group_key)?;
        let detail_key = quote_ident(self.detail_key())?;
        let measure = quote_ident(&self.measure)?;

        let mut group_cols = vec![format!("g.{key} AS {key}")];
        let mut group_by = vec![format!("g.{key}")];
        for attr in &self.group_attrs {
            let a = quote_ident(attr)?;
            group_cols.push(format!("g.{a} AS {a}"));
            group_by.push(format!("g.{a}"));
        }

        let n = &self.names;
        let count = quote_ident(&n.count)?;
        let total = quote_ident(&n.total)?;
        let average = quote_ident(&n.average)?;
        let rank = quote_ident(&n.rank)?;
        let grand = quote_ident(&n.grand_total)?;
        let pct = quote_ident(&n.percentage)?;

        Ok(format!(
            "WITH per_group AS (
    SELECT {group_cols},
           COUNT(d.{detail_key}) AS {count},
           COALESCE(SUM(NULLIF(d.{measure}, '{NAN_SENTINEL}')), 0) AS {total},
           COALESCE(AVG(NULLIF(d.{measure}, '{NAN_SENTINEL}')), 0) AS {average}
    FROM {g} AS g
    LEFT JOIN {d} AS d ON g.{key} = d.{detail_key}
    GROUP BY {group_by}
)
SELECT per_group.*,
       DENSE_RANK() OVER (ORDER BY {total} DESC) AS {rank},
       SUM({total}) OVER () AS {grand},
       CASE WHEN SUM({total}) OVER () = 0 THEN 0.0
            ELSE ROUND({total} * 100.0 / SUM({total}) OVER (), 2)
       END AS {pct}
FROM per_group
ORDER BY {rank}, {key}",
            group_cols = group_cols.join(", "),
            group_by = group_by.join(", "),
        ))
    }

    pub fn run<E>(&self, exec: &E) -> Result<ShareReport, AnalysisError>
    where
        E: QueryExecutor + ?Sized,
    {
        let sql = self.to_sql()?;
        let mut group_cols = vec![self.group_key.as_str()];
        group_cols.extend(self.group_attrs.iter().map(String::as_str));
        require_columns(exec, &self.group_table, &group_cols)?;
        require_columns(exec, &self.detail_table, &[self.detail_key(), self.measure.as_str()])?;

        let invalid = detect_invalid_numeric(exec, &self.detail_table, &self.measure)?;
        if !invalid.is_clean() {
            return Err(invalid.into_error());
        }

        let label = format!(
            "share of {}.{} per {}",
            self.detail_table, self.measure, self.group_key
        );
        let rows = exec.query_rows(&label, &sql, &[])?;
        let shares = self.decode(&rows);
        info!(label, groups = shares.len(), "share-of-total");
        Ok(ShareReport { rows, shares })
    }

    fn decode(&self, rows: &RowSet) -> Vec<ShareRow> {
        let n = &self.names;
        let f = |i: usize, col: &str| rows.get(i, col).and_then(cell_as_f64).unwrap_or(0.0);
        let u = |i: usize, col: &str| {
            rows.get(i, col)
                .and_then(cell_as_i64)
                .unwrap_or(0)
                .max(0) as u64
        };
        (0..rows.row_count())
            .map(|i| ShareRow {
                key: rows.get(i, &self.group_key).and_then(cell_as_text),
                attrs: self
                    .group_attrs
                    .iter()
                    .map(|a| rows.get(i, a).and_then(cell_as_text))
                    .collect(),
                detail_count: u(i, &n.count),
                total: f(i, &n.total),
                average: f(i, &n.average),
                rank: u(i, &n.rank),
                grand_total: f(i, &n.grand_total),
                percentage: f(i, &n.percentage),
            })
            .collect()
    }
}

/// Spend per customer with loyalty tier, rank, and share of all revenue.
pub fn customer_spending() -> ShareOfTotal {
    ShareOfTotal::new(
        "Customer_Demographics",
        "customer_id",
        "Sales_Transactions",
        "total_amount",
    )
    .with_attr("loyalty_program")
    .with_names(ShareNames {
        count: "total_transactions".to_string(),
        total: "total_spent".to_string(),
        average: "avg_purchase_value".to_string(),
        rank: "spending_rank".to_string(),
        grand_total: "overall_revenue".to_string(),
        percentage: "revenue_percentage".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Session;

    fn store() -> Session {
        let session = Session::open_in_memory().unwrap();
        session
            .connection()
            .execute_batch(
                "CREATE TABLE Customer_Demographics (
                    customer_id INTEGER PRIMARY KEY,
                    age INTEGER,
                    loyalty_program TEXT
                );
                CREATE TABLE Sales_Transactions (
                    transaction_id INTEGER PRIMARY KEY,
                    employee_id INTEGER,
                    product_id INTEGER,
                    customer_id INTEGER,
                    quantity INTEGER,
                    total_amount REAL
                );
                INSERT INTO Customer_Demographics VALUES
                    (1, 30, 'Gold'), (2, 41, 'Silver'), (3, 25, 'None');
                INSERT INTO Sales_Transactions VALUES
                    (1, 1, 1, 1, 1, 300.0),
                    (2, 1, 1, 1, 1, 100.0),
                    (3, 1, 1, 2, 1, 100.0);",
            )
            .unwrap();
        session
    }

    #[test]
    fn test_customer_without_transactions_is_zero() {
        let session = store();
        let report = customer_spending().run(&session).unwrap();
        assert_eq!(report.shares.len(), 3);

        let last = report.shares.last().unwrap();
        assert_eq!(last.key.as_deref(), Some("3"));
        assert_eq!(last.total, 0.0);
        assert_eq!(last.detail_count, 0);
        assert_eq!(last.percentage, 0.0);
        assert_eq!(last.rank, 3);
    }

    #[test]
    fn test_shares_and_grand_total() {
        let session = store();
        let report = customer_spending().run(&session).unwrap();
        assert_eq!(report.grand_total(), 500.0);
        assert_eq!(report.shares[0].percentage, 80.0);
        assert_eq!(report.shares[0].average, 200.0);
        assert_eq!(report.shares[0].attrs, vec![Some("Gold".to_string())]);
        assert_eq!(report.shares[1].percentage, 20.0);
        assert!((report.percentage_sum() - 100.0).abs() < 0.01);
    }

    #[test]
    fn test_zero_grand_total_has_no_ratio() {
        let session = store();
        session
            .execute_statement("wipe", "DELETE FROM Sales_Transactions", &[])
            .unwrap();
        let report = customer_spending().run(&session).unwrap();
        assert!(report.shares.iter().all(|s| s.percentage == 0.0 && s.rank == 1));
    }

    #[test]
    fn test_colliding_names_rejected() {
        let share = ShareOfTotal::new(
            "Customer_Demographics",
            "customer_id",
            "Sales_Transactions",
            "total_amount",
        )
        .with_attr("total");
        assert!(matches!(share.to_sql(), Err(AnalysisError::Config(_))));
    }
}
