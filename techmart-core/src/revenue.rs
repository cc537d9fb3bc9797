//! Store revenue breakdown across all four tables.
//!
//! Per store, employee, role, category and loyalty tier: sale count, units
//! and revenue, alongside the store/category revenue total and its rank
//! within the store.

use crate::detect::detect_invalid_numeric;
use crate::error::AnalysisError;
use crate::rowset::{RowSet, cell_as_f64, cell_as_i64, cell_as_text};
use crate::schema::{
    CUSTOMER_DEMOGRAPHICS, EMPLOYEE_RECORDS, PRODUCT_DETAILS, SALES_TRANSACTIONS, require_columns,
};
use crate::session::QueryExecutor;
use rusqlite::types::ToSql;
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RevenueLine {
    pub store_location: Option<String>,
    pub employee_id: i64,
    pub role: Option<String>,
    pub category: Option<String>,
    pub loyalty_program: Option<String>,
    pub total_sales: u64,
    pub total_units_sold: f64,
    pub total_revenue: f64,
    pub store_category_revenue: f64,
    pub category_rank_in_store: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RevenueReport {
    pub categories: Vec<String>,
    pub rows: RowSet,
    pub lines: Vec<RevenueLine>,
}

/// Revenue breakdown restricted to `categories` (all categories when empty).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevenueBreakdown {
    pub categories: Vec<String>,
}

impl RevenueBreakdown {
    pub fn new(categories: Vec<String>) -> Self {
        Self { categories }
    }

    pub fn to_sql(&self) -> (String, Vec<&dyn ToSql>) {
        let mut params: Vec<&dyn ToSql> = Vec::with_capacity(self.categories.len());
        let filter = if self.categories.is_empty() {
            String::new()
        } else {
            let slots: Vec<String> = self
                .categories
                .iter()
                .map(|c| {
                    params.push(c);
                    format!("?{}", params.len())
                })
                .collect();
            format!("WHERE p.category IN ({})\n   ", slots.join(", "))
        };

        let sql = format!(
            "WITH StoreSales AS (
   SELECT e.store_location,
          e.employee_id,
          e.role,
          p.category,
          c.loyalty_program,
          COUNT(s.transaction_id) AS total_sales,
          SUM(s.quantity) AS total_units_sold,
          SUM(s.total_amount) AS total_revenue
   FROM Sales_Transactions s
   JOIN Employee_Records e ON s.employee_id = e.employee_id
   JOIN Product_Details p ON s.product_id = p.product_id
   JOIN Customer_Demographics c ON s.customer_id = c.customer_id
   {filter}GROUP BY e.store_location, e.employee_id, e.role, p.category, c.loyalty_program
),
StoreRankings AS (
   SELECT store_location,
          category,
          SUM(total_revenue) AS store_category_revenue,
          DENSE_RANK() OVER (
              PARTITION BY store_location ORDER BY SUM(total_revenue) DESC
          ) AS category_rank_in_store
   FROM StoreSales
   GROUP BY store_location, category
)
SELECT ss.store_location,
       ss.employee_id,
       ss.role,
       ss.category,
       ss.loyalty_program,
       ss.total_sales,
       ss.total_units_sold,
       ss.total_revenue,
       sr.store_category_revenue,
       sr.category_rank_in_store
FROM StoreSales ss
JOIN StoreRankings sr
  ON ss.store_location = sr.store_location AND ss.category = sr.category
ORDER BY ss.store_location, ss.total_revenue DESC, ss.employee_id, ss.category, ss.loyalty_program"
        );
        (sql, params)
    }

    pub fn run<E>(&self, exec: &E) -> Result<RevenueReport, AnalysisError>
    where
        E: QueryExecutor + ?Sized,
    {
        require_columns(
            exec,
            SALES_TRANSACTIONS.name,
            &[
                "transaction_id",
                "employee_id",
                "product_id",
                "customer_id",
                "quantity",
                "total_amount",
            ],
        )?;
        require_columns(exec, EMPLOYEE_RECORDS.name, &["employee_id", "store_location", "role"])?;
        require_columns(exec, PRODUCT_DETAILS.name, &["product_id", "category"])?;
        require_columns(exec, CUSTOMER_DEMOGRAPHICS.name, &["customer_id", "loyalty_program"])?;
        for measure in ["quantity", "total_amount"] {
            let invalid = detect_invalid_numeric(exec, SALES_TRANSACTIONS.name, measure)?;
            if !invalid.is_clean() {
                return Err(invalid.into_error());
            }
        }

        let (sql, params) = self.to_sql();
        let rows = exec.query_rows("store revenue breakdown", &sql, &params)?;
        let lines = decode(&rows);
        info!(
            categories = ?self.categories,
            lines = lines.len(),
            "store revenue breakdown"
        );
        Ok(RevenueReport {
            categories: self.categories.clone(),
            rows,
            lines,
        })
    }
}

fn decode(rows: &RowSet) -> Vec<RevenueLine> {
    let text = |i: usize, col: &str| rows.get(i, col).and_then(cell_as_text);
    let real = |i: usize, col: &str| rows.get(i, col).and_then(cell_as_f64).unwrap_or(0.0);
    let int = |i: usize, col: &str| rows.get(i, col).and_then(cell_as_i64).unwrap_or(0);
    (0..rows.row_count())
        .map(|i| RevenueLine {
            store_location: text(i, "store_location"),
            employee_id: int(i, "employee_id"),
            role: text(i, "role"),
            category: text(i, "category"),
            loyalty_program: text(i, "loyalty_program"),
            total_sales: int(i, "total_sales").max(0) as u64,
            total_units_sold: real(i, "total_units_sold"),
            total_revenue: real(i, "total_revenue"),
            store_category_revenue: real(i, "store_category_revenue"),
            category_rank_in_store: int(i, "category_rank_in_store").max(0) as u64,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sql_binds_categories() {
        let breakdown = RevenueBreakdown::new(vec!["Electronics".into(), "Accessories".into()]);
        let (sql, params) = breakdown.to_sql();
        assert_eq!(params.len(), 2);
        assert!(sql.contains("WHERE p.category IN (?1, ?2)"));
    }

    #[test]
    fn test_sql_without_categories_has_no_filter() {
        let breakdown = RevenueBreakdown::default();
        let (sql, params) = breakdown.to_sql();
        assert!(params.is_empty());
        assert!(!sql.contains("p.category IN"));
    }
}
