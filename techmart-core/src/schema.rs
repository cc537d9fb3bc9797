//! Table descriptors for the TechMart store and identifier checks.
//!
//! Table and column names flow in from configuration and the CLI, so they are
//! validated and double-quoted before they reach a statement. Values are always
//! bound as parameters.

use crate::error::AnalysisError;
use crate::session::QueryExecutor;
use serde::{Deserialize, Serialize};

/// Column data type as intended by the schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    Integer,
    Float,
    Text,
    /// Numeric value stored as text; subject to sentinel corruption.
    NumericText,
}

impl ColumnType {
    pub fn is_numeric(self) -> bool {
        !matches!(self, ColumnType::Text)
    }
}

/// Schema for a single column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnSpec {
    pub name: &'static str,
    pub dtype: ColumnType,
}

/// Schema for one of the four TechMart tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableSpec {
    pub name: &'static str,
    pub key: &'static str,
    pub columns: &'static [ColumnSpec],
}

impl TableSpec {
    pub fn column(&self, name: &str) -> Option<&ColumnSpec> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Columns whose values arrive as corruptible numeric text.
    pub fn numeric_text_columns(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.columns
            .iter()
            .filter(|c| c.dtype == ColumnType::NumericText)
            .map(|c| c.name)
    }
}

const fn col(name: &'static str, dtype: ColumnType) -> ColumnSpec {
    ColumnSpec { name, dtype }
}

pub const EMPLOYEE_RECORDS: TableSpec = TableSpec {
    name: "Employee_Records",
    key: "employee_id",
    columns: &[
        col("employee_id", ColumnType::Integer),
        col("store_location", ColumnType::Text),
        col("role", ColumnType::Text),
        col("sales_performance", ColumnType::NumericText),
    ],
};

pub const PRODUCT_DETAILS: TableSpec = TableSpec {
    name: "Product_Details",
    key: "product_id",
    columns: &[
        col("product_id", ColumnType::Integer),
        col("category", ColumnType::Text),
        col("product_name", ColumnType::Text),
        col("stock", ColumnType::NumericText),
    ],
};

pub const CUSTOMER_DEMOGRAPHICS: TableSpec = TableSpec {
    name: "Customer_Demographics",
    key: "customer_id",
    columns: &[
        col("customer_id", ColumnType::Integer),
        col("age", ColumnType::Integer),
        col("loyalty_program", ColumnType::Text),
    ],
};

pub const SALES_TRANSACTIONS: TableSpec = TableSpec {
    name: "Sales_Transactions",
    key: "transaction_id",
    columns: &[
        col("transaction_id", ColumnType::Integer),
        col("employee_id", ColumnType::Integer),
        col("product_id", ColumnType::Integer),
        col("customer_id", ColumnType::Integer),
        col("quantity", ColumnType::Integer),
        col("total_amount", ColumnType::Float),
    ],
};

pub const TABLES: [&TableSpec; 4] = [
    &EMPLOYEE_RECORDS,
    &PRODUCT_DETAILS,
    &CUSTOMER_DEMOGRAPHICS,
    &SALES_TRANSACTIONS,
];

/// Look up a known table by name (exact match).
pub fn table_spec(name: &str) -> Option<&'static TableSpec> {
    TABLES.iter().copied().find(|t| t.name == name)
}

/// Accept only plain SQL identifiers: `[A-Za-z_][A-Za-z0-9_]*`.
pub fn validate_identifier(name: &str) -> Result<&str, AnalysisError> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(first) => {
            (first.is_ascii_alphabetic() || first == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        None => false,
    };
    if valid {
        Ok(name)
    } else {
        Err(AnalysisError::InvalidIdentifier(name.to_string()))
    }
}

/// Validate and double-quote an identifier for use in a statement.
pub fn quote_ident(name: &str) -> Result<String, AnalysisError> {
    Ok(format!("\"{}\"", validate_identifier(name)?))
}

/// Column names of `table` as the store reports them.
pub fn table_columns<E>(exec: &E, table: &str) -> Result<Vec<String>, AnalysisError>
where
    E: QueryExecutor + ?Sized,
{
    let sql = format!("PRAGMA table_info({})", quote_ident(table)?);
    let info = exec.query_rows("table info", &sql, &[])?;
    if info.is_empty() {
        return Err(AnalysisError::UnknownTable(table.to_string()));
    }
    Ok(info
        .column_values("name")
        .into_iter()
        .filter_map(crate::rowset::cell_as_text)
        .collect())
}

/// Fail unless `table` exists and has every listed column.
pub fn require_columns<E>(exec: &E, table: &str, columns: &[&str]) -> Result<(), AnalysisError>
where
    E: QueryExecutor + ?Sized,
{
    let present = table_columns(exec, table)?;
    for column in columns {
        validate_identifier(column)?;
        if !present.iter().any(|p| p.eq_ignore_ascii_case(column)) {
            return Err(AnalysisError::unknown_column(table, *column));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Session;

    #[test]
    fn test_validate_identifier() {
        assert!(validate_identifier("Employee_Records").is_ok());
        assert!(validate_identifier("_x1").is_ok());
        assert!(validate_identifier("").is_err());
        assert!(validate_identifier("1abc").is_err());
        assert!(validate_identifier("stock; DROP TABLE x").is_err());
        assert!(validate_identifier("a\"b").is_err());
    }

    #[test]
    fn test_quote_ident() {
        assert_eq!(quote_ident("stock").unwrap(), "\"stock\"");
    }

    #[test]
    fn test_numeric_text_columns() {
        let cols: Vec<_> = EMPLOYEE_RECORDS.numeric_text_columns().collect();
        assert_eq!(cols, vec!["sales_performance"]);
        assert_eq!(
            PRODUCT_DETAILS.numeric_text_columns().collect::<Vec<_>>(),
            vec!["stock"]
        );
        assert_eq!(CUSTOMER_DEMOGRAPHICS.numeric_text_columns().count(), 0);
    }

    #[test]
    fn test_table_spec_lookup() {
        assert_eq!(table_spec("Sales_Transactions"), Some(&SALES_TRANSACTIONS));
        assert!(table_spec("sales").is_none());
    }

    #[test]
    fn test_require_columns() {
        let session = Session::open_in_memory().unwrap();
        session
            .execute_statement("ddl", "CREATE TABLE Product_Details (product_id INTEGER, stock TEXT)", &[])
            .unwrap();

        assert!(require_columns(&session, "Product_Details", &["stock"]).is_ok());
        assert!(matches!(
            require_columns(&session, "Product_Details", &["price"]),
            Err(AnalysisError::UnknownColumn { .. })
        ));
        assert!(matches!(
            require_columns(&session, "Nope", &["stock"]),
            Err(AnalysisError::UnknownTable(_))
        ));
    }
}
