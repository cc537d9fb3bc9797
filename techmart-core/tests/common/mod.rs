//! Shared fixture: a seeded TechMart store in a temporary directory.

#![allow(dead_code)]

use std::path::PathBuf;
use tempfile::TempDir;

pub const SCHEMA: &str = "
CREATE TABLE Employee_Records (
    employee_id INTEGER PRIMARY KEY,
    store_location TEXT,
    role TEXT,
    sales_performance TEXT
);
CREATE TABLE Product_Details (
    product_id INTEGER PRIMARY KEY,
    category TEXT,
    product_name TEXT,
    stock TEXT
);
CREATE TABLE Customer_Demographics (
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
";

/// Seed data. After cleaning:
/// - locations average Paris 7000, Berlin 5000, Toronto 5000
/// - Electronics sells Laptop 50, Phone 30, Tablet 30; Monitor never sells
/// - customers spend 4500, 2100, 1400 and 0 (customer 4) of 8000
pub const SEED: &str = "
INSERT INTO Employee_Records VALUES
    (1, 'Toronto', 'Cashier', '4000'),
    (2, 'Toronto', 'Manager', '6000'),
    (3, 'Berlin', 'Cashier', 'five thousand'),
    (4, 'Berlin', 'Clerk', 'nan'),
    (5, 'Paris', 'Manager', '7000'),
    (6, 'Paris', 'Clerk', NULL);
INSERT INTO Product_Details VALUES
    (1, 'Electronics', 'Laptop', '12'),
    (2, 'Electronics', 'Phone', 'nan'),
    (3, 'Electronics', 'Tablet', 'five thousand'),
    (4, 'Electronics', 'Monitor', '3'),
    (5, 'Accessories', 'Case', '40'),
    (6, 'Accessories', 'Cable', NULL);
INSERT INTO Customer_Demographics VALUES
    (1, 34, 'Gold'),
    (2, 27, 'Silver'),
    (3, 45, 'None'),
    (4, 52, 'Gold');
INSERT INTO Sales_Transactions VALUES
    (1, 1, 1, 1, 30, 3000.0),
    (2, 2, 1, 2, 20, 2000.0),
    (3, 3, 2, 1, 30, 1500.0),
    (4, 5, 3, 3, 30, 900.0),
    (5, 5, 5, 2, 10, 100.0),
    (6, 4, 6, 3, 5, 500.0);
";

/// A seeded store file. Keep the `TempDir` alive for as long as the path is used.
pub fn seeded_store() -> (TempDir, PathBuf) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("techsmart.db");
    let conn = rusqlite::Connection::open(&path).unwrap();
    conn.execute_batch(SCHEMA).unwrap();
    conn.execute_batch(SEED).unwrap();
    conn.close().unwrap();
    (dir, path)
}

/// Column values in primary-key order, as text (`None` for NULL).
pub fn column_text(conn: &rusqlite::Connection, table: &str, column: &str) -> Vec<Option<String>> {
    let sql = format!("SELECT {column} FROM {table} ORDER BY rowid");
    let mut stmt = conn.prepare(&sql).unwrap();
    let values = stmt
        .query_map([], |row| row.get::<_, Option<String>>(0))
        .unwrap()
        .collect::<Result<Vec<_>, _>>()
        .unwrap();
    values
}
