//! Grouped aggregates with dense ranking.
//!
//! A [`GroupedAggregate`] compiles to one CTE-based statement:
//! group and aggregate, then `DENSE_RANK()` over the aggregate (optionally
//! within a partition), then an optional top-N cut per partition.

use crate::detect::{NAN_SENTINEL, detect_invalid_numeric};
use crate::error::AnalysisError;
use crate::rowset::{RowSet, cell_as_f64, cell_as_i64, cell_as_text};
use crate::schema::{ColumnType, quote_ident, require_columns, table_spec, validate_identifier};
use crate::session::QueryExecutor;
use rusqlite::types::ToSql;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Aggregation applied to the measure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregateFn {
    Mean,
    Sum,
    Count,
}

impl AggregateFn {
    fn sql(self, expr: &str) -> String {
        match self {
            AggregateFn::Mean => format!("AVG({expr})"),
            AggregateFn::Sum => format!("SUM({expr})"),
            AggregateFn::Count => format!("COUNT({expr})"),
        }
    }
}

impl std::str::FromStr for AggregateFn {
    type Err = AnalysisError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mean" | "avg" | "average" => Ok(AggregateFn::Mean),
            "sum" => Ok(AggregateFn::Sum),
            "count" => Ok(AggregateFn::Count),
            other => Err(AnalysisError::config(format!(
                "unknown aggregate function '{other}' (expected mean, sum, or count)"
            ))),
        }
    }
}

/// A column qualified by its table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnRef {
    pub table: String,
    pub column: String,
}

impl ColumnRef {
    pub fn new(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            column: column.into(),
        }
    }

    pub(crate) fn sql(&self) -> Result<String, AnalysisError> {
        Ok(format!("{}.{}", quote_ident(&self.table)?, quote_ident(&self.column)?))
    }

    /// Whether the schema stores this column as corruptible numeric text.
    fn is_numeric_text(&self) -> bool {
        table_spec(&self.table)
            .and_then(|t| t.column(&self.column))
            .is_some_and(|c| c.dtype == ColumnType::NumericText)
    }
}

/// Inner join of the base table to `table` on a shared key column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Join {
    pub table: String,
    pub key: String,
}

/// Rows to aggregate over: a base table plus key-equality joins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relation {
    pub base: String,
    #[serde(default)]
    pub joins: Vec<Join>,
}

impl Relation {
    pub fn table(base: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            joins: Vec::new(),
        }
    }

    pub fn join(mut self, table: impl Into<String>, key: impl Into<String>) -> Self {
        self.joins.push(Join {
            table: table.into(),
            key: key.into(),
        });
        self
    }

    pub(crate) fn sql(&self) -> Result<String, AnalysisError> {
        let base = quote_ident(&self.base)?;
        let mut sql = base.clone();
        for join in &self.joins {
            let table = quote_ident(&join.table)?;
            let key = quote_ident(&join.key)?;
            sql.push_str(&format!(" JOIN {table} ON {base}.{key} = {table}.{key}"));
        }
        Ok(sql)
    }

    fn tables(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.base.as_str()).chain(self.joins.iter().map(|j| j.table.as_str()))
    }

    /// Every table exists and carries its join key.
    pub(crate) fn check<E>(&self, exec: &E) -> Result<(), AnalysisError>
    where
        E: QueryExecutor + ?Sized,
    {
        require_columns(exec, &self.base, &[])?;
        for join in &self.joins {
            require_columns(exec, &self.base, &[join.key.as_str()])?;
            require_columns(exec, &join.table, &[join.key.as_str()])?;
        }
        Ok(())
    }
}

/// Equality filter: `column IN (values)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnFilter {
    pub column: ColumnRef,
    pub values: Vec<String>,
}

/// Grouped, ranked aggregate definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupedAggregate {
    pub relation: Relation,
    pub group_by: Vec<ColumnRef>,
    pub measure: ColumnRef,
    pub function: AggregateFn,
    /// Rank independently within each value of this column.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partition_by: Option<ColumnRef>,
    /// Keep only groups ranked `<= top_n` in their partition.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_n: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<ColumnFilter>,
    #[serde(default = "default_value_name")]
    pub value_name: String,
    #[serde(default = "default_count_name")]
    pub count_name: String,
    #[serde(default = "default_rank_name")]
    pub rank_name: String,
}

fn default_value_name() -> String {
    "value".to_string()
}
fn default_count_name() -> String {
    "row_count".to_string()
}
fn default_rank_name() -> String {
    "rank".to_string()
}

/// One output group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedGroup {
    pub partition: Option<String>,
    pub keys: Vec<Option<String>>,
    pub value: f64,
    pub rows: u64,
    pub rank: u64,
}

/// Raw row-set plus its typed decoding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedAggregate {
    pub rows: RowSet,
    pub groups: Vec<RankedGroup>,
}

impl GroupedAggregate {
    pub fn new(
        relation: Relation,
        group_by: Vec<ColumnRef>,
        measure: ColumnRef,
        function: AggregateFn,
    ) -> Self {
        Self {
            relation,
            group_by,
            measure,
            function,
            partition_by: None,
            top_n: None,
            filter: None,
            value_name: default_value_name(),
            count_name: default_count_name(),
            rank_name: default_rank_name(),
        }
    }

    pub fn partition_by(mut self, column: ColumnRef) -> Self {
        self.partition_by = Some(column);
        self
    }

    pub fn top_n(mut self, n: u32) -> Self {
        self.top_n = Some(n);
        self
    }

    pub fn filter(mut self, column: ColumnRef, values: Vec<String>) -> Self {
        self.filter = Some(ColumnFilter { column, values });
        self
    }

    pub fn names(
        mut self,
        value: impl Into<String>,
        count: impl Into<String>,
        rank: impl Into<String>,
    ) -> Self {
        self.value_name = value.into();
        self.count_name = count.into();
        self.rank_name = rank.into();
        self
    }

    /// Group columns in output order; the partition column leads when it is
    /// not already grouped.
    fn output_keys(&self) -> Vec<&ColumnRef> {
        let mut keys: Vec<&ColumnRef> = Vec::new();
        if let Some(p) = &self.partition_by {
            if !self.group_by.contains(p) {
                keys.push(p);
            }
        }
        keys.extend(self.group_by.iter());
        keys
    }

    fn validate(&self) -> Result<(), AnalysisError> {
        if self.group_by.is_empty() {
            return Err(AnalysisError::config("grouped aggregate needs a group-by column"));
        }
        if self.top_n == Some(0) {
            return Err(AnalysisError::config("top_n must be at least 1"));
        }
        let keys = self.output_keys();
        let mut names: Vec<&str> = keys.iter().map(|k| k.column.as_str()).collect();
        names.extend([
            self.value_name.as_str(),
            self.count_name.as_str(),
            self.rank_name.as_str(),
        ]);
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
        for col in self.referenced_columns() {
            if !self.relation.tables().any(|t| t == col.table) {
                return Err(AnalysisError::config(format!(
                    "column {}.{} is not part of the relation",
                    col.table, col.column
                )));
            }
        }
        Ok(())
    }

    fn referenced_columns(&self) -> impl Iterator<Item = &ColumnRef> {
        self.group_by
            .iter()
            .chain(std::iter::once(&self.measure))
            .chain(self.partition_by.iter())
            .chain(self.filter.iter().map(|f| &f.column))
    }

    /// Compile to SQL plus bound values.
    pub fn to_sql(&self) -> Result<(String, Vec<&dyn ToSql>), AnalysisError> {
        self.validate()?;

        let keys = self.output_keys();
        let measure = self.measure.sql()?;
        let measure_expr = if self.measure.is_numeric_text() {
            format!("CAST({measure} AS REAL)")
        } else {
            measure.clone()
        };

        let mut params: Vec<&dyn ToSql> = vec![&NAN_SENTINEL];
        let mut select = Vec::with_capacity(keys.len() + 2);
        let mut group = Vec::with_capacity(keys.len());
        for key in &keys {
            let expr = key.sql()?;
            select.push(format!("{expr} AS {}", quote_ident(&key.column)?));
            group.push(expr);
        }
        let value = quote_ident(&self.value_name)?;
        let count = quote_ident(&self.count_name)?;
        let rank = quote_ident(&self.rank_name)?;
        select.push(format!("{} AS {value}", self.function.sql(&measure_expr)));
        select.push(format!("COUNT(*) AS {count}"));

        // The sentinel is treated as absent, never cast to zero.
        let mut conditions = vec![format!("{measure} IS NOT NULL"), format!("{measure} <> ?1")];
        if let Some(filter) = &self.filter {
            if filter.values.is_empty() {
                conditions.push("0".to_string());
            } else {
                let mut slots = Vec::with_capacity(filter.values.len());
                for v in &filter.values {
                    params.push(v);
                    slots.push(format!("?{}", params.len()));
                }
                conditions.push(format!("{} IN ({})", filter.column.sql()?, slots.join(", ")));
            }
        }

        let partition = match &self.partition_by {
            Some(p) => format!("PARTITION BY {} ", quote_ident(&p.column)?),
            None => String::new(),
        };
        let key_names = keys
            .iter()
            .map(|k| quote_ident(&k.column))
            .collect::<Result<Vec<_>, _>>()?;
        let mut order = Vec::new();
        if let Some(p) = &self.partition_by {
            order.push(quote_ident(&p.column)?);
        }
        order.push(rank.clone());
        order.extend(key_names.iter().cloned());
        let cut = match self.top_n {
            Some(n) => format!("WHERE {rank} <= {n}\n"),
            None => String::new(),
        };

        let sql = format!(
            "WITH grouped AS (
    SELECT {select}
    FROM {from}
    WHERE {conditions}
    GROUP BY {group}
),
ranked AS (
    SELECT grouped.*,
           DENSE_RANK() OVER ({partition}ORDER BY {value} DESC) AS {rank}
    FROM grouped
)
SELECT * FROM ranked
{cut}ORDER BY {order}",
            select = select.join(", "),
            from = self.relation.sql()?,
            conditions = conditions.join(" AND "),
            group = group.join(", "),
            order = order.join(", "),
        );
        Ok((sql, params))
    }

    /// Run the aggregate.
    ///
    /// Fails with [`AnalysisError::NonNumeric`] when the measure still holds
    /// values that are not numbers.
    pub fn run<E>(&self, exec: &E) -> Result<RankedAggregate, AnalysisError>
    where
        E: QueryExecutor + ?Sized,
    {
        let (sql, params) = self.to_sql()?;
        self.relation.check(exec)?;
        for col in self.referenced_columns() {
            require_columns(exec, &col.table, &[col.column.as_str()])?;
        }
        if self.function != AggregateFn::Count {
            let invalid = detect_invalid_numeric(exec, &self.measure.table, &self.measure.column)?;
            if !invalid.is_clean() {
                return Err(invalid.into_error());
            }
        }

        let label = format!(
            "rank {:?} of {}.{}",
            self.function, self.measure.table, self.measure.column
        );
        let rows = exec.query_rows(&label, &sql, &params)?;
        let groups = self.decode(&rows);
        info!(label, groups = groups.len(), "ranked aggregate");
        Ok(RankedAggregate { rows, groups })
    }

    fn decode(&self, rows: &RowSet) -> Vec<RankedGroup> {
        (0..rows.row_count())
            .map(|i| RankedGroup {
                partition: self
                    .partition_by
                    .as_ref()
                    .and_then(|p| rows.get(i, &p.column))
                    .and_then(cell_as_text),
                keys: self
                    .group_by
                    .iter()
                    .map(|k| rows.get(i, &k.column).and_then(cell_as_text))
                    .collect(),
                value: rows.get(i, &self.value_name).and_then(cell_as_f64).unwrap_or(0.0),
                rows: rows
                    .get(i, &self.count_name)
                    .and_then(cell_as_i64)
                    .unwrap_or(0)
                    .max(0) as u64,
                rank: rows
                    .get(i, &self.rank_name)
                    .and_then(cell_as_i64)
                    .unwrap_or(0)
                    .max(0) as u64,
            })
            .collect()
    }
}

/// Mean sales performance per store location, ranked.
pub fn employee_performance_by_location() -> GroupedAggregate {
    GroupedAggregate::new(
        Relation::table("Employee_Records"),
        vec![ColumnRef::new("Employee_Records", "store_location")],
        ColumnRef::new("Employee_Records", "sales_performance"),
        AggregateFn::Mean,
    )
    .names("avg_sales", "employee_count", "location_rank")
}

/// Units sold per product, ranked within each category, best `top_n` kept.
pub fn top_products_by_category(top_n: u32) -> GroupedAggregate {
    GroupedAggregate::new(
        Relation::table("Sales_Transactions").join("Product_Details", "product_id"),
        vec![
            ColumnRef::new("Product_Details", "category"),
            ColumnRef::new("Product_Details", "product_name"),
        ],
        ColumnRef::new("Sales_Transactions", "quantity"),
        AggregateFn::Sum,
    )
    .partition_by(ColumnRef::new("Product_Details", "category"))
    .top_n(top_n)
    .names("total_sold", "sale_count", "rank_in_category")
}
