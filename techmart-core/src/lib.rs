//! # techmart-core: cleaning and ranked reporting over the TechMart store
//!
//! Works against a pre-seeded SQLite file holding four tables
//! (`Employee_Records`, `Product_Details`, `Customer_Demographics`,
//! `Sales_Transactions`). The building blocks:
//!
//! 1. **Detect**: count `NULL`/`"nan"` placeholders and find leftover text in numeric columns
//! 2. **Normalize**: rewrite sentinel values through a rule table, one transaction per column
//! 3. **Rank**: grouped aggregates with dense ranking, optional partitions and top-N
//! 4. **Share**: per-group totals against the grand total, including empty groups
//! 5. **Index**: build and verify secondary indexes for filtered lookups
//!
//! [`Pipeline`] strings them together in that order, then runs the standard reports.

pub mod config;
pub mod detect;
pub mod error;
pub mod index;
pub mod normalize;
pub mod pipeline;
pub mod present;
pub mod rank;
pub mod revenue;
pub mod rowset;
pub mod schema;
pub mod session;
pub mod share;

// Re-exports
pub use config::{AnalysisConfig, load_config};
pub use detect::{InvalidValueReport, MissingValueReport, detect_invalid_numeric, detect_missing};
pub use error::AnalysisError;
pub use index::{IndexSpec, ensure_index, uses_index};
pub use normalize::{RewriteRules, normalize};
pub use pipeline::{Pipeline, PipelineReport, PipelineStage};
pub use present::{JsonPresenter, ResultPresenter, TablePresenter};
pub use rank::{AggregateFn, ColumnRef, GroupedAggregate, RankedAggregate, Relation};
pub use revenue::{RevenueBreakdown, RevenueReport};
pub use rowset::RowSet;
pub use session::{QueryExecutor, Session};
pub use share::{ShareOfTotal, ShareReport};
