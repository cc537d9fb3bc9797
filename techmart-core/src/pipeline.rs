//! End-to-end cleaning and reporting run.
//!
//! Stages execute in a fixed order and the first failure aborts the run.
//! Indexes are only built after every cleaning entry has been applied.

use crate::config::AnalysisConfig;
use crate::detect::{
    InvalidValueReport, MissingValueReport, detect_invalid_numeric, detect_missing,
};
use crate::error::AnalysisError;
use crate::index::{IndexOutcome, ensure_index};
use crate::normalize::{NormalizeOutcome, normalize};
use crate::rank::{RankedAggregate, employee_performance_by_location, top_products_by_category};
use crate::revenue::{RevenueBreakdown, RevenueReport};
use crate::session::Session;
use crate::share::{ShareReport, customer_spending};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::info;
use uuid::Uuid;

/// A step of the pipeline, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Detect,
    ScanInvalid,
    Normalize,
    Redetect,
    Index,
    RankLocations,
    TopProducts,
    CustomerShare,
    Revenue,
}

impl PipelineStage {
    pub const ALL: [PipelineStage; 9] = [
        PipelineStage::Detect,
        PipelineStage::ScanInvalid,
        PipelineStage::Normalize,
        PipelineStage::Redetect,
        PipelineStage::Index,
        PipelineStage::RankLocations,
        PipelineStage::TopProducts,
        PipelineStage::CustomerShare,
        PipelineStage::Revenue,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            PipelineStage::Detect => "detect",
            PipelineStage::ScanInvalid => "scan_invalid",
            PipelineStage::Normalize => "normalize",
            PipelineStage::Redetect => "redetect",
            PipelineStage::Index => "index",
            PipelineStage::RankLocations => "rank_locations",
            PipelineStage::TopProducts => "top_products",
            PipelineStage::CustomerShare => "customer_share",
            PipelineStage::Revenue => "revenue",
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything a pipeline run produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub missing_before: Vec<MissingValueReport>,
    /// Offending values found before cleaning, one per cleaning entry.
    pub invalid_before: Vec<InvalidValueReport>,
    pub normalized: Vec<NormalizeOutcome>,
    pub missing_after: Vec<MissingValueReport>,
    pub indexes: Vec<IndexOutcome>,
    pub location_ranking: RankedAggregate,
    pub top_products: RankedAggregate,
    pub customer_spending: ShareReport,
    pub revenue: RevenueReport,
}

impl PipelineReport {
    /// Rows rewritten across every cleaning entry.
    pub fn rows_rewritten(&self) -> usize {
        self.normalized.iter().map(|n| n.rows_rewritten).sum()
    }
}

/// Configured run over one session.
#[derive(Debug, Clone)]
pub struct Pipeline {
    config: AnalysisConfig,
}

impl Pipeline {
    pub fn new(config: AnalysisConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub fn run(&self, session: &mut Session) -> Result<PipelineReport, AnalysisError> {
        self.config.validate()?;
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        info!(%run_id, db = %session.path().display(), "pipeline started");

        let missing_before = stage(PipelineStage::Detect, || self.detect_all(&*session))?;

        let invalid_before = stage(PipelineStage::ScanInvalid, || {
            self.config
                .cleaning
                .iter()
                .map(|c| detect_invalid_numeric(&*session, &c.table, &c.column))
                .collect::<Result<Vec<_>, _>>()
        })?;

        let mut normalized = Vec::with_capacity(self.config.cleaning.len());
        for target in &self.config.cleaning {
            let outcome = normalize(session, &target.table, &target.column, &target.rules)
                .map_err(|e| {
                    AnalysisError::stage(
                        format!("{} {}.{}", PipelineStage::Normalize, target.table, target.column),
                        e,
                    )
                })?;
            normalized.push(outcome);
        }

        let missing_after = stage(PipelineStage::Redetect, || self.detect_all(&*session))?;

        let indexes = stage(PipelineStage::Index, || {
            self.config
                .indexes
                .iter()
                .map(|spec| ensure_index(&*session, spec))
                .collect::<Result<Vec<_>, _>>()
        })?;

        let location_ranking = stage(PipelineStage::RankLocations, || {
            employee_performance_by_location().run(&*session)
        })?;
        let top_products = stage(PipelineStage::TopProducts, || {
            top_products_by_category(self.config.analysis.top_n).run(&*session)
        })?;
        let customer_spending =
            stage(PipelineStage::CustomerShare, || customer_spending().run(&*session))?;
        let revenue = stage(PipelineStage::Revenue, || {
            RevenueBreakdown::new(self.config.analysis.revenue_categories.clone()).run(&*session)
        })?;

        let finished_at = Utc::now();
        let report = PipelineReport {
            run_id,
            started_at,
            finished_at,
            missing_before,
            invalid_before,
            normalized,
            missing_after,
            indexes,
            location_ranking,
            top_products,
            customer_spending,
            revenue,
        };
        info!(
            %run_id,
            rows_rewritten = report.rows_rewritten(),
            elapsed_ms = (finished_at - started_at).num_milliseconds(),
            "pipeline finished"
        );
        Ok(report)
    }

    fn detect_all(&self, session: &Session) -> Result<Vec<MissingValueReport>, AnalysisError> {
        self.config
            .detection
            .iter()
            .map(|target| {
                let columns: Vec<&str> = target.columns.iter().map(String::as_str).collect();
                detect_missing(session, &target.table, &columns)
            })
            .collect()
    }
}

fn stage<T, F>(stage: PipelineStage, f: F) -> Result<T, AnalysisError>
where
    F: FnOnce() -> Result<T, AnalysisError>,
{
    let result = f().map_err(|e| AnalysisError::stage(stage.as_str(), e))?;
    info!(stage = %stage, "stage complete");
    Ok(result)
}
