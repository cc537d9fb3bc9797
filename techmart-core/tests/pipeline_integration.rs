//! End-to-end pipeline runs against a seeded store.

mod common;

use pretty_assertions::assert_eq;
use techmart_core::config::AnalysisConfig;
use techmart_core::detect::detect_invalid_numeric;
use techmart_core::index::uses_index;
use techmart_core::normalize::RewriteRules;
use techmart_core::{AnalysisError, JsonPresenter, Pipeline, ResultPresenter, Session, TablePresenter};

#[test]
fn test_full_run_cleans_and_reports() {
    let (_dir, path) = common::seeded_store();
    let mut session = Session::open(&path).unwrap();
    let report = Pipeline::new(AnalysisConfig::default())
        .run(&mut session)
        .unwrap();

    assert!(report.finished_at >= report.started_at);
    assert_eq!(report.missing_before.len(), 3);
    assert_eq!(report.missing_before[0].missing("sales_performance"), Some(2));

    // "five thousand" in both columns was caught before cleaning.
    let invalid: Vec<u64> = report.invalid_before.iter().map(|r| r.invalid_rows).collect();
    assert_eq!(invalid, vec![1, 1]);

    let rewritten: Vec<usize> = report.normalized.iter().map(|n| n.rows_rewritten).collect();
    assert_eq!(rewritten, vec![2, 2]);
    assert_eq!(report.rows_rewritten(), 4);

    for (table, column) in [
        ("Employee_Records", "sales_performance"),
        ("Product_Details", "stock"),
    ] {
        assert!(detect_invalid_numeric(&session, table, column).unwrap().is_clean());
        let values = common::column_text(session.connection(), table, column);
        assert!(values.iter().flatten().all(|v| v != "nan"));
    }

    assert_eq!(report.location_ranking.groups[0].keys[0].as_deref(), Some("Paris"));
    assert_eq!(report.top_products.groups.len(), 5);
    assert_eq!(report.customer_spending.shares.len(), 4);
    assert_eq!(report.revenue.lines.len(), 6);

    session.close().unwrap();
}

#[test]
fn test_index_built_after_cleaning_is_used() {
    let (_dir, path) = common::seeded_store();
    let mut session = Session::open(&path).unwrap();
    let report = Pipeline::new(AnalysisConfig::default())
        .run(&mut session)
        .unwrap();

    assert_eq!(report.indexes.len(), 1);
    let index = &report.indexes[0];
    assert!(index.created);
    assert!(
        uses_index(
            &session,
            "SELECT product_name FROM Product_Details WHERE category = ?1",
            &[&"Electronics"],
            &index.name,
        )
        .unwrap()
    );
}

#[test]
fn test_second_run_rewrites_nothing() {
    let (_dir, path) = common::seeded_store();
    let mut session = Session::open(&path).unwrap();
    let pipeline = Pipeline::new(AnalysisConfig::default());

    let first = pipeline.run(&mut session).unwrap();
    let second = pipeline.run(&mut session).unwrap();

    assert_ne!(first.run_id, second.run_id);
    assert_eq!(second.rows_rewritten(), 0);
    assert!(second.invalid_before.iter().all(|r| r.is_clean()));
    assert!(second.indexes.iter().all(|i| !i.created));
    assert_eq!(first.location_ranking.rows, second.location_ranking.rows);
    assert_eq!(first.customer_spending.rows, second.customer_spending.rows);
}

#[test]
fn test_uncleaned_column_aborts_at_ranking() {
    let (_dir, path) = common::seeded_store();
    let mut session = Session::open(&path).unwrap();
    let mut config = AnalysisConfig::default();
    config
        .cleaning
        .retain(|c| c.table != "Employee_Records");

    let err = Pipeline::new(config).run(&mut session).unwrap_err();
    match &err {
        AnalysisError::Stage { stage, .. } => assert_eq!(stage, "rank_locations"),
        other => panic!("unexpected error: {other}"),
    }
    assert!(matches!(err.root_cause(), AnalysisError::NonNumeric { .. }));
}

#[test]
fn test_custom_rules_flow_through_config() {
    let (_dir, path) = common::seeded_store();
    let mut session = Session::open(&path).unwrap();
    let mut config = AnalysisConfig::default();
    for target in &mut config.cleaning {
        target.rules = RewriteRules::new()
            .rule("nan", None)
            .rule("five thousand", Some("5000"))
            .rule("12", Some("twelve"));
    }
    // "twelve" is not numeric: cleaning introduces a defect of its own.
    let report = Pipeline::new(config).run(&mut session).unwrap();
    let stock = detect_invalid_numeric(&session, "Product_Details", "stock").unwrap();
    assert_eq!(stock.samples, vec!["twelve"]);
    assert_eq!(report.normalized[1].rows_rewritten, 3);
}

#[test]
fn test_presenters_render_pipeline_results() {
    let (_dir, path) = common::seeded_store();
    let mut session = Session::open(&path).unwrap();
    let report = Pipeline::new(AnalysisConfig::default())
        .run(&mut session)
        .unwrap();

    let table = TablePresenter::default().render(&report.location_ranking.rows);
    assert!(table.starts_with("store_location | avg_sales | employee_count | location_rank"));
    assert!(table.ends_with("(3 rows)"));

    let json: serde_json::Value =
        serde_json::from_str(&JsonPresenter.render(&report.customer_spending.rows)).unwrap();
    assert_eq!(json[3]["total_spent"], serde_json::json!(0));
    assert_eq!(json[3]["revenue_percentage"], serde_json::json!(0.0));
}
