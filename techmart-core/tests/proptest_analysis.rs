//! Property-based tests for cleaning and ranking using proptest.

mod common;

use proptest::prelude::*;

use techmart_core::detect::{detect_missing, is_numeric_text};
use techmart_core::normalize::{RewriteRules, normalize};
use techmart_core::rank::employee_performance_by_location;
use techmart_core::share::customer_spending;
use techmart_core::{QueryExecutor, RowSet, Session};

fn employee_store(rows: &[(String, Option<String>)]) -> Session {
    let session = Session::open_in_memory().unwrap();
    session.connection().execute_batch(common::SCHEMA).unwrap();
    for (i, (location, perf)) in rows.iter().enumerate() {
        let id = i as i64 + 1;
        session
            .execute_statement(
                "seed employee",
                "INSERT INTO Employee_Records VALUES (?1, ?2, 'Clerk', ?3)",
                rusqlite::params![id, location, perf],
            )
            .unwrap();
    }
    session
}

/// One customer per entry, each with its own transaction amounts.
fn spending_store(spends: &[Vec<u32>]) -> Session {
    let session = Session::open_in_memory().unwrap();
    session.connection().execute_batch(common::SCHEMA).unwrap();
    let mut txn = 0i64;
    for (i, amounts) in spends.iter().enumerate() {
        let customer = i as i64 + 1;
        session
            .execute_statement(
                "seed customer",
                "INSERT INTO Customer_Demographics VALUES (?1, 30, 'Gold')",
                rusqlite::params![customer],
            )
            .unwrap();
        for amount in amounts {
            txn += 1;
            let amount = f64::from(*amount);
            session
                .execute_statement(
                    "seed transaction",
                    "INSERT INTO Sales_Transactions VALUES (?1, 1, 1, ?2, 1, ?3)",
                    rusqlite::params![txn, customer, amount],
                )
                .unwrap();
        }
    }
    session
}

fn performance(session: &Session) -> RowSet {
    session
        .query_rows(
            "snapshot",
            "SELECT employee_id, sales_performance FROM Employee_Records ORDER BY employee_id",
            &[],
        )
        .unwrap()
}

fn location() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("Toronto".to_string()),
        Just("Berlin".to_string()),
        Just("Paris".to_string()),
        Just("Lagos".to_string()),
    ]
}

fn raw_performance() -> impl Strategy<Value = Option<String>> {
    prop_oneof![
        Just(None),
        Just(Some("nan".to_string())),
        Just(Some("five thousand".to_string())),
        (0u32..20_000).prop_map(|n| Some(n.to_string())),
    ]
}

// --- Normalization properties ---

proptest! {
    #[test]
    fn normalization_is_idempotent(
        rows in prop::collection::vec((location(), raw_performance()), 0..40),
    ) {
        let mut session = employee_store(&rows);
        let rules = RewriteRules::numeric_defaults();

        normalize(&mut session, "Employee_Records", "sales_performance", &rules).unwrap();
        let once = performance(&session);
        let second = normalize(&mut session, "Employee_Records", "sales_performance", &rules).unwrap();

        prop_assert_eq!(second.rows_rewritten, 0);
        prop_assert_eq!(performance(&session), once);
    }

    #[test]
    fn normalized_values_are_absent_or_numeric(
        rows in prop::collection::vec((location(), raw_performance()), 0..40),
    ) {
        let mut session = employee_store(&rows);
        normalize(
            &mut session,
            "Employee_Records",
            "sales_performance",
            &RewriteRules::numeric_defaults(),
        )
        .unwrap();

        let snapshot = performance(&session);
        for i in 0..snapshot.row_count() {
            if let Some(v) = snapshot.text_at(i, "sales_performance") {
                prop_assert!(is_numeric_text(&v), "left behind {:?}", v);
            }
        }
    }

    #[test]
    fn detection_is_a_pure_read(
        rows in prop::collection::vec((location(), raw_performance()), 0..40),
    ) {
        let session = employee_store(&rows);
        let first = detect_missing(&session, "Employee_Records", &["sales_performance"]).unwrap();
        let second = detect_missing(&session, "Employee_Records", &["sales_performance"]).unwrap();
        let expected = rows
            .iter()
            .filter(|(_, p)| p.as_deref().is_none_or(|v| v == "nan"))
            .count() as u64;
        prop_assert_eq!(first.missing("sales_performance"), Some(expected));
        prop_assert_eq!(first.total_rows, rows.len() as u64);
        prop_assert_eq!(first, second);
    }
}

// --- Ranking properties ---

proptest! {
    #[test]
    fn rank_is_dense_and_follows_value(
        rows in prop::collection::vec(
            (location(), (0u32..10).prop_map(|n| Some((n * 1000).to_string()))),
            1..30,
        ),
    ) {
        let session = employee_store(&rows);
        let result = employee_performance_by_location().run(&session).unwrap();
        let groups = &result.groups;

        for a in groups {
            for b in groups {
                if a.value > b.value {
                    prop_assert!(a.rank < b.rank);
                }
                if a.value == b.value {
                    prop_assert_eq!(a.rank, b.rank);
                }
            }
        }

        // Dense: ranks cover 1..=k with no gaps.
        let mut ranks: Vec<u64> = groups.iter().map(|g| g.rank).collect();
        ranks.sort_unstable();
        ranks.dedup();
        let expected: Vec<u64> = (1..=ranks.len() as u64).collect();
        prop_assert_eq!(ranks, expected);

        let counted: u64 = groups.iter().map(|g| g.rows).sum();
        prop_assert_eq!(counted, rows.len() as u64);
    }
}

// --- Share-of-total properties ---

proptest! {
    #[test]
    fn share_percentages_sum_to_one_hundred(
        spends in prop::collection::vec(prop::collection::vec(0u32..10_000, 0..5), 1..15),
    ) {
        let spent: u64 = spends.iter().flatten().map(|a| u64::from(*a)).sum();
        prop_assume!(spent > 0);

        let session = spending_store(&spends);
        let report = customer_spending().run(&session).unwrap();

        prop_assert_eq!(report.shares.len(), spends.len());
        prop_assert_eq!(report.grand_total(), spent as f64);

        // Each percentage is rounded to two places.
        let tolerance = 0.005 * report.shares.len() as f64 + 1e-9;
        prop_assert!(
            (report.percentage_sum() - 100.0).abs() <= tolerance,
            "sum was {}",
            report.percentage_sum()
        );

        let last_rank = report.shares.iter().map(|s| s.rank).max().unwrap();
        for share in &report.shares {
            if share.detail_count == 0 {
                prop_assert_eq!(share.total, 0.0);
                prop_assert_eq!(share.percentage, 0.0);
                prop_assert_eq!(share.rank, last_rank);
            }
        }
    }
}
