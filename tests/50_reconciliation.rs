//! Reconciliation: variance classification, two-sided matching, and the
//! batch aggregate invariants.

mod common;

use common::{dec, Fixture};
use kika_core::database::models::reconciliation::{MatchStatus, VarianceReason};
use kika_core::database::store::SaccoStore;
use rust_decimal::Decimal;

/// Seed four members with known expected amounts and return the submitted
/// deduction request id.
async fn seeded_period(f: &Fixture) -> uuid::Uuid {
    // each member saves 200/month; extra premiums differentiate the totals
    let alice = f.seed_member("M301", "10000", 24);
    f.seed_policy(&alice, "300"); // expected 500
    let bob = f.seed_member("M302", "10000", 24);
    f.seed_policy(&bob, "300"); // expected 500
    let carol = f.seed_member("M303", "10000", 24);
    f.seed_policy(&carol, "300"); // expected 500
    let dave = f.seed_member("M304", "10000", 24);
    f.seed_policy(&dave, "300"); // expected 500

    let (request, _) = f
        .deductions()
        .generate_batch(&f.admin(), 6, 2025)
        .await
        .unwrap();
    request.id
}

#[tokio::test]
async fn variance_classification_per_row() {
    let f = Fixture::new();
    let request_id = seeded_period(&f).await;

    let csv = "memberNumber,actualAmount\n\
               M301,500\n\
               M302,0\n\
               M303,300\n\
               M304,600\n";
    let (_, items) = f
        .reconciliation()
        .reconcile(&f.admin(), 6, 2025, csv, Some(request_id))
        .await
        .unwrap();

    let by_number = |n: &str| items.iter().find(|i| i.member_number == n).unwrap();

    let matched = by_number("M301");
    assert_eq!(matched.match_status, MatchStatus::Matched);
    assert_eq!(matched.variance, Decimal::ZERO);
    assert!(!matched.requires_manual_review);

    let insufficient = by_number("M302");
    assert_eq!(insufficient.match_status, MatchStatus::Variance);
    assert_eq!(insufficient.variance_reason, Some(VarianceReason::InsufficientFunds));
    assert_eq!(insufficient.variance, dec("-500"));

    let short = by_number("M303");
    assert_eq!(short.variance_reason, Some(VarianceReason::NetPayTooLow));
    assert_eq!(short.variance, dec("-200"));

    let over = by_number("M304");
    assert_eq!(over.variance_reason, Some(VarianceReason::AmountMismatch));
    assert_eq!(over.variance, dec("100"));
}

#[tokio::test]
async fn two_sided_matching_finds_missing_and_orphans() {
    let f = Fixture::new();
    let request_id = seeded_period(&f).await;
    // a member the payroll authority knows but we never instructed
    f.seed_member("M399", "5000", 24);

    // M303 and M304 are absent from the file; M399 and M400 are extra
    let csv = "memberNumber,actualAmount\n\
               M301,500\n\
               M302,500\n\
               M399,250\n\
               M400,80\n";
    let (batch, items) = f
        .reconciliation()
        .reconcile(&f.admin(), 6, 2025, csv, Some(request_id))
        .await
        .unwrap();

    let by_number = |n: &str| items.iter().find(|i| i.member_number == n).unwrap();

    let known_orphan = by_number("M399");
    assert_eq!(known_orphan.match_status, MatchStatus::OrphanInMof);
    assert!(known_orphan.member_id.is_some());
    assert_eq!(known_orphan.variance, dec("250"));

    // unknown member number still produces a row, without a resolved id
    let unknown_orphan = by_number("M400");
    assert_eq!(unknown_orphan.match_status, MatchStatus::OrphanInMof);
    assert!(unknown_orphan.member_id.is_none());
    assert!(unknown_orphan.national_id.is_none());

    let missing = by_number("M303");
    assert_eq!(missing.match_status, MatchStatus::MissingInMof);
    assert_eq!(missing.actual_amount, Decimal::ZERO);
    assert_eq!(missing.variance, dec("-500"));

    assert_eq!(batch.total_records, 6);
    assert_eq!(batch.matched_records, 2);
    assert_eq!(batch.variance_records, 0);
    assert_eq!(batch.unmatched_records, 4);
}

#[tokio::test]
async fn batch_aggregates_satisfy_their_invariants() {
    let f = Fixture::new();
    let request_id = seeded_period(&f).await;

    let csv = "memberNumber,actualAmount\n\
               M301,500\n\
               M302,450\n\
               M303,0\n\
               M401,90\n";
    let (batch, items) = f
        .reconciliation()
        .reconcile(&f.admin(), 6, 2025, csv, Some(request_id))
        .await
        .unwrap();

    let variance_sum: Decimal = items.iter().map(|i| i.variance).sum();
    assert_eq!(batch.total_variance, variance_sum);
    assert_eq!(
        batch.total_variance,
        batch.total_actual - batch.total_expected
    );
    assert_eq!(
        batch.matched_records + batch.variance_records + batch.unmatched_records,
        batch.total_records
    );
    assert_eq!(batch.total_records as usize, items.len());

    // frozen summary is what the store returns afterwards
    let stored = f
        .store
        .reconciliation_batch(f.tenant_id, batch.id)
        .await
        .unwrap();
    assert_eq!(stored.total_variance, batch.total_variance);
    assert_eq!(stored.matched_records, batch.matched_records);
}

#[tokio::test]
async fn export_and_reconcile_round_trip_matches_everything() {
    let f = Fixture::new();
    let request_id = seeded_period(&f).await;

    // Rewrite the export into the actuals format: every member deducted
    // exactly as instructed.
    let export = f
        .deductions()
        .export_csv(&f.admin(), request_id)
        .await
        .unwrap();
    let mut actuals = String::from("memberNumber,actualAmount\n");
    for line in export.lines().skip(1) {
        let fields: Vec<&str> = line.split(',').collect();
        actuals.push_str(&format!("{},{}\n", fields[0], fields[6]));
    }

    let (batch, _) = f
        .reconciliation()
        .reconcile(&f.admin(), 6, 2025, &actuals, Some(request_id))
        .await
        .unwrap();
    assert_eq!(batch.matched_records, batch.total_records);
    assert_eq!(batch.total_variance, Decimal::ZERO);
    assert_eq!(batch.unmatched_records, 0);
}

#[tokio::test]
async fn reconcile_without_baseline_marks_everything_orphan() {
    let f = Fixture::new();
    f.seed_member("M305", "5000", 24);

    let csv = "memberNumber,actualAmount\nM305,120\n";
    let (batch, items) = f
        .reconciliation()
        .reconcile(&f.admin(), 6, 2025, csv, None)
        .await
        .unwrap();
    assert_eq!(batch.unmatched_records, 1);
    assert_eq!(items[0].match_status, MatchStatus::OrphanInMof);
    assert_eq!(items[0].expected_amount, Decimal::ZERO);
}

#[tokio::test]
async fn period_mismatch_with_linked_request_is_rejected() {
    let f = Fixture::new();
    let request_id = seeded_period(&f).await; // covers 2025-06

    let err = f
        .reconciliation()
        .reconcile(&f.admin(), 7, 2025, "memberNumber,actualAmount\n", Some(request_id))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "VALIDATION_ERROR");
    assert!(err.to_string().contains("covers 2025-06"));
}
