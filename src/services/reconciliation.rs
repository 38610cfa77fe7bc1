//! Expected-vs-actual deduction matching. The payroll authority's file is
//! diffed against the period's instruction batch from both sides: every
//! actual row is classified, then expected instructions absent from the
//! file are emitted as MISSING_IN_MOF. The engine only classifies and
//! reports; variance resolution is a downstream concern.

use std::collections::HashMap;
use std::sync::Arc;

use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;

use crate::auth::{Action, Actor};
use crate::database::models::deduction::DeductionItem;
use crate::database::models::reconciliation::{
    MatchStatus, ReconciliationBatch, ReconciliationItem, ReconciliationStatus, VarianceReason,
};
use crate::database::store::SaccoStore;
use crate::error::{ServiceError, ServiceResult};
use crate::services::Clock;

/// Row in the payroll authority's actual-deductions file.
#[derive(Debug, Deserialize)]
struct ActualRow {
    #[serde(rename = "memberNumber")]
    member_number: String,
    #[serde(rename = "actualAmount")]
    actual_amount: Decimal,
}

pub struct ReconciliationService {
    store: Arc<dyn SaccoStore>,
    clock: Arc<dyn Clock>,
}

impl ReconciliationService {
    pub fn new(store: Arc<dyn SaccoStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Run one reconciliation pass for (tenant, month, year). When a
    /// deduction request is linked it supplies the expected baseline;
    /// without one every actual row is an orphan.
    pub async fn reconcile(
        &self,
        actor: &Actor,
        month: u32,
        year: i32,
        actual_csv: &str,
        deduction_request_id: Option<Uuid>,
    ) -> ServiceResult<(ReconciliationBatch, Vec<ReconciliationItem>)> {
        actor.authorize(Action::Reconcile, actor.tenant_id)?;
        if !(1..=12).contains(&month) {
            return Err(ServiceError::validation("Month must be between 1 and 12"));
        }

        let mut expected: HashMap<String, DeductionItem> = HashMap::new();
        if let Some(request_id) = deduction_request_id {
            let request = self
                .store
                .deduction_request(actor.tenant_id, request_id)
                .await?;
            if request.month != month || request.year != year {
                return Err(ServiceError::validation(format!(
                    "Deduction request {} covers {}-{:02}, not {}-{:02}",
                    request.batch_number, request.year, request.month, year, month
                )));
            }
            for item in self.store.deduction_items(request_id).await? {
                expected.insert(item.member_number.clone(), item);
            }
        }

        let actual_rows = parse_actual_csv(actual_csv)?;
        let batch_id = Uuid::new_v4();
        let mut items = Vec::with_capacity(actual_rows.len() + expected.len());

        // Actual side: match each payroll row against the expected set,
        // consuming matches so leftovers fall out as missing.
        for row in actual_rows {
            let actual = row.actual_amount.round_dp(2);
            items.push(match expected.remove(&row.member_number) {
                Some(item) => {
                    let variance = actual - item.current_amount;
                    let (match_status, variance_reason) = classify(item.current_amount, actual);
                    ReconciliationItem {
                        id: Uuid::new_v4(),
                        batch_id,
                        member_id: Some(item.member_id),
                        member_number: item.member_number,
                        national_id: Some(item.national_id),
                        expected_amount: item.current_amount,
                        actual_amount: actual,
                        variance,
                        match_status,
                        variance_reason,
                        notes: None,
                        requires_manual_review: match_status != MatchStatus::Matched,
                    }
                }
                None => {
                    let member = self
                        .store
                        .member_by_number(actor.tenant_id, &row.member_number)
                        .await?;
                    ReconciliationItem {
                        id: Uuid::new_v4(),
                        batch_id,
                        member_id: member.as_ref().map(|m| m.id),
                        member_number: row.member_number,
                        national_id: member.map(|m| m.national_id),
                        expected_amount: Decimal::ZERO,
                        actual_amount: actual,
                        variance: actual,
                        match_status: MatchStatus::OrphanInMof,
                        variance_reason: None,
                        notes: Some(
                            "Deducted by payroll authority without a matching instruction"
                                .to_string(),
                        ),
                        requires_manual_review: true,
                    }
                }
            });
        }

        // Expected side: instructions the payroll authority never acted on.
        for (_, item) in expected {
            items.push(ReconciliationItem {
                id: Uuid::new_v4(),
                batch_id,
                member_id: Some(item.member_id),
                member_number: item.member_number,
                national_id: Some(item.national_id),
                expected_amount: item.current_amount,
                actual_amount: Decimal::ZERO,
                variance: -item.current_amount,
                match_status: MatchStatus::MissingInMof,
                variance_reason: None,
                notes: Some("Expected deduction absent from payroll authority file".to_string()),
                requires_manual_review: true,
            });
        }

        let mut batch = ReconciliationBatch {
            id: batch_id,
            tenant_id: actor.tenant_id,
            batch_number: format!(
                "REC-{}-{}{:02}",
                &actor.tenant_id.simple().to_string()[..8],
                year,
                month
            ),
            month,
            year,
            deduction_request_id,
            total_records: 0,
            matched_records: 0,
            variance_records: 0,
            unmatched_records: 0,
            total_expected: Decimal::ZERO,
            total_actual: Decimal::ZERO,
            total_variance: Decimal::ZERO,
            status: ReconciliationStatus::Completed,
            processed_by: actor.user_id,
            processed_at: self.clock.now(),
        };
        for item in &items {
            batch.total_records += 1;
            batch.total_expected += item.expected_amount;
            batch.total_actual += item.actual_amount;
            batch.total_variance += item.variance;
            match item.match_status {
                MatchStatus::Matched => batch.matched_records += 1,
                MatchStatus::Variance => batch.variance_records += 1,
                MatchStatus::MissingInMof | MatchStatus::OrphanInMof => {
                    batch.unmatched_records += 1
                }
            }
        }

        self.store.create_reconciliation(&batch, &items).await?;
        tracing::info!(
            batch = %batch.batch_number,
            records = batch.total_records,
            matched = batch.matched_records,
            variance = %batch.total_variance,
            "reconciliation completed"
        );
        Ok((batch, items))
    }
}

fn parse_actual_csv(content: &str) -> ServiceResult<Vec<ActualRow>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(content.as_bytes());
    let mut rows = Vec::new();
    for (index, record) in reader.deserialize::<ActualRow>().enumerate() {
        let row = record.map_err(|e| {
            ServiceError::validation(format!("Invalid MoF CSV at row {}: {e}", index + 2))
        })?;
        if row.member_number.is_empty() {
            return Err(ServiceError::validation(format!(
                "Invalid MoF CSV at row {}: empty member number",
                index + 2
            )));
        }
        rows.push(row);
    }
    Ok(rows)
}

/// Variance classification per the cooperative's reconciliation rules:
/// nothing deducted means the member had no funds, a short deduction means
/// net pay could not cover it, and an over-deduction is an amount mismatch.
fn classify(expected: Decimal, actual: Decimal) -> (MatchStatus, Option<VarianceReason>) {
    if actual == expected {
        return (MatchStatus::Matched, None);
    }
    let reason = if actual.is_zero() {
        VarianceReason::InsufficientFunds
    } else if actual < expected {
        VarianceReason::NetPayTooLow
    } else {
        VarianceReason::AmountMismatch
    };
    (MatchStatus::Variance, Some(reason))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn variance_classification_table() {
        assert_eq!(classify(dec("500"), dec("500")), (MatchStatus::Matched, None));
        assert_eq!(
            classify(dec("500"), dec("0")),
            (MatchStatus::Variance, Some(VarianceReason::InsufficientFunds))
        );
        assert_eq!(
            classify(dec("500"), dec("300")),
            (MatchStatus::Variance, Some(VarianceReason::NetPayTooLow))
        );
        assert_eq!(
            classify(dec("500"), dec("600")),
            (MatchStatus::Variance, Some(VarianceReason::AmountMismatch))
        );
    }

    #[test]
    fn csv_parser_accepts_extra_columns() {
        let csv = "memberNumber,actualAmount,remark\nM001,500.00,ok\nM002,0,none\n";
        let rows = parse_actual_csv(csv).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].member_number, "M001");
        assert_eq!(rows[0].actual_amount, dec("500.00"));
        assert_eq!(rows[1].actual_amount, Decimal::ZERO);
    }

    #[test]
    fn csv_parser_reports_bad_rows() {
        let csv = "memberNumber,actualAmount\nM001,not-a-number\n";
        let err = parse_actual_csv(csv).unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
        assert!(err.to_string().contains("row 2"));
    }
}
