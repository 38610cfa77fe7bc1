use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ReconciliationStatus {
    Pending,
    InProgress,
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MatchStatus {
    Matched,
    Variance,
    /// Expected by us, absent from the payroll authority's file
    MissingInMof,
    /// Present in the payroll authority's file, not expected by us
    OrphanInMof,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum VarianceReason {
    InsufficientFunds,
    NetPayTooLow,
    AmountMismatch,
}

/// Summary of one reconciliation run. Aggregate fields are derived over the
/// items in a single pass and frozen once status reaches COMPLETED.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconciliationBatch {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub batch_number: String,
    pub month: u32,
    pub year: i32,
    pub deduction_request_id: Option<Uuid>,
    pub total_records: u32,
    pub matched_records: u32,
    pub variance_records: u32,
    pub unmatched_records: u32,
    pub total_expected: Decimal,
    pub total_actual: Decimal,
    /// Σ item.variance, i.e. total actual minus total expected
    pub total_variance: Decimal,
    pub status: ReconciliationStatus,
    pub processed_by: Uuid,
    pub processed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconciliationItem {
    pub id: Uuid,
    pub batch_id: Uuid,
    /// None when the member number could not be resolved within the tenant
    pub member_id: Option<Uuid>,
    pub member_number: String,
    pub national_id: Option<String>,
    pub expected_amount: Decimal,
    pub actual_amount: Decimal,
    /// actual minus expected
    pub variance: Decimal,
    pub match_status: MatchStatus,
    pub variance_reason: Option<VarianceReason>,
    pub notes: Option<String>,
    pub requires_manual_review: bool,
}
