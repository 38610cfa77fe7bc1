use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DeductionRequestStatus {
    Draft,
    Submitted,
    Processing,
    Completed,
    Failed,
}

/// Why a member's instruction differs from (or first appears relative to)
/// the prior month's batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ChangeReason {
    NewEnrollment,
    AmountChange,
    ManualAdjustment,
    PolicyMaturity,
    StatusChange,
}

/// One month's payroll-deduction instruction batch for a tenant. The CSV
/// rendered from its items is the artifact actually submitted to the
/// payroll authority; no deduction is executed inside this platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeductionRequest {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub batch_number: String,
    pub month: u32,
    pub year: i32,
    pub total_members: u32,
    pub total_amount: Decimal,
    pub status: DeductionRequestStatus,
    pub submitted_by: Option<Uuid>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Per-product-category split of one member's expected deduction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeductionBreakdown {
    pub savings: Decimal,
    pub loan_repayment: Decimal,
    pub insurance: Decimal,
}

impl DeductionBreakdown {
    pub fn total(&self) -> Decimal {
        self.savings + self.loan_repayment + self.insurance
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeductionItem {
    pub id: Uuid,
    pub request_id: Uuid,
    pub member_id: Uuid,
    pub member_number: String,
    pub national_id: String,
    pub member_name: String,
    pub current_amount: Decimal,
    pub previous_amount: Decimal,
    pub change_reason: ChangeReason,
    pub breakdown: DeductionBreakdown,
    pub is_over_limit: bool,
    pub limit_notes: Option<String>,
}
