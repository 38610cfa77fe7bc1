use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum GuarantorStatus {
    Pending,
    Accepted,
    Rejected,
    Released,
}

/// A guarantor's pledge against one loan. Accepted/rejected are terminal
/// per row; a rejected guarantor is replaced by a new row, never reused.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoanGuarantor {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub loan_id: Uuid,
    pub guarantor_member_id: Uuid,
    pub guaranteed_amount: Decimal,
    pub status: GuarantorStatus,
    pub accepted_at: Option<DateTime<Utc>>,
    pub rejected_at: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
    pub notification_sent_at: Option<DateTime<Utc>>,
    pub response_deadline: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
}

impl LoanGuarantor {
    pub fn has_responded(&self) -> bool {
        matches!(self.status, GuarantorStatus::Accepted | GuarantorStatus::Rejected)
    }
}
