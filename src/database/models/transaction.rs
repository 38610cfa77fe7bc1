use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TransactionType {
    LoanDisbursement,
    LoanRepayment,
    Deduction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Reversed,
    Failed,
}

/// Ledger-facing transaction record. Linked back to its source aggregate by
/// reference_id/reference_type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub member_id: Uuid,
    pub transaction_number: String,
    pub transaction_type: TransactionType,
    pub amount: Decimal,
    pub transaction_date: NaiveDate,
    pub description: String,
    pub reference_id: Option<Uuid>,
    pub reference_type: Option<String>,
    pub status: TransactionStatus,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
}
