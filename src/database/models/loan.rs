use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

/// Loan workflow status. Transitions are owned exclusively by the workflow
/// service; no other collaborator writes this field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum LoanStatus {
    // Workflow stages
    Pending,
    Draft,
    PendingGuarantors,
    UnderAppraisal,
    AwaitingCommittee,
    CommitteeApproved,

    // Legacy/simple workflow
    Approved,

    // Post-approval stages
    Disbursed,
    Active,

    // Terminal states
    PaidOff,
    Rejected,
    Queried,
}

impl LoanStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, LoanStatus::PaidOff | LoanStatus::Rejected)
    }
}

/// Coarse-grained stage tag tracked in parallel with the status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum WorkflowStage {
    EligibilityCheck,
    GuarantorStaking,
    TechnicalAppraisal,
    CommitteeApproval,
    Disbursement,
    Completed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Loan {
    pub id: Uuid,
    pub tenant_id: Uuid,
    /// Human-readable, tenant-scoped unique
    pub loan_number: String,
    pub member_id: Uuid,
    pub product_id: Uuid,

    // Financial terms
    pub principal_amount: Decimal,
    /// Annual rate in percent
    pub interest_rate: Decimal,
    pub term_months: u32,
    pub monthly_installment: Decimal,
    pub processing_fee: Decimal,
    pub insurance_fee: Decimal,
    pub total_amount_due: Decimal,
    pub amount_paid: Decimal,
    pub outstanding_balance: Decimal,

    // Workflow state
    pub status: LoanStatus,
    pub workflow_stage: Option<WorkflowStage>,
    pub purpose: Option<String>,
    pub rejection_reason: Option<String>,
    pub eligibility_check_passed: bool,
    pub eligibility_report: Option<EligibilityReport>,
    pub loan_officer_id: Option<Uuid>,
    pub loan_officer_notes: Option<String>,
    pub loan_officer_review_date: Option<DateTime<Utc>>,
    pub committee_approval_date: Option<DateTime<Utc>>,

    // Dates
    pub application_date: NaiveDate,
    pub approval_date: Option<NaiveDate>,
    pub disbursement_date: Option<NaiveDate>,
    pub maturity_date: Option<NaiveDate>,

    pub approved_by: Option<Uuid>,
    pub disbursed_by: Option<Uuid>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Loan {
    pub fn is_past_due(&self, today: NaiveDate) -> bool {
        if self.status != LoanStatus::Active && self.status != LoanStatus::Disbursed {
            return false;
        }
        self.maturity_date.map(|m| today > m).unwrap_or(false)
    }
}

/// Snapshot of one eligibility run, persisted on the loan for audit.
/// Each check carries its pass/fail, a human-readable explanation, and the
/// numeric evidence behind it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EligibilityReport {
    pub passed: bool,
    pub savings_ratio: SavingsRatioCheck,
    pub active_loan: ActiveLoanCheck,
    pub membership_duration: MembershipDurationCheck,
    pub checked_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavingsRatioCheck {
    pub passed: bool,
    pub details: String,
    pub member_savings: Decimal,
    pub required_savings: Decimal,
    pub max_loan_amount: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveLoanCheck {
    pub passed: bool,
    pub details: String,
    pub active_loan_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MembershipDurationCheck {
    pub passed: bool,
    pub details: String,
    pub join_date: NaiveDate,
    pub months_as_member: i32,
    pub required_months: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn status_round_trips_through_snake_case() {
        assert_eq!(LoanStatus::CommitteeApproved.to_string(), "committee_approved");
        assert_eq!(
            LoanStatus::from_str("pending_guarantors").unwrap(),
            LoanStatus::PendingGuarantors
        );
    }

    #[test]
    fn terminal_states() {
        assert!(LoanStatus::Rejected.is_terminal());
        assert!(LoanStatus::PaidOff.is_terminal());
        assert!(!LoanStatus::Queried.is_terminal());
        assert!(!LoanStatus::Disbursed.is_terminal());
    }
}
