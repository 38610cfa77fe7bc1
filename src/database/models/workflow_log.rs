use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::{Display, EnumString};
use uuid::Uuid;

use super::loan::LoanStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum WorkflowActionType {
    EligibilityCheck,
    StatusChange,
    OfficerAssign,
    OfficerReview,
    CommitteeVote,
    GuarantorResponse,
    Disbursement,
    Repayment,
}

/// Append-only audit trail. Every state-changing operation on a loan writes
/// exactly one row in the same atomic unit of work as the change itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoanWorkflowLog {
    pub id: Uuid,
    pub loan_id: Uuid,
    pub action_type: WorkflowActionType,
    pub action_by: Uuid,
    pub from_status: Option<LoanStatus>,
    pub to_status: Option<LoanStatus>,
    pub notes: String,
    pub metadata: Option<Value>,
    pub created_at: DateTime<Utc>,
}

impl LoanWorkflowLog {
    pub fn new(
        loan_id: Uuid,
        action_type: WorkflowActionType,
        action_by: Uuid,
        notes: impl Into<String>,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            loan_id,
            action_type,
            action_by,
            from_status: None,
            to_status: None,
            notes: notes.into(),
            metadata: None,
            created_at: at,
        }
    }

    pub fn transition(mut self, from: LoanStatus, to: LoanStatus) -> Self {
        self.from_status = Some(from);
        self.to_status = Some(to);
        self
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}
