//! Guarantor staking: a parallel approval gate on the loan, not a
//! transition of its own. Pledge rows are created when pledges are
//! requested, each guarantor answers exactly once, and officer assignment
//! is gated on every pledge being accepted.

use std::sync::Arc;

use chrono::Duration;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::auth::{Action, Actor};
use crate::config::WorkflowConfig;
use crate::database::models::guarantor::{GuarantorStatus, LoanGuarantor};
use crate::database::models::loan::Loan;
use crate::database::models::workflow_log::{LoanWorkflowLog, WorkflowActionType};
use crate::database::store::SaccoStore;
use crate::error::{ServiceError, ServiceResult};
use crate::services::notify::{send_best_effort, Notification, NotificationSender};
use crate::services::Clock;

#[derive(Debug, Clone)]
pub struct GuarantorNomination {
    pub guarantor_member_id: Uuid,
    pub guaranteed_amount: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PledgeDecision {
    Accept,
    Reject,
}

/// Aggregate view over a loan's pledges, used as the officer-assignment gate.
#[derive(Debug, Clone, Copy)]
pub struct StakingStatus {
    pub total: usize,
    pub accepted: usize,
    pub pending: usize,
    pub rejected: usize,
}

impl StakingStatus {
    pub fn complete(&self) -> bool {
        self.total > 0 && self.accepted == self.total
    }
}

pub struct GuarantorService {
    store: Arc<dyn SaccoStore>,
    notifier: Arc<dyn NotificationSender>,
    clock: Arc<dyn Clock>,
    config: WorkflowConfig,
}

impl GuarantorService {
    pub fn new(
        store: Arc<dyn SaccoStore>,
        notifier: Arc<dyn NotificationSender>,
        clock: Arc<dyn Clock>,
        config: WorkflowConfig,
    ) -> Self {
        Self {
            store,
            notifier,
            clock,
            config,
        }
    }

    /// Create pledge rows for the nominated guarantors and notify each one.
    /// Returns the number of requests sent. The workflow service owns the
    /// accompanying loan transition.
    pub(crate) async fn create_and_notify(
        &self,
        loan: &Loan,
        nominations: &[GuarantorNomination],
    ) -> ServiceResult<usize> {
        if nominations.is_empty() {
            return Err(ServiceError::validation(
                "No guarantors configured for this loan",
            ));
        }

        let now = self.clock.now();
        let deadline = self.clock.today() + Duration::days(self.config.guarantor_response_days);
        let rows: Vec<LoanGuarantor> = nominations
            .iter()
            .map(|n| LoanGuarantor {
                id: Uuid::new_v4(),
                tenant_id: loan.tenant_id,
                loan_id: loan.id,
                guarantor_member_id: n.guarantor_member_id,
                guaranteed_amount: n.guaranteed_amount,
                status: GuarantorStatus::Pending,
                accepted_at: None,
                rejected_at: None,
                rejection_reason: None,
                notification_sent_at: Some(now),
                response_deadline: Some(deadline),
                created_at: now,
            })
            .collect();
        self.store.create_guarantors(&rows).await?;

        for row in &rows {
            send_best_effort(
                self.notifier.as_ref(),
                Notification {
                    recipient_member_id: row.guarantor_member_id,
                    subject: "Guarantor pledge requested".to_string(),
                    body: format!(
                        "You have been requested to guarantee loan {} for P {}. Please respond by {}.",
                        loan.loan_number, row.guaranteed_amount, deadline
                    ),
                },
            )
            .await;
        }
        Ok(rows.len())
    }

    /// Guarantor-side accept/reject. The responding actor must be the
    /// nominated guarantor member; accepted and rejected are terminal.
    pub async fn respond(
        &self,
        actor: &Actor,
        guarantor_id: Uuid,
        decision: PledgeDecision,
        reason: Option<String>,
    ) -> ServiceResult<LoanGuarantor> {
        actor.authorize(Action::RespondToPledge, actor.tenant_id)?;

        let mut row = self.store.guarantor(actor.tenant_id, guarantor_id).await?;
        if row.guarantor_member_id != actor.user_id {
            return Err(ServiceError::not_found("Guarantor request not found"));
        }
        if row.status != GuarantorStatus::Pending {
            return Err(ServiceError::state_conflict(
                row.status.to_string(),
                format!("Guarantor request already {}", row.status),
            ));
        }

        let now = self.clock.now();
        let notes = match decision {
            PledgeDecision::Accept => {
                row.status = GuarantorStatus::Accepted;
                row.accepted_at = Some(now);
                "Guarantor accepted pledge".to_string()
            }
            PledgeDecision::Reject => {
                row.status = GuarantorStatus::Rejected;
                row.rejected_at = Some(now);
                row.rejection_reason = reason.clone();
                match &reason {
                    Some(r) => format!("Guarantor rejected pledge: {r}"),
                    None => "Guarantor rejected pledge".to_string(),
                }
            }
        };
        self.store.update_guarantor(&row).await?;
        self.store
            .append_workflow_log(&LoanWorkflowLog::new(
                row.loan_id,
                WorkflowActionType::GuarantorResponse,
                actor.user_id,
                notes,
                now,
            ))
            .await?;
        Ok(row)
    }

    pub async fn staking_status(&self, loan_id: Uuid) -> ServiceResult<StakingStatus> {
        let rows = self.store.loan_guarantors(loan_id).await?;
        let accepted = rows
            .iter()
            .filter(|g| g.status == GuarantorStatus::Accepted)
            .count();
        let pending = rows
            .iter()
            .filter(|g| g.status == GuarantorStatus::Pending)
            .count();
        let rejected = rows
            .iter()
            .filter(|g| g.status == GuarantorStatus::Rejected)
            .count();
        Ok(StakingStatus {
            total: rows.len(),
            accepted,
            pending,
            rejected,
        })
    }
}
