//! Credit-committee voting: ballots accumulate against a loan in
//! AWAITING_COMMITTEE, a decision is finalized once quorum is met, and a
//! minutes document can be rendered from the record at any point.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::json;
use uuid::Uuid;

use crate::auth::{Action, Actor};
use crate::config::WorkflowConfig;
use crate::database::models::loan::{LoanStatus, WorkflowStage};
use crate::database::models::vote::{LoanVote, VoteChoice, VoteTally};
use crate::database::models::workflow_log::{LoanWorkflowLog, WorkflowActionType};
use crate::database::store::SaccoStore;
use crate::error::{ServiceError, ServiceResult};
use crate::services::Clock;

/// Outcome of a finalization attempt. Quorum-not-met leaves the loan
/// untouched and may be retried as more ballots arrive; the other two are
/// terminal for the committee stage.
#[derive(Debug, Clone)]
pub enum CommitteeDecision {
    QuorumNotMet { tally: VoteTally },
    Approved { tally: VoteTally },
    Rejected { tally: VoteTally },
}

impl CommitteeDecision {
    pub fn message(&self) -> String {
        match self {
            CommitteeDecision::QuorumNotMet { tally } => format!(
                "Quorum not met. Need {} votes, have {}",
                tally.required_quorum, tally.total_votes
            ),
            CommitteeDecision::Approved { .. } => "Loan approved by committee".to_string(),
            CommitteeDecision::Rejected { .. } => "Loan rejected by committee".to_string(),
        }
    }

    pub fn is_final(&self) -> bool {
        !matches!(self, CommitteeDecision::QuorumNotMet { .. })
    }
}

/// Official minutes for the committee's consideration of one loan.
#[derive(Debug, Clone, Serialize)]
pub struct MinutesDocument {
    pub loan_number: String,
    pub member_name: String,
    pub member_number: String,
    pub product_name: String,
    pub principal_amount: Decimal,
    pub term_months: u32,
    pub interest_rate: Decimal,
    pub meeting_date: DateTime<Utc>,
    pub tally: VoteTally,
    pub decision: String,
    pub votes: Vec<MinuteVote>,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MinuteVote {
    pub voter_id: Uuid,
    pub vote: VoteChoice,
    pub notes: Option<String>,
    pub cast_at: DateTime<Utc>,
}

pub struct CommitteeService {
    store: Arc<dyn SaccoStore>,
    clock: Arc<dyn Clock>,
    config: WorkflowConfig,
}

impl CommitteeService {
    pub fn new(store: Arc<dyn SaccoStore>, clock: Arc<dyn Clock>, config: WorkflowConfig) -> Self {
        Self {
            store,
            clock,
            config,
        }
    }

    /// Record (or replace) the voter's ballot. A repeated submission from
    /// the same voter overwrites their earlier ballot rather than
    /// double-counting.
    pub async fn record_vote(
        &self,
        actor: &Actor,
        loan_id: Uuid,
        vote: VoteChoice,
        notes: Option<String>,
    ) -> ServiceResult<VoteTally> {
        actor.authorize(Action::CastCommitteeVote, actor.tenant_id)?;
        let loan = self.store.loan(actor.tenant_id, loan_id).await?;
        if loan.status != LoanStatus::AwaitingCommittee {
            return Err(ServiceError::state_conflict(
                loan.status.to_string(),
                format!("Cannot vote on loan with status: {}", loan.status),
            ));
        }

        let now = self.clock.now();
        self.store
            .upsert_vote(&LoanVote {
                id: Uuid::new_v4(),
                loan_id,
                voter_id: actor.user_id,
                vote,
                notes: notes.clone(),
                cast_at: now,
            })
            .await?;
        self.store
            .append_workflow_log(
                &LoanWorkflowLog::new(
                    loan_id,
                    WorkflowActionType::CommitteeVote,
                    actor.user_id,
                    match &notes {
                        Some(n) => format!("Voted: {vote} - {n}"),
                        None => format!("Voted: {vote}"),
                    },
                    now,
                )
                .with_metadata(json!({ "vote": vote, "notes": notes })),
            )
            .await?;

        let votes = self.store.loan_votes(loan_id).await?;
        Ok(VoteTally::count(&votes, self.config.required_quorum))
    }

    /// Finalize the committee stage once quorum is reached. Majority
    /// approval moves the loan to COMMITTEE_APPROVED; a majority rejection
    /// or a tie rejects it. Below quorum nothing changes and the call can
    /// be retried later.
    pub async fn finalize_decision(
        &self,
        actor: &Actor,
        loan_id: Uuid,
        required_quorum: Option<usize>,
    ) -> ServiceResult<CommitteeDecision> {
        actor.authorize(Action::FinalizeCommitteeDecision, actor.tenant_id)?;
        let mut loan = self.store.loan(actor.tenant_id, loan_id).await?;
        if loan.status != LoanStatus::AwaitingCommittee {
            return Err(ServiceError::state_conflict(
                loan.status.to_string(),
                format!("Cannot finalize committee decision for loan with status: {}", loan.status),
            ));
        }

        let quorum = required_quorum.unwrap_or(self.config.required_quorum);
        let votes = self.store.loan_votes(loan_id).await?;
        let tally = VoteTally::count(&votes, quorum);
        if !tally.quorum_met {
            return Ok(CommitteeDecision::QuorumNotMet { tally });
        }

        let now = self.clock.now();
        let from = loan.status;
        let (decision, notes) = if tally.approved() {
            loan.status = LoanStatus::CommitteeApproved;
            loan.workflow_stage = Some(WorkflowStage::Disbursement);
            loan.committee_approval_date = Some(now);
            (
                CommitteeDecision::Approved { tally: tally.clone() },
                format!(
                    "Committee approved ({}/{} votes)",
                    tally.approve_votes, tally.total_votes
                ),
            )
        } else {
            loan.status = LoanStatus::Rejected;
            loan.rejection_reason = Some(format!(
                "Rejected by credit committee ({} reject votes vs {} approve votes)",
                tally.reject_votes, tally.approve_votes
            ));
            (
                CommitteeDecision::Rejected { tally: tally.clone() },
                format!(
                    "Committee rejected ({}/{} votes)",
                    tally.reject_votes, tally.total_votes
                ),
            )
        };
        loan.updated_at = now;

        let log = LoanWorkflowLog::new(
            loan_id,
            WorkflowActionType::StatusChange,
            actor.user_id,
            notes,
            now,
        )
        .transition(from, loan.status)
        .with_metadata(json!({ "voteResult": tally }));
        self.store
            .update_loan_logged(&loan, &[LoanStatus::AwaitingCommittee], &log)
            .await?;

        Ok(decision)
    }

    /// Render the minutes for the loan's committee record. Pure read; no
    /// state is mutated.
    pub async fn generate_minutes(
        &self,
        actor: &Actor,
        loan_id: Uuid,
    ) -> ServiceResult<MinutesDocument> {
        let loan = self.store.loan(actor.tenant_id, loan_id).await?;
        let member = self.store.member(loan.tenant_id, loan.member_id).await?;
        let product = self
            .store
            .loan_product(loan.tenant_id, loan.product_id)
            .await?;
        let votes = self.store.loan_votes(loan_id).await?;
        let tally = VoteTally::count(&votes, self.config.required_quorum);
        let now = self.clock.now();

        Ok(MinutesDocument {
            loan_number: loan.loan_number,
            member_name: member.full_name(),
            member_number: member.member_number,
            product_name: product.name,
            principal_amount: loan.principal_amount,
            term_months: loan.term_months,
            interest_rate: loan.interest_rate,
            meeting_date: loan.committee_approval_date.unwrap_or(now),
            decision: if tally.approved() {
                "APPROVED".to_string()
            } else {
                "REJECTED".to_string()
            },
            tally,
            votes: votes
                .into_iter()
                .map(|v| MinuteVote {
                    voter_id: v.voter_id,
                    vote: v.vote,
                    notes: v.notes,
                    cast_at: v.cast_at,
                })
                .collect(),
            generated_at: now,
        })
    }
}
