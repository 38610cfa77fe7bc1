//! The loan workflow state machine. Owns the loan's status and stage,
//! validates legal transitions, and applies their side effects. Every
//! state change commits together with its audit row; the disbursement
//! commit additionally carries the ledger transaction.

use std::sync::Arc;

use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::json;
use uuid::Uuid;

use crate::auth::{Action, Actor};
use crate::config::WorkflowConfig;
use crate::database::models::guarantor::GuarantorStatus;
use crate::database::models::loan::{EligibilityReport, Loan, LoanStatus, WorkflowStage};
use crate::database::models::transaction::{Transaction, TransactionStatus, TransactionType};
use crate::database::models::workflow_log::{LoanWorkflowLog, WorkflowActionType};
use crate::database::store::SaccoStore;
use crate::error::{ServiceError, ServiceResult};
use crate::finance;
use crate::services::eligibility::EligibilityService;
use crate::services::guarantors::{GuarantorNomination, GuarantorService};
use crate::services::notify::{send_best_effort, Notification, NotificationSender};
use crate::services::Clock;

#[derive(Debug, Clone)]
pub struct NewLoanApplication {
    pub member_id: Uuid,
    pub product_id: Uuid,
    pub principal_amount: Decimal,
    pub term_months: u32,
    pub purpose: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DisbursementDetails {
    pub method: String,
    pub account_number: String,
    pub notes: Option<String>,
}

/// Caller-facing snapshot returned by the disbursement operation.
#[derive(Debug, Clone, Serialize)]
pub struct LoanSummary {
    pub id: Uuid,
    pub loan_number: String,
    pub status: LoanStatus,
    pub disbursement_date: Option<chrono::NaiveDate>,
    pub maturity_date: Option<chrono::NaiveDate>,
    pub outstanding_balance: Decimal,
    pub monthly_installment: Decimal,
}

/// Tenant-wide lending position, including portfolio at risk.
#[derive(Debug, Clone, Serialize)]
pub struct PortfolioSummary {
    pub total_loans: usize,
    pub open_loans: usize,
    pub total_outstanding: Decimal,
    pub overdue_outstanding: Decimal,
    pub portfolio_at_risk: Decimal,
}

pub struct LoanWorkflowService {
    store: Arc<dyn SaccoStore>,
    notifier: Arc<dyn NotificationSender>,
    clock: Arc<dyn Clock>,
    eligibility: EligibilityService,
    guarantors: GuarantorService,
}

impl LoanWorkflowService {
    pub fn new(
        store: Arc<dyn SaccoStore>,
        notifier: Arc<dyn NotificationSender>,
        clock: Arc<dyn Clock>,
        config: WorkflowConfig,
    ) -> Self {
        let eligibility =
            EligibilityService::new(store.clone(), clock.clone(), config.clone());
        let guarantors = GuarantorService::new(
            store.clone(),
            notifier.clone(),
            clock.clone(),
            config.clone(),
        );
        Self {
            store,
            notifier,
            clock,
            eligibility,
            guarantors,
        }
    }

    pub fn guarantors(&self) -> &GuarantorService {
        &self.guarantors
    }

    /// Create a loan application in PENDING. Pricing is fixed at
    /// application time: amortized installment, product fees, and the
    /// total cost of credit.
    pub async fn submit_application(
        &self,
        actor: &Actor,
        application: NewLoanApplication,
    ) -> ServiceResult<Loan> {
        actor.authorize(Action::SubmitApplication, actor.tenant_id)?;
        let member = self
            .store
            .member(actor.tenant_id, application.member_id)
            .await?;
        let product = self
            .store
            .loan_product(actor.tenant_id, application.product_id)
            .await?;

        if application.principal_amount < product.minimum_amount
            || application.principal_amount > product.maximum_amount
        {
            return Err(ServiceError::validation(format!(
                "Requested amount must be between P {} and P {}",
                product.minimum_amount, product.maximum_amount
            )));
        }
        if application.term_months < product.minimum_term_months
            || application.term_months > product.maximum_term_months
        {
            return Err(ServiceError::validation(format!(
                "Term must be between {} and {} months",
                product.minimum_term_months, product.maximum_term_months
            )));
        }

        let now = self.clock.now();
        let today = self.clock.today();
        let installment = finance::monthly_installment(
            application.principal_amount,
            product.interest_rate,
            application.term_months,
        );
        let interest = finance::total_interest(
            application.principal_amount,
            installment,
            application.term_months,
        );
        let processing_fee = product.processing_fee(application.principal_amount);
        let insurance_fee = product.insurance_fee(application.principal_amount);
        let total_amount_due =
            application.principal_amount + processing_fee + insurance_fee + interest;

        let loan = Loan {
            id: Uuid::new_v4(),
            tenant_id: actor.tenant_id,
            loan_number: format!(
                "LN-{}-{:06}",
                &actor.tenant_id.simple().to_string()[..4],
                now.timestamp_millis() % 1_000_000
            ),
            member_id: member.id,
            product_id: product.id,
            principal_amount: application.principal_amount,
            interest_rate: product.interest_rate,
            term_months: application.term_months,
            monthly_installment: installment,
            processing_fee,
            insurance_fee,
            total_amount_due,
            amount_paid: Decimal::ZERO,
            outstanding_balance: application.principal_amount,
            status: LoanStatus::Pending,
            workflow_stage: None,
            purpose: application.purpose,
            rejection_reason: None,
            eligibility_check_passed: false,
            eligibility_report: None,
            loan_officer_id: None,
            loan_officer_notes: None,
            loan_officer_review_date: None,
            committee_approval_date: None,
            application_date: today,
            approval_date: None,
            disbursement_date: None,
            maturity_date: None,
            approved_by: None,
            disbursed_by: None,
            created_at: now,
            updated_at: now,
        };
        self.store.create_loan(&loan).await?;
        tracing::info!(loan = %loan.loan_number, member = %member.member_number, "loan application submitted");
        Ok(loan)
    }

    /// PENDING -> DRAFT on pass, PENDING -> REJECTED on fail. The full
    /// report snapshot is persisted on the loan either way.
    pub async fn run_eligibility_check(
        &self,
        actor: &Actor,
        loan_id: Uuid,
    ) -> ServiceResult<(Loan, EligibilityReport)> {
        actor.authorize(Action::RunEligibilityCheck, actor.tenant_id)?;
        let mut loan = self.store.loan(actor.tenant_id, loan_id).await?;
        if loan.status != LoanStatus::Pending {
            return Err(ServiceError::state_conflict(
                loan.status.to_string(),
                format!("Cannot run eligibility check for loan with status: {}", loan.status),
            ));
        }

        let report = self.eligibility.evaluate(&loan).await?;
        let now = self.clock.now();
        let from = loan.status;
        loan.eligibility_check_passed = report.passed;
        loan.eligibility_report = Some(report.clone());
        if report.passed {
            loan.status = LoanStatus::Draft;
            loan.workflow_stage = Some(WorkflowStage::EligibilityCheck);
        } else {
            loan.status = LoanStatus::Rejected;
            loan.rejection_reason = Some("Failed automated eligibility checks".to_string());
        }
        loan.updated_at = now;

        let log = LoanWorkflowLog::new(
            loan_id,
            WorkflowActionType::EligibilityCheck,
            actor.user_id,
            if report.passed {
                "Passed all eligibility checks"
            } else {
                "Failed eligibility checks"
            },
            now,
        )
        .transition(from, loan.status)
        .with_metadata(json!({ "eligibilityResults": &report }));
        self.store
            .update_loan_logged(&loan, &[LoanStatus::Pending], &log)
            .await?;
        Ok((loan, report))
    }

    /// DRAFT -> PENDING_GUARANTORS: create the pledge rows and put the loan
    /// into the staking gate. At least one guarantor must be nominated, and
    /// no fewer than the product requires.
    pub async fn request_guarantors(
        &self,
        actor: &Actor,
        loan_id: Uuid,
        nominations: Vec<GuarantorNomination>,
    ) -> ServiceResult<usize> {
        actor.authorize(Action::RequestGuarantors, actor.tenant_id)?;
        let mut loan = self.store.loan(actor.tenant_id, loan_id).await?;
        if loan.status != LoanStatus::Draft {
            return Err(ServiceError::state_conflict(
                loan.status.to_string(),
                format!("Cannot request guarantors for loan with status: {}", loan.status),
            ));
        }
        let product = self
            .store
            .loan_product(actor.tenant_id, loan.product_id)
            .await?;
        if nominations.len() < product.required_guarantors as usize {
            return Err(ServiceError::validation(format!(
                "Product {} requires at least {} guarantor(s)",
                product.code, product.required_guarantors
            )));
        }

        let sent = self.guarantors.create_and_notify(&loan, &nominations).await?;

        let now = self.clock.now();
        let from = loan.status;
        loan.status = LoanStatus::PendingGuarantors;
        loan.workflow_stage = Some(WorkflowStage::GuarantorStaking);
        loan.updated_at = now;
        let log = LoanWorkflowLog::new(
            loan_id,
            WorkflowActionType::StatusChange,
            actor.user_id,
            format!("Requested pledges from {sent} guarantors"),
            now,
        )
        .transition(from, loan.status);
        self.store
            .update_loan_logged(&loan, &[LoanStatus::Draft], &log)
            .await?;
        Ok(sent)
    }

    /// PENDING_GUARANTORS -> UNDER_APPRAISAL, gated on every guarantor
    /// having accepted. The failure message reports how many are still
    /// outstanding.
    pub async fn assign_officer(
        &self,
        actor: &Actor,
        loan_id: Uuid,
        officer_id: Uuid,
    ) -> ServiceResult<Loan> {
        actor.authorize(Action::AssignOfficer, actor.tenant_id)?;
        let mut loan = self.store.loan(actor.tenant_id, loan_id).await?;
        if loan.status != LoanStatus::PendingGuarantors {
            return Err(ServiceError::state_conflict(
                loan.status.to_string(),
                format!("Cannot assign loan officer to loan with status: {}", loan.status),
            ));
        }

        let staking = self.guarantors.staking_status(loan_id).await?;
        if !staking.complete() {
            return Err(ServiceError::validation(format!(
                "Cannot assign loan officer. {} guarantor(s) have not yet accepted",
                staking.pending + staking.rejected
            )));
        }

        let now = self.clock.now();
        let from = loan.status;
        loan.loan_officer_id = Some(officer_id);
        loan.status = LoanStatus::UnderAppraisal;
        loan.workflow_stage = Some(WorkflowStage::TechnicalAppraisal);
        loan.updated_at = now;
        let log = LoanWorkflowLog::new(
            loan_id,
            WorkflowActionType::OfficerAssign,
            actor.user_id,
            format!("Assigned to loan officer {officer_id}"),
            now,
        )
        .transition(from, loan.status)
        .with_metadata(json!({ "loanOfficerId": officer_id }));
        self.store
            .update_loan_logged(&loan, &[LoanStatus::PendingGuarantors], &log)
            .await?;
        Ok(loan)
    }

    /// UNDER_APPRAISAL -> AWAITING_COMMITTEE with the officer's technical
    /// notes on record.
    pub async fn submit_officer_recommendation(
        &self,
        actor: &Actor,
        loan_id: Uuid,
        technical_notes: String,
        recommendation: Option<String>,
    ) -> ServiceResult<Loan> {
        actor.authorize(Action::SubmitRecommendation, actor.tenant_id)?;
        if technical_notes.trim().is_empty() {
            return Err(ServiceError::validation("Technical notes are required"));
        }
        let mut loan = self.store.loan(actor.tenant_id, loan_id).await?;
        if loan.status != LoanStatus::UnderAppraisal {
            return Err(ServiceError::state_conflict(
                loan.status.to_string(),
                format!("Cannot review loan with status: {}", loan.status),
            ));
        }

        let now = self.clock.now();
        let from = loan.status;
        loan.loan_officer_notes = Some(technical_notes.clone());
        loan.loan_officer_review_date = Some(now);
        loan.status = LoanStatus::AwaitingCommittee;
        loan.workflow_stage = Some(WorkflowStage::CommitteeApproval);
        loan.updated_at = now;
        let log = LoanWorkflowLog::new(
            loan_id,
            WorkflowActionType::OfficerReview,
            actor.user_id,
            format!(
                "Officer recommendation: {}",
                recommendation.as_deref().unwrap_or("Forwarded to committee")
            ),
            now,
        )
        .transition(from, loan.status)
        .with_metadata(json!({
            "technicalNotes": technical_notes,
            "recommendation": recommendation,
        }));
        self.store
            .update_loan_logged(&loan, &[LoanStatus::UnderAppraisal], &log)
            .await?;
        Ok(loan)
    }

    /// Legacy manual approval for the simple workflow: PENDING -> APPROVED.
    pub async fn approve(&self, actor: &Actor, loan_id: Uuid) -> ServiceResult<Loan> {
        actor.authorize(Action::DisburseLoan, actor.tenant_id)?;
        let mut loan = self.store.loan(actor.tenant_id, loan_id).await?;
        if loan.status != LoanStatus::Pending {
            return Err(ServiceError::state_conflict(
                loan.status.to_string(),
                format!("Cannot approve loan with status: {}", loan.status),
            ));
        }
        let now = self.clock.now();
        let from = loan.status;
        loan.status = LoanStatus::Approved;
        loan.approval_date = Some(self.clock.today());
        loan.approved_by = Some(actor.user_id);
        loan.updated_at = now;
        let log = LoanWorkflowLog::new(
            loan_id,
            WorkflowActionType::StatusChange,
            actor.user_id,
            "Loan approved",
            now,
        )
        .transition(from, loan.status);
        self.store
            .update_loan_logged(&loan, &[LoanStatus::Pending], &log)
            .await?;
        Ok(loan)
    }

    /// UNDER_APPRAISAL -> QUERIED: the officer sends the application back
    /// for more information instead of recommending or rejecting it.
    pub async fn query(
        &self,
        actor: &Actor,
        loan_id: Uuid,
        notes: String,
    ) -> ServiceResult<Loan> {
        actor.authorize(Action::QueryLoan, actor.tenant_id)?;
        if notes.trim().is_empty() {
            return Err(ServiceError::validation("Query notes are required"));
        }
        let mut loan = self.store.loan(actor.tenant_id, loan_id).await?;
        if loan.status != LoanStatus::UnderAppraisal {
            return Err(ServiceError::state_conflict(
                loan.status.to_string(),
                format!("Cannot query loan with status: {}", loan.status),
            ));
        }

        let now = self.clock.now();
        let from = loan.status;
        loan.status = LoanStatus::Queried;
        loan.updated_at = now;
        let log = LoanWorkflowLog::new(
            loan_id,
            WorkflowActionType::OfficerReview,
            actor.user_id,
            format!("Application queried: {notes}"),
            now,
        )
        .transition(from, loan.status);
        self.store
            .update_loan_logged(&loan, &[LoanStatus::UnderAppraisal], &log)
            .await?;

        send_best_effort(
            self.notifier.as_ref(),
            Notification {
                recipient_member_id: loan.member_id,
                subject: "Loan application queried".to_string(),
                body: format!("Your loan {} needs more information: {notes}", loan.loan_number),
            },
        )
        .await;
        Ok(loan)
    }

    /// QUERIED -> UNDER_APPRAISAL once the queried information has been
    /// supplied; the loop back into appraisal.
    pub async fn resubmit(&self, actor: &Actor, loan_id: Uuid) -> ServiceResult<Loan> {
        actor.authorize(Action::QueryLoan, actor.tenant_id)?;
        let mut loan = self.store.loan(actor.tenant_id, loan_id).await?;
        if loan.status != LoanStatus::Queried {
            return Err(ServiceError::state_conflict(
                loan.status.to_string(),
                format!("Cannot resubmit loan with status: {}", loan.status),
            ));
        }

        let now = self.clock.now();
        let from = loan.status;
        loan.status = LoanStatus::UnderAppraisal;
        loan.workflow_stage = Some(WorkflowStage::TechnicalAppraisal);
        loan.updated_at = now;
        let log = LoanWorkflowLog::new(
            loan_id,
            WorkflowActionType::StatusChange,
            actor.user_id,
            "Queried application resubmitted for appraisal",
            now,
        )
        .transition(from, loan.status);
        self.store
            .update_loan_logged(&loan, &[LoanStatus::Queried], &log)
            .await?;
        Ok(loan)
    }

    /// Officer/admin rejection with a required reason, from any
    /// pre-committee, pre-disbursement status.
    pub async fn reject(
        &self,
        actor: &Actor,
        loan_id: Uuid,
        reason: String,
    ) -> ServiceResult<Loan> {
        actor.authorize(Action::RejectLoan, actor.tenant_id)?;
        if reason.trim().is_empty() {
            return Err(ServiceError::validation("Rejection reason is required"));
        }
        let mut loan = self.store.loan(actor.tenant_id, loan_id).await?;
        let rejectable = [
            LoanStatus::Pending,
            LoanStatus::Draft,
            LoanStatus::PendingGuarantors,
            LoanStatus::UnderAppraisal,
            LoanStatus::Queried,
        ];
        if !rejectable.contains(&loan.status) {
            return Err(ServiceError::state_conflict(
                loan.status.to_string(),
                format!("Cannot reject loan with status: {}", loan.status),
            ));
        }

        let now = self.clock.now();
        let from = loan.status;
        loan.status = LoanStatus::Rejected;
        loan.rejection_reason = Some(reason.clone());
        loan.updated_at = now;
        let log = LoanWorkflowLog::new(
            loan_id,
            WorkflowActionType::StatusChange,
            actor.user_id,
            format!("Loan rejected: {reason}"),
            now,
        )
        .transition(from, loan.status);
        self.store.update_loan_logged(&loan, &[from], &log).await?;
        Ok(loan)
    }

    /// COMMITTEE_APPROVED/APPROVED -> DISBURSED. Five effects commit as one
    /// unit: status flip, balance seeded to the full amount due, calendar
    /// maturity date, the disbursement transaction, and the audit row. A
    /// retried call on an already-disbursed loan fails cleanly without a
    /// second transaction or balance change.
    pub async fn disburse(
        &self,
        actor: &Actor,
        loan_id: Uuid,
        details: DisbursementDetails,
    ) -> ServiceResult<LoanSummary> {
        actor.authorize(Action::DisburseLoan, actor.tenant_id)?;
        let mut loan = self.store.loan(actor.tenant_id, loan_id).await?;
        let disbursable = [LoanStatus::CommitteeApproved, LoanStatus::Approved];
        if !disbursable.contains(&loan.status) {
            return Err(ServiceError::state_conflict(
                loan.status.to_string(),
                format!(
                    "Cannot disburse loan with status: {}. Loan must be approved first.",
                    loan.status
                ),
            ));
        }

        let now = self.clock.now();
        let today = self.clock.today();
        let from = loan.status;
        loan.status = LoanStatus::Disbursed;
        loan.workflow_stage = Some(WorkflowStage::Disbursement);
        loan.disbursement_date = Some(today);
        loan.disbursed_by = Some(actor.user_id);
        // The full amortized amount becomes owed, not just the principal
        loan.outstanding_balance = loan.total_amount_due;
        loan.maturity_date = Some(finance::add_months(today, loan.term_months));
        loan.updated_at = now;

        let transaction = Transaction {
            id: Uuid::new_v4(),
            tenant_id: loan.tenant_id,
            member_id: loan.member_id,
            transaction_number: format!("TXN-{}", now.timestamp_millis()),
            transaction_type: TransactionType::LoanDisbursement,
            amount: loan.principal_amount,
            transaction_date: today,
            description: format!("Loan disbursement - {}", loan.loan_number),
            reference_id: Some(loan.id),
            reference_type: Some("loan".to_string()),
            status: TransactionStatus::Completed,
            created_by: actor.user_id,
            created_at: now,
        };
        let log = LoanWorkflowLog::new(
            loan_id,
            WorkflowActionType::Disbursement,
            actor.user_id,
            format!("Loan disbursed - P {}", loan.principal_amount),
            now,
        )
        .transition(from, loan.status)
        .with_metadata(json!({
            "disbursementDetails": {
                "amount": loan.principal_amount,
                "method": details.method,
                "accountNumber": details.account_number,
                "notes": details.notes,
            },
        }));

        self.store
            .commit_loan_transaction(&loan, &[from], &transaction, &log)
            .await?;
        tracing::info!(loan = %loan.loan_number, amount = %loan.principal_amount, "loan disbursed");

        send_best_effort(
            self.notifier.as_ref(),
            Notification {
                recipient_member_id: loan.member_id,
                subject: "Loan disbursed".to_string(),
                body: format!(
                    "Your loan {} of P {} has been disbursed via {}.",
                    loan.loan_number, loan.principal_amount, details.method
                ),
            },
        )
        .await;

        Ok(LoanSummary {
            id: loan.id,
            loan_number: loan.loan_number,
            status: loan.status,
            disbursement_date: loan.disbursement_date,
            maturity_date: loan.maturity_date,
            outstanding_balance: loan.outstanding_balance,
            monthly_installment: loan.monthly_installment,
        })
    }

    /// Apply a repayment against a disbursed loan: balance decrement,
    /// repayment transaction, and audit row in one commit. The first
    /// repayment activates the loan; clearing the balance closes it.
    pub async fn record_repayment(
        &self,
        actor: &Actor,
        loan_id: Uuid,
        amount: Decimal,
    ) -> ServiceResult<Loan> {
        actor.authorize(Action::RecordRepayment, actor.tenant_id)?;
        if amount <= Decimal::ZERO {
            return Err(ServiceError::validation("Repayment amount must be positive"));
        }
        let mut loan = self.store.loan(actor.tenant_id, loan_id).await?;
        if !matches!(loan.status, LoanStatus::Disbursed | LoanStatus::Active) {
            return Err(ServiceError::state_conflict(
                loan.status.to_string(),
                format!("Cannot record repayment for loan with status: {}", loan.status),
            ));
        }

        let now = self.clock.now();
        let today = self.clock.today();
        let from = loan.status;
        // Never overpay: the applied amount is capped at what is owed
        let applied = amount.min(loan.outstanding_balance);
        loan.outstanding_balance -= applied;
        loan.amount_paid += applied;
        loan.status = if loan.outstanding_balance.is_zero() {
            LoanStatus::PaidOff
        } else {
            LoanStatus::Active
        };
        if loan.status == LoanStatus::PaidOff {
            loan.workflow_stage = Some(WorkflowStage::Completed);
        }
        loan.updated_at = now;

        let transaction = Transaction {
            id: Uuid::new_v4(),
            tenant_id: loan.tenant_id,
            member_id: loan.member_id,
            transaction_number: format!("TXN-{}", now.timestamp_millis()),
            transaction_type: TransactionType::LoanRepayment,
            amount: applied,
            transaction_date: today,
            description: format!("Loan repayment - {}", loan.loan_number),
            reference_id: Some(loan.id),
            reference_type: Some("loan".to_string()),
            status: TransactionStatus::Completed,
            created_by: actor.user_id,
            created_at: now,
        };
        let log = LoanWorkflowLog::new(
            loan_id,
            WorkflowActionType::Repayment,
            actor.user_id,
            format!("Repayment of P {applied} received"),
            now,
        )
        .transition(from, loan.status)
        .with_metadata(json!({
            "amount": applied,
            "outstandingBalance": loan.outstanding_balance,
        }));
        self.store
            .commit_loan_transaction(&loan, &[from], &transaction, &log)
            .await?;

        // A settled loan frees its guarantors' pledges
        if loan.status == LoanStatus::PaidOff {
            for mut guarantor in self.store.loan_guarantors(loan.id).await? {
                if guarantor.status == GuarantorStatus::Accepted {
                    guarantor.status = GuarantorStatus::Released;
                    self.store.update_guarantor(&guarantor).await?;
                }
            }
        }
        Ok(loan)
    }

    /// Tenant lending position with portfolio at risk.
    pub async fn portfolio_summary(&self, actor: &Actor) -> ServiceResult<PortfolioSummary> {
        actor.authorize(Action::ViewPortfolio, actor.tenant_id)?;
        let loans = self.store.tenant_loans(actor.tenant_id).await?;
        let today = self.clock.today();
        let mut total_outstanding = Decimal::ZERO;
        let mut overdue_outstanding = Decimal::ZERO;
        let mut open_loans = 0usize;
        for loan in &loans {
            if matches!(loan.status, LoanStatus::Disbursed | LoanStatus::Active) {
                open_loans += 1;
                total_outstanding += loan.outstanding_balance;
                if loan.is_past_due(today) {
                    overdue_outstanding += loan.outstanding_balance;
                }
            }
        }
        Ok(PortfolioSummary {
            total_loans: loans.len(),
            open_loans,
            total_outstanding,
            overdue_outstanding,
            portfolio_at_risk: finance::portfolio_at_risk(&loans, today),
        })
    }
}
