//! The abstract transactional repository the core depends on. The workflow,
//! committee, guarantor, deduction, and reconciliation services receive an
//! implementation by constructor injection; production uses [`PgStore`],
//! tests and demos use [`MemoryStore`].
//!
//! [`PgStore`]: crate::database::postgres::PgStore
//! [`MemoryStore`]: crate::database::memory::MemoryStore

use async_trait::async_trait;
use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

use super::models::deduction::{DeductionItem, DeductionRequest, DeductionRequestStatus};
use super::models::guarantor::LoanGuarantor;
use super::models::loan::{Loan, LoanStatus};
use super::models::member::{InsurancePolicy, Member, MemberSavings};
use super::models::product::LoanProduct;
use super::models::reconciliation::{ReconciliationBatch, ReconciliationItem};
use super::models::transaction::Transaction;
use super::models::vote::LoanVote;
use super::models::workflow_log::LoanWorkflowLog;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Not found: {0}")]
    NotFound(String),

    /// A guarded write lost a race: the row's status no longer matched the
    /// expected set when the update ran.
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Persistence gateway for the loan/member aggregate and the deduction and
/// reconciliation batches.
///
/// Transition methods take the set of statuses the loan is expected to
/// still be in; implementations must apply the guard and the write as one
/// atomic step (row-level locking or an optimistic `WHERE status IN (...)`
/// check) so concurrent transitions of the same loan serialize.
#[async_trait]
pub trait SaccoStore: Send + Sync {
    // ---- members, savings, policies ----

    async fn member(&self, tenant_id: Uuid, member_id: Uuid) -> StoreResult<Member>;
    async fn member_by_number(
        &self,
        tenant_id: Uuid,
        member_number: &str,
    ) -> StoreResult<Option<Member>>;
    /// ACTIVE, EMPLOYED members in member-number order
    async fn payroll_members(&self, tenant_id: Uuid) -> StoreResult<Vec<Member>>;
    async fn total_savings(&self, member_id: Uuid) -> StoreResult<Decimal>;
    async fn active_savings(&self, member_id: Uuid) -> StoreResult<Vec<MemberSavings>>;
    async fn active_policies(&self, member_id: Uuid) -> StoreResult<Vec<InsurancePolicy>>;

    // ---- products ----

    async fn loan_product(&self, tenant_id: Uuid, product_id: Uuid) -> StoreResult<LoanProduct>;

    // ---- loans ----

    async fn create_loan(&self, loan: &Loan) -> StoreResult<()>;
    async fn loan(&self, tenant_id: Uuid, loan_id: Uuid) -> StoreResult<Loan>;
    async fn member_loans_in(
        &self,
        tenant_id: Uuid,
        member_id: Uuid,
        statuses: &[LoanStatus],
    ) -> StoreResult<Vec<Loan>>;
    async fn tenant_loans(&self, tenant_id: Uuid) -> StoreResult<Vec<Loan>>;

    /// Persist a loan mutation together with its audit row, guarded on the
    /// loan still being in one of `expected` statuses.
    async fn update_loan_logged(
        &self,
        loan: &Loan,
        expected: &[LoanStatus],
        log: &LoanWorkflowLog,
    ) -> StoreResult<()>;

    /// Money-moving commit (disbursement, repayment): loan mutation,
    /// ledger transaction, and audit row as one unit. Any failure rolls
    /// back all of them.
    async fn commit_loan_transaction(
        &self,
        loan: &Loan,
        expected: &[LoanStatus],
        transaction: &Transaction,
        log: &LoanWorkflowLog,
    ) -> StoreResult<()>;

    async fn loan_transactions(&self, loan_id: Uuid) -> StoreResult<Vec<Transaction>>;
    async fn append_workflow_log(&self, log: &LoanWorkflowLog) -> StoreResult<()>;
    async fn workflow_logs(&self, loan_id: Uuid) -> StoreResult<Vec<LoanWorkflowLog>>;

    // ---- guarantors ----

    async fn create_guarantors(&self, rows: &[LoanGuarantor]) -> StoreResult<()>;
    async fn loan_guarantors(&self, loan_id: Uuid) -> StoreResult<Vec<LoanGuarantor>>;
    async fn guarantor(&self, tenant_id: Uuid, guarantor_id: Uuid) -> StoreResult<LoanGuarantor>;
    async fn update_guarantor(&self, row: &LoanGuarantor) -> StoreResult<()>;

    // ---- committee votes ----

    /// Insert or overwrite the voter's ballot for the loan
    async fn upsert_vote(&self, vote: &LoanVote) -> StoreResult<()>;
    async fn loan_votes(&self, loan_id: Uuid) -> StoreResult<Vec<LoanVote>>;

    // ---- deduction batches ----

    async fn create_deduction_request(
        &self,
        request: &DeductionRequest,
        items: &[DeductionItem],
    ) -> StoreResult<()>;
    async fn deduction_request(&self, tenant_id: Uuid, request_id: Uuid)
        -> StoreResult<DeductionRequest>;
    async fn deduction_request_for_period(
        &self,
        tenant_id: Uuid,
        month: u32,
        year: i32,
        status: Option<DeductionRequestStatus>,
    ) -> StoreResult<Option<DeductionRequest>>;
    async fn deduction_items(&self, request_id: Uuid) -> StoreResult<Vec<DeductionItem>>;
    async fn update_deduction_request(&self, request: &DeductionRequest) -> StoreResult<()>;

    // ---- reconciliation batches ----

    async fn create_reconciliation(
        &self,
        batch: &ReconciliationBatch,
        items: &[ReconciliationItem],
    ) -> StoreResult<()>;
    async fn reconciliation_batch(
        &self,
        tenant_id: Uuid,
        batch_id: Uuid,
    ) -> StoreResult<ReconciliationBatch>;
    async fn reconciliation_items(&self, batch_id: Uuid) -> StoreResult<Vec<ReconciliationItem>>;
}
