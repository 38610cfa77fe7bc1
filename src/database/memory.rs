//! In-memory [`SaccoStore`] used by the test suite and local demos. A single
//! mutex stands in for the database's serialization of guarded writes, which
//! keeps the optimistic-concurrency semantics of the Postgres store intact.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use rust_decimal::Decimal;
use uuid::Uuid;

use super::models::deduction::{DeductionItem, DeductionRequest, DeductionRequestStatus};
use super::models::guarantor::LoanGuarantor;
use super::models::loan::{Loan, LoanStatus};
use super::models::member::{InsurancePolicy, Member, MemberSavings, PolicyStatus};
use super::models::product::LoanProduct;
use super::models::reconciliation::{ReconciliationBatch, ReconciliationItem};
use super::models::transaction::Transaction;
use super::models::vote::LoanVote;
use super::models::workflow_log::LoanWorkflowLog;
use super::store::{SaccoStore, StoreError, StoreResult};

#[derive(Default)]
struct Inner {
    members: HashMap<Uuid, Member>,
    savings: Vec<MemberSavings>,
    policies: Vec<InsurancePolicy>,
    products: HashMap<Uuid, LoanProduct>,
    loans: HashMap<Uuid, Loan>,
    guarantors: HashMap<Uuid, LoanGuarantor>,
    votes: Vec<LoanVote>,
    transactions: Vec<Transaction>,
    workflow_logs: Vec<LoanWorkflowLog>,
    deduction_requests: HashMap<Uuid, DeductionRequest>,
    deduction_items: Vec<DeductionItem>,
    reconciliation_batches: HashMap<Uuid, ReconciliationBatch>,
    reconciliation_items: Vec<ReconciliationItem>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    // Seeding helpers for fixtures

    pub fn insert_member(&self, member: Member) {
        self.inner.lock().unwrap().members.insert(member.id, member);
    }

    pub fn insert_savings(&self, savings: MemberSavings) {
        self.inner.lock().unwrap().savings.push(savings);
    }

    pub fn insert_policy(&self, policy: InsurancePolicy) {
        self.inner.lock().unwrap().policies.push(policy);
    }

    pub fn insert_product(&self, product: LoanProduct) {
        self.inner.lock().unwrap().products.insert(product.id, product);
    }

    pub fn transaction_count(&self) -> usize {
        self.inner.lock().unwrap().transactions.len()
    }
}

#[async_trait]
impl SaccoStore for MemoryStore {
    async fn member(&self, tenant_id: Uuid, member_id: Uuid) -> StoreResult<Member> {
        self.inner
            .lock()
            .unwrap()
            .members
            .get(&member_id)
            .filter(|m| m.tenant_id == tenant_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("Member {member_id}")))
    }

    async fn member_by_number(
        &self,
        tenant_id: Uuid,
        member_number: &str,
    ) -> StoreResult<Option<Member>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .members
            .values()
            .find(|m| m.tenant_id == tenant_id && m.member_number == member_number)
            .cloned())
    }

    async fn payroll_members(&self, tenant_id: Uuid) -> StoreResult<Vec<Member>> {
        let inner = self.inner.lock().unwrap();
        let mut members: Vec<Member> = inner
            .members
            .values()
            .filter(|m| m.tenant_id == tenant_id && m.is_payroll_deductible())
            .cloned()
            .collect();
        members.sort_by(|a, b| a.member_number.cmp(&b.member_number));
        Ok(members)
    }

    async fn total_savings(&self, member_id: Uuid) -> StoreResult<Decimal> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .savings
            .iter()
            .filter(|s| s.member_id == member_id)
            .map(|s| s.current_balance)
            .sum())
    }

    async fn active_savings(&self, member_id: Uuid) -> StoreResult<Vec<MemberSavings>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .savings
            .iter()
            .filter(|s| s.member_id == member_id && s.is_active)
            .cloned()
            .collect())
    }

    async fn active_policies(&self, member_id: Uuid) -> StoreResult<Vec<InsurancePolicy>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .policies
            .iter()
            .filter(|p| p.member_id == member_id && p.status == PolicyStatus::Active)
            .cloned()
            .collect())
    }

    async fn loan_product(&self, tenant_id: Uuid, product_id: Uuid) -> StoreResult<LoanProduct> {
        self.inner
            .lock()
            .unwrap()
            .products
            .get(&product_id)
            .filter(|p| p.tenant_id == tenant_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("Loan product {product_id}")))
    }

    async fn create_loan(&self, loan: &Loan) -> StoreResult<()> {
        let mut inner = self.inner.lock().unwrap();
        if inner.loans.contains_key(&loan.id) {
            return Err(StoreError::Conflict(format!("Loan {} already exists", loan.id)));
        }
        inner.loans.insert(loan.id, loan.clone());
        Ok(())
    }

    async fn loan(&self, tenant_id: Uuid, loan_id: Uuid) -> StoreResult<Loan> {
        self.inner
            .lock()
            .unwrap()
            .loans
            .get(&loan_id)
            .filter(|l| l.tenant_id == tenant_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("Loan {loan_id}")))
    }

    async fn member_loans_in(
        &self,
        tenant_id: Uuid,
        member_id: Uuid,
        statuses: &[LoanStatus],
    ) -> StoreResult<Vec<Loan>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .loans
            .values()
            .filter(|l| {
                l.tenant_id == tenant_id
                    && l.member_id == member_id
                    && statuses.contains(&l.status)
            })
            .cloned()
            .collect())
    }

    async fn tenant_loans(&self, tenant_id: Uuid) -> StoreResult<Vec<Loan>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .loans
            .values()
            .filter(|l| l.tenant_id == tenant_id)
            .cloned()
            .collect())
    }

    async fn update_loan_logged(
        &self,
        loan: &Loan,
        expected: &[LoanStatus],
        log: &LoanWorkflowLog,
    ) -> StoreResult<()> {
        let mut inner = self.inner.lock().unwrap();
        let current = inner
            .loans
            .get(&loan.id)
            .ok_or_else(|| StoreError::NotFound(format!("Loan {}", loan.id)))?;
        if !expected.contains(&current.status) {
            return Err(StoreError::Conflict(format!(
                "Loan {} is no longer in an expected status (found {})",
                loan.id, current.status
            )));
        }
        inner.loans.insert(loan.id, loan.clone());
        inner.workflow_logs.push(log.clone());
        Ok(())
    }

    async fn commit_loan_transaction(
        &self,
        loan: &Loan,
        expected: &[LoanStatus],
        transaction: &Transaction,
        log: &LoanWorkflowLog,
    ) -> StoreResult<()> {
        let mut inner = self.inner.lock().unwrap();
        let current = inner
            .loans
            .get(&loan.id)
            .ok_or_else(|| StoreError::NotFound(format!("Loan {}", loan.id)))?;
        if !expected.contains(&current.status) {
            return Err(StoreError::Conflict(format!(
                "Loan {} is no longer in an expected status (found {})",
                loan.id, current.status
            )));
        }
        inner.loans.insert(loan.id, loan.clone());
        inner.transactions.push(transaction.clone());
        inner.workflow_logs.push(log.clone());
        Ok(())
    }

    async fn loan_transactions(&self, loan_id: Uuid) -> StoreResult<Vec<Transaction>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .transactions
            .iter()
            .filter(|t| t.reference_id == Some(loan_id))
            .cloned()
            .collect())
    }

    async fn append_workflow_log(&self, log: &LoanWorkflowLog) -> StoreResult<()> {
        self.inner.lock().unwrap().workflow_logs.push(log.clone());
        Ok(())
    }

    async fn workflow_logs(&self, loan_id: Uuid) -> StoreResult<Vec<LoanWorkflowLog>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .workflow_logs
            .iter()
            .filter(|l| l.loan_id == loan_id)
            .cloned()
            .collect())
    }

    async fn create_guarantors(&self, rows: &[LoanGuarantor]) -> StoreResult<()> {
        let mut inner = self.inner.lock().unwrap();
        for row in rows {
            inner.guarantors.insert(row.id, row.clone());
        }
        Ok(())
    }

    async fn loan_guarantors(&self, loan_id: Uuid) -> StoreResult<Vec<LoanGuarantor>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .guarantors
            .values()
            .filter(|g| g.loan_id == loan_id)
            .cloned()
            .collect())
    }

    async fn guarantor(&self, tenant_id: Uuid, guarantor_id: Uuid) -> StoreResult<LoanGuarantor> {
        self.inner
            .lock()
            .unwrap()
            .guarantors
            .get(&guarantor_id)
            .filter(|g| g.tenant_id == tenant_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("Guarantor {guarantor_id}")))
    }

    async fn update_guarantor(&self, row: &LoanGuarantor) -> StoreResult<()> {
        let mut inner = self.inner.lock().unwrap();
        if !inner.guarantors.contains_key(&row.id) {
            return Err(StoreError::NotFound(format!("Guarantor {}", row.id)));
        }
        inner.guarantors.insert(row.id, row.clone());
        Ok(())
    }

    async fn upsert_vote(&self, vote: &LoanVote) -> StoreResult<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(existing) = inner
            .votes
            .iter_mut()
            .find(|v| v.loan_id == vote.loan_id && v.voter_id == vote.voter_id)
        {
            *existing = vote.clone();
        } else {
            inner.votes.push(vote.clone());
        }
        Ok(())
    }

    async fn loan_votes(&self, loan_id: Uuid) -> StoreResult<Vec<LoanVote>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .votes
            .iter()
            .filter(|v| v.loan_id == loan_id)
            .cloned()
            .collect())
    }

    async fn create_deduction_request(
        &self,
        request: &DeductionRequest,
        items: &[DeductionItem],
    ) -> StoreResult<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.deduction_requests.insert(request.id, request.clone());
        inner.deduction_items.extend(items.iter().cloned());
        Ok(())
    }

    async fn deduction_request(
        &self,
        tenant_id: Uuid,
        request_id: Uuid,
    ) -> StoreResult<DeductionRequest> {
        self.inner
            .lock()
            .unwrap()
            .deduction_requests
            .get(&request_id)
            .filter(|r| r.tenant_id == tenant_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("Deduction request {request_id}")))
    }

    async fn deduction_request_for_period(
        &self,
        tenant_id: Uuid,
        month: u32,
        year: i32,
        status: Option<DeductionRequestStatus>,
    ) -> StoreResult<Option<DeductionRequest>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .deduction_requests
            .values()
            .find(|r| {
                r.tenant_id == tenant_id
                    && r.month == month
                    && r.year == year
                    && status.map(|s| r.status == s).unwrap_or(true)
            })
            .cloned())
    }

    async fn deduction_items(&self, request_id: Uuid) -> StoreResult<Vec<DeductionItem>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .deduction_items
            .iter()
            .filter(|i| i.request_id == request_id)
            .cloned()
            .collect())
    }

    async fn update_deduction_request(&self, request: &DeductionRequest) -> StoreResult<()> {
        let mut inner = self.inner.lock().unwrap();
        if !inner.deduction_requests.contains_key(&request.id) {
            return Err(StoreError::NotFound(format!("Deduction request {}", request.id)));
        }
        inner.deduction_requests.insert(request.id, request.clone());
        Ok(())
    }

    async fn create_reconciliation(
        &self,
        batch: &ReconciliationBatch,
        items: &[ReconciliationItem],
    ) -> StoreResult<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.reconciliation_batches.insert(batch.id, batch.clone());
        inner.reconciliation_items.extend(items.iter().cloned());
        Ok(())
    }

    async fn reconciliation_batch(
        &self,
        tenant_id: Uuid,
        batch_id: Uuid,
    ) -> StoreResult<ReconciliationBatch> {
        self.inner
            .lock()
            .unwrap()
            .reconciliation_batches
            .get(&batch_id)
            .filter(|b| b.tenant_id == tenant_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("Reconciliation batch {batch_id}")))
    }

    async fn reconciliation_items(&self, batch_id: Uuid) -> StoreResult<Vec<ReconciliationItem>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .reconciliation_items
            .iter()
            .filter(|i| i.batch_id == batch_id)
            .cloned()
            .collect())
    }
}
