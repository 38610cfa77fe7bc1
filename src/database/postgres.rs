//! sqlx/Postgres implementation of [`SaccoStore`]. Queries are runtime-bound
//! (`query_as`) against the schema in `migrations/`. Status columns are TEXT
//! holding the snake_case enum encodings.
//!
//! Loan transitions run as a guarded `UPDATE ... WHERE status = ANY(...)`
//! inside the same transaction as the audit row, so two requests racing to
//! move the same loan serialize on the row and the loser surfaces a
//! conflict instead of double-applying.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde_json::Value;
use sqlx::{PgPool, Postgres, Transaction as PgTransaction};
use uuid::Uuid;

use super::models::deduction::{
    ChangeReason, DeductionBreakdown, DeductionItem, DeductionRequest, DeductionRequestStatus,
};
use super::models::guarantor::{GuarantorStatus, LoanGuarantor};
use super::models::loan::{EligibilityReport, Loan, LoanStatus, WorkflowStage};
use super::models::member::{
    EmploymentStatus, InsurancePolicy, Member, MemberSavings, MemberStatus, PolicyStatus,
};
use super::models::product::LoanProduct;
use super::models::reconciliation::{
    MatchStatus, ReconciliationBatch, ReconciliationItem, ReconciliationStatus, VarianceReason,
};
use super::models::transaction::{Transaction, TransactionStatus, TransactionType};
use super::models::vote::{LoanVote, VoteChoice};
use super::models::workflow_log::{LoanWorkflowLog, WorkflowActionType};
use super::store::{SaccoStore, StoreError, StoreResult};

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn parse_enum<T: FromStr>(value: &str, what: &str) -> StoreResult<T> {
    T::from_str(value)
        .map_err(|_| StoreError::Serialization(format!("invalid {what} value: {value}")))
}

fn parse_enum_opt<T: FromStr>(value: Option<String>, what: &str) -> StoreResult<Option<T>> {
    value.map(|v| parse_enum(&v, what)).transpose()
}

fn statuses_as_text(statuses: &[LoanStatus]) -> Vec<String> {
    statuses.iter().map(|s| s.to_string()).collect()
}

// ---- row types ----

#[derive(sqlx::FromRow)]
struct MemberRow {
    id: Uuid,
    tenant_id: Uuid,
    member_number: String,
    first_name: String,
    last_name: String,
    national_id: String,
    employee_number: Option<String>,
    phone: String,
    email: String,
    status: String,
    employment_status: String,
    monthly_net_salary: Decimal,
    join_date: NaiveDate,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl MemberRow {
    fn into_member(self) -> StoreResult<Member> {
        Ok(Member {
            id: self.id,
            tenant_id: self.tenant_id,
            member_number: self.member_number,
            first_name: self.first_name,
            last_name: self.last_name,
            national_id: self.national_id,
            employee_number: self.employee_number,
            phone: self.phone,
            email: self.email,
            status: parse_enum::<MemberStatus>(&self.status, "member status")?,
            employment_status: parse_enum::<EmploymentStatus>(
                &self.employment_status,
                "employment status",
            )?,
            monthly_net_salary: self.monthly_net_salary,
            join_date: self.join_date,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct SavingsRow {
    id: Uuid,
    tenant_id: Uuid,
    member_id: Uuid,
    product_name: String,
    monthly_contribution: Decimal,
    current_balance: Decimal,
    is_active: bool,
}

#[derive(sqlx::FromRow)]
struct PolicyRow {
    id: Uuid,
    tenant_id: Uuid,
    member_id: Uuid,
    policy_number: String,
    monthly_premium: Decimal,
    status: String,
}

#[derive(sqlx::FromRow)]
struct ProductRow {
    id: Uuid,
    tenant_id: Uuid,
    name: String,
    code: String,
    interest_rate: Decimal,
    minimum_amount: Decimal,
    maximum_amount: Decimal,
    minimum_term_months: i32,
    maximum_term_months: i32,
    required_guarantors: i32,
    processing_fee_percentage: Decimal,
    insurance_fee_percentage: Decimal,
    savings_multiplier: Decimal,
}

#[derive(sqlx::FromRow)]
struct LoanRow {
    id: Uuid,
    tenant_id: Uuid,
    loan_number: String,
    member_id: Uuid,
    product_id: Uuid,
    principal_amount: Decimal,
    interest_rate: Decimal,
    term_months: i32,
    monthly_installment: Decimal,
    processing_fee: Decimal,
    insurance_fee: Decimal,
    total_amount_due: Decimal,
    amount_paid: Decimal,
    outstanding_balance: Decimal,
    status: String,
    workflow_stage: Option<String>,
    purpose: Option<String>,
    rejection_reason: Option<String>,
    eligibility_check_passed: bool,
    eligibility_report: Option<Value>,
    loan_officer_id: Option<Uuid>,
    loan_officer_notes: Option<String>,
    loan_officer_review_date: Option<DateTime<Utc>>,
    committee_approval_date: Option<DateTime<Utc>>,
    application_date: NaiveDate,
    approval_date: Option<NaiveDate>,
    disbursement_date: Option<NaiveDate>,
    maturity_date: Option<NaiveDate>,
    approved_by: Option<Uuid>,
    disbursed_by: Option<Uuid>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl LoanRow {
    fn into_loan(self) -> StoreResult<Loan> {
        let eligibility_report = self
            .eligibility_report
            .map(serde_json::from_value::<EligibilityReport>)
            .transpose()
            .map_err(|e| StoreError::Serialization(format!("eligibility report: {e}")))?;
        Ok(Loan {
            id: self.id,
            tenant_id: self.tenant_id,
            loan_number: self.loan_number,
            member_id: self.member_id,
            product_id: self.product_id,
            principal_amount: self.principal_amount,
            interest_rate: self.interest_rate,
            term_months: self.term_months as u32,
            monthly_installment: self.monthly_installment,
            processing_fee: self.processing_fee,
            insurance_fee: self.insurance_fee,
            total_amount_due: self.total_amount_due,
            amount_paid: self.amount_paid,
            outstanding_balance: self.outstanding_balance,
            status: parse_enum::<LoanStatus>(&self.status, "loan status")?,
            workflow_stage: parse_enum_opt::<WorkflowStage>(self.workflow_stage, "workflow stage")?,
            purpose: self.purpose,
            rejection_reason: self.rejection_reason,
            eligibility_check_passed: self.eligibility_check_passed,
            eligibility_report,
            loan_officer_id: self.loan_officer_id,
            loan_officer_notes: self.loan_officer_notes,
            loan_officer_review_date: self.loan_officer_review_date,
            committee_approval_date: self.committee_approval_date,
            application_date: self.application_date,
            approval_date: self.approval_date,
            disbursement_date: self.disbursement_date,
            maturity_date: self.maturity_date,
            approved_by: self.approved_by,
            disbursed_by: self.disbursed_by,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct GuarantorRow {
    id: Uuid,
    tenant_id: Uuid,
    loan_id: Uuid,
    guarantor_member_id: Uuid,
    guaranteed_amount: Decimal,
    status: String,
    accepted_at: Option<DateTime<Utc>>,
    rejected_at: Option<DateTime<Utc>>,
    rejection_reason: Option<String>,
    notification_sent_at: Option<DateTime<Utc>>,
    response_deadline: Option<NaiveDate>,
    created_at: DateTime<Utc>,
}

impl GuarantorRow {
    fn into_guarantor(self) -> StoreResult<LoanGuarantor> {
        Ok(LoanGuarantor {
            id: self.id,
            tenant_id: self.tenant_id,
            loan_id: self.loan_id,
            guarantor_member_id: self.guarantor_member_id,
            guaranteed_amount: self.guaranteed_amount,
            status: parse_enum::<GuarantorStatus>(&self.status, "guarantor status")?,
            accepted_at: self.accepted_at,
            rejected_at: self.rejected_at,
            rejection_reason: self.rejection_reason,
            notification_sent_at: self.notification_sent_at,
            response_deadline: self.response_deadline,
            created_at: self.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct VoteRow {
    id: Uuid,
    loan_id: Uuid,
    voter_id: Uuid,
    vote: String,
    notes: Option<String>,
    cast_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct TransactionRow {
    id: Uuid,
    tenant_id: Uuid,
    member_id: Uuid,
    transaction_number: String,
    transaction_type: String,
    amount: Decimal,
    transaction_date: NaiveDate,
    description: String,
    reference_id: Option<Uuid>,
    reference_type: Option<String>,
    status: String,
    created_by: Uuid,
    created_at: DateTime<Utc>,
}

impl TransactionRow {
    fn into_transaction(self) -> StoreResult<Transaction> {
        Ok(Transaction {
            id: self.id,
            tenant_id: self.tenant_id,
            member_id: self.member_id,
            transaction_number: self.transaction_number,
            transaction_type: parse_enum::<TransactionType>(
                &self.transaction_type,
                "transaction type",
            )?,
            amount: self.amount,
            transaction_date: self.transaction_date,
            description: self.description,
            reference_id: self.reference_id,
            reference_type: self.reference_type,
            status: parse_enum::<TransactionStatus>(&self.status, "transaction status")?,
            created_by: self.created_by,
            created_at: self.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct WorkflowLogRow {
    id: Uuid,
    loan_id: Uuid,
    action_type: String,
    action_by: Uuid,
    from_status: Option<String>,
    to_status: Option<String>,
    notes: String,
    metadata: Option<Value>,
    created_at: DateTime<Utc>,
}

impl WorkflowLogRow {
    fn into_log(self) -> StoreResult<LoanWorkflowLog> {
        Ok(LoanWorkflowLog {
            id: self.id,
            loan_id: self.loan_id,
            action_type: parse_enum::<WorkflowActionType>(&self.action_type, "action type")?,
            action_by: self.action_by,
            from_status: parse_enum_opt::<LoanStatus>(self.from_status, "loan status")?,
            to_status: parse_enum_opt::<LoanStatus>(self.to_status, "loan status")?,
            notes: self.notes,
            metadata: self.metadata,
            created_at: self.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct DeductionRequestRow {
    id: Uuid,
    tenant_id: Uuid,
    batch_number: String,
    month: i32,
    year: i32,
    total_members: i32,
    total_amount: Decimal,
    status: String,
    submitted_by: Option<Uuid>,
    submitted_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl DeductionRequestRow {
    fn into_request(self) -> StoreResult<DeductionRequest> {
        Ok(DeductionRequest {
            id: self.id,
            tenant_id: self.tenant_id,
            batch_number: self.batch_number,
            month: self.month as u32,
            year: self.year,
            total_members: self.total_members as u32,
            total_amount: self.total_amount,
            status: parse_enum::<DeductionRequestStatus>(&self.status, "deduction status")?,
            submitted_by: self.submitted_by,
            submitted_at: self.submitted_at,
            created_at: self.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct DeductionItemRow {
    id: Uuid,
    request_id: Uuid,
    member_id: Uuid,
    member_number: String,
    national_id: String,
    member_name: String,
    current_amount: Decimal,
    previous_amount: Decimal,
    change_reason: String,
    savings: Decimal,
    loan_repayment: Decimal,
    insurance: Decimal,
    is_over_limit: bool,
    limit_notes: Option<String>,
}

impl DeductionItemRow {
    fn into_item(self) -> StoreResult<DeductionItem> {
        Ok(DeductionItem {
            id: self.id,
            request_id: self.request_id,
            member_id: self.member_id,
            member_number: self.member_number,
            national_id: self.national_id,
            member_name: self.member_name,
            current_amount: self.current_amount,
            previous_amount: self.previous_amount,
            change_reason: parse_enum::<ChangeReason>(&self.change_reason, "change reason")?,
            breakdown: DeductionBreakdown {
                savings: self.savings,
                loan_repayment: self.loan_repayment,
                insurance: self.insurance,
            },
            is_over_limit: self.is_over_limit,
            limit_notes: self.limit_notes,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ReconciliationBatchRow {
    id: Uuid,
    tenant_id: Uuid,
    batch_number: String,
    month: i32,
    year: i32,
    deduction_request_id: Option<Uuid>,
    total_records: i32,
    matched_records: i32,
    variance_records: i32,
    unmatched_records: i32,
    total_expected: Decimal,
    total_actual: Decimal,
    total_variance: Decimal,
    status: String,
    processed_by: Uuid,
    processed_at: DateTime<Utc>,
}

impl ReconciliationBatchRow {
    fn into_batch(self) -> StoreResult<ReconciliationBatch> {
        Ok(ReconciliationBatch {
            id: self.id,
            tenant_id: self.tenant_id,
            batch_number: self.batch_number,
            month: self.month as u32,
            year: self.year,
            deduction_request_id: self.deduction_request_id,
            total_records: self.total_records as u32,
            matched_records: self.matched_records as u32,
            variance_records: self.variance_records as u32,
            unmatched_records: self.unmatched_records as u32,
            total_expected: self.total_expected,
            total_actual: self.total_actual,
            total_variance: self.total_variance,
            status: parse_enum::<ReconciliationStatus>(&self.status, "reconciliation status")?,
            processed_by: self.processed_by,
            processed_at: self.processed_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ReconciliationItemRow {
    id: Uuid,
    batch_id: Uuid,
    member_id: Option<Uuid>,
    member_number: String,
    national_id: Option<String>,
    expected_amount: Decimal,
    actual_amount: Decimal,
    variance: Decimal,
    match_status: String,
    variance_reason: Option<String>,
    notes: Option<String>,
    requires_manual_review: bool,
}

impl ReconciliationItemRow {
    fn into_item(self) -> StoreResult<ReconciliationItem> {
        Ok(ReconciliationItem {
            id: self.id,
            batch_id: self.batch_id,
            member_id: self.member_id,
            member_number: self.member_number,
            national_id: self.national_id,
            expected_amount: self.expected_amount,
            actual_amount: self.actual_amount,
            variance: self.variance,
            match_status: parse_enum::<MatchStatus>(&self.match_status, "match status")?,
            variance_reason: parse_enum_opt::<VarianceReason>(
                self.variance_reason,
                "variance reason",
            )?,
            notes: self.notes,
            requires_manual_review: self.requires_manual_review,
        })
    }
}

// ---- write helpers shared between pool and transaction paths ----

async fn insert_workflow_log(
    tx: &mut PgTransaction<'_, Postgres>,
    log: &LoanWorkflowLog,
) -> StoreResult<()> {
    sqlx::query(
        "INSERT INTO loan_workflow_logs
         (id, loan_id, action_type, action_by, from_status, to_status, notes, metadata, created_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
    )
    .bind(log.id)
    .bind(log.loan_id)
    .bind(log.action_type.to_string())
    .bind(log.action_by)
    .bind(log.from_status.map(|s| s.to_string()))
    .bind(log.to_status.map(|s| s.to_string()))
    .bind(&log.notes)
    .bind(&log.metadata)
    .bind(log.created_at)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn guarded_loan_update(
    tx: &mut PgTransaction<'_, Postgres>,
    loan: &Loan,
    expected: &[LoanStatus],
) -> StoreResult<()> {
    let eligibility_report = loan
        .eligibility_report
        .as_ref()
        .map(serde_json::to_value)
        .transpose()
        .map_err(|e| StoreError::Serialization(format!("eligibility report: {e}")))?;

    let result = sqlx::query(
        "UPDATE loans SET
            monthly_installment = $1,
            total_amount_due = $2,
            amount_paid = $3,
            outstanding_balance = $4,
            status = $5,
            workflow_stage = $6,
            rejection_reason = $7,
            eligibility_check_passed = $8,
            eligibility_report = $9,
            loan_officer_id = $10,
            loan_officer_notes = $11,
            loan_officer_review_date = $12,
            committee_approval_date = $13,
            approval_date = $14,
            disbursement_date = $15,
            maturity_date = $16,
            approved_by = $17,
            disbursed_by = $18,
            updated_at = $19
         WHERE id = $20 AND status = ANY($21)",
    )
    .bind(loan.monthly_installment)
    .bind(loan.total_amount_due)
    .bind(loan.amount_paid)
    .bind(loan.outstanding_balance)
    .bind(loan.status.to_string())
    .bind(loan.workflow_stage.map(|s| s.to_string()))
    .bind(&loan.rejection_reason)
    .bind(loan.eligibility_check_passed)
    .bind(eligibility_report)
    .bind(loan.loan_officer_id)
    .bind(&loan.loan_officer_notes)
    .bind(loan.loan_officer_review_date)
    .bind(loan.committee_approval_date)
    .bind(loan.approval_date)
    .bind(loan.disbursement_date)
    .bind(loan.maturity_date)
    .bind(loan.approved_by)
    .bind(loan.disbursed_by)
    .bind(loan.updated_at)
    .bind(loan.id)
    .bind(statuses_as_text(expected))
    .execute(&mut **tx)
    .await?;

    if result.rows_affected() == 0 {
        return Err(StoreError::Conflict(format!(
            "Loan {} is no longer in an expected status",
            loan.id
        )));
    }
    Ok(())
}

#[async_trait]
impl SaccoStore for PgStore {
    async fn member(&self, tenant_id: Uuid, member_id: Uuid) -> StoreResult<Member> {
        sqlx::query_as::<_, MemberRow>(
            "SELECT * FROM members WHERE tenant_id = $1 AND id = $2",
        )
        .bind(tenant_id)
        .bind(member_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::NotFound(format!("Member {member_id}")))?
        .into_member()
    }

    async fn member_by_number(
        &self,
        tenant_id: Uuid,
        member_number: &str,
    ) -> StoreResult<Option<Member>> {
        sqlx::query_as::<_, MemberRow>(
            "SELECT * FROM members WHERE tenant_id = $1 AND member_number = $2",
        )
        .bind(tenant_id)
        .bind(member_number)
        .fetch_optional(&self.pool)
        .await?
        .map(MemberRow::into_member)
        .transpose()
    }

    async fn payroll_members(&self, tenant_id: Uuid) -> StoreResult<Vec<Member>> {
        sqlx::query_as::<_, MemberRow>(
            "SELECT * FROM members
             WHERE tenant_id = $1 AND status = 'active' AND employment_status = 'employed'
             ORDER BY member_number",
        )
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(MemberRow::into_member)
        .collect()
    }

    async fn total_savings(&self, member_id: Uuid) -> StoreResult<Decimal> {
        let total: Option<Decimal> = sqlx::query_scalar(
            "SELECT SUM(current_balance) FROM member_savings WHERE member_id = $1",
        )
        .bind(member_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(total.unwrap_or(Decimal::ZERO))
    }

    async fn active_savings(&self, member_id: Uuid) -> StoreResult<Vec<MemberSavings>> {
        let rows = sqlx::query_as::<_, SavingsRow>(
            "SELECT * FROM member_savings WHERE member_id = $1 AND is_active",
        )
        .bind(member_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|r| MemberSavings {
                id: r.id,
                tenant_id: r.tenant_id,
                member_id: r.member_id,
                product_name: r.product_name,
                monthly_contribution: r.monthly_contribution,
                current_balance: r.current_balance,
                is_active: r.is_active,
            })
            .collect())
    }

    async fn active_policies(&self, member_id: Uuid) -> StoreResult<Vec<InsurancePolicy>> {
        let rows = sqlx::query_as::<_, PolicyRow>(
            "SELECT * FROM insurance_policies WHERE member_id = $1 AND status = 'active'",
        )
        .bind(member_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter()
            .map(|r| {
                Ok(InsurancePolicy {
                    id: r.id,
                    tenant_id: r.tenant_id,
                    member_id: r.member_id,
                    policy_number: r.policy_number,
                    monthly_premium: r.monthly_premium,
                    status: parse_enum::<PolicyStatus>(&r.status, "policy status")?,
                })
            })
            .collect()
    }

    async fn loan_product(&self, tenant_id: Uuid, product_id: Uuid) -> StoreResult<LoanProduct> {
        let row = sqlx::query_as::<_, ProductRow>(
            "SELECT * FROM loan_products WHERE tenant_id = $1 AND id = $2",
        )
        .bind(tenant_id)
        .bind(product_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::NotFound(format!("Loan product {product_id}")))?;
        Ok(LoanProduct {
            id: row.id,
            tenant_id: row.tenant_id,
            name: row.name,
            code: row.code,
            interest_rate: row.interest_rate,
            minimum_amount: row.minimum_amount,
            maximum_amount: row.maximum_amount,
            minimum_term_months: row.minimum_term_months as u32,
            maximum_term_months: row.maximum_term_months as u32,
            required_guarantors: row.required_guarantors as u32,
            processing_fee_percentage: row.processing_fee_percentage,
            insurance_fee_percentage: row.insurance_fee_percentage,
            savings_multiplier: row.savings_multiplier,
        })
    }

    async fn create_loan(&self, loan: &Loan) -> StoreResult<()> {
        let eligibility_report = loan
            .eligibility_report
            .as_ref()
            .map(serde_json::to_value)
            .transpose()
            .map_err(|e| StoreError::Serialization(format!("eligibility report: {e}")))?;
        sqlx::query(
            "INSERT INTO loans
             (id, tenant_id, loan_number, member_id, product_id, principal_amount, interest_rate,
              term_months, monthly_installment, processing_fee, insurance_fee, total_amount_due,
              amount_paid, outstanding_balance, status, workflow_stage, purpose, rejection_reason,
              eligibility_check_passed, eligibility_report, loan_officer_id, loan_officer_notes,
              loan_officer_review_date, committee_approval_date, application_date, approval_date,
              disbursement_date, maturity_date, approved_by, disbursed_by, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17,
                     $18, $19, $20, $21, $22, $23, $24, $25, $26, $27, $28, $29, $30, $31, $32)",
        )
        .bind(loan.id)
        .bind(loan.tenant_id)
        .bind(&loan.loan_number)
        .bind(loan.member_id)
        .bind(loan.product_id)
        .bind(loan.principal_amount)
        .bind(loan.interest_rate)
        .bind(loan.term_months as i32)
        .bind(loan.monthly_installment)
        .bind(loan.processing_fee)
        .bind(loan.insurance_fee)
        .bind(loan.total_amount_due)
        .bind(loan.amount_paid)
        .bind(loan.outstanding_balance)
        .bind(loan.status.to_string())
        .bind(loan.workflow_stage.map(|s| s.to_string()))
        .bind(&loan.purpose)
        .bind(&loan.rejection_reason)
        .bind(loan.eligibility_check_passed)
        .bind(eligibility_report)
        .bind(loan.loan_officer_id)
        .bind(&loan.loan_officer_notes)
        .bind(loan.loan_officer_review_date)
        .bind(loan.committee_approval_date)
        .bind(loan.application_date)
        .bind(loan.approval_date)
        .bind(loan.disbursement_date)
        .bind(loan.maturity_date)
        .bind(loan.approved_by)
        .bind(loan.disbursed_by)
        .bind(loan.created_at)
        .bind(loan.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn loan(&self, tenant_id: Uuid, loan_id: Uuid) -> StoreResult<Loan> {
        sqlx::query_as::<_, LoanRow>("SELECT * FROM loans WHERE tenant_id = $1 AND id = $2")
            .bind(tenant_id)
            .bind(loan_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("Loan {loan_id}")))?
            .into_loan()
    }

    async fn member_loans_in(
        &self,
        tenant_id: Uuid,
        member_id: Uuid,
        statuses: &[LoanStatus],
    ) -> StoreResult<Vec<Loan>> {
        sqlx::query_as::<_, LoanRow>(
            "SELECT * FROM loans
             WHERE tenant_id = $1 AND member_id = $2 AND status = ANY($3)",
        )
        .bind(tenant_id)
        .bind(member_id)
        .bind(statuses_as_text(statuses))
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(LoanRow::into_loan)
        .collect()
    }

    async fn tenant_loans(&self, tenant_id: Uuid) -> StoreResult<Vec<Loan>> {
        sqlx::query_as::<_, LoanRow>("SELECT * FROM loans WHERE tenant_id = $1")
            .bind(tenant_id)
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(LoanRow::into_loan)
            .collect()
    }

    async fn update_loan_logged(
        &self,
        loan: &Loan,
        expected: &[LoanStatus],
        log: &LoanWorkflowLog,
    ) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        guarded_loan_update(&mut tx, loan, expected).await?;
        insert_workflow_log(&mut tx, log).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn commit_loan_transaction(
        &self,
        loan: &Loan,
        expected: &[LoanStatus],
        transaction: &Transaction,
        log: &LoanWorkflowLog,
    ) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        guarded_loan_update(&mut tx, loan, expected).await?;
        sqlx::query(
            "INSERT INTO transactions
             (id, tenant_id, member_id, transaction_number, transaction_type, amount,
              transaction_date, description, reference_id, reference_type, status, created_by,
              created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)",
        )
        .bind(transaction.id)
        .bind(transaction.tenant_id)
        .bind(transaction.member_id)
        .bind(&transaction.transaction_number)
        .bind(transaction.transaction_type.to_string())
        .bind(transaction.amount)
        .bind(transaction.transaction_date)
        .bind(&transaction.description)
        .bind(transaction.reference_id)
        .bind(&transaction.reference_type)
        .bind(transaction.status.to_string())
        .bind(transaction.created_by)
        .bind(transaction.created_at)
        .execute(&mut *tx)
        .await?;
        insert_workflow_log(&mut tx, log).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn loan_transactions(&self, loan_id: Uuid) -> StoreResult<Vec<Transaction>> {
        sqlx::query_as::<_, TransactionRow>(
            "SELECT * FROM transactions
             WHERE reference_id = $1 AND reference_type = 'loan'
             ORDER BY created_at",
        )
        .bind(loan_id)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(TransactionRow::into_transaction)
        .collect()
    }

    async fn append_workflow_log(&self, log: &LoanWorkflowLog) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        insert_workflow_log(&mut tx, log).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn workflow_logs(&self, loan_id: Uuid) -> StoreResult<Vec<LoanWorkflowLog>> {
        sqlx::query_as::<_, WorkflowLogRow>(
            "SELECT * FROM loan_workflow_logs WHERE loan_id = $1 ORDER BY created_at",
        )
        .bind(loan_id)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(WorkflowLogRow::into_log)
        .collect()
    }

    async fn create_guarantors(&self, rows: &[LoanGuarantor]) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        for row in rows {
            sqlx::query(
                "INSERT INTO loan_guarantors
                 (id, tenant_id, loan_id, guarantor_member_id, guaranteed_amount, status,
                  accepted_at, rejected_at, rejection_reason, notification_sent_at,
                  response_deadline, created_at)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
            )
            .bind(row.id)
            .bind(row.tenant_id)
            .bind(row.loan_id)
            .bind(row.guarantor_member_id)
            .bind(row.guaranteed_amount)
            .bind(row.status.to_string())
            .bind(row.accepted_at)
            .bind(row.rejected_at)
            .bind(&row.rejection_reason)
            .bind(row.notification_sent_at)
            .bind(row.response_deadline)
            .bind(row.created_at)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn loan_guarantors(&self, loan_id: Uuid) -> StoreResult<Vec<LoanGuarantor>> {
        sqlx::query_as::<_, GuarantorRow>(
            "SELECT * FROM loan_guarantors WHERE loan_id = $1 ORDER BY created_at",
        )
        .bind(loan_id)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(GuarantorRow::into_guarantor)
        .collect()
    }

    async fn guarantor(&self, tenant_id: Uuid, guarantor_id: Uuid) -> StoreResult<LoanGuarantor> {
        sqlx::query_as::<_, GuarantorRow>(
            "SELECT * FROM loan_guarantors WHERE tenant_id = $1 AND id = $2",
        )
        .bind(tenant_id)
        .bind(guarantor_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::NotFound(format!("Guarantor {guarantor_id}")))?
        .into_guarantor()
    }

    async fn update_guarantor(&self, row: &LoanGuarantor) -> StoreResult<()> {
        let result = sqlx::query(
            "UPDATE loan_guarantors SET
                status = $1, accepted_at = $2, rejected_at = $3, rejection_reason = $4,
                notification_sent_at = $5, response_deadline = $6
             WHERE id = $7",
        )
        .bind(row.status.to_string())
        .bind(row.accepted_at)
        .bind(row.rejected_at)
        .bind(&row.rejection_reason)
        .bind(row.notification_sent_at)
        .bind(row.response_deadline)
        .bind(row.id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("Guarantor {}", row.id)));
        }
        Ok(())
    }

    async fn upsert_vote(&self, vote: &LoanVote) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO loan_votes (id, loan_id, voter_id, vote, notes, cast_at)
             VALUES ($1, $2, $3, $4, $5, $6)
             ON CONFLICT (loan_id, voter_id)
             DO UPDATE SET vote = EXCLUDED.vote, notes = EXCLUDED.notes, cast_at = EXCLUDED.cast_at",
        )
        .bind(vote.id)
        .bind(vote.loan_id)
        .bind(vote.voter_id)
        .bind(vote.vote.to_string())
        .bind(&vote.notes)
        .bind(vote.cast_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn loan_votes(&self, loan_id: Uuid) -> StoreResult<Vec<LoanVote>> {
        let rows = sqlx::query_as::<_, VoteRow>(
            "SELECT * FROM loan_votes WHERE loan_id = $1 ORDER BY cast_at",
        )
        .bind(loan_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter()
            .map(|r| {
                Ok(LoanVote {
                    id: r.id,
                    loan_id: r.loan_id,
                    voter_id: r.voter_id,
                    vote: parse_enum::<VoteChoice>(&r.vote, "vote")?,
                    notes: r.notes,
                    cast_at: r.cast_at,
                })
            })
            .collect()
    }

    async fn create_deduction_request(
        &self,
        request: &DeductionRequest,
        items: &[DeductionItem],
    ) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "INSERT INTO deduction_requests
             (id, tenant_id, batch_number, month, year, total_members, total_amount, status,
              submitted_by, submitted_at, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
        )
        .bind(request.id)
        .bind(request.tenant_id)
        .bind(&request.batch_number)
        .bind(request.month as i32)
        .bind(request.year)
        .bind(request.total_members as i32)
        .bind(request.total_amount)
        .bind(request.status.to_string())
        .bind(request.submitted_by)
        .bind(request.submitted_at)
        .bind(request.created_at)
        .execute(&mut *tx)
        .await?;
        for item in items {
            sqlx::query(
                "INSERT INTO deduction_items
                 (id, request_id, member_id, member_number, national_id, member_name,
                  current_amount, previous_amount, change_reason, savings, loan_repayment,
                  insurance, is_over_limit, limit_notes)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)",
            )
            .bind(item.id)
            .bind(item.request_id)
            .bind(item.member_id)
            .bind(&item.member_number)
            .bind(&item.national_id)
            .bind(&item.member_name)
            .bind(item.current_amount)
            .bind(item.previous_amount)
            .bind(item.change_reason.to_string())
            .bind(item.breakdown.savings)
            .bind(item.breakdown.loan_repayment)
            .bind(item.breakdown.insurance)
            .bind(item.is_over_limit)
            .bind(&item.limit_notes)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn deduction_request(
        &self,
        tenant_id: Uuid,
        request_id: Uuid,
    ) -> StoreResult<DeductionRequest> {
        sqlx::query_as::<_, DeductionRequestRow>(
            "SELECT * FROM deduction_requests WHERE tenant_id = $1 AND id = $2",
        )
        .bind(tenant_id)
        .bind(request_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::NotFound(format!("Deduction request {request_id}")))?
        .into_request()
    }

    async fn deduction_request_for_period(
        &self,
        tenant_id: Uuid,
        month: u32,
        year: i32,
        status: Option<DeductionRequestStatus>,
    ) -> StoreResult<Option<DeductionRequest>> {
        sqlx::query_as::<_, DeductionRequestRow>(
            "SELECT * FROM deduction_requests
             WHERE tenant_id = $1 AND month = $2 AND year = $3
               AND ($4::text IS NULL OR status = $4)
             ORDER BY created_at DESC
             LIMIT 1",
        )
        .bind(tenant_id)
        .bind(month as i32)
        .bind(year)
        .bind(status.map(|s| s.to_string()))
        .fetch_optional(&self.pool)
        .await?
        .map(DeductionRequestRow::into_request)
        .transpose()
    }

    async fn deduction_items(&self, request_id: Uuid) -> StoreResult<Vec<DeductionItem>> {
        sqlx::query_as::<_, DeductionItemRow>(
            "SELECT * FROM deduction_items WHERE request_id = $1 ORDER BY member_number",
        )
        .bind(request_id)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(DeductionItemRow::into_item)
        .collect()
    }

    async fn update_deduction_request(&self, request: &DeductionRequest) -> StoreResult<()> {
        let result = sqlx::query(
            "UPDATE deduction_requests SET status = $1, submitted_by = $2, submitted_at = $3
             WHERE id = $4",
        )
        .bind(request.status.to_string())
        .bind(request.submitted_by)
        .bind(request.submitted_at)
        .bind(request.id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("Deduction request {}", request.id)));
        }
        Ok(())
    }

    async fn create_reconciliation(
        &self,
        batch: &ReconciliationBatch,
        items: &[ReconciliationItem],
    ) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "INSERT INTO reconciliation_batches
             (id, tenant_id, batch_number, month, year, deduction_request_id, total_records,
              matched_records, variance_records, unmatched_records, total_expected, total_actual,
              total_variance, status, processed_by, processed_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)",
        )
        .bind(batch.id)
        .bind(batch.tenant_id)
        .bind(&batch.batch_number)
        .bind(batch.month as i32)
        .bind(batch.year)
        .bind(batch.deduction_request_id)
        .bind(batch.total_records as i32)
        .bind(batch.matched_records as i32)
        .bind(batch.variance_records as i32)
        .bind(batch.unmatched_records as i32)
        .bind(batch.total_expected)
        .bind(batch.total_actual)
        .bind(batch.total_variance)
        .bind(batch.status.to_string())
        .bind(batch.processed_by)
        .bind(batch.processed_at)
        .execute(&mut *tx)
        .await?;
        for item in items {
            sqlx::query(
                "INSERT INTO reconciliation_items
                 (id, batch_id, member_id, member_number, national_id, expected_amount,
                  actual_amount, variance, match_status, variance_reason, notes,
                  requires_manual_review)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
            )
            .bind(item.id)
            .bind(item.batch_id)
            .bind(item.member_id)
            .bind(&item.member_number)
            .bind(&item.national_id)
            .bind(item.expected_amount)
            .bind(item.actual_amount)
            .bind(item.variance)
            .bind(item.match_status.to_string())
            .bind(item.variance_reason.map(|r| r.to_string()))
            .bind(&item.notes)
            .bind(item.requires_manual_review)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn reconciliation_batch(
        &self,
        tenant_id: Uuid,
        batch_id: Uuid,
    ) -> StoreResult<ReconciliationBatch> {
        sqlx::query_as::<_, ReconciliationBatchRow>(
            "SELECT * FROM reconciliation_batches WHERE tenant_id = $1 AND id = $2",
        )
        .bind(tenant_id)
        .bind(batch_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::NotFound(format!("Reconciliation batch {batch_id}")))?
        .into_batch()
    }

    async fn reconciliation_items(&self, batch_id: Uuid) -> StoreResult<Vec<ReconciliationItem>> {
        sqlx::query_as::<_, ReconciliationItemRow>(
            "SELECT * FROM reconciliation_items WHERE batch_id = $1 ORDER BY member_number",
        )
        .bind(batch_id)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(ReconciliationItemRow::into_item)
        .collect()
    }
}
