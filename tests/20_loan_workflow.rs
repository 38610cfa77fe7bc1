//! Loan lifecycle: application pricing, eligibility gating, guarantor
//! staking, officer appraisal, and the disbursement commit.

mod common;

use chrono::NaiveDate;
use common::{dec, Fixture};
use kika_core::database::models::guarantor::GuarantorStatus;
use kika_core::database::models::loan::LoanStatus;
use kika_core::database::models::workflow_log::WorkflowActionType;
use kika_core::database::store::SaccoStore;
use kika_core::services::guarantors::{GuarantorNomination, PledgeDecision};
use kika_core::services::workflow::NewLoanApplication;
use uuid::Uuid;

#[tokio::test]
async fn application_prices_amortized_installment() {
    let f = Fixture::new();
    let member = f.seed_member("M001", "50000", 24);
    let product = f.seed_product();

    let loan = f
        .workflow()
        .submit_application(
            &f.member_actor(&member),
            NewLoanApplication {
                member_id: member.id,
                product_id: product.id,
                principal_amount: dec("10000"),
                term_months: 12,
                purpose: None,
            },
        )
        .await
        .unwrap();

    assert_eq!(loan.status, LoanStatus::Pending);
    let diff = (loan.monthly_installment - dec("888.49")).abs();
    assert!(diff <= dec("0.01"), "installment was {}", loan.monthly_installment);
    // total due = principal + interest (no fees on this product)
    assert_eq!(
        loan.total_amount_due,
        dec("10000") + (loan.monthly_installment * dec("12") - dec("10000"))
    );
}

#[tokio::test]
async fn eligibility_failure_rejects_and_snapshots_report() {
    let f = Fixture::new();
    // 1000 in savings only supports 3000; the member asks for 9000
    let member = f.seed_member("M002", "1000", 24);
    let product = f.seed_product();

    let workflow = f.workflow();
    let loan = workflow
        .submit_application(
            &f.member_actor(&member),
            NewLoanApplication {
                member_id: member.id,
                product_id: product.id,
                principal_amount: dec("9000"),
                term_months: 12,
                purpose: None,
            },
        )
        .await
        .unwrap();
    let (loan, report) = workflow
        .run_eligibility_check(&f.admin(), loan.id)
        .await
        .unwrap();

    assert!(!report.passed);
    assert!(!report.savings_ratio.passed);
    assert!(report.active_loan.passed);
    assert_eq!(loan.status, LoanStatus::Rejected);
    assert_eq!(
        loan.rejection_reason.as_deref(),
        Some("Failed automated eligibility checks")
    );
    assert_eq!(
        loan.eligibility_report.as_ref().unwrap().savings_ratio.max_loan_amount,
        dec("3000.00")
    );
}

#[tokio::test]
async fn eligibility_check_is_idempotent_in_verdict_and_evidence() {
    let f = Fixture::new();
    let member = f.seed_member("M003", "50000", 24);
    let product = f.seed_product();
    let loan = f.loan_in_draft(&member, &product, "6000").await;

    // The transition already consumed PENDING; evaluate directly twice
    let workflow = f.workflow();
    let again = workflow
        .run_eligibility_check(&f.admin(), loan.id)
        .await
        .unwrap_err();
    assert_eq!(again.code(), "STATE_CONFLICT");

    let report_one = loan.eligibility_report.clone().unwrap();
    let eligibility = kika_core::services::eligibility::EligibilityService::new(
        f.store.clone(),
        f.clock.clone(),
        f.config.workflow.clone(),
    );
    let report_two = eligibility.evaluate(&loan).await.unwrap();
    assert_eq!(report_one.passed, report_two.passed);
    assert_eq!(report_one.savings_ratio, report_two.savings_ratio);
    assert_eq!(report_one.active_loan, report_two.active_loan);
    assert_eq!(report_one.membership_duration, report_two.membership_duration);
}

#[tokio::test]
async fn membership_duration_gate_rejects_new_members() {
    let f = Fixture::new();
    let member = f.seed_member("M004", "50000", 3);
    let product = f.seed_product();

    let workflow = f.workflow();
    let loan = workflow
        .submit_application(
            &f.member_actor(&member),
            NewLoanApplication {
                member_id: member.id,
                product_id: product.id,
                principal_amount: dec("1000"),
                term_months: 6,
                purpose: None,
            },
        )
        .await
        .unwrap();
    let (loan, report) = workflow
        .run_eligibility_check(&f.admin(), loan.id)
        .await
        .unwrap();
    assert!(!report.membership_duration.passed);
    assert_eq!(report.membership_duration.months_as_member, 3);
    assert_eq!(loan.status, LoanStatus::Rejected);
}

#[tokio::test]
async fn assign_officer_blocked_while_guarantor_pending() {
    let f = Fixture::new();
    let member = f.seed_member("M005", "50000", 24);
    let guarantor = f.seed_member("G005", "20000", 24);
    let product = f.seed_product();
    let workflow = f.workflow();

    let loan = f.loan_in_draft(&member, &product, "6000").await;
    workflow
        .request_guarantors(
            &f.admin(),
            loan.id,
            vec![GuarantorNomination {
                guarantor_member_id: guarantor.id,
                guaranteed_amount: dec("6000"),
            }],
        )
        .await
        .unwrap();

    let err = workflow
        .assign_officer(&f.admin(), loan.id, Uuid::new_v4())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("1 guarantor(s) have not yet accepted"));

    // status untouched by the failed gate
    let loan = f.store.loan(f.tenant_id, loan.id).await.unwrap();
    assert_eq!(loan.status, LoanStatus::PendingGuarantors);
}

#[tokio::test]
async fn guarantor_response_is_terminal_per_row() {
    let f = Fixture::new();
    let member = f.seed_member("M006", "50000", 24);
    let guarantor = f.seed_member("G006", "20000", 24);
    let product = f.seed_product();
    let workflow = f.workflow();

    let loan = f.loan_in_draft(&member, &product, "6000").await;
    workflow
        .request_guarantors(
            &f.admin(),
            loan.id,
            vec![GuarantorNomination {
                guarantor_member_id: guarantor.id,
                guaranteed_amount: dec("6000"),
            }],
        )
        .await
        .unwrap();
    let pledge = f.store.loan_guarantors(loan.id).await.unwrap().remove(0);

    let updated = workflow
        .guarantors()
        .respond(
            &f.member_actor(&guarantor),
            pledge.id,
            PledgeDecision::Reject,
            Some("Overcommitted this quarter".to_string()),
        )
        .await
        .unwrap();
    assert_eq!(updated.status, GuarantorStatus::Rejected);
    assert!(updated.rejected_at.is_some());

    let err = workflow
        .guarantors()
        .respond(
            &f.member_actor(&guarantor),
            pledge.id,
            PledgeDecision::Accept,
            None,
        )
        .await
        .unwrap_err();
    assert_eq!(err.code(), "STATE_CONFLICT");
}

#[tokio::test]
async fn disbursement_applies_all_effects_atomically() {
    let f = Fixture::new();
    let member = f.seed_member("M007", "50000", 24);
    let guarantor = f.seed_member("G007", "20000", 24);
    let product = f.seed_product();
    let loan = f
        .loan_committee_approved(&member, &guarantor, &product, "6000")
        .await;

    let summary = f
        .workflow()
        .disburse(&f.admin(), loan.id, f.disbursement_details())
        .await
        .unwrap();

    assert_eq!(summary.status, LoanStatus::Disbursed);
    assert_eq!(summary.disbursement_date, Some(f.today()));

    let stored = f.store.loan(f.tenant_id, loan.id).await.unwrap();
    // full amortized amount becomes owed, not just the principal
    assert_eq!(stored.outstanding_balance, stored.total_amount_due);
    assert!(stored.outstanding_balance > dec("6000"));

    let transactions = f.store.loan_transactions(loan.id).await.unwrap();
    assert_eq!(transactions.len(), 1);
    assert_eq!(transactions[0].amount, dec("6000"));

    let logs = f.store.workflow_logs(loan.id).await.unwrap();
    let disbursement_log = logs
        .iter()
        .find(|l| l.action_type == WorkflowActionType::Disbursement)
        .expect("disbursement must be audit-logged");
    assert_eq!(disbursement_log.from_status, Some(LoanStatus::CommitteeApproved));
    assert_eq!(disbursement_log.to_status, Some(LoanStatus::Disbursed));

    // the member is told, fire-and-forget
    let sent = f.notifier.sent.lock().unwrap();
    assert!(sent
        .iter()
        .any(|n| n.recipient_member_id == member.id && n.subject == "Loan disbursed"));
}

#[tokio::test]
async fn second_disbursement_fails_without_side_effects() {
    let f = Fixture::new();
    let member = f.seed_member("M008", "50000", 24);
    let guarantor = f.seed_member("G008", "20000", 24);
    let product = f.seed_product();
    let loan = f
        .loan_committee_approved(&member, &guarantor, &product, "6000")
        .await;

    let workflow = f.workflow();
    workflow
        .disburse(&f.admin(), loan.id, f.disbursement_details())
        .await
        .unwrap();
    let before = f.store.loan(f.tenant_id, loan.id).await.unwrap();

    let err = workflow
        .disburse(&f.admin(), loan.id, f.disbursement_details())
        .await
        .unwrap_err();
    assert_eq!(err.code(), "STATE_CONFLICT");
    assert!(err.to_string().contains("disbursed"));

    let after = f.store.loan(f.tenant_id, loan.id).await.unwrap();
    assert_eq!(after.outstanding_balance, before.outstanding_balance);
    assert_eq!(f.store.loan_transactions(loan.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn month_end_disbursement_clamps_maturity_date() {
    let f = Fixture::new();
    let member = f.seed_member("M009", "50000", 24);
    let product = f.seed_product();
    let workflow = f.workflow();

    // 1-month term via the legacy simple workflow: PENDING -> APPROVED
    let loan = workflow
        .submit_application(
            &f.member_actor(&member),
            NewLoanApplication {
                member_id: member.id,
                product_id: product.id,
                principal_amount: dec("1200"),
                term_months: 1,
                purpose: None,
            },
        )
        .await
        .unwrap();
    workflow.approve(&f.admin(), loan.id).await.unwrap();

    // Disburse on Jan 31 with a 1-month term: maturity lands on Feb 28
    f.clock.set_date(NaiveDate::from_ymd_opt(2025, 1, 31).unwrap());
    let summary = workflow
        .disburse(&f.admin(), loan.id, f.disbursement_details())
        .await
        .unwrap();
    assert_eq!(
        summary.maturity_date,
        Some(NaiveDate::from_ymd_opt(2025, 2, 28).unwrap())
    );
}

#[tokio::test]
async fn repayments_activate_then_close_the_loan() {
    let f = Fixture::new();
    let member = f.seed_member("M011", "50000", 24);
    let guarantor = f.seed_member("G011", "20000", 24);
    let product = f.seed_product();
    let loan = f
        .loan_committee_approved(&member, &guarantor, &product, "6000")
        .await;

    let workflow = f.workflow();
    workflow
        .disburse(&f.admin(), loan.id, f.disbursement_details())
        .await
        .unwrap();
    let owed = f
        .store
        .loan(f.tenant_id, loan.id)
        .await
        .unwrap()
        .outstanding_balance;

    let loan_after = workflow
        .record_repayment(&f.admin(), loan.id, dec("1000"))
        .await
        .unwrap();
    assert_eq!(loan_after.status, LoanStatus::Active);
    assert_eq!(loan_after.outstanding_balance, owed - dec("1000"));
    assert_eq!(loan_after.amount_paid, dec("1000"));

    // overpayment is capped at the balance and closes the loan
    let closed = workflow
        .record_repayment(&f.admin(), loan.id, owed)
        .await
        .unwrap();
    assert_eq!(closed.status, LoanStatus::PaidOff);
    assert_eq!(closed.outstanding_balance, dec("0"));
    assert_eq!(closed.amount_paid, owed);

    let err = workflow
        .record_repayment(&f.admin(), loan.id, dec("10"))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "STATE_CONFLICT");

    // disbursement + two repayments on the ledger
    assert_eq!(f.store.loan_transactions(loan.id).await.unwrap().len(), 3);

    // settlement releases the guarantor's pledge
    let pledges = f.store.loan_guarantors(loan.id).await.unwrap();
    assert_eq!(pledges[0].status, GuarantorStatus::Released);
}

#[tokio::test]
async fn queried_loans_loop_back_into_appraisal() {
    let f = Fixture::new();
    let member = f.seed_member("M012", "50000", 24);
    let guarantor = f.seed_member("G012", "20000", 24);
    let product = f.seed_product();
    let workflow = f.workflow();

    let loan = f.loan_in_draft(&member, &product, "6000").await;
    workflow
        .request_guarantors(
            &f.admin(),
            loan.id,
            vec![GuarantorNomination {
                guarantor_member_id: guarantor.id,
                guaranteed_amount: dec("6000"),
            }],
        )
        .await
        .unwrap();
    let pledge = f.store.loan_guarantors(loan.id).await.unwrap().remove(0);
    workflow
        .guarantors()
        .respond(&f.member_actor(&guarantor), pledge.id, PledgeDecision::Accept, None)
        .await
        .unwrap();
    workflow
        .assign_officer(&f.admin(), loan.id, Uuid::new_v4())
        .await
        .unwrap();

    let queried = workflow
        .query(&f.admin(), loan.id, "Payslips older than 3 months".to_string())
        .await
        .unwrap();
    assert_eq!(queried.status, LoanStatus::Queried);

    // a queried loan cannot go to committee until it is resubmitted
    let err = workflow
        .submit_officer_recommendation(&f.admin(), loan.id, "notes".to_string(), None)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "STATE_CONFLICT");

    let resubmitted = workflow.resubmit(&f.admin(), loan.id).await.unwrap();
    assert_eq!(resubmitted.status, LoanStatus::UnderAppraisal);
    workflow
        .submit_officer_recommendation(&f.admin(), loan.id, "Fresh payslips verified".to_string(), None)
        .await
        .unwrap();
    let loan = f.store.loan(f.tenant_id, loan.id).await.unwrap();
    assert_eq!(loan.status, LoanStatus::AwaitingCommittee);
}

#[tokio::test]
async fn reject_requires_reason_and_pre_committee_status() {
    let f = Fixture::new();
    let member = f.seed_member("M010", "50000", 24);
    let product = f.seed_product();
    let workflow = f.workflow();
    let loan = f.loan_in_draft(&member, &product, "6000").await;

    let err = workflow
        .reject(&f.admin(), loan.id, "  ".to_string())
        .await
        .unwrap_err();
    assert_eq!(err.code(), "VALIDATION_ERROR");

    let rejected = workflow
        .reject(&f.admin(), loan.id, "Incomplete documentation".to_string())
        .await
        .unwrap();
    assert_eq!(rejected.status, LoanStatus::Rejected);

    let err = workflow
        .reject(&f.admin(), loan.id, "again".to_string())
        .await
        .unwrap_err();
    assert_eq!(err.code(), "STATE_CONFLICT");
}
