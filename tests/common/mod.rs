#![allow(dead_code)]

//! Shared fixture for the integration tests: an in-memory store seeded with
//! a tenant, a pinned clock, and a notifier that records instead of
//! delivering.

use std::str::FromStr;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Months, NaiveDate, TimeZone, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use kika_core::auth::{Actor, Role};
use kika_core::config::AppConfig;
use kika_core::database::memory::MemoryStore;
use kika_core::database::models::guarantor::GuarantorStatus;
use kika_core::database::models::loan::{Loan, LoanStatus};
use kika_core::database::models::member::{
    EmploymentStatus, InsurancePolicy, Member, MemberSavings, MemberStatus, PolicyStatus,
};
use kika_core::database::models::product::LoanProduct;
use kika_core::database::models::vote::VoteChoice;
use kika_core::database::store::SaccoStore;
use kika_core::services::committee::CommitteeService;
use kika_core::services::deductions::DeductionService;
use kika_core::services::guarantors::{GuarantorNomination, PledgeDecision};
use kika_core::services::notify::{Notification, NotificationSender, NotifyError};
use kika_core::services::reconciliation::ReconciliationService;
use kika_core::services::workflow::{
    DisbursementDetails, LoanWorkflowService, NewLoanApplication,
};
use kika_core::services::Clock;

pub fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

/// Clock pinned to a fixed instant, adjustable per test.
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn at(now: DateTime<Utc>) -> Self {
        Self { now: Mutex::new(now) }
    }

    pub fn set_date(&self, date: NaiveDate) {
        let at = Utc.from_utc_datetime(&date.and_hms_opt(10, 0, 0).unwrap());
        *self.now.lock().unwrap() = at;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

/// Captures outbound notifications for assertions.
#[derive(Default)]
pub struct RecordingNotifier {
    pub sent: Mutex<Vec<Notification>>,
}

#[async_trait]
impl NotificationSender for RecordingNotifier {
    async fn send(&self, notification: Notification) -> Result<(), NotifyError> {
        self.sent.lock().unwrap().push(notification);
        Ok(())
    }
}

pub struct Fixture {
    pub tenant_id: Uuid,
    pub store: Arc<MemoryStore>,
    pub clock: Arc<ManualClock>,
    pub notifier: Arc<RecordingNotifier>,
    pub config: AppConfig,
}

impl Fixture {
    pub fn new() -> Self {
        let clock = ManualClock::at(Utc.with_ymd_and_hms(2025, 6, 15, 10, 0, 0).unwrap());
        Self {
            tenant_id: Uuid::new_v4(),
            store: Arc::new(MemoryStore::new()),
            clock: Arc::new(clock),
            notifier: Arc::new(RecordingNotifier::default()),
            config: AppConfig::default(),
        }
    }

    pub fn today(&self) -> NaiveDate {
        self.clock.today()
    }

    // ---- actors ----

    pub fn admin(&self) -> Actor {
        Actor::new(Uuid::new_v4(), self.tenant_id, Role::Admin)
    }

    pub fn officer(&self) -> Actor {
        Actor::new(Uuid::new_v4(), self.tenant_id, Role::LoanOfficer)
    }

    pub fn committee_member(&self) -> Actor {
        Actor::new(Uuid::new_v4(), self.tenant_id, Role::CommitteeMember)
    }

    pub fn member_actor(&self, member: &Member) -> Actor {
        Actor::new(member.id, self.tenant_id, Role::Member)
    }

    // ---- services ----

    pub fn workflow(&self) -> LoanWorkflowService {
        LoanWorkflowService::new(
            self.store.clone(),
            self.notifier.clone(),
            self.clock.clone(),
            self.config.workflow.clone(),
        )
    }

    pub fn committee(&self) -> CommitteeService {
        CommitteeService::new(
            self.store.clone(),
            self.clock.clone(),
            self.config.workflow.clone(),
        )
    }

    pub fn deductions(&self) -> DeductionService {
        DeductionService::new(
            self.store.clone(),
            self.clock.clone(),
            self.config.deductions.clone(),
        )
    }

    pub fn reconciliation(&self) -> ReconciliationService {
        ReconciliationService::new(self.store.clone(), self.clock.clone())
    }

    // ---- seed data ----

    pub fn seed_member(&self, member_number: &str, savings: &str, months_of_membership: u32) -> Member {
        let join_date = self
            .today()
            .checked_sub_months(Months::new(months_of_membership))
            .unwrap();
        let member = Member {
            id: Uuid::new_v4(),
            tenant_id: self.tenant_id,
            member_number: member_number.to_string(),
            first_name: "Thabo".to_string(),
            last_name: format!("Member{member_number}"),
            national_id: format!("NID-{member_number}"),
            employee_number: Some(format!("EMP-{member_number}")),
            phone: "+26771000000".to_string(),
            email: format!("{member_number}@example.test"),
            status: MemberStatus::Active,
            employment_status: EmploymentStatus::Employed,
            monthly_net_salary: dec("8000"),
            join_date,
            created_at: self.clock.now(),
            updated_at: self.clock.now(),
        };
        self.store.insert_member(member.clone());
        if !dec(savings).is_zero() {
            self.store.insert_savings(MemberSavings {
                id: Uuid::new_v4(),
                tenant_id: self.tenant_id,
                member_id: member.id,
                product_name: "Ordinary Savings".to_string(),
                monthly_contribution: dec("200"),
                current_balance: dec(savings),
                is_active: true,
            });
        }
        member
    }

    pub fn seed_policy(&self, member: &Member, premium: &str) {
        self.store.insert_policy(InsurancePolicy {
            id: Uuid::new_v4(),
            tenant_id: self.tenant_id,
            member_id: member.id,
            policy_number: format!("POL-{}", member.member_number),
            monthly_premium: dec(premium),
            status: PolicyStatus::Active,
        });
    }

    pub fn seed_product(&self) -> LoanProduct {
        let product = LoanProduct {
            id: Uuid::new_v4(),
            tenant_id: self.tenant_id,
            name: "Short Term Loan".to_string(),
            code: "STL".to_string(),
            interest_rate: dec("12"),
            minimum_amount: dec("100"),
            maximum_amount: dec("100000"),
            minimum_term_months: 1,
            maximum_term_months: 60,
            required_guarantors: 1,
            processing_fee_percentage: dec("0"),
            insurance_fee_percentage: dec("0"),
            savings_multiplier: dec("3"),
        };
        self.store.insert_product(product.clone());
        product
    }

    // ---- workflow drivers ----

    /// Apply and run the eligibility check, landing the loan in DRAFT.
    pub async fn loan_in_draft(&self, member: &Member, product: &LoanProduct, amount: &str) -> Loan {
        let workflow = self.workflow();
        let loan = workflow
            .submit_application(
                &self.member_actor(member),
                NewLoanApplication {
                    member_id: member.id,
                    product_id: product.id,
                    principal_amount: dec(amount),
                    term_months: 12,
                    purpose: Some("Business stock".to_string()),
                },
            )
            .await
            .unwrap();
        let (loan, report) = workflow
            .run_eligibility_check(&self.admin(), loan.id)
            .await
            .unwrap();
        assert!(report.passed, "fixture member should be eligible");
        assert_eq!(loan.status, LoanStatus::Draft);
        loan
    }

    /// Drive a loan all the way to COMMITTEE_APPROVED: guarantor staking,
    /// officer appraisal, and a 3-0 committee vote.
    pub async fn loan_committee_approved(
        &self,
        member: &Member,
        guarantor: &Member,
        product: &LoanProduct,
        amount: &str,
    ) -> Loan {
        let workflow = self.workflow();
        let loan = self.loan_in_draft(member, product, amount).await;

        workflow
            .request_guarantors(
                &self.admin(),
                loan.id,
                vec![GuarantorNomination {
                    guarantor_member_id: guarantor.id,
                    guaranteed_amount: dec(amount),
                }],
            )
            .await
            .unwrap();
        let pledge = self.store.loan_guarantors(loan.id).await.unwrap().remove(0);
        assert_eq!(pledge.status, GuarantorStatus::Pending);
        workflow
            .guarantors()
            .respond(
                &self.member_actor(guarantor),
                pledge.id,
                PledgeDecision::Accept,
                None,
            )
            .await
            .unwrap();

        workflow
            .assign_officer(&self.admin(), loan.id, Uuid::new_v4())
            .await
            .unwrap();
        workflow
            .submit_officer_recommendation(
                &self.admin(),
                loan.id,
                "Collateral verified, income adequate".to_string(),
                Some("Recommend approval".to_string()),
            )
            .await
            .unwrap();

        let committee = self.committee();
        for _ in 0..3 {
            committee
                .record_vote(&self.committee_member(), loan.id, VoteChoice::Approve, None)
                .await
                .unwrap();
        }
        let decision = committee
            .finalize_decision(&self.admin(), loan.id, None)
            .await
            .unwrap();
        assert!(decision.is_final());

        let loan = self.store.loan(self.tenant_id, loan.id).await.unwrap();
        assert_eq!(loan.status, LoanStatus::CommitteeApproved);
        loan
    }

    pub fn disbursement_details(&self) -> DisbursementDetails {
        DisbursementDetails {
            method: "bank_transfer".to_string(),
            account_number: "001-234567".to_string(),
            notes: Some("Standard disbursement".to_string()),
        }
    }
}
