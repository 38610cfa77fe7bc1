//! Eligibility screening for loan applications: savings ratio, one
//! outstanding loan at a time, and minimum membership duration. The three
//! checks are pure decision functions; the service only gathers their
//! inputs. The full report, not just a boolean, is persisted on the loan.

use std::sync::Arc;

use chrono::NaiveDate;
use rust_decimal::Decimal;

use crate::config::WorkflowConfig;
use crate::database::models::loan::{
    ActiveLoanCheck, EligibilityReport, Loan, LoanStatus, MembershipDurationCheck,
    SavingsRatioCheck,
};
use crate::database::store::SaccoStore;
use crate::error::ServiceResult;
use crate::finance;
use crate::services::Clock;

pub struct EligibilityService {
    store: Arc<dyn SaccoStore>,
    clock: Arc<dyn Clock>,
    config: WorkflowConfig,
}

impl EligibilityService {
    pub fn new(store: Arc<dyn SaccoStore>, clock: Arc<dyn Clock>, config: WorkflowConfig) -> Self {
        Self {
            store,
            clock,
            config,
        }
    }

    /// Run all three checks for the loan. Re-running against unchanged
    /// inputs yields an identical verdict and identical numeric evidence.
    pub async fn evaluate(&self, loan: &Loan) -> ServiceResult<EligibilityReport> {
        let member = self.store.member(loan.tenant_id, loan.member_id).await?;
        let product = self
            .store
            .loan_product(loan.tenant_id, loan.product_id)
            .await?;
        let total_savings = self.store.total_savings(member.id).await?;

        let multiplier = if product.savings_multiplier > Decimal::ZERO {
            product.savings_multiplier
        } else {
            self.config.default_savings_multiplier
        };
        let savings_ratio = check_savings_ratio(total_savings, multiplier, loan.principal_amount);

        let outstanding = self
            .store
            .member_loans_in(
                loan.tenant_id,
                member.id,
                &[LoanStatus::Active, LoanStatus::Disbursed],
            )
            .await?;
        let active_loan = check_active_loans(outstanding.len());

        let membership_duration = check_membership_duration(
            member.join_date,
            self.clock.today(),
            self.config.min_membership_months,
        );

        let passed = savings_ratio.passed && active_loan.passed && membership_duration.passed;
        Ok(EligibilityReport {
            passed,
            savings_ratio,
            active_loan,
            membership_duration,
            checked_at: self.clock.now(),
        })
    }
}

/// Savings ratio rule: the member may borrow at most `multiplier` times
/// their total savings.
pub fn check_savings_ratio(
    total_savings: Decimal,
    multiplier: Decimal,
    requested_amount: Decimal,
) -> SavingsRatioCheck {
    let max_loan_amount = (total_savings * multiplier).round_dp(2);
    let required_savings = (requested_amount / multiplier).round_dp(2);
    let passed = requested_amount <= max_loan_amount;
    let details = if passed {
        format!("Member has sufficient savings (P {total_savings}) for a loan of P {requested_amount}")
    } else {
        format!(
            "Insufficient savings. Member has P {total_savings} but needs P {required_savings} for a loan of P {requested_amount}"
        )
    };
    SavingsRatioCheck {
        passed,
        details,
        member_savings: total_savings,
        required_savings,
        max_loan_amount,
    }
}

/// Cooperative policy: one outstanding loan at a time.
pub fn check_active_loans(active_loan_count: usize) -> ActiveLoanCheck {
    let passed = active_loan_count == 0;
    let details = if passed {
        "No active loans found".to_string()
    } else {
        format!("Member has {active_loan_count} active loan(s)")
    };
    ActiveLoanCheck {
        passed,
        details,
        active_loan_count,
    }
}

pub fn check_membership_duration(
    join_date: NaiveDate,
    today: NaiveDate,
    required_months: u32,
) -> MembershipDurationCheck {
    let months_as_member = finance::months_between(join_date, today);
    let passed = months_as_member >= required_months as i32;
    let details = if passed {
        format!("Member has been active for {months_as_member} months")
    } else {
        format!(
            "Member has only been active for {months_as_member} months, requires {required_months} months"
        )
    };
    MembershipDurationCheck {
        passed,
        details,
        join_date,
        months_as_member,
        required_months,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn savings_ratio_caps_at_multiplier() {
        let check = check_savings_ratio(dec("1000"), dec("3"), dec("3000"));
        assert!(check.passed);
        assert_eq!(check.max_loan_amount, dec("3000.00"));

        let check = check_savings_ratio(dec("1000"), dec("3"), dec("3000.01"));
        assert!(!check.passed);
        assert_eq!(check.required_savings, dec("1000.00"));
    }

    #[test]
    fn single_outstanding_loan_policy() {
        assert!(check_active_loans(0).passed);
        let check = check_active_loans(2);
        assert!(!check.passed);
        assert!(check.details.contains("2 active loan(s)"));
    }

    #[test]
    fn membership_duration_is_calendar_months() {
        let join = NaiveDate::from_ymd_opt(2024, 12, 31).unwrap();
        let today = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
        let check = check_membership_duration(join, today, 6);
        assert!(check.passed);
        assert_eq!(check.months_as_member, 6);

        let check = check_membership_duration(join, today, 7);
        assert!(!check.passed);
    }
}
