//! Monthly payroll-deduction batch generation. For each deductible member
//! the expected amount is the sum of active savings contributions, open
//! loan installments, and active insurance premiums. The CSV rendered from
//! the batch is the artifact actually submitted to the payroll authority;
//! no deduction is executed inside this platform.

use std::collections::HashMap;
use std::sync::Arc;

use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::auth::{Action, Actor};
use crate::config::DeductionConfig;
use crate::database::models::deduction::{
    ChangeReason, DeductionBreakdown, DeductionItem, DeductionRequest, DeductionRequestStatus,
};
use crate::database::models::loan::LoanStatus;
use crate::database::models::member::Member;
use crate::database::store::SaccoStore;
use crate::error::{ServiceError, ServiceResult};
use crate::services::Clock;

pub struct DeductionService {
    store: Arc<dyn SaccoStore>,
    clock: Arc<dyn Clock>,
    config: DeductionConfig,
}

/// CSV row in the payroll authority's submission format.
#[derive(Debug, Serialize)]
struct ExportRow<'a> {
    #[serde(rename = "memberNumber")]
    member_number: &'a str,
    #[serde(rename = "nationalId")]
    national_id: &'a str,
    name: &'a str,
    savings: Decimal,
    #[serde(rename = "loanInstallment")]
    loan_installment: Decimal,
    #[serde(rename = "insurancePremium")]
    insurance_premium: Decimal,
    total: Decimal,
}

impl DeductionService {
    pub fn new(store: Arc<dyn SaccoStore>, clock: Arc<dyn Clock>, config: DeductionConfig) -> Self {
        Self {
            store,
            clock,
            config,
        }
    }

    /// Build the (tenant, month, year) batch. Fails if a batch for the
    /// period was already submitted. Members with a zero expected total are
    /// left out entirely.
    pub async fn generate_batch(
        &self,
        actor: &Actor,
        month: u32,
        year: i32,
    ) -> ServiceResult<(DeductionRequest, Vec<DeductionItem>)> {
        actor.authorize(Action::GenerateDeductions, actor.tenant_id)?;
        validate_period(month, year)?;

        if self
            .store
            .deduction_request_for_period(
                actor.tenant_id,
                month,
                year,
                Some(DeductionRequestStatus::Submitted),
            )
            .await?
            .is_some()
        {
            return Err(ServiceError::validation(format!(
                "Deduction request for {year}-{month:02} has already been submitted"
            )));
        }

        let previous = self.previous_month_items(actor.tenant_id, month, year).await?;
        let members = self.store.payroll_members(actor.tenant_id).await?;
        let request_id = Uuid::new_v4();
        let mut items = Vec::new();
        let mut total_amount = Decimal::ZERO;

        for member in &members {
            let breakdown = self.member_breakdown(member).await?;
            let total = breakdown.total();
            if total.is_zero() {
                continue;
            }

            let prev = previous.get(&member.id);
            let previous_amount = prev.map(|p| p.current_amount).unwrap_or(Decimal::ZERO);
            let change_reason = classify_change(&breakdown, prev.map(|p| &p.breakdown));
            let (is_over_limit, limit_notes) = self.check_limit(member, total);

            total_amount += total;
            items.push(DeductionItem {
                id: Uuid::new_v4(),
                request_id,
                member_id: member.id,
                member_number: member.member_number.clone(),
                national_id: member.national_id.clone(),
                member_name: member.full_name(),
                current_amount: total,
                previous_amount,
                change_reason,
                breakdown,
                is_over_limit,
                limit_notes,
            });
        }

        let request = DeductionRequest {
            id: request_id,
            tenant_id: actor.tenant_id,
            batch_number: format!(
                "DED-{}-{}{:02}",
                &actor.tenant_id.simple().to_string()[..8],
                year,
                month
            ),
            month,
            year,
            total_members: items.len() as u32,
            total_amount,
            status: DeductionRequestStatus::Draft,
            submitted_by: None,
            submitted_at: None,
            created_at: self.clock.now(),
        };
        self.store.create_deduction_request(&request, &items).await?;
        tracing::info!(
            batch = %request.batch_number,
            members = request.total_members,
            total = %request.total_amount,
            "deduction batch generated"
        );
        Ok((request, items))
    }

    /// Render the batch in the payroll authority's CSV format: one row per
    /// member with the amount breakdown.
    pub async fn export_csv(&self, actor: &Actor, request_id: Uuid) -> ServiceResult<String> {
        actor.authorize(Action::GenerateDeductions, actor.tenant_id)?;
        let _request = self.store.deduction_request(actor.tenant_id, request_id).await?;
        let items = self.store.deduction_items(request_id).await?;

        let mut writer = csv::Writer::from_writer(Vec::new());
        for item in &items {
            writer
                .serialize(ExportRow {
                    member_number: &item.member_number,
                    national_id: &item.national_id,
                    name: &item.member_name,
                    savings: item.breakdown.savings,
                    loan_installment: item.breakdown.loan_repayment,
                    insurance_premium: item.breakdown.insurance,
                    total: item.current_amount,
                })
                .map_err(|e| ServiceError::validation(format!("CSV render failed: {e}")))?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|e| ServiceError::validation(format!("CSV render failed: {e}")))?;
        String::from_utf8(bytes)
            .map_err(|e| ServiceError::validation(format!("CSV render failed: {e}")))
    }

    /// DRAFT -> SUBMITTED stamp once the batch has gone to the payroll
    /// authority.
    pub async fn submit(&self, actor: &Actor, request_id: Uuid) -> ServiceResult<DeductionRequest> {
        actor.authorize(Action::SubmitDeductions, actor.tenant_id)?;
        let mut request = self.store.deduction_request(actor.tenant_id, request_id).await?;
        if request.status != DeductionRequestStatus::Draft {
            return Err(ServiceError::state_conflict(
                request.status.to_string(),
                format!("Cannot submit request with status: {}", request.status),
            ));
        }
        request.status = DeductionRequestStatus::Submitted;
        request.submitted_by = Some(actor.user_id);
        request.submitted_at = Some(self.clock.now());
        self.store.update_deduction_request(&request).await?;
        Ok(request)
    }

    async fn member_breakdown(&self, member: &Member) -> ServiceResult<DeductionBreakdown> {
        let savings = self
            .store
            .active_savings(member.id)
            .await?
            .iter()
            .map(|s| s.monthly_contribution)
            .sum();
        let loan_repayment = self
            .store
            .member_loans_in(
                member.tenant_id,
                member.id,
                &[LoanStatus::Active, LoanStatus::Disbursed],
            )
            .await?
            .iter()
            .map(|l| l.monthly_installment)
            .sum();
        let insurance = self
            .store
            .active_policies(member.id)
            .await?
            .iter()
            .map(|p| p.monthly_premium)
            .sum();
        Ok(DeductionBreakdown {
            savings,
            loan_repayment,
            insurance,
        })
    }

    fn check_limit(&self, member: &Member, total: Decimal) -> (bool, Option<String>) {
        let salary = member.monthly_net_salary;
        if salary.is_zero() {
            return (
                !total.is_zero(),
                Some(
                    "Member net salary is not recorded (P 0.00). Any deduction is flagged as over limit."
                        .to_string(),
                ),
            );
        }
        let pct = self.config.max_deduction_percentage;
        let max_deduction = (salary * pct / Decimal::from(100)).round_dp(2);
        let is_over = total > max_deduction;
        let verdict = if is_over { "EXCEEDED." } else { "Within limit." };
        (
            is_over,
            Some(format!(
                "Limit: P {max_deduction} ({pct}% of P {salary}). Total: P {total}. {verdict}"
            )),
        )
    }

    async fn previous_month_items(
        &self,
        tenant_id: Uuid,
        month: u32,
        year: i32,
    ) -> ServiceResult<HashMap<Uuid, DeductionItem>> {
        let (prev_month, prev_year) = if month == 1 {
            (12, year - 1)
        } else {
            (month - 1, year)
        };
        let Some(request) = self
            .store
            .deduction_request_for_period(tenant_id, prev_month, prev_year, None)
            .await?
        else {
            return Ok(HashMap::new());
        };
        let items = self.store.deduction_items(request.id).await?;
        Ok(items.into_iter().map(|i| (i.member_id, i)).collect())
    }
}

fn validate_period(month: u32, year: i32) -> ServiceResult<()> {
    if !(1..=12).contains(&month) {
        return Err(ServiceError::validation("Month must be between 1 and 12"));
    }
    if !(2000..=2100).contains(&year) {
        return Err(ServiceError::validation("Year is out of range"));
    }
    Ok(())
}

fn classify_change(
    current: &DeductionBreakdown,
    previous: Option<&DeductionBreakdown>,
) -> ChangeReason {
    let Some(prev) = previous else {
        return ChangeReason::NewEnrollment;
    };
    if current.loan_repayment.is_zero() && !prev.loan_repayment.is_zero() {
        // Loan paid off since last cycle
        return ChangeReason::PolicyMaturity;
    }
    if current.insurance.is_zero() && !prev.insurance.is_zero() {
        return ChangeReason::PolicyMaturity;
    }
    if current.savings != prev.savings {
        return ChangeReason::ManualAdjustment;
    }
    ChangeReason::AmountChange
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn breakdown(savings: &str, loan: &str, insurance: &str) -> DeductionBreakdown {
        DeductionBreakdown {
            savings: dec(savings),
            loan_repayment: dec(loan),
            insurance: dec(insurance),
        }
    }

    #[test]
    fn first_appearance_is_new_enrollment() {
        let reason = classify_change(&breakdown("100", "0", "0"), None);
        assert_eq!(reason, ChangeReason::NewEnrollment);
    }

    #[test]
    fn loan_payoff_reads_as_policy_maturity() {
        let prev = breakdown("100", "250", "0");
        let reason = classify_change(&breakdown("100", "0", "0"), Some(&prev));
        assert_eq!(reason, ChangeReason::PolicyMaturity);
    }

    #[test]
    fn savings_change_is_manual_adjustment() {
        let prev = breakdown("100", "250", "50");
        let reason = classify_change(&breakdown("150", "250", "50"), Some(&prev));
        assert_eq!(reason, ChangeReason::ManualAdjustment);
    }

    #[test]
    fn period_validation() {
        assert!(validate_period(0, 2025).is_err());
        assert!(validate_period(13, 2025).is_err());
        assert!(validate_period(6, 2025).is_ok());
    }
}
