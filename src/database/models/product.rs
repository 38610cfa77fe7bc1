use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Loan terms template. Applications are validated against the product's
/// amount/term bounds and priced from its rates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoanProduct {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub code: String,
    /// Annual interest rate in percent
    pub interest_rate: Decimal,
    pub minimum_amount: Decimal,
    pub maximum_amount: Decimal,
    pub minimum_term_months: u32,
    pub maximum_term_months: u32,
    pub required_guarantors: u32,
    pub processing_fee_percentage: Decimal,
    pub insurance_fee_percentage: Decimal,
    /// Multiple of total savings a member may borrow
    pub savings_multiplier: Decimal,
}

impl LoanProduct {
    pub fn processing_fee(&self, principal: Decimal) -> Decimal {
        (principal * self.processing_fee_percentage / Decimal::from(100)).round_dp(2)
    }

    pub fn insurance_fee(&self, principal: Decimal) -> Decimal {
        (principal * self.insurance_fee_percentage / Decimal::from(100)).round_dp(2)
    }
}
