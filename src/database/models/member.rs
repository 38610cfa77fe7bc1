use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MemberStatus {
    Active,
    Suspended,
    Exited,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EmploymentStatus {
    Employed,
    SelfEmployed,
    Retired,
    Unemployed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Member {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub member_number: String,
    pub first_name: String,
    pub last_name: String,
    pub national_id: String,
    pub employee_number: Option<String>,
    pub phone: String,
    pub email: String,
    pub status: MemberStatus,
    pub employment_status: EmploymentStatus,
    pub monthly_net_salary: Decimal,
    pub join_date: NaiveDate,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Member {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    /// Members eligible for payroll deduction instructions
    pub fn is_payroll_deductible(&self) -> bool {
        self.status == MemberStatus::Active && self.employment_status == EmploymentStatus::Employed
    }
}

/// A member's holding in one savings product.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemberSavings {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub member_id: Uuid,
    pub product_name: String,
    pub monthly_contribution: Decimal,
    pub current_balance: Decimal,
    pub is_active: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PolicyStatus {
    Active,
    Lapsed,
    Matured,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsurancePolicy {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub member_id: Uuid,
    pub policy_number: String,
    pub monthly_premium: Decimal,
    pub status: PolicyStatus,
}
