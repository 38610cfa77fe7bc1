use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::env;

/// Application configuration, created once at process start (or per test
/// fixture) and passed down explicitly. Call sites never consult a global.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub workflow: WorkflowConfig,
    pub deductions: DeductionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub max_connections: u32,
    pub connection_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowConfig {
    /// Minimum committee votes before a decision may be finalized
    pub required_quorum: usize,
    /// Months of membership required before a loan application is eligible
    pub min_membership_months: u32,
    /// Fallback savings multiplier when the loan product does not set one
    pub default_savings_multiplier: Decimal,
    /// Days a guarantor has to respond to a pledge request
    pub guarantor_response_days: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeductionConfig {
    /// Ceiling on total deductions as a percentage of net salary
    pub max_deduction_percentage: Decimal,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::defaults().with_env_overrides()
    }

    fn defaults() -> Self {
        Self {
            database: DatabaseConfig {
                max_connections: 10,
                connection_timeout_secs: 30,
            },
            workflow: WorkflowConfig {
                required_quorum: 3,
                min_membership_months: 6,
                default_savings_multiplier: Decimal::from(3),
                guarantor_response_days: 7,
            },
            deductions: DeductionConfig {
                max_deduction_percentage: Decimal::from(40),
            },
        }
    }

    fn with_env_overrides(mut self) -> Self {
        if let Ok(v) = env::var("KIKA_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = v.parse().unwrap_or(self.database.max_connections);
        }
        if let Ok(v) = env::var("KIKA_DATABASE_CONNECTION_TIMEOUT") {
            self.database.connection_timeout_secs =
                v.parse().unwrap_or(self.database.connection_timeout_secs);
        }
        if let Ok(v) = env::var("KIKA_REQUIRED_QUORUM") {
            self.workflow.required_quorum = v.parse().unwrap_or(self.workflow.required_quorum);
        }
        if let Ok(v) = env::var("KIKA_MIN_MEMBERSHIP_MONTHS") {
            self.workflow.min_membership_months =
                v.parse().unwrap_or(self.workflow.min_membership_months);
        }
        if let Ok(v) = env::var("KIKA_SAVINGS_MULTIPLIER") {
            self.workflow.default_savings_multiplier = v
                .parse()
                .unwrap_or(self.workflow.default_savings_multiplier);
        }
        if let Ok(v) = env::var("KIKA_GUARANTOR_RESPONSE_DAYS") {
            self.workflow.guarantor_response_days =
                v.parse().unwrap_or(self.workflow.guarantor_response_days);
        }
        if let Ok(v) = env::var("KIKA_MAX_DEDUCTION_PERCENTAGE") {
            self.deductions.max_deduction_percentage = v
                .parse()
                .unwrap_or(self.deductions.max_deduction_percentage);
        }
        self
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::defaults();
        assert_eq!(config.workflow.required_quorum, 3);
        assert_eq!(config.workflow.min_membership_months, 6);
        assert_eq!(config.workflow.default_savings_multiplier, Decimal::from(3));
        assert_eq!(
            config.deductions.max_deduction_percentage,
            Decimal::from(40)
        );
    }
}
