pub mod committee;
pub mod deductions;
pub mod eligibility;
pub mod guarantors;
pub mod notify;
pub mod reconciliation;
pub mod workflow;

use chrono::{DateTime, NaiveDate, Utc};

/// Time source for the services. Injected so tests can pin dates when
/// exercising maturity arithmetic and membership-duration rules.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
