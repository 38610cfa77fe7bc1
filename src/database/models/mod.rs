pub mod deduction;
pub mod guarantor;
pub mod loan;
pub mod member;
pub mod product;
pub mod reconciliation;
pub mod transaction;
pub mod vote;
pub mod workflow_log;
