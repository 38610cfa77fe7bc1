// Core error types shared by every service
use thiserror::Error;

use crate::database::store::StoreError;

/// Business-facing error with the taxonomy the surrounding HTTP layer maps
/// 1:1 to status codes. Guard failures always carry a message naming the
/// guard that failed so callers can explain the conflict to a user.
#[derive(Debug, Error)]
pub enum ServiceError {
    // Missing/malformed input; surfaced before any state mutation
    #[error("{0}")]
    Validation(String),

    // Wrong role for the attempted operation
    #[error("{0}")]
    Forbidden(String),

    // Loan/member/guarantor missing or cross-tenant
    #[error("{0}")]
    NotFound(String),

    // Operation attempted from the wrong status
    #[error("{message}")]
    StateConflict { current: String, message: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ServiceError {
    pub fn validation(message: impl Into<String>) -> Self {
        ServiceError::Validation(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        ServiceError::Forbidden(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        ServiceError::NotFound(message.into())
    }

    pub fn state_conflict(current: impl Into<String>, message: impl Into<String>) -> Self {
        ServiceError::StateConflict {
            current: current.into(),
            message: message.into(),
        }
    }

    /// Stable error code for client handling
    pub fn code(&self) -> &'static str {
        match self {
            ServiceError::Validation(_) => "VALIDATION_ERROR",
            ServiceError::Forbidden(_) => "FORBIDDEN",
            ServiceError::NotFound(_) => "NOT_FOUND",
            ServiceError::StateConflict { .. } => "STATE_CONFLICT",
            ServiceError::Store(_) => "STORE_ERROR",
        }
    }

    /// Business-rule violations are recoverable by the caller; persistence
    /// failures are fatal to the request.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, ServiceError::Store(_))
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_conflict_keeps_current_status() {
        let err =
            ServiceError::state_conflict("pending", "Cannot disburse loan with status: pending");
        match &err {
            ServiceError::StateConflict { current, .. } => assert_eq!(current, "pending"),
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(err.code(), "STATE_CONFLICT");
        assert!(err.is_recoverable());
    }
}
