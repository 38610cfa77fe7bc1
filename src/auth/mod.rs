use uuid::Uuid;

use crate::error::{ServiceError, ServiceResult};

/// Authenticated actor context, resolved by the surrounding HTTP layer and
/// handed to the core as-is.
#[derive(Clone, Debug)]
pub struct Actor {
    pub user_id: Uuid,
    pub tenant_id: Uuid,
    pub role: Role,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    Admin,
    LoanOfficer,
    CommitteeMember,
    Member,
}

/// Operations the core gates on. One capability check per operation,
/// evaluated before any business logic runs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Action {
    SubmitApplication,
    RunEligibilityCheck,
    RequestGuarantors,
    RespondToPledge,
    AssignOfficer,
    SubmitRecommendation,
    CastCommitteeVote,
    FinalizeCommitteeDecision,
    QueryLoan,
    RejectLoan,
    DisburseLoan,
    RecordRepayment,
    ViewPortfolio,
    GenerateDeductions,
    SubmitDeductions,
    Reconcile,
}

impl Actor {
    pub fn new(user_id: Uuid, tenant_id: Uuid, role: Role) -> Self {
        Self {
            user_id,
            tenant_id,
            role,
        }
    }

    pub fn can_perform(&self, action: Action) -> bool {
        use Action::*;
        match self.role {
            Role::Admin => !matches!(action, RespondToPledge | CastCommitteeVote),
            Role::LoanOfficer => matches!(
                action,
                RunEligibilityCheck
                    | RequestGuarantors
                    | SubmitRecommendation
                    | QueryLoan
                    | RejectLoan
                    | ViewPortfolio
            ),
            Role::CommitteeMember => matches!(action, CastCommitteeVote | ViewPortfolio),
            Role::Member => matches!(action, SubmitApplication | RespondToPledge),
        }
    }

    /// Guard invoked at the top of every core operation. Tenant mismatch is
    /// checked first so cross-tenant probes never reach role reporting.
    pub fn authorize(&self, action: Action, tenant_id: Uuid) -> ServiceResult<()> {
        if self.tenant_id != tenant_id {
            return Err(ServiceError::not_found("Resource not found"));
        }
        if !self.can_perform(action) {
            return Err(ServiceError::forbidden(format!(
                "Role {:?} may not perform {:?}",
                self.role, action
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_cannot_vote_or_pledge() {
        let actor = Actor::new(Uuid::new_v4(), Uuid::new_v4(), Role::Admin);
        assert!(!actor.can_perform(Action::CastCommitteeVote));
        assert!(!actor.can_perform(Action::RespondToPledge));
        assert!(actor.can_perform(Action::DisburseLoan));
    }

    #[test]
    fn cross_tenant_access_reads_as_not_found() {
        let actor = Actor::new(Uuid::new_v4(), Uuid::new_v4(), Role::Admin);
        let err = actor
            .authorize(Action::DisburseLoan, Uuid::new_v4())
            .unwrap_err();
        assert_eq!(err.code(), "NOT_FOUND");
    }

    #[test]
    fn member_can_apply_and_respond() {
        let tenant = Uuid::new_v4();
        let actor = Actor::new(Uuid::new_v4(), tenant, Role::Member);
        assert!(actor.authorize(Action::SubmitApplication, tenant).is_ok());
        assert!(actor.authorize(Action::RespondToPledge, tenant).is_ok());
        let err = actor.authorize(Action::DisburseLoan, tenant).unwrap_err();
        assert_eq!(err.code(), "FORBIDDEN");
    }
}
