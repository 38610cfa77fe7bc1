use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum VoteChoice {
    Approve,
    Reject,
}

/// One committee member's ballot on one loan. Unique per (loan, voter);
/// a repeated submission overwrites the earlier ballot rather than
/// double-counting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoanVote {
    pub id: Uuid,
    pub loan_id: Uuid,
    pub voter_id: Uuid,
    pub vote: VoteChoice,
    pub notes: Option<String>,
    pub cast_at: DateTime<Utc>,
}

/// Aggregate over a loan's ballots, computed on read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteTally {
    pub total_votes: usize,
    pub approve_votes: usize,
    pub reject_votes: usize,
    pub quorum_met: bool,
    pub required_quorum: usize,
}

impl VoteTally {
    pub fn count(votes: &[LoanVote], required_quorum: usize) -> Self {
        let approve_votes = votes.iter().filter(|v| v.vote == VoteChoice::Approve).count();
        let reject_votes = votes.iter().filter(|v| v.vote == VoteChoice::Reject).count();
        Self {
            total_votes: votes.len(),
            approve_votes,
            reject_votes,
            quorum_met: votes.len() >= required_quorum,
            required_quorum,
        }
    }

    /// Majority approval; a tie is a rejection.
    pub fn approved(&self) -> bool {
        self.quorum_met && self.approve_votes > self.reject_votes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vote(choice: VoteChoice) -> LoanVote {
        LoanVote {
            id: Uuid::new_v4(),
            loan_id: Uuid::new_v4(),
            voter_id: Uuid::new_v4(),
            vote: choice,
            notes: None,
            cast_at: Utc::now(),
        }
    }

    #[test]
    fn quorum_counts_all_ballots() {
        let votes = vec![vote(VoteChoice::Approve), vote(VoteChoice::Reject)];
        let tally = VoteTally::count(&votes, 3);
        assert!(!tally.quorum_met);
        assert!(!tally.approved());
    }

    #[test]
    fn tie_is_rejection() {
        let votes = vec![
            vote(VoteChoice::Approve),
            vote(VoteChoice::Approve),
            vote(VoteChoice::Reject),
            vote(VoteChoice::Reject),
        ];
        let tally = VoteTally::count(&votes, 4);
        assert!(tally.quorum_met);
        assert!(!tally.approved());
    }

    #[test]
    fn majority_approves() {
        let votes = vec![
            vote(VoteChoice::Approve),
            vote(VoteChoice::Approve),
            vote(VoteChoice::Reject),
        ];
        let tally = VoteTally::count(&votes, 3);
        assert!(tally.approved());
    }
}
