//! Per-proposal lifecycle.
//!
//! ```text
//! Submitted -> UnderEvaluation -> { AutoApproved, Escalated, Rejected }
//! Escalated -> { PlannerApproved, PlannerRejected, PlannerModified, Expired }
//! Escalated -> UnderEvaluation   (only when a lock it depended on is revoked)
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalState {
    Submitted,
    UnderEvaluation,
    AutoApproved,
    Escalated,
    Rejected,
    PlannerApproved,
    PlannerRejected,
    PlannerModified,
    Expired,
}

impl ProposalState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ProposalState::AutoApproved
                | ProposalState::Rejected
                | ProposalState::PlannerApproved
                | ProposalState::PlannerRejected
                | ProposalState::PlannerModified
                | ProposalState::Expired
        )
    }

    /// Whether arbitration still has to look at this proposal.
    pub fn awaits_arbitration(&self) -> bool {
        matches!(
            self,
            ProposalState::Submitted | ProposalState::UnderEvaluation
        )
    }

    pub fn can_transition_to(&self, next: ProposalState) -> bool {
        use ProposalState::*;
        matches!(
            (self, next),
            (Submitted, UnderEvaluation)
                | (UnderEvaluation, AutoApproved)
                | (UnderEvaluation, Escalated)
                | (UnderEvaluation, Rejected)
                | (Escalated, PlannerApproved)
                | (Escalated, PlannerRejected)
                | (Escalated, PlannerModified)
                | (Escalated, Expired)
                | (Escalated, UnderEvaluation)
        )
    }
}

impl fmt::Display for ProposalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProposalState::Submitted => "submitted",
            ProposalState::UnderEvaluation => "under_evaluation",
            ProposalState::AutoApproved => "auto_approved",
            ProposalState::Escalated => "escalated",
            ProposalState::Rejected => "rejected",
            ProposalState::PlannerApproved => "planner_approved",
            ProposalState::PlannerRejected => "planner_rejected",
            ProposalState::PlannerModified => "planner_modified",
            ProposalState::Expired => "expired",
        };
        f.write_str(s)
    }
}
