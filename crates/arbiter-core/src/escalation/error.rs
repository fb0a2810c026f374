//! Error types for escalation handling.

use crate::domain::ProposalId;
use crate::escalation::record::EscalationId;
use crate::escalation::state::ProposalState;

#[derive(Debug, thiserror::Error)]
pub enum EscalationError {
    #[error("escalation not found: {id}")]
    NotFound { id: EscalationId },

    #[error("escalation {id} is not open (status: {status})")]
    NotOpen { id: EscalationId, status: String },

    #[error("escalation {id} has no proposed resolution to approve")]
    NoProposedResolution { id: EscalationId },

    #[error("proposal {proposal_id} is not part of escalation {id}")]
    ForeignProposal {
        id: EscalationId,
        proposal_id: ProposalId,
    },

    #[error("modify decision on escalation {id} carries no modified windows")]
    EmptyModification { id: EscalationId },

    #[error("resource model refused the human decision on {id}: {reason}")]
    CommitRefused { id: EscalationId, reason: String },

    #[error("proposal {proposal_id}: illegal transition {from} -> {to}")]
    InvalidTransition {
        proposal_id: ProposalId,
        from: ProposalState,
        to: ProposalState,
    },

    #[error("unknown proposal: {proposal_id}")]
    UnknownProposal { proposal_id: ProposalId },
}

pub type EscalationResult<T> = std::result::Result<T, EscalationError>;
