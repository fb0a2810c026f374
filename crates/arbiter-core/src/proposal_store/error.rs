//! Schema errors: a malformed proposal is refused synchronously, never queued.

use chrono::{DateTime, Utc};

use crate::domain::{ProposalId, ResourceId, TimeWindow};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SchemaError {
    #[error("missing required field: {field}")]
    MissingField { field: &'static str },

    #[error("target resource does not exist: {resource_id}")]
    UnknownResource { resource_id: ResourceId },

    #[error("target resource listed twice: {resource_id}")]
    DuplicateTarget { resource_id: ResourceId },

    #[error("time window {window} is empty or inverted")]
    EmptyWindow { window: TimeWindow },

    #[error("time window {window} ended before submission at {now}")]
    StaleWindow {
        window: TimeWindow,
        now: DateTime<Utc>,
    },

    #[error("time window {window} ends after the planning limit {limit}")]
    BeyondHorizon {
        window: TimeWindow,
        limit: DateTime<Utc>,
    },

    #[error("{resource_id} holds {capacity} units; {needed} can never be granted")]
    ExceedsCapacity {
        resource_id: ResourceId,
        needed: u32,
        capacity: u32,
    },

    #[error("quantity must be at least 1")]
    ZeroQuantity,

    #[error("min_quantity {min} must be between 1 and quantity {quantity}")]
    InvalidMinQuantity { min: u32, quantity: u32 },

    #[error("priority {priority} outside 1..=10")]
    PriorityOutOfRange { priority: u8 },

    #[error("confidence {value} outside [0, 1]")]
    ConfidenceOutOfRange { value: f64 },

    #[error("duplicate proposal id: {proposal_id}")]
    DuplicateProposal { proposal_id: ProposalId },
}

impl SchemaError {
    /// Human-readable reason returned to the submitting agent.
    pub fn reason(&self) -> String {
        self.to_string()
    }
}
