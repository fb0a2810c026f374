//! Reservations and reserve outcomes.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{ProposalId, ReservationTag, ResourceId, TimeWindow};

use super::lock::LockId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ReservationId(pub Uuid);

impl ReservationId {
    pub fn new() -> Self {
        ReservationId(Uuid::new_v4())
    }
}

impl Default for ReservationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ReservationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The occupancy claim itself: who, when, how much, what kind.
///
/// Used both for committed reservations and for tentative placements
/// while arbitration explores candidates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub proposal_id: ProposalId,
    pub window: TimeWindow,
    pub quantity: u32,
    pub tag: ReservationTag,
}

/// A committed booking on one resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: ReservationId,
    pub resource_id: ResourceId,
    #[serde(flatten)]
    pub booking: Booking,
}

/// Input to [`ResourceModel::reserve`](super::ResourceModel::reserve).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationRequest {
    pub resource_id: ResourceId,
    pub booking: Booking,
}

impl ReservationRequest {
    pub fn new(
        resource_id: ResourceId,
        proposal_id: ProposalId,
        window: TimeWindow,
        quantity: u32,
        tag: ReservationTag,
    ) -> Self {
        Self {
            resource_id,
            booking: Booking {
                proposal_id,
                window,
                quantity,
                tag,
            },
        }
    }
}

/// Result of an atomic reserve attempt on one resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ReserveOutcome {
    Reserved { reservation_id: ReservationId },
    CapacityExceeded { requested: u32, available: u32 },
    ExclusivityViolation { conflicting_proposal: ProposalId },
    LockConflict { lock_id: LockId },
}

impl ReserveOutcome {
    pub fn is_reserved(&self) -> bool {
        matches!(self, ReserveOutcome::Reserved { .. })
    }
}

impl fmt::Display for ReserveOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReserveOutcome::Reserved { reservation_id } => write!(f, "reserved {reservation_id}"),
            ReserveOutcome::CapacityExceeded {
                requested,
                available,
            } => write!(f, "capacity exceeded: requested {requested}, available {available}"),
            ReserveOutcome::ExclusivityViolation {
                conflicting_proposal,
            } => write!(f, "exclusivity violation with {conflicting_proposal}"),
            ReserveOutcome::LockConflict { lock_id } => write!(f, "lock conflict with {lock_id}"),
        }
    }
}

/// Result of an all-or-nothing multi-resource commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    /// Every request committed; versions are the post-commit resource versions.
    Committed {
        reservations: Vec<Reservation>,
        versions: Vec<(ResourceId, u64)>,
    },
    /// Nothing committed; `index` names the first refused request.
    Refused {
        index: usize,
        resource_id: ResourceId,
        outcome: ReserveOutcome,
    },
}
