//! Error types for the resource model.
//!
//! Capacity, exclusivity and lock refusals are not errors; they are
//! [`ReserveOutcome`](super::ReserveOutcome) values routed to arbitration.

use crate::domain::{ResourceId, TimeWindow};

use super::lock::LockId;
use super::reservation::ReservationId;

#[derive(Debug, thiserror::Error)]
pub enum ResourceError {
    #[error("unknown resource: {resource_id}")]
    UnknownResource { resource_id: ResourceId },

    #[error("resource already registered: {resource_id}")]
    DuplicateResource { resource_id: ResourceId },

    #[error("reservation not found: {reservation_id}")]
    ReservationNotFound { reservation_id: ReservationId },

    #[error("lock not found: {lock_id}")]
    LockNotFound { lock_id: LockId },

    #[error("empty time window {window} on {resource_id}")]
    EmptyWindow {
        resource_id: ResourceId,
        window: TimeWindow,
    },

    #[error("zero quantity requested on {resource_id}")]
    ZeroQuantity { resource_id: ResourceId },

    #[error("lock on {resource_id} needs a human-authored reason")]
    MissingLockReason { resource_id: ResourceId },

    /// The resource changed after the caller's snapshot; retry against fresh state.
    #[error("stale snapshot for {resource_id}: expected version {expected}, found {actual}")]
    StaleSnapshot {
        resource_id: ResourceId,
        expected: u64,
        actual: u64,
    },

    #[error("resource model is shutting down")]
    ShuttingDown,
}

pub type ResourceResult<T> = std::result::Result<T, ResourceError>;
