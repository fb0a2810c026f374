//! Authoritative view of warehouse resources, their time-windowed
//! occupancy, capacity and manual locks.
//!
//! - `model`: the shared [`ResourceModel`] with per-resource serialization
//! - `admission`: the lock / exclusivity / capacity rule
//! - `reservation`: bookings, reservations and reserve outcomes
//! - `lock`: planner locks and their scopes
//! - `snapshot`: version-stamped read-only copies
//! - `error`: error types

pub mod admission;
pub mod error;
pub mod lock;
pub mod model;
pub mod reservation;
pub mod snapshot;

pub use admission::{admit, covering_lock, peak_load, Admission};
pub use error::{ResourceError, ResourceResult};
pub use lock::{Lock, LockId, LockRequest, LockScope};
pub use model::{DrainReport, LockOutcome, ResourceModel};
pub use reservation::{
    Booking, CommitOutcome, Reservation, ReservationId, ReservationRequest, ReserveOutcome,
};
pub use snapshot::{ResourceCatalog, ResourceSnapshot, ResourceView};
