//! Domain models for the arbitration core.
//!
//! Canonical definitions for the core entities:
//! - `TimeWindow`: half-open interval on the shared clock
//! - `Resource`: aisle segments, equipment, dock doors and workers
//! - `Proposal`: an agent's request for resources, and its stored form

pub mod error;
pub mod proposal;
pub mod resource;
pub mod window;

pub use error::{ArbiterError, Result};
pub use proposal::{
    AgentId, AgentKind, PriorityHint, Proposal, ProposalId, RankKey, StoredProposal,
    PRIORITY_RANGE,
};
pub use resource::{Capacity, ReservationTag, Resource, ResourceId, ResourceKind};
pub use window::TimeWindow;
