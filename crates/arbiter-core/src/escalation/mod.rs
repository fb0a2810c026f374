//! Human-in-the-loop routing.
//!
//! - `router`: auto vs. escalate, and escalation construction
//! - `record`: [`Escalation`] records, payloads and responses
//! - `book`: the registry of open and closed escalations
//! - `state`: the per-proposal lifecycle state machine
//! - `error`: [`EscalationError`]

pub mod book;
pub mod error;
pub mod record;
pub mod router;
pub mod state;

pub use book::EscalationBook;
pub use error::{EscalationError, EscalationResult};
pub use record::{
    Audience, Escalation, EscalationClosure, EscalationDecision, EscalationId, EscalationPayload,
    EscalationReason, EscalationResponse, EscalationStatus, RiskIndicators,
};
pub use router::{EscalationPolicy, EscalationRouter, Routing};
pub use state::ProposalState;
