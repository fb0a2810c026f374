//! Arbiter Core Library
//!
//! Arbitration for competing warehouse agent proposals: conflict detection
//! over a versioned resource model, risk scoring, deterministic resolution,
//! and escalation to planners or the safety team when automation should not
//! decide alone.

pub mod arbitration;
pub mod config;
pub mod conflict;
pub mod domain;
pub mod escalation;
pub mod events;
pub mod metrics;
pub mod obs;
pub mod orchestrator;
pub mod proposal_store;
pub mod resource_model;
pub mod risk;
pub mod telemetry;

pub use domain::{
    AgentId, AgentKind, ArbiterError, Capacity, PriorityHint, Proposal, ProposalId,
    ReservationTag, Resource, ResourceId, ResourceKind, Result, StoredProposal, TimeWindow,
};

pub use resource_model::{
    Booking, CommitOutcome, DrainReport, Lock, LockId, LockOutcome, LockRequest, LockScope,
    Reservation, ReservationId, ReservationRequest, ReserveOutcome, ResourceError,
    ResourceModel, ResourceSnapshot,
};

pub use proposal_store::{ProposalStore, SchemaError};

pub use conflict::{build_components, Conflict, ConflictComponent, ConflictDetector, ConflictKind};

pub use risk::{
    CandidateRisk, ImpactBand, ProposalRisk, RiskBand, RiskEvaluator, RiskPolicy, RiskScore,
};

pub use arbitration::{
    ArbitrationEngine, ArbitrationError, Candidate, Decision, Outcome, Placement,
    PlacementPolicy, Rationale, Resolution, Verdict,
};

pub use escalation::{
    Audience, Escalation, EscalationDecision, EscalationError, EscalationId, EscalationPolicy,
    EscalationReason, EscalationResponse, EscalationRouter, EscalationStatus, ProposalState,
    Routing,
};

pub use config::{ArbiterConfig, ConfigError};
pub use events::{ArbiterEvent, EventBus};
pub use orchestrator::{CycleReport, ExpiryReport, LockRevocation, Orchestrator};

pub use arbiter_ledger::fakes::MemoryAuditLedger;
pub use arbiter_ledger::{AuditLedger, EntryKind, LedgerEntry, TraceId};

pub use metrics::METRICS;
pub use telemetry::{init_tracing, TracingOptions};

/// Arbiter version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
