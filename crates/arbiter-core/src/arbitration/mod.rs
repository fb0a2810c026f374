//! Deterministic arbitration of conflict components.
//!
//! - `candidate`: candidate generation and greedy placement
//! - `engine`: the [`ArbitrationEngine`] and its [`Decision`]
//! - `resolution`: per-proposal [`Resolution`] and rationale types
//! - `error`: [`ArbitrationError`]

pub mod candidate;
pub mod engine;
pub mod error;
pub mod resolution;

pub use candidate::{generate_candidates, Candidate, Outcome, Placement, PlacementPolicy};
pub use engine::{ArbitrationEngine, Decision, EvaluatedCandidate, Verdict};
pub use error::{ArbitrationError, ArbitrationResult};
pub use resolution::{AlternativeSummary, DiscardReason, Disposition, Rationale, Resolution};
