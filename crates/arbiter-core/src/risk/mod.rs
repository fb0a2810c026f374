//! Risk scoring.
//!
//! - `bands`: ordered-boundary band tables
//! - `score`: [`RiskScore`] and per-candidate evaluations
//! - `evaluator`: the [`RiskEvaluator`]

pub mod bands;
pub mod evaluator;
pub mod score;

pub use bands::{impact_band, safety_band, sla_band, ImpactBand, RiskBand};
pub use evaluator::{RiskEvaluator, RiskPolicy};
pub use score::{CandidateRisk, ProposalRisk, RiskScore};
