//! Per-proposal resolutions and the rationale that travels with them.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::{ProposalId, TimeWindow};
use crate::resource_model::LockId;
use crate::risk::RiskBand;

use super::candidate::Outcome;

/// Why a candidate was thrown out before comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum DiscardReason {
    LockViolation { lock_id: LockId },
    SafetyViolation { score: f64 },
    CapacityInfeasible,
    AllRejected,
}

impl fmt::Display for DiscardReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiscardReason::LockViolation { lock_id } => write!(f, "overlaps lock {lock_id}"),
            DiscardReason::SafetyViolation { score } => {
                write!(f, "safety violation (score {score:.2})")
            }
            DiscardReason::CapacityInfeasible => f.write_str("exceeds resource capacity"),
            DiscardReason::AllRejected => f.write_str("rejects every proposal"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "disposition", rename_all = "snake_case")]
pub enum Disposition {
    Chosen,
    Discarded { discard: DiscardReason },
    Outscored,
}

/// One considered candidate, as shown to humans and recorded in the ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlternativeSummary {
    pub label: String,
    pub disposition: Disposition,
    pub safety: f64,
    pub sla_band: RiskBand,
    pub impact_minutes: f64,
    pub displaced: usize,
}

impl AlternativeSummary {
    pub fn describe(&self) -> String {
        let verdict = match &self.disposition {
            Disposition::Chosen => "chosen".to_string(),
            Disposition::Discarded { discard } => format!("discarded: {discard}"),
            Disposition::Outscored => "outscored".to_string(),
        };
        format!(
            "{} ({verdict}; sla {}, {:.0} delay-minutes, {} displaced)",
            self.label, self.sla_band, self.impact_minutes, self.displaced
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rationale {
    pub conflicting_proposals: Vec<ProposalId>,
    /// Summaries of the constraints that were violated as requested.
    pub constraints: Vec<String>,
    pub chosen: String,
    pub alternatives: Vec<AlternativeSummary>,
    pub tradeoffs: String,
}

/// Arbitration outcome for one proposal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resolution {
    pub proposal_id: ProposalId,
    pub outcome: Outcome,
    /// Window the reservation covers; the requested window when rejected.
    pub window: TimeWindow,
    pub quantity: u32,
    #[serde(default)]
    pub reason: Option<String>,
    /// Composite ranking score; absent for human-made resolutions.
    #[serde(default)]
    pub display_score: Option<f64>,
    pub rationale: Rationale,
}

impl Resolution {
    pub fn is_rejected(&self) -> bool {
        self.outcome == Outcome::Rejected
    }
}
