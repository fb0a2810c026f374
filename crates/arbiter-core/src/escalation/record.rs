//! Escalation records handed to humans.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use arbiter_ledger::TraceId;

use crate::arbitration::{AlternativeSummary, Placement, Resolution};
use crate::conflict::ConflictKind;
use crate::domain::{AgentId, ProposalId, ResourceId, TimeWindow};
use crate::resource_model::LockId;
use crate::risk::{ImpactBand, RiskBand, RiskScore};

use super::state::ProposalState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EscalationId(pub Uuid);

impl EscalationId {
    pub fn new() -> Self {
        EscalationId(Uuid::new_v4())
    }
}

impl Default for EscalationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EscalationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Who has to answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Audience {
    OrchestratorInternal,
    Planner,
    SafetyTeam,
}

impl fmt::Display for Audience {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Audience::OrchestratorInternal => "orchestrator_internal",
            Audience::Planner => "planner",
            Audience::SafetyTeam => "safety_team",
        };
        f.write_str(s)
    }
}

/// One condition that sent a component to a human.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "trigger", rename_all = "snake_case")]
pub enum EscalationReason {
    SafetyRisk { score: f64, band: RiskBand },
    SlaRisk { score: f64, band: RiskBand },
    HighImpact { minutes: f64 },
    TooManyProposals { count: usize, limit: usize },
    LockInvolved { lock_id: LockId },
    UnresolvableSafely,
    LowConfidence { proposal_id: ProposalId, confidence: f64 },
    CommitFailed { detail: String },
    /// The engine failed on this component; the rest of the cycle went on.
    DecisionFailed { detail: String },
    ExpiredUnanswered { previous: EscalationId },
}

impl fmt::Display for EscalationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EscalationReason::SafetyRisk { score, band } => {
                write!(f, "safety score {score:.2} ({band})")
            }
            EscalationReason::SlaRisk { score, band } => write!(f, "sla score {score:.2} ({band})"),
            EscalationReason::HighImpact { minutes } => {
                write!(f, "operational impact {minutes:.0} minutes (high)")
            }
            EscalationReason::TooManyProposals { count, limit } => {
                write!(f, "{count} proposals in conflict (limit {limit})")
            }
            EscalationReason::LockInvolved { lock_id } => write!(f, "lock {lock_id} involved"),
            EscalationReason::UnresolvableSafely => f.write_str("cannot resolve safely"),
            EscalationReason::LowConfidence {
                proposal_id,
                confidence,
            } => write!(f, "{proposal_id} confidence {confidence:.2} below threshold"),
            EscalationReason::CommitFailed { detail } => write!(f, "commit failed: {detail}"),
            EscalationReason::DecisionFailed { detail } => {
                write!(f, "decision failed: {detail}")
            }
            EscalationReason::ExpiredUnanswered { previous } => {
                write!(f, "escalation {previous} expired unanswered")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskIndicators {
    pub safety: f64,
    pub safety_band: RiskBand,
    pub sla: f64,
    pub sla_band: RiskBand,
    pub impact_minutes: f64,
    pub impact_band: ImpactBand,
}

impl From<&RiskScore> for RiskIndicators {
    fn from(s: &RiskScore) -> Self {
        Self {
            safety: s.safety,
            safety_band: s.safety_band(),
            sla: s.sla,
            sla_band: s.sla_band(),
            impact_minutes: s.impact_minutes,
            impact_band: s.impact_band(),
        }
    }
}

/// What the human sees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EscalationPayload {
    pub conflict_summary: Vec<String>,
    pub agents: Vec<AgentId>,
    pub resources: Vec<ResourceId>,
    pub window: TimeWindow,
    pub risk: RiskIndicators,
    pub current_state: BTreeMap<ProposalId, ProposalState>,
    #[serde(default)]
    pub proposed_resolution: Vec<Resolution>,
    pub alternatives: Vec<AlternativeSummary>,
    pub tradeoffs: String,
    /// Lowest agent confidence in the component.
    pub confidence: f64,
    pub requested_decision: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationStatus {
    Open,
    Resolved,
    Expired,
    Cancelled,
    /// Closed because the lock it depended on was revoked.
    Superseded,
}

impl fmt::Display for EscalationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EscalationStatus::Open => "open",
            EscalationStatus::Resolved => "resolved",
            EscalationStatus::Expired => "expired",
            EscalationStatus::Cancelled => "cancelled",
            EscalationStatus::Superseded => "superseded",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationDecision {
    Approve,
    Reject,
    Modify,
}

/// A human's answer to an escalation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EscalationResponse {
    pub decision: EscalationDecision,
    /// New windows for `Modify`; unlisted proposals keep the proposed placement.
    #[serde(default)]
    pub modified_windows: BTreeMap<ProposalId, TimeWindow>,
    pub responder: String,
    #[serde(default)]
    pub comment: Option<String>,
}

impl EscalationResponse {
    pub fn approve(responder: impl Into<String>) -> Self {
        Self {
            decision: EscalationDecision::Approve,
            modified_windows: BTreeMap::new(),
            responder: responder.into(),
            comment: None,
        }
    }

    pub fn reject(responder: impl Into<String>) -> Self {
        Self {
            decision: EscalationDecision::Reject,
            ..Self::approve(responder)
        }
    }

    pub fn modify(
        responder: impl Into<String>,
        windows: impl IntoIterator<Item = (ProposalId, TimeWindow)>,
    ) -> Self {
        Self {
            decision: EscalationDecision::Modify,
            modified_windows: windows.into_iter().collect(),
            ..Self::approve(responder)
        }
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }
}

/// How and by whom an escalation was closed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EscalationClosure {
    pub status: EscalationStatus,
    #[serde(default)]
    pub decision: Option<EscalationDecision>,
    pub by: String,
    #[serde(default)]
    pub comment: Option<String>,
    pub closed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Escalation {
    pub id: EscalationId,
    pub trace_id: TraceId,
    pub proposal_ids: Vec<ProposalId>,
    pub conflict_kinds: BTreeSet<ConflictKind>,
    pub lock_ids: BTreeSet<LockId>,
    pub audience: Audience,
    pub reasons: Vec<EscalationReason>,
    pub payload: EscalationPayload,
    /// Placements a plain approval would commit.
    #[serde(default)]
    pub proposed: Option<Vec<Placement>>,
    pub status: EscalationStatus,
    pub opened_at: DateTime<Utc>,
    pub deadline: DateTime<Utc>,
    /// Set on an upward escalation opened when this one's parent expired.
    #[serde(default)]
    pub parent: Option<EscalationId>,
    #[serde(default)]
    pub closure: Option<EscalationClosure>,
}

impl Escalation {
    pub fn is_open(&self) -> bool {
        self.status == EscalationStatus::Open
    }

    /// Forklift / foot-traffic conflicts are safety conflicts.
    pub fn is_safety_related(&self) -> bool {
        self.audience == Audience::SafetyTeam
            || self.conflict_kinds.contains(&ConflictKind::Exclusivity)
    }

    pub fn references_lock(&self, lock_id: &LockId) -> bool {
        self.lock_ids.contains(lock_id)
            || self.reasons.iter().any(
                |r| matches!(r, EscalationReason::LockInvolved { lock_id: l } if l == lock_id),
            )
    }

    pub fn includes(&self, proposal_id: &ProposalId) -> bool {
        self.proposal_ids.contains(proposal_id)
    }

    pub fn close(
        &mut self,
        status: EscalationStatus,
        decision: Option<EscalationDecision>,
        by: impl Into<String>,
        comment: Option<String>,
        at: DateTime<Utc>,
    ) {
        self.status = status;
        self.closure = Some(EscalationClosure {
            status,
            decision,
            by: by.into(),
            comment,
            closed_at: at,
        });
    }
}
