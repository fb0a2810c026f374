//! Agent proposals.
//!
//! Every agent kind produces the same [`Proposal`] shape. Arbitration never
//! looks at [`AgentKind`]; it only reads the declared priority hint.

use std::cmp::Reverse;
use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use arbiter_ledger::TraceId;

use super::resource::{ReservationTag, ResourceId};
use super::window::TimeWindow;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProposalId(pub String);

impl ProposalId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProposalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ProposalId {
    fn from(s: &str) -> Self {
        ProposalId(s.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AgentId(pub String);

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The family of micro-agent that submitted a proposal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AgentKind {
    Slotting,
    Replenishment,
    Picking,
    DockYard,
    Labor,
    InventoryAccuracy,
    #[default]
    Other,
}

/// Lowest and highest accepted priority.
pub const PRIORITY_RANGE: std::ops::RangeInclusive<u8> = 1..=10;

/// Urgency declared by the submitting agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriorityHint {
    /// 1 (deferrable) to 10 (critical).
    pub priority: u8,
    /// Latest acceptable completion time, if the work has an SLA.
    #[serde(default)]
    pub sla_deadline: Option<DateTime<Utc>>,
}

impl Default for PriorityHint {
    fn default() -> Self {
        Self {
            priority: 5,
            sla_deadline: None,
        }
    }
}

/// An agent's requested action against one or more resources.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Proposal {
    pub id: ProposalId,
    pub agent_id: AgentId,
    #[serde(default)]
    pub agent_kind: AgentKind,
    /// Free-form verb, e.g. `replenish`, `reslot`, `pick_wave`.
    #[serde(default)]
    pub action: String,
    pub target_resources: Vec<ResourceId>,
    pub window: TimeWindow,
    /// Later windows the agent would also accept, in order of preference.
    #[serde(default)]
    pub alternative_windows: Vec<TimeWindow>,
    /// Units requested on each target resource.
    pub quantity: u32,
    /// Smallest partial grant the agent can work with.
    #[serde(default)]
    pub min_quantity: Option<u32>,
    #[serde(default)]
    pub tag: ReservationTag,
    #[serde(default)]
    pub priority: PriorityHint,
    pub confidence: f64,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl Proposal {
    pub fn new(
        id: impl Into<String>,
        agent_id: impl Into<String>,
        targets: impl IntoIterator<Item = ResourceId>,
        window: TimeWindow,
        quantity: u32,
    ) -> Self {
        Self {
            id: ProposalId(id.into()),
            agent_id: AgentId(agent_id.into()),
            agent_kind: AgentKind::default(),
            action: String::new(),
            target_resources: targets.into_iter().collect(),
            window,
            alternative_windows: Vec::new(),
            quantity,
            min_quantity: None,
            tag: ReservationTag::default(),
            priority: PriorityHint::default(),
            confidence: 1.0,
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_agent_kind(mut self, kind: AgentKind) -> Self {
        self.agent_kind = kind;
        self
    }

    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.action = action.into();
        self
    }

    pub fn with_tag(mut self, tag: ReservationTag) -> Self {
        self.tag = tag;
        self
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority.priority = priority;
        self
    }

    pub fn with_sla_deadline(mut self, deadline: DateTime<Utc>) -> Self {
        self.priority.sla_deadline = Some(deadline);
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn with_min_quantity(mut self, min: u32) -> Self {
        self.min_quantity = Some(min);
        self
    }

    pub fn with_alternative(mut self, window: TimeWindow) -> Self {
        self.alternative_windows.push(window);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Sort key produced by [`StoredProposal::rank_key`]; smaller ranks first.
pub type RankKey = (Reverse<u8>, bool, Option<DateTime<Utc>>, u64);

/// A proposal as accepted by the [`ProposalStore`](crate::proposal_store::ProposalStore).
///
/// Immutable after acceptance; lifecycle state is tracked beside it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredProposal {
    pub proposal: Proposal,
    /// Store-wide submission order; the final tie-breaker.
    pub seq: u64,
    pub submitted_at: DateTime<Utc>,
    pub trace_id: TraceId,
}

impl StoredProposal {
    pub fn id(&self) -> &ProposalId {
        &self.proposal.id
    }

    /// Deterministic rank: priority desc, SLA deadline asc (none last), seq asc.
    pub fn rank_key(&self) -> RankKey {
        let deadline = self.proposal.priority.sla_deadline;
        (
            Reverse(self.proposal.priority.priority),
            deadline.is_none(),
            deadline,
            self.seq,
        )
    }
}
