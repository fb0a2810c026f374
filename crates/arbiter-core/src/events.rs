//! Outbound events for agents, planners and dashboards.
//!
//! Backed by a `tokio::sync::broadcast` channel: slow subscribers lag and
//! lose the oldest events rather than blocking arbitration.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

use arbiter_ledger::TraceId;

use crate::arbitration::Resolution;
use crate::escalation::{Escalation, EscalationId, EscalationStatus, ProposalState};
use crate::resource_model::{Lock, LockId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ArbiterEvent {
    /// A proposal reached a decision that reserves (or refuses) resources.
    Resolution {
        trace_id: TraceId,
        resolution: Resolution,
        state: ProposalState,
        at: DateTime<Utc>,
    },
    Escalation {
        escalation: Box<Escalation>,
    },
    EscalationClosed {
        escalation_id: EscalationId,
        status: EscalationStatus,
        at: DateTime<Utc>,
    },
    LockChanged {
        lock_id: LockId,
        #[serde(default)]
        lock: Option<Lock>,
        active: bool,
        at: DateTime<Utc>,
    },
}

impl ArbiterEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            ArbiterEvent::Resolution { .. } => "resolution",
            ArbiterEvent::Escalation { .. } => "escalation",
            ArbiterEvent::EscalationClosed { .. } => "escalation_closed",
            ArbiterEvent::LockChanged { .. } => "lock_changed",
        }
    }
}

#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<ArbiterEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn publish(&self, event: ArbiterEvent) {
        let kind = event.kind();
        let receivers = self.sender.send(event).unwrap_or(0);
        if receivers == 0 {
            debug!(kind, "no subscribers for event");
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ArbiterEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}
