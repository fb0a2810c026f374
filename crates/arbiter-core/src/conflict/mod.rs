//! Finding proposals that cannot all be satisfied at once.
//!
//! - `detector`: per-resource sweep producing [`Conflict`] records
//! - `components`: grouping proposals into independently arbitrable components

pub mod components;
pub mod detector;

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::{ProposalId, ResourceId, TimeWindow};
use crate::resource_model::{LockId, ReservationId};

pub use components::{build_components, ConflictComponent};
pub use detector::ConflictDetector;

/// Which constraint a set of proposals violates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    Capacity,
    Exclusivity,
    Lock,
}

impl fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConflictKind::Capacity => "capacity",
            ConflictKind::Exclusivity => "exclusivity",
            ConflictKind::Lock => "lock",
        };
        f.write_str(s)
    }
}

/// A set of proposals that jointly violate one constraint on one resource.
///
/// Computed from a snapshot on demand; never stored as mutable state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conflict {
    pub kind: ConflictKind,
    pub resource_id: ResourceId,
    pub proposal_ids: BTreeSet<ProposalId>,
    /// Span of time over which the violation holds.
    pub window: TimeWindow,
    /// Committed reservations that take part in the violation.
    #[serde(default)]
    pub reservation_ids: Vec<ReservationId>,
    #[serde(default)]
    pub lock_id: Option<LockId>,
    /// Peak requested load for capacity conflicts.
    #[serde(default)]
    pub peak_load: Option<u32>,
    #[serde(default)]
    pub capacity: Option<u32>,
}

impl Conflict {
    pub fn involves(&self, id: &ProposalId) -> bool {
        self.proposal_ids.contains(id)
    }

    /// One-line description for logs and escalation payloads.
    pub fn summary(&self) -> String {
        let ids: Vec<&str> = self.proposal_ids.iter().map(|p| p.as_str()).collect();
        match self.kind {
            ConflictKind::Capacity => format!(
                "capacity on {} during {}: load {} > capacity {} ({})",
                self.resource_id,
                self.window,
                self.peak_load.unwrap_or_default(),
                self.capacity.unwrap_or_default(),
                ids.join(", ")
            ),
            ConflictKind::Exclusivity => format!(
                "forklift / foot-traffic exclusivity on {} during {} ({})",
                self.resource_id,
                self.window,
                ids.join(", ")
            ),
            ConflictKind::Lock => format!(
                "lock {} on {} during {} ({})",
                self.lock_id.map(|l| l.to_string()).unwrap_or_default(),
                self.resource_id,
                self.window,
                ids.join(", ")
            ),
        }
    }
}
