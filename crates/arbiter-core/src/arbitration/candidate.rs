//! Candidate resolutions for one conflict component.
//!
//! A candidate assigns every proposal in the component a [`Placement`].
//! Besides the as-requested and reject-all baselines, candidates are built
//! greedily: proposals are placed one at a time in a fixed order against
//! the snapshot plus everything placed so far, each taking the first option
//! that admits.

use std::collections::HashMap;
use std::fmt;

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::conflict::ConflictComponent;
use crate::domain::{Proposal, ProposalId, ResourceId, StoredProposal, TimeWindow};
use crate::resource_model::{admit, Admission, Booking, ResourceSnapshot};

pub const AS_REQUESTED: &str = "as-requested";
pub const REJECT_INSTEAD_OF_SHIFT: &str = "reject-instead-of-shift";
pub const REJECT_ALL: &str = "reject-all";

/// What happens to one proposal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// Original window and quantity.
    Approved,
    /// Original window, reduced quantity.
    ApprovedModified,
    /// Rescheduled window.
    Deferred,
    Rejected,
}

impl Outcome {
    /// Lower is more permissive.
    pub fn severity(&self) -> u8 {
        match self {
            Outcome::Approved => 0,
            Outcome::ApprovedModified => 1,
            Outcome::Deferred => 2,
            Outcome::Rejected => 3,
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Outcome::Approved => "approved",
            Outcome::ApprovedModified => "approved_modified",
            Outcome::Deferred => "deferred",
            Outcome::Rejected => "rejected",
        };
        f.write_str(s)
    }
}

/// One proposal's outcome inside a candidate.
///
/// For a rejected proposal `window` is the requested window and `quantity`
/// is zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Placement {
    pub proposal_id: ProposalId,
    pub outcome: Outcome,
    pub window: TimeWindow,
    pub quantity: u32,
    #[serde(default)]
    pub reason: Option<String>,
}

impl Placement {
    pub fn approved(p: &Proposal) -> Self {
        Self {
            proposal_id: p.id.clone(),
            outcome: Outcome::Approved,
            window: p.window,
            quantity: p.quantity,
            reason: None,
        }
    }

    pub fn rejected(p: &Proposal, reason: impl Into<String>) -> Self {
        Self {
            proposal_id: p.id.clone(),
            outcome: Outcome::Rejected,
            window: p.window,
            quantity: 0,
            reason: Some(reason.into()),
        }
    }

    pub fn is_placed(&self) -> bool {
        self.outcome != Outcome::Rejected
    }

    /// Bookings this placement would create, one per target resource.
    pub fn bookings(&self, p: &Proposal) -> Vec<(ResourceId, Booking)> {
        if !self.is_placed() {
            return Vec::new();
        }
        p.target_resources
            .iter()
            .map(|r| {
                (
                    r.clone(),
                    Booking {
                        proposal_id: p.id.clone(),
                        window: self.window,
                        quantity: self.quantity,
                        tag: p.tag,
                    },
                )
            })
            .collect()
    }
}

/// A full assignment of placements for one component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub label: String,
    /// In component member (submission) order.
    pub placements: Vec<Placement>,
}

impl Candidate {
    pub fn placement(&self, id: &ProposalId) -> Option<&Placement> {
        self.placements.iter().find(|p| &p.proposal_id == id)
    }

    pub fn all_rejected(&self) -> bool {
        self.placements.iter().all(|p| !p.is_placed())
    }

    /// Outcome severities listed in `rank_order`.
    pub fn severity_vector(&self, rank_order: &[ProposalId]) -> Vec<u8> {
        rank_order
            .iter()
            .map(|id| {
                self.placement(id)
                    .map_or(Outcome::Rejected.severity(), |p| p.outcome.severity())
            })
            .collect()
    }
}

/// How far and how finely the greedy search may move a proposal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlacementPolicy {
    pub step_minutes: i64,
    pub horizon_minutes: i64,
}

impl Default for PlacementPolicy {
    fn default() -> Self {
        Self {
            step_minutes: 5,
            horizon_minutes: 240,
        }
    }
}

/// Snapshot plus tentatively placed bookings.
struct Scratch<'s> {
    snapshot: &'s ResourceSnapshot,
    added: HashMap<ResourceId, Vec<Booking>>,
}

impl<'s> Scratch<'s> {
    fn new(snapshot: &'s ResourceSnapshot) -> Self {
        Self {
            snapshot,
            added: HashMap::new(),
        }
    }

    /// First refusal across the proposal's targets, or `Admit`.
    fn check(&self, p: &Proposal, window: TimeWindow, quantity: u32) -> Admission {
        let booking = Booking {
            proposal_id: p.id.clone(),
            window,
            quantity,
            tag: p.tag,
        };
        for r in &p.target_resources {
            let Some(view) = self.snapshot.get(r) else {
                return Admission::OverCapacity {
                    requested: quantity,
                    available: 0,
                };
            };
            let existing = view.bookings().chain(self.added.get(r).into_iter().flatten());
            let verdict = admit(&view.resource, existing, &view.locks, &booking);
            if !verdict.is_admit() {
                return verdict;
            }
        }
        Admission::Admit
    }

    /// Largest quantity the requested window still fits, when only capacity
    /// stands in the way.
    fn reducible_to(&self, p: &Proposal, window: TimeWindow) -> Option<u32> {
        let booking = Booking {
            proposal_id: p.id.clone(),
            window,
            quantity: p.quantity,
            tag: p.tag,
        };
        let mut fit = p.quantity;
        for r in &p.target_resources {
            let view = self.snapshot.get(r)?;
            let existing = view.bookings().chain(self.added.get(r).into_iter().flatten());
            match admit(&view.resource, existing, &view.locks, &booking) {
                Admission::Admit => {}
                Admission::OverCapacity { available, .. } => fit = fit.min(available),
                Admission::Locked { .. } | Admission::Exclusive { .. } => return None,
            }
        }
        Some(fit)
    }

    fn place(&mut self, p: &Proposal, placement: &Placement) {
        for (r, booking) in placement.bookings(p) {
            self.added.entry(r).or_default().push(booking);
        }
    }
}

fn describe(admission: &Admission) -> String {
    match admission {
        Admission::Admit => "admitted".to_string(),
        Admission::Locked { lock_id } => format!("requested window is covered by lock {lock_id}"),
        Admission::Exclusive {
            conflicting_proposal,
        } => format!("forklift / foot-traffic overlap with {conflicting_proposal}"),
        Admission::OverCapacity {
            requested,
            available,
        } => format!("insufficient capacity: requested {requested}, available {available}"),
    }
}

/// Place `p` against `scratch` using the first option that admits.
fn place_one(
    scratch: &Scratch<'_>,
    p: &Proposal,
    policy: &PlacementPolicy,
    allow_shift: bool,
) -> Placement {
    let first = scratch.check(p, p.window, p.quantity);
    if first.is_admit() {
        return Placement::approved(p);
    }

    if let Some(min) = p.min_quantity.filter(|m| *m < p.quantity) {
        if let Some(fit) = scratch.reducible_to(p, p.window) {
            if fit >= min.max(1) && scratch.check(p, p.window, fit).is_admit() {
                return Placement {
                    proposal_id: p.id.clone(),
                    outcome: Outcome::ApprovedModified,
                    window: p.window,
                    quantity: fit,
                    reason: Some(format!("quantity reduced from {} to {fit}", p.quantity)),
                };
            }
        }
    }

    if allow_shift {
        let deferred = |window: TimeWindow, why: String| Placement {
            proposal_id: p.id.clone(),
            outcome: Outcome::Deferred,
            window,
            quantity: p.quantity,
            reason: Some(why),
        };

        for alt in &p.alternative_windows {
            if !alt.is_empty() && scratch.check(p, *alt, p.quantity).is_admit() {
                return deferred(*alt, "moved to the agent's alternative window".to_string());
            }
        }

        let step = policy.step_minutes.max(1);
        let steps = policy.horizon_minutes.max(0) / step;
        for k in 1..=steps {
            let offset = k * step;
            let Some(window) = p.window.shifted(Duration::minutes(offset)) else {
                break;
            };
            if scratch.check(p, window, p.quantity).is_admit() {
                return deferred(window, format!("shifted {offset} minutes later"));
            }
        }

        return Placement::rejected(
            p,
            format!(
                "{}; no admissible window within {} minutes",
                describe(&first),
                policy.horizon_minutes
            ),
        );
    }

    Placement::rejected(p, describe(&first))
}

fn greedy(
    snapshot: &ResourceSnapshot,
    members: &[&StoredProposal],
    order: &[&StoredProposal],
    policy: &PlacementPolicy,
    allow_shift: bool,
    label: String,
) -> Candidate {
    let mut scratch = Scratch::new(snapshot);
    let mut placed: HashMap<ProposalId, Placement> = HashMap::new();
    for sp in order {
        let placement = place_one(&scratch, &sp.proposal, policy, allow_shift);
        scratch.place(&sp.proposal, &placement);
        placed.insert(sp.id().clone(), placement);
    }
    let placements = members
        .iter()
        .filter_map(|sp| placed.remove(sp.id()))
        .collect();
    Candidate { label, placements }
}

/// Proposals in arbitration priority: priority desc, deadline asc, seq asc.
pub fn rank_order(component: &ConflictComponent) -> Vec<&StoredProposal> {
    let mut ranked: Vec<&StoredProposal> = component.proposals.iter().collect();
    ranked.sort_by_key(|p| p.rank_key());
    ranked
}

/// Every distinct candidate for `component`, in a fixed order.
pub fn generate_candidates(
    snapshot: &ResourceSnapshot,
    component: &ConflictComponent,
    policy: &PlacementPolicy,
) -> Vec<Candidate> {
    let mut members: Vec<&StoredProposal> = component.proposals.iter().collect();
    members.sort_by_key(|p| p.seq);
    let ranked = rank_order(component);

    let mut out: Vec<Candidate> = Vec::new();
    let mut push = |c: Candidate| {
        if !out.iter().any(|o| o.placements == c.placements) {
            out.push(c);
        }
    };

    push(Candidate {
        label: AS_REQUESTED.to_string(),
        placements: members
            .iter()
            .map(|sp| Placement::approved(&sp.proposal))
            .collect(),
    });

    for winner in &ranked {
        let mut order = vec![*winner];
        order.extend(ranked.iter().copied().filter(|p| p.id() != winner.id()));
        push(greedy(
            snapshot,
            &members,
            &order,
            policy,
            true,
            format!("prioritize:{}", winner.id()),
        ));
    }

    push(greedy(
        snapshot,
        &members,
        &ranked,
        policy,
        false,
        REJECT_INSTEAD_OF_SHIFT.to_string(),
    ));

    push(Candidate {
        label: REJECT_ALL.to_string(),
        placements: members
            .iter()
            .map(|sp| Placement::rejected(&sp.proposal, "all proposals in the conflict rejected"))
            .collect(),
    });

    out
}
