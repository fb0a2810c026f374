//! Scores candidates on safety, SLA and operational impact.
//!
//! The evaluator re-checks every placed booking against the snapshot on its
//! own; it never trusts the way a candidate was built.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::arbitration::candidate::{Candidate, Outcome, Placement};
use crate::conflict::ConflictComponent;
use crate::domain::{ProposalId, Resource, ResourceId, StoredProposal};
use crate::resource_model::{covering_lock, peak_load, Booking, ResourceSnapshot};

use super::bands::sla_band;
use super::score::{CandidateRisk, ProposalRisk, RiskScore};

/// Floor of the safety score for any forklift / foot-traffic overlap.
const EXCLUSIVITY_BASE: f64 = 0.3;
/// Safety score for a booking inside a lock.
const LOCK_VIOLATION: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskPolicy {
    /// Buffer, in minutes, at which a deadline carries no SLA risk.
    pub sla_horizon_minutes: f64,
    /// Operational cost charged for each rejected proposal.
    pub rejection_penalty_minutes: f64,
    pub clearance_threshold_ft: f64,
}

impl Default for RiskPolicy {
    fn default() -> Self {
        Self {
            sla_horizon_minutes: 120.0,
            rejection_penalty_minutes: 30.0,
            clearance_threshold_ft: 10.0,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RiskEvaluator {
    policy: RiskPolicy,
}

impl RiskEvaluator {
    pub fn new(policy: RiskPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RiskPolicy {
        &self.policy
    }

    /// Risk of the conflict itself: every proposal approved as requested.
    pub fn evaluate_conflict(
        &self,
        snapshot: &ResourceSnapshot,
        component: &ConflictComponent,
    ) -> CandidateRisk {
        let placements: Vec<Placement> = component
            .proposals
            .iter()
            .map(|sp| Placement::approved(&sp.proposal))
            .collect();
        self.evaluate(snapshot, component, &placements)
    }

    pub fn evaluate_candidate(
        &self,
        snapshot: &ResourceSnapshot,
        component: &ConflictComponent,
        candidate: &Candidate,
    ) -> CandidateRisk {
        self.evaluate(snapshot, component, &candidate.placements)
    }

    fn evaluate(
        &self,
        snapshot: &ResourceSnapshot,
        component: &ConflictComponent,
        placements: &[Placement],
    ) -> CandidateRisk {
        let proposals: HashMap<&ProposalId, &StoredProposal> =
            component.proposals.iter().map(|p| (p.id(), p)).collect();

        let mut placed: BTreeMap<ResourceId, Vec<Booking>> = BTreeMap::new();
        for pl in placements {
            if let Some(sp) = proposals.get(&pl.proposal_id) {
                for (r, b) in pl.bookings(&sp.proposal) {
                    placed.entry(r).or_default().push(b);
                }
            }
        }

        let mut safety: f64 = 0.0;
        let mut lock_violation = None;
        let mut capacity_feasible = true;

        for (resource_id, bookings) in &placed {
            let Some(view) = snapshot.get(resource_id) else {
                capacity_feasible = false;
                continue;
            };
            let all: Vec<&Booking> = view.bookings().chain(bookings.iter()).collect();
            let capacity = view.resource.capacity.units();

            for b in bookings {
                if let Some(lock) = covering_lock(&view.locks, &b.window) {
                    lock_violation.get_or_insert(lock.id);
                    safety = safety.max(LOCK_VIOLATION);
                }
                let clash = all.iter().any(|o| {
                    o.proposal_id != b.proposal_id
                        && o.tag.excludes(&b.tag)
                        && o.window.overlaps(&b.window)
                });
                if clash {
                    safety = safety.max(self.exclusivity_score(&view.resource));
                }
                if peak_load(all.iter().copied(), &b.window) > capacity {
                    capacity_feasible = false;
                }
            }
        }

        let mut per_proposal = Vec::with_capacity(placements.len());
        let mut impact_minutes = 0.0;
        let mut displaced = 0;
        for pl in placements {
            let Some(sp) = proposals.get(&pl.proposal_id) else {
                continue;
            };
            let requested = &sp.proposal;
            let delay_minutes = if pl.is_placed() {
                (pl.window.start - requested.window.start).num_minutes().max(0)
            } else {
                0
            };

            impact_minutes += delay_minutes as f64;
            match pl.outcome {
                Outcome::Rejected => impact_minutes += self.policy.rejection_penalty_minutes,
                Outcome::ApprovedModified if requested.quantity > 0 => {
                    let shortfall = 1.0 - f64::from(pl.quantity) / f64::from(requested.quantity);
                    impact_minutes += shortfall * self.policy.rejection_penalty_minutes;
                }
                _ => {}
            }
            if pl.outcome != Outcome::Approved {
                displaced += 1;
            }

            let sla = self.sla_score(sp, pl, delay_minutes);
            per_proposal.push(ProposalRisk {
                proposal_id: pl.proposal_id.clone(),
                sla,
                sla_band: sla_band(sla),
                delay_minutes,
            });
        }

        let sla = per_proposal.iter().map(|p| p.sla).fold(0.0, f64::max);
        CandidateRisk {
            score: RiskScore {
                safety,
                sla,
                impact_minutes,
                displaced,
            },
            per_proposal,
            lock_violation,
            capacity_feasible,
        }
    }

    /// Exclusivity safety score, rising with the clearance shortfall.
    pub fn exclusivity_score(&self, resource: &Resource) -> f64 {
        let threshold = self.policy.clearance_threshold_ft;
        let clearance = resource.clearance_ft.unwrap_or(0.0).max(0.0);
        let shortfall = if threshold > 0.0 {
            ((threshold - clearance).max(0.0) / threshold).min(1.0)
        } else {
            1.0
        };
        EXCLUSIVITY_BASE + (1.0 - EXCLUSIVITY_BASE) * shortfall
    }

    /// SLA exposure of one placement.
    ///
    /// With a deadline the score grows as the buffer between the placed end
    /// and the deadline shrinks below the horizon, and passes 1 once the
    /// deadline is missed. Without one, the delay is weighted by priority.
    pub fn sla_score(&self, sp: &StoredProposal, placement: &Placement, delay_minutes: i64) -> f64 {
        let horizon = self.policy.sla_horizon_minutes.max(1.0);
        let hint = &sp.proposal.priority;
        match hint.sla_deadline {
            Some(_) if !placement.is_placed() => 1.0,
            Some(deadline) => {
                let buffer = (deadline - placement.window.end).num_minutes() as f64;
                (1.0 - buffer / horizon).max(0.0)
            }
            None => {
                let weight = f64::from(hint.priority) / 10.0;
                if placement.is_placed() {
                    delay_minutes as f64 / horizon * weight
                } else {
                    weight
                }
            }
        }
    }

    /// Composite score shown next to each proposal in a rationale.
    ///
    /// Higher is better; only for display, never used to pick a candidate.
    pub fn display_score(&self, sp: &StoredProposal, risk: &ProposalRisk, score: &RiskScore) -> f64 {
        let priority = f64::from(sp.proposal.priority.priority) / 10.0;
        let urgency = risk.sla.min(1.0);
        let impact = score.impact_fraction(self.policy.sla_horizon_minutes);
        let hazard = score.safety.min(1.0);
        let confidence = sp.proposal.confidence.clamp(0.0, 1.0);
        priority * 10.0 + urgency * 5.0 + (1.0 - impact) * 3.0 - hazard * 2.0 - (1.0 - confidence) * 2.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conflict::{build_components, ConflictDetector};
    use crate::domain::{Capacity, Proposal, ReservationTag, ResourceKind, TimeWindow};
    use crate::resource_model::{LockRequest, LockScope, ResourceModel};
    use arbiter_ledger::TraceId;
    use chrono::{DateTime, TimeZone, Utc};

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, h, m, 0).unwrap()
    }

    fn stored(p: Proposal, seq: u64) -> StoredProposal {
        StoredProposal {
            proposal: p,
            seq,
            submitted_at: at(8, 0),
            trace_id: TraceId::new(),
        }
    }

    fn model(clearance: Option<f64>) -> ResourceModel {
        let mut aisle = Resource::new("X", ResourceKind::AisleSegment, Capacity::Units(10));
        if let Some(c) = clearance {
            aisle = aisle.with_clearance_ft(c);
        }
        ResourceModel::with_resources(vec![aisle]).unwrap()
    }

    fn exclusivity_component(m: &ResourceModel) -> ConflictComponent {
        let p1 = Proposal::new(
            "P1",
            "replenishment",
            vec![ResourceId::from("X")],
            TimeWindow::new(at(9, 30), at(9, 50)),
            1,
        )
        .with_tag(ReservationTag::Forklift);
        let p2 = Proposal::new(
            "P2",
            "picking",
            vec![ResourceId::from("X")],
            TimeWindow::new(at(9, 20), at(9, 50)),
            1,
        )
        .with_tag(ReservationTag::WorkerFootTraffic);
        let ps = vec![stored(p1, 1), stored(p2, 2)];
        let conflicts = ConflictDetector::detect(&m.snapshot(), &ps);
        build_components(&ps, conflicts).remove(0)
    }

    #[test]
    fn test_exclusivity_conflict_is_high_or_critical() {
        let m = model(Some(6.0));
        let comp = exclusivity_component(&m);
        let risk = RiskEvaluator::default().evaluate_conflict(&m.snapshot(), &comp);
        assert!((risk.score.safety - (0.3 + 0.7 * 0.4)).abs() < 1e-9);
        assert!(risk.score.safety_band() >= crate::risk::RiskBand::High);
        assert!(!risk.is_safe());
    }

    #[test]
    fn test_unknown_clearance_is_worst_case() {
        let m = model(None);
        let comp = exclusivity_component(&m);
        let risk = RiskEvaluator::default().evaluate_conflict(&m.snapshot(), &comp);
        assert!((risk.score.safety - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_deferral_scores_delay_and_priority() {
        let m = model(None);
        let comp = exclusivity_component(&m);
        let p1 = &comp.proposals[0].proposal;
        let candidate = Candidate {
            label: "manual".into(),
            placements: vec![
                Placement {
                    proposal_id: p1.id.clone(),
                    outcome: Outcome::Deferred,
                    window: TimeWindow::new(at(9, 50), at(10, 10)),
                    quantity: 1,
                    reason: None,
                },
                Placement::approved(&comp.proposals[1].proposal),
            ],
        };
        let risk = RiskEvaluator::default().evaluate_candidate(&m.snapshot(), &comp, &candidate);
        assert!(risk.is_safe());
        assert!(risk.capacity_feasible);
        assert_eq!(risk.score.impact_minutes, 20.0);
        assert_eq!(risk.score.displaced, 1);
        let expected = 20.0 / 120.0 * 0.5;
        assert!((risk.score.sla - expected).abs() < 1e-9);
    }

    #[test]
    fn test_deadline_buffer_drives_sla() {
        let m = model(None);
        let p = Proposal::new(
            "D",
            "dock",
            vec![ResourceId::from("X")],
            TimeWindow::new(at(9, 0), at(9, 30)),
            1,
        )
        .with_sla_deadline(at(10, 0));
        let sp = stored(p, 1);
        let eval = RiskEvaluator::default();

        let on_time = Placement::approved(&sp.proposal);
        assert!((eval.sla_score(&sp, &on_time, 0) - 0.75).abs() < 1e-9);

        let rejected = Placement::rejected(&sp.proposal, "x");
        assert_eq!(eval.sla_score(&sp, &rejected, 0), 1.0);
    }

    #[test]
    fn test_lock_violation_is_reported() {
        let m = model(None);
        let outcome = m
            .set_lock(
                LockRequest::new(
                    "X".into(),
                    LockScope::Window {
                        window: TimeWindow::new(at(10, 0), at(10, 30)),
                    },
                    "inspection",
                    "planner",
                ),
                at(8, 0),
            )
            .unwrap();
        let p = Proposal::new(
            "L",
            "slotting",
            vec![ResourceId::from("X")],
            TimeWindow::new(at(10, 5), at(10, 20)),
            1,
        );
        let ps = vec![stored(p, 1)];
        let conflicts = ConflictDetector::detect(&m.snapshot(), &ps);
        let comp = build_components(&ps, conflicts).remove(0);
        let risk = RiskEvaluator::default().evaluate_conflict(&m.snapshot(), &comp);
        assert_eq!(risk.lock_violation, Some(outcome.lock.id));
        assert_eq!(risk.score.safety, 1.0);
    }
}
