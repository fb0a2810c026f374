//! Deterministic choice among candidate resolutions.
//!
//! Candidates that overlap a lock, carry any safety score, exceed capacity
//! or reject everyone are discarded first. The survivors are ordered by:
//!
//! 1. the highest per-proposal SLA band (lower wins)
//! 2. total operational-impact minutes (lower wins)
//! 3. outcome severities listed in proposal rank order (lexicographic)
//! 4. generation order, which starts from the earliest-submitted proposal

use std::cmp::Ordering;
use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::conflict::ConflictComponent;
use crate::domain::{ProposalId, StoredProposal};
use crate::resource_model::ResourceSnapshot;
use crate::risk::{CandidateRisk, RiskEvaluator, RiskScore};

use super::candidate::{generate_candidates, rank_order, Candidate, Placement, PlacementPolicy};
use super::error::{ArbitrationError, ArbitrationResult};
use super::resolution::{AlternativeSummary, DiscardReason, Disposition, Rationale, Resolution};

/// A candidate with its risk evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluatedCandidate {
    pub candidate: Candidate,
    pub risk: CandidateRisk,
    #[serde(default)]
    pub discard: Option<DiscardReason>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum Verdict {
    Resolved { chosen: usize },
    /// No candidate passed the hard filters.
    UnresolvableSafely,
}

/// Everything the engine concluded about one component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub proposal_ids: Vec<ProposalId>,
    /// Risk of approving everything as requested.
    pub conflict_risk: CandidateRisk,
    pub candidates: Vec<EvaluatedCandidate>,
    pub verdict: Verdict,
    /// One per proposal when resolved; empty otherwise.
    pub resolutions: Vec<Resolution>,
    pub alternatives: Vec<AlternativeSummary>,
}

impl Decision {
    /// Placeholder for a component the engine never produced a decision for:
    /// nothing chosen, nothing placed.
    pub fn undecided(component: &ConflictComponent) -> Self {
        Self {
            proposal_ids: component.proposal_ids(),
            conflict_risk: CandidateRisk {
                score: RiskScore::zero(),
                per_proposal: Vec::new(),
                lock_violation: None,
                capacity_feasible: true,
            },
            candidates: Vec::new(),
            verdict: Verdict::UnresolvableSafely,
            resolutions: Vec::new(),
            alternatives: Vec::new(),
        }
    }

    pub fn chosen(&self) -> Option<&EvaluatedCandidate> {
        match self.verdict {
            Verdict::Resolved { chosen } => self.candidates.get(chosen),
            Verdict::UnresolvableSafely => None,
        }
    }

    pub fn is_unresolvable(&self) -> bool {
        self.verdict == Verdict::UnresolvableSafely
    }

    /// The risk escalation routing looks at: the chosen candidate's, or the
    /// conflict's own when nothing was chosen.
    pub fn routing_risk(&self) -> &CandidateRisk {
        self.chosen().map_or(&self.conflict_risk, |c| &c.risk)
    }

    pub fn proposed_placements(&self) -> Option<&[Placement]> {
        self.chosen().map(|c| c.candidate.placements.as_slice())
    }
}

#[derive(Debug, Clone, Default)]
pub struct ArbitrationEngine {
    evaluator: RiskEvaluator,
    placement: PlacementPolicy,
}

impl ArbitrationEngine {
    pub fn new(evaluator: RiskEvaluator, placement: PlacementPolicy) -> Self {
        Self {
            evaluator,
            placement,
        }
    }

    pub fn evaluator(&self) -> &RiskEvaluator {
        &self.evaluator
    }

    /// Decide one component against `snapshot`. Pure: the same inputs always
    /// give the same decision.
    pub fn decide(
        &self,
        snapshot: &ResourceSnapshot,
        component: &ConflictComponent,
    ) -> ArbitrationResult<Decision> {
        if component.proposals.is_empty() {
            return Err(ArbitrationError::EmptyComponent);
        }

        let conflict_risk = self.evaluator.evaluate_conflict(snapshot, component);
        let candidates: Vec<EvaluatedCandidate> =
            generate_candidates(snapshot, component, &self.placement)
                .into_iter()
                .map(|candidate| {
                    let risk = self
                        .evaluator
                        .evaluate_candidate(snapshot, component, &candidate);
                    let discard = discard_reason(&candidate, &risk);
                    EvaluatedCandidate {
                        candidate,
                        risk,
                        discard,
                    }
                })
                .collect();

        let ranked: Vec<ProposalId> = rank_order(component)
            .iter()
            .map(|p| p.id().clone())
            .collect();
        let best = candidates
            .iter()
            .enumerate()
            .filter(|(_, c)| c.discard.is_none())
            .min_by(|(ia, a), (ib, b)| compare(a, b, &ranked).then(ia.cmp(ib)))
            .map(|(i, _)| i);

        let verdict = match best {
            Some(chosen) => Verdict::Resolved { chosen },
            None => Verdict::UnresolvableSafely,
        };

        let alternatives = summarize(&candidates, best);
        let resolutions = match best {
            Some(i) => self.resolutions(component, &candidates[i], &alternatives),
            None => Vec::new(),
        };

        debug!(
            proposals = component.proposals.len(),
            candidates = candidates.len(),
            chosen = best.map(|i| candidates[i].candidate.label.as_str()),
            "component decided"
        );

        Ok(Decision {
            proposal_ids: component.proposal_ids(),
            conflict_risk,
            candidates,
            verdict,
            resolutions,
            alternatives,
        })
    }

    fn resolutions(
        &self,
        component: &ConflictComponent,
        chosen: &EvaluatedCandidate,
        alternatives: &[AlternativeSummary],
    ) -> Vec<Resolution> {
        let proposals: HashMap<&ProposalId, &StoredProposal> =
            component.proposals.iter().map(|p| (p.id(), p)).collect();
        let constraints: Vec<String> = component.conflicts.iter().map(|c| c.summary()).collect();
        let tradeoffs = tradeoffs(chosen, alternatives);

        chosen
            .candidate
            .placements
            .iter()
            .filter_map(|pl| {
                let sp = proposals.get(&pl.proposal_id)?;
                let display_score = chosen
                    .risk
                    .per_proposal
                    .iter()
                    .find(|r| r.proposal_id == pl.proposal_id)
                    .map(|r| self.evaluator.display_score(sp, r, &chosen.risk.score));
                Some(Resolution {
                    proposal_id: pl.proposal_id.clone(),
                    outcome: pl.outcome,
                    window: pl.window,
                    quantity: pl.quantity,
                    reason: pl.reason.clone(),
                    display_score,
                    rationale: Rationale {
                        conflicting_proposals: component
                            .proposal_ids()
                            .into_iter()
                            .filter(|id| id != &pl.proposal_id)
                            .collect(),
                        constraints: constraints.clone(),
                        chosen: chosen.candidate.label.clone(),
                        alternatives: alternatives.to_vec(),
                        tradeoffs: tradeoffs.clone(),
                    },
                })
            })
            .collect()
    }
}

fn discard_reason(candidate: &Candidate, risk: &CandidateRisk) -> Option<DiscardReason> {
    if let Some(lock_id) = risk.lock_violation {
        return Some(DiscardReason::LockViolation { lock_id });
    }
    if risk.score.safety > 0.0 || risk.score.safety.is_nan() {
        return Some(DiscardReason::SafetyViolation {
            score: risk.score.safety,
        });
    }
    if !risk.capacity_feasible {
        return Some(DiscardReason::CapacityInfeasible);
    }
    if candidate.all_rejected() {
        return Some(DiscardReason::AllRejected);
    }
    None
}

fn compare(a: &EvaluatedCandidate, b: &EvaluatedCandidate, ranked: &[ProposalId]) -> Ordering {
    a.risk
        .worst_sla_band()
        .cmp(&b.risk.worst_sla_band())
        .then(
            a.risk
                .score
                .impact_minutes
                .total_cmp(&b.risk.score.impact_minutes),
        )
        .then_with(|| {
            a.candidate
                .severity_vector(ranked)
                .cmp(&b.candidate.severity_vector(ranked))
        })
}

fn summarize(candidates: &[EvaluatedCandidate], chosen: Option<usize>) -> Vec<AlternativeSummary> {
    candidates
        .iter()
        .enumerate()
        .map(|(i, c)| AlternativeSummary {
            label: c.candidate.label.clone(),
            disposition: match (&c.discard, chosen == Some(i)) {
                (_, true) => Disposition::Chosen,
                (Some(discard), false) => Disposition::Discarded {
                    discard: discard.clone(),
                },
                (None, false) => Disposition::Outscored,
            },
            safety: c.risk.score.safety,
            sla_band: c.risk.worst_sla_band(),
            impact_minutes: c.risk.score.impact_minutes,
            displaced: c.risk.score.displaced,
        })
        .collect()
}

fn tradeoffs(chosen: &EvaluatedCandidate, alternatives: &[AlternativeSummary]) -> String {
    let runner_up = alternatives
        .iter()
        .find(|a| a.label != chosen.candidate.label)
        .map(|a| a.describe())
        .unwrap_or_else(|| "none".to_string());
    format!(
        "{} keeps sla at {} with {:.0} delay-minutes and {} displaced; next considered: {}",
        chosen.candidate.label,
        chosen.risk.worst_sla_band(),
        chosen.risk.score.impact_minutes,
        chosen.risk.score.displaced,
        runner_up
    )
}
