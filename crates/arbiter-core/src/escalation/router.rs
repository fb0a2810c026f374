//! Autonomous vs. human handling, and escalation construction.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use arbiter_ledger::TraceId;

use crate::arbitration::Decision;
use crate::conflict::{ConflictComponent, ConflictKind};
use crate::domain::{ProposalId, TimeWindow};
use crate::risk::{ImpactBand, RiskBand};

use super::record::{
    Audience, Escalation, EscalationId, EscalationPayload, EscalationReason, EscalationStatus,
    RiskIndicators,
};
use super::state::ProposalState;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EscalationPolicy {
    /// Components with more proposals than this always go to a human.
    pub max_proposals: usize,
    /// When set, any proposal below this confidence forces escalation.
    pub min_confidence: Option<f64>,
    pub timeout_secs: u64,
}

impl Default for EscalationPolicy {
    fn default() -> Self {
        Self {
            max_proposals: 2,
            min_confidence: None,
            timeout_secs: 900,
        }
    }
}

impl EscalationPolicy {
    pub fn timeout(&self) -> Duration {
        let secs = i64::try_from(self.timeout_secs).unwrap_or(i64::MAX);
        Duration::seconds(secs.min(i64::MAX / 1000))
    }

    /// Response deadline for an escalation opened at `now`, saturating at
    /// the end of representable time.
    pub fn deadline_after(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now.checked_add_signed(self.timeout())
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "routing", rename_all = "snake_case")]
pub enum Routing {
    Auto,
    Escalate {
        audience: Audience,
        reasons: Vec<EscalationReason>,
    },
}

impl Routing {
    pub fn is_auto(&self) -> bool {
        matches!(self, Routing::Auto)
    }
}

#[derive(Debug, Clone, Default)]
pub struct EscalationRouter {
    policy: EscalationPolicy,
}

impl EscalationRouter {
    pub fn new(policy: EscalationPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &EscalationPolicy {
        &self.policy
    }

    /// Auto-resolve only when every band is Low and no structural trigger fires.
    pub fn route(&self, component: &ConflictComponent, decision: &Decision) -> Routing {
        let risk = decision.routing_risk();
        let mut reasons = Vec::new();

        if decision.is_unresolvable() {
            reasons.push(EscalationReason::UnresolvableSafely);
        }
        let safety_band = risk.score.safety_band();
        if safety_band >= RiskBand::Medium {
            reasons.push(EscalationReason::SafetyRisk {
                score: risk.score.safety,
                band: safety_band,
            });
        }
        let sla_band = risk.worst_sla_band();
        if sla_band >= RiskBand::Medium {
            reasons.push(EscalationReason::SlaRisk {
                score: risk.score.sla,
                band: sla_band,
            });
        }
        if risk.score.impact_band() == ImpactBand::High {
            reasons.push(EscalationReason::HighImpact {
                minutes: risk.score.impact_minutes,
            });
        }
        let count = component.proposals.len();
        if count > self.policy.max_proposals {
            reasons.push(EscalationReason::TooManyProposals {
                count,
                limit: self.policy.max_proposals,
            });
        }
        let mut locks = component.lock_ids();
        locks.extend(decision.conflict_risk.lock_violation);
        for lock_id in locks {
            reasons.push(EscalationReason::LockInvolved { lock_id });
        }
        if let Some(min) = self.policy.min_confidence {
            for sp in &component.proposals {
                if sp.proposal.confidence < min {
                    reasons.push(EscalationReason::LowConfidence {
                        proposal_id: sp.id().clone(),
                        confidence: sp.proposal.confidence,
                    });
                }
            }
        }

        if reasons.is_empty() {
            return Routing::Auto;
        }
        let safety_conflict = component.kinds().contains(&ConflictKind::Exclusivity);
        let safety_trigger = reasons.iter().any(|r| {
            matches!(
                r,
                EscalationReason::SafetyRisk { .. } | EscalationReason::UnresolvableSafely
            )
        });
        let audience = if safety_conflict && safety_trigger {
            Audience::SafetyTeam
        } else {
            Audience::Planner
        };
        Routing::Escalate { audience, reasons }
    }

    /// Build the escalation record for a routed component.
    #[allow(clippy::too_many_arguments)]
    pub fn build(
        &self,
        component: &ConflictComponent,
        decision: &Decision,
        audience: Audience,
        reasons: Vec<EscalationReason>,
        trace_id: TraceId,
        current_state: BTreeMap<ProposalId, ProposalState>,
        now: DateTime<Utc>,
    ) -> Escalation {
        let risk = decision.routing_risk();
        let mut indicators = RiskIndicators::from(&risk.score);
        indicators.sla_band = risk.worst_sla_band();

        let agents: BTreeSet<_> = component
            .proposals
            .iter()
            .map(|p| p.proposal.agent_id.clone())
            .collect();
        let window = component
            .proposals
            .iter()
            .map(|p| p.proposal.window)
            .reduce(|a, b| a.span(&b))
            .unwrap_or_else(|| TimeWindow::new(now, now));
        let confidence = component
            .proposals
            .iter()
            .map(|p| p.proposal.confidence)
            .fold(1.0, f64::min);

        let mut conflict_summary: Vec<String> =
            component.conflicts.iter().map(|c| c.summary()).collect();
        if conflict_summary.is_empty() {
            conflict_summary.push("no conflicting proposals; escalated on risk".to_string());
        }

        let tradeoffs = decision
            .resolutions
            .first()
            .map(|r| r.rationale.tradeoffs.clone())
            .unwrap_or_else(|| {
                "no candidate passed the lock, safety and capacity filters; \
                 every proposal stays unreserved until a human decides"
                    .to_string()
            });

        let requested_decision = match (audience, decision.is_unresolvable()) {
            (Audience::OrchestratorInternal, _) => {
                "retry or adjust the proposed resolution; the orchestrator could not apply it"
                    .to_string()
            }
            (_, true) => {
                "provide windows for the listed proposals (modify) or reject them".to_string()
            }
            (_, false) => "approve, modify or reject the proposed resolution".to_string(),
        };

        Escalation {
            id: EscalationId::new(),
            trace_id,
            proposal_ids: component.proposal_ids(),
            conflict_kinds: component.kinds(),
            lock_ids: component.lock_ids(),
            audience,
            reasons,
            payload: EscalationPayload {
                conflict_summary,
                agents: agents.into_iter().collect(),
                resources: component.resources().into_iter().collect(),
                window,
                risk: indicators,
                current_state,
                proposed_resolution: decision.resolutions.clone(),
                alternatives: decision.alternatives.clone(),
                tradeoffs,
                confidence,
                requested_decision,
            },
            proposed: decision.proposed_placements().map(<[_]>::to_vec),
            status: EscalationStatus::Open,
            opened_at: now,
            deadline: self.policy.deadline_after(now),
            parent: None,
            closure: None,
        }
    }

    /// Whether an expired escalation must be re-raised to the safety team.
    pub fn needs_upward(&self, expired: &Escalation) -> bool {
        expired.is_safety_related() && expired.parent.is_none()
    }

    /// Safety-team escalation replacing an expired safety escalation.
    pub fn escalate_upward(&self, expired: &Escalation, now: DateTime<Utc>) -> Escalation {
        let mut reasons = vec![EscalationReason::ExpiredUnanswered {
            previous: expired.id,
        }];
        reasons.extend(expired.reasons.iter().cloned());
        let mut payload = expired.payload.clone();
        payload.requested_decision = format!(
            "escalation {} expired unanswered; {}",
            expired.id, payload.requested_decision
        );

        Escalation {
            id: EscalationId::new(),
            trace_id: expired.trace_id.clone(),
            proposal_ids: expired.proposal_ids.clone(),
            conflict_kinds: expired.conflict_kinds.clone(),
            lock_ids: expired.lock_ids.clone(),
            audience: Audience::SafetyTeam,
            reasons,
            payload,
            proposed: expired.proposed.clone(),
            status: EscalationStatus::Open,
            opened_at: now,
            deadline: self.policy.deadline_after(now),
            parent: Some(expired.id),
            closure: None,
        }
    }
}
