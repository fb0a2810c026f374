//! Planner-facing operations: escalation answers, cancellation, expiry and
//! lock management.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, instrument};

use arbiter_ledger::{EntryKind, TraceId};

use crate::arbitration::{Outcome, Placement, Rationale, Resolution};
use crate::domain::{ProposalId, Result, StoredProposal};
use crate::escalation::{
    Escalation, EscalationDecision, EscalationError, EscalationId, EscalationResponse,
    EscalationStatus, ProposalState,
};
use crate::events::ArbiterEvent;
use crate::metrics::METRICS;
use crate::obs;
use crate::resource_model::{CommitOutcome, LockId, LockOutcome, LockRequest};

use super::{reservation_requests, CycleReport, Orchestrator};

const EXPIRED_REASON: &str = "escalation expired without response";

/// What one `expire_due` sweep did.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExpiryReport {
    pub expired: Vec<EscalationId>,
    /// Safety-team escalations opened in place of expired safety escalations.
    pub upward: Vec<EscalationId>,
    /// Proposals moved to `Expired`.
    pub proposals: Vec<ProposalId>,
}

/// What revoking a lock did.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LockRevocation {
    pub lock_id: LockId,
    pub superseded: Vec<EscalationId>,
    pub reevaluation: CycleReport,
}

fn lock_trace(lock_id: LockId) -> TraceId {
    TraceId(format!("lock-{lock_id}"))
}

impl Orchestrator {
    /// Apply a human answer to an open escalation.
    ///
    /// A refused commit leaves the escalation open and returns
    /// [`EscalationError::CommitRefused`].
    #[instrument(skip(self, response), fields(escalation_id = %id, decision = ?response.decision))]
    pub async fn respond_to_escalation(
        &self,
        id: EscalationId,
        response: EscalationResponse,
        now: DateTime<Utc>,
    ) -> Result<Vec<Resolution>> {
        let _cycle = self.cycle.lock().await;
        let escalation = self.open_escalation_record(id).await?;

        let placements = self.human_placements(&escalation, &response)?;
        let placed_state = match response.decision {
            EscalationDecision::Approve => ProposalState::PlannerApproved,
            EscalationDecision::Modify => ProposalState::PlannerModified,
            EscalationDecision::Reject => ProposalState::PlannerRejected,
        };

        let stored: Vec<StoredProposal> = placements
            .iter()
            .filter_map(|pl| self.store.get(&pl.proposal_id))
            .collect();
        let requests = reservation_requests(&stored, &placements);
        let reservations = if requests.is_empty() {
            Vec::new()
        } else {
            match self.resources.reserve_all(&requests, None)? {
                CommitOutcome::Committed { reservations, .. } => reservations,
                CommitOutcome::Refused {
                    resource_id,
                    outcome,
                    ..
                } => {
                    return Err(EscalationError::CommitRefused {
                        id,
                        reason: format!("{resource_id}: {outcome}"),
                    }
                    .into())
                }
            }
        };

        let trace = self.canonical(&escalation.trace_id);
        for r in &reservations {
            self.record(
                trace.clone(),
                EntryKind::ReservationCommitted,
                r.id.to_string(),
                r,
                now,
            )
            .await?;
        }

        let chosen = format!("planner:{}", decision_label(response.decision));
        let tradeoffs = response
            .comment
            .clone()
            .unwrap_or_else(|| escalation.payload.tradeoffs.clone());
        let mut resolutions = Vec::with_capacity(placements.len());
        for pl in placements {
            let resolution = human_resolution(&escalation, pl, &chosen, &tradeoffs);
            let state = if resolution.is_rejected() {
                ProposalState::PlannerRejected
            } else {
                placed_state
            };
            self.publish_resolution(&trace, &resolution, state, now)
                .await?;
            resolutions.push(resolution);
        }

        self.close_escalation(
            &escalation,
            EscalationStatus::Resolved,
            Some(response.decision),
            &response.responder,
            response.comment.clone(),
            now,
        )
        .await?;
        Ok(resolutions)
    }

    /// Planner withdrawal of an open escalation; its proposals are rejected.
    #[instrument(skip(self, by), fields(escalation_id = %id))]
    pub async fn cancel_escalation(
        &self,
        id: EscalationId,
        by: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<Resolution>> {
        let _cycle = self.cycle.lock().await;
        let escalation = self.open_escalation_record(id).await?;
        let trace = self.canonical(&escalation.trace_id);
        let reason = format!("escalation cancelled by {by}");

        let mut resolutions = Vec::new();
        for proposal_id in &escalation.proposal_ids {
            let Some(sp) = self.store.get(proposal_id) else {
                continue;
            };
            let pl = Placement::rejected(&sp.proposal, reason.clone());
            let resolution = human_resolution(&escalation, pl, "planner:cancel", &reason);
            self.publish_resolution(&trace, &resolution, ProposalState::PlannerRejected, now)
                .await?;
            resolutions.push(resolution);
        }

        self.close_escalation(&escalation, EscalationStatus::Cancelled, None, by, None, now)
            .await?;
        Ok(resolutions)
    }

    /// Expire every open escalation whose deadline has passed.
    ///
    /// Safety-related escalations are re-raised to the safety team once;
    /// everything else falls back to rejection.
    #[instrument(skip(self))]
    pub async fn expire_due(&self, now: DateTime<Utc>) -> Result<ExpiryReport> {
        let _cycle = self.cycle.lock().await;
        let due: Vec<Escalation> = {
            let book = self.escalations.lock().await;
            book.due(now)
                .iter()
                .filter_map(|id| book.get(id).cloned())
                .collect()
        };

        let mut report = ExpiryReport::default();
        for escalation in due {
            let trace = self.canonical(&escalation.trace_id);
            METRICS.inc_expired();
            self.record(
                trace.clone(),
                EntryKind::EscalationExpired,
                escalation.id.to_string(),
                &serde_json::json!({
                    "deadline": escalation.deadline,
                    "audience": escalation.audience,
                    "safety_related": escalation.is_safety_related(),
                }),
                now,
            )
            .await?;
            self.set_status(&escalation, EscalationStatus::Expired, None, "system", None, now)
                .await;
            report.expired.push(escalation.id);

            if self.router.needs_upward(&escalation) {
                let mut upward = self.router.escalate_upward(&escalation, now);
                upward.trace_id = trace;
                report.upward.push(self.file_escalation(upward, now).await?);
                continue;
            }

            for proposal_id in &escalation.proposal_ids {
                let Some(sp) = self.store.get(proposal_id) else {
                    continue;
                };
                if self.store.state(proposal_id) != Some(ProposalState::Escalated) {
                    continue;
                }
                let pl = Placement::rejected(&sp.proposal, EXPIRED_REASON);
                let resolution = human_resolution(&escalation, pl, "expired", EXPIRED_REASON);
                self.publish_resolution(&trace, &resolution, ProposalState::Expired, now)
                    .await?;
                report.proposals.push(proposal_id.clone());
            }
        }
        Ok(report)
    }

    /// Place a planner lock.
    #[instrument(skip(self, request), fields(resource_id = %request.resource_id))]
    pub async fn set_lock(&self, request: LockRequest, now: DateTime<Utc>) -> Result<LockOutcome> {
        let outcome = self.resources.set_lock(request, now)?;
        let lock = &outcome.lock;
        self.record(
            lock_trace(lock.id),
            EntryKind::LockSet,
            lock.id.to_string(),
            &outcome,
            now,
        )
        .await?;
        obs::emit_lock_changed(&lock.id.to_string(), lock.resource_id.as_str(), true);
        self.events.publish(ArbiterEvent::LockChanged {
            lock_id: lock.id,
            lock: Some(lock.clone()),
            active: true,
            at: now,
        });
        Ok(outcome)
    }

    /// Revoke a lock and re-arbitrate every escalated proposal that was
    /// waiting on it.
    #[instrument(skip(self, by), fields(lock_id = %lock_id))]
    pub async fn clear_lock(
        &self,
        lock_id: LockId,
        by: &str,
        now: DateTime<Utc>,
    ) -> Result<LockRevocation> {
        let _cycle = self.cycle.lock().await;
        let lock = self.resources.clear_lock(lock_id)?;
        self.record(
            lock_trace(lock_id),
            EntryKind::LockCleared,
            lock_id.to_string(),
            &serde_json::json!({ "lock": lock, "cleared_by": by }),
            now,
        )
        .await?;
        obs::emit_lock_changed(&lock_id.to_string(), lock.resource_id.as_str(), false);
        self.events.publish(ArbiterEvent::LockChanged {
            lock_id,
            lock: Some(lock),
            active: false,
            at: now,
        });

        let dependent: Vec<Escalation> = {
            let book = self.escalations.lock().await;
            book.open_referencing_lock(&lock_id)
                .iter()
                .filter_map(|id| book.get(id).cloned())
                .collect()
        };

        let mut superseded = Vec::with_capacity(dependent.len());
        let mut reopened: BTreeSet<ProposalId> = BTreeSet::new();
        for escalation in dependent {
            let comment = format!("lock {lock_id} revoked");
            self.close_escalation(
                &escalation,
                EscalationStatus::Superseded,
                None,
                by,
                Some(comment),
                now,
            )
            .await?;
            for proposal_id in &escalation.proposal_ids {
                if self.store.state(proposal_id) != Some(ProposalState::Escalated) {
                    continue;
                }
                if let Some(sp) = self.store.get(proposal_id) {
                    self.transition(&sp, ProposalState::UnderEvaluation, now)
                        .await?;
                    reopened.insert(proposal_id.clone());
                }
            }
            superseded.push(escalation.id);
        }

        info!(
            lock_id = %lock_id,
            superseded = superseded.len(),
            reopened = reopened.len(),
            "re-evaluating after lock revocation"
        );
        let reevaluation = self.run_cycle_locked(now).await?;
        Ok(LockRevocation {
            lock_id,
            superseded,
            reevaluation,
        })
    }

    async fn open_escalation_record(&self, id: EscalationId) -> Result<Escalation> {
        let book = self.escalations.lock().await;
        let escalation = book.get(&id).ok_or(EscalationError::NotFound { id })?;
        if !escalation.is_open() {
            return Err(EscalationError::NotOpen {
                id,
                status: escalation.status.to_string(),
            }
            .into());
        }
        Ok(escalation.clone())
    }

    /// Placements a human decision commits, one per escalated proposal.
    fn human_placements(
        &self,
        escalation: &Escalation,
        response: &EscalationResponse,
    ) -> Result<Vec<Placement>> {
        let id = escalation.id;
        let proposed = |proposal_id: &ProposalId| {
            escalation
                .proposed
                .as_ref()
                .and_then(|ps| ps.iter().find(|p| &p.proposal_id == proposal_id))
                .cloned()
        };

        let mut out = Vec::with_capacity(escalation.proposal_ids.len());
        match response.decision {
            EscalationDecision::Approve => {
                if escalation.proposed.is_none() {
                    return Err(EscalationError::NoProposedResolution { id }.into());
                }
                for proposal_id in &escalation.proposal_ids {
                    let sp = self.known(proposal_id)?;
                    out.push(proposed(proposal_id).unwrap_or_else(|| {
                        Placement::rejected(&sp.proposal, "not part of the proposed resolution")
                    }));
                }
            }
            EscalationDecision::Modify => {
                if response.modified_windows.is_empty() {
                    return Err(EscalationError::EmptyModification { id }.into());
                }
                if let Some(foreign) = response
                    .modified_windows
                    .keys()
                    .find(|p| !escalation.includes(p))
                {
                    return Err(EscalationError::ForeignProposal {
                        id,
                        proposal_id: foreign.clone(),
                    }
                    .into());
                }
                for proposal_id in &escalation.proposal_ids {
                    let sp = self.known(proposal_id)?;
                    let placement = match response.modified_windows.get(proposal_id) {
                        Some(window) => Placement {
                            proposal_id: proposal_id.clone(),
                            outcome: Outcome::ApprovedModified,
                            window: *window,
                            quantity: sp.proposal.quantity,
                            reason: Some(format!("window set by {}", response.responder)),
                        },
                        None => proposed(proposal_id).unwrap_or_else(|| {
                            Placement::rejected(&sp.proposal, "no window given by planner")
                        }),
                    };
                    out.push(placement);
                }
            }
            EscalationDecision::Reject => {
                let reason = format!("rejected by {}", response.responder);
                for proposal_id in &escalation.proposal_ids {
                    let sp = self.known(proposal_id)?;
                    out.push(Placement::rejected(&sp.proposal, reason.clone()));
                }
            }
        }
        Ok(out)
    }

    fn known(&self, proposal_id: &ProposalId) -> Result<StoredProposal> {
        self.store.get(proposal_id).ok_or_else(|| {
            EscalationError::UnknownProposal {
                proposal_id: proposal_id.clone(),
            }
            .into()
        })
    }

    async fn close_escalation(
        &self,
        escalation: &Escalation,
        status: EscalationStatus,
        decision: Option<EscalationDecision>,
        by: &str,
        comment: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let closed = self
            .set_status(escalation, status, decision, by, comment, now)
            .await;
        self.record(
            self.canonical(&escalation.trace_id),
            EntryKind::EscalationResolved,
            escalation.id.to_string(),
            &closed,
            now,
        )
        .await?;
        Ok(())
    }

    /// Update the book and announce the new status; returns the updated record.
    async fn set_status(
        &self,
        escalation: &Escalation,
        status: EscalationStatus,
        decision: Option<EscalationDecision>,
        by: &str,
        comment: Option<String>,
        now: DateTime<Utc>,
    ) -> Escalation {
        let mut closed = escalation.clone();
        closed.close(status, decision, by, comment, now);
        self.escalations.lock().await.insert(closed.clone());

        obs::emit_escalation_closed(&escalation.id.to_string(), &status.to_string(), by);
        self.events.publish(ArbiterEvent::EscalationClosed {
            escalation_id: escalation.id,
            status,
            at: now,
        });
        closed
    }
}

fn decision_label(decision: EscalationDecision) -> &'static str {
    match decision {
        EscalationDecision::Approve => "approve",
        EscalationDecision::Modify => "modify",
        EscalationDecision::Reject => "reject",
    }
}

fn human_resolution(
    escalation: &Escalation,
    placement: Placement,
    chosen: &str,
    tradeoffs: &str,
) -> Resolution {
    Resolution {
        rationale: Rationale {
            conflicting_proposals: escalation
                .proposal_ids
                .iter()
                .filter(|id| **id != placement.proposal_id)
                .cloned()
                .collect(),
            constraints: escalation.payload.conflict_summary.clone(),
            chosen: chosen.to_string(),
            alternatives: escalation.payload.alternatives.clone(),
            tradeoffs: tradeoffs.to_string(),
        },
        proposal_id: placement.proposal_id,
        outcome: placement.outcome,
        window: placement.window,
        quantity: placement.quantity,
        reason: placement.reason,
        display_score: None,
    }
}
