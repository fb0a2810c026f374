//! The async orchestrator wiring every component together.
//!
//! Data flow per cycle:
//!
//! ```text
//! pending proposals -> snapshot -> detect -> components
//!   -> decide (parallel, bounded by worker permits)
//!   -> route -> commit or escalate (sequential, optimistic versions)
//!   -> ledger + outbound events
//! ```
//!
//! Human-facing operations live in `human`.

mod human;

pub use human::{ExpiryReport, LockRevocation};

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, PoisonError};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{broadcast, Mutex, Semaphore};
use tokio::task::JoinHandle;
use tracing::{info, instrument, warn, Instrument};

use arbiter_ledger::{AuditLedger, EntryKind, LedgerEntry, NewEntry, TraceId};

use crate::arbitration::{
    ArbitrationEngine, ArbitrationError, ArbitrationResult, Decision, Outcome, Placement,
    Resolution,
};
use crate::config::ArbiterConfig;
use crate::conflict::{build_components, ConflictComponent, ConflictDetector};
use crate::domain::{ArbiterError, Proposal, ProposalId, ResourceId, Result, StoredProposal};
use crate::escalation::{
    Audience, Escalation, EscalationBook, EscalationId, EscalationReason, EscalationRouter,
    ProposalState, Routing,
};
use crate::events::{ArbiterEvent, EventBus};
use crate::metrics::METRICS;
use crate::obs;
use crate::proposal_store::ProposalStore;
use crate::resource_model::{
    CommitOutcome, DrainReport, Reservation, ReservationRequest, ResourceError, ResourceModel,
    ResourceSnapshot,
};
use crate::risk::RiskEvaluator;

/// What one arbitration cycle did.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CycleReport {
    pub components: usize,
    pub conflicts: usize,
    pub auto_resolved: usize,
    pub escalated: usize,
    pub commit_retries: u32,
    pub resolutions: Vec<Resolution>,
    pub escalations: Vec<EscalationId>,
}

enum Settled {
    Resolved(Vec<Resolution>),
    Escalated(EscalationId),
}

pub struct Orchestrator {
    config: ArbiterConfig,
    resources: Arc<ResourceModel>,
    store: ProposalStore,
    engine: Arc<ArbitrationEngine>,
    router: EscalationRouter,
    ledger: Arc<dyn AuditLedger>,
    escalations: Mutex<EscalationBook>,
    /// Absorbed trace -> trace it was merged into.
    merged_traces: std::sync::Mutex<HashMap<TraceId, TraceId>>,
    /// Serialises cycles and human decisions against each other.
    cycle: Mutex<()>,
    events: EventBus,
    workers: Arc<Semaphore>,
}

impl Orchestrator {
    pub fn new(
        config: ArbiterConfig,
        resources: Arc<ResourceModel>,
        ledger: Arc<dyn AuditLedger>,
    ) -> Result<Self> {
        config.validate()?;
        let engine = ArbitrationEngine::new(
            RiskEvaluator::new(config.risk_policy()),
            config.placement_policy(),
        );
        Ok(Self {
            router: EscalationRouter::new(config.escalation_policy()),
            events: EventBus::new(config.event_buffer),
            workers: Arc::new(Semaphore::new(config.worker_parallelism)),
            engine: Arc::new(engine),
            store: ProposalStore::new(),
            escalations: Mutex::new(EscalationBook::new()),
            merged_traces: std::sync::Mutex::new(HashMap::new()),
            cycle: Mutex::new(()),
            config,
            resources,
            ledger,
        })
    }

    pub fn config(&self) -> &ArbiterConfig {
        &self.config
    }

    pub fn resources(&self) -> &ResourceModel {
        &self.resources
    }

    pub fn proposals(&self) -> &ProposalStore {
        &self.store
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ArbiterEvent> {
        self.events.subscribe()
    }

    pub fn proposal_state(&self, id: &ProposalId) -> Option<ProposalState> {
        self.store.state(id)
    }

    /// Trace a proposal's entries are recorded under, after merges.
    pub fn trace_of(&self, id: &ProposalId) -> Option<TraceId> {
        self.store.get(id).map(|p| self.canonical(&p.trace_id))
    }

    pub async fn escalation(&self, id: &EscalationId) -> Option<Escalation> {
        self.escalations.lock().await.get(id).cloned()
    }

    pub async fn open_escalations(&self) -> Vec<Escalation> {
        self.escalations
            .lock()
            .await
            .open()
            .into_iter()
            .cloned()
            .collect()
    }

    /// The open escalation currently holding `proposal_id`, if any.
    pub async fn escalation_for(&self, proposal_id: &ProposalId) -> Option<EscalationId> {
        self.escalations.lock().await.open_for_proposal(proposal_id)
    }

    /// Validate and accept a proposal. Invalid proposals are refused
    /// synchronously and still leave a ledger entry.
    #[instrument(skip(self, proposal), fields(proposal_id = %proposal.id))]
    pub async fn submit_proposal(
        &self,
        proposal: Proposal,
        now: DateTime<Utc>,
    ) -> Result<StoredProposal> {
        if !self.resources.is_accepting() {
            return Err(ArbiterError::ShuttingDown);
        }
        match self.store.submit(proposal.clone(), self.resources.as_ref(), now) {
            Ok(stored) => {
                METRICS.inc_submitted();
                obs::emit_proposal_submitted(
                    stored.id().as_str(),
                    &stored.proposal.agent_id.0,
                    stored.trace_id.as_str(),
                );
                self.record(
                    stored.trace_id.clone(),
                    EntryKind::ProposalSubmitted,
                    stored.id().as_str(),
                    &stored,
                    now,
                )
                .await?;
                Ok(stored)
            }
            Err(err) => {
                METRICS.inc_rejected();
                obs::emit_proposal_rejected(proposal.id.as_str(), &err.reason());
                self.record(
                    TraceId::new(),
                    EntryKind::ProposalRejected,
                    proposal.id.as_str(),
                    &serde_json::json!({ "proposal": proposal, "reason": err.reason() }),
                    now,
                )
                .await?;
                Err(err.into())
            }
        }
    }

    /// Arbitrate everything awaiting a decision.
    #[instrument(skip(self))]
    pub async fn run_cycle(&self, now: DateTime<Utc>) -> Result<CycleReport> {
        let _cycle = self.cycle.lock().await;
        self.run_cycle_locked(now).await
    }

    async fn run_cycle_locked(&self, now: DateTime<Utc>) -> Result<CycleReport> {
        let pending = self.store.list_awaiting_arbitration();
        if pending.is_empty() {
            return Ok(CycleReport::default());
        }

        for sp in &pending {
            if self.store.state(sp.id()) == Some(ProposalState::Submitted) {
                self.transition(sp, ProposalState::UnderEvaluation, now)
                    .await?;
            }
        }

        let snapshot = Arc::new(self.resources.snapshot());
        let conflicts = ConflictDetector::detect(&snapshot, &pending);
        METRICS.add_conflicts(conflicts.len() as u64);
        let mut report = CycleReport {
            conflicts: conflicts.len(),
            ..CycleReport::default()
        };
        let components = build_components(&pending, conflicts);
        report.components = components.len();

        let mut traces = Vec::with_capacity(components.len());
        for component in &components {
            traces.push(self.adopt_component_trace(component, now).await?);
        }

        let decided = self.decide_all(Arc::clone(&snapshot), components, &traces).await?;

        let mut expected: BTreeMap<ResourceId, u64> = snapshot
            .resources
            .iter()
            .map(|(id, view)| (id.clone(), view.version))
            .collect();
        for ((component, decided), trace) in decided.into_iter().zip(traces) {
            let span = tracing::info_span!("arbiter.settle", trace_id = %trace);
            let settled = match decided {
                Ok(decision) => {
                    self.settle(component, decision, &trace, &mut expected, &mut report, now)
                        .instrument(span)
                        .await?
                }
                Err(detail) => {
                    self.escalate_undecided(&component, detail, &trace, now)
                        .instrument(span)
                        .await?
                }
            };
            match settled {
                Settled::Resolved(resolutions) => {
                    report.auto_resolved += 1;
                    report.resolutions.extend(resolutions);
                }
                Settled::Escalated(id) => {
                    report.escalated += 1;
                    report.escalations.push(id);
                }
            }
        }

        obs::emit_cycle_finished(report.components, report.auto_resolved, report.escalated);
        Ok(report)
    }

    /// Decide every component on worker tasks; results keep component order.
    ///
    /// A component whose decision errors or whose task panics comes back
    /// as `Err(detail)`; the other components are unaffected.
    async fn decide_all(
        &self,
        snapshot: Arc<ResourceSnapshot>,
        components: Vec<ConflictComponent>,
        traces: &[TraceId],
    ) -> Result<Vec<(ConflictComponent, std::result::Result<Decision, String>)>> {
        let mut tasks: Vec<(ConflictComponent, JoinHandle<ArbitrationResult<Decision>>)> =
            Vec::with_capacity(components.len());

        for (component, trace) in components.into_iter().zip(traces) {
            let permit = Arc::clone(&self.workers)
                .acquire_owned()
                .await
                .map_err(|e| ArbitrationError::Worker(e.to_string()))?;
            let engine = Arc::clone(&self.engine);
            let snapshot = Arc::clone(&snapshot);
            let trace = trace.clone();
            let job = component.clone();
            let task = tokio::spawn(async move {
                let _permit = permit;
                let _span = obs::TraceSpan::enter(trace.as_str(), job.proposals.len());
                engine.decide(&snapshot, &job)
            });
            tasks.push((component, task));
        }

        let mut out = Vec::with_capacity(tasks.len());
        for (component, task) in tasks {
            let decided = match task.await {
                Ok(Ok(decision)) => Ok(decision),
                Ok(Err(err)) => Err(err.to_string()),
                Err(join) => Err(ArbitrationError::Worker(join.to_string()).to_string()),
            };
            out.push((component, decided));
        }
        Ok(out)
    }

    /// Park a component the engine could not decide with the orchestrator's
    /// own audience. Nothing is reserved for it.
    async fn escalate_undecided(
        &self,
        component: &ConflictComponent,
        detail: String,
        trace: &TraceId,
        now: DateTime<Utc>,
    ) -> Result<Settled> {
        warn!(
            trace_id = %trace,
            proposals = component.proposals.len(),
            error = %detail,
            "decision failed; escalating component"
        );
        let decision = Decision::undecided(component);
        let reasons = vec![EscalationReason::DecisionFailed { detail }];
        let id = self
            .open_escalation(
                component,
                &decision,
                Audience::OrchestratorInternal,
                reasons,
                trace,
                now,
            )
            .await?;
        Ok(Settled::Escalated(id))
    }

    /// Route one decided component and either commit it or escalate it,
    /// retrying against fresh state when a commit loses a race.
    async fn settle(
        &self,
        mut component: ConflictComponent,
        mut decision: Decision,
        trace: &TraceId,
        expected: &mut BTreeMap<ResourceId, u64>,
        report: &mut CycleReport,
        now: DateTime<Utc>,
    ) -> Result<Settled> {
        let mut attempt: u32 = 0;
        loop {
            let (audience, reasons) = match self.router.route(&component, &decision) {
                Routing::Escalate { audience, reasons } => (audience, reasons),
                Routing::Auto => {
                    let placements = decision.proposed_placements().unwrap_or_default();
                    let requests = reservation_requests(&component.proposals, placements);
                    let guard: BTreeMap<ResourceId, u64> = component
                        .resources()
                        .into_iter()
                        .filter_map(|id| expected.get(&id).map(|v| (id, *v)))
                        .collect();
                    let failure = match self.resources.reserve_all(&requests, Some(&guard)) {
                        Ok(CommitOutcome::Committed {
                            reservations,
                            versions,
                        }) => {
                            expected.extend(versions);
                            if let Err(err) =
                                self.record_commit(&decision, trace, &reservations, now).await
                            {
                                self.roll_back_commit(trace, &reservations);
                                return Err(err);
                            }
                            let resolutions = self.finalize_auto(&decision, trace, now).await?;
                            return Ok(Settled::Resolved(resolutions));
                        }
                        Ok(CommitOutcome::Refused {
                            resource_id,
                            outcome,
                            ..
                        }) => format!("{resource_id}: {outcome}"),
                        Err(err @ ResourceError::StaleSnapshot { .. }) => err.to_string(),
                        Err(err) => return Err(err.into()),
                    };

                    attempt += 1;
                    report.commit_retries += 1;
                    METRICS.inc_commit_retries();
                    obs::emit_commit_retry(trace.as_str(), attempt, &failure);
                    if attempt > self.config.max_commit_retries {
                        warn!(trace_id = %trace, attempts = attempt, "giving up on commit");
                        let reasons = vec![EscalationReason::CommitFailed { detail: failure }];
                        (Audience::OrchestratorInternal, reasons)
                    } else {
                        let fresh = self.resources.snapshot();
                        expected.extend(fresh.versions_for(&component.resources()));
                        component.conflicts = ConflictDetector::detect(&fresh, &component.proposals);
                        decision = self.engine.decide(&fresh, &component)?;
                        continue;
                    }
                }
            };

            let id = self
                .open_escalation(&component, &decision, audience, reasons, trace, now)
                .await?;
            return Ok(Settled::Escalated(id));
        }
    }

    /// Write the audit entries for a commit before any proposal moves, so a
    /// ledger failure leaves nothing but the reservations to undo.
    async fn record_commit(
        &self,
        decision: &Decision,
        trace: &TraceId,
        reservations: &[Reservation],
        now: DateTime<Utc>,
    ) -> Result<()> {
        for r in reservations {
            self.record(
                trace.clone(),
                EntryKind::ReservationCommitted,
                r.id.to_string(),
                r,
                now,
            )
            .await?;
        }
        for res in &decision.resolutions {
            self.record(
                trace.clone(),
                EntryKind::ResolutionDecided,
                res.proposal_id.as_str(),
                res,
                now,
            )
            .await?;
        }
        Ok(())
    }

    /// Undo a commit whose audit entries could not be written. The
    /// component's proposals are still `UnderEvaluation` and go back to the
    /// next cycle.
    fn roll_back_commit(&self, trace: &TraceId, reservations: &[Reservation]) {
        warn!(
            trace_id = %trace,
            reservations = reservations.len(),
            "audit write failed after commit; releasing reservations"
        );
        for r in reservations {
            if let Err(err) = self.resources.release(r.id) {
                warn!(reservation_id = %r.id, error = %err, "rollback release failed");
            }
        }
    }

    async fn finalize_auto(
        &self,
        decision: &Decision,
        trace: &TraceId,
        now: DateTime<Utc>,
    ) -> Result<Vec<Resolution>> {
        let chosen = decision
            .chosen()
            .map(|c| c.candidate.label.as_str())
            .unwrap_or_default();
        for res in &decision.resolutions {
            let state = if res.is_rejected() {
                ProposalState::Rejected
            } else {
                ProposalState::AutoApproved
            };
            self.announce_resolution(trace, res, state, now).await?;
            obs::emit_resolution(
                trace.as_str(),
                res.proposal_id.as_str(),
                &res.outcome.to_string(),
                chosen,
            );
        }
        METRICS.inc_auto_resolved();
        Ok(decision.resolutions.clone())
    }

    /// Record a resolution, move the proposal to `state` and tell subscribers.
    async fn publish_resolution(
        &self,
        trace: &TraceId,
        resolution: &Resolution,
        state: ProposalState,
        now: DateTime<Utc>,
    ) -> Result<()> {
        self.record(
            trace.clone(),
            EntryKind::ResolutionDecided,
            resolution.proposal_id.as_str(),
            resolution,
            now,
        )
        .await?;
        self.announce_resolution(trace, resolution, state, now).await
    }

    async fn announce_resolution(
        &self,
        trace: &TraceId,
        resolution: &Resolution,
        state: ProposalState,
        now: DateTime<Utc>,
    ) -> Result<()> {
        if let Some(sp) = self.store.get(&resolution.proposal_id) {
            self.transition(&sp, state, now).await?;
        }
        self.events.publish(ArbiterEvent::Resolution {
            trace_id: trace.clone(),
            resolution: resolution.clone(),
            state,
            at: now,
        });
        Ok(())
    }

    async fn open_escalation(
        &self,
        component: &ConflictComponent,
        decision: &Decision,
        audience: Audience,
        reasons: Vec<EscalationReason>,
        trace: &TraceId,
        now: DateTime<Utc>,
    ) -> Result<EscalationId> {
        let current_state: BTreeMap<ProposalId, ProposalState> = component
            .proposals
            .iter()
            .filter_map(|p| self.store.state(p.id()).map(|s| (p.id().clone(), s)))
            .collect();
        let escalation = self.router.build(
            component,
            decision,
            audience,
            reasons,
            trace.clone(),
            current_state,
            now,
        );
        for sp in &component.proposals {
            self.transition(sp, ProposalState::Escalated, now).await?;
        }
        self.file_escalation(escalation, now).await
    }

    /// Record, index and announce an escalation.
    async fn file_escalation(
        &self,
        escalation: Escalation,
        now: DateTime<Utc>,
    ) -> Result<EscalationId> {
        let id = escalation.id;
        self.record(
            escalation.trace_id.clone(),
            EntryKind::Escalated,
            id.to_string(),
            &escalation,
            now,
        )
        .await?;

        METRICS.inc_escalated();
        obs::emit_escalated(
            escalation.trace_id.as_str(),
            &id.to_string(),
            &escalation.audience.to_string(),
            escalation.reasons.len(),
        );
        self.escalations.lock().await.insert(escalation.clone());
        self.events.publish(ArbiterEvent::Escalation {
            escalation: Box::new(escalation),
        });
        Ok(id)
    }

    /// Pick the component's trace (its earliest proposal's) and merge the
    /// other members' traces into it.
    async fn adopt_component_trace(
        &self,
        component: &ConflictComponent,
        now: DateTime<Utc>,
    ) -> Result<TraceId> {
        let Some(anchor) = component.anchor() else {
            return Ok(TraceId::new());
        };
        let target = self.canonical(&anchor.trace_id);

        for sp in &component.proposals {
            let absorbed = self.canonical(&sp.trace_id);
            if absorbed == target {
                continue;
            }
            self.merged_traces
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(absorbed.clone(), target.clone());
            self.ledger
                .append(NewEntry::trace_merged(target.clone(), &absorbed, now))
                .await?;
        }

        for c in &component.conflicts {
            obs::emit_conflict_detected(
                target.as_str(),
                &c.kind.to_string(),
                c.resource_id.as_str(),
                c.proposal_ids.len(),
            );
            self.record(
                target.clone(),
                EntryKind::ConflictDetected,
                c.resource_id.as_str(),
                c,
                now,
            )
            .await?;
        }
        Ok(target)
    }

    fn canonical(&self, trace: &TraceId) -> TraceId {
        let merged = self
            .merged_traces
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let mut current = trace;
        // Only roots are ever linked, so the walk terminates.
        while let Some(next) = merged.get(current) {
            current = next;
        }
        current.clone()
    }

    /// Every ledger entry for `trace_id`, including merged traces, by seq.
    pub async fn get_trace(&self, trace_id: &TraceId) -> Result<Vec<LedgerEntry>> {
        let canonical = self.canonical(trace_id);
        Ok(self.ledger.get_trace(&canonical).await?)
    }

    async fn transition(
        &self,
        sp: &StoredProposal,
        to: ProposalState,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let from = self.store.transition(sp.id(), to)?;
        self.record(
            self.canonical(&sp.trace_id),
            EntryKind::StateTransition,
            sp.id().as_str(),
            &serde_json::json!({ "from": from, "to": to }),
            now,
        )
        .await?;
        Ok(())
    }

    async fn record<T: Serialize + ?Sized>(
        &self,
        trace: TraceId,
        kind: EntryKind,
        subject: impl Into<String>,
        payload: &T,
        now: DateTime<Utc>,
    ) -> Result<LedgerEntry> {
        let payload = serde_json::to_value(payload)?;
        Ok(self
            .ledger
            .append(NewEntry::new(trace, kind, subject, payload, now))
            .await?)
    }

    /// Stop taking reservations, flush metrics and report what is held.
    pub async fn shutdown(&self) -> DrainReport {
        let _cycle = self.cycle.lock().await;
        let report = self.resources.shutdown();
        METRICS.flush();
        info!(
            proposals = self.store.len(),
            reservations = report.reservations,
            locks = report.locks,
            "orchestrator shut down"
        );
        report
    }
}

/// One request per placed proposal and target resource.
fn reservation_requests(
    proposals: &[StoredProposal],
    placements: &[Placement],
) -> Vec<ReservationRequest> {
    placements
        .iter()
        .filter(|pl| pl.outcome != Outcome::Rejected)
        .filter_map(|pl| {
            proposals
                .iter()
                .find(|sp| sp.id() == &pl.proposal_id)
                .map(|sp| (sp, pl))
        })
        .flat_map(|(sp, pl)| {
            pl.bookings(&sp.proposal)
                .into_iter()
                .map(|(resource_id, booking)| ReservationRequest {
                    resource_id,
                    booking,
                })
        })
        .collect()
}
