//! Audit ledger coverage: every decision is reconstructible from one trace.

mod common;

use std::sync::Arc;

use arbiter_core::{
    ArbiterConfig, ArbiterError, AuditLedger, EntryKind, LedgerEntry, LockRequest, LockScope,
    Orchestrator, ProposalId, ProposalState, ResourceId, ResourceModel, SchemaError, TraceId,
};
use arbiter_ledger::fakes::FlakyAuditLedger;
use arbiter_ledger::SurrealAuditLedger;
use common::*;

fn count(entries: &[LedgerEntry], kind: EntryKind) -> usize {
    entries.iter().filter(|e| e.kind == kind).count()
}

#[tokio::test]
async fn test_conflicting_proposals_share_one_trace() {
    let h = harness(vec![aisle("X")]);
    let (p1, p2) = forklift_and_walker();
    let first = h.orchestrator.submit_proposal(p1, morning()).await.unwrap();
    let second = h.orchestrator.submit_proposal(p2, morning()).await.unwrap();
    assert_ne!(first.trace_id, second.trace_id);

    h.orchestrator.run_cycle(morning()).await.unwrap();

    // The earliest submission's trace absorbs the other.
    let p2_trace = h.orchestrator.trace_of(&ProposalId::from("P2")).unwrap();
    assert_eq!(p2_trace, first.trace_id);

    let trace = h.orchestrator.get_trace(&second.trace_id).await.unwrap();
    assert_eq!(count(&trace, EntryKind::ProposalSubmitted), 2);
    assert_eq!(count(&trace, EntryKind::TraceMerged), 1);
    assert_eq!(count(&trace, EntryKind::ConflictDetected), 1);
    assert_eq!(count(&trace, EntryKind::ResolutionDecided), 2);
    assert_eq!(count(&trace, EntryKind::ReservationCommitted), 2);
    assert_eq!(count(&trace, EntryKind::StateTransition), 4);
    assert!(trace.windows(2).all(|w| w[0].seq < w[1].seq));

    let verified = h.ledger.verify_chain().await.unwrap();
    assert_eq!(verified, h.ledger.count().await.unwrap());
}

#[tokio::test]
async fn test_schema_rejection_is_logged_not_queued() {
    let h = harness(vec![aisle("X")]);
    let bad = proposal("bad", "X", window((9, 0), (9, 30)), 0);

    let err = h
        .orchestrator
        .submit_proposal(bad, morning())
        .await
        .unwrap_err();
    assert!(matches!(err, ArbiterError::Schema(SchemaError::ZeroQuantity)));
    assert!(h.orchestrator.proposals().get(&ProposalId::from("bad")).is_none());

    let entries = h.ledger.entries().await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].kind, EntryKind::ProposalRejected);
    assert_eq!(entries[0].subject, "bad");
    assert!(entries[0].payload["reason"].is_string());
}

#[tokio::test]
async fn test_unknown_resource_is_rejected() {
    let h = harness(vec![aisle("X")]);
    let err = h
        .orchestrator
        .submit_proposal(proposal("p", "nowhere", window((9, 0), (9, 30)), 1), morning())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ArbiterError::Schema(SchemaError::UnknownResource { .. })
    ));
}

#[tokio::test]
async fn test_escalation_history_stays_on_the_trace() {
    let h = harness(vec![dock("Y")]);
    let lock = h
        .orchestrator
        .set_lock(
            LockRequest::new(
                ResourceId::from("Y"),
                LockScope::Window {
                    window: window((10, 0), (10, 30)),
                },
                "door seal replacement",
                "planner-ana",
            ),
            morning(),
        )
        .await
        .unwrap()
        .lock;
    let stored = h
        .orchestrator
        .submit_proposal(proposal("L", "Y", window((10, 10), (10, 20)), 1), morning())
        .await
        .unwrap();
    h.orchestrator.run_cycle(morning()).await.unwrap();
    h.orchestrator.expire_due(at(9, 0)).await.unwrap();

    let trace = h.orchestrator.get_trace(&stored.trace_id).await.unwrap();
    let kinds: Vec<EntryKind> = trace.iter().map(|e| e.kind).collect();
    let escalated = kinds.iter().position(|k| *k == EntryKind::Escalated).unwrap();
    let expired = kinds
        .iter()
        .position(|k| *k == EntryKind::EscalationExpired)
        .unwrap();
    assert!(escalated < expired);
    assert_eq!(kinds.last(), Some(&EntryKind::StateTransition));

    let lock_trace = h
        .orchestrator
        .get_trace(&TraceId(format!("lock-{}", lock.id)))
        .await
        .unwrap();
    assert_eq!(lock_trace.len(), 1);
    assert_eq!(lock_trace[0].kind, EntryKind::LockSet);
}

#[tokio::test]
async fn test_orchestrator_on_surreal_ledger() {
    let model = Arc::new(ResourceModel::with_resources(vec![aisle("X")]).unwrap());
    let ledger = Arc::new(SurrealAuditLedger::in_memory().await.unwrap());
    let orchestrator = Orchestrator::new(ArbiterConfig::default(), model, ledger.clone()).unwrap();

    let (p1, p2) = forklift_and_walker();
    orchestrator.submit_proposal(p1, morning()).await.unwrap();
    let second = orchestrator.submit_proposal(p2, morning()).await.unwrap();
    let report = orchestrator.run_cycle(morning()).await.unwrap();
    assert_eq!(report.auto_resolved, 1);

    let trace = orchestrator.get_trace(&second.trace_id).await.unwrap();
    assert_eq!(count(&trace, EntryKind::ResolutionDecided), 2);
    assert!(ledger.verify_chain().await.unwrap() > 0);
}

#[tokio::test]
async fn test_failed_commit_audit_releases_reservations() {
    let model = Arc::new(ResourceModel::with_resources(vec![aisle("X")]).unwrap());
    let ledger = Arc::new(FlakyAuditLedger::failing_once_on(
        EntryKind::ReservationCommitted,
    ));
    let orchestrator =
        Orchestrator::new(ArbiterConfig::default(), model.clone(), ledger.clone()).unwrap();

    let (p1, p2) = forklift_and_walker();
    orchestrator.submit_proposal(p1, morning()).await.unwrap();
    orchestrator.submit_proposal(p2, morning()).await.unwrap();

    let err = orchestrator.run_cycle(morning()).await.unwrap_err();
    assert!(matches!(err, ArbiterError::Ledger(_)));
    assert!(ledger.tripped());
    for id in ["P1", "P2"] {
        let id = ProposalId::from(id);
        assert!(model.reservations_for_proposal(&id).is_empty());
        assert_eq!(
            orchestrator.proposal_state(&id),
            Some(ProposalState::UnderEvaluation)
        );
    }

    // The next cycle arbitrates the same component from scratch.
    let report = orchestrator.run_cycle(morning()).await.unwrap();
    assert_eq!(report.auto_resolved, 1);
    assert_eq!(report.escalated, 0);
    for id in ["P1", "P2"] {
        let id = ProposalId::from(id);
        assert_eq!(model.reservations_for_proposal(&id).len(), 1);
        assert_eq!(
            orchestrator.proposal_state(&id),
            Some(ProposalState::AutoApproved)
        );
    }
    let entries = ledger.entries().await.unwrap();
    assert_eq!(count(&entries, EntryKind::ReservationCommitted), 2);
    assert_eq!(count(&entries, EntryKind::ResolutionDecided), 2);
}
