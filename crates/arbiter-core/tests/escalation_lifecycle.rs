//! Human responses, cancellation, expiry and lock revocation.

mod common;

use arbiter_core::{
    ArbiterConfig, ArbiterError, Audience, EscalationError, EscalationId, EscalationReason,
    EscalationResponse, EscalationStatus, LockId, LockRequest, LockScope, Outcome, ProposalId,
    ProposalState, ResourceId, TimeWindow,
};
use common::*;

/// Dock Y locked for [10:00, 10:30) and proposal L escalated because of it.
async fn locked_dock(scope: LockScope) -> (Harness, LockId, EscalationId) {
    let h = harness(vec![dock("Y")]);
    let lock = h
        .orchestrator
        .set_lock(
            LockRequest::new(ResourceId::from("Y"), scope, "door seal replacement", "planner-ana"),
            morning(),
        )
        .await
        .unwrap()
        .lock;
    h.orchestrator
        .submit_proposal(proposal("L", "Y", window((10, 10), (10, 20)), 1), morning())
        .await
        .unwrap();
    let report = h.orchestrator.run_cycle(morning()).await.unwrap();
    assert_eq!(report.escalated, 1);
    let id = report.escalations[0];
    (h, lock.id, id)
}

fn half_hour_lock() -> LockScope {
    LockScope::Window {
        window: window((10, 0), (10, 30)),
    }
}

fn state(h: &Harness, id: &str) -> Option<ProposalState> {
    h.orchestrator.proposal_state(&ProposalId::from(id))
}

#[tokio::test]
async fn test_approve_commits_proposed_resolution() {
    let (h, _, id) = locked_dock(half_hour_lock()).await;
    let esc = h.orchestrator.escalation(&id).await.unwrap();
    let proposed = esc.proposed.clone().unwrap();
    assert_eq!(proposed[0].window, window((10, 30), (10, 40)));

    let resolutions = h
        .orchestrator
        .respond_to_escalation(id, EscalationResponse::approve("planner-ana"), at(8, 5))
        .await
        .unwrap();
    assert_eq!(resolutions.len(), 1);
    assert_eq!(resolutions[0].outcome, Outcome::Deferred);
    assert_eq!(resolutions[0].display_score, None);
    assert_eq!(resolutions[0].rationale.chosen, "planner:approve");
    assert_eq!(state(&h, "L"), Some(ProposalState::PlannerApproved));

    let held = h.model.reservations_for_proposal(&ProposalId::from("L"));
    assert_eq!(held.len(), 1);
    assert_eq!(held[0].booking.window, window((10, 30), (10, 40)));

    let closed = h.orchestrator.escalation(&id).await.unwrap();
    assert_eq!(closed.status, EscalationStatus::Resolved);
    assert_eq!(closed.closure.unwrap().by, "planner-ana");
    assert!(h.orchestrator.open_escalations().await.is_empty());
}

#[tokio::test]
async fn test_modify_commits_planner_window() {
    let (h, _, id) = locked_dock(half_hour_lock()).await;
    let response = EscalationResponse::modify(
        "planner-ana",
        [(ProposalId::from("L"), window((11, 0), (11, 10)))],
    )
    .with_comment("dock crew free after eleven");

    let resolutions = h
        .orchestrator
        .respond_to_escalation(id, response, at(8, 5))
        .await
        .unwrap();
    assert_eq!(resolutions[0].outcome, Outcome::ApprovedModified);
    assert_eq!(resolutions[0].rationale.tradeoffs, "dock crew free after eleven");
    assert_eq!(state(&h, "L"), Some(ProposalState::PlannerModified));
    let held = h.model.reservations_for_proposal(&ProposalId::from("L"));
    assert_eq!(held[0].booking.window, window((11, 0), (11, 10)));
}

#[tokio::test]
async fn test_modify_into_lock_is_refused_and_stays_open() {
    let (h, _, id) = locked_dock(half_hour_lock()).await;
    let response = EscalationResponse::modify(
        "planner-ana",
        [(ProposalId::from("L"), window((10, 5), (10, 15)))],
    );

    let err = h
        .orchestrator
        .respond_to_escalation(id, response, at(8, 5))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ArbiterError::Escalation(EscalationError::CommitRefused { .. })
    ));
    assert_eq!(state(&h, "L"), Some(ProposalState::Escalated));
    assert!(h.orchestrator.escalation(&id).await.unwrap().is_open());
    assert!(h
        .model
        .reservations_for_proposal(&ProposalId::from("L"))
        .is_empty());
}

#[tokio::test]
async fn test_modify_rejects_foreign_or_empty_windows() {
    let (h, _, id) = locked_dock(half_hour_lock()).await;

    let foreign = EscalationResponse::modify(
        "planner-ana",
        [(ProposalId::from("other"), window((11, 0), (11, 10)))],
    );
    let err = h
        .orchestrator
        .respond_to_escalation(id, foreign, at(8, 5))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ArbiterError::Escalation(EscalationError::ForeignProposal { .. })
    ));

    let empty = EscalationResponse::modify("planner-ana", Vec::<(ProposalId, TimeWindow)>::new());
    let err = h
        .orchestrator
        .respond_to_escalation(id, empty, at(8, 5))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ArbiterError::Escalation(EscalationError::EmptyModification { .. })
    ));
    assert!(h.orchestrator.escalation(&id).await.unwrap().is_open());
}

#[tokio::test]
async fn test_reject_releases_nothing_and_closes() {
    let (h, _, id) = locked_dock(half_hour_lock()).await;
    let resolutions = h
        .orchestrator
        .respond_to_escalation(id, EscalationResponse::reject("planner-ana"), at(8, 5))
        .await
        .unwrap();
    assert!(resolutions[0].is_rejected());
    assert_eq!(state(&h, "L"), Some(ProposalState::PlannerRejected));
    assert_eq!(h.model.snapshot().resources[&ResourceId::from("Y")].reservations.len(), 0);

    let again = h
        .orchestrator
        .respond_to_escalation(id, EscalationResponse::approve("planner-ana"), at(8, 6))
        .await
        .unwrap_err();
    assert!(matches!(
        again,
        ArbiterError::Escalation(EscalationError::NotOpen { .. })
    ));
}

#[tokio::test]
async fn test_unresolvable_cannot_be_approved() {
    let (h, _, id) = locked_dock(LockScope::Whole).await;
    let esc = h.orchestrator.escalation(&id).await.unwrap();
    assert!(esc.proposed.is_none());
    assert!(esc.reasons.contains(&EscalationReason::UnresolvableSafely));

    let err = h
        .orchestrator
        .respond_to_escalation(id, EscalationResponse::approve("planner-ana"), at(8, 5))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ArbiterError::Escalation(EscalationError::NoProposedResolution { .. })
    ));
}

#[tokio::test]
async fn test_cancel_rejects_proposals() {
    let (h, _, id) = locked_dock(half_hour_lock()).await;
    let resolutions = h
        .orchestrator
        .cancel_escalation(id, "planner-ana", at(8, 5))
        .await
        .unwrap();
    assert_eq!(resolutions.len(), 1);
    assert_eq!(state(&h, "L"), Some(ProposalState::PlannerRejected));
    let esc = h.orchestrator.escalation(&id).await.unwrap();
    assert_eq!(esc.status, EscalationStatus::Cancelled);
}

#[tokio::test]
async fn test_unanswered_escalation_expires_conservatively() {
    let (h, _, id) = locked_dock(half_hour_lock()).await;

    let early = h.orchestrator.expire_due(at(8, 14)).await.unwrap();
    assert!(early.expired.is_empty());

    let report = h.orchestrator.expire_due(at(8, 15)).await.unwrap();
    assert_eq!(report.expired, vec![id]);
    assert!(report.upward.is_empty());
    assert_eq!(report.proposals, vec![ProposalId::from("L")]);
    assert_eq!(state(&h, "L"), Some(ProposalState::Expired));
    assert_eq!(
        h.orchestrator.escalation(&id).await.unwrap().status,
        EscalationStatus::Expired
    );
    assert!(h
        .model
        .reservations_for_proposal(&ProposalId::from("L"))
        .is_empty());
}

#[tokio::test]
async fn test_expired_safety_escalation_goes_upward_once() {
    let config = ArbiterConfig {
        min_confidence_for_auto: Some(0.9),
        ..ArbiterConfig::default()
    };
    let h = harness_with(config, vec![aisle("X")]);
    let (p1, p2) = forklift_and_walker();
    h.orchestrator
        .submit_proposal(p1.with_confidence(0.5), morning())
        .await
        .unwrap();
    h.orchestrator.submit_proposal(p2, morning()).await.unwrap();
    let cycle = h.orchestrator.run_cycle(morning()).await.unwrap();
    assert_eq!(cycle.escalated, 1);
    let first = cycle.escalations[0];

    let report = h.orchestrator.expire_due(at(8, 15)).await.unwrap();
    assert_eq!(report.expired, vec![first]);
    assert_eq!(report.upward.len(), 1);
    assert!(report.proposals.is_empty());
    assert_eq!(state(&h, "P1"), Some(ProposalState::Escalated));

    let upward = h.orchestrator.escalation(&report.upward[0]).await.unwrap();
    assert_eq!(upward.audience, Audience::SafetyTeam);
    assert_eq!(upward.parent, Some(first));
    assert_eq!(
        upward.reasons[0],
        EscalationReason::ExpiredUnanswered { previous: first }
    );
    assert_eq!(upward.deadline, at(8, 30));

    let second = h.orchestrator.expire_due(at(8, 30)).await.unwrap();
    assert!(second.upward.is_empty());
    assert_eq!(second.proposals.len(), 2);
    assert_eq!(state(&h, "P1"), Some(ProposalState::Expired));
    assert_eq!(state(&h, "P2"), Some(ProposalState::Expired));
}

#[tokio::test]
async fn test_lock_revocation_reevaluates_dependent_proposals() {
    let (h, lock_id, id) = locked_dock(half_hour_lock()).await;

    let revocation = h
        .orchestrator
        .clear_lock(lock_id, "planner-ana", at(8, 10))
        .await
        .unwrap();
    assert_eq!(revocation.superseded, vec![id]);
    assert_eq!(revocation.reevaluation.auto_resolved, 1);
    assert_eq!(
        h.orchestrator.escalation(&id).await.unwrap().status,
        EscalationStatus::Superseded
    );
    assert_eq!(state(&h, "L"), Some(ProposalState::AutoApproved));

    let held = h.model.reservations_for_proposal(&ProposalId::from("L"));
    assert_eq!(held[0].booking.window, window((10, 10), (10, 20)));
}

#[tokio::test]
async fn test_clearing_unknown_lock_fails() {
    let h = harness(vec![dock("Y")]);
    let err = h
        .orchestrator
        .clear_lock(LockId::new(), "planner-ana", morning())
        .await
        .unwrap_err();
    assert!(matches!(err, ArbiterError::Resource(_)));
}
