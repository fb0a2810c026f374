//! Acceptance scenarios run end to end through the orchestrator.

mod common;

use arbiter_core::{
    ArbiterError, ArbiterEvent, Audience, EscalationReason, LockRequest, LockScope, Outcome,
    ProposalId, ProposalState, ResourceId, RiskBand, SchemaError, TimeWindow,
};
use chrono::{DateTime, Duration, Utc};
use common::*;

#[tokio::test]
async fn test_forklift_and_foot_traffic_never_share_the_aisle() {
    let h = harness(vec![aisle("X")]);
    let mut events = h.orchestrator.subscribe();
    let (p1, p2) = forklift_and_walker();
    h.orchestrator.submit_proposal(p1, morning()).await.unwrap();
    h.orchestrator.submit_proposal(p2, morning()).await.unwrap();

    let report = h.orchestrator.run_cycle(morning()).await.unwrap();
    assert_eq!(report.conflicts, 1);
    assert_eq!(report.auto_resolved, 1);
    assert_eq!(report.escalated, 0);

    let outcome = |id: &str| {
        report
            .resolutions
            .iter()
            .find(|r| r.proposal_id.as_str() == id)
            .unwrap()
            .clone()
    };
    let p1 = outcome("P1");
    let p2 = outcome("P2");
    // Shifting the forklift costs less delay than shifting the walker.
    assert_eq!(p2.outcome, Outcome::Approved);
    assert_eq!(p1.outcome, Outcome::Deferred);
    assert_eq!(p1.window, window((9, 50), (10, 10)));
    assert!(!p1.window.overlaps(&p2.window));
    assert_eq!(p1.rationale.chosen, "prioritize:P2");

    let occupancy = h
        .model
        .query_occupancy(&ResourceId::from("X"), &window((9, 0), (11, 0)))
        .unwrap();
    assert_eq!(occupancy.len(), 2);
    assert!(!occupancy[0].booking.window.overlaps(&occupancy[1].booking.window));

    for id in ["P1", "P2"] {
        assert_eq!(
            h.orchestrator.proposal_state(&ProposalId::from(id)),
            Some(ProposalState::AutoApproved)
        );
    }

    let mut resolved = 0;
    while let Ok(event) = events.try_recv() {
        if let ArbiterEvent::Resolution { state, .. } = event {
            assert_eq!(state, ProposalState::AutoApproved);
            resolved += 1;
        }
    }
    assert_eq!(resolved, 2);
}

#[tokio::test]
async fn test_capacity_conflict_defers_lower_priority() {
    let h = harness(vec![arbiter_core::Resource::new(
        "B",
        arbiter_core::ResourceKind::EquipmentUnit,
        arbiter_core::Capacity::Units(10),
    )]);
    let w = window((9, 0), (9, 30));
    h.orchestrator
        .submit_proposal(proposal("lo", "B", w, 5).with_priority(2), morning())
        .await
        .unwrap();
    h.orchestrator
        .submit_proposal(proposal("hi", "B", w, 7).with_priority(8), morning())
        .await
        .unwrap();

    let report = h.orchestrator.run_cycle(morning()).await.unwrap();
    assert_eq!(report.auto_resolved, 1);

    let hi = h.model.reservations_for_proposal(&ProposalId::from("hi"));
    let lo = h.model.reservations_for_proposal(&ProposalId::from("lo"));
    assert_eq!(hi.len(), 1);
    assert_eq!(lo.len(), 1);
    assert_eq!(hi[0].booking.window, w);
    assert!(!lo[0].booking.window.overlaps(&w));

    let lo_res = report
        .resolutions
        .iter()
        .find(|r| r.proposal_id.as_str() == "lo")
        .unwrap();
    assert_eq!(lo_res.outcome, Outcome::Deferred);
    assert!(lo_res.display_score.is_some());
}

#[tokio::test]
async fn test_locked_window_is_escalated_with_lock_id() {
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

    h.orchestrator
        .submit_proposal(proposal("L", "Y", window((10, 10), (10, 20)), 1), morning())
        .await
        .unwrap();
    let report = h.orchestrator.run_cycle(morning()).await.unwrap();
    assert_eq!(report.escalated, 1);
    assert!(report.resolutions.is_empty());

    let esc = h
        .orchestrator
        .escalation(&report.escalations[0])
        .await
        .unwrap();
    assert_eq!(esc.audience, Audience::Planner);
    assert!(esc
        .reasons
        .contains(&EscalationReason::LockInvolved { lock_id: lock.id }));
    assert_eq!(
        h.orchestrator.proposal_state(&ProposalId::from("L")),
        Some(ProposalState::Escalated)
    );
    assert!(h
        .model
        .reservations_for_proposal(&ProposalId::from("L"))
        .is_empty());
}

#[tokio::test]
async fn test_three_way_conflict_escalates_to_planner() {
    let h = harness(vec![dock("D")]);
    let w = window((9, 0), (9, 30));
    for id in ["a", "b", "c"] {
        h.orchestrator
            .submit_proposal(proposal(id, "D", w, 1), morning())
            .await
            .unwrap();
    }

    let report = h.orchestrator.run_cycle(morning()).await.unwrap();
    assert_eq!(report.components, 1);
    assert_eq!(report.escalated, 1);

    let esc = h
        .orchestrator
        .escalation(&report.escalations[0])
        .await
        .unwrap();
    assert_eq!(esc.audience, Audience::Planner);
    assert!(esc.reasons.contains(&EscalationReason::TooManyProposals {
        count: 3,
        limit: 2
    }));
    // The last-ranked proposal waits an hour: medium SLA exposure.
    assert!(esc
        .reasons
        .iter()
        .any(|r| matches!(r, EscalationReason::SlaRisk { .. })));
    assert_eq!(esc.payload.agents.len(), 3);
    assert!(!esc.payload.alternatives.is_empty());
    assert!(esc.proposed.is_some());
    assert_eq!(esc.deadline, morning() + chrono::Duration::seconds(900));
}

#[tokio::test]
async fn test_unrelated_proposals_resolve_independently() {
    let h = harness(vec![aisle("X"), dock("D")]);
    let (p1, p2) = forklift_and_walker();
    h.orchestrator.submit_proposal(p1, morning()).await.unwrap();
    h.orchestrator.submit_proposal(p2, morning()).await.unwrap();
    h.orchestrator
        .submit_proposal(proposal("solo", "D", window((9, 0), (9, 15)), 1), morning())
        .await
        .unwrap();

    let report = h.orchestrator.run_cycle(morning()).await.unwrap();
    assert_eq!(report.components, 2);
    assert_eq!(report.auto_resolved, 2);
    let solo = report
        .resolutions
        .iter()
        .find(|r| r.proposal_id.as_str() == "solo")
        .unwrap();
    assert_eq!(solo.outcome, Outcome::Approved);
}

#[tokio::test]
async fn test_same_inputs_same_resolutions() {
    let run = || async {
        let h = harness(vec![dock("D"), aisle("X")]);
        let w = window((9, 0), (9, 30));
        h.orchestrator
            .submit_proposal(proposal("a", "D", w, 1).with_priority(6), morning())
            .await
            .unwrap();
        h.orchestrator
            .submit_proposal(proposal("b", "D", w, 1).with_priority(6), morning())
            .await
            .unwrap();
        let (p1, p2) = forklift_and_walker();
        h.orchestrator.submit_proposal(p1, morning()).await.unwrap();
        h.orchestrator.submit_proposal(p2, morning()).await.unwrap();
        h.orchestrator.run_cycle(morning()).await.unwrap()
    };

    let first = run().await;
    let second = run().await;
    assert_eq!(first.resolutions, second.resolutions);
    assert_eq!(first.auto_resolved, second.auto_resolved);
    assert_eq!(first.escalated, second.escalated);
}

#[tokio::test]
async fn test_empty_cycle_is_a_no_op() {
    let h = harness(vec![aisle("X")]);
    let report = h.orchestrator.run_cycle(morning()).await.unwrap();
    assert_eq!(report, arbiter_core::CycleReport::default());
}

#[tokio::test]
async fn test_tight_deadline_escalates_to_planner_while_neighbour_resolves() {
    let h = harness(vec![dock("D"), dock("D2")]);
    let w = window((9, 0), (9, 30));
    h.orchestrator
        .submit_proposal(
            proposal("a", "D", w, 1).with_priority(5).with_sla_deadline(at(12, 0)),
            morning(),
        )
        .await
        .unwrap();
    h.orchestrator
        .submit_proposal(
            proposal("b", "D", w, 1).with_priority(5).with_sla_deadline(at(10, 40)),
            morning(),
        )
        .await
        .unwrap();
    let short = window((9, 0), (9, 5));
    h.orchestrator
        .submit_proposal(proposal("x", "D2", short, 1).with_priority(6), morning())
        .await
        .unwrap();
    h.orchestrator
        .submit_proposal(proposal("y", "D2", short, 1).with_priority(5), morning())
        .await
        .unwrap();

    let report = h.orchestrator.run_cycle(morning()).await.unwrap();
    assert_eq!(report.components, 2);
    assert_eq!(report.auto_resolved, 1);
    assert_eq!(report.escalated, 1);

    // Five minutes for a priority-5 task without a deadline stays low risk.
    let y = report
        .resolutions
        .iter()
        .find(|r| r.proposal_id.as_str() == "y")
        .unwrap();
    assert_eq!(y.outcome, Outcome::Deferred);
    assert_eq!(y.window, window((9, 5), (9, 10)));

    // Whichever of a and b waits, the best plan leaves b 70 minutes of slack
    // on a 120 minute horizon.
    let esc = h
        .orchestrator
        .escalation(&report.escalations[0])
        .await
        .unwrap();
    assert_eq!(esc.audience, Audience::Planner);
    assert!(esc.reasons.iter().any(|r| matches!(
        r,
        EscalationReason::SlaRisk {
            band: RiskBand::High,
            ..
        }
    )));
    assert!(!esc
        .reasons
        .iter()
        .any(|r| matches!(r, EscalationReason::SafetyRisk { .. })));
    assert_eq!(esc.payload.risk.sla_band, RiskBand::High);
    let proposed = esc.proposed.as_ref().unwrap();
    assert!(proposed
        .iter()
        .any(|r| r.proposal_id.as_str() == "a" && r.window == window((9, 30), (10, 0))));
    for id in ["a", "b"] {
        assert_eq!(
            h.orchestrator.proposal_state(&ProposalId::from(id)),
            Some(ProposalState::Escalated)
        );
    }
    for id in ["x", "y"] {
        assert_eq!(
            h.orchestrator.proposal_state(&ProposalId::from(id)),
            Some(ProposalState::AutoApproved)
        );
    }
}

#[tokio::test]
async fn test_end_of_time_windows_do_not_stall_other_conflicts() {
    let h = harness(vec![dock("D1"), dock("D2")]);
    let max = DateTime::<Utc>::MAX_UTC;
    let far = TimeWindow::new(max - Duration::minutes(30), max - Duration::minutes(10));
    for id in ["FAR1", "FAR2"] {
        let err = h
            .orchestrator
            .submit_proposal(proposal(id, "D1", far, 1), morning())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ArbiterError::Schema(SchemaError::BeyondHorizon { .. })
        ));
    }

    let w = window((9, 0), (9, 30));
    h.orchestrator
        .submit_proposal(proposal("A", "D2", w, 1).with_priority(6), morning())
        .await
        .unwrap();
    h.orchestrator
        .submit_proposal(proposal("B", "D2", window((9, 20), (9, 30)), 1), morning())
        .await
        .unwrap();

    let report = h.orchestrator.run_cycle(morning()).await.unwrap();
    assert_eq!(report.components, 1);
    assert_eq!(report.auto_resolved, 1);
    assert_ne!(
        h.orchestrator.proposal_state(&ProposalId::from("A")),
        Some(ProposalState::UnderEvaluation)
    );
    assert_eq!(
        h.orchestrator.proposal_state(&ProposalId::from("FAR1")),
        None
    );
    // Nothing is left for a later cycle.
    let again = h.orchestrator.run_cycle(morning()).await.unwrap();
    assert_eq!(again.components, 0);
}
