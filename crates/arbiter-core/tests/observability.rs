//! Structured tracing for the arbitration lifecycle.
//!
//! `#[traced_test]` captures every span and event; `logs_contain` checks
//! that the lifecycle hooks fired with their identifying fields.

mod common;

use arbiter_core::obs::{
    emit_commit_retry, emit_conflict_detected, emit_escalated, emit_proposal_rejected,
    TraceSpan,
};
use arbiter_core::METRICS;
use common::*;
use tracing_test::traced_test;

#[traced_test]
#[test]
fn test_conflict_event_carries_trace_and_kind() {
    emit_conflict_detected("trace-7", "exclusivity", "X", 2);
    assert!(logs_contain("conflict.detected"));
    assert!(logs_contain("trace-7"));
    assert!(logs_contain("exclusivity"));
}

#[traced_test]
#[test]
fn test_rejection_and_retry_are_warnings() {
    emit_proposal_rejected("p-1", "quantity must be positive");
    emit_commit_retry("trace-8", 2, &"stale snapshot");
    assert!(logs_contain("WARN"));
    assert!(logs_contain("quantity must be positive"));
    assert!(logs_contain("stale snapshot"));
}

#[traced_test]
#[test]
fn test_component_span_wraps_events() {
    {
        let _span = TraceSpan::enter("trace-9", 3);
        emit_escalated("trace-9", "esc-1", "planner", 2);
    }
    assert!(logs_contain("arbiter.component"));
    assert!(logs_contain("escalation.opened"));
}

#[tokio::test]
#[traced_test]
async fn test_cycle_logs_resolution_and_counts() {
    let h = harness(vec![aisle("X")]);
    let (p1, p2) = forklift_and_walker();
    h.orchestrator.submit_proposal(p1, morning()).await.unwrap();
    h.orchestrator.submit_proposal(p2, morning()).await.unwrap();

    let before = METRICS.auto_resolved();
    h.orchestrator.run_cycle(morning()).await.unwrap();

    assert!(METRICS.auto_resolved() > before);
    assert!(logs_contain("proposal.submitted"));
    assert!(logs_contain("resolution.decided"));
    assert!(logs_contain("cycle.finished"));
}
