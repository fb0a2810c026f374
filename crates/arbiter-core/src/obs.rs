//! Structured observability hooks for the arbitration lifecycle.
//!
//! This module provides:
//! - Component-scoped tracing spans via the `TraceSpan` RAII guard
//! - Emission functions for submit, conflict, resolution, escalation and lock events
//!
//! Events are emitted at `info!` level unless noted; filter with `RUST_LOG`.

use tracing::{info, warn};

/// RAII guard that enters a span tagged with the audit trace id while one
/// conflict component is arbitrated.
///
/// # Example
///
/// ```ignore
/// let _span = TraceSpan::enter(&trace_id, 3);
/// // every event logged here carries trace_id and proposals = 3
/// ```
pub struct TraceSpan {
    _span: tracing::span::EnteredSpan,
}

impl TraceSpan {
    pub fn enter(trace_id: &str, proposals: usize) -> Self {
        let span = tracing::info_span!("arbiter.component", trace_id = %trace_id, proposals);
        Self {
            _span: span.entered(),
        }
    }
}

pub fn emit_proposal_submitted(proposal_id: &str, agent_id: &str, trace_id: &str) {
    info!(
        event = "proposal.submitted",
        proposal_id = %proposal_id,
        agent_id = %agent_id,
        trace_id = %trace_id,
    );
}

/// Warning level: a malformed proposal usually points at an agent bug.
pub fn emit_proposal_rejected(proposal_id: &str, reason: &str) {
    warn!(event = "proposal.rejected", proposal_id = %proposal_id, reason = %reason);
}

pub fn emit_conflict_detected(trace_id: &str, kind: &str, resource_id: &str, proposals: usize) {
    info!(
        event = "conflict.detected",
        trace_id = %trace_id,
        kind = %kind,
        resource_id = %resource_id,
        proposals = proposals,
    );
}

pub fn emit_resolution(trace_id: &str, proposal_id: &str, outcome: &str, candidate: &str) {
    info!(
        event = "resolution.decided",
        trace_id = %trace_id,
        proposal_id = %proposal_id,
        outcome = %outcome,
        candidate = %candidate,
    );
}

pub fn emit_escalated(trace_id: &str, escalation_id: &str, audience: &str, reasons: usize) {
    info!(
        event = "escalation.opened",
        trace_id = %trace_id,
        escalation_id = %escalation_id,
        audience = %audience,
        reasons = reasons,
    );
}

pub fn emit_escalation_closed(escalation_id: &str, status: &str, by: &str) {
    info!(
        event = "escalation.closed",
        escalation_id = %escalation_id,
        status = %status,
        by = %by,
    );
}

pub fn emit_lock_changed(lock_id: &str, resource_id: &str, active: bool) {
    info!(
        event = "lock.changed",
        lock_id = %lock_id,
        resource_id = %resource_id,
        active = active,
    );
}

/// Warning level: a commit lost a race and will be retried.
pub fn emit_commit_retry(trace_id: &str, attempt: u32, error: &dyn std::fmt::Display) {
    warn!(event = "commit.retry", trace_id = %trace_id, attempt = attempt, error = %error);
}

pub fn emit_cycle_finished(components: usize, auto_resolved: usize, escalated: usize) {
    info!(
        event = "cycle.finished",
        components = components,
        auto_resolved = auto_resolved,
        escalated = escalated,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trace_span_create() {
        let _span = TraceSpan::enter("trace-1", 2);
        emit_resolution("trace-1", "p-1", "approved", "as-requested");
    }
}
