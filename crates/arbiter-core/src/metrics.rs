//! Global atomic counters for arbitration.
//!
//! Counters are incremented silently at the call site. Call
//! [`Metrics::flush`] to emit current values as a single
//! `tracing::info!` event (e.g. at shutdown).

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

pub struct Metrics {
    proposals_submitted: AtomicU64,
    proposals_rejected: AtomicU64,
    conflicts_detected: AtomicU64,
    auto_resolved: AtomicU64,
    escalated: AtomicU64,
    commit_retries: AtomicU64,
    escalations_expired: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            proposals_submitted: AtomicU64::new(0),
            proposals_rejected: AtomicU64::new(0),
            conflicts_detected: AtomicU64::new(0),
            auto_resolved: AtomicU64::new(0),
            escalated: AtomicU64::new(0),
            commit_retries: AtomicU64::new(0),
            escalations_expired: AtomicU64::new(0),
        }
    }

    pub fn inc_submitted(&self) {
        self.proposals_submitted.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "proposals_submitted", "counter incremented");
    }

    pub fn inc_rejected(&self) {
        self.proposals_rejected.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "proposals_rejected", "counter incremented");
    }

    pub fn add_conflicts(&self, n: u64) {
        self.conflicts_detected.fetch_add(n, Ordering::Relaxed);
        tracing::trace!(metric = "conflicts_detected", n, "counter incremented");
    }

    pub fn inc_auto_resolved(&self) {
        self.auto_resolved.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "auto_resolved", "counter incremented");
    }

    pub fn inc_escalated(&self) {
        self.escalated.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "escalated", "counter incremented");
    }

    pub fn inc_commit_retries(&self) {
        self.commit_retries.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "commit_retries", "counter incremented");
    }

    pub fn inc_expired(&self) {
        self.escalations_expired.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "escalations_expired", "counter incremented");
    }

    /// Emit all current counter values as a single `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            proposals_submitted = self.proposals_submitted(),
            proposals_rejected = self.proposals_rejected(),
            conflicts_detected = self.conflicts_detected(),
            auto_resolved = self.auto_resolved(),
            escalated = self.escalated(),
            commit_retries = self.commit_retries(),
            escalations_expired = self.escalations_expired(),
        );
    }

    pub fn proposals_submitted(&self) -> u64 {
        self.proposals_submitted.load(Ordering::Relaxed)
    }

    pub fn proposals_rejected(&self) -> u64 {
        self.proposals_rejected.load(Ordering::Relaxed)
    }

    pub fn conflicts_detected(&self) -> u64 {
        self.conflicts_detected.load(Ordering::Relaxed)
    }

    pub fn auto_resolved(&self) -> u64 {
        self.auto_resolved.load(Ordering::Relaxed)
    }

    pub fn escalated(&self) -> u64 {
        self.escalated.load(Ordering::Relaxed)
    }

    pub fn commit_retries(&self) -> u64 {
        self.commit_retries.load(Ordering::Relaxed)
    }

    pub fn escalations_expired(&self) -> u64 {
        self.escalations_expired.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        for counter in [
            &self.proposals_submitted,
            &self.proposals_rejected,
            &self.conflicts_detected,
            &self.auto_resolved,
            &self.escalated,
            &self.commit_retries,
            &self.escalations_expired,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}
