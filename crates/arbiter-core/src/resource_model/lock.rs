//! Planner-set locks.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{ResourceId, TimeWindow};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LockId(pub Uuid);

impl LockId {
    pub fn new() -> Self {
        LockId(Uuid::new_v4())
    }
}

impl Default for LockId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for LockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Portion of a resource's time axis a lock covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "scope", rename_all = "snake_case")]
pub enum LockScope {
    Whole,
    Window { window: TimeWindow },
}

/// What a planner asks for when locking a resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LockRequest {
    pub resource_id: ResourceId,
    pub scope: LockScope,
    pub reason: String,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    pub set_by: String,
}

impl LockRequest {
    pub fn new(
        resource_id: ResourceId,
        scope: LockScope,
        reason: impl Into<String>,
        set_by: impl Into<String>,
    ) -> Self {
        Self {
            resource_id,
            scope,
            reason: reason.into(),
            expires_at: None,
            set_by: set_by.into(),
        }
    }

    pub fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }
}

/// An active lock. Takes precedence over every automated proposal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lock {
    pub id: LockId,
    pub resource_id: ResourceId,
    pub scope: LockScope,
    pub reason: String,
    /// Instants at or after expiry are no longer covered.
    pub expires_at: Option<DateTime<Utc>>,
    pub set_by: String,
    pub set_at: DateTime<Utc>,
}

impl Lock {
    pub fn from_request(request: LockRequest, set_at: DateTime<Utc>) -> Self {
        Self {
            id: LockId::new(),
            resource_id: request.resource_id,
            scope: request.scope,
            reason: request.reason,
            expires_at: request.expires_at,
            set_by: request.set_by,
            set_at,
        }
    }

    /// True when any instant of `window` falls inside the lock's effective scope.
    pub fn covers(&self, window: &TimeWindow) -> bool {
        if let Some(expiry) = self.expires_at {
            if window.start >= expiry {
                return false;
            }
        }
        match &self.scope {
            LockScope::Whole => true,
            LockScope::Window { window: locked } => {
                let effective_end = self
                    .expires_at
                    .map_or(locked.end, |expiry| locked.end.min(expiry));
                let effective = TimeWindow::new(locked.start, effective_end);
                !effective.is_empty() && effective.overlaps(window)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, h, m, 0).unwrap()
    }

    fn lock(scope: LockScope, expires_at: Option<DateTime<Utc>>) -> Lock {
        let mut req = LockRequest::new(ResourceId::from("Y"), scope, "spill cleanup", "planner-1");
        req.expires_at = expires_at;
        Lock::from_request(req, at(8, 0))
    }

    #[test]
    fn test_window_lock_covers_overlap_only() {
        let l = lock(
            LockScope::Window {
                window: TimeWindow::new(at(10, 0), at(10, 30)),
            },
            None,
        );
        assert!(l.covers(&TimeWindow::new(at(10, 15), at(10, 45))));
        assert!(!l.covers(&TimeWindow::new(at(10, 30), at(10, 45))));
        assert!(!l.covers(&TimeWindow::new(at(9, 30), at(10, 0))));
    }

    #[test]
    fn test_whole_lock_truncated_by_expiry() {
        let l = lock(LockScope::Whole, Some(at(12, 0)));
        assert!(l.covers(&TimeWindow::new(at(11, 50), at(12, 10))));
        assert!(!l.covers(&TimeWindow::new(at(12, 0), at(12, 10))));
    }

    #[test]
    fn test_window_lock_truncated_by_expiry() {
        let l = lock(
            LockScope::Window {
                window: TimeWindow::new(at(10, 0), at(11, 0)),
            },
            Some(at(10, 20)),
        );
        assert!(l.covers(&TimeWindow::new(at(10, 10), at(10, 40))));
        assert!(!l.covers(&TimeWindow::new(at(10, 20), at(10, 40))));
    }
}
