//! Registry of escalations, open and closed.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::domain::ProposalId;
use crate::resource_model::LockId;

use super::record::{Escalation, EscalationId};

#[derive(Debug, Default)]
pub struct EscalationBook {
    records: HashMap<EscalationId, Escalation>,
}

impl EscalationBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, escalation: Escalation) {
        self.records.insert(escalation.id, escalation);
    }

    pub fn get(&self, id: &EscalationId) -> Option<&Escalation> {
        self.records.get(id)
    }

    pub fn get_mut(&mut self, id: &EscalationId) -> Option<&mut Escalation> {
        self.records.get_mut(id)
    }

    /// Open escalations, oldest first.
    pub fn open(&self) -> Vec<&Escalation> {
        let mut open: Vec<&Escalation> = self.records.values().filter(|e| e.is_open()).collect();
        open.sort_by_key(|e| (e.opened_at, e.id));
        open
    }

    /// Open escalations whose deadline is at or before `now`, oldest first.
    pub fn due(&self, now: DateTime<Utc>) -> Vec<EscalationId> {
        self.open()
            .into_iter()
            .filter(|e| e.deadline <= now)
            .map(|e| e.id)
            .collect()
    }

    pub fn open_referencing_lock(&self, lock_id: &LockId) -> Vec<EscalationId> {
        self.open()
            .into_iter()
            .filter(|e| e.references_lock(lock_id))
            .map(|e| e.id)
            .collect()
    }

    pub fn open_for_proposal(&self, proposal_id: &ProposalId) -> Option<EscalationId> {
        self.open()
            .into_iter()
            .find(|e| e.includes(proposal_id))
            .map(|e| e.id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
