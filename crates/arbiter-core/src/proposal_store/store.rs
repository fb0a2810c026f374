//! Validated, immutable store of agent proposals.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use tracing::debug;

use arbiter_ledger::TraceId;

use crate::domain::{Proposal, ProposalId, StoredProposal};
use crate::escalation::error::{EscalationError, EscalationResult};
use crate::escalation::state::ProposalState;
use crate::resource_model::ResourceCatalog;

use super::error::SchemaError;
use super::validate::validate_proposal;

#[derive(Debug, Default)]
struct StoreInner {
    proposals: HashMap<ProposalId, StoredProposal>,
    states: HashMap<ProposalId, ProposalState>,
    next_seq: u64,
}

/// Owns every accepted proposal for its whole lifecycle.
///
/// Stored proposals are never mutated or removed; only the lifecycle state
/// next to them moves, and only along legal transitions.
#[derive(Debug, Default)]
pub struct ProposalStore {
    inner: RwLock<StoreInner>,
}

impl ProposalStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, StoreInner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, StoreInner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Validate and accept a proposal, assigning its sequence number and trace.
    pub fn submit(
        &self,
        proposal: Proposal,
        catalog: &dyn ResourceCatalog,
        now: DateTime<Utc>,
    ) -> Result<StoredProposal, SchemaError> {
        validate_proposal(&proposal, catalog, now)?;

        let mut inner = self.write();
        if inner.proposals.contains_key(&proposal.id) {
            return Err(SchemaError::DuplicateProposal {
                proposal_id: proposal.id,
            });
        }
        inner.next_seq += 1;
        let stored = StoredProposal {
            seq: inner.next_seq,
            submitted_at: now,
            trace_id: TraceId::new(),
            proposal,
        };
        inner
            .states
            .insert(stored.id().clone(), ProposalState::Submitted);
        inner.proposals.insert(stored.id().clone(), stored.clone());
        debug!(proposal_id = %stored.id(), seq = stored.seq, "proposal stored");
        Ok(stored)
    }

    pub fn get(&self, id: &ProposalId) -> Option<StoredProposal> {
        self.read().proposals.get(id).cloned()
    }

    pub fn state(&self, id: &ProposalId) -> Option<ProposalState> {
        self.read().states.get(id).copied()
    }

    /// Proposals still in `Submitted`, in submission order.
    pub fn list_pending(&self) -> Vec<StoredProposal> {
        self.list_where(|s| s == ProposalState::Submitted)
    }

    /// Proposals that arbitration has not finished with, in submission order.
    pub fn list_awaiting_arbitration(&self) -> Vec<StoredProposal> {
        self.list_where(|s| s.awaits_arbitration())
    }

    pub fn list_in_state(&self, state: ProposalState) -> Vec<StoredProposal> {
        self.list_where(|s| s == state)
    }

    /// Move a proposal along its lifecycle. Returns the previous state.
    pub fn transition(
        &self,
        id: &ProposalId,
        to: ProposalState,
    ) -> EscalationResult<ProposalState> {
        let mut inner = self.write();
        let current = inner
            .states
            .get_mut(id)
            .ok_or_else(|| EscalationError::UnknownProposal {
                proposal_id: id.clone(),
            })?;
        if !current.can_transition_to(to) {
            return Err(EscalationError::InvalidTransition {
                proposal_id: id.clone(),
                from: *current,
                to,
            });
        }
        let from = std::mem::replace(current, to);
        debug!(proposal_id = %id, %from, %to, "proposal state changed");
        Ok(from)
    }

    pub fn len(&self) -> usize {
        self.read().proposals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn list_where(&self, pred: impl Fn(ProposalState) -> bool) -> Vec<StoredProposal> {
        let inner = self.read();
        let mut out: Vec<StoredProposal> = inner
            .proposals
            .values()
            .filter(|p| inner.states.get(p.id()).is_some_and(|s| pred(*s)))
            .cloned()
            .collect();
        out.sort_by_key(|p| p.seq);
        out
    }
}
