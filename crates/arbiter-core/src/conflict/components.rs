//! Partitioning proposals into independently arbitrable components.
//!
//! Two proposals share a component when some conflict names both of them.
//! Components are disjoint, so each can be decided without looking at the
//! others.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::domain::{ProposalId, ResourceId, StoredProposal};
use crate::resource_model::LockId;

use super::{Conflict, ConflictKind};

/// A connected set of proposals and the conflicts linking them.
///
/// A proposal that conflicts with nothing forms a singleton component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictComponent {
    /// Members in submission order.
    pub proposals: Vec<StoredProposal>,
    pub conflicts: Vec<Conflict>,
}

impl ConflictComponent {
    pub fn proposal_ids(&self) -> Vec<ProposalId> {
        self.proposals.iter().map(|p| p.id().clone()).collect()
    }

    /// Every resource any member targets.
    pub fn resources(&self) -> BTreeSet<ResourceId> {
        self.proposals
            .iter()
            .flat_map(|p| p.proposal.target_resources.iter().cloned())
            .collect()
    }

    /// Sequence number of the earliest-submitted member.
    pub fn min_seq(&self) -> u64 {
        self.proposals.iter().map(|p| p.seq).min().unwrap_or_default()
    }

    /// The member whose trace becomes the component's trace.
    pub fn anchor(&self) -> Option<&StoredProposal> {
        self.proposals.iter().min_by_key(|p| p.seq)
    }

    pub fn is_conflicted(&self) -> bool {
        !self.conflicts.is_empty()
    }

    pub fn kinds(&self) -> BTreeSet<ConflictKind> {
        self.conflicts.iter().map(|c| c.kind).collect()
    }

    pub fn lock_ids(&self) -> BTreeSet<LockId> {
        self.conflicts.iter().filter_map(|c| c.lock_id).collect()
    }

    pub fn has_lock_conflict(&self) -> bool {
        self.conflicts.iter().any(|c| c.kind == ConflictKind::Lock)
    }
}

struct DisjointSet {
    parent: Vec<usize>,
    rank: Vec<u8>,
}

impl DisjointSet {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
            rank: vec![0; n],
        }
    }

    fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra == rb {
            return;
        }
        match self.rank[ra].cmp(&self.rank[rb]) {
            std::cmp::Ordering::Less => self.parent[ra] = rb,
            std::cmp::Ordering::Greater => self.parent[rb] = ra,
            std::cmp::Ordering::Equal => {
                self.parent[rb] = ra;
                self.rank[ra] += 1;
            }
        }
    }
}

/// Group `proposals` by the conflicts that link them.
///
/// Returned components are ordered by their earliest member's sequence
/// number; conflicts naming unknown proposals are ignored.
pub fn build_components(
    proposals: &[StoredProposal],
    conflicts: Vec<Conflict>,
) -> Vec<ConflictComponent> {
    let mut ordered: Vec<&StoredProposal> = proposals.iter().collect();
    ordered.sort_by_key(|p| p.seq);
    let index: BTreeMap<&ProposalId, usize> = ordered
        .iter()
        .enumerate()
        .map(|(i, p)| (p.id(), i))
        .collect();

    let mut sets = DisjointSet::new(ordered.len());
    for c in &conflicts {
        let mut members = c.proposal_ids.iter().filter_map(|id| index.get(id).copied());
        if let Some(first) = members.next() {
            for other in members {
                sets.union(first, other);
            }
        }
    }

    let mut groups: BTreeMap<usize, ConflictComponent> = BTreeMap::new();
    let mut root_of_first: BTreeMap<usize, usize> = BTreeMap::new();
    for (i, p) in ordered.iter().enumerate() {
        let root = sets.find(i);
        // Key groups by their first member's position so output follows seq order.
        let key = *root_of_first.entry(root).or_insert(i);
        groups
            .entry(key)
            .or_insert_with(|| ConflictComponent {
                proposals: Vec::new(),
                conflicts: Vec::new(),
            })
            .proposals
            .push((*p).clone());
    }

    for c in conflicts {
        let Some(first) = c.proposal_ids.iter().find_map(|id| index.get(id).copied()) else {
            continue;
        };
        let root = sets.find(first);
        if let Some(key) = root_of_first.get(&root) {
            if let Some(group) = groups.get_mut(key) {
                group.conflicts.push(c);
            }
        }
    }

    groups.into_values().collect()
}
