//! Conflict detection over a resource snapshot.
//!
//! Each targeted resource is swept once: every pending proposal and every
//! committed reservation contributes a start and an end event, ends sort
//! before starts at equal instants, and each elementary segment between two
//! event instants is checked for over-capacity and forklift / foot-traffic
//! overlap. Adjacent violating segments merge into one conflict.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::domain::{ProposalId, ReservationTag, ResourceId, StoredProposal, TimeWindow};
use crate::resource_model::{ReservationId, ResourceSnapshot, ResourceView};

use super::{Conflict, ConflictKind};

/// Stateless detector; all inputs come from the snapshot and the proposal list.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConflictDetector;

impl ConflictDetector {
    /// Every conflict among `proposals` and the committed state in `snapshot`.
    ///
    /// Output order is deterministic: resources ascending, then lock
    /// conflicts, then occupancy conflicts in time order.
    pub fn detect(snapshot: &ResourceSnapshot, proposals: &[StoredProposal]) -> Vec<Conflict> {
        let refs: Vec<&StoredProposal> = proposals.iter().collect();
        detect_refs(snapshot, &refs)
    }

    /// Conflicts that involve `proposal`, considering `others` as also pending.
    pub fn detect_for(
        snapshot: &ResourceSnapshot,
        proposal: &StoredProposal,
        others: &[StoredProposal],
    ) -> Vec<Conflict> {
        let mut refs: Vec<&StoredProposal> =
            others.iter().filter(|o| o.id() != proposal.id()).collect();
        refs.push(proposal);
        detect_refs(snapshot, &refs)
            .into_iter()
            .filter(|c| c.involves(proposal.id()))
            .collect()
    }
}

fn detect_refs(snapshot: &ResourceSnapshot, proposals: &[&StoredProposal]) -> Vec<Conflict> {
    let mut by_resource: BTreeMap<&ResourceId, Vec<&StoredProposal>> = BTreeMap::new();
    for p in proposals {
        for r in &p.proposal.target_resources {
            by_resource.entry(r).or_default().push(p);
        }
    }

    let mut out = Vec::new();
    for (resource_id, pending) in by_resource {
        let Some(view) = snapshot.get(resource_id) else {
            continue;
        };
        out.extend(lock_conflicts(view, &pending));
        out.extend(occupancy_conflicts(view, &pending));
    }
    debug!(
        proposals = proposals.len(),
        conflicts = out.len(),
        "conflict detection finished"
    );
    out
}

/// One conflict per lock, naming every pending proposal the lock covers.
fn lock_conflicts(view: &ResourceView, pending: &[&StoredProposal]) -> Vec<Conflict> {
    view.locks
        .iter()
        .filter_map(|lock| {
            let hit: Vec<&StoredProposal> = pending
                .iter()
                .copied()
                .filter(|p| lock.covers(&p.proposal.window))
                .collect();
            let window = hit
                .iter()
                .map(|p| p.proposal.window)
                .reduce(|a, b| a.span(&b))?;
            Some(Conflict {
                kind: ConflictKind::Lock,
                resource_id: view.resource.id.clone(),
                proposal_ids: hit.iter().map(|p| p.id().clone()).collect(),
                window,
                reservation_ids: Vec::new(),
                lock_id: Some(lock.id),
                peak_load: None,
                capacity: None,
            })
        })
        .collect()
}

struct Claim {
    proposal_id: ProposalId,
    reservation_id: Option<ReservationId>,
    window: TimeWindow,
    quantity: u32,
    tag: ReservationTag,
}

impl Claim {
    fn is_pending(&self) -> bool {
        self.reservation_id.is_none()
    }
}

/// A maximal run of adjacent violating segments.
struct Run {
    window: TimeWindow,
    members: BTreeSet<usize>,
    peak: u64,
}

struct RunBuilder {
    kind: ConflictKind,
    current: Option<Run>,
    finished: Vec<Run>,
}

impl RunBuilder {
    fn new(kind: ConflictKind) -> Self {
        Self {
            kind,
            current: None,
            finished: Vec::new(),
        }
    }

    fn step(&mut self, segment: TimeWindow, violation: Option<(BTreeSet<usize>, u64)>) {
        match violation {
            Some((members, load)) => match self.current.as_mut() {
                Some(run) if run.window.end == segment.start => {
                    run.window.end = segment.end;
                    run.members.extend(members);
                    run.peak = run.peak.max(load);
                }
                _ => {
                    self.flush();
                    self.current = Some(Run {
                        window: segment,
                        members,
                        peak: load,
                    });
                }
            },
            None => self.flush(),
        }
    }

    fn flush(&mut self) {
        if let Some(run) = self.current.take() {
            self.finished.push(run);
        }
    }

    fn into_conflicts(mut self, view: &ResourceView, claims: &[Claim]) -> Vec<Conflict> {
        self.flush();
        let kind = self.kind;
        self.finished
            .into_iter()
            .map(|run| {
                let proposal_ids = run
                    .members
                    .iter()
                    .map(|i| &claims[*i])
                    .filter(|c| c.is_pending())
                    .map(|c| c.proposal_id.clone())
                    .collect();
                let reservation_ids = run
                    .members
                    .iter()
                    .filter_map(|i| claims[*i].reservation_id)
                    .collect();
                let (peak_load, capacity) = match kind {
                    ConflictKind::Capacity => (
                        Some(u32::try_from(run.peak).unwrap_or(u32::MAX)),
                        Some(view.resource.capacity.units()),
                    ),
                    _ => (None, None),
                };
                Conflict {
                    kind,
                    resource_id: view.resource.id.clone(),
                    proposal_ids,
                    window: run.window,
                    reservation_ids,
                    lock_id: None,
                    peak_load,
                    capacity,
                }
            })
            .collect()
    }
}

fn occupancy_conflicts(view: &ResourceView, pending: &[&StoredProposal]) -> Vec<Conflict> {
    let mut claims: Vec<Claim> = view
        .reservations
        .iter()
        .map(|r| Claim {
            proposal_id: r.booking.proposal_id.clone(),
            reservation_id: Some(r.id),
            window: r.booking.window,
            quantity: r.booking.quantity,
            tag: r.booking.tag,
        })
        .collect();
    claims.extend(pending.iter().map(|p| Claim {
        proposal_id: p.id().clone(),
        reservation_id: None,
        window: p.proposal.window,
        quantity: p.proposal.quantity,
        tag: p.proposal.tag,
    }));

    // (instant, is_start, claim); `false < true` puts ends first.
    let mut events: Vec<(DateTime<Utc>, bool, usize)> = Vec::with_capacity(claims.len() * 2);
    for (i, c) in claims.iter().enumerate() {
        if c.window.is_empty() {
            continue;
        }
        events.push((c.window.start, true, i));
        events.push((c.window.end, false, i));
    }
    events.sort();

    let capacity = u64::from(view.resource.capacity.units());
    let mut active: BTreeSet<usize> = BTreeSet::new();
    let mut load: u64 = 0;
    let mut capacity_runs = RunBuilder::new(ConflictKind::Capacity);
    let mut exclusivity_runs = RunBuilder::new(ConflictKind::Exclusivity);

    let mut idx = 0;
    while idx < events.len() {
        let instant = events[idx].0;
        while idx < events.len() && events[idx].0 == instant {
            let (_, is_start, i) = events[idx];
            let qty = u64::from(claims[i].quantity);
            if is_start {
                active.insert(i);
                load += qty;
            } else {
                active.remove(&i);
                load -= qty;
            }
            idx += 1;
        }
        let Some(&(next, _, _)) = events.get(idx) else {
            break;
        };
        let segment = TimeWindow::new(instant, next);

        let any_pending = |set: &BTreeSet<usize>| set.iter().any(|i| claims[*i].is_pending());

        let over = (load > capacity && any_pending(&active)).then(|| (active.clone(), load));
        capacity_runs.step(segment, over);

        let tagged: BTreeSet<usize> = active
            .iter()
            .copied()
            .filter(|i| claims[*i].tag != ReservationTag::General)
            .collect();
        let has_forklift = tagged
            .iter()
            .any(|i| claims[*i].tag == ReservationTag::Forklift);
        let has_foot = tagged
            .iter()
            .any(|i| claims[*i].tag == ReservationTag::WorkerFootTraffic);
        let exclusive =
            (has_forklift && has_foot && any_pending(&tagged)).then(|| (tagged, load));
        exclusivity_runs.step(segment, exclusive);
    }

    let mut out = capacity_runs.into_conflicts(view, &claims);
    out.extend(exclusivity_runs.into_conflicts(view, &claims));
    out.retain(|c| !c.proposal_ids.is_empty());
    out.sort_by(|a, b| (a.window.start, a.kind).cmp(&(b.window.start, b.kind)));
    out
}
