//! The authoritative, concurrently shared resource model.
//!
//! Each resource lives in its own `Mutex`, so operations on disjoint
//! resources never contend. Multi-resource commits lock slots in sorted id
//! order, which makes them deadlock-free and atomic: every booking in the
//! batch becomes visible together or none does. Critical sections hold
//! arithmetic only, never I/O.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::domain::{ProposalId, Resource, ResourceId, TimeWindow};

use super::admission::{admit, Admission};
use super::error::{ResourceError, ResourceResult};
use super::lock::{Lock, LockId, LockRequest, LockScope};
use super::reservation::{
    Booking, CommitOutcome, Reservation, ReservationId, ReservationRequest, ReserveOutcome,
};
use super::snapshot::{ResourceCatalog, ResourceSnapshot, ResourceView};

#[derive(Debug)]
struct ResourceSlot {
    resource: Resource,
    reservations: Vec<Reservation>,
    locks: Vec<Lock>,
    /// Bumped on every mutation; commits compare it against their snapshot.
    version: u64,
}

impl ResourceSlot {
    fn new(resource: Resource) -> Self {
        Self {
            resource,
            reservations: Vec::new(),
            locks: Vec::new(),
            version: 0,
        }
    }

    fn view(&self) -> ResourceView {
        ResourceView {
            resource: self.resource.clone(),
            reservations: self.reservations.clone(),
            locks: self.locks.clone(),
            version: self.version,
        }
    }
}

type SlotHandle = Arc<Mutex<ResourceSlot>>;

fn lock_slot(slot: &Mutex<ResourceSlot>) -> MutexGuard<'_, ResourceSlot> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Result of placing a lock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LockOutcome {
    pub lock: Lock,
    /// Committed reservations that already sit inside the new lock's scope.
    pub overlapping: Vec<Reservation>,
}

/// Counts observed once every in-flight operation finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrainReport {
    pub resources: usize,
    pub reservations: usize,
    pub locks: usize,
}

/// Owner of every reservation and lock.
///
/// Created at startup, mutated only through reserve / release / lock calls,
/// and drained with [`ResourceModel::shutdown`].
#[derive(Debug)]
pub struct ResourceModel {
    slots: RwLock<HashMap<ResourceId, SlotHandle>>,
    reservation_index: Mutex<HashMap<ReservationId, ResourceId>>,
    lock_index: Mutex<HashMap<LockId, ResourceId>>,
    accepting: AtomicBool,
}

impl Default for ResourceModel {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceModel {
    pub fn new() -> Self {
        Self {
            slots: RwLock::new(HashMap::new()),
            reservation_index: Mutex::new(HashMap::new()),
            lock_index: Mutex::new(HashMap::new()),
            accepting: AtomicBool::new(true),
        }
    }

    pub fn with_resources(resources: impl IntoIterator<Item = Resource>) -> ResourceResult<Self> {
        let model = Self::new();
        for resource in resources {
            model.register(resource)?;
        }
        Ok(model)
    }

    /// Add a resource. Ids are unique.
    pub fn register(&self, resource: Resource) -> ResourceResult<()> {
        let mut slots = self.slots.write().unwrap_or_else(PoisonError::into_inner);
        if slots.contains_key(&resource.id) {
            return Err(ResourceError::DuplicateResource {
                resource_id: resource.id,
            });
        }
        debug!(resource_id = %resource.id, kind = %resource.kind, "resource registered");
        slots.insert(
            resource.id.clone(),
            Arc::new(Mutex::new(ResourceSlot::new(resource))),
        );
        Ok(())
    }

    pub fn resource(&self, id: &ResourceId) -> Option<Resource> {
        self.handle(id).ok().map(|h| lock_slot(&h).resource.clone())
    }

    pub fn resource_ids(&self) -> Vec<ResourceId> {
        let slots = self.slots.read().unwrap_or_else(PoisonError::into_inner);
        let mut ids: Vec<ResourceId> = slots.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn version(&self, id: &ResourceId) -> ResourceResult<u64> {
        Ok(lock_slot(&*self.handle(id)?).version)
    }

    pub fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::SeqCst)
    }

    // -- reservations --------------------------------------------------------

    /// Atomically check lock, exclusivity and capacity on one resource and
    /// either commit or refuse.
    pub fn reserve(&self, request: ReservationRequest) -> ResourceResult<ReserveOutcome> {
        self.check_request(&request)?;
        let handle = self.handle(&request.resource_id)?;

        let reservation = {
            let mut slot = lock_slot(&handle);
            let verdict = admit(
                &slot.resource,
                slot.reservations.iter().map(|r| &r.booking),
                &slot.locks,
                &request.booking,
            );
            if let Some(outcome) = refusal(verdict) {
                debug!(resource_id = %request.resource_id, proposal_id = %request.booking.proposal_id, %outcome, "reservation refused");
                return Ok(outcome);
            }
            let reservation = Reservation {
                id: ReservationId::new(),
                resource_id: request.resource_id,
                booking: request.booking,
            };
            slot.reservations.push(reservation.clone());
            slot.version += 1;
            reservation
        };

        self.reservation_index
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(reservation.id, reservation.resource_id.clone());
        Ok(ReserveOutcome::Reserved {
            reservation_id: reservation.id,
        })
    }

    /// Commit every request or none of them.
    ///
    /// When `expected_versions` is given, any listed resource whose version
    /// moved since the caller's snapshot fails the whole batch with
    /// [`ResourceError::StaleSnapshot`].
    pub fn reserve_all(
        &self,
        requests: &[ReservationRequest],
        expected_versions: Option<&BTreeMap<ResourceId, u64>>,
    ) -> ResourceResult<CommitOutcome> {
        for req in requests {
            self.check_request(req)?;
        }

        let mut ids: Vec<ResourceId> = requests.iter().map(|r| r.resource_id.clone()).collect();
        if let Some(expected) = expected_versions {
            ids.extend(expected.keys().cloned());
        }
        ids.sort();
        ids.dedup();

        let handles: Vec<SlotHandle> = ids
            .iter()
            .map(|id| self.handle(id))
            .collect::<ResourceResult<_>>()?;
        let mut guards: Vec<MutexGuard<'_, ResourceSlot>> =
            handles.iter().map(|h| lock_slot(h)).collect();

        if let Some(expected) = expected_versions {
            for (id, guard) in ids.iter().zip(guards.iter()) {
                if let Some(&want) = expected.get(id) {
                    if guard.version != want {
                        warn!(resource_id = %id, expected = want, actual = guard.version, "stale snapshot on commit");
                        return Err(ResourceError::StaleSnapshot {
                            resource_id: id.clone(),
                            expected: want,
                            actual: guard.version,
                        });
                    }
                }
            }
        }

        let mut staged: Vec<Vec<Booking>> = vec![Vec::new(); ids.len()];
        let mut positions: Vec<usize> = Vec::with_capacity(requests.len());
        for (index, req) in requests.iter().enumerate() {
            let pos = ids
                .binary_search(&req.resource_id)
                .map_err(|_| ResourceError::UnknownResource {
                    resource_id: req.resource_id.clone(),
                })?;
            let slot = &guards[pos];
            let existing = slot
                .reservations
                .iter()
                .map(|r| &r.booking)
                .chain(staged[pos].iter());
            let verdict = admit(&slot.resource, existing, &slot.locks, &req.booking);
            if let Some(outcome) = refusal(verdict) {
                debug!(resource_id = %req.resource_id, proposal_id = %req.booking.proposal_id, %outcome, "batch refused");
                return Ok(CommitOutcome::Refused {
                    index,
                    resource_id: req.resource_id.clone(),
                    outcome,
                });
            }
            staged[pos].push(req.booking.clone());
            positions.push(pos);
        }

        let mut reservations = Vec::with_capacity(requests.len());
        for (req, &pos) in requests.iter().zip(positions.iter()) {
            let reservation = Reservation {
                id: ReservationId::new(),
                resource_id: req.resource_id.clone(),
                booking: req.booking.clone(),
            };
            guards[pos].reservations.push(reservation.clone());
            reservations.push(reservation);
        }
        for (pos, batch) in staged.iter().enumerate() {
            if !batch.is_empty() {
                guards[pos].version += 1;
            }
        }
        let versions: Vec<(ResourceId, u64)> = ids
            .iter()
            .cloned()
            .zip(guards.iter().map(|g| g.version))
            .collect();

        {
            let mut index = self
                .reservation_index
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            for r in &reservations {
                index.insert(r.id, r.resource_id.clone());
            }
        }
        drop(guards);

        debug!(count = reservations.len(), "reservations committed");
        Ok(CommitOutcome::Committed {
            reservations,
            versions,
        })
    }

    pub fn release(&self, reservation_id: ReservationId) -> ResourceResult<Reservation> {
        let resource_id = self
            .reservation_index
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&reservation_id)
            .cloned()
            .ok_or(ResourceError::ReservationNotFound { reservation_id })?;

        let handle = self.handle(&resource_id)?;
        let released = {
            let mut slot = lock_slot(&handle);
            let pos = slot
                .reservations
                .iter()
                .position(|r| r.id == reservation_id)
                .ok_or(ResourceError::ReservationNotFound { reservation_id })?;
            slot.version += 1;
            slot.reservations.remove(pos)
        };

        self.reservation_index
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&reservation_id);
        debug!(reservation_id = %reservation_id, resource_id = %resource_id, "reservation released");
        Ok(released)
    }

    /// Release every reservation held for `proposal_id`, on any resource.
    pub fn release_for_proposal(&self, proposal_id: &ProposalId) -> Vec<Reservation> {
        let mut released = Vec::new();
        for handle in self.handles() {
            let mut slot = lock_slot(&handle);
            let before = slot.reservations.len();
            let (gone, kept): (Vec<Reservation>, Vec<Reservation>) = slot
                .reservations
                .drain(..)
                .partition(|r| &r.booking.proposal_id == proposal_id);
            slot.reservations = kept;
            if slot.reservations.len() != before {
                slot.version += 1;
            }
            released.extend(gone);
        }

        let mut index = self
            .reservation_index
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        for r in &released {
            index.remove(&r.id);
        }
        released
    }

    /// Committed reservations on `resource_id` overlapping `window`.
    pub fn query_occupancy(
        &self,
        resource_id: &ResourceId,
        window: &TimeWindow,
    ) -> ResourceResult<Vec<Reservation>> {
        let handle = self.handle(resource_id)?;
        let slot = lock_slot(&handle);
        Ok(slot
            .reservations
            .iter()
            .filter(|r| r.booking.window.overlaps(window))
            .cloned()
            .collect())
    }

    pub fn reservations_for_proposal(&self, proposal_id: &ProposalId) -> Vec<Reservation> {
        self.handles()
            .iter()
            .flat_map(|h| {
                lock_slot(h)
                    .reservations
                    .iter()
                    .filter(|r| &r.booking.proposal_id == proposal_id)
                    .cloned()
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    // -- locks ---------------------------------------------------------------

    /// Place a planner lock. Locks always win; reservations already inside the
    /// scope are reported back rather than silently dropped.
    pub fn set_lock(&self, request: LockRequest, now: DateTime<Utc>) -> ResourceResult<LockOutcome> {
        if request.reason.trim().is_empty() {
            return Err(ResourceError::MissingLockReason {
                resource_id: request.resource_id,
            });
        }
        if let LockScope::Window { window } = &request.scope {
            if window.is_empty() {
                return Err(ResourceError::EmptyWindow {
                    resource_id: request.resource_id.clone(),
                    window: *window,
                });
            }
        }

        let handle = self.handle(&request.resource_id)?;
        let lock = Lock::from_request(request, now);
        let overlapping = {
            let mut slot = lock_slot(&handle);
            let overlapping: Vec<Reservation> = slot
                .reservations
                .iter()
                .filter(|r| lock.covers(&r.booking.window))
                .cloned()
                .collect();
            slot.locks.push(lock.clone());
            slot.version += 1;
            overlapping
        };

        self.lock_index
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(lock.id, lock.resource_id.clone());

        info!(lock_id = %lock.id, resource_id = %lock.resource_id, overlapping = overlapping.len(), "lock set");
        Ok(LockOutcome { lock, overlapping })
    }

    pub fn clear_lock(&self, lock_id: LockId) -> ResourceResult<Lock> {
        let resource_id = self
            .lock_index
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&lock_id)
            .cloned()
            .ok_or(ResourceError::LockNotFound { lock_id })?;

        let handle = self.handle(&resource_id)?;
        let cleared = {
            let mut slot = lock_slot(&handle);
            let pos = slot
                .locks
                .iter()
                .position(|l| l.id == lock_id)
                .ok_or(ResourceError::LockNotFound { lock_id })?;
            slot.version += 1;
            slot.locks.remove(pos)
        };

        self.lock_index
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&lock_id);
        info!(lock_id = %lock_id, resource_id = %resource_id, "lock cleared");
        Ok(cleared)
    }

    pub fn lock(&self, lock_id: LockId) -> Option<Lock> {
        let resource_id = self
            .lock_index
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&lock_id)
            .cloned()?;
        let handle = self.handle(&resource_id).ok()?;
        let slot = lock_slot(&handle);
        slot.locks.iter().find(|l| l.id == lock_id).cloned()
    }

    pub fn locks_on(&self, resource_id: &ResourceId) -> ResourceResult<Vec<Lock>> {
        Ok(lock_slot(&*self.handle(resource_id)?).locks.clone())
    }

    // -- snapshots & lifecycle -------------------------------------------------

    /// Copy of every resource, each stamped with its version.
    pub fn snapshot(&self) -> ResourceSnapshot {
        let handles = self.handles();
        ResourceSnapshot {
            resources: handles
                .iter()
                .map(|h| {
                    let view = lock_slot(h).view();
                    (view.resource.id.clone(), view)
                })
                .collect(),
        }
    }

    /// Stop accepting reservations and wait for in-flight commits to finish.
    ///
    /// Releases and lock changes remain possible so callers can unwind.
    pub fn shutdown(&self) -> DrainReport {
        self.accepting.store(false, Ordering::SeqCst);
        let mut report = DrainReport {
            resources: 0,
            reservations: 0,
            locks: 0,
        };
        for handle in self.handles() {
            let slot = lock_slot(&handle);
            report.resources += 1;
            report.reservations += slot.reservations.len();
            report.locks += slot.locks.len();
        }
        info!(
            resources = report.resources,
            reservations = report.reservations,
            locks = report.locks,
            "resource model drained"
        );
        report
    }

    // -- private helpers -----------------------------------------------------

    fn check_request(&self, req: &ReservationRequest) -> ResourceResult<()> {
        if !self.is_accepting() {
            return Err(ResourceError::ShuttingDown);
        }
        if req.booking.window.is_empty() {
            return Err(ResourceError::EmptyWindow {
                resource_id: req.resource_id.clone(),
                window: req.booking.window,
            });
        }
        if req.booking.quantity == 0 {
            return Err(ResourceError::ZeroQuantity {
                resource_id: req.resource_id.clone(),
            });
        }
        Ok(())
    }

    fn handle(&self, id: &ResourceId) -> ResourceResult<SlotHandle> {
        self.slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
            .ok_or_else(|| ResourceError::UnknownResource {
                resource_id: id.clone(),
            })
    }

    fn handles(&self) -> Vec<SlotHandle> {
        let slots = self.slots.read().unwrap_or_else(PoisonError::into_inner);
        let mut entries: Vec<(&ResourceId, &SlotHandle)> = slots.iter().collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));
        entries.into_iter().map(|(_, h)| Arc::clone(h)).collect()
    }
}

impl ResourceCatalog for ResourceModel {
    fn capacity_of(&self, id: &ResourceId) -> Option<u32> {
        self.resource(id).map(|r| r.capacity.units())
    }
}

fn refusal(verdict: Admission) -> Option<ReserveOutcome> {
    match verdict {
        Admission::Admit => None,
        Admission::Locked { lock_id } => Some(ReserveOutcome::LockConflict { lock_id }),
        Admission::Exclusive {
            conflicting_proposal,
        } => Some(ReserveOutcome::ExclusivityViolation {
            conflicting_proposal,
        }),
        Admission::OverCapacity {
            requested,
            available,
        } => Some(ReserveOutcome::CapacityExceeded {
            requested,
            available,
        }),
    }
}
