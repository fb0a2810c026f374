//! Read-only, version-stamped copies of resource state.
//!
//! Conflict detection and arbitration run over a snapshot, never over the
//! live model. Commits carry the snapshot versions back so a concurrent
//! change is detected instead of overwritten.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::{Resource, ResourceId, TimeWindow};

use super::lock::Lock;
use super::reservation::{Booking, Reservation};

/// Anything that can answer "does this resource exist, and how big is it?".
pub trait ResourceCatalog {
    /// Total units the resource holds at any instant; `None` if unknown.
    fn capacity_of(&self, id: &ResourceId) -> Option<u32>;

    fn has_resource(&self, id: &ResourceId) -> bool {
        self.capacity_of(id).is_some()
    }
}

/// One resource as of a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceView {
    pub resource: Resource,
    pub reservations: Vec<Reservation>,
    pub locks: Vec<Lock>,
    pub version: u64,
}

impl ResourceView {
    pub fn bookings(&self) -> impl Iterator<Item = &Booking> + Clone {
        self.reservations.iter().map(|r| &r.booking)
    }

    pub fn reservations_overlapping(&self, window: &TimeWindow) -> Vec<&Reservation> {
        self.reservations
            .iter()
            .filter(|r| r.booking.window.overlaps(window))
            .collect()
    }

    pub fn locks_covering(&self, window: &TimeWindow) -> Vec<&Lock> {
        self.locks.iter().filter(|l| l.covers(window)).collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceSnapshot {
    pub resources: BTreeMap<ResourceId, ResourceView>,
}

impl ResourceSnapshot {
    pub fn get(&self, id: &ResourceId) -> Option<&ResourceView> {
        self.resources.get(id)
    }

    /// Versions of the given resources, for an optimistic commit.
    pub fn versions_for<'a>(
        &self,
        ids: impl IntoIterator<Item = &'a ResourceId>,
    ) -> BTreeMap<ResourceId, u64> {
        ids.into_iter()
            .filter_map(|id| self.resources.get(id).map(|v| (id.clone(), v.version)))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

impl ResourceCatalog for ResourceSnapshot {
    fn capacity_of(&self, id: &ResourceId) -> Option<u32> {
        self.resources.get(id).map(|v| v.resource.capacity.units())
    }
}
