//! The single admission rule shared by commits and candidate exploration.
//!
//! Checks run in precedence order: lock, safety exclusivity, capacity.

use crate::domain::{ProposalId, Resource, ReservationTag, TimeWindow};

use super::lock::{Lock, LockId};
use super::reservation::Booking;

/// Verdict for one booking against one resource's current occupancy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    Admit,
    Locked { lock_id: LockId },
    Exclusive { conflicting_proposal: ProposalId },
    OverCapacity { requested: u32, available: u32 },
}

impl Admission {
    pub fn is_admit(&self) -> bool {
        matches!(self, Admission::Admit)
    }
}

/// First lock covering `window`, if any.
pub fn covering_lock<'a>(locks: &'a [Lock], window: &TimeWindow) -> Option<&'a Lock> {
    locks.iter().find(|l| l.covers(window))
}

/// Highest simultaneous load inside `window` from the given bookings.
///
/// Half-open windows: a booking ending at `t` and one starting at `t` never
/// add up, so ends are applied before starts at equal instants.
pub fn peak_load<'a>(bookings: impl IntoIterator<Item = &'a Booking>, window: &TimeWindow) -> u32 {
    let mut events: Vec<(chrono::DateTime<chrono::Utc>, i64)> = Vec::new();
    for b in bookings {
        if let Some(overlap) = b.window.intersection(window) {
            events.push((overlap.start, i64::from(b.quantity)));
            events.push((overlap.end, -i64::from(b.quantity)));
        }
    }
    events.sort();

    let mut load: i64 = 0;
    let mut peak: i64 = 0;
    for (_, delta) in events {
        load += delta;
        peak = peak.max(load);
    }
    u32::try_from(peak).unwrap_or(u32::MAX)
}

/// Decide whether `candidate` may be added to `resource` given `existing`
/// bookings and `locks`.
pub fn admit<'a>(
    resource: &Resource,
    existing: impl IntoIterator<Item = &'a Booking> + Clone,
    locks: &[Lock],
    candidate: &Booking,
) -> Admission {
    if let Some(lock) = covering_lock(locks, &candidate.window) {
        return Admission::Locked { lock_id: lock.id };
    }

    if candidate.tag != ReservationTag::General {
        if let Some(other) = existing.clone().into_iter().find(|b| {
            b.proposal_id != candidate.proposal_id
                && b.tag.excludes(&candidate.tag)
                && b.window.overlaps(&candidate.window)
        }) {
            return Admission::Exclusive {
                conflicting_proposal: other.proposal_id.clone(),
            };
        }
    }

    let capacity = resource.capacity.units();
    let load = peak_load(existing, &candidate.window);
    let available = capacity.saturating_sub(load);
    if candidate.quantity > available {
        return Admission::OverCapacity {
            requested: candidate.quantity,
            available,
        };
    }

    Admission::Admit
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Capacity, ResourceKind};
    use crate::resource_model::lock::{LockRequest, LockScope};
    use chrono::{DateTime, TimeZone, Utc};

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, h, m, 0).unwrap()
    }

    fn booking(id: &str, from: (u32, u32), to: (u32, u32), qty: u32, tag: ReservationTag) -> Booking {
        Booking {
            proposal_id: ProposalId::from(id),
            window: TimeWindow::new(at(from.0, from.1), at(to.0, to.1)),
            quantity: qty,
            tag,
        }
    }

    fn aisle(capacity: u32) -> Resource {
        Resource::new("A-07", ResourceKind::AisleSegment, Capacity::Units(capacity))
    }

    #[test]
    fn test_peak_load_ignores_touching_windows() {
        let bookings = vec![
            booking("a", (9, 0), (9, 30), 4, ReservationTag::General),
            booking("b", (9, 30), (10, 0), 5, ReservationTag::General),
        ];
        let w = TimeWindow::new(at(9, 0), at(10, 0));
        assert_eq!(peak_load(&bookings, &w), 5);
    }

    #[test]
    fn test_peak_load_sums_overlap() {
        let bookings = vec![
            booking("a", (9, 0), (9, 40), 4, ReservationTag::General),
            booking("b", (9, 20), (10, 0), 5, ReservationTag::General),
        ];
        let w = TimeWindow::new(at(9, 0), at(10, 0));
        assert_eq!(peak_load(&bookings, &w), 9);
    }

    #[test]
    fn test_exact_fill_is_admitted() {
        let existing = vec![booking("a", (9, 0), (10, 0), 7, ReservationTag::General)];
        let c = booking("b", (9, 0), (10, 0), 3, ReservationTag::General);
        assert_eq!(admit(&aisle(10), &existing, &[], &c), Admission::Admit);
    }

    #[test]
    fn test_over_capacity_reports_available() {
        let existing = vec![booking("a", (9, 0), (10, 0), 7, ReservationTag::General)];
        let c = booking("b", (9, 30), (10, 30), 5, ReservationTag::General);
        assert_eq!(
            admit(&aisle(10), &existing, &[], &c),
            Admission::OverCapacity {
                requested: 5,
                available: 3
            }
        );
    }

    #[test]
    fn test_forklift_excludes_foot_traffic_despite_capacity() {
        let existing = vec![booking("p1", (9, 30), (9, 50), 1, ReservationTag::Forklift)];
        let c = booking("p2", (9, 20), (9, 50), 1, ReservationTag::WorkerFootTraffic);
        assert_eq!(
            admit(&aisle(100), &existing, &[], &c),
            Admission::Exclusive {
                conflicting_proposal: ProposalId::from("p1")
            }
        );
    }

    #[test]
    fn test_lock_takes_precedence() {
        let lock = Lock::from_request(
            LockRequest::new(
                "A-07".into(),
                LockScope::Window {
                    window: TimeWindow::new(at(10, 0), at(10, 30)),
                },
                "rack inspection",
                "planner",
            ),
            at(8, 0),
        );
        let lock_id = lock.id;
        let c = booking("p", (10, 10), (10, 20), 1, ReservationTag::General);
        let none: Vec<Booking> = Vec::new();
        assert_eq!(
            admit(&aisle(10), &none, &[lock], &c),
            Admission::Locked { lock_id }
        );
    }
}
