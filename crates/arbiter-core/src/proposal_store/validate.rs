//! Structural validation of incoming proposals.

use std::collections::BTreeSet;

use chrono::{DateTime, Duration, Utc};

use crate::domain::{Proposal, PRIORITY_RANGE};
use crate::resource_model::ResourceCatalog;

use super::error::SchemaError;

/// How far past submission a proposal window may end.
pub const MAX_LEAD_DAYS: i64 = 366;

/// Check every required field. Returns the first problem found.
pub fn validate_proposal(
    proposal: &Proposal,
    catalog: &dyn ResourceCatalog,
    now: DateTime<Utc>,
) -> Result<(), SchemaError> {
    if proposal.id.0.trim().is_empty() {
        return Err(SchemaError::MissingField { field: "id" });
    }
    if proposal.agent_id.0.trim().is_empty() {
        return Err(SchemaError::MissingField { field: "agent_id" });
    }
    if proposal.target_resources.is_empty() {
        return Err(SchemaError::MissingField {
            field: "target_resources",
        });
    }

    let mut seen = BTreeSet::new();
    for target in &proposal.target_resources {
        if !seen.insert(target) {
            return Err(SchemaError::DuplicateTarget {
                resource_id: target.clone(),
            });
        }
        if !catalog.has_resource(target) {
            return Err(SchemaError::UnknownResource {
                resource_id: target.clone(),
            });
        }
    }

    for window in std::iter::once(&proposal.window).chain(proposal.alternative_windows.iter()) {
        if window.is_empty() {
            return Err(SchemaError::EmptyWindow { window: *window });
        }
    }
    if proposal.window.end <= now {
        return Err(SchemaError::StaleWindow {
            window: proposal.window,
            now,
        });
    }
    let limit = now
        .checked_add_signed(Duration::days(MAX_LEAD_DAYS))
        .unwrap_or(DateTime::<Utc>::MAX_UTC);
    for window in std::iter::once(&proposal.window).chain(proposal.alternative_windows.iter()) {
        if window.end > limit {
            return Err(SchemaError::BeyondHorizon {
                window: *window,
                limit,
            });
        }
    }

    if proposal.quantity == 0 {
        return Err(SchemaError::ZeroQuantity);
    }
    if let Some(min) = proposal.min_quantity {
        if min == 0 || min > proposal.quantity {
            return Err(SchemaError::InvalidMinQuantity {
                min,
                quantity: proposal.quantity,
            });
        }
    }
    let needed = proposal.min_quantity.unwrap_or(proposal.quantity);
    for target in &proposal.target_resources {
        let capacity = catalog.capacity_of(target).unwrap_or(0);
        if needed > capacity {
            return Err(SchemaError::ExceedsCapacity {
                resource_id: target.clone(),
                needed,
                capacity,
            });
        }
    }
    if !PRIORITY_RANGE.contains(&proposal.priority.priority) {
        return Err(SchemaError::PriorityOutOfRange {
            priority: proposal.priority.priority,
        });
    }
    if !proposal.confidence.is_finite() || !(0.0..=1.0).contains(&proposal.confidence) {
        return Err(SchemaError::ConfidenceOutOfRange {
            value: proposal.confidence,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ResourceId, TimeWindow};
    use chrono::TimeZone;

    /// Every listed resource holds four units.
    struct Catalog(Vec<&'static str>);

    impl ResourceCatalog for Catalog {
        fn capacity_of(&self, id: &ResourceId) -> Option<u32> {
            self.0.contains(&id.as_str()).then_some(4)
        }
    }

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, h, m, 0).unwrap()
    }

    fn make_proposal() -> Proposal {
        Proposal::new(
            "p-1",
            "replenishment-1",
            [ResourceId::from("A-07")],
            TimeWindow::new(at(9, 30), at(9, 50)),
            2,
        )
    }

    fn check(p: &Proposal) -> Result<(), SchemaError> {
        validate_proposal(p, &Catalog(vec!["A-07", "A-08"]), at(9, 0))
    }

    #[test]
    fn test_valid_proposal_passes() {
        assert!(check(&make_proposal()).is_ok());
    }

    #[test]
    fn test_unknown_target_rejected() {
        let mut p = make_proposal();
        p.target_resources.push(ResourceId::from("Z-99"));
        assert!(matches!(
            check(&p),
            Err(SchemaError::UnknownResource { .. })
        ));
    }

    #[test]
    fn test_window_checks() {
        let mut p = make_proposal();
        p.window = TimeWindow::new(at(9, 50), at(9, 30));
        assert!(matches!(check(&p), Err(SchemaError::EmptyWindow { .. })));

        let mut p = make_proposal();
        p.window = TimeWindow::new(at(8, 0), at(9, 0));
        assert!(matches!(check(&p), Err(SchemaError::StaleWindow { .. })));

        let p = make_proposal().with_alternative(TimeWindow::new(at(11, 0), at(11, 0)));
        assert!(matches!(check(&p), Err(SchemaError::EmptyWindow { .. })));
    }

    #[test]
    fn test_far_future_window_rejected() {
        let mut p = make_proposal();
        p.window = TimeWindow::new(
            DateTime::<Utc>::MAX_UTC - Duration::minutes(30),
            DateTime::<Utc>::MAX_UTC - Duration::minutes(10),
        );
        assert!(matches!(check(&p), Err(SchemaError::BeyondHorizon { .. })));

        let p = make_proposal().with_alternative(TimeWindow::new(
            at(9, 0) + Duration::days(400),
            at(9, 30) + Duration::days(400),
        ));
        assert!(matches!(check(&p), Err(SchemaError::BeyondHorizon { .. })));

        let mut p = make_proposal();
        p.window = TimeWindow::new(at(9, 0) + Duration::days(30), at(9, 30) + Duration::days(30));
        assert!(check(&p).is_ok());
    }

    #[test]
    fn test_quantity_above_total_capacity_rejected() {
        let mut p = make_proposal();
        p.quantity = 6;
        assert_eq!(
            check(&p),
            Err(SchemaError::ExceedsCapacity {
                resource_id: ResourceId::from("A-07"),
                needed: 6,
                capacity: 4,
            })
        );

        // A partial grant that fits is still arbitrable.
        assert!(check(&p.with_min_quantity(3)).is_ok());
    }

    #[test]
    fn test_confidence_bounds() {
        for bad in [-0.1, 1.01, f64::NAN, f64::INFINITY] {
            let p = make_proposal().with_confidence(bad);
            assert!(
                matches!(check(&p), Err(SchemaError::ConfidenceOutOfRange { .. })),
                "{bad} accepted"
            );
        }
        assert!(check(&make_proposal().with_confidence(0.0)).is_ok());
        assert!(check(&make_proposal().with_confidence(1.0)).is_ok());
    }

    #[test]
    fn test_quantity_priority_and_fields() {
        let mut p = make_proposal();
        p.quantity = 0;
        assert_eq!(check(&p), Err(SchemaError::ZeroQuantity));

        let p = make_proposal().with_min_quantity(3);
        assert!(matches!(
            check(&p),
            Err(SchemaError::InvalidMinQuantity { min: 3, quantity: 2 })
        ));

        let p = make_proposal().with_priority(11);
        assert!(matches!(
            check(&p),
            Err(SchemaError::PriorityOutOfRange { priority: 11 })
        ));

        let mut p = make_proposal();
        p.agent_id.0 = " ".into();
        assert_eq!(
            check(&p),
            Err(SchemaError::MissingField { field: "agent_id" })
        );

        let mut p = make_proposal();
        p.target_resources.push(ResourceId::from("A-07"));
        assert!(matches!(
            check(&p),
            Err(SchemaError::DuplicateTarget { .. })
        ));
    }
}
