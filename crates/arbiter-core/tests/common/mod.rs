//! Shared fixtures for orchestrator integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use arbiter_core::{
    ArbiterConfig, Capacity, MemoryAuditLedger, Orchestrator, Proposal, ReservationTag, Resource,
    ResourceId, ResourceKind, ResourceModel, TimeWindow,
};
use chrono::{DateTime, TimeZone, Utc};

pub fn at(h: u32, m: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, h, m, 0).unwrap()
}

pub fn window(from: (u32, u32), to: (u32, u32)) -> TimeWindow {
    TimeWindow::new(at(from.0, from.1), at(to.0, to.1))
}

/// Submission time used by every test.
pub fn morning() -> DateTime<Utc> {
    at(8, 0)
}

pub struct Harness {
    pub orchestrator: Orchestrator,
    pub model: Arc<ResourceModel>,
    pub ledger: Arc<MemoryAuditLedger>,
}

pub fn harness(resources: Vec<Resource>) -> Harness {
    harness_with(ArbiterConfig::default(), resources)
}

pub fn harness_with(config: ArbiterConfig, resources: Vec<Resource>) -> Harness {
    let model = Arc::new(ResourceModel::with_resources(resources).unwrap());
    let ledger = Arc::new(MemoryAuditLedger::new());
    let orchestrator = Orchestrator::new(config, model.clone(), ledger.clone()).unwrap();
    Harness {
        orchestrator,
        model,
        ledger,
    }
}

pub fn aisle(id: &str) -> Resource {
    Resource::new(id, ResourceKind::AisleSegment, Capacity::Units(10))
}

pub fn dock(id: &str) -> Resource {
    Resource::new(id, ResourceKind::DockDoor, Capacity::Exclusive)
}

pub fn proposal(id: &str, resource: &str, w: TimeWindow, qty: u32) -> Proposal {
    Proposal::new(id, format!("agent-{id}"), vec![ResourceId::from(resource)], w, qty)
}

/// Scenario A inputs: forklift and foot traffic overlapping in aisle X.
pub fn forklift_and_walker() -> (Proposal, Proposal) {
    let p1 = proposal("P1", "X", window((9, 30), (9, 50)), 1).with_tag(ReservationTag::Forklift);
    let p2 = proposal("P2", "X", window((9, 20), (9, 50)), 1)
        .with_tag(ReservationTag::WorkerFootTraffic);
    (p1, p2)
}
