//! Physical and logical warehouse resources.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of a resource (aisle segment, forklift, dock door, worker).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceId(pub String);

impl ResourceId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ResourceId {
    fn from(s: &str) -> Self {
        ResourceId(s.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    AisleSegment,
    EquipmentUnit,
    DockDoor,
    Worker,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ResourceKind::AisleSegment => "aisle_segment",
            ResourceKind::EquipmentUnit => "equipment_unit",
            ResourceKind::DockDoor => "dock_door",
            ResourceKind::Worker => "worker",
        };
        f.write_str(s)
    }
}

/// Declared capacity of a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capacity {
    /// Up to `n` units may be reserved at any instant.
    Units(u32),
    /// Single-occupant use; behaves as one unit.
    Exclusive,
}

impl Capacity {
    pub fn units(&self) -> u32 {
        match self {
            Capacity::Units(n) => *n,
            Capacity::Exclusive => 1,
        }
    }
}

/// Reservation tag used by the forklift / foot-traffic exclusivity rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReservationTag {
    Forklift,
    WorkerFootTraffic,
    #[default]
    General,
}

impl ReservationTag {
    /// Forklift and worker foot traffic may never share a resource in time,
    /// whatever the numeric capacity says.
    pub fn excludes(&self, other: &ReservationTag) -> bool {
        matches!(
            (self, other),
            (ReservationTag::Forklift, ReservationTag::WorkerFootTraffic)
                | (ReservationTag::WorkerFootTraffic, ReservationTag::Forklift)
        )
    }
}

impl fmt::Display for ReservationTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ReservationTag::Forklift => "forklift",
            ReservationTag::WorkerFootTraffic => "worker_foot_traffic",
            ReservationTag::General => "general",
        };
        f.write_str(s)
    }
}

/// A resource registered with the [`ResourceModel`](crate::resource_model::ResourceModel).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub id: ResourceId,
    pub kind: ResourceKind,
    pub capacity: Capacity,
    /// Lateral clearance in feet between a forklift lane and foot traffic.
    /// `None` means no separation at all.
    #[serde(default)]
    pub clearance_ft: Option<f64>,
    #[serde(default)]
    pub label: Option<String>,
}

impl Resource {
    pub fn new(id: impl Into<String>, kind: ResourceKind, capacity: Capacity) -> Self {
        Self {
            id: ResourceId(id.into()),
            kind,
            capacity,
            clearance_ft: None,
            label: None,
        }
    }

    pub fn with_clearance_ft(mut self, clearance_ft: f64) -> Self {
        self.clearance_ft = Some(clearance_ft);
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}
