//! Ordered-boundary band tables.
//!
//! Each table lists bands from lowest to highest with the upper edge of the
//! band. A value falls in the first band whose edge it does not pass.
//! Lower edges are inclusive, so a value sitting exactly on a boundary
//! belongs to the higher band unless the edge is marked inclusive.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Band for the safety and SLA axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskBand {
    Low,
    Medium,
    High,
    Critical,
}

/// Band for the operational-impact axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImpactBand {
    Low,
    Medium,
    High,
}

impl fmt::Display for RiskBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RiskBand::Low => "low",
            RiskBand::Medium => "medium",
            RiskBand::High => "high",
            RiskBand::Critical => "critical",
        };
        f.write_str(s)
    }
}

impl fmt::Display for ImpactBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ImpactBand::Low => "low",
            ImpactBand::Medium => "medium",
            ImpactBand::High => "high",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy)]
enum Upper {
    Exclusive(f64),
    Inclusive(f64),
    Unbounded,
}

impl Upper {
    fn admits(&self, value: f64) -> bool {
        match *self {
            Upper::Exclusive(edge) => value < edge,
            Upper::Inclusive(edge) => value <= edge,
            Upper::Unbounded => true,
        }
    }
}

const SAFETY_BANDS: [(Upper, RiskBand); 4] = [
    (Upper::Exclusive(0.1), RiskBand::Low),
    (Upper::Exclusive(0.3), RiskBand::Medium),
    (Upper::Inclusive(0.5), RiskBand::High),
    (Upper::Unbounded, RiskBand::Critical),
];

const SLA_BANDS: [(Upper, RiskBand); 4] = [
    (Upper::Exclusive(0.2), RiskBand::Low),
    (Upper::Exclusive(0.4), RiskBand::Medium),
    (Upper::Inclusive(0.6), RiskBand::High),
    (Upper::Unbounded, RiskBand::Critical),
];

/// Minutes of delay.
const IMPACT_BANDS: [(Upper, ImpactBand); 3] = [
    (Upper::Exclusive(10.0), ImpactBand::Low),
    (Upper::Inclusive(30.0), ImpactBand::Medium),
    (Upper::Unbounded, ImpactBand::High),
];

/// NaN lands in the last (worst) band.
fn lookup<B: Copy>(table: &[(Upper, B)], value: f64) -> B {
    let value = if value.is_nan() { f64::INFINITY } else { value };
    for (upper, band) in table {
        if upper.admits(value) {
            return *band;
        }
    }
    // Every table ends with `Unbounded`.
    table[table.len() - 1].1
}

pub fn safety_band(score: f64) -> RiskBand {
    lookup(&SAFETY_BANDS, score)
}

pub fn sla_band(score: f64) -> RiskBand {
    lookup(&SLA_BANDS, score)
}

pub fn impact_band(minutes: f64) -> ImpactBand {
    lookup(&IMPACT_BANDS, minutes)
}
