//! Risk triples for conflicts and candidate resolutions.

use serde::{Deserialize, Serialize};

use crate::domain::ProposalId;
use crate::resource_model::LockId;

use super::bands::{impact_band, safety_band, sla_band, ImpactBand, RiskBand};

/// Safety, SLA and operational-impact scores for one candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskScore {
    /// 0 when the candidate violates no exclusivity rule or lock.
    pub safety: f64,
    /// Worst per-proposal SLA score.
    pub sla: f64,
    pub impact_minutes: f64,
    /// Proposals not granted exactly what they asked for.
    pub displaced: usize,
}

impl RiskScore {
    pub fn zero() -> Self {
        Self {
            safety: 0.0,
            sla: 0.0,
            impact_minutes: 0.0,
            displaced: 0,
        }
    }

    pub fn safety_band(&self) -> RiskBand {
        safety_band(self.safety)
    }

    pub fn sla_band(&self) -> RiskBand {
        sla_band(self.sla)
    }

    pub fn impact_band(&self) -> ImpactBand {
        impact_band(self.impact_minutes)
    }

    pub fn all_low(&self) -> bool {
        self.safety_band() == RiskBand::Low
            && self.sla_band() == RiskBand::Low
            && self.impact_band() == ImpactBand::Low
    }

    /// Operational impact normalised to [0, 1] against `scale` minutes.
    pub fn impact_fraction(&self, scale: f64) -> f64 {
        if scale <= 0.0 {
            return 1.0;
        }
        (self.impact_minutes / scale).clamp(0.0, 1.0)
    }
}

/// SLA exposure of one proposal under one candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProposalRisk {
    pub proposal_id: ProposalId,
    pub sla: f64,
    pub sla_band: RiskBand,
    pub delay_minutes: i64,
}

/// Full evaluation of a candidate: the triple plus the hard-constraint checks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateRisk {
    pub score: RiskScore,
    /// Per proposal, in the candidate's placement order.
    pub per_proposal: Vec<ProposalRisk>,
    /// First lock a placed booking would overlap.
    pub lock_violation: Option<LockId>,
    /// False when placed bookings would exceed some resource's capacity.
    pub capacity_feasible: bool,
}

impl CandidateRisk {
    /// Highest SLA band across the candidate's proposals.
    pub fn worst_sla_band(&self) -> RiskBand {
        self.per_proposal
            .iter()
            .map(|p| p.sla_band)
            .max()
            .unwrap_or(RiskBand::Low)
    }

    pub fn is_safe(&self) -> bool {
        self.lock_violation.is_none() && self.score.safety <= 0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_low_for_quiet_candidate() {
        let s = RiskScore {
            safety: 0.0,
            sla: 0.05,
            impact_minutes: 5.0,
            displaced: 0,
        };
        assert!(s.all_low());
    }

    #[test]
    fn test_sla_high_is_not_all_low() {
        let s = RiskScore {
            sla: 0.45,
            ..RiskScore::zero()
        };
        assert_eq!(s.sla_band(), RiskBand::High);
        assert!(!s.all_low());
    }

    #[test]
    fn test_worst_sla_band_defaults_low() {
        let r = CandidateRisk {
            score: RiskScore::zero(),
            per_proposal: Vec::new(),
            lock_violation: None,
            capacity_feasible: true,
        };
        assert_eq!(r.worst_sla_band(), RiskBand::Low);
        assert!(r.is_safe());
    }
}
