//! Arbiter configuration.
//!
//! Every field has a default, so an empty TOML document is a valid
//! configuration. The binary layers `ARBITER_*` environment overrides on
//! top through its argument parser.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::arbitration::PlacementPolicy;
use crate::escalation::EscalationPolicy;
use crate::risk::RiskPolicy;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArbiterConfig {
    pub escalation_timeout_secs: u64,
    pub reschedule_step_minutes: i64,
    pub reschedule_horizon_minutes: i64,
    pub sla_horizon_minutes: f64,
    pub rejection_penalty_minutes: f64,
    pub clearance_threshold_ft: f64,
    pub max_proposals_before_escalation: usize,
    pub min_confidence_for_auto: Option<f64>,
    pub max_commit_retries: u32,
    pub worker_parallelism: usize,
    /// Capacity of the outbound event channel.
    pub event_buffer: usize,
    /// Tracing `EnvFilter` directives; `RUST_LOG` still wins when set.
    pub log_filter: Option<String>,
}

impl Default for ArbiterConfig {
    fn default() -> Self {
        Self {
            escalation_timeout_secs: 900,
            reschedule_step_minutes: 5,
            reschedule_horizon_minutes: 240,
            sla_horizon_minutes: 120.0,
            rejection_penalty_minutes: 30.0,
            clearance_threshold_ft: 10.0,
            max_proposals_before_escalation: 2,
            min_confidence_for_auto: None,
            max_commit_retries: 3,
            worker_parallelism: 4,
            event_buffer: 1024,
            log_filter: None,
        }
    }
}

impl ArbiterConfig {
    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        let config: ArbiterConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub async fn load(path: &Path) -> ConfigResult<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Io {
                path: path.display().to_string(),
                source,
            })?;
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
            ConfigError::Invalid {
                field,
                reason: reason.into(),
            }
        }

        if self.escalation_timeout_secs == 0 {
            return Err(invalid("escalation_timeout_secs", "must be positive"));
        }
        if self.reschedule_step_minutes <= 0 {
            return Err(invalid("reschedule_step_minutes", "must be positive"));
        }
        if self.reschedule_horizon_minutes < 0 {
            return Err(invalid("reschedule_horizon_minutes", "must not be negative"));
        }
        if !(self.sla_horizon_minutes.is_finite() && self.sla_horizon_minutes > 0.0) {
            return Err(invalid("sla_horizon_minutes", "must be a positive number"));
        }
        if !(self.rejection_penalty_minutes.is_finite() && self.rejection_penalty_minutes >= 0.0) {
            return Err(invalid("rejection_penalty_minutes", "must not be negative"));
        }
        if !(self.clearance_threshold_ft.is_finite() && self.clearance_threshold_ft > 0.0) {
            return Err(invalid("clearance_threshold_ft", "must be a positive number"));
        }
        if let Some(c) = self.min_confidence_for_auto {
            if !(0.0..=1.0).contains(&c) {
                return Err(invalid("min_confidence_for_auto", format!("{c} is outside [0, 1]")));
            }
        }
        if self.worker_parallelism == 0 {
            return Err(invalid("worker_parallelism", "must be at least 1"));
        }
        if self.event_buffer == 0 {
            return Err(invalid("event_buffer", "must be at least 1"));
        }
        if let Some(filter) = &self.log_filter {
            if let Err(err) = tracing_subscriber::EnvFilter::try_new(filter) {
                return Err(invalid("log_filter", err.to_string()));
            }
        }
        Ok(())
    }

    pub fn risk_policy(&self) -> RiskPolicy {
        RiskPolicy {
            sla_horizon_minutes: self.sla_horizon_minutes,
            rejection_penalty_minutes: self.rejection_penalty_minutes,
            clearance_threshold_ft: self.clearance_threshold_ft,
        }
    }

    pub fn placement_policy(&self) -> PlacementPolicy {
        PlacementPolicy {
            step_minutes: self.reschedule_step_minutes,
            horizon_minutes: self.reschedule_horizon_minutes,
        }
    }

    pub fn escalation_policy(&self) -> EscalationPolicy {
        EscalationPolicy {
            max_proposals: self.max_proposals_before_escalation,
            min_confidence: self.min_confidence_for_auto,
            timeout_secs: self.escalation_timeout_secs,
        }
    }
}
