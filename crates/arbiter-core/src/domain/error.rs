//! Crate-level error taxonomy.

use arbiter_ledger::LedgerError;

use crate::arbitration::ArbitrationError;
use crate::config::ConfigError;
use crate::escalation::EscalationError;
use crate::proposal_store::SchemaError;
use crate::resource_model::ResourceError;

/// Everything the orchestrator can fail with.
#[derive(Debug, thiserror::Error)]
pub enum ArbiterError {
    #[error("proposal rejected: {0}")]
    Schema(#[from] SchemaError),

    #[error("resource model error: {0}")]
    Resource(#[from] ResourceError),

    #[error("arbitration error: {0}")]
    Arbitration(#[from] ArbitrationError),

    #[error("escalation error: {0}")]
    Escalation(#[from] EscalationError),

    #[error("audit ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("orchestrator is shutting down")]
    ShuttingDown,
}

/// Result type for orchestrator operations.
pub type Result<T> = std::result::Result<T, ArbiterError>;
