//! Error types for arbiter-ledger

use thiserror::Error;

/// Errors raised by an [`AuditLedger`](crate::AuditLedger) backend.
#[derive(Error, Debug)]
pub enum LedgerError {
    /// Backend connection could not be established
    #[error("ledger connection failed: {0}")]
    Connection(String),

    /// Schema definition failed on startup
    #[error("ledger schema setup failed: {0}")]
    SchemaSetup(String),

    /// Backend rejected or failed a query
    #[error("ledger backend error: {0}")]
    Backend(String),

    /// Payload could not be serialized
    #[error("ledger serialization failed: {0}")]
    Serialization(String),

    /// A stored digest was not valid SHA-256 hex
    #[error("invalid entry digest: {digest}")]
    InvalidDigest { digest: String },

    /// Hash chain verification found a tampered or missing entry
    #[error("hash chain broken at seq {seq}: {detail}")]
    ChainBroken { seq: u64, detail: String },
}

impl From<surrealdb::Error> for LedgerError {
    fn from(err: surrealdb::Error) -> Self {
        LedgerError::Backend(err.to_string())
    }
}

impl From<serde_json::Error> for LedgerError {
    fn from(err: serde_json::Error) -> Self {
        LedgerError::Serialization(err.to_string())
    }
}
