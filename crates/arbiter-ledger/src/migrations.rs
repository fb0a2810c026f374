//! SurrealDB schema initialization for the audit ledger

use surrealdb::engine::any::Any;
use surrealdb::Surreal;
use tracing::{debug, info};

use crate::error::LedgerError;
use crate::ledger_traits::LedgerResult;

/// Define the ledger tables and indexes.
///
/// Idempotent; safe to call on every connection.
pub async fn init_schema(db: &Surreal<Any>) -> LedgerResult<()> {
    info!("Initializing audit ledger schema");
    init_audit_entries_table(db).await?;
    info!("Audit ledger schema initialization complete");
    Ok(())
}

/// Initialize `audit_entries`
///
/// Schema:
/// ```text
/// TABLE audit_entries {
///   seq:          INT (unique)
///   trace_id:     STRING (indexed)
///   kind:         STRING
///   subject:      STRING (indexed)
///   payload:      OBJECT
///   recorded_at:  DATETIME
///   prev_digest:  STRING
///   digest:       STRING (unique)
/// }
/// ```
///
/// Rows can be created and read but never updated or deleted.
async fn init_audit_entries_table(db: &Surreal<Any>) -> LedgerResult<()> {
    debug!("Initializing audit_entries table");

    let sql = r#"
        DEFINE TABLE IF NOT EXISTS audit_entries AS
            SCHEMALESS
            PERMISSIONS
                FOR create FULL
                FOR read FULL
                FOR update NONE
                FOR delete NONE;

        DEFINE INDEX IF NOT EXISTS idx_audit_seq ON TABLE audit_entries COLUMNS seq UNIQUE;
        DEFINE INDEX IF NOT EXISTS idx_audit_digest ON TABLE audit_entries COLUMNS digest UNIQUE;
        DEFINE INDEX IF NOT EXISTS idx_audit_trace ON TABLE audit_entries COLUMNS trace_id;
        DEFINE INDEX IF NOT EXISTS idx_audit_subject ON TABLE audit_entries COLUMNS subject;
    "#;

    db.query(sql)
        .await
        .map_err(|e| LedgerError::SchemaSetup(e.to_string()))?;

    debug!("audit_entries table initialized");
    Ok(())
}
