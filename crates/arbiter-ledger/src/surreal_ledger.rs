//! SurrealDB-backed AuditLedger implementation
//!
//! Uses `schema::AuditEntryRecord` for persistence, converting to/from
//! `ledger_traits` types at the boundary. Appends are serialized through an
//! in-process chain head; the unique `seq` index rejects a second writer.

use std::path::Path;

use async_trait::async_trait;
use surrealdb::engine::any::Any;
use surrealdb::Surreal;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::LedgerError;
use crate::ledger_traits::{
    AuditLedger, EntryDigest, LedgerEntry, LedgerResult, NewEntry, TraceId,
};
use crate::migrations;
use crate::schema::AuditEntryRecord as DbEntry;

const NAMESPACE: &str = "arbiter";
const DATABASE: &str = "audit";

#[derive(Debug)]
struct ChainHead {
    seq: u64,
    digest: EntryDigest,
}

/// SurrealDB-backed implementation of [`AuditLedger`].
pub struct SurrealAuditLedger {
    db: Surreal<Any>,
    head: Mutex<ChainHead>,
}

impl SurrealAuditLedger {
    /// Create an in-memory instance for testing.
    ///
    /// Connects to `mem://`, selects `arbiter/audit`, and runs `init_schema`.
    pub async fn in_memory() -> LedgerResult<Self> {
        Self::connect("mem://", NAMESPACE, DATABASE).await
    }

    /// Open (or create) an embedded on-disk ledger under `dir`.
    pub async fn open_local(dir: &Path) -> LedgerResult<Self> {
        std::fs::create_dir_all(dir).map_err(|e| {
            LedgerError::Connection(format!(
                "Failed to create ledger directory {}: {}",
                dir.display(),
                e
            ))
        })?;
        let url = format!("surrealkv://{}", dir.display());
        Self::connect(&url, NAMESPACE, DATABASE).await
    }

    /// Connect to any SurrealDB endpoint (`mem://`, `surrealkv://`, `ws://`, `wss://`).
    pub async fn connect(endpoint: &str, namespace: &str, database: &str) -> LedgerResult<Self> {
        let db = surrealdb::engine::any::connect(endpoint)
            .await
            .map_err(|e| LedgerError::Connection(format!("Failed to connect to {endpoint}: {e}")))?;

        db.use_ns(namespace)
            .use_db(database)
            .await
            .map_err(|e| LedgerError::Connection(e.to_string()))?;

        migrations::init_schema(&db).await?;
        let head = Self::load_head(&db).await?;

        info!(endpoint = %endpoint, seq = head.seq, "SurrealAuditLedger connected");
        Ok(Self {
            db,
            head: Mutex::new(head),
        })
    }

    // -- private helpers -----------------------------------------------------

    /// Read the last sealed entry so appends continue the existing chain.
    async fn load_head(db: &Surreal<Any>) -> LedgerResult<ChainHead> {
        let mut res = db
            .query("SELECT * FROM audit_entries ORDER BY seq DESC LIMIT 1")
            .await
            .map_err(|e| LedgerError::Backend(e.to_string()))?;

        let rows: Vec<DbEntry> = res
            .take(0)
            .map_err(|e| LedgerError::Backend(e.to_string()))?;

        match rows.into_iter().next() {
            Some(row) => Ok(ChainHead {
                seq: row.seq,
                digest: EntryDigest::try_from(row.digest)?,
            }),
            None => Ok(ChainHead {
                seq: 0,
                digest: EntryDigest::genesis(),
            }),
        }
    }

    fn rows_to_entries(rows: Vec<DbEntry>) -> LedgerResult<Vec<LedgerEntry>> {
        rows.into_iter().map(LedgerEntry::try_from).collect()
    }
}

#[async_trait]
impl AuditLedger for SurrealAuditLedger {
    async fn append(&self, entry: NewEntry) -> LedgerResult<LedgerEntry> {
        let mut head = self.head.lock().await;
        let sealed = entry.seal(head.seq + 1, head.digest.clone());

        debug!(seq = sealed.seq, trace_id = %sealed.trace_id, kind = %sealed.kind, "appending audit entry");

        let _created: Option<DbEntry> = self
            .db
            .create("audit_entries")
            .content(DbEntry::from(&sealed))
            .await
            .map_err(|e| LedgerError::Backend(e.to_string()))?;

        head.seq = sealed.seq;
        head.digest = sealed.digest.clone();
        Ok(sealed)
    }

    async fn entries_for_trace(&self, trace_id: &TraceId) -> LedgerResult<Vec<LedgerEntry>> {
        let tid_owned = trace_id.0.clone();
        let mut res = self
            .db
            .query("SELECT * FROM audit_entries WHERE trace_id = $tid ORDER BY seq ASC")
            .bind(("tid", tid_owned))
            .await
            .map_err(|e| LedgerError::Backend(e.to_string()))?;

        let rows: Vec<DbEntry> = res
            .take(0)
            .map_err(|e| LedgerError::Backend(e.to_string()))?;

        Self::rows_to_entries(rows)
    }

    async fn entries(&self) -> LedgerResult<Vec<LedgerEntry>> {
        let mut res = self
            .db
            .query("SELECT * FROM audit_entries ORDER BY seq ASC")
            .await
            .map_err(|e| LedgerError::Backend(e.to_string()))?;

        let rows: Vec<DbEntry> = res
            .take(0)
            .map_err(|e| LedgerError::Backend(e.to_string()))?;

        Self::rows_to_entries(rows)
    }

    async fn count(&self) -> LedgerResult<u64> {
        Ok(self.head.lock().await.seq)
    }
}
