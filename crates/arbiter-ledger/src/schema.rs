//! SurrealDB row types for the audit ledger
//!
//! Rows mirror [`LedgerEntry`](crate::LedgerEntry) with strings in place of
//! typed ids so the table stays readable from the SurrealDB console.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::LedgerError;
use crate::ledger_traits::{EntryDigest, LedgerEntry, TraceId};

/// Serialize chrono DateTime as a native SurrealDB datetime
mod surreal_datetime {
    use chrono::{DateTime, Utc};
    use serde::{self, Deserialize, Deserializer, Serializer};
    use surrealdb::sql::Datetime as SurrealDatetime;

    pub fn serialize<S>(date: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let sd = SurrealDatetime::from(*date);
        serde::Serialize::serialize(&sd, serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let sd = SurrealDatetime::deserialize(deserializer)?;
        Ok(DateTime::from(sd))
    }
}

/// One row of the `audit_entries` table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntryRecord {
    /// SurrealDB record ID
    pub id: Option<surrealdb::sql::Thing>,
    pub seq: u64,
    pub trace_id: String,
    pub kind: String,
    pub subject: String,
    pub payload: serde_json::Value,
    #[serde(with = "surreal_datetime")]
    pub recorded_at: DateTime<Utc>,
    pub prev_digest: String,
    pub digest: String,
}

impl From<&LedgerEntry> for AuditEntryRecord {
    fn from(entry: &LedgerEntry) -> Self {
        AuditEntryRecord {
            id: None,
            seq: entry.seq,
            trace_id: entry.trace_id.0.clone(),
            kind: entry.kind.as_str().to_string(),
            subject: entry.subject.clone(),
            payload: entry.payload.clone(),
            recorded_at: entry.recorded_at,
            prev_digest: entry.prev_digest.as_str().to_string(),
            digest: entry.digest.as_str().to_string(),
        }
    }
}

impl TryFrom<AuditEntryRecord> for LedgerEntry {
    type Error = LedgerError;

    fn try_from(row: AuditEntryRecord) -> Result<Self, Self::Error> {
        Ok(LedgerEntry {
            seq: row.seq,
            trace_id: TraceId(row.trace_id),
            kind: row.kind.parse()?,
            subject: row.subject,
            payload: row.payload,
            recorded_at: row.recorded_at,
            prev_digest: EntryDigest::try_from(row.prev_digest)?,
            digest: EntryDigest::try_from(row.digest)?,
        })
    }
}
