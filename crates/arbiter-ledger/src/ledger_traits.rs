//! Audit ledger abstractions.
//!
//! - [`AuditLedger`]: append-only, trace-correlated log of arbitration facts
//! - [`LedgerEntry`]: one immutable, hash-chained record
//! - [`TraceId`]: correlation key shared by every entry of one conflict
//!
//! The trait is async and backend-agnostic. An in-memory fake lives in
//! [`crate::fakes`]; [`crate::SurrealAuditLedger`] persists to SurrealDB.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::Sha256;

use crate::error::LedgerError;

/// Result type for ledger operations
pub type LedgerResult<T> = std::result::Result<T, LedgerError>;

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Correlation id shared by all entries that explain one conflict.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TraceId(pub String);

impl TraceId {
    /// Generate a new random trace id
    pub fn new() -> Self {
        TraceId(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TraceId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for TraceId {
    fn from(s: &str) -> Self {
        TraceId(s.to_string())
    }
}

/// SHA-256 digest linking an entry to its predecessor.
///
/// The inner field is private so the value is always 64 lowercase hex chars.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntryDigest(String);

impl EntryDigest {
    /// Digest of arbitrary bytes.
    pub fn from_bytes(data: &[u8]) -> Self {
        use sha2::Digest;
        let mut hasher = Sha256::new();
        hasher.update(data);
        EntryDigest(hex::encode(hasher.finalize()))
    }

    /// The `prev_digest` of the first entry in a ledger.
    pub fn genesis() -> Self {
        EntryDigest("0".repeat(64))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short form (first 12 hex chars).
    pub fn short(&self) -> &str {
        &self.0[..12.min(self.0.len())]
    }
}

impl TryFrom<String> for EntryDigest {
    type Error = LedgerError;

    fn try_from(s: String) -> std::result::Result<Self, Self::Error> {
        if s.len() != 64 || !s.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(LedgerError::InvalidDigest { digest: s });
        }
        Ok(EntryDigest(s.to_ascii_lowercase()))
    }
}

impl fmt::Display for EntryDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Entries
// ---------------------------------------------------------------------------

/// What a ledger entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    ProposalSubmitted,
    ProposalRejected,
    StateTransition,
    ConflictDetected,
    ResolutionDecided,
    ReservationCommitted,
    Escalated,
    EscalationResolved,
    EscalationExpired,
    LockSet,
    LockCleared,
    TraceMerged,
}

impl EntryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryKind::ProposalSubmitted => "proposal_submitted",
            EntryKind::ProposalRejected => "proposal_rejected",
            EntryKind::StateTransition => "state_transition",
            EntryKind::ConflictDetected => "conflict_detected",
            EntryKind::ResolutionDecided => "resolution_decided",
            EntryKind::ReservationCommitted => "reservation_committed",
            EntryKind::Escalated => "escalated",
            EntryKind::EscalationResolved => "escalation_resolved",
            EntryKind::EscalationExpired => "escalation_expired",
            EntryKind::LockSet => "lock_set",
            EntryKind::LockCleared => "lock_cleared",
            EntryKind::TraceMerged => "trace_merged",
        }
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntryKind {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let kind = match s {
            "proposal_submitted" => EntryKind::ProposalSubmitted,
            "proposal_rejected" => EntryKind::ProposalRejected,
            "state_transition" => EntryKind::StateTransition,
            "conflict_detected" => EntryKind::ConflictDetected,
            "resolution_decided" => EntryKind::ResolutionDecided,
            "reservation_committed" => EntryKind::ReservationCommitted,
            "escalated" => EntryKind::Escalated,
            "escalation_resolved" => EntryKind::EscalationResolved,
            "escalation_expired" => EntryKind::EscalationExpired,
            "lock_set" => EntryKind::LockSet,
            "lock_cleared" => EntryKind::LockCleared,
            "trace_merged" => EntryKind::TraceMerged,
            other => {
                return Err(LedgerError::Backend(format!(
                    "unknown ledger entry kind: {other}"
                )))
            }
        };
        Ok(kind)
    }
}

/// Payload key under which a `TraceMerged` entry names the absorbed trace.
pub const MERGED_TRACE_KEY: &str = "merged_trace";

/// An entry as submitted by a caller, before sequencing and chaining.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewEntry {
    pub trace_id: TraceId,
    pub kind: EntryKind,
    /// The id of the thing the entry is about (proposal, escalation, lock).
    pub subject: String,
    pub payload: Value,
    pub recorded_at: DateTime<Utc>,
}

impl NewEntry {
    pub fn new(
        trace_id: TraceId,
        kind: EntryKind,
        subject: impl Into<String>,
        payload: Value,
        recorded_at: DateTime<Utc>,
    ) -> Self {
        Self {
            trace_id,
            kind,
            subject: subject.into(),
            payload,
            recorded_at,
        }
    }

    /// A `TraceMerged` entry recording that `absorbed` now belongs to `into`.
    pub fn trace_merged(into: TraceId, absorbed: &TraceId, recorded_at: DateTime<Utc>) -> Self {
        Self::new(
            into,
            EntryKind::TraceMerged,
            absorbed.as_str(),
            serde_json::json!({ MERGED_TRACE_KEY: absorbed.as_str() }),
            recorded_at,
        )
    }

    /// Sequence and chain this entry behind `prev`.
    pub fn seal(self, seq: u64, prev: EntryDigest) -> LedgerEntry {
        let digest = chain_digest(
            seq,
            &self.trace_id,
            self.kind,
            &self.subject,
            &self.payload,
            &self.recorded_at,
            &prev,
        );
        LedgerEntry {
            seq,
            trace_id: self.trace_id,
            kind: self.kind,
            subject: self.subject,
            payload: self.payload,
            recorded_at: self.recorded_at,
            prev_digest: prev,
            digest,
        }
    }
}

/// An immutable ledger record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Ledger-wide monotonic sequence number, starting at 1
    pub seq: u64,
    pub trace_id: TraceId,
    pub kind: EntryKind,
    pub subject: String,
    pub payload: Value,
    pub recorded_at: DateTime<Utc>,
    pub prev_digest: EntryDigest,
    pub digest: EntryDigest,
}

impl LedgerEntry {
    /// For `TraceMerged` entries, the trace that was folded into this one.
    pub fn merged_trace(&self) -> Option<TraceId> {
        if self.kind != EntryKind::TraceMerged {
            return None;
        }
        self.payload
            .get(MERGED_TRACE_KEY)
            .and_then(Value::as_str)
            .map(TraceId::from)
    }

    /// Recompute the digest from the entry's content.
    pub fn recompute_digest(&self) -> EntryDigest {
        chain_digest(
            self.seq,
            &self.trace_id,
            self.kind,
            &self.subject,
            &self.payload,
            &self.recorded_at,
            &self.prev_digest,
        )
    }
}

fn chain_digest(
    seq: u64,
    trace_id: &TraceId,
    kind: EntryKind,
    subject: &str,
    payload: &Value,
    recorded_at: &DateTime<Utc>,
    prev: &EntryDigest,
) -> EntryDigest {
    let mut canonical = String::new();
    canonical.push_str(&seq.to_string());
    canonical.push('\n');
    canonical.push_str(trace_id.as_str());
    canonical.push('\n');
    canonical.push_str(kind.as_str());
    canonical.push('\n');
    canonical.push_str(subject);
    canonical.push('\n');
    write_canonical(payload, &mut canonical);
    canonical.push('\n');
    canonical.push_str(&recorded_at.to_rfc3339_opts(SecondsFormat::Nanos, true));
    canonical.push('\n');
    canonical.push_str(prev.as_str());
    EntryDigest::from_bytes(canonical.as_bytes())
}

/// JSON with object keys sorted, so the digest survives backend round trips.
fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String((*key).clone()).to_string());
                out.push(':');
                if let Some(v) = map.get(*key) {
                    write_canonical(v, out);
                }
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        other => out.push_str(&other.to_string()),
    }
}

// ---------------------------------------------------------------------------
// AuditLedger
// ---------------------------------------------------------------------------

/// Append-only audit ledger.
///
/// Guarantees:
/// - `append` assigns a gap-free, strictly increasing `seq`.
/// - Each entry's `prev_digest` is the `digest` of the entry before it.
/// - Entries are never updated or deleted.
#[async_trait]
pub trait AuditLedger: Send + Sync {
    /// Append an entry and return the sealed record.
    async fn append(&self, entry: NewEntry) -> LedgerResult<LedgerEntry>;

    /// Entries recorded directly under `trace_id`, ordered by `seq`.
    async fn entries_for_trace(&self, trace_id: &TraceId) -> LedgerResult<Vec<LedgerEntry>>;

    /// Every entry, ordered by `seq`.
    async fn entries(&self) -> LedgerResult<Vec<LedgerEntry>>;

    /// Number of entries appended so far.
    async fn count(&self) -> LedgerResult<u64>;

    /// Full trace, including traces merged into it, ordered by `seq`.
    async fn get_trace(&self, trace_id: &TraceId) -> LedgerResult<Vec<LedgerEntry>> {
        let mut pending = vec![trace_id.clone()];
        let mut seen: HashSet<TraceId> = HashSet::new();
        let mut out: Vec<LedgerEntry> = Vec::new();

        while let Some(trace) = pending.pop() {
            if !seen.insert(trace.clone()) {
                continue;
            }
            let entries = self.entries_for_trace(&trace).await?;
            pending.extend(entries.iter().filter_map(LedgerEntry::merged_trace));
            out.extend(entries);
        }

        out.sort_by_key(|e| e.seq);
        out.dedup_by_key(|e| e.seq);
        Ok(out)
    }

    /// Walk the whole chain and return the number of verified entries.
    async fn verify_chain(&self) -> LedgerResult<u64> {
        let entries = self.entries().await?;
        let mut prev = EntryDigest::genesis();
        for (i, entry) in entries.iter().enumerate() {
            let expected_seq = i as u64 + 1;
            if entry.seq != expected_seq {
                return Err(LedgerError::ChainBroken {
                    seq: entry.seq,
                    detail: format!("expected seq {expected_seq}"),
                });
            }
            if entry.prev_digest != prev {
                return Err(LedgerError::ChainBroken {
                    seq: entry.seq,
                    detail: "prev_digest does not match predecessor".to_string(),
                });
            }
            if entry.recompute_digest() != entry.digest {
                return Err(LedgerError::ChainBroken {
                    seq: entry.seq,
                    detail: "content digest mismatch".to_string(),
                });
            }
            prev = entry.digest.clone();
        }
        Ok(entries.len() as u64)
    }
}
