//! Arbiter-Ledger: append-only audit trail for warehouse arbitration
//!
//! Every proposal, resolution, escalation transition and lock change is
//! appended here as an immutable, hash-chained entry carrying a trace id.
//! Reconstructing "why" after the fact is a matter of reading one trace.
//!
//! ## Key Components
//!
//! - `AuditLedger`: async append/read contract
//! - `MemoryAuditLedger`: in-process implementation
//! - `SurrealAuditLedger`: SurrealDB implementation (`mem://`, `surrealkv://`, `ws://`)

mod error;
pub mod fakes;
pub mod ledger_traits;
mod migrations;
mod schema;
pub mod surreal_ledger;

pub use error::LedgerError;
pub use ledger_traits::{
    AuditLedger, EntryDigest, EntryKind, LedgerEntry, LedgerResult, NewEntry, TraceId,
    MERGED_TRACE_KEY,
};
pub use surreal_ledger::SurrealAuditLedger;
