//! In-memory fake for the audit ledger (testing and embedded use)
//!
//! Provides `MemoryAuditLedger`, which satisfies the [`AuditLedger`] contract
//! without any external dependencies, and `FlakyAuditLedger`, which wraps it
//! with one injected write failure.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;

use crate::error::LedgerError;
use crate::ledger_traits::*;

/// In-memory ledger backed by a `Vec<LedgerEntry>`.
#[derive(Debug, Default)]
pub struct MemoryAuditLedger {
    entries: Mutex<Vec<LedgerEntry>>,
}

impl MemoryAuditLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_entries<T>(&self, f: impl FnOnce(&mut Vec<LedgerEntry>) -> T) -> T {
        let mut guard = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }
}

#[async_trait]
impl AuditLedger for MemoryAuditLedger {
    async fn append(&self, entry: NewEntry) -> LedgerResult<LedgerEntry> {
        Ok(self.with_entries(|entries| {
            let prev = entries
                .last()
                .map(|e| e.digest.clone())
                .unwrap_or_else(EntryDigest::genesis);
            let sealed = entry.seal(entries.len() as u64 + 1, prev);
            entries.push(sealed.clone());
            sealed
        }))
    }

    async fn entries_for_trace(&self, trace_id: &TraceId) -> LedgerResult<Vec<LedgerEntry>> {
        Ok(self.with_entries(|entries| {
            entries
                .iter()
                .filter(|e| &e.trace_id == trace_id)
                .cloned()
                .collect()
        }))
    }

    async fn entries(&self) -> LedgerResult<Vec<LedgerEntry>> {
        Ok(self.with_entries(|entries| entries.clone()))
    }

    async fn count(&self) -> LedgerResult<u64> {
        Ok(self.with_entries(|entries| entries.len() as u64))
    }
}

/// Memory ledger that refuses the first append of one entry kind, then
/// behaves normally. Used to exercise recovery from audit write failures.
#[derive(Debug)]
pub struct FlakyAuditLedger {
    inner: MemoryAuditLedger,
    fail_on: EntryKind,
    tripped: AtomicBool,
}

impl FlakyAuditLedger {
    pub fn failing_once_on(kind: EntryKind) -> Self {
        Self {
            inner: MemoryAuditLedger::new(),
            fail_on: kind,
            tripped: AtomicBool::new(false),
        }
    }

    /// True once the injected failure has fired.
    pub fn tripped(&self) -> bool {
        self.tripped.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AuditLedger for FlakyAuditLedger {
    async fn append(&self, entry: NewEntry) -> LedgerResult<LedgerEntry> {
        if entry.kind == self.fail_on && !self.tripped.swap(true, Ordering::SeqCst) {
            return Err(LedgerError::Backend(format!(
                "injected failure appending {:?}",
                entry.kind
            )));
        }
        self.inner.append(entry).await
    }

    async fn entries_for_trace(&self, trace_id: &TraceId) -> LedgerResult<Vec<LedgerEntry>> {
        self.inner.entries_for_trace(trace_id).await
    }

    async fn entries(&self) -> LedgerResult<Vec<LedgerEntry>> {
        self.inner.entries().await
    }

    async fn count(&self) -> LedgerResult<u64> {
        self.inner.count().await
    }
}
