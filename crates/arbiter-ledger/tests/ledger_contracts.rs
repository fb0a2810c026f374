//! Contract tests for AuditLedger.
//!
//! Each contract is written once against `&dyn AuditLedger` and run against
//! both the in-memory fake and the SurrealDB backend.

use arbiter_ledger::fakes::MemoryAuditLedger;
use arbiter_ledger::{
    AuditLedger, EntryDigest, EntryKind, LedgerError, NewEntry, SurrealAuditLedger, TraceId,
};
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::json;

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap()
}

fn entry(trace: &str, kind: EntryKind, subject: &str, minute: i64) -> NewEntry {
    NewEntry::new(
        TraceId::from(trace),
        kind,
        subject,
        json!({ "subject": subject, "minute": minute, "score": 0.25 }),
        t0() + Duration::minutes(minute),
    )
}

// ── Contracts ──────────────────────────────────────────────────────────

async fn contract_seq_is_gap_free(ledger: &dyn AuditLedger) {
    let a = ledger
        .append(entry("t-1", EntryKind::ProposalSubmitted, "p-1", 0))
        .await
        .unwrap();
    let b = ledger
        .append(entry("t-2", EntryKind::ProposalSubmitted, "p-2", 1))
        .await
        .unwrap();
    let c = ledger
        .append(entry("t-1", EntryKind::ResolutionDecided, "p-1", 2))
        .await
        .unwrap();

    assert_eq!((a.seq, b.seq, c.seq), (1, 2, 3));
    assert_eq!(a.prev_digest, EntryDigest::genesis());
    assert_eq!(b.prev_digest, a.digest);
    assert_eq!(c.prev_digest, b.digest);
    assert_eq!(ledger.count().await.unwrap(), 3);
}

async fn contract_trace_filters_and_orders(ledger: &dyn AuditLedger) {
    for (i, trace) in ["t-a", "t-b", "t-a", "t-b", "t-a"].iter().enumerate() {
        ledger
            .append(entry(trace, EntryKind::StateTransition, "p", i as i64))
            .await
            .unwrap();
    }

    let a = ledger.entries_for_trace(&TraceId::from("t-a")).await.unwrap();
    let seqs: Vec<u64> = a.iter().map(|e| e.seq).collect();
    assert_eq!(seqs, vec![1, 3, 5]);

    let missing = ledger.entries_for_trace(&TraceId::from("t-z")).await.unwrap();
    assert!(missing.is_empty());
}

async fn contract_get_trace_follows_merges(ledger: &dyn AuditLedger) {
    ledger
        .append(entry("t-1", EntryKind::ProposalSubmitted, "p-1", 0))
        .await
        .unwrap();
    ledger
        .append(entry("t-2", EntryKind::ProposalSubmitted, "p-2", 1))
        .await
        .unwrap();
    ledger
        .append(entry("t-3", EntryKind::ProposalSubmitted, "p-3", 2))
        .await
        .unwrap();
    ledger
        .append(NewEntry::trace_merged(
            TraceId::from("t-2"),
            &TraceId::from("t-3"),
            t0(),
        ))
        .await
        .unwrap();
    ledger
        .append(NewEntry::trace_merged(
            TraceId::from("t-1"),
            &TraceId::from("t-2"),
            t0(),
        ))
        .await
        .unwrap();
    ledger
        .append(entry("t-1", EntryKind::ConflictDetected, "c-1", 3))
        .await
        .unwrap();

    let trace = ledger.get_trace(&TraceId::from("t-1")).await.unwrap();
    let seqs: Vec<u64> = trace.iter().map(|e| e.seq).collect();
    assert_eq!(seqs, vec![1, 2, 3, 4, 5, 6]);

    // Merges only flow downward: the absorbed trace does not see its parent.
    let child = ledger.get_trace(&TraceId::from("t-3")).await.unwrap();
    assert_eq!(child.len(), 1);
}

async fn contract_chain_verifies(ledger: &dyn AuditLedger) {
    assert_eq!(ledger.verify_chain().await.unwrap(), 0);
    for i in 0..4 {
        ledger
            .append(entry("t-1", EntryKind::LockSet, "lock-1", i))
            .await
            .unwrap();
    }
    assert_eq!(ledger.verify_chain().await.unwrap(), 4);

    let entries = ledger.entries().await.unwrap();
    assert_eq!(entries[2].payload["score"], json!(0.25));
    assert_eq!(entries[2].recorded_at, t0() + Duration::minutes(2));
}

// ── MemoryAuditLedger ──────────────────────────────────────────────────

#[tokio::test]
async fn memory_seq_is_gap_free() {
    contract_seq_is_gap_free(&MemoryAuditLedger::new()).await;
}

#[tokio::test]
async fn memory_trace_filters_and_orders() {
    contract_trace_filters_and_orders(&MemoryAuditLedger::new()).await;
}

#[tokio::test]
async fn memory_get_trace_follows_merges() {
    contract_get_trace_follows_merges(&MemoryAuditLedger::new()).await;
}

#[tokio::test]
async fn memory_chain_verifies() {
    contract_chain_verifies(&MemoryAuditLedger::new()).await;
}

#[tokio::test]
async fn memory_concurrent_appends_stay_chained() {
    let ledger = std::sync::Arc::new(MemoryAuditLedger::new());
    let mut tasks = Vec::new();
    for i in 0..16 {
        let ledger = std::sync::Arc::clone(&ledger);
        tasks.push(tokio::spawn(async move {
            ledger
                .append(entry("t-c", EntryKind::ProposalSubmitted, &format!("p-{i}"), i))
                .await
                .unwrap();
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }
    assert_eq!(ledger.verify_chain().await.unwrap(), 16);
}

// ── SurrealAuditLedger ─────────────────────────────────────────────────

mod surreal_ledger_tests {
    use super::*;

    async fn ledger() -> SurrealAuditLedger {
        SurrealAuditLedger::in_memory()
            .await
            .expect("in_memory() failed")
    }

    #[tokio::test]
    async fn seq_is_gap_free() {
        contract_seq_is_gap_free(&ledger().await).await;
    }

    #[tokio::test]
    async fn trace_filters_and_orders() {
        contract_trace_filters_and_orders(&ledger().await).await;
    }

    #[tokio::test]
    async fn get_trace_follows_merges() {
        contract_get_trace_follows_merges(&ledger().await).await;
    }

    #[tokio::test]
    async fn chain_verifies() {
        contract_chain_verifies(&ledger().await).await;
    }

    #[tokio::test]
    async fn local_file_ledger_appends() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = SurrealAuditLedger::open_local(&dir.path().join("audit"))
            .await
            .unwrap();
        ledger
            .append(entry("t-1", EntryKind::ProposalSubmitted, "p-1", 0))
            .await
            .unwrap();
        assert_eq!(ledger.verify_chain().await.unwrap(), 1);
    }
}

#[test]
fn chain_broken_error_names_seq() {
    let err = LedgerError::ChainBroken {
        seq: 7,
        detail: "content digest mismatch".to_string(),
    };
    assert!(err.to_string().contains("seq 7"));
}
