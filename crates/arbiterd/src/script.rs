//! JSON-lines command stream replayed through the orchestrator.
//!
//! One command per line, tagged by `op`:
//!
//! ```text
//! {"op":"register_resource","resource":{"id":"X","kind":"aisle_segment","capacity":{"units":10}}}
//! {"op":"submit","at":"2026-03-02T08:00:00Z","proposal":{...}}
//! {"op":"run_cycle","at":"2026-03-02T08:00:00Z"}
//! {"op":"respond","at":"...","proposal_id":"P1","response":{"decision":"approve","responder":"ana"}}
//! ```
//!
//! Blank lines and lines starting with `#` are skipped.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use arbiter_core::{
    EscalationResponse, LockRequest, Orchestrator, Proposal, ProposalId, Resource, ResourceId,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Command {
    RegisterResource {
        resource: Resource,
    },
    Submit {
        at: DateTime<Utc>,
        proposal: Proposal,
    },
    RunCycle {
        at: DateTime<Utc>,
    },
    SetLock {
        at: DateTime<Utc>,
        lock: LockRequest,
    },
    /// Revoke every lock on a resource.
    ClearLocks {
        at: DateTime<Utc>,
        resource_id: ResourceId,
        by: String,
    },
    /// Answer the open escalation holding `proposal_id`.
    Respond {
        at: DateTime<Utc>,
        proposal_id: ProposalId,
        response: EscalationResponse,
    },
    Cancel {
        at: DateTime<Utc>,
        proposal_id: ProposalId,
        by: String,
    },
    Expire {
        at: DateTime<Utc>,
    },
    /// Print the audit trace of a proposal.
    Trace {
        proposal_id: ProposalId,
    },
}

/// Parse a whole script, reporting the first bad line by number.
pub fn parse(input: &str) -> Result<Vec<Command>> {
    input
        .lines()
        .enumerate()
        .filter(|(_, line)| {
            let line = line.trim();
            !line.is_empty() && !line.starts_with('#')
        })
        .map(|(i, line)| {
            serde_json::from_str(line).with_context(|| format!("invalid command on line {}", i + 1))
        })
        .collect()
}

/// Run one command and return its direct result as JSON.
///
/// Arbitration failures that a planner should see (schema rejections,
/// refused human decisions) are reported in the output rather than
/// aborting the replay.
pub async fn apply(orchestrator: &Orchestrator, command: Command) -> Result<Value> {
    let outcome = match command {
        Command::RegisterResource { resource } => {
            let id = resource.id.clone();
            orchestrator
                .resources()
                .register(resource)
                .with_context(|| format!("failed to register resource {id}"))?;
            serde_json::json!({ "registered": id })
        }
        Command::Submit { at, proposal } => {
            let id = proposal.id.clone();
            match orchestrator.submit_proposal(proposal, at).await {
                Ok(stored) => serde_json::json!({ "accepted": id, "seq": stored.seq }),
                Err(err) => serde_json::json!({ "rejected": id, "error": err.to_string() }),
            }
        }
        Command::RunCycle { at } => serde_json::to_value(orchestrator.run_cycle(at).await?)?,
        Command::SetLock { at, lock } => {
            let outcome = orchestrator.set_lock(lock, at).await?;
            serde_json::json!({
                "lock_id": outcome.lock.id,
                "overlapping_reservations": outcome.overlapping.len(),
            })
        }
        Command::ClearLocks {
            at,
            resource_id,
            by,
        } => {
            let locks = orchestrator
                .resources()
                .locks_on(&resource_id)
                .with_context(|| format!("cannot list locks on {resource_id}"))?;
            let mut revoked = Vec::with_capacity(locks.len());
            for lock in locks {
                revoked.push(orchestrator.clear_lock(lock.id, &by, at).await?);
            }
            serde_json::to_value(revoked)?
        }
        Command::Respond {
            at,
            proposal_id,
            response,
        } => {
            let id = open_escalation(orchestrator, &proposal_id).await?;
            match orchestrator.respond_to_escalation(id, response, at).await {
                Ok(resolutions) => serde_json::to_value(resolutions)?,
                Err(err) => serde_json::json!({ "escalation_id": id, "error": err.to_string() }),
            }
        }
        Command::Cancel {
            at,
            proposal_id,
            by,
        } => {
            let id = open_escalation(orchestrator, &proposal_id).await?;
            serde_json::to_value(orchestrator.cancel_escalation(id, &by, at).await?)?
        }
        Command::Expire { at } => serde_json::to_value(orchestrator.expire_due(at).await?)?,
        Command::Trace { proposal_id } => {
            let trace = orchestrator
                .trace_of(&proposal_id)
                .with_context(|| format!("unknown proposal {proposal_id}"))?;
            serde_json::to_value(orchestrator.get_trace(&trace).await?)?
        }
    };
    Ok(outcome)
}

async fn open_escalation(
    orchestrator: &Orchestrator,
    proposal_id: &ProposalId,
) -> Result<arbiter_core::EscalationId> {
    orchestrator
        .escalation_for(proposal_id)
        .await
        .with_context(|| format!("no open escalation holds proposal {proposal_id}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbiter_core::EscalationDecision;

    #[test]
    fn test_parse_skips_blank_and_comment_lines() {
        let script = r#"
# dock schedule
{"op":"register_resource","resource":{"id":"D","kind":"dock_door","capacity":"exclusive"}}

{"op":"run_cycle","at":"2026-03-02T08:00:00Z"}
"#;
        let commands = parse(script).unwrap();
        assert_eq!(commands.len(), 2);
        assert!(matches!(commands[0], Command::RegisterResource { .. }));
        assert!(matches!(commands[1], Command::RunCycle { .. }));
    }

    #[test]
    fn test_parse_reports_line_number() {
        let script = "{\"op\":\"expire\",\"at\":\"2026-03-02T08:00:00Z\"}\n{\"op\":\"warp\"}\n";
        let err = parse(script).unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn test_respond_defaults_optional_fields() {
        let line = r#"{"op":"respond","at":"2026-03-02T08:05:00Z","proposal_id":"L","response":{"decision":"approve","responder":"ana"}}"#;
        let Command::Respond { response, .. } = serde_json::from_str(line).unwrap() else {
            panic!("expected respond");
        };
        assert_eq!(response.decision, EscalationDecision::Approve);
        assert!(response.modified_windows.is_empty());
        assert!(response.comment.is_none());
    }
}
