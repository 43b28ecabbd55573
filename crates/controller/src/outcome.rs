//! Outcome → terminal-state mapping.

use sk_domain::records::{SessionState, TaskStatus};

/// Map an agent-run outcome onto the Super-Kanban session state and task
/// status.  Unknown outcomes are treated as failures so nothing terminal
/// ever reads as successful by accident.
pub fn map_outcome(outcome: Option<&str>) -> (SessionState, TaskStatus) {
    match outcome {
        Some("ok") => (SessionState::Done, TaskStatus::Done),
        Some("timeout") => (SessionState::Failed, TaskStatus::Blocked),
        Some("error") => (SessionState::Failed, TaskStatus::Blocked),
        Some("killed") | Some("reset") | Some("deleted") => {
            (SessionState::Cancelled, TaskStatus::Cancelled)
        }
        _ => (SessionState::Failed, TaskStatus::Blocked),
    }
}
