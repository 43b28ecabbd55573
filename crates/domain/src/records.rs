//! Record and entity types shared by the exporter, reconciler, and session
//! controller.  These mirror what the Super-Kanban integration API expects
//! on the wire, so serde renames follow the server's casing.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Entities and statuses
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Work-entity level in the Super-Kanban hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityType {
    Project,
    WorkItem,
    Task,
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Project => write!(f, "PROJECT"),
            Self::WorkItem => write!(f, "WORK_ITEM"),
            Self::Task => write!(f, "TASK"),
        }
    }
}

/// Execution-session state as Super-Kanban tracks it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionState {
    Running,
    Done,
    Failed,
    Cancelled,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Running)
    }
}

/// Task status in Super-Kanban.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    InProgress,
    Done,
    Blocked,
    Cancelled,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Transcript-derived records
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Normalized role of an exported message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
    Tool,
}

/// Lifecycle of a tool invocation extracted from a transcript.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ToolCallStatus {
    Started,
    Succeeded,
    Failed,
}

/// A message extracted from one transcript line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageRecord {
    pub session_id: String,
    pub agent_id: Option<String>,
    pub topic_id: Option<String>,
    pub message_id: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
    pub role: MessageRole,
    pub text: String,
}

/// A tool-call start or completion extracted from one transcript line.
///
/// `tool_call_id` is stable: taken from the block when present, otherwise
/// derived as `"<messageId|sessionId:ts>:<blockIndex>"` so that a completion
/// always correlates with its start.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallRecord {
    pub session_id: String,
    pub agent_id: Option<String>,
    pub topic_id: Option<String>,
    pub message_id: Option<String>,
    pub tool_call_id: String,
    pub tool_name: Option<String>,
    pub status: ToolCallStatus,
    pub timestamp: Option<DateTime<Utc>>,
    pub params_text: Option<String>,
    pub result_text: Option<String>,
    pub error_text: Option<String>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Session identity
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Identity derived from a transcript file path
/// `…/agents/<agentId>/sessions/<sessionId>[-topic-<urlEncodedTopic>].jsonl`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionFileContext {
    pub agent_id: Option<String>,
    pub session_id: String,
    pub topic_id: Option<String>,
}

/// The binding of an agent-side session to a Super-Kanban entity, resolved
/// from `sessions.json` plus routing-label parsing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionBinding {
    pub session_key: String,
    pub label: String,
    pub entity_type: EntityType,
    pub entity_external_id: String,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Timestamp helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Render a timestamp the way the Super-Kanban API expects it:
/// ISO-8601 with millisecond precision, UTC `Z` suffix.
pub fn to_iso_millis(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Render an optional occurrence timestamp, `None` → JSON null downstream.
pub fn to_iso_millis_opt(ts: Option<DateTime<Utc>>) -> Option<String> {
    ts.map(to_iso_millis)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn entity_type_wire_casing() {
        assert_eq!(
            serde_json::to_string(&EntityType::WorkItem).unwrap(),
            "\"WORK_ITEM\""
        );
        assert_eq!(EntityType::Task.to_string(), "TASK");
    }

    #[test]
    fn role_wire_casing() {
        assert_eq!(serde_json::to_string(&MessageRole::Tool).unwrap(), "\"tool\"");
    }

    #[test]
    fn terminal_states() {
        assert!(!SessionState::Running.is_terminal());
        assert!(SessionState::Done.is_terminal());
        assert!(SessionState::Cancelled.is_terminal());
    }

    #[test]
    fn iso_millis_rendering() {
        let ts = Utc.with_ymd_and_hms(2026, 3, 1, 12, 30, 5).unwrap();
        assert_eq!(to_iso_millis(ts), "2026-03-01T12:30:05.000Z");
    }
}
