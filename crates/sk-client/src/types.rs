//! Wire types for the Super-Kanban API.  Responses arrive wrapped in
//! `{ "data": … }`; field names follow the server's camelCase.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use sk_domain::records::{EntityType, MessageRole, SessionState, TaskStatus, ToolCallStatus};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Envelope
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
pub struct Envelope<T> {
    pub data: T,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Entity upserts
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpsertProjectRequest {
    pub external_id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpsertWorkItemRequest {
    pub external_id: String,
    pub project_external_id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpsertTaskRequest {
    pub external_id: String,
    pub work_item_external_id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
}

/// An entity as the server reports it back.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkEntity {
    pub id: String,
    #[serde(default)]
    pub external_id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub archived: Option<bool>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Sessions
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Attach (or re-attach) an execution session to an entity.  One of
/// `entity_id` / `entity_external_id` is required; a payload missing both is
/// a programming error the sender skips.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachSessionRequest {
    pub session_key: String,
    pub entity_type: EntityType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_external_id: Option<String>,
    pub state: SessionState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<String>,
}

/// A session as `/sessions/resolve` or the per-entity listings report it.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkSession {
    pub id: String,
    pub session_key: String,
    pub state: SessionState,
    #[serde(default)]
    pub entity_type: Option<EntityType>,
    #[serde(default)]
    pub entity_id: Option<String>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Messages / tool calls / events
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordMessageRequest {
    pub session_key: String,
    pub entity_type: EntityType,
    pub entity_external_id: String,
    pub message_key: String,
    pub role: MessageRole,
    pub content: String,
    /// ISO-8601 with millisecond precision, or null when unknown.
    pub occurred_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordToolCallRequest {
    pub session_key: String,
    pub entity_type: EntityType,
    pub entity_external_id: String,
    pub tool_call_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    pub status: ToolCallStatus,
    pub occurred_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

/// Idempotent comment/event post; the server dedupes on `event_id`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostEventRequest {
    pub event_id: String,
    pub entity_type: EntityType,
    pub entity_external_id: String,
    pub kind: String,
    pub body: String,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Locks / patches
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LockTaskRequest {
    pub owner: String,
    pub ttl_seconds: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnlockTaskRequest {
    pub owner: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PatchStatusRequest {
    pub status: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PatchArchivedRequest {
    pub archived: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attach_request_wire_shape() {
        let req = AttachSessionRequest {
            session_key: "agent:work:main".into(),
            entity_type: EntityType::Task,
            entity_id: None,
            entity_external_id: Some("task:a:w:t".into()),
            state: SessionState::Running,
            started_at: Some("2026-03-01T12:00:00.000Z".into()),
            ended_at: None,
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["sessionKey"], "agent:work:main");
        assert_eq!(json["entityType"], "TASK");
        assert_eq!(json["state"], "RUNNING");
        assert!(json.get("entityId").is_none());
    }

    #[test]
    fn message_request_serializes_null_occurred_at() {
        let req = RecordMessageRequest {
            session_key: "s".into(),
            entity_type: EntityType::Project,
            entity_external_id: "project:p".into(),
            message_key: "s:m1".into(),
            role: MessageRole::User,
            content: "hi".into(),
            occurred_at: None,
            metadata: None,
        };
        let json = serde_json::to_value(&req).unwrap();
        assert!(json["occurredAt"].is_null());
        assert_eq!(json["role"], "user");
    }

    #[test]
    fn envelope_unwraps_data() {
        let raw = r#"{"data":{"id":"42","externalId":"project:p"}}"#;
        let env: Envelope<SkEntity> = serde_json::from_str(raw).unwrap();
        assert_eq!(env.data.id, "42");
        assert_eq!(env.data.external_id.as_deref(), Some("project:p"));
    }

    #[test]
    fn session_state_round_trip() {
        let raw = r#"{"data":{"id":"1","sessionKey":"k","state":"RUNNING"}}"#;
        let env: Envelope<SkSession> = serde_json::from_str(raw).unwrap();
        assert_eq!(env.data.state, SessionState::Running);
    }
}
