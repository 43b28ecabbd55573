//! Spool wire format: one tagged JSON event per line of `spool.jsonl`.

use serde::{Deserialize, Serialize};

use sk_client::types::{RecordMessageRequest, RecordToolCallRequest};

/// A queued server-bound event.  Tagged `{ "kind": …, "payload": … }` so the
/// sender can dispatch without sniffing payload fields, and so old spool
/// lines remain recognizable across versions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload")]
pub enum SpoolEvent {
    #[serde(rename = "message")]
    Message(RecordMessageRequest),
    #[serde(rename = "toolCall")]
    ToolCall(RecordToolCallRequest),
}

impl SpoolEvent {
    pub fn session_key(&self) -> &str {
        match self {
            Self::Message(m) => &m.session_key,
            Self::ToolCall(t) => &t.session_key,
        }
    }

    pub fn entity_external_id(&self) -> &str {
        match self {
            Self::Message(m) => &m.entity_external_id,
            Self::ToolCall(t) => &t.entity_external_id,
        }
    }

    pub fn occurred_at(&self) -> Option<&str> {
        match self {
            Self::Message(m) => m.occurred_at.as_deref(),
            Self::ToolCall(t) => t.occurred_at.as_deref(),
        }
    }
}
