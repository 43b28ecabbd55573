//! Idempotency keys for message and tool-call posts.
//!
//! Super-Kanban upserts by key, so replays (crash recovery, the reconciler)
//! must derive the same key for the same logical event every time.

use crate::sha1_hex;

/// Deterministic key for a message post.
///
/// With an explicit message ID the key is simply `<sessionKey>:<messageId>`.
/// Without one it falls back to a content hash over
/// `role + "|" + occurredAtMs + "|" + content` so identical replays collide
/// and distinct messages do not.
pub fn build_sk_message_key(
    session_key: &str,
    message_id: Option<&str>,
    role: &str,
    occurred_at_ms: Option<i64>,
    content: &str,
) -> String {
    if let Some(id) = message_id.filter(|id| !id.is_empty()) {
        return format!("{session_key}:{id}");
    }
    let ts = occurred_at_ms.map(|ms| ms.to_string()).unwrap_or_default();
    let digest = sha1_hex(&format!("{role}|{ts}|{content}"));
    format!("{session_key}:msg:{digest}")
}

/// Deterministic key for a tool-call post: `<sessionKey>:<toolCallId>`.
pub fn build_sk_tool_call_key(session_key: &str, tool_call_id: &str) -> String {
    format!("{session_key}:{tool_call_id}")
}
