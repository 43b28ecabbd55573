//! Transcript line parser.
//!
//! One JSONL line in, a normalized `(attach, messages, tool_calls)` triple
//! out.  The agent runtime's transcript schema is loose — roles and block
//! type tags vary across runtime versions — so everything here parses
//! defensively and drops what it cannot understand rather than failing the
//! tail.

use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;

use sk_domain::records::{
    MessageRecord, MessageRole, SessionFileContext, ToolCallRecord, ToolCallStatus,
};

/// Everything extracted from a single transcript line.
#[derive(Debug, Clone, Default)]
pub struct ParsedLine {
    /// Whether this line implies the session should be attached upstream.
    pub attach: bool,
    pub messages: Vec<MessageRecord>,
    pub tool_calls: Vec<ToolCallRecord>,
}

/// Parse one transcript line.  Returns `None` for lines that are not JSON,
/// not `type == "message"`, or yield nothing exportable.
pub fn parse_transcript_line(ctx: &SessionFileContext, line: &str) -> Option<ParsedLine> {
    let record: Value = serde_json::from_str(line.trim()).ok()?;
    if record.get("type").and_then(Value::as_str) != Some("message") {
        return None;
    }

    let message = record.get("message")?.as_object()?;
    let role = message.get("role").and_then(Value::as_str)?;

    let message_id = record
        .get("id")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_owned);
    let (timestamp, ts_ms) = parse_timestamp(record.get("timestamp"));
    let content = message.get("content");

    let mut out = ParsedLine::default();

    match role {
        "user" | "assistant" => {
            let msg_role = if role == "user" {
                MessageRole::User
            } else {
                MessageRole::Assistant
            };

            let text = collect_text(content);
            if !text.is_empty() {
                out.messages.push(MessageRecord {
                    session_id: ctx.session_id.clone(),
                    agent_id: ctx.agent_id.clone(),
                    topic_id: ctx.topic_id.clone(),
                    message_id: message_id.clone(),
                    timestamp,
                    role: msg_role,
                    text,
                });
            }

            if role == "assistant" {
                if let Some(blocks) = content.and_then(Value::as_array) {
                    extract_tool_blocks(ctx, &message_id, timestamp, ts_ms, blocks, &mut out);
                }
            }
        }
        "toolResult" | "tool_result" => {
            let tool_call_id = str_field(message, &["toolCallId", "tool_call_id"])?;
            let failed = truthy(message.get("isError")) || truthy(message.get("is_error"));
            let text = collect_text(content);

            out.tool_calls.push(ToolCallRecord {
                session_id: ctx.session_id.clone(),
                agent_id: ctx.agent_id.clone(),
                topic_id: ctx.topic_id.clone(),
                message_id: message_id.clone(),
                tool_call_id,
                tool_name: str_field(message, &["toolName", "tool_name", "name"]),
                status: if failed {
                    ToolCallStatus::Failed
                } else {
                    ToolCallStatus::Succeeded
                },
                timestamp,
                params_text: None,
                result_text: Some(text.clone()),
                error_text: failed.then(|| text.clone()),
            });

            if !text.is_empty() {
                out.messages.push(MessageRecord {
                    session_id: ctx.session_id.clone(),
                    agent_id: ctx.agent_id.clone(),
                    topic_id: ctx.topic_id.clone(),
                    message_id,
                    timestamp,
                    role: MessageRole::Tool,
                    text,
                });
            }
        }
        _ => return None,
    }

    if out.messages.is_empty() && out.tool_calls.is_empty() {
        return None;
    }
    out.attach = true;
    Some(out)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Assistant content blocks
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn extract_tool_blocks(
    ctx: &SessionFileContext,
    message_id: &Option<String>,
    timestamp: Option<DateTime<Utc>>,
    ts_ms: Option<i64>,
    blocks: &[Value],
    out: &mut ParsedLine,
) {
    for (index, block) in blocks.iter().enumerate() {
        let Some(obj) = block.as_object() else {
            continue;
        };
        let Some(tag) = obj.get("type").and_then(Value::as_str) else {
            continue;
        };

        match tag.to_ascii_lowercase().as_str() {
            "toolcall" | "tool_call" | "tool_use" => {
                out.tool_calls.push(ToolCallRecord {
                    session_id: ctx.session_id.clone(),
                    agent_id: ctx.agent_id.clone(),
                    topic_id: ctx.topic_id.clone(),
                    message_id: message_id.clone(),
                    tool_call_id: block_tool_call_id(obj, ctx, message_id, ts_ms, index),
                    tool_name: str_field(obj, &["name", "toolName", "tool_name"]),
                    status: ToolCallStatus::Started,
                    timestamp,
                    params_text: params_text(obj),
                    result_text: None,
                    error_text: None,
                });
            }
            "tool_result" | "tool_result_error" | "toolresult" => {
                let failed = tag.eq_ignore_ascii_case("tool_result_error")
                    || truthy(obj.get("is_error"))
                    || truthy(obj.get("isError"));
                let text = collect_text(obj.get("content").or_else(|| obj.get("text")));

                out.tool_calls.push(ToolCallRecord {
                    session_id: ctx.session_id.clone(),
                    agent_id: ctx.agent_id.clone(),
                    topic_id: ctx.topic_id.clone(),
                    message_id: message_id.clone(),
                    tool_call_id: block_tool_call_id(obj, ctx, message_id, ts_ms, index),
                    tool_name: str_field(obj, &["name", "toolName", "tool_name"]),
                    status: if failed {
                        ToolCallStatus::Failed
                    } else {
                        ToolCallStatus::Succeeded
                    },
                    timestamp,
                    params_text: None,
                    result_text: Some(text.clone()),
                    error_text: failed.then_some(text),
                });
            }
            _ => {}
        }
    }
}

/// Stable tool-call ID: the block's own ID when present, otherwise
/// `"<messageId|sessionId:ts>:<blockIndex>"`.
fn block_tool_call_id(
    obj: &serde_json::Map<String, Value>,
    ctx: &SessionFileContext,
    message_id: &Option<String>,
    ts_ms: Option<i64>,
    index: usize,
) -> String {
    if let Some(id) = str_field(obj, &["id", "toolCallId", "tool_call_id"]) {
        return id;
    }
    let prefix = match message_id {
        Some(id) => id.clone(),
        None => format!(
            "{}:{}",
            ctx.session_id,
            ts_ms.map(|ms| ms.to_string()).unwrap_or_default()
        ),
    };
    format!("{prefix}:{index}")
}

fn params_text(obj: &serde_json::Map<String, Value>) -> Option<String> {
    let args = ["arguments", "args", "params", "input"]
        .iter()
        .find_map(|k| obj.get(*k))?;
    Some(match args {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    })
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Field helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Join the text of a content value: a bare string is itself; an array
/// contributes every `{type: "text"}` block with non-empty text.
fn collect_text(content: Option<&Value>) -> String {
    match content {
        Some(Value::String(s)) => s.trim().to_owned(),
        Some(Value::Array(blocks)) => {
            let parts: Vec<&str> = blocks
                .iter()
                .filter_map(|b| {
                    let obj = b.as_object()?;
                    if obj.get("type").and_then(Value::as_str)? != "text" {
                        return None;
                    }
                    obj.get("text").and_then(Value::as_str).filter(|t| !t.is_empty())
                })
                .collect();
            parts.join("\n")
        }
        _ => String::new(),
    }
}

fn str_field(obj: &serde_json::Map<String, Value>, names: &[&str]) -> Option<String> {
    names
        .iter()
        .find_map(|n| obj.get(*n).and_then(Value::as_str))
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
}

fn truthy(v: Option<&Value>) -> bool {
    match v {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => s == "true",
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
        _ => false,
    }
}

/// Numeric timestamps are milliseconds; strings are ISO-8601; anything else
/// is treated as absent.
fn parse_timestamp(v: Option<&Value>) -> (Option<DateTime<Utc>>, Option<i64>) {
    match v {
        Some(Value::Number(n)) => {
            let Some(ms) = n.as_i64() else {
                return (None, None);
            };
            match Utc.timestamp_millis_opt(ms).single() {
                Some(ts) => (Some(ts), Some(ms)),
                None => (None, None),
            }
        }
        Some(Value::String(s)) => match DateTime::parse_from_rfc3339(s) {
            Ok(ts) => {
                let utc = ts.with_timezone(&Utc);
                (Some(utc), Some(utc.timestamp_millis()))
            }
            Err(_) => (None, None),
        },
        _ => (None, None),
    }
}
