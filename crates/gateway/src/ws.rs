//! WebSocket endpoint for gateway connections.
//!
//! Flow per connection:
//! 1. Optional pre-shared-token check before the upgrade (constant-time).
//! 2. `connect.challenge` is the first event on the socket.
//! 3. A single-shot handshake timer; expiry closes the connection with
//!    `closeCause = "handshake-timeout"`.
//! 4. Frame loop: every received frame updates the `lastFrame` scratchpad
//!    before dispatch; RPCs are acknowledged with `{ id, result | error }`.
//! 5. On close: one structured log with cause, duration, last frame, and
//!    sanitized request headers; the connection leaves the presence
//!    registry (which broadcasts).

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use tokio::sync::mpsc;
use uuid::Uuid;

use sk_domain::trace::TraceEvent;

use crate::conn::{
    sanitize_headers, send_guarded, ConnState, ConnectionSink, HandshakeState,
    CAUSE_HANDSHAKE_TIMEOUT, CLOSE_CODE_POLICY,
};
use crate::state::AppState;

/// Constant-time token comparison via SHA-256 digest.
/// Hashing normalizes lengths so ct_eq always compares 32 bytes.
fn token_eq(a: &str, b: &str) -> bool {
    let ha = Sha256::digest(a.as_bytes());
    let hb = Sha256::digest(b.as_bytes());
    ha.ct_eq(&hb).into()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Upgrade handler
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    pub token: Option<String>,
}

/// GET /v1/gateway/ws — upgrade to WebSocket.
///
/// When the configured token env var is set, the `token` query param must
/// match it; otherwise connections are accepted unauthenticated (dev mode).
pub async fn gateway_ws(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
    headers: HeaderMap,
) -> impl IntoResponse {
    if let Ok(expected) = std::env::var(&state.config.gateway.token_env) {
        let provided = query.token.as_deref().unwrap_or("");
        if !token_eq(provided, &expected) {
            return (
                axum::http::StatusCode::UNAUTHORIZED,
                "invalid or missing gateway token",
            )
                .into_response();
        }
    }
    ws.on_upgrade(move |socket| handle_socket(socket, state, headers))
        .into_response()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Counted outbound queue
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

enum Outbound {
    Text(String),
    Close { code: u16, reason: String },
}

/// The writer half: an unbounded queue whose byte count is the
/// `bufferedAmount` the backpressure guard reads.  Bytes are counted in on
/// enqueue and counted out once the frame has been handed to the socket.
struct CountedSink {
    tx: mpsc::UnboundedSender<Outbound>,
    buffered: Arc<AtomicUsize>,
}

impl ConnectionSink for CountedSink {
    fn buffered_bytes(&self) -> usize {
        self.buffered.load(Ordering::SeqCst)
    }

    fn enqueue_text(&self, text: String) -> bool {
        let len = text.len();
        self.buffered.fetch_add(len, Ordering::SeqCst);
        if self.tx.send(Outbound::Text(text)).is_err() {
            self.buffered.fetch_sub(len, Ordering::SeqCst);
            return false;
        }
        true
    }

    fn close(&self, code: u16, reason: &str) {
        let _ = self.tx.send(Outbound::Close {
            code,
            reason: reason.to_owned(),
        });
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Socket loop
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

async fn handle_socket(socket: WebSocket, state: AppState, headers: HeaderMap) {
    let conn = Arc::new(ConnState::new(Uuid::new_v4().to_string()));
    let (mut ws_sink, mut ws_stream) = socket.split();

    let buffered = Arc::new(AtomicUsize::new(0));
    let (tx, mut rx) = mpsc::unbounded_channel::<Outbound>();
    let sink = CountedSink {
        tx,
        buffered: buffered.clone(),
    };

    // Writer task: drain the queue onto the socket, decrementing the byte
    // count only after a frame has actually been handed over.
    let writer_buffered = buffered.clone();
    let writer = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            match msg {
                Outbound::Text(text) => {
                    let len = text.len();
                    let result = ws_sink.send(Message::Text(text)).await;
                    writer_buffered.fetch_sub(len, Ordering::SeqCst);
                    if result.is_err() {
                        break;
                    }
                }
                Outbound::Close { code, reason } => {
                    let _ = ws_sink
                        .send(Message::Close(Some(CloseFrame {
                            code,
                            reason: reason.into(),
                        })))
                        .await;
                    break;
                }
            }
        }
    });

    let max_buffered = state.config.gateway.max_buffered_bytes;

    // connect.challenge must be the first event on a new socket.
    let challenge = json!({
        "type": "event",
        "event": "connect.challenge",
        "payload": { "nonce": Uuid::new_v4().to_string(), "ts": Utc::now().timestamp_millis() },
    });
    send_guarded(&conn, &sink, max_buffered, &challenge);

    // Single-shot handshake timer.
    let handshake_deadline = tokio::time::Instant::now()
        + Duration::from_millis(state.config.gateway.handshake_timeout_ms);

    loop {
        let next = if conn.handshake() == HandshakeState::Pending {
            match tokio::time::timeout_at(handshake_deadline, ws_stream.next()).await {
                Ok(msg) => msg,
                Err(_) => {
                    conn.set_handshake(HandshakeState::Failed);
                    conn.record_close_cause(
                        CAUSE_HANDSHAKE_TIMEOUT,
                        json!({ "timeoutMs": state.config.gateway.handshake_timeout_ms }),
                    );
                    conn.mark_closed();
                    sink.close(CLOSE_CODE_POLICY, "handshake timeout");
                    break;
                }
            }
        } else {
            ws_stream.next().await
        };

        match next {
            Some(Ok(Message::Text(text))) => {
                handle_frame(&conn, &sink, &state, max_buffered, &text);
            }
            Some(Ok(Message::Close(_))) | None => break,
            Some(Ok(Message::Ping(_) | Message::Pong(_))) => {
                // axum answers WS-level pings automatically.
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                tracing::debug!(conn_id = %conn.conn_id, error = %e, "ws read error");
                break;
            }
        }
        if conn.is_closed() {
            break;
        }
    }

    // Structured close log, then leave presence (broadcasts to the rest).
    let cause = conn.close_cause().unwrap_or_else(|| "peer-close".into());
    let duration_ms = conn.opened_at.elapsed().as_millis() as u64;
    let last = conn.last_frame();
    let sanitized = sanitize_headers(
        headers
            .iter()
            .filter_map(|(n, v)| v.to_str().ok().map(|val| (n.as_str(), val))),
    );
    tracing::info!(
        conn_id = %conn.conn_id,
        cause = %cause,
        duration_ms,
        last_frame_type = last.frame_type.as_deref().unwrap_or("-"),
        last_frame_method = last.method.as_deref().unwrap_or("-"),
        last_frame_id = last.id.as_deref().unwrap_or("-"),
        close_meta = %conn.close_meta(),
        headers = %sanitized,
        "connection closed"
    );
    TraceEvent::ConnClosed {
        conn_id: conn.conn_id.clone(),
        cause,
        duration_ms,
    }
    .emit();

    state.presence.remove(&conn.conn_id);
    writer.abort();
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Frame dispatch
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Handle one inbound text frame.  `lastFrame` is recorded before dispatch.
fn handle_frame(
    conn: &ConnState,
    sink: &dyn ConnectionSink,
    state: &AppState,
    max_buffered: usize,
    text: &str,
) {
    let Ok(frame) = serde_json::from_str::<Value>(text) else {
        tracing::debug!(conn_id = %conn.conn_id, "ignoring unparseable frame");
        return;
    };

    let id = frame.get("id").and_then(value_as_id);
    let method = frame.get("method").and_then(Value::as_str).map(str::to_owned);
    let frame_type = match frame.get("type").and_then(Value::as_str) {
        Some(t) => Some(t.to_owned()),
        None if method.is_some() => Some("rpc".to_owned()),
        None => None,
    };
    conn.note_frame(frame_type.as_deref(), method.as_deref(), id.as_deref());

    let (Some(id), Some(method)) = (id, method) else {
        // Bare events from clients carry no ack obligation.
        return;
    };

    let params = frame.get("params").cloned().unwrap_or(Value::Null);
    let ack = dispatch_rpc(conn, state, &id, &method, &params);
    send_guarded(conn, sink, max_buffered, &ack);
}

fn dispatch_rpc(
    conn: &ConnState,
    state: &AppState,
    id: &str,
    method: &str,
    params: &Value,
) -> Value {
    if conn.handshake() != HandshakeState::Connected && method != "connect" {
        return json!({
            "id": id,
            "error": { "code": "not_connected", "message": "complete the connect handshake first" },
        });
    }

    match method {
        "connect" => {
            conn.set_handshake(HandshakeState::Connected);
            let role = params
                .get("role")
                .and_then(Value::as_str)
                .map(str::to_owned);
            state.presence.register(&conn.conn_id, role);
            json!({
                "id": id,
                "result": { "ok": true, "connId": conn.conn_id },
            })
        }
        "ping" => json!({
            "id": id,
            "result": { "pong": Utc::now().timestamp_millis() },
        }),
        "presence.update" => {
            let role = params
                .get("role")
                .and_then(Value::as_str)
                .map(str::to_owned);
            state.presence.set_role(&conn.conn_id, role);
            json!({ "id": id, "result": { "ok": true } })
        }
        "readiness" => json!({
            "id": id,
            "result": state.readiness.snapshot(),
        }),
        "agent" => {
            // Wake RPCs are accepted here and forwarded by the hosting
            // runtime; the ack is what the caller needs.
            json!({ "id": id, "result": { "accepted": true } })
        }
        _ => json!({
            "id": id,
            "error": { "code": "unknown_method", "message": format!("unknown method: {method}") },
        }),
    }
}

fn value_as_id(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
