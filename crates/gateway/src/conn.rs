//! Per-connection state and the backpressure-guarded send path.
//!
//! Every outbound JSON frame goes through [`send_guarded`].  The guard reads
//! the sink's buffered byte count *before* serialization; a consumer that
//! has fallen too far behind is closed with 1008 "slow consumer" rather
//! than allowed to grow the buffer without bound.  The close cause and its
//! metadata are recorded on the connection scratchpad for the close log.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::OnceLock;
use std::time::Instant;

use parking_lot::Mutex;
use regex::Regex;
use serde::Serialize;

pub const CLOSE_CODE_POLICY: u16 = 1008;
pub const CLOSE_REASON_SLOW_CONSUMER: &str = "slow consumer";
pub const CAUSE_BACKPRESSURE: &str = "ws-backpressure";
pub const CAUSE_HANDSHAKE_TIMEOUT: &str = "handshake-timeout";

const MAX_HEADER_UNITS: usize = 300;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Connection scratchpad
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    Pending,
    Connected,
    Failed,
}

/// The last frame seen from the client, recorded before dispatch so close
/// logs can name what the peer was doing.
#[derive(Debug, Clone, Default)]
pub struct LastFrame {
    pub frame_type: Option<String>,
    pub method: Option<String>,
    pub id: Option<String>,
}

pub struct ConnState {
    pub conn_id: String,
    pub opened_at: Instant,
    closed: AtomicBool,
    handshake: Mutex<HandshakeState>,
    close_cause: Mutex<Option<String>>,
    close_meta: Mutex<serde_json::Value>,
    last_frame: Mutex<LastFrame>,
}

impl ConnState {
    pub fn new(conn_id: String) -> Self {
        Self {
            conn_id,
            opened_at: Instant::now(),
            closed: AtomicBool::new(false),
            handshake: Mutex::new(HandshakeState::Pending),
            close_cause: Mutex::new(None),
            close_meta: Mutex::new(serde_json::Value::Null),
            last_frame: Mutex::new(LastFrame::default()),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn mark_closed(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn handshake(&self) -> HandshakeState {
        *self.handshake.lock()
    }

    pub fn set_handshake(&self, state: HandshakeState) {
        *self.handshake.lock() = state;
    }

    /// Record a close cause; the first recorded cause wins.
    pub fn record_close_cause(&self, cause: &str, meta: serde_json::Value) {
        let mut slot = self.close_cause.lock();
        if slot.is_none() {
            *slot = Some(cause.to_owned());
            *self.close_meta.lock() = meta;
        }
    }

    pub fn close_cause(&self) -> Option<String> {
        self.close_cause.lock().clone()
    }

    pub fn close_meta(&self) -> serde_json::Value {
        self.close_meta.lock().clone()
    }

    pub fn note_frame(&self, frame_type: Option<&str>, method: Option<&str>, id: Option<&str>) {
        *self.last_frame.lock() = LastFrame {
            frame_type: frame_type.map(str::to_owned),
            method: method.map(str::to_owned),
            id: id.map(str::to_owned),
        };
    }

    pub fn last_frame(&self) -> LastFrame {
        self.last_frame.lock().clone()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Sink abstraction + guarded send
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The writer half of a connection as the guard sees it: a byte-counted
/// outbound queue plus a close control.
pub trait ConnectionSink: Send + Sync {
    /// Bytes queued but not yet handed to the socket.
    fn buffered_bytes(&self) -> usize;
    /// Queue a text frame.  Returns false when the queue is gone; failures
    /// are swallowed by the caller.
    fn enqueue_text(&self, text: String) -> bool;
    fn close(&self, code: u16, reason: &str);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Sent,
    /// The socket was closed by the guard; the phase tells which check hit.
    ClosedBackpressure,
    /// The queue is gone; nothing was sent.
    SinkGone,
}

/// Send one JSON frame through the backpressure guard.
///
/// Check order is part of the contract: buffered bytes are read before any
/// serialization work, and again (plus the frame size) before enqueueing.
pub fn send_guarded<E: Serialize>(
    conn: &ConnState,
    sink: &dyn ConnectionSink,
    max_buffered_bytes: usize,
    event: &E,
) -> SendOutcome {
    if conn.is_closed() {
        return SendOutcome::SinkGone;
    }

    let buffered = sink.buffered_bytes();
    if buffered > max_buffered_bytes {
        close_for_backpressure(
            conn,
            sink,
            serde_json::json!({
                "maxBufferedBytes": max_buffered_bytes,
                "bufferedAmount": buffered,
                "phase": "pre-stringify",
            }),
        );
        return SendOutcome::ClosedBackpressure;
    }

    let text = match serde_json::to_string(event) {
        Ok(t) => t,
        Err(e) => {
            tracing::warn!(conn_id = %conn.conn_id, error = %e, "dropping unserializable frame");
            return SendOutcome::SinkGone;
        }
    };
    let frame_bytes = text.len();

    if buffered + frame_bytes > max_buffered_bytes {
        close_for_backpressure(
            conn,
            sink,
            serde_json::json!({
                "maxBufferedBytes": max_buffered_bytes,
                "bufferedAmount": buffered,
                "frameBytes": frame_bytes,
                "phase": "pre-send",
            }),
        );
        return SendOutcome::ClosedBackpressure;
    }

    if sink.enqueue_text(text) {
        SendOutcome::Sent
    } else {
        SendOutcome::SinkGone
    }
}

fn close_for_backpressure(conn: &ConnState, sink: &dyn ConnectionSink, meta: serde_json::Value) {
    conn.record_close_cause(CAUSE_BACKPRESSURE, meta);
    conn.mark_closed();
    sink.close(CLOSE_CODE_POLICY, CLOSE_REASON_SLOW_CONSUMER);
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Header sanitization
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn control_and_format_chars() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[\p{Cf}\x00-\x1F\x7F-\x9F]").expect("static pattern"))
}

/// Make a request-header value safe for structured logs: control and format
/// characters become spaces, whitespace runs collapse, and the result is
/// capped at 300 UTF-16 code units without splitting a surrogate pair.
pub fn sanitize_header_value(raw: &str) -> String {
    let replaced = control_and_format_chars().replace_all(raw, " ");
    let collapsed = replaced
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");

    let mut units = 0usize;
    let mut out = String::new();
    for c in collapsed.chars() {
        let w = c.len_utf16();
        if units + w > MAX_HEADER_UNITS {
            break;
        }
        units += w;
        out.push(c);
    }
    out
}

/// Sanitize the interesting request headers for the close log.
pub fn sanitize_headers<'a>(
    headers: impl Iterator<Item = (&'a str, &'a str)>,
) -> serde_json::Value {
    let map: serde_json::Map<String, serde_json::Value> = headers
        .map(|(name, value)| {
            (
                name.to_ascii_lowercase(),
                serde_json::Value::String(sanitize_header_value(value)),
            )
        })
        .collect();
    serde_json::Value::Object(map)
}
