use serde::Serialize;

/// Structured trace events emitted across all sk-sync crates.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum TraceEvent {
    SessionAttached {
        session_key: String,
        entity_type: String,
    },
    SpoolFlushed {
        events: usize,
        spool_bytes: u64,
    },
    SpoolDrained {
        events_sent: u64,
    },
    SendDeferred {
        consecutive_failures: u32,
        next_send_in_ms: u64,
    },
    BindingsReloaded {
        agent_id: String,
        sessions: usize,
    },
    SuperKanbanCall {
        endpoint: String,
        status: u16,
        duration_ms: u64,
    },
    ReconcileSession {
        session_key: String,
        messages: u64,
        tool_calls: u64,
    },
    LabelMapDiscovered {
        hash: String,
        external_id: String,
    },
    SpawnDecision {
        level: String,
        decision: String,
        entity_external_id: String,
    },
    WakeIssued {
        run_id: String,
        parent_session_key: String,
    },
    ConnClosed {
        conn_id: String,
        cause: String,
        duration_ms: u64,
    },
    PresenceBroadcast {
        presence_version: u64,
        connections: usize,
    },
    #[serde(rename = "telegram.http.fetch")]
    TelegramFetch {
        delivery_id: String,
        http_method: String,
        api_method: String,
        path: String,
        payload_hash: String,
    },
}

impl TraceEvent {
    pub fn emit(&self) {
        let json = serde_json::to_string(self).unwrap_or_default();
        tracing::info!(trace_event = %json, "sk_event");
    }
}
