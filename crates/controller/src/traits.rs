//! Seams to the agent runtime and the gateway.
//!
//! The controller never talks to the runtime directly; it is handed these
//! trait objects at construction.  Tests substitute in-memory fakes.

use async_trait::async_trait;
use serde::Serialize;

use sk_domain::Result;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Agent session runtime
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpawnSessionRequest {
    pub task: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thinking: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_timeout_seconds: Option<u64>,
    pub mode: String,
    pub cleanup: String,
}

#[derive(Debug, Clone)]
pub struct SpawnSessionResult {
    pub accepted: bool,
    pub run_id: Option<String>,
    pub session_key: Option<String>,
    pub error: Option<String>,
}

/// The OpenClaw session-spawning surface the controller drives.
#[async_trait]
pub trait AgentSessions: Send + Sync {
    /// Spawn a new agent session running `task`.
    async fn spawn(&self, req: &SpawnSessionRequest) -> Result<SpawnSessionResult>;

    /// Forward a task message into an existing session.
    async fn send(&self, session_key: &str, message: &str) -> Result<()>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Gateway wake RPC
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Delivery mode for the wake RPC: disabled, or routed to a channel.
/// Serializes as `false` / `{ "channel": "last" }` to match the gateway's
/// `agent` method.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum WakeDeliver {
    Disabled(bool),
    Channel { channel: String },
}

impl WakeDeliver {
    pub fn disabled() -> Self {
        Self::Disabled(false)
    }

    pub fn last_channel() -> Self {
        Self::Channel {
            channel: "last".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WakeRequest {
    pub session_key: String,
    pub message: String,
    pub deliver: WakeDeliver,
    pub lane: String,
    pub idempotency_key: String,
}

/// The gateway RPC surface used to wake a parent session.
#[async_trait]
pub trait GatewayRpc: Send + Sync {
    async fn agent_wake(&self, req: &WakeRequest) -> Result<()>;
}
