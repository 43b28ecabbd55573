use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Gateway WebSocket core
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "d_host")]
    pub host: String,
    #[serde(default = "d_port")]
    pub port: u16,
    /// Outbound-buffer ceiling per connection.  A send that would push the
    /// buffered byte count past this closes the socket (1008 "slow consumer").
    #[serde(default = "d_max_buffered_bytes")]
    pub max_buffered_bytes: usize,
    /// How long a fresh connection may sit without completing the handshake.
    #[serde(default = "d_handshake_timeout_ms")]
    pub handshake_timeout_ms: u64,
    /// Env var holding the optional pre-shared connection token.  When the
    /// var is unset, connections are accepted unauthenticated (dev mode).
    #[serde(default = "d_token_env")]
    pub token_env: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: d_host(),
            port: d_port(),
            max_buffered_bytes: d_max_buffered_bytes(),
            handshake_timeout_ms: d_handshake_timeout_ms(),
            token_env: d_token_env(),
        }
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_host() -> String {
    "127.0.0.1".into()
}
fn d_port() -> u16 {
    4180
}
fn d_max_buffered_bytes() -> usize {
    1024 * 1024
}
fn d_handshake_timeout_ms() -> u64 {
    10_000
}
fn d_token_env() -> String {
    "OPENCLAW_GATEWAY_TOKEN".into()
}
