use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Super-Kanban endpoint + credentials
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub const MIN_TIMEOUT_MS: u64 = 500;
pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;

/// Credentials and endpoint for the Super-Kanban API.
///
/// Auth is split into a **read** scope (GET/HEAD/OPTIONS) and a **write**
/// scope (everything else).  Read prefers the bearer token, write prefers
/// the API key; per-scope header overrides and the legacy single header
/// short-circuit both.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuperKanbanConfig {
    #[serde(default)]
    pub base_url: String,
    /// Bearer token (read scope preference).
    #[serde(default)]
    pub bearer_token: Option<String>,
    /// API key (write scope preference).
    #[serde(default)]
    pub api_key: Option<String>,
    /// Legacy single `Name: value` header applied when no per-scope header
    /// is configured.
    #[serde(default)]
    pub auth_header: Option<String>,
    /// Per-scope header override for reads, as `Name: value`.
    #[serde(default)]
    pub read_header: Option<String>,
    /// Per-scope header override for writes, as `Name: value`.
    #[serde(default)]
    pub write_header: Option<String>,
    #[serde(default = "d_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for SuperKanbanConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            bearer_token: None,
            api_key: None,
            auth_header: None,
            read_header: None,
            write_header: None,
            timeout_ms: d_timeout_ms(),
        }
    }
}

impl SuperKanbanConfig {
    /// Overlay the `SUPER_KANBAN_*` / `SUPERKANBAN_*` environment variables.
    pub fn apply_env(&mut self) {
        if let Some(v) = env_first(&["SUPER_KANBAN_BASE_URL", "SUPERKANBAN_BASE_URL"]) {
            self.base_url = v;
        }
        if let Some(v) = env_first(&["SUPER_KANBAN_TOKEN", "SUPERKANBAN_BEARER_TOKEN"]) {
            self.bearer_token = Some(v);
        }
        if let Some(v) = env_first(&["SUPERKANBAN_API_KEY", "SUPER_KANBAN_API_KEY"]) {
            self.api_key = Some(v);
        }
        if let Some(v) = env_first(&["SUPER_KANBAN_AUTH_HEADER"]) {
            self.auth_header = Some(v);
        }
    }

    pub fn has_any_credential(&self) -> bool {
        self.bearer_token.is_some()
            || self.api_key.is_some()
            || self.auth_header.is_some()
            || self.read_header.is_some()
            || self.write_header.is_some()
    }

    /// Effective timeout with the documented floor applied.
    pub fn effective_timeout_ms(&self) -> u64 {
        self.timeout_ms.max(MIN_TIMEOUT_MS)
    }
}

fn env_first(names: &[&str]) -> Option<String> {
    names
        .iter()
        .filter_map(|n| std::env::var(n).ok())
        .find(|v| !v.is_empty())
}

// ── serde default helpers ───────────────────────────────────────────

fn d_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}
