use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Session controller
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub const MIN_LOCK_TTL_SECONDS: u64 = 60;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// TTL requested on task locks.  Locks are held server-side; the
    /// controller only issues TTL-bounded requests.
    #[serde(default = "d_lock_ttl")]
    pub task_lock_ttl_seconds: u64,
    /// Delivery mode for the parent-wake RPC.  `false` in production so a
    /// terminal session is not bounced by its own wake notice.
    #[serde(default)]
    pub wake_deliver: bool,
    /// How many sessions to list when probing for a reusable one.
    #[serde(default = "d_reuse_list_limit")]
    pub reuse_list_limit: u32,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            task_lock_ttl_seconds: d_lock_ttl(),
            wake_deliver: false,
            reuse_list_limit: d_reuse_list_limit(),
        }
    }
}

impl ControllerConfig {
    pub fn effective_lock_ttl_seconds(&self) -> u64 {
        self.task_lock_ttl_seconds.max(MIN_LOCK_TTL_SECONDS)
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_lock_ttl() -> u64 {
    3_600
}
fn d_reuse_list_limit() -> u32 {
    50
}
