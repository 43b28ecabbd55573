use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Telegram delivery plumbing
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    /// Sliding window for voice-send deduplication.
    #[serde(default = "d_dedupe_window_ms")]
    pub dedupe_window_ms: u64,
    /// Gate for the voice-send deduper (`OPENCLAW_TELEGRAM_DEDUP_VOICE=1`).
    #[serde(default)]
    pub dedupe_voice: bool,
    /// Gate for the diagnostic fetch tap (`OPENCLAW_TELEGRAM_DIAG=1`).
    #[serde(default)]
    pub diagnostics: bool,
    /// Minimum gap between requests on the search lane
    /// (`BRAVE_SEARCH_MIN_INTERVAL_MS`).
    #[serde(default)]
    pub search_min_interval_ms: u64,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            dedupe_window_ms: d_dedupe_window_ms(),
            dedupe_voice: false,
            diagnostics: false,
            search_min_interval_ms: 0,
        }
    }
}

impl TelegramConfig {
    pub fn apply_env(&mut self) {
        if env_flag("OPENCLAW_TELEGRAM_DIAG") {
            self.diagnostics = true;
        }
        if env_flag("OPENCLAW_TELEGRAM_DEDUP_VOICE") {
            self.dedupe_voice = true;
        }
        if let Ok(v) = std::env::var("BRAVE_SEARCH_MIN_INTERVAL_MS") {
            if let Ok(ms) = v.parse() {
                self.search_min_interval_ms = ms;
            }
        }
    }
}

fn env_flag(name: &str) -> bool {
    std::env::var(name).map(|v| v == "1").unwrap_or(false)
}

// ── serde default helpers ───────────────────────────────────────────

fn d_dedupe_window_ms() -> u64 {
    10_000
}
