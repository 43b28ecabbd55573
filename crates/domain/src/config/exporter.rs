use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Exporter / spool engine
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub const MIN_POLL_INTERVAL_MS: u64 = 250;

/// Tuning for the transcript tailer and the spool sender.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExporterConfig {
    /// Tailer tick: how often transcript files are scanned for new bytes.
    #[serde(default = "d_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Sender tick: how often pending events are flushed and dispatched.
    #[serde(default = "d_sender_interval_ms")]
    pub sender_interval_ms: u64,
    /// Coalescing window before the first flush of an in-memory burst.
    #[serde(default = "d_debounce_ms")]
    pub debounce_ms: u64,
    /// Upper bound of new lines consumed per file per tick.
    #[serde(default = "d_max_lines_per_tick")]
    pub max_lines_per_tick: usize,
    /// Lines longer than this are dropped, the cursor advancing past them.
    #[serde(default = "d_max_line_bytes")]
    pub max_line_bytes: u64,
    /// Buffered read chunk size for tailing.
    #[serde(default = "d_read_chunk_bytes")]
    pub read_chunk_bytes: usize,
    /// When true, newly discovered transcripts are exported from offset 0
    /// instead of starting at end-of-file.
    #[serde(default)]
    pub backfill: bool,
    /// Agents whose transcripts are exported.  Empty = all agents.
    #[serde(default)]
    pub agent_allowlist: Vec<String>,
}

impl Default for ExporterConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: d_poll_interval_ms(),
            sender_interval_ms: d_sender_interval_ms(),
            debounce_ms: d_debounce_ms(),
            max_lines_per_tick: d_max_lines_per_tick(),
            max_line_bytes: d_max_line_bytes(),
            read_chunk_bytes: d_read_chunk_bytes(),
            backfill: false,
            agent_allowlist: Vec::new(),
        }
    }
}

impl ExporterConfig {
    pub fn effective_poll_interval_ms(&self) -> u64 {
        self.poll_interval_ms.max(MIN_POLL_INTERVAL_MS)
    }

    pub fn agent_allowed(&self, agent_id: &str) -> bool {
        self.agent_allowlist.is_empty()
            || self.agent_allowlist.iter().any(|a| a == agent_id)
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_poll_interval_ms() -> u64 {
    1_000
}
fn d_sender_interval_ms() -> u64 {
    250
}
fn d_debounce_ms() -> u64 {
    250
}
fn d_max_lines_per_tick() -> usize {
    200
}
fn d_max_line_bytes() -> u64 {
    2 * 1024 * 1024
}
fn d_read_chunk_bytes() -> usize {
    64 * 1024
}
