use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Redaction & truncation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Redaction mode for exported payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RedactionMode {
    Off,
    #[default]
    Tools,
}

/// Sensitive-data patterns and per-field length caps applied before any
/// payload leaves the process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedactionConfig {
    #[serde(default)]
    pub mode: RedactionMode,
    /// Regex patterns replaced with the redaction marker in `tools` mode.
    #[serde(default)]
    pub patterns: Vec<String>,
    #[serde(default = "d_max_message_chars")]
    pub max_message_chars: usize,
    #[serde(default = "d_max_tool_input_chars")]
    pub max_tool_input_chars: usize,
    #[serde(default = "d_max_tool_output_chars")]
    pub max_tool_output_chars: usize,
}

impl Default for RedactionConfig {
    fn default() -> Self {
        Self {
            mode: RedactionMode::default(),
            patterns: Vec::new(),
            max_message_chars: d_max_message_chars(),
            max_tool_input_chars: d_max_tool_input_chars(),
            max_tool_output_chars: d_max_tool_output_chars(),
        }
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_max_message_chars() -> usize {
    8_000
}
fn d_max_tool_input_chars() -> usize {
    4_000
}
fn d_max_tool_output_chars() -> usize {
    8_000
}
