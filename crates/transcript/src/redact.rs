//! Redaction and truncation of exported payloads.
//!
//! Caps are applied to every outbound string field; the configured patterns
//! are applied first when the mode is `tools`.  Truncation counts code
//! points, so a cut can never split a multi-byte character.

use regex::Regex;

use sk_domain::config::{RedactionConfig, RedactionMode};
use sk_domain::records::{MessageRecord, ToolCallRecord};

const REDACTION_MARKER: &str = "[REDACTED]";
const TRUNCATION_MARKER: char = '…';

pub struct Redactor {
    mode: RedactionMode,
    patterns: Vec<Regex>,
    max_message_chars: usize,
    max_tool_input_chars: usize,
    max_tool_output_chars: usize,
}

impl Redactor {
    /// Compile the configured patterns.  Patterns that fail to compile are
    /// skipped with a warning rather than disabling the exporter.
    pub fn new(cfg: &RedactionConfig) -> Self {
        let patterns = cfg
            .patterns
            .iter()
            .filter_map(|p| match Regex::new(p) {
                Ok(re) => Some(re),
                Err(e) => {
                    tracing::warn!(pattern = %p, error = %e, "skipping invalid redaction pattern");
                    None
                }
            })
            .collect();
        Self {
            mode: cfg.mode,
            patterns,
            max_message_chars: cfg.max_message_chars,
            max_tool_input_chars: cfg.max_tool_input_chars,
            max_tool_output_chars: cfg.max_tool_output_chars,
        }
    }

    /// Normalize message content (cap: message chars).
    pub fn content(&self, text: String) -> String {
        self.apply(text, self.max_message_chars)
    }

    /// Normalize tool input (cap: tool input chars).
    pub fn tool_input(&self, text: String) -> String {
        self.apply(text, self.max_tool_input_chars)
    }

    /// Normalize tool output or error text (cap: tool output chars).
    pub fn tool_output(&self, text: String) -> String {
        self.apply(text, self.max_tool_output_chars)
    }

    /// Normalize a message record in place.
    pub fn message(&self, mut rec: MessageRecord) -> MessageRecord {
        rec.text = self.content(rec.text);
        rec
    }

    /// Normalize a tool-call record in place.
    pub fn tool_call(&self, mut rec: ToolCallRecord) -> ToolCallRecord {
        rec.params_text = rec.params_text.map(|s| self.tool_input(s));
        rec.result_text = rec.result_text.map(|s| self.tool_output(s));
        rec.error_text = rec.error_text.map(|s| self.tool_output(s));
        rec
    }

    fn apply(&self, text: String, cap: usize) -> String {
        let scrubbed = match self.mode {
            RedactionMode::Off => text,
            RedactionMode::Tools => self
                .patterns
                .iter()
                .fold(text, |acc, re| re.replace_all(&acc, REDACTION_MARKER).into_owned()),
        };
        truncate_chars(scrubbed, cap)
    }
}

/// Cap a string at `max` code points, appending the truncation marker when
/// a cut occurred.  Always lands on a character boundary.
fn truncate_chars(s: String, max: usize) -> String {
    match s.char_indices().nth(max) {
        None => s,
        Some((byte_idx, _)) => {
            let mut out = s[..byte_idx].to_owned();
            out.push(TRUNCATION_MARKER);
            out
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sk_domain::records::{MessageRole, ToolCallStatus};

    fn cfg(mode: RedactionMode, patterns: Vec<String>) -> RedactionConfig {
        RedactionConfig {
            mode,
            patterns,
            ..Default::default()
        }
    }

    fn msg(text: &str) -> MessageRecord {
        MessageRecord {
            session_id: "s".into(),
            agent_id: None,
            topic_id: None,
            message_id: None,
            timestamp: None,
            role: MessageRole::User,
            text: text.into(),
        }
    }

    #[test]
    fn patterns_applied_in_tools_mode() {
        let r = Redactor::new(&cfg(
            RedactionMode::Tools,
            vec![r"sk-[A-Za-z0-9]+".into()],
        ));
        let out = r.message(msg("key is sk-abc123 ok"));
        assert_eq!(out.text, "key is [REDACTED] ok");
    }

    #[test]
    fn patterns_skipped_in_off_mode() {
        let r = Redactor::new(&cfg(RedactionMode::Off, vec![r"sk-[A-Za-z0-9]+".into()]));
        let out = r.message(msg("key is sk-abc123 ok"));
        assert_eq!(out.text, "key is sk-abc123 ok");
    }

    #[test]
    fn invalid_pattern_skipped() {
        let r = Redactor::new(&cfg(RedactionMode::Tools, vec!["(unclosed".into()]));
        let out = r.message(msg("fine"));
        assert_eq!(out.text, "fine");
    }

    #[test]
    fn truncation_appends_marker() {
        let mut c = RedactionConfig::default();
        c.max_message_chars = 5;
        let r = Redactor::new(&c);
        let out = r.message(msg("abcdefgh"));
        assert_eq!(out.text, "abcde…");
    }

    #[test]
    fn truncation_never_splits_code_points() {
        let mut c = RedactionConfig::default();
        c.max_message_chars = 3;
        let r = Redactor::new(&c);
        // Multi-byte characters: each is one code point.
        let out = r.message(msg("日本語テキスト"));
        assert_eq!(out.text, "日本語…");
    }

    #[test]
    fn tool_fields_use_their_own_caps() {
        let mut c = RedactionConfig::default();
        c.max_tool_input_chars = 4;
        c.max_tool_output_chars = 6;
        let r = Redactor::new(&c);
        let rec = ToolCallRecord {
            session_id: "s".into(),
            agent_id: None,
            topic_id: None,
            message_id: None,
            tool_call_id: "tc".into(),
            tool_name: None,
            status: ToolCallStatus::Failed,
            timestamp: None,
            params_text: Some("123456".into()),
            result_text: Some("12345678".into()),
            error_text: Some("12345678".into()),
        };
        let out = r.tool_call(rec);
        assert_eq!(out.params_text.as_deref(), Some("1234…"));
        assert_eq!(out.result_text.as_deref(), Some("123456…"));
        assert_eq!(out.error_text.as_deref(), Some("123456…"));
    }

    #[test]
    fn exact_cap_not_marked() {
        let mut c = RedactionConfig::default();
        c.max_message_chars = 4;
        let r = Redactor::new(&c);
        assert_eq!(r.message(msg("abcd")).text, "abcd");
    }
}
