//! Structured reconcile report plus its deterministic human rendering.

use std::fmt;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReconcileMode {
    DryRun,
    Fix,
}

impl fmt::Display for ReconcileMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DryRun => write!(f, "dry-run"),
            Self::Fix => write!(f, "fix"),
        }
    }
}

/// One previewed post: its idempotency key and occurrence time.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewItem {
    pub key: String,
    pub occurred_at: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionReport {
    pub session_key: String,
    pub agent_id: String,
    pub session_id: String,
    pub messages: u64,
    pub tool_calls: u64,
    pub first_occurred_at: Option<String>,
    pub last_occurred_at: Option<String>,
    pub preview_messages: Vec<PreviewItem>,
    pub preview_tool_calls: Vec<PreviewItem>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileReport {
    pub mode: ReconcileMode,
    pub sessions_scanned: u64,
    pub sessions_matched: u64,
    pub sessions_skipped: u64,
    pub messages: u64,
    pub tool_calls: u64,
    pub requests_posted: u64,
    pub sessions: Vec<SessionReport>,
}

impl fmt::Display for ReconcileReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "reconcile ({})", self.mode)?;
        writeln!(
            f,
            "  sessions: scanned={} matched={} skipped={}",
            self.sessions_scanned, self.sessions_matched, self.sessions_skipped
        )?;
        writeln!(
            f,
            "  totals: messages={} toolCalls={} requestsPosted={}",
            self.messages, self.tool_calls, self.requests_posted
        )?;

        for s in &self.sessions {
            writeln!(f)?;
            writeln!(
                f,
                "  {} (agent={} session={})",
                s.session_key, s.agent_id, s.session_id
            )?;
            writeln!(
                f,
                "    messages={} toolCalls={} first={} last={}",
                s.messages,
                s.tool_calls,
                s.first_occurred_at.as_deref().unwrap_or("-"),
                s.last_occurred_at.as_deref().unwrap_or("-"),
            )?;
            for p in &s.preview_messages {
                writeln!(
                    f,
                    "    msg  {} @ {}",
                    p.key,
                    p.occurred_at.as_deref().unwrap_or("-")
                )?;
            }
            for p in &s.preview_tool_calls {
                writeln!(
                    f,
                    "    tool {} @ {}",
                    p.key,
                    p.occurred_at.as_deref().unwrap_or("-")
                )?;
            }
        }
        Ok(())
    }
}
