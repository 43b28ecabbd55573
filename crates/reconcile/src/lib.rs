//! Offline reconciler: replay archived transcripts into Super-Kanban with
//! exactly the key derivation and payload rules the live exporter uses, so
//! a replay over already-exported history is a set of idempotent upserts.
//!
//! `dry-run` counts and previews without touching the network; `fix` posts
//! for real and is allowed to persist discovered hashed-label mappings.

pub mod report;

use std::path::PathBuf;
use std::sync::Arc;

use sk_client::types::AttachSessionRequest;
use sk_client::SuperKanbanApi;
use sk_domain::config::Config;
use sk_domain::records::SessionState;
use sk_domain::trace::TraceEvent;
use sk_domain::{Error, Result};
use sk_keys::parse_session_file_context;
use sk_spool::{build_events, SpoolEvent};
use sk_transcript::{parse_transcript_line, BindingResolver, Redactor};

pub use report::{PreviewItem, ReconcileMode, ReconcileReport, SessionReport};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Options
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone)]
pub struct ReconcileOptions {
    pub mode: ReconcileMode,
    pub agent_id: Option<String>,
    pub session_id: Option<String>,
    pub session_key: Option<String>,
    pub max_sessions: Option<usize>,
    /// How many message / tool-call keys to keep per session in the report.
    pub preview: usize,
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self {
            mode: ReconcileMode::DryRun,
            agent_id: None,
            session_id: None,
            session_key: None,
            max_sessions: None,
            preview: 5,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Reconciler
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct Reconciler {
    agents_dir: PathBuf,
    allowlist: sk_domain::config::ExporterConfig,
    redactor: Redactor,
    resolver: BindingResolver,
    options: ReconcileOptions,
    api: Option<Arc<dyn SuperKanbanApi>>,
}

impl Reconciler {
    /// Build a reconciler.  `api` is required in `fix` mode and unused in
    /// `dry-run`.
    pub fn new(
        config: &Config,
        options: ReconcileOptions,
        api: Option<Arc<dyn SuperKanbanApi>>,
    ) -> Result<Self> {
        if options.mode == ReconcileMode::Fix && api.is_none() {
            return Err(Error::Config("fix mode requires a Super-Kanban client".into()));
        }
        Ok(Self {
            agents_dir: config.state.agents_dir(),
            allowlist: config.exporter.clone(),
            redactor: Redactor::new(&config.redaction),
            resolver: BindingResolver::new(
                config.state.agents_dir(),
                &config.state.label_map_path(),
                options.mode == ReconcileMode::Fix,
            ),
            options,
            api,
        })
    }

    /// Traverse every transcript under the state dir and replay the bound
    /// ones.  Sessions are processed in path order so two runs over the same
    /// tree produce identical reports.
    pub async fn run(&self) -> Result<ReconcileReport> {
        let mut report = ReconcileReport {
            mode: self.options.mode,
            sessions_scanned: 0,
            sessions_matched: 0,
            sessions_skipped: 0,
            messages: 0,
            tool_calls: 0,
            requests_posted: 0,
            sessions: Vec::new(),
        };

        for path in sk_spool::tailer::discover_transcripts(&self.agents_dir) {
            if let Some(max) = self.options.max_sessions {
                if report.sessions_matched as usize >= max {
                    break;
                }
            }

            let Some(ctx) = parse_session_file_context(&path) else {
                continue;
            };
            let Some(agent_id) = ctx.agent_id.clone() else {
                continue;
            };
            report.sessions_scanned += 1;

            if !self.allowlist.agent_allowed(&agent_id)
                || !matches_filter(&self.options.agent_id, &agent_id)
                || !matches_filter(&self.options.session_id, &ctx.session_id)
            {
                report.sessions_skipped += 1;
                continue;
            }

            let Some(binding) =
                self.resolver
                    .resolve(&agent_id, &ctx.session_id, Some(path.as_path()))
            else {
                report.sessions_skipped += 1;
                continue;
            };
            if !matches_filter(&self.options.session_key, &binding.session_key) {
                report.sessions_skipped += 1;
                continue;
            }

            let events = self.collect_events(&path, &ctx, &binding)?;
            if events.is_empty() {
                report.sessions_skipped += 1;
                continue;
            }
            report.sessions_matched += 1;

            let session_report =
                self.replay_session(&binding, &agent_id, &ctx.session_id, events, &mut report)
                    .await?;

            TraceEvent::ReconcileSession {
                session_key: session_report.session_key.clone(),
                messages: session_report.messages,
                tool_calls: session_report.tool_calls,
            }
            .emit();
            report.sessions.push(session_report);
        }

        Ok(report)
    }

    fn collect_events(
        &self,
        path: &std::path::Path,
        ctx: &sk_domain::records::SessionFileContext,
        binding: &sk_domain::records::SessionBinding,
    ) -> Result<Vec<SpoolEvent>> {
        let raw = std::fs::read_to_string(path).map_err(Error::Io)?;
        let mut events = Vec::new();
        for line in raw.lines() {
            let Some(mut parsed) = parse_transcript_line(ctx, line) else {
                continue;
            };
            parsed.messages = parsed
                .messages
                .into_iter()
                .map(|m| self.redactor.message(m))
                .collect();
            parsed.tool_calls = parsed
                .tool_calls
                .into_iter()
                .map(|t| self.redactor.tool_call(t))
                .collect();
            events.extend(build_events(binding, parsed));
        }
        Ok(events)
    }

    async fn replay_session(
        &self,
        binding: &sk_domain::records::SessionBinding,
        agent_id: &str,
        session_id: &str,
        events: Vec<SpoolEvent>,
        report: &mut ReconcileReport,
    ) -> Result<SessionReport> {
        let mut session = SessionReport {
            session_key: binding.session_key.clone(),
            agent_id: agent_id.to_owned(),
            session_id: session_id.to_owned(),
            messages: 0,
            tool_calls: 0,
            first_occurred_at: None,
            last_occurred_at: None,
            preview_messages: Vec::new(),
            preview_tool_calls: Vec::new(),
        };

        if self.options.mode == ReconcileMode::Fix {
            let api = self.api.as_ref().expect("checked at construction");
            let attach = AttachSessionRequest {
                session_key: binding.session_key.clone(),
                entity_type: binding.entity_type,
                entity_id: None,
                entity_external_id: Some(binding.entity_external_id.clone()),
                state: SessionState::Running,
                started_at: events.iter().find_map(|e| e.occurred_at().map(str::to_owned)),
                ended_at: None,
            };
            api.attach_session(&attach).await?;
            report.requests_posted += 1;
        }

        for event in &events {
            let occurred = event.occurred_at().map(str::to_owned);
            if session.first_occurred_at.is_none() {
                session.first_occurred_at = occurred.clone();
            }
            if occurred.is_some() {
                session.last_occurred_at = occurred.clone();
            }

            match event {
                SpoolEvent::Message(m) => {
                    session.messages += 1;
                    report.messages += 1;
                    if session.preview_messages.len() < self.options.preview {
                        session.preview_messages.push(PreviewItem {
                            key: m.message_key.clone(),
                            occurred_at: occurred.clone(),
                        });
                    }
                    if self.options.mode == ReconcileMode::Fix {
                        let api = self.api.as_ref().expect("checked at construction");
                        api.record_message(m).await?;
                        report.requests_posted += 1;
                    }
                }
                SpoolEvent::ToolCall(t) => {
                    session.tool_calls += 1;
                    report.tool_calls += 1;
                    if session.preview_tool_calls.len() < self.options.preview {
                        session.preview_tool_calls.push(PreviewItem {
                            key: t.tool_call_key.clone(),
                            occurred_at: occurred.clone(),
                        });
                    }
                    if self.options.mode == ReconcileMode::Fix {
                        let api = self.api.as_ref().expect("checked at construction");
                        api.record_tool_call(t).await?;
                        report.requests_posted += 1;
                    }
                }
            }
        }

        Ok(session)
    }
}

fn matches_filter(filter: &Option<String>, value: &str) -> bool {
    filter.as_deref().map_or(true, |f| f == value)
}
