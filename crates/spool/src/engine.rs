//! The spool engine proper: tailer + debounced flush + sender.
//!
//! Ownership rules (single logical worker):
//! - `meta.json` and `spool.jsonl` are written only here.
//! - flush (producer) and drain (consumer) never overlap — both run on the
//!   engine's tick loop, serialized by construction.
//! - the attach flag for a session is persisted immediately after the first
//!   successful Attach so a crash cannot re-run it as a different state.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use sk_client::types::{AttachSessionRequest, RecordMessageRequest, RecordToolCallRequest};
use sk_client::SuperKanbanApi;
use sk_domain::config::Config;
use sk_domain::records::{
    to_iso_millis_opt, MessageRole, SessionBinding, SessionState,
};
use sk_domain::trace::TraceEvent;
use sk_domain::{Error, Result};
use sk_keys::{build_sk_message_key, build_sk_tool_call_key, parse_session_file_context};
use sk_transcript::{parse_transcript_line, BindingResolver, ParsedLine, Redactor};

use crate::backoff::backoff_delay_ms;
use crate::event::SpoolEvent;
use crate::meta::MetaFile;
use crate::tailer::{discover_transcripts, file_size, read_new_lines};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Engine
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct SpoolEngine {
    agents_dir: PathBuf,
    meta_path: PathBuf,
    spool_path: PathBuf,
    cfg: sk_domain::config::ExporterConfig,
    redactor: Redactor,
    resolver: BindingResolver,
    api: Arc<dyn SuperKanbanApi>,
    meta: Mutex<MetaFile>,
    pending: Mutex<Vec<SpoolEvent>>,
    flush_due: Mutex<Option<Instant>>,
    cursors_dirty: Mutex<bool>,
}

impl SpoolEngine {
    pub fn new(config: &Config, api: Arc<dyn SuperKanbanApi>) -> Self {
        let meta_path = config.state.meta_path();
        Self {
            agents_dir: config.state.agents_dir(),
            spool_path: config.state.spool_path(),
            cfg: config.exporter.clone(),
            redactor: Redactor::new(&config.redaction),
            resolver: BindingResolver::new(
                config.state.agents_dir(),
                &config.state.label_map_path(),
                true,
            ),
            api,
            meta: Mutex::new(MetaFile::load(&meta_path)),
            meta_path,
            pending: Mutex::new(Vec::new()),
            flush_due: Mutex::new(None),
            cursors_dirty: Mutex::new(false),
        }
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Tailer tick
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// Scan all live transcripts for appended bytes and enqueue the events
    /// they yield.  Cursors advance even over unbound or unparsable lines.
    pub fn tail_tick(&self) {
        for path in discover_transcripts(&self.agents_dir) {
            let Some(ctx) = parse_session_file_context(&path) else {
                continue;
            };
            let Some(agent_id) = ctx.agent_id.clone() else {
                continue;
            };
            if !self.cfg.agent_allowed(&agent_id) {
                continue;
            }

            let path_key = path.to_string_lossy().into_owned();
            let cursor = {
                let mut meta = self.meta.lock();
                match meta.cursor(&path_key) {
                    Some(c) => c,
                    None => {
                        // First sighting: start at EOF unless backfilling.
                        let start = if self.cfg.backfill {
                            0
                        } else {
                            file_size(&path).unwrap_or(0)
                        };
                        meta.set_cursor(&path_key, start);
                        *self.cursors_dirty.lock() = true;
                        start
                    }
                }
            };

            let chunk = match read_new_lines(
                &path,
                cursor,
                self.cfg.max_lines_per_tick,
                self.cfg.max_line_bytes,
                self.cfg.read_chunk_bytes,
            ) {
                Ok(c) => c,
                Err(e) => {
                    // Disappeared or unreadable this tick — skip, retry later.
                    tracing::debug!(path = %path.display(), error = %e, "tail read failed");
                    continue;
                }
            };
            if chunk.new_offset == cursor {
                continue;
            }
            if chunk.dropped > 0 {
                tracing::warn!(
                    path = %path.display(),
                    dropped = chunk.dropped,
                    "dropped oversize transcript lines"
                );
            }

            let mut events = Vec::new();
            for line in &chunk.lines {
                let Some(parsed) = parse_transcript_line(&ctx, line) else {
                    continue;
                };
                // Binding gate: unbound sessions are skipped silently but
                // their cursors still advance.
                let Some(binding) =
                    self.resolver
                        .resolve(&agent_id, &ctx.session_id, Some(path.as_path()))
                else {
                    continue;
                };
                events.extend(build_events(&binding, parsed));
            }

            {
                let mut meta = self.meta.lock();
                meta.set_cursor(&path_key, chunk.new_offset);
                *self.cursors_dirty.lock() = true;
            }
            if !events.is_empty() {
                self.enqueue_events(events);
            }
        }
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Enqueue + flush
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// Push events into the pending list after redaction/truncation and arm
    /// the single-shot debounce timer.
    pub fn enqueue_events(&self, events: Vec<SpoolEvent>) {
        if events.is_empty() {
            return;
        }
        let normalized = events.into_iter().map(|e| self.normalize(e));
        let mut pending = self.pending.lock();
        pending.extend(normalized);

        let mut due = self.flush_due.lock();
        if due.is_none() {
            *due = Some(Instant::now() + Duration::from_millis(self.cfg.debounce_ms));
        }
    }

    fn normalize(&self, event: SpoolEvent) -> SpoolEvent {
        match event {
            SpoolEvent::Message(mut m) => {
                m.content = self.redactor.content(m.content);
                SpoolEvent::Message(m)
            }
            SpoolEvent::ToolCall(mut t) => {
                t.params_text = t.params_text.map(|s| self.redactor.tool_input(s));
                t.result_text = t.result_text.map(|s| self.redactor.tool_output(s));
                t.error_text = t.error_text.map(|s| self.redactor.tool_output(s));
                SpoolEvent::ToolCall(t)
            }
        }
    }

    /// Atomically append all pending events to the spool, then persist meta
    /// to capture any updated file cursors.
    pub fn flush(&self) -> Result<()> {
        let drained: Vec<SpoolEvent> = {
            let mut pending = self.pending.lock();
            *self.flush_due.lock() = None;
            std::mem::take(&mut *pending)
        };

        if !drained.is_empty() {
            if let Some(parent) = self.spool_path.parent() {
                std::fs::create_dir_all(parent).map_err(Error::Io)?;
            }
            let mut buf = String::new();
            for event in &drained {
                buf.push_str(&serde_json::to_string(event)?);
                buf.push('\n');
            }
            use std::io::Write;
            let mut file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.spool_path)
                .map_err(Error::Io)?;
            file.write_all(buf.as_bytes()).map_err(Error::Io)?;

            TraceEvent::SpoolFlushed {
                events: drained.len(),
                spool_bytes: file_size(&self.spool_path).unwrap_or(0),
            }
            .emit();
        }

        self.persist_meta()?;
        *self.cursors_dirty.lock() = false;
        Ok(())
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Sender
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// Drain the spool one event at a time from `spoolOffset`.
    ///
    /// Success advances the offset and persists meta; a send failure arms
    /// the backoff gate and returns.  Malformed lines and payloads missing
    /// their entity reference are skipped (offset advances, no retry).
    pub async fn process_spool(&self) -> Result<()> {
        if let Some(next) = self.meta.lock().next_send_at_ms {
            if now_ms() < next {
                return Ok(());
            }
        }

        let mut sent: u64 = 0;
        loop {
            let offset = self.meta.lock().spool_offset;
            let chunk = match read_new_lines(&self.spool_path, offset, 1, u64::MAX, 64 * 1024) {
                Ok(c) => c,
                Err(_) => break, // no spool file yet
            };
            let Some(line) = chunk.lines.first() else {
                break;
            };
            let consumed = chunk.new_offset - offset;

            let event = match serde_json::from_str::<SpoolEvent>(line) {
                Ok(ev) => ev,
                Err(e) => {
                    tracing::warn!(offset, error = %e, "skipping malformed spool line");
                    self.advance_spool(consumed)?;
                    continue;
                }
            };

            // A payload without an entity reference can never attach or
            // post; drop it rather than wedging the queue.
            if event.entity_external_id().is_empty() {
                tracing::warn!(
                    session_key = event.session_key(),
                    "dropping spool event without entity reference"
                );
                self.advance_spool(consumed)?;
                continue;
            }

            let result = async {
                self.ensure_attached(&event).await?;
                match &event {
                    SpoolEvent::Message(m) => self.api.record_message(m).await,
                    SpoolEvent::ToolCall(t) => self.api.record_tool_call(t).await,
                }
            }
            .await;

            match result {
                Ok(()) => {
                    sent += 1;
                    let mut meta = self.meta.lock();
                    meta.spool_offset += consumed;
                    meta.consecutive_failures = 0;
                    meta.next_send_at_ms = None;
                    drop(meta);
                    self.persist_meta()?;
                }
                Err(e) => {
                    self.defer_sends(&e)?;
                    return Ok(());
                }
            }
        }

        if sent > 0 {
            TraceEvent::SpoolDrained { events_sent: sent }.emit();
        }
        self.truncate_if_drained()?;
        Ok(())
    }

    /// No-op when this session is already attached; otherwise post an
    /// Attach in RUNNING and persist the flag immediately on success.
    async fn ensure_attached(&self, event: &SpoolEvent) -> Result<()> {
        let session_key = event.session_key().to_owned();
        if self.meta.lock().is_attached(&session_key) {
            return Ok(());
        }

        let (entity_type, entity_external_id) = match event {
            SpoolEvent::Message(m) => (m.entity_type, m.entity_external_id.clone()),
            SpoolEvent::ToolCall(t) => (t.entity_type, t.entity_external_id.clone()),
        };
        let req = AttachSessionRequest {
            session_key: session_key.clone(),
            entity_type,
            entity_id: None,
            entity_external_id: Some(entity_external_id),
            state: SessionState::Running,
            started_at: event.occurred_at().map(str::to_owned),
            ended_at: None,
        };
        self.api.attach_session(&req).await?;

        TraceEvent::SessionAttached {
            session_key: session_key.clone(),
            entity_type: entity_type.to_string(),
        }
        .emit();

        self.meta.lock().mark_attached(&session_key);
        self.persist_meta()?;
        Ok(())
    }

    fn advance_spool(&self, consumed: u64) -> Result<()> {
        self.meta.lock().spool_offset += consumed;
        self.persist_meta()
    }

    fn defer_sends(&self, cause: &Error) -> Result<()> {
        let (failures, delay_ms) = {
            let mut meta = self.meta.lock();
            meta.consecutive_failures += 1;
            let delay = backoff_delay_ms(meta.consecutive_failures);
            meta.next_send_at_ms = Some(now_ms() + delay as i64);
            (meta.consecutive_failures, delay)
        };
        tracing::warn!(
            error = %cause,
            consecutive_failures = failures,
            next_send_in_ms = delay_ms,
            "send failed, backing off"
        );
        TraceEvent::SendDeferred {
            consecutive_failures: failures,
            next_send_in_ms: delay_ms,
        }
        .emit();
        self.persist_meta()
    }

    /// When everything persisted has been sent, rewrite the spool empty and
    /// reset the offset.  The offset reset and the truncation are committed
    /// together through meta persistence.
    fn truncate_if_drained(&self) -> Result<()> {
        let offset = self.meta.lock().spool_offset;
        let Some(size) = file_size(&self.spool_path) else {
            return Ok(());
        };
        if size == 0 || offset < size {
            return Ok(());
        }
        // Flush and drain never overlap, so nothing is appending right now.
        std::fs::write(&self.spool_path, b"").map_err(Error::Io)?;
        self.meta.lock().spool_offset = 0;
        self.persist_meta()
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Worker loop
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// Run the tailer and sender ticks until cancelled.
    pub async fn run(&self, shutdown: CancellationToken) {
        let mut tail = tokio::time::interval(Duration::from_millis(
            self.cfg.effective_poll_interval_ms(),
        ));
        let mut send =
            tokio::time::interval(Duration::from_millis(self.cfg.sender_interval_ms.max(50)));

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    if let Err(e) = self.flush() {
                        tracing::warn!(error = %e, "final flush failed");
                    }
                    tracing::info!("spool engine stopped");
                    return;
                }
                _ = tail.tick() => {
                    self.tail_tick();
                }
                _ = send.tick() => {
                    self.sender_tick().await;
                }
            }
        }
    }

    async fn sender_tick(&self) {
        let flush_needed = {
            let due = self.flush_due.lock();
            match *due {
                Some(at) => Instant::now() >= at,
                None => *self.cursors_dirty.lock(),
            }
        };
        if flush_needed {
            if let Err(e) = self.flush() {
                tracing::warn!(error = %e, "spool flush failed");
                return;
            }
        }
        if let Err(e) = self.process_spool().await {
            tracing::warn!(error = %e, "spool processing failed");
        }
    }

    fn persist_meta(&self) -> Result<()> {
        let meta = self.meta.lock().clone();
        meta.persist(&self.meta_path)
    }

    // ── test/introspection accessors ─────────────────────────────────

    pub fn pending_len(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn meta_snapshot(&self) -> MetaFile {
        self.meta.lock().clone()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Event construction
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Turn one parsed line into keyed server-bound events.
pub fn build_events(binding: &SessionBinding, parsed: ParsedLine) -> Vec<SpoolEvent> {
    let mut events = Vec::with_capacity(parsed.messages.len() + parsed.tool_calls.len());

    for m in parsed.messages {
        let occurred_ms = m.timestamp.map(|t| t.timestamp_millis());
        let message_key = build_sk_message_key(
            &binding.session_key,
            m.message_id.as_deref(),
            role_str(m.role),
            occurred_ms,
            &m.text,
        );
        let metadata = metadata_bag(&m.agent_id, &m.topic_id, &m.message_id);
        events.push(SpoolEvent::Message(RecordMessageRequest {
            session_key: binding.session_key.clone(),
            entity_type: binding.entity_type,
            entity_external_id: binding.entity_external_id.clone(),
            message_key,
            role: m.role,
            content: m.text,
            occurred_at: to_iso_millis_opt(m.timestamp),
            metadata,
        }));
    }

    for t in parsed.tool_calls {
        let tool_call_key = build_sk_tool_call_key(&binding.session_key, &t.tool_call_id);
        let metadata = metadata_bag(&t.agent_id, &t.topic_id, &t.message_id);
        events.push(SpoolEvent::ToolCall(RecordToolCallRequest {
            session_key: binding.session_key.clone(),
            entity_type: binding.entity_type,
            entity_external_id: binding.entity_external_id.clone(),
            tool_call_key,
            tool_name: t.tool_name,
            status: t.status,
            occurred_at: to_iso_millis_opt(t.timestamp),
            params_text: t.params_text,
            result_text: t.result_text,
            error_text: t.error_text,
            metadata,
        }));
    }

    events
}

fn role_str(role: MessageRole) -> &'static str {
    match role {
        MessageRole::System => "system",
        MessageRole::User => "user",
        MessageRole::Assistant => "assistant",
        MessageRole::Tool => "tool",
    }
}

fn metadata_bag(
    agent_id: &Option<String>,
    topic_id: &Option<String>,
    message_id: &Option<String>,
) -> Option<serde_json::Value> {
    let mut map = serde_json::Map::new();
    if let Some(a) = agent_id {
        map.insert("agentId".into(), serde_json::Value::String(a.clone()));
    }
    if let Some(t) = topic_id {
        map.insert("topicId".into(), serde_json::Value::String(t.clone()));
    }
    if let Some(m) = message_id {
        map.insert("messageId".into(), serde_json::Value::String(m.clone()));
    }
    if map.is_empty() {
        None
    } else {
        Some(serde_json::Value::Object(map))
    }
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
