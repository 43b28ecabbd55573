//! End-to-end exercises of the spool engine against an in-memory
//! Super-Kanban fake: tail → flush → send, crash-style restarts, backoff,
//! and truncate-on-drain.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use sk_client::types::*;
use sk_client::SuperKanbanApi;
use sk_domain::config::Config;
use sk_domain::records::{EntityType, TaskStatus};
use sk_domain::{Error, Result};
use sk_spool::SpoolEngine;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Fake Super-Kanban
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Default)]
struct FakeKanban {
    attaches: Mutex<Vec<AttachSessionRequest>>,
    messages: Mutex<Vec<RecordMessageRequest>>,
    tool_calls: Mutex<Vec<RecordToolCallRequest>>,
    fail_sends: AtomicBool,
}

impl FakeKanban {
    fn failing() -> Self {
        let fake = Self::default();
        fake.fail_sends.store(true, Ordering::SeqCst);
        fake
    }

    fn check_failure(&self) -> Result<()> {
        if self.fail_sends.load(Ordering::SeqCst) {
            Err(Error::Transport("injected".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl SuperKanbanApi for FakeKanban {
    async fn upsert_project(&self, _req: &UpsertProjectRequest) -> Result<SkEntity> {
        unimplemented!("not used by the exporter")
    }
    async fn upsert_work_item(&self, _req: &UpsertWorkItemRequest) -> Result<SkEntity> {
        unimplemented!("not used by the exporter")
    }
    async fn upsert_task(&self, _req: &UpsertTaskRequest) -> Result<SkEntity> {
        unimplemented!("not used by the exporter")
    }

    async fn attach_session(&self, req: &AttachSessionRequest) -> Result<()> {
        self.check_failure()?;
        self.attaches.lock().push(req.clone());
        Ok(())
    }

    async fn record_message(&self, req: &RecordMessageRequest) -> Result<()> {
        self.check_failure()?;
        self.messages.lock().push(req.clone());
        Ok(())
    }

    async fn record_tool_call(&self, req: &RecordToolCallRequest) -> Result<()> {
        self.check_failure()?;
        self.tool_calls.lock().push(req.clone());
        Ok(())
    }

    async fn post_event(&self, _req: &PostEventRequest) -> Result<()> {
        Ok(())
    }
    async fn lock_task(&self, _task_id: &str, _owner: &str, _ttl: u64) -> Result<()> {
        Ok(())
    }
    async fn unlock_task(&self, _task_id: &str, _owner: &str) -> Result<()> {
        Ok(())
    }
    async fn patch_status(&self, _e: EntityType, _id: &str, _status: &str) -> Result<()> {
        Ok(())
    }
    async fn patch_archived(&self, _e: EntityType, _id: &str, _archived: bool) -> Result<()> {
        Ok(())
    }
    async fn patch_task_status(&self, _task_id: &str, _status: TaskStatus) -> Result<()> {
        Ok(())
    }
    async fn list_projects(&self, _include_archived: bool) -> Result<Vec<SkEntity>> {
        Ok(Vec::new())
    }
    async fn get_entity(&self, _e: EntityType, _id: &str) -> Result<SkEntity> {
        Err(Error::Other("not found".into()))
    }
    async fn list_work_items(&self, _project_id: &str) -> Result<Vec<SkEntity>> {
        Ok(Vec::new())
    }
    async fn list_tasks(&self, _work_item_id: &str) -> Result<Vec<SkEntity>> {
        Ok(Vec::new())
    }
    async fn list_entity_sessions(
        &self,
        _e: EntityType,
        _id: &str,
        _limit: u32,
    ) -> Result<Vec<SkSession>> {
        Ok(Vec::new())
    }
    async fn resolve_session(&self, _session_key: &str) -> Result<Option<SkSession>> {
        Ok(None)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Fixtures
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn config_for(dir: &Path) -> Config {
    let mut config = Config::default();
    config.state.dir = dir.to_path_buf();
    config.exporter.backfill = true;
    config
}

fn write_sessions_json(dir: &Path, agent: &str) {
    let sessions = dir.join("agents").join(agent).join("sessions");
    std::fs::create_dir_all(&sessions).unwrap();
    std::fs::write(
        sessions.join("sessions.json"),
        r#"{"agent:work:main":{"sessionId":"s1","label":"SK:TASK:task:alpha:w1:t1"}}"#,
    )
    .unwrap();
}

fn write_transcript(dir: &Path, agent: &str, name: &str, lines: &[&str]) -> std::path::PathBuf {
    let sessions = dir.join("agents").join(agent).join("sessions");
    std::fs::create_dir_all(&sessions).unwrap();
    let path = sessions.join(name);
    std::fs::write(&path, format!("{}\n", lines.join("\n"))).unwrap();
    path
}

const USER_LINE: &str =
    r#"{"type":"message","id":"m1","timestamp":1700000000000,"message":{"role":"user","content":"hello"}}"#;
const ASSISTANT_LINE: &str = r#"{"type":"message","id":"m2","timestamp":1700000001000,"message":{"role":"assistant","content":[{"type":"text","text":"ok"},{"type":"toolCall","id":"tc1","name":"functions.read","arguments":{"path":"/tmp/file"}}]}}"#;
const RESULT_LINE: &str = r#"{"type":"message","id":"m3","timestamp":1700000002000,"message":{"role":"toolResult","toolCallId":"tc1","content":"done"}}"#;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn tail_flush_send_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    write_sessions_json(dir.path(), "work");
    write_transcript(
        dir.path(),
        "work",
        "s1.jsonl",
        &[USER_LINE, ASSISTANT_LINE, RESULT_LINE],
    );

    let fake = Arc::new(FakeKanban::default());
    let engine = SpoolEngine::new(&config_for(dir.path()), fake.clone());

    engine.tail_tick();
    engine.flush().unwrap();
    engine.process_spool().await.unwrap();

    // 1 attach, 3 messages (user, assistant, tool), 2 tool-call rows.
    assert_eq!(fake.attaches.lock().len(), 1);
    assert_eq!(fake.messages.lock().len(), 3);
    assert_eq!(fake.tool_calls.lock().len(), 2);

    let attach = &fake.attaches.lock()[0];
    assert_eq!(attach.session_key, "agent:work:main");
    assert_eq!(attach.entity_external_id.as_deref(), Some("task:alpha:w1:t1"));

    // Both tool-call posts share the STARTED row's key.
    let keys: Vec<String> = fake
        .tool_calls
        .lock()
        .iter()
        .map(|t| t.tool_call_key.clone())
        .collect();
    assert_eq!(keys, vec!["agent:work:main:tc1", "agent:work:main:tc1"]);
}

#[tokio::test]
async fn new_files_start_at_eof_without_backfill() {
    let dir = tempfile::tempdir().unwrap();
    write_sessions_json(dir.path(), "work");
    let transcript = write_transcript(dir.path(), "work", "s1.jsonl", &[USER_LINE]);

    let mut config = config_for(dir.path());
    config.exporter.backfill = false;

    let fake = Arc::new(FakeKanban::default());
    let engine = SpoolEngine::new(&config, fake.clone());

    // First tick discovers the file and pins the cursor to EOF.
    engine.tail_tick();
    engine.flush().unwrap();
    engine.process_spool().await.unwrap();
    assert_eq!(fake.messages.lock().len(), 0);

    // New appends are picked up.
    use std::io::Write;
    let mut f = std::fs::OpenOptions::new()
        .append(true)
        .open(&transcript)
        .unwrap();
    writeln!(f, "{RESULT_LINE}").unwrap();

    engine.tail_tick();
    engine.flush().unwrap();
    engine.process_spool().await.unwrap();
    assert_eq!(fake.messages.lock().len(), 1);
    assert_eq!(fake.tool_calls.lock().len(), 1);
}

#[tokio::test]
async fn unbound_sessions_skipped_but_cursor_advances() {
    let dir = tempfile::tempdir().unwrap();
    write_sessions_json(dir.path(), "work");
    // s2 is not in sessions.json.
    let transcript = write_transcript(dir.path(), "work", "s2.jsonl", &[USER_LINE]);

    let fake = Arc::new(FakeKanban::default());
    let engine = SpoolEngine::new(&config_for(dir.path()), fake.clone());
    engine.tail_tick();
    engine.flush().unwrap();
    engine.process_spool().await.unwrap();

    assert_eq!(fake.messages.lock().len(), 0);
    let meta = engine.meta_snapshot();
    let cursor = meta.cursor(&transcript.to_string_lossy()).unwrap();
    assert!(cursor > 0, "cursor should advance past skipped lines");
}

#[tokio::test]
async fn send_failure_arms_backoff_and_preserves_events() {
    let dir = tempfile::tempdir().unwrap();
    write_sessions_json(dir.path(), "work");
    write_transcript(dir.path(), "work", "s1.jsonl", &[USER_LINE]);

    let fake = Arc::new(FakeKanban::failing());
    let engine = SpoolEngine::new(&config_for(dir.path()), fake.clone());
    engine.tail_tick();
    engine.flush().unwrap();
    engine.process_spool().await.unwrap();

    let meta = engine.meta_snapshot();
    assert_eq!(meta.consecutive_failures, 1);
    assert!(meta.next_send_at_ms.is_some());
    assert_eq!(meta.spool_offset, 0, "failed event must not be consumed");

    // Heal the backend and clear the gate: the same event goes through.
    fake.fail_sends.store(false, Ordering::SeqCst);
    {
        // Simulate the backoff window elapsing.
        let path = config_for(dir.path()).state.meta_path();
        let mut m = engine.meta_snapshot();
        m.next_send_at_ms = Some(0);
        m.persist(&path).unwrap();
    }
    // The gate lives in memory too; a fresh engine reads the persisted meta.
    let engine = SpoolEngine::new(&config_for(dir.path()), fake.clone());
    engine.process_spool().await.unwrap();
    assert_eq!(fake.messages.lock().len(), 1);
}

#[tokio::test]
async fn spool_truncated_when_fully_drained() {
    let dir = tempfile::tempdir().unwrap();
    write_sessions_json(dir.path(), "work");
    write_transcript(dir.path(), "work", "s1.jsonl", &[USER_LINE]);

    let config = config_for(dir.path());
    let fake = Arc::new(FakeKanban::default());
    let engine = SpoolEngine::new(&config, fake.clone());
    engine.tail_tick();
    engine.flush().unwrap();

    let spool = config.state.spool_path();
    assert!(std::fs::metadata(&spool).unwrap().len() > 0);

    engine.process_spool().await.unwrap();
    assert_eq!(std::fs::metadata(&spool).unwrap().len(), 0);
    assert_eq!(engine.meta_snapshot().spool_offset, 0);
}

#[tokio::test]
async fn malformed_spool_line_skipped() {
    let dir = tempfile::tempdir().unwrap();
    write_sessions_json(dir.path(), "work");
    write_transcript(dir.path(), "work", "s1.jsonl", &[USER_LINE]);

    let config = config_for(dir.path());
    // Pre-seed the spool with garbage before the engine appends real events.
    std::fs::create_dir_all(config.state.plugin_dir()).unwrap();
    std::fs::write(config.state.spool_path(), "not json\n").unwrap();

    let fake = Arc::new(FakeKanban::default());
    let engine = SpoolEngine::new(&config, fake.clone());
    engine.tail_tick();
    engine.flush().unwrap();
    engine.process_spool().await.unwrap();

    // Garbage skipped, real event delivered.
    assert_eq!(fake.messages.lock().len(), 1);
}

#[tokio::test]
async fn attach_happens_once_across_restarts() {
    let dir = tempfile::tempdir().unwrap();
    write_sessions_json(dir.path(), "work");
    let transcript = write_transcript(dir.path(), "work", "s1.jsonl", &[USER_LINE]);

    let fake = Arc::new(FakeKanban::default());
    {
        let engine = SpoolEngine::new(&config_for(dir.path()), fake.clone());
        engine.tail_tick();
        engine.flush().unwrap();
        engine.process_spool().await.unwrap();
    }
    assert_eq!(fake.attaches.lock().len(), 1);

    // "Restart": a new engine instance over the same state dir.
    use std::io::Write;
    let mut f = std::fs::OpenOptions::new()
        .append(true)
        .open(&transcript)
        .unwrap();
    writeln!(f, "{RESULT_LINE}").unwrap();

    let engine = SpoolEngine::new(&config_for(dir.path()), fake.clone());
    engine.tail_tick();
    engine.flush().unwrap();
    engine.process_spool().await.unwrap();

    assert_eq!(fake.attaches.lock().len(), 1, "no duplicate attach");
    assert_eq!(fake.messages.lock().len(), 2);
}

#[tokio::test]
async fn message_keys_are_replay_stable() {
    let dir = tempfile::tempdir().unwrap();
    write_sessions_json(dir.path(), "work");
    write_transcript(dir.path(), "work", "s1.jsonl", &[USER_LINE, ASSISTANT_LINE]);

    let fake = Arc::new(FakeKanban::default());
    let first_keys: Vec<String> = {
        let engine = SpoolEngine::new(&config_for(dir.path()), fake.clone());
        engine.tail_tick();
        engine.flush().unwrap();
        engine.process_spool().await.unwrap();
        fake.messages.lock().iter().map(|m| m.message_key.clone()).collect()
    };

    // Replay from scratch (fresh meta in a fresh dir, same transcript bytes).
    let dir2 = tempfile::tempdir().unwrap();
    write_sessions_json(dir2.path(), "work");
    write_transcript(dir2.path(), "work", "s1.jsonl", &[USER_LINE, ASSISTANT_LINE]);

    let fake2 = Arc::new(FakeKanban::default());
    let engine = SpoolEngine::new(&config_for(dir2.path()), fake2.clone());
    engine.tail_tick();
    engine.flush().unwrap();
    engine.process_spool().await.unwrap();
    let second_keys: Vec<String> = fake2
        .messages
        .lock()
        .iter()
        .map(|m| m.message_key.clone())
        .collect();

    assert_eq!(first_keys, second_keys);
}
