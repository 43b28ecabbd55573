//! Reconciler end-to-end: dry-run counting, fix-mode posting, replay
//! idempotence, and hashed-label resolution through the label map.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use sk_client::types::*;
use sk_client::SuperKanbanApi;
use sk_domain::config::Config;
use sk_domain::records::{EntityType, TaskStatus};
use sk_domain::Result;
use sk_reconcile::{ReconcileMode, ReconcileOptions, Reconciler};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Fake Super-Kanban (records every request)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Default)]
struct FakeKanban {
    requests: Mutex<Vec<String>>,
    tool_call_keys: Mutex<Vec<String>>,
}

#[async_trait]
impl SuperKanbanApi for FakeKanban {
    async fn upsert_project(&self, _r: &UpsertProjectRequest) -> Result<SkEntity> {
        unimplemented!()
    }
    async fn upsert_work_item(&self, _r: &UpsertWorkItemRequest) -> Result<SkEntity> {
        unimplemented!()
    }
    async fn upsert_task(&self, _r: &UpsertTaskRequest) -> Result<SkEntity> {
        unimplemented!()
    }

    async fn attach_session(&self, r: &AttachSessionRequest) -> Result<()> {
        self.requests.lock().push(format!("attach:{}", r.session_key));
        Ok(())
    }
    async fn record_message(&self, r: &RecordMessageRequest) -> Result<()> {
        self.requests.lock().push(format!("message:{}", r.message_key));
        Ok(())
    }
    async fn record_tool_call(&self, r: &RecordToolCallRequest) -> Result<()> {
        self.requests
            .lock()
            .push(format!("toolCall:{}", r.tool_call_key));
        self.tool_call_keys.lock().push(r.tool_call_key.clone());
        Ok(())
    }

    async fn post_event(&self, _r: &PostEventRequest) -> Result<()> {
        Ok(())
    }
    async fn lock_task(&self, _t: &str, _o: &str, _ttl: u64) -> Result<()> {
        Ok(())
    }
    async fn unlock_task(&self, _t: &str, _o: &str) -> Result<()> {
        Ok(())
    }
    async fn patch_status(&self, _e: EntityType, _id: &str, _s: &str) -> Result<()> {
        Ok(())
    }
    async fn patch_archived(&self, _e: EntityType, _id: &str, _a: bool) -> Result<()> {
        Ok(())
    }
    async fn patch_task_status(&self, _t: &str, _s: TaskStatus) -> Result<()> {
        Ok(())
    }
    async fn list_projects(&self, _ia: bool) -> Result<Vec<SkEntity>> {
        Ok(Vec::new())
    }
    async fn get_entity(&self, _e: EntityType, _id: &str) -> Result<SkEntity> {
        unimplemented!()
    }
    async fn list_work_items(&self, _p: &str) -> Result<Vec<SkEntity>> {
        Ok(Vec::new())
    }
    async fn list_tasks(&self, _w: &str) -> Result<Vec<SkEntity>> {
        Ok(Vec::new())
    }
    async fn list_entity_sessions(
        &self,
        _e: EntityType,
        _id: &str,
        _l: u32,
    ) -> Result<Vec<SkSession>> {
        Ok(Vec::new())
    }
    async fn resolve_session(&self, _k: &str) -> Result<Option<SkSession>> {
        Ok(None)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Fixtures
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

const TRANSCRIPT: &str = concat!(
    r#"{"type":"message","id":"m1","timestamp":1700000000000,"message":{"role":"user","content":"hello"}}"#,
    "\n",
    r#"{"type":"message","id":"m2","timestamp":1700000001000,"message":{"role":"assistant","content":[{"type":"text","text":"ok"},{"type":"toolCall","id":"tc1","name":"functions.read","arguments":{"path":"/tmp/file"}}]}}"#,
    "\n",
    r#"{"type":"message","id":"m3","timestamp":1700000002000,"message":{"role":"toolResult","toolCallId":"tc1","content":"done"}}"#,
    "\n",
);

fn seed_state(dir: &Path) -> Config {
    let sessions = dir.join("agents").join("work").join("sessions");
    std::fs::create_dir_all(&sessions).unwrap();
    std::fs::write(
        sessions.join("sessions.json"),
        r#"{"agent:work:main":{"sessionId":"s1","label":"SK:TASK:task:alpha:w1:t1"}}"#,
    )
    .unwrap();
    std::fs::write(sessions.join("s1.jsonl"), TRANSCRIPT).unwrap();

    let mut config = Config::default();
    config.state.dir = dir.to_path_buf();
    config
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn dry_run_counts_without_posting() {
    let dir = tempfile::tempdir().unwrap();
    let config = seed_state(dir.path());

    let reconciler =
        Reconciler::new(&config, ReconcileOptions::default(), None).unwrap();
    let report = reconciler.run().await.unwrap();

    assert_eq!(report.sessions_matched, 1);
    assert_eq!(report.messages, 3);
    assert_eq!(report.tool_calls, 2);
    assert_eq!(report.requests_posted, 0);

    let session = &report.sessions[0];
    assert_eq!(session.session_key, "agent:work:main");
    assert_eq!(session.first_occurred_at.as_deref(), Some("2023-11-14T22:13:20.000Z"));
    assert_eq!(session.last_occurred_at.as_deref(), Some("2023-11-14T22:13:22.000Z"));
    assert!(!session.preview_messages.is_empty());
}

#[tokio::test]
async fn fix_mode_posts_six_requests() {
    let dir = tempfile::tempdir().unwrap();
    let config = seed_state(dir.path());
    let fake = Arc::new(FakeKanban::default());

    let options = ReconcileOptions {
        mode: ReconcileMode::Fix,
        ..Default::default()
    };
    let reconciler = Reconciler::new(&config, options, Some(fake.clone() as Arc<dyn SuperKanbanApi>)).unwrap();
    let report = reconciler.run().await.unwrap();

    // 1 attach + 3 messages + 2 tool calls.
    assert_eq!(report.requests_posted, 6);
    let requests = fake.requests.lock();
    assert_eq!(requests.len(), 6);
    assert!(requests[0].starts_with("attach:agent:work:main"));

    let keys = fake.tool_call_keys.lock();
    assert_eq!(&*keys, &["agent:work:main:tc1", "agent:work:main:tc1"]);
}

#[tokio::test]
async fn replay_twice_posts_identical_keys() {
    let dir = tempfile::tempdir().unwrap();
    let config = seed_state(dir.path());
    let options = ReconcileOptions {
        mode: ReconcileMode::Fix,
        ..Default::default()
    };

    let first = Arc::new(FakeKanban::default());
    Reconciler::new(&config, options.clone(), Some(first.clone() as Arc<dyn SuperKanbanApi>))
        .unwrap()
        .run()
        .await
        .unwrap();

    let second = Arc::new(FakeKanban::default());
    Reconciler::new(&config, options, Some(second.clone() as Arc<dyn SuperKanbanApi>))
        .unwrap()
        .run()
        .await
        .unwrap();

    assert_eq!(&*first.requests.lock(), &*second.requests.lock());
}

#[tokio::test]
async fn fix_mode_requires_client() {
    let dir = tempfile::tempdir().unwrap();
    let config = seed_state(dir.path());
    let options = ReconcileOptions {
        mode: ReconcileMode::Fix,
        ..Default::default()
    };
    assert!(Reconciler::new(&config, options, None).is_err());
}

#[tokio::test]
async fn filters_narrow_the_replay() {
    let dir = tempfile::tempdir().unwrap();
    let config = seed_state(dir.path());

    let options = ReconcileOptions {
        session_id: Some("someone-else".into()),
        ..Default::default()
    };
    let report = Reconciler::new(&config, options, None)
        .unwrap()
        .run()
        .await
        .unwrap();
    assert_eq!(report.sessions_matched, 0);
    assert_eq!(report.sessions_skipped, 1);
}

#[tokio::test]
async fn hashed_label_resolved_via_transcript_and_persisted() {
    let dir = tempfile::tempdir().unwrap();
    let external_id = "task:alpha:w1:t9";
    let label = sk_keys::make_sk_task_hash_label(external_id);

    let sessions = dir.path().join("agents").join("work").join("sessions");
    std::fs::create_dir_all(&sessions).unwrap();
    std::fs::write(
        sessions.join("sessions.json"),
        format!(r#"{{"agent:work:t9":{{"sessionId":"s9","label":"{label}"}}}}"#),
    )
    .unwrap();
    // The transcript names its externalId early on.
    std::fs::write(
        sessions.join("s9.jsonl"),
        format!(
            "{}\n",
            format_args!(
                r#"{{"type":"message","id":"m1","timestamp":1700000000000,"message":{{"role":"user","content":"please do externalId: {external_id}"}}}}"#
            )
        ),
    )
    .unwrap();

    let mut config = Config::default();
    config.state.dir = dir.path().to_path_buf();

    let fake = Arc::new(FakeKanban::default());
    let options = ReconcileOptions {
        mode: ReconcileMode::Fix,
        ..Default::default()
    };
    let report = Reconciler::new(&config, options, Some(fake.clone() as Arc<dyn SuperKanbanApi>))
        .unwrap()
        .run()
        .await
        .unwrap();
    assert_eq!(report.sessions_matched, 1);

    // The discovered mapping landed in label-map.json.
    let map_raw = std::fs::read_to_string(config.state.label_map_path()).unwrap();
    assert!(map_raw.contains(external_id));
}
