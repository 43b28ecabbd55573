//! The controller proper: spawn-or-reuse plus lifecycle reconciliation.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use serde::Deserialize;

use sk_client::types::{
    AttachSessionRequest, SkSession, UpsertProjectRequest, UpsertTaskRequest,
    UpsertWorkItemRequest,
};
use sk_client::SuperKanbanApi;
use sk_domain::config::ControllerConfig;
use sk_domain::records::{to_iso_millis, EntityType, SessionState, TaskStatus};
use sk_domain::trace::TraceEvent;
use sk_domain::{Error, Result};
use sk_keys::{
    canonicalize_project_external_id, canonicalize_task_external_id,
    canonicalize_work_item_external_id, leaf_key, make_sk_task_hash_label,
    truncate_session_label, MAX_SESSION_LABEL_CHARS,
};

use crate::outcome::map_outcome;
use crate::spawn::{SpawnLevel, SpawnOutcome, SpawnParams};
use crate::traits::{AgentSessions, GatewayRpc, SpawnSessionRequest};
use crate::wake::{WakeEntry, WakeTracker};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Lifecycle hook events
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentEndEvent {
    pub session_key: String,
    #[serde(default)]
    pub outcome: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubagentSpawnedEvent {
    #[serde(default)]
    pub run_id: Option<String>,
    pub child_session_key: String,
    pub requester_session_key: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubagentEndedEvent {
    #[serde(default)]
    pub run_id: Option<String>,
    pub child_session_key: String,
    #[serde(default)]
    pub outcome: Option<String>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tracked runs
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone)]
struct TrackedRun {
    parent_session_key: String,
    child_session_key: String,
    entity_type: EntityType,
    entity_external_id: String,
    /// Server-side task ID — present for WORKER runs, which hold a lock.
    task_id: Option<String>,
    lock_owner: Option<String>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Controller
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct SessionController {
    cfg: ControllerConfig,
    api: Arc<dyn SuperKanbanApi>,
    sessions: Arc<dyn AgentSessions>,
    wake: WakeTracker,
    tracked: Mutex<HashMap<String, TrackedRun>>,
    run_by_child: Mutex<HashMap<String, String>>,
    requester_by_child: Mutex<HashMap<String, String>>,
}

impl SessionController {
    pub fn new(
        cfg: ControllerConfig,
        api: Arc<dyn SuperKanbanApi>,
        sessions: Arc<dyn AgentSessions>,
        rpc: Arc<dyn GatewayRpc>,
    ) -> Self {
        let wake = WakeTracker::new(rpc, cfg.wake_deliver);
        Self {
            cfg,
            api,
            sessions,
            wake,
            tracked: Mutex::new(HashMap::new()),
            run_by_child: Mutex::new(HashMap::new()),
            requester_by_child: Mutex::new(HashMap::new()),
        }
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Spawn tool
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// The agent-callable spawn tool.  `ctx_session_key` identifies the
    /// requesting (parent) session.
    pub async fn spawn(
        &self,
        ctx_session_key: &str,
        params: SpawnParams,
    ) -> Result<SpawnOutcome> {
        // 1. Canonicalize every external ID before any network call.
        let project_ext = canonicalize_project_external_id(&params.project)?;
        let project_key = leaf_key(&project_ext).to_owned();

        let work_item_ext = match params.level {
            SpawnLevel::Orion => None,
            SpawnLevel::Atlas | SpawnLevel::Worker => {
                let raw = params.work_item.as_deref().ok_or_else(|| {
                    Error::InvalidExternalId("workItem is required for this level".into())
                })?;
                Some(canonicalize_work_item_external_id(raw, &project_key)?)
            }
        };
        let work_item_key = work_item_ext.as_deref().map(|e| leaf_key(e).to_owned());

        let task_ext = match params.level {
            SpawnLevel::Worker => {
                let raw = params.task_key.as_deref().ok_or_else(|| {
                    Error::InvalidExternalId("taskKey is required for WORKER".into())
                })?;
                let wi_key = work_item_key.as_deref().expect("worker has a work item");
                Some(canonicalize_task_external_id(raw, &project_key, wi_key)?)
            }
            _ => None,
        };

        // 2. Upsert entities bottom-up relative to the level.
        let project = self
            .api
            .upsert_project(&UpsertProjectRequest {
                external_id: project_ext.clone(),
                name: params
                    .project_name
                    .clone()
                    .unwrap_or_else(|| project_key.clone()),
                status: Some("IN_PROGRESS".into()),
            })
            .await?;

        let work_item = match &work_item_ext {
            Some(ext) => Some(
                self.api
                    .upsert_work_item(&UpsertWorkItemRequest {
                        external_id: ext.clone(),
                        project_external_id: project_ext.clone(),
                        title: params
                            .work_item_title
                            .clone()
                            .or_else(|| work_item_key.clone())
                            .unwrap_or_default(),
                        status: Some("IN_PROGRESS".into()),
                    })
                    .await?,
            ),
            None => None,
        };

        let task = match &task_ext {
            Some(ext) => Some(
                self.api
                    .upsert_task(&UpsertTaskRequest {
                        external_id: ext.clone(),
                        work_item_external_id: work_item_ext.clone().expect("worker"),
                        title: params
                            .task_title
                            .clone()
                            .unwrap_or_else(|| leaf_key(ext).to_owned()),
                        status: Some(TaskStatus::InProgress),
                    })
                    .await?,
            ),
            None => None,
        };

        // 3. Bind to the level's entity.
        let entity_type = params.level.entity_type();
        let (entity_id, entity_external_id) = match params.level {
            SpawnLevel::Orion => (project.id.clone(), project_ext.clone()),
            SpawnLevel::Atlas => {
                let wi = work_item.as_ref().expect("atlas has a work item");
                (wi.id.clone(), work_item_ext.clone().expect("atlas"))
            }
            SpawnLevel::Worker => {
                let t = task.as_ref().expect("worker has a task");
                (t.id.clone(), task_ext.clone().expect("worker"))
            }
        };

        // 4. WORKER takes the task lock; a held lock is a structured result,
        //    not an error.
        if params.level == SpawnLevel::Worker {
            let task_id = task.as_ref().expect("worker has a task").id.clone();
            match self
                .api
                .lock_task(
                    &task_id,
                    ctx_session_key,
                    self.cfg.effective_lock_ttl_seconds(),
                )
                .await
            {
                Ok(()) => {}
                Err(Error::Conflict(_)) => {
                    TraceEvent::SpawnDecision {
                        level: format!("{:?}", params.level).to_uppercase(),
                        decision: "conflict".into(),
                        entity_external_id,
                    }
                    .emit();
                    return Ok(SpawnOutcome::Conflict {
                        reason: "task_locked".into(),
                        entity_type,
                    });
                }
                Err(e) => return Err(e),
            }
        }

        // 5. ORION/ATLAS prefer re-using an existing session.
        if matches!(params.level, SpawnLevel::Orion | SpawnLevel::Atlas) {
            let existing = self
                .api
                .list_entity_sessions(entity_type, &entity_id, self.cfg.reuse_list_limit)
                .await?;
            if let Some(session) = pick_reusable(&existing) {
                self.attach(&session.session_key, entity_type, &entity_external_id, SessionState::Running, false)
                    .await?;
                self.sessions.send(&session.session_key, &params.task).await?;
                TraceEvent::SpawnDecision {
                    level: format!("{:?}", params.level).to_uppercase(),
                    decision: "reused".into(),
                    entity_external_id: entity_external_id.clone(),
                }
                .emit();
                return Ok(SpawnOutcome::Reused {
                    session_key: session.session_key.clone(),
                    entity_type,
                    entity_external_id,
                });
            }
        }

        // 6. Spawn a fresh session.
        let label = session_label(&params, entity_type, &entity_external_id);
        let spawn_req = SpawnSessionRequest {
            task: params.task.clone(),
            label: Some(label),
            agent_id: params.agent_id.clone(),
            model: params.model.clone(),
            thinking: params.thinking.clone(),
            cwd: params.cwd.clone(),
            run_timeout_seconds: params.run_timeout_seconds,
            mode: "run".into(),
            cleanup: "keep".into(),
        };
        let spawned = self.sessions.spawn(&spawn_req).await?;

        let (run_id, child_session_key) = match (
            spawned.accepted,
            spawned.run_id.clone(),
            spawned.session_key.clone(),
        ) {
            (true, Some(run_id), Some(key)) => (run_id, key),
            _ => {
                if params.level == SpawnLevel::Worker {
                    let task_id = task.as_ref().expect("worker has a task").id.clone();
                    if let Err(e) = self.api.unlock_task(&task_id, ctx_session_key).await {
                        tracing::warn!(error = %e, task_id, "best-effort unlock after rejected spawn failed");
                    }
                }
                return Err(Error::Other(format!(
                    "session spawn rejected: {}",
                    spawned.error.unwrap_or_else(|| "unknown".into())
                )));
            }
        };

        // 7. Track the run, wake registration, and attach the child.
        self.tracked.lock().insert(
            run_id.clone(),
            TrackedRun {
                parent_session_key: ctx_session_key.to_owned(),
                child_session_key: child_session_key.clone(),
                entity_type,
                entity_external_id: entity_external_id.clone(),
                task_id: task.as_ref().map(|t| t.id.clone()),
                lock_owner: (params.level == SpawnLevel::Worker)
                    .then(|| ctx_session_key.to_owned()),
            },
        );
        self.run_by_child
            .lock()
            .insert(child_session_key.clone(), run_id.clone());
        self.wake.register(
            &run_id,
            WakeEntry {
                parent_session_key: ctx_session_key.to_owned(),
                child_session_key: child_session_key.clone(),
                wake_parent_on_end: params.wake_parent_on_end,
            },
        );

        self.attach(&child_session_key, entity_type, &entity_external_id, SessionState::Running, false)
            .await?;

        TraceEvent::SpawnDecision {
            level: format!("{:?}", params.level).to_uppercase(),
            decision: "spawned".into(),
            entity_external_id: entity_external_id.clone(),
        }
        .emit();

        Ok(SpawnOutcome::Spawned {
            run_id,
            session_key: child_session_key,
            entity_type,
            entity_external_id,
        })
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Lifecycle hooks
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// `subagent_spawned`: remember who requested the child so a later
    /// unlock can be attributed to its owner.
    pub fn on_subagent_spawned(&self, event: &SubagentSpawnedEvent) {
        self.requester_by_child.lock().insert(
            event.child_session_key.clone(),
            event.requester_session_key.clone(),
        );
    }

    /// `agent_end` fast path: only sessions this controller spawned are
    /// closed here.  The wake is left to `subagent_ended`.
    pub async fn on_agent_end(&self, event: &AgentEndEvent) -> Result<()> {
        let run_id = self.run_by_child.lock().get(&event.session_key).cloned();
        let Some(run_id) = run_id else {
            return Ok(());
        };
        self.close_run(&run_id, event.outcome.as_deref()).await
    }

    /// `subagent_ended` fallback: identical close semantics plus the wake.
    pub async fn on_subagent_ended(&self, event: &SubagentEndedEvent) -> Result<()> {
        let run_id = match &event.run_id {
            Some(id) => Some(id.clone()),
            None => self
                .run_by_child
                .lock()
                .get(&event.child_session_key)
                .cloned(),
        };
        let Some(run_id) = run_id else {
            return Ok(());
        };

        let result = self.close_run(&run_id, event.outcome.as_deref()).await;
        let (state, _) = map_outcome(event.outcome.as_deref());
        self.wake.fire(&run_id, state, event.outcome.as_deref()).await;
        result
    }

    /// Close a tracked run: terminal attach (unless SK already reports the
    /// session terminal), then task status + unlock, best-effort.
    async fn close_run(&self, run_id: &str, outcome: Option<&str>) -> Result<()> {
        let Some(run) = self.tracked.lock().get(run_id).cloned() else {
            return Ok(());
        };
        let (state, task_status) = map_outcome(outcome);

        let already_terminal = match self.api.resolve_session(&run.child_session_key).await {
            Ok(Some(session)) => session.state.is_terminal(),
            Ok(None) => false,
            Err(e) => {
                tracing::debug!(error = %e, "session resolve failed, assuming not terminal");
                false
            }
        };
        if !already_terminal {
            self.attach(
                &run.child_session_key,
                run.entity_type,
                &run.entity_external_id,
                state,
                true,
            )
            .await?;
        }

        // TASK bookkeeping is re-applied even when the session was already
        // terminal.
        if let Some(task_id) = &run.task_id {
            if let Err(e) = self.api.patch_task_status(task_id, task_status).await {
                tracing::warn!(error = %e, task_id, "task status patch failed");
            }
            let owner = run
                .lock_owner
                .clone()
                .or_else(|| {
                    self.requester_by_child
                        .lock()
                        .get(&run.child_session_key)
                        .cloned()
                })
                .unwrap_or_else(|| run.parent_session_key.clone());
            if let Err(e) = self.api.unlock_task(task_id, &owner).await {
                tracing::warn!(error = %e, task_id, "task unlock failed");
            }
        }

        Ok(())
    }

    async fn attach(
        &self,
        session_key: &str,
        entity_type: EntityType,
        entity_external_id: &str,
        state: SessionState,
        ended: bool,
    ) -> Result<()> {
        let now = to_iso_millis(Utc::now());
        let req = AttachSessionRequest {
            session_key: session_key.to_owned(),
            entity_type,
            entity_id: None,
            entity_external_id: Some(entity_external_id.to_owned()),
            state,
            started_at: (!ended).then(|| now.clone()),
            ended_at: ended.then_some(now),
        };
        self.api.attach_session(&req).await
    }

    pub fn tracked_runs(&self) -> usize {
        self.tracked.lock().len()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Prefer a RUNNING session, otherwise the first listed.
fn pick_reusable(sessions: &[SkSession]) -> Option<&SkSession> {
    sessions
        .iter()
        .find(|s| s.state == SessionState::Running)
        .or_else(|| sessions.first())
}

/// The label the child session carries, routing its transcript back to the
/// entity.  User labels are truncated into budget; derived labels fall back
/// to the hashed form for tasks whose external ID would not fit.
fn session_label(
    params: &SpawnParams,
    entity_type: EntityType,
    entity_external_id: &str,
) -> String {
    if let Some(label) = &params.label {
        return truncate_session_label(label, MAX_SESSION_LABEL_CHARS);
    }
    let direct = format!("SK:{entity_type}:{entity_external_id}");
    if direct.chars().count() <= MAX_SESSION_LABEL_CHARS {
        direct
    } else if entity_type == EntityType::Task {
        make_sk_task_hash_label(entity_external_id)
    } else {
        truncate_session_label(&direct, MAX_SESSION_LABEL_CHARS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(level: SpawnLevel) -> SpawnParams {
        serde_json::from_value(serde_json::json!({
            "level": match level {
                SpawnLevel::Orion => "ORION",
                SpawnLevel::Atlas => "ATLAS",
                SpawnLevel::Worker => "WORKER",
            },
            "task": "do it",
            "project": "alpha",
            "workItem": "w1",
            "taskKey": "t1",
        }))
        .unwrap()
    }

    #[test]
    fn derived_label_direct_when_it_fits() {
        let label = session_label(
            &params(SpawnLevel::Worker),
            EntityType::Task,
            "task:alpha:w1:t1",
        );
        assert_eq!(label, "SK:TASK:task:alpha:w1:t1");
    }

    #[test]
    fn derived_task_label_hashes_when_too_long() {
        let long_ext = format!("task:alpha:w1:{}", "t".repeat(80));
        let label = session_label(&params(SpawnLevel::Worker), EntityType::Task, &long_ext);
        assert!(label.starts_with("SK:TASKH:"));
        assert_eq!(label.len(), "SK:TASKH:".len() + 16);
    }

    #[test]
    fn user_label_truncated_into_budget() {
        let mut p = params(SpawnLevel::Orion);
        p.label = Some("x".repeat(100));
        let label = session_label(&p, EntityType::Project, "project:alpha");
        assert_eq!(label.chars().count(), MAX_SESSION_LABEL_CHARS);
    }

    #[test]
    fn reuse_prefers_running() {
        let sessions = vec![
            SkSession {
                id: "1".into(),
                session_key: "a".into(),
                state: SessionState::Done,
                entity_type: None,
                entity_id: None,
            },
            SkSession {
                id: "2".into(),
                session_key: "b".into(),
                state: SessionState::Running,
                entity_type: None,
                entity_id: None,
            },
        ];
        assert_eq!(pick_reusable(&sessions).unwrap().session_key, "b");
    }

    #[test]
    fn reuse_falls_back_to_first() {
        let sessions = vec![SkSession {
            id: "1".into(),
            session_key: "a".into(),
            state: SessionState::Done,
            entity_type: None,
            entity_id: None,
        }];
        assert_eq!(pick_reusable(&sessions).unwrap().session_key, "a");
        assert!(pick_reusable(&[]).is_none());
    }
}
