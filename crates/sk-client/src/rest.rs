//! REST implementation of [`SuperKanbanApi`].
//!
//! Wraps a shared `reqwest::Client`.  Every request is bounded by a scoped
//! cancellation token armed with the configured timeout; cancellation aborts
//! the in-flight request and surfaces as `Error::Timeout`, which the spool
//! engine treats as a transport failure and retries with backoff.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use sk_domain::config::SuperKanbanConfig;
use sk_domain::records::EntityType;
use sk_domain::trace::TraceEvent;
use sk_domain::{Error, Result};

use crate::api::SuperKanbanApi;
use crate::auth::{resolve_auth, AuthScope};
use crate::types::*;
use crate::url::normalize_base_url;

// Default integration-write paths; the reconciler CLI can override them.
const DEFAULT_ATTACH_PATH: &str = "/integrations/openclaw/sessions/attach";
const DEFAULT_MESSAGES_PATH: &str = "/integrations/openclaw/sessions/messages";
const DEFAULT_TOOL_CALLS_PATH: &str = "/integrations/openclaw/sessions/tool-calls";

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Client
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A REST client for Super-Kanban, created once and reused for the process
/// lifetime.  The underlying `reqwest::Client` pools connections.
#[derive(Debug, Clone)]
pub struct RestSuperKanbanClient {
    http: Client,
    base_url: String,
    cfg: SuperKanbanConfig,
    timeout: Duration,
    shutdown: CancellationToken,
    attach_path: String,
    messages_path: String,
    tool_calls_path: String,
}

impl RestSuperKanbanClient {
    pub fn new(cfg: &SuperKanbanConfig, shutdown: CancellationToken) -> Result<Self> {
        if cfg.base_url.trim().is_empty() {
            return Err(Error::Config("super_kanban.base_url is empty".into()));
        }
        let http = Client::builder()
            .build()
            .map_err(|e| Error::Transport(e.to_string()))?;

        Ok(Self {
            http,
            base_url: normalize_base_url(&cfg.base_url),
            cfg: cfg.clone(),
            timeout: Duration::from_millis(cfg.effective_timeout_ms()),
            shutdown,
            attach_path: DEFAULT_ATTACH_PATH.into(),
            messages_path: DEFAULT_MESSAGES_PATH.into(),
            tool_calls_path: DEFAULT_TOOL_CALLS_PATH.into(),
        })
    }

    /// Override the attach/messages/tool-calls paths (reconciler CLI flags).
    pub fn with_paths(
        mut self,
        attach: Option<String>,
        messages: Option<String>,
        tool_calls: Option<String>,
    ) -> Self {
        if let Some(p) = attach {
            self.attach_path = p;
        }
        if let Some(p) = messages {
            self.messages_path = p;
        }
        if let Some(p) = tool_calls {
            self.tool_calls_path = p;
        }
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    // ── request engine ───────────────────────────────────────────────

    /// Execute one request: auth by scope, trace tagging, timeout by scoped
    /// cancellation.  Returns the status and raw body for non-error statuses;
    /// non-2xx becomes `Error::Protocol`.
    async fn execute<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<(StatusCode, String)> {
        let scope = AuthScope::for_method(&method);
        let (auth_name, auth_value) = resolve_auth(&self.cfg, scope)?;
        let url = format!("{}{}", self.base_url, path);

        let mut rb = self
            .http
            .request(method, &url)
            .header("X-Client-Type", "openclaw-sk-sync")
            .header("X-Trace-Id", Uuid::new_v4().to_string())
            .header(&auth_name, &auth_value);
        if let Some(b) = body {
            rb = rb.json(b);
        }

        // Scoped cancellation: the budget timer and process shutdown both
        // cancel the token; a cancelled token aborts the in-flight request.
        let cancel = self.shutdown.child_token();
        let start = Instant::now();

        let result = tokio::select! {
            _ = cancel.cancelled() => {
                return Err(Error::Transport(format!("{path}: shutdown")));
            }
            _ = tokio::time::sleep(self.timeout) => {
                cancel.cancel();
                return Err(Error::Timeout(path.to_owned()));
            }
            r = rb.send() => r,
        };
        let duration_ms = start.elapsed().as_millis() as u64;

        let resp = result.map_err(|e| {
            if e.is_timeout() {
                Error::Timeout(path.to_owned())
            } else {
                Error::Transport(format!("{path}: {e}"))
            }
        })?;

        let status = resp.status();
        TraceEvent::SuperKanbanCall {
            endpoint: path.to_owned(),
            status: status.as_u16(),
            duration_ms,
        }
        .emit();

        let text = resp.text().await.unwrap_or_default();
        if status.is_success() || status == StatusCode::NOT_FOUND {
            return Ok((status, text));
        }
        Err(Error::Protocol {
            status: status.as_u16(),
            body: text,
        })
    }

    async fn post_data<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        let (status, text) = self.execute(Method::POST, path, Some(body)).await?;
        if status == StatusCode::NOT_FOUND {
            return Err(Error::Protocol {
                status: 404,
                body: text,
            });
        }
        let env: Envelope<T> = serde_json::from_str(&text)?;
        Ok(env.data)
    }

    async fn post_unit<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<()> {
        let (status, text) = self.execute(Method::POST, path, Some(body)).await?;
        if status == StatusCode::NOT_FOUND {
            return Err(Error::Protocol {
                status: 404,
                body: text,
            });
        }
        Ok(())
    }

    async fn get_data<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let (status, text) = self.execute(Method::GET, path, None::<&()>).await?;
        if status == StatusCode::NOT_FOUND {
            return Err(Error::Protocol {
                status: 404,
                body: text,
            });
        }
        let env: Envelope<T> = serde_json::from_str(&text)?;
        Ok(env.data)
    }

    fn entity_segment(entity: EntityType) -> &'static str {
        match entity {
            EntityType::Project => "projects",
            EntityType::WorkItem => "work-items",
            EntityType::Task => "tasks",
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// SuperKanbanApi
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait]
impl SuperKanbanApi for RestSuperKanbanClient {
    async fn upsert_project(&self, req: &UpsertProjectRequest) -> Result<SkEntity> {
        self.post_data("/integrations/openclaw/projects/upsert", req)
            .await
    }

    async fn upsert_work_item(&self, req: &UpsertWorkItemRequest) -> Result<SkEntity> {
        self.post_data("/integrations/openclaw/work-items/upsert", req)
            .await
    }

    async fn upsert_task(&self, req: &UpsertTaskRequest) -> Result<SkEntity> {
        self.post_data("/integrations/openclaw/tasks/upsert", req)
            .await
    }

    async fn attach_session(&self, req: &AttachSessionRequest) -> Result<()> {
        let path = self.attach_path.clone();
        self.post_unit(&path, req).await
    }

    async fn record_message(&self, req: &RecordMessageRequest) -> Result<()> {
        let path = self.messages_path.clone();
        self.post_unit(&path, req).await
    }

    async fn record_tool_call(&self, req: &RecordToolCallRequest) -> Result<()> {
        let path = self.tool_calls_path.clone();
        self.post_unit(&path, req).await
    }

    async fn post_event(&self, req: &PostEventRequest) -> Result<()> {
        self.post_unit("/integrations/openclaw/events", req).await
    }

    async fn lock_task(&self, task_id: &str, owner: &str, ttl_seconds: u64) -> Result<()> {
        let req = LockTaskRequest {
            owner: owner.to_owned(),
            ttl_seconds,
        };
        match self
            .post_unit(&format!("/integrations/openclaw/tasks/{task_id}/lock"), &req)
            .await
        {
            // 423 Locked and 409 Conflict both mean "someone holds it".
            Err(Error::Protocol { status, body }) if status == 423 || status == 409 => {
                Err(Error::Conflict(body))
            }
            other => other,
        }
    }

    async fn unlock_task(&self, task_id: &str, owner: &str) -> Result<()> {
        let req = UnlockTaskRequest {
            owner: owner.to_owned(),
        };
        self.post_unit(
            &format!("/integrations/openclaw/tasks/{task_id}/unlock"),
            &req,
        )
        .await
    }

    async fn patch_status(&self, entity: EntityType, id: &str, status: &str) -> Result<()> {
        let seg = Self::entity_segment(entity);
        let body = PatchStatusRequest {
            status: status.to_owned(),
        };
        let (code, text) = self
            .execute(Method::PATCH, &format!("/{seg}/{id}"), Some(&body))
            .await?;
        if code == StatusCode::NOT_FOUND {
            return Err(Error::Protocol {
                status: 404,
                body: text,
            });
        }
        Ok(())
    }

    async fn patch_archived(&self, entity: EntityType, id: &str, archived: bool) -> Result<()> {
        let seg = Self::entity_segment(entity);
        let body = PatchArchivedRequest { archived };
        let (code, text) = self
            .execute(Method::PATCH, &format!("/{seg}/{id}"), Some(&body))
            .await?;
        if code == StatusCode::NOT_FOUND {
            return Err(Error::Protocol {
                status: 404,
                body: text,
            });
        }
        Ok(())
    }

    async fn list_projects(&self, include_archived: bool) -> Result<Vec<SkEntity>> {
        let path = if include_archived {
            "/projects?includeArchived=true".to_owned()
        } else {
            "/projects".to_owned()
        };
        self.get_data(&path).await
    }

    async fn get_entity(&self, entity: EntityType, id: &str) -> Result<SkEntity> {
        let seg = Self::entity_segment(entity);
        self.get_data(&format!("/{seg}/{id}")).await
    }

    async fn list_work_items(&self, project_id: &str) -> Result<Vec<SkEntity>> {
        self.get_data(&format!("/projects/{project_id}/work-items"))
            .await
    }

    async fn list_tasks(&self, work_item_id: &str) -> Result<Vec<SkEntity>> {
        self.get_data(&format!("/work-items/{work_item_id}/tasks"))
            .await
    }

    async fn list_entity_sessions(
        &self,
        entity: EntityType,
        id: &str,
        limit: u32,
    ) -> Result<Vec<SkSession>> {
        let seg = Self::entity_segment(entity);
        self.get_data(&format!("/{seg}/{id}/sessions?limit={limit}"))
            .await
    }

    async fn resolve_session(&self, session_key: &str) -> Result<Option<SkSession>> {
        let path = format!(
            "/sessions/resolve?sessionKey={}",
            urlencode_component(session_key)
        );
        let (status, text) = self.execute(Method::GET, &path, None::<&()>).await?;
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let env: Envelope<SkSession> = serde_json::from_str(&text)?;
        Ok(Some(env.data))
    }
}

/// Percent-encode a query component (session keys contain `:`).
fn urlencode_component(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for b in raw.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(b as char)
            }
            _ => out.push_str(&format!("%{b:02X}")),
        }
    }
    out
}
