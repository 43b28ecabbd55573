//! The client seam.  Everything that talks to Super-Kanban does so through
//! this trait so the exporter, reconciler, and controller can be exercised
//! against in-memory fakes.

use async_trait::async_trait;

use sk_domain::records::{EntityType, TaskStatus};
use sk_domain::Result;

use crate::types::{
    AttachSessionRequest, PostEventRequest, RecordMessageRequest, RecordToolCallRequest, SkEntity,
    SkSession, UpsertProjectRequest, UpsertTaskRequest, UpsertWorkItemRequest,
};

#[async_trait]
pub trait SuperKanbanApi: Send + Sync {
    // ── integration writes ───────────────────────────────────────────

    async fn upsert_project(&self, req: &UpsertProjectRequest) -> Result<SkEntity>;
    async fn upsert_work_item(&self, req: &UpsertWorkItemRequest) -> Result<SkEntity>;
    async fn upsert_task(&self, req: &UpsertTaskRequest) -> Result<SkEntity>;

    async fn attach_session(&self, req: &AttachSessionRequest) -> Result<()>;
    async fn record_message(&self, req: &RecordMessageRequest) -> Result<()>;
    async fn record_tool_call(&self, req: &RecordToolCallRequest) -> Result<()>;
    async fn post_event(&self, req: &PostEventRequest) -> Result<()>;

    /// Acquire a TTL-bounded task lock.  A held lock surfaces as
    /// `Error::Conflict`, which callers turn into a structured result.
    async fn lock_task(&self, task_id: &str, owner: &str, ttl_seconds: u64) -> Result<()>;
    async fn unlock_task(&self, task_id: &str, owner: &str) -> Result<()>;

    async fn patch_status(&self, entity: EntityType, id: &str, status: &str) -> Result<()>;
    async fn patch_archived(&self, entity: EntityType, id: &str, archived: bool) -> Result<()>;

    async fn patch_task_status(&self, task_id: &str, status: TaskStatus) -> Result<()> {
        let status = serde_json::to_value(status)?;
        self.patch_status(EntityType::Task, task_id, status.as_str().unwrap_or("DONE"))
            .await
    }

    // ── UI reads ─────────────────────────────────────────────────────

    async fn list_projects(&self, include_archived: bool) -> Result<Vec<SkEntity>>;
    async fn get_entity(&self, entity: EntityType, id: &str) -> Result<SkEntity>;
    async fn list_work_items(&self, project_id: &str) -> Result<Vec<SkEntity>>;
    async fn list_tasks(&self, work_item_id: &str) -> Result<Vec<SkEntity>>;
    async fn list_entity_sessions(
        &self,
        entity: EntityType,
        id: &str,
        limit: u32,
    ) -> Result<Vec<SkSession>>;

    /// Resolve a session by key.  A 404 is `Ok(None)`, not an error.
    async fn resolve_session(&self, session_key: &str) -> Result<Option<SkSession>>;
}
