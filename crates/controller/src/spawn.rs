//! Spawn-tool parameter and result types.
//!
//! The tool is agent-callable, so both the input and every outcome —
//! including the lock-conflict case — are structured JSON, never free-form
//! error strings.

use serde::{Deserialize, Serialize};

use sk_domain::records::EntityType;

/// Orchestration level of the session being requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SpawnLevel {
    /// Project-level coordinator.
    Orion,
    /// Work-item-level coordinator.
    Atlas,
    /// Task-level worker.
    Worker,
}

impl SpawnLevel {
    pub fn entity_type(self) -> EntityType {
        match self {
            Self::Orion => EntityType::Project,
            Self::Atlas => EntityType::WorkItem,
            Self::Worker => EntityType::Task,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpawnParams {
    pub level: SpawnLevel,
    /// The instruction forwarded to the session.
    pub task: String,
    #[serde(default)]
    pub label: Option<String>,

    /// Project external ID or bare key.
    pub project: String,
    #[serde(default)]
    pub project_name: Option<String>,
    /// Required for ATLAS and WORKER.
    #[serde(default)]
    pub work_item: Option<String>,
    #[serde(default)]
    pub work_item_title: Option<String>,
    /// Required for WORKER.
    #[serde(default)]
    pub task_key: Option<String>,
    #[serde(default)]
    pub task_title: Option<String>,

    #[serde(default)]
    pub agent_id: Option<String>,
    #[serde(default = "d_true")]
    pub wake_parent_on_end: bool,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub thinking: Option<String>,
    #[serde(default)]
    pub cwd: Option<String>,
    #[serde(default)]
    pub run_timeout_seconds: Option<u64>,
}

fn d_true() -> bool {
    true
}

/// Structured tool result.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum SpawnOutcome {
    /// A new session was spawned for the entity.
    #[serde(rename_all = "camelCase")]
    Spawned {
        run_id: String,
        session_key: String,
        entity_type: EntityType,
        entity_external_id: String,
    },
    /// An existing session was re-attached and the task forwarded to it.
    #[serde(rename_all = "camelCase")]
    Reused {
        session_key: String,
        entity_type: EntityType,
        entity_external_id: String,
    },
    /// The task lock is held by someone else.
    #[serde(rename_all = "camelCase")]
    Conflict {
        reason: String,
        entity_type: EntityType,
    },
}
