use std::path::PathBuf;

use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// State layout
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Where OpenClaw keeps its on-disk state and where this plugin keeps its own.
///
/// Layout (consumed):
///   `<dir>/agents/<agentId>/sessions/<sessionId>[-topic-<enc>].jsonl`
///   `<dir>/agents/<agentId>/sessions/sessions.json`
/// Layout (owned):
///   `<dir>/plugins/<pluginId>/meta.json`
///   `<dir>/plugins/<pluginId>/spool.jsonl`
///   `<dir>/Exports/label-map.json` (overridable)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateConfig {
    #[serde(default = "d_state_dir")]
    pub dir: PathBuf,
    #[serde(default = "d_plugin_id")]
    pub plugin_id: String,
    /// Override for the label-map path; `SUPER_KANBAN_LABEL_MAP_PATH` wins.
    #[serde(default)]
    pub label_map_path: Option<PathBuf>,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            dir: d_state_dir(),
            plugin_id: d_plugin_id(),
            label_map_path: None,
        }
    }
}

impl StateConfig {
    pub fn apply_env(&mut self) {
        if let Ok(dir) = std::env::var("OPENCLAW_STATE_DIR") {
            if !dir.is_empty() {
                self.dir = PathBuf::from(dir);
            }
        }
        if let Ok(p) = std::env::var("SUPER_KANBAN_LABEL_MAP_PATH") {
            if !p.is_empty() {
                self.label_map_path = Some(PathBuf::from(p));
            }
        }
    }

    pub fn agents_dir(&self) -> PathBuf {
        self.dir.join("agents")
    }

    pub fn plugin_dir(&self) -> PathBuf {
        self.dir.join("plugins").join(&self.plugin_id)
    }

    pub fn meta_path(&self) -> PathBuf {
        self.plugin_dir().join("meta.json")
    }

    pub fn spool_path(&self) -> PathBuf {
        self.plugin_dir().join("spool.jsonl")
    }

    pub fn label_map_path(&self) -> PathBuf {
        self.label_map_path
            .clone()
            .unwrap_or_else(|| self.dir.join("Exports").join("label-map.json"))
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_state_dir() -> PathBuf {
    std::env::var("HOME")
        .map(|h| PathBuf::from(h).join(".openclaw"))
        .unwrap_or_else(|_| PathBuf::from("/tmp/.openclaw"))
}

fn d_plugin_id() -> String {
    "super-kanban".into()
}
