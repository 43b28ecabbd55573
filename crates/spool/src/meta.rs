//! `meta.json` — the exporter's durable cursor state.
//!
//! Written only by the spool engine's owning task, as whole-file rewrites
//! via temp-then-rename.  Recovery tolerates a corrupt file by falling back
//! to defaults: cursors restart at end-of-file, so nothing is re-exported
//! and nothing is lost beyond the window the corrupt meta covered.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use sk_domain::{Error, Result};

pub const META_VERSION: u32 = 1;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileCursor {
    pub offset: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetaFile {
    pub version: u32,
    #[serde(default)]
    pub file_cursors: HashMap<String, FileCursor>,
    #[serde(default)]
    pub spool_offset: u64,
    #[serde(default)]
    pub attached_sessions: HashMap<String, bool>,
    #[serde(default)]
    pub consecutive_failures: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_send_at_ms: Option<i64>,
}

impl Default for MetaFile {
    fn default() -> Self {
        Self {
            version: META_VERSION,
            file_cursors: HashMap::new(),
            spool_offset: 0,
            attached_sessions: HashMap::new(),
            consecutive_failures: 0,
            next_send_at_ms: None,
        }
    }
}

impl MetaFile {
    /// Load the meta file, falling back to defaults when missing or corrupt.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(raw) => match serde_json::from_str::<MetaFile>(&raw) {
                Ok(meta) => meta,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "meta file corrupt, using defaults");
                    MetaFile::default()
                }
            },
            Err(_) => MetaFile::default(),
        }
    }

    /// Persist the whole file via temp-then-rename.
    pub fn persist(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(Error::Io)?;
        }
        let tmp = path.with_extension("json.tmp");
        let json = serde_json::to_string(self)?;
        std::fs::write(&tmp, json).map_err(Error::Io)?;
        std::fs::rename(&tmp, path).map_err(Error::Io)?;
        Ok(())
    }

    pub fn cursor(&self, path: &str) -> Option<u64> {
        self.file_cursors.get(path).map(|c| c.offset)
    }

    pub fn set_cursor(&mut self, path: &str, offset: u64) {
        self.file_cursors
            .insert(path.to_owned(), FileCursor { offset });
    }

    pub fn is_attached(&self, session_key: &str) -> bool {
        self.attached_sessions
            .get(session_key)
            .copied()
            .unwrap_or(false)
    }

    pub fn mark_attached(&mut self, session_key: &str) {
        self.attached_sessions.insert(session_key.to_owned(), true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("meta.json");

        let mut meta = MetaFile::default();
        meta.set_cursor("/a/b.jsonl", 1234);
        meta.spool_offset = 99;
        meta.mark_attached("agent:work:main");
        meta.consecutive_failures = 3;
        meta.next_send_at_ms = Some(1_700_000_000_000);
        meta.persist(&path).unwrap();

        let loaded = MetaFile::load(&path);
        assert_eq!(loaded.version, META_VERSION);
        assert_eq!(loaded.cursor("/a/b.jsonl"), Some(1234));
        assert_eq!(loaded.spool_offset, 99);
        assert!(loaded.is_attached("agent:work:main"));
        assert_eq!(loaded.consecutive_failures, 3);
        assert_eq!(loaded.next_send_at_ms, Some(1_700_000_000_000));
    }

    #[test]
    fn corrupt_meta_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("meta.json");
        std::fs::write(&path, "{\"version\": 1, \"fileCursors\": {truncated").unwrap();

        let loaded = MetaFile::load(&path);
        assert_eq!(loaded.spool_offset, 0);
        assert!(loaded.file_cursors.is_empty());
    }

    #[test]
    fn missing_meta_is_default() {
        let loaded = MetaFile::load(Path::new("/nonexistent/meta.json"));
        assert_eq!(loaded.version, META_VERSION);
    }

    #[test]
    fn wire_field_names_are_camel_case() {
        let meta = MetaFile::default();
        let json = serde_json::to_value(&meta).unwrap();
        assert!(json.get("fileCursors").is_some());
        assert!(json.get("spoolOffset").is_some());
        assert!(json.get("attachedSessions").is_some());
        assert!(json.get("consecutiveFailures").is_some());
    }
}
