//! Persistent hash → external-ID label map.
//!
//! `SK:TASKH:<hash16>` labels carry only a hash; the mapping back to the
//! task external ID is discovered once (by scanning a transcript prefix)
//! and persisted here so later runs resolve instantly.  The file is an
//! append-dedup JSON array, rewritten whole via temp-then-rename.

use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use sk_domain::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelMapEntry {
    pub external_id: String,
    pub label: String,
    pub hash: String,
}

pub struct LabelMapStore {
    path: PathBuf,
    entries: Mutex<Vec<LabelMapEntry>>,
}

impl LabelMapStore {
    /// Load the store.  A missing or corrupt file starts empty — the map is
    /// a cache of discoverable facts, never the source of truth.
    pub fn load(path: &Path) -> Self {
        let entries = match std::fs::read_to_string(path) {
            Ok(raw) => match serde_json::from_str::<Vec<LabelMapEntry>>(&raw) {
                Ok(list) => list,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "label map unreadable, starting empty");
                    Vec::new()
                }
            },
            Err(_) => Vec::new(),
        };
        Self {
            path: path.to_path_buf(),
            entries: Mutex::new(entries),
        }
    }

    /// Resolve a 16-hex-digit hash to its external ID.
    pub fn lookup_hash(&self, hash: &str) -> Option<LabelMapEntry> {
        self.entries
            .lock()
            .iter()
            .find(|e| e.hash == hash)
            .cloned()
    }

    /// Append an entry unless any of its three fields already appears.
    /// Returns whether the entry was added.
    pub fn append_dedup(&self, entry: LabelMapEntry) -> Result<bool> {
        let mut entries = self.entries.lock();
        let duplicate = entries.iter().any(|e| {
            e.external_id == entry.external_id || e.label == entry.label || e.hash == entry.hash
        });
        if duplicate {
            return Ok(false);
        }
        entries.push(entry);
        self.persist(&entries)?;
        Ok(true)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    fn persist(&self, entries: &[LabelMapEntry]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(Error::Io)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(entries)?;
        std::fs::write(&tmp, json).map_err(Error::Io)?;
        std::fs::rename(&tmp, &self.path).map_err(Error::Io)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str, label: &str, hash: &str) -> LabelMapEntry {
        LabelMapEntry {
            external_id: id.into(),
            label: label.into(),
            hash: hash.into(),
        }
    }

    #[test]
    fn append_and_lookup() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("label-map.json");
        let store = LabelMapStore::load(&path);

        assert!(store.append_dedup(entry("task:a:w:t", "SK:TASKH:aa", "aa")).unwrap());
        let found = store.lookup_hash("aa").unwrap();
        assert_eq!(found.external_id, "task:a:w:t");
    }

    #[test]
    fn dedup_on_any_field() {
        let dir = tempfile::tempdir().unwrap();
        let store = LabelMapStore::load(&dir.path().join("m.json"));
        store.append_dedup(entry("id1", "l1", "h1")).unwrap();

        assert!(!store.append_dedup(entry("id1", "l2", "h2")).unwrap());
        assert!(!store.append_dedup(entry("id3", "l1", "h3")).unwrap());
        assert!(!store.append_dedup(entry("id4", "l4", "h1")).unwrap());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn survives_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("m.json");
        {
            let store = LabelMapStore::load(&path);
            store.append_dedup(entry("id1", "l1", "h1")).unwrap();
        }
        let store = LabelMapStore::load(&path);
        assert!(store.lookup_hash("h1").is_some());
    }

    #[test]
    fn corrupt_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("m.json");
        std::fs::write(&path, "{{not json").unwrap();
        let store = LabelMapStore::load(&path);
        assert!(store.is_empty());
    }
}
