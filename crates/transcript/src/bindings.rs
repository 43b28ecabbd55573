//! Session-binding resolution.
//!
//! A transcript line is exportable only if its `(agentId, sessionId)` pair
//! reverse-resolves through `sessions.json` to a `sessionKey` whose label is
//! an `SK:*` routing label.  The per-agent index is cached and reloaded when
//! the file's modification time changes; hashed labels go through the
//! persistent label map, falling back to a bounded transcript-prefix scan.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::SystemTime;

use parking_lot::Mutex;
use regex::Regex;
use serde_json::Value;

use sk_domain::records::SessionBinding;
use sk_domain::trace::TraceEvent;
use sk_keys::{make_sk_task_hash_label, parse_sk_routing_label, sha256_hex, RoutingLabel};

use crate::label_map::{LabelMapEntry, LabelMapStore};

/// Upper bound on the transcript prefix scanned while resolving a hashed
/// label.  A defense against pathological files; must not be raised.
pub const HASH_SCAN_MAX_LINES: usize = 500;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// sessions.json index
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone)]
struct IndexEntry {
    session_key: String,
    label: Option<String>,
}

#[derive(Debug, Default)]
struct AgentIndex {
    mtime: Option<SystemTime>,
    /// sessionId → (sessionKey, label)
    by_session_id: HashMap<String, IndexEntry>,
}

/// Parse a `sessions.json` document: `{ [sessionKey]: { sessionId, label? } }`,
/// tolerating an extra `sessions` wrapper object from older runtimes.
fn parse_sessions_index(raw: &str) -> HashMap<String, IndexEntry> {
    let Ok(doc) = serde_json::from_str::<Value>(raw) else {
        return HashMap::new();
    };
    let map = match doc.get("sessions").and_then(Value::as_object) {
        Some(inner) => inner,
        None => match doc.as_object() {
            Some(obj) => obj,
            None => return HashMap::new(),
        },
    };

    let mut out = HashMap::new();
    for (session_key, entry) in map {
        let Some(obj) = entry.as_object() else {
            continue;
        };
        let Some(session_id) = obj
            .get("sessionId")
            .or_else(|| obj.get("session_id"))
            .and_then(Value::as_str)
        else {
            continue;
        };
        out.insert(
            session_id.to_owned(),
            IndexEntry {
                session_key: session_key.clone(),
                label: obj.get("label").and_then(Value::as_str).map(str::to_owned),
            },
        );
    }
    out
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Resolver
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct BindingResolver {
    agents_dir: PathBuf,
    label_map: LabelMapStore,
    /// When set, hash mappings discovered by transcript scan are written
    /// back to the label map.
    fix_mode: bool,
    cache: Mutex<HashMap<String, AgentIndex>>,
}

impl BindingResolver {
    pub fn new(agents_dir: PathBuf, label_map_path: &Path, fix_mode: bool) -> Self {
        Self {
            agents_dir,
            label_map: LabelMapStore::load(label_map_path),
            fix_mode,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Resolve the binding for an `(agentId, sessionId)` pair.  `None` means
    /// the session is unbound and its lines are skipped (cursors still
    /// advance upstream).
    pub fn resolve(
        &self,
        agent_id: &str,
        session_id: &str,
        transcript_path: Option<&Path>,
    ) -> Option<SessionBinding> {
        let entry = self.index_lookup(agent_id, session_id)?;
        let label = entry.label?;

        match parse_sk_routing_label(&label)? {
            RoutingLabel::Direct {
                entity_type,
                entity_external_id,
            } => Some(SessionBinding {
                session_key: entry.session_key,
                label: label.trim().to_owned(),
                entity_type,
                entity_external_id,
            }),
            RoutingLabel::TaskHash { label, hash } => {
                let external_id = self.resolve_hash(&label, &hash, transcript_path)?;
                Some(SessionBinding {
                    session_key: entry.session_key,
                    label,
                    entity_type: sk_domain::records::EntityType::Task,
                    entity_external_id: external_id,
                })
            }
        }
    }

    fn resolve_hash(
        &self,
        label: &str,
        hash: &str,
        transcript_path: Option<&Path>,
    ) -> Option<String> {
        if let Some(entry) = self.label_map.lookup_hash(hash) {
            return Some(entry.external_id);
        }

        let path = transcript_path?;
        let external_id = scan_transcript_for_hash(path, hash)?;

        TraceEvent::LabelMapDiscovered {
            hash: hash.to_owned(),
            external_id: external_id.clone(),
        }
        .emit();

        if self.fix_mode {
            if let Err(e) = self.label_map.append_dedup(LabelMapEntry {
                external_id: external_id.clone(),
                label: label.to_owned(),
                hash: hash.to_owned(),
            }) {
                tracing::warn!(error = %e, hash, "failed to persist label-map entry");
            }
        }
        Some(external_id)
    }

    fn index_lookup(&self, agent_id: &str, session_id: &str) -> Option<IndexEntry> {
        let path = self
            .agents_dir
            .join(agent_id)
            .join("sessions")
            .join("sessions.json");
        let mtime = std::fs::metadata(&path).and_then(|m| m.modified()).ok();

        let mut cache = self.cache.lock();
        let index = cache.entry(agent_id.to_owned()).or_default();

        if index.mtime != mtime || mtime.is_none() {
            let by_session_id = std::fs::read_to_string(&path)
                .map(|raw| parse_sessions_index(&raw))
                .unwrap_or_default();
            TraceEvent::BindingsReloaded {
                agent_id: agent_id.to_owned(),
                sessions: by_session_id.len(),
            }
            .emit();
            *index = AgentIndex {
                mtime,
                by_session_id,
            };
        }

        index.by_session_id.get(session_id).cloned()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Hashed-label transcript scan
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn candidate_regexes() -> &'static [Regex; 2] {
    static RE: OnceLock<[Regex; 2]> = OnceLock::new();
    RE.get_or_init(|| {
        [
            Regex::new(r"\bexternalId\b\s*[:=]?\s*(\S+)").expect("static pattern"),
            Regex::new(r"\btask:\S+").expect("static pattern"),
        ]
    })
}

/// Scan up to [`HASH_SCAN_MAX_LINES`] lines of a transcript for an external
/// ID whose `sha256[0:16]` equals `hash`.
pub fn scan_transcript_for_hash(path: &Path, hash: &str) -> Option<String> {
    let file = File::open(path).ok()?;
    let reader = BufReader::new(file);
    let [id_re, task_re] = candidate_regexes();

    for line in reader.lines().take(HASH_SCAN_MAX_LINES) {
        let Ok(line) = line else { break };

        for cap in id_re.captures_iter(&line) {
            if let Some(candidate) = cap.get(1).map(|m| clean_candidate(m.as_str())) {
                if !candidate.is_empty() && &sha256_hex(&candidate)[..16] == hash {
                    return Some(candidate);
                }
            }
        }
        for m in task_re.find_iter(&line) {
            let candidate = clean_candidate(m.as_str());
            if !candidate.is_empty() && &sha256_hex(&candidate)[..16] == hash {
                return Some(candidate);
            }
        }
    }
    None
}

/// Strip the JSON punctuation a `\S+` match drags along.
fn clean_candidate(raw: &str) -> String {
    raw.trim_matches(|c: char| matches!(c, '"' | '\'' | ',' | '}' | ']' | ')' | ';'))
        .to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use sk_domain::records::EntityType;
    use std::io::Write;

    fn write_sessions_json(dir: &Path, agent: &str, body: &str) -> PathBuf {
        let sessions = dir.join("agents").join(agent).join("sessions");
        std::fs::create_dir_all(&sessions).unwrap();
        let path = sessions.join("sessions.json");
        std::fs::write(&path, body).unwrap();
        path
    }

    fn resolver(dir: &Path, fix: bool) -> BindingResolver {
        BindingResolver::new(
            dir.join("agents"),
            &dir.join("label-map.json"),
            fix,
        )
    }

    #[test]
    fn direct_label_resolves() {
        let dir = tempfile::tempdir().unwrap();
        write_sessions_json(
            dir.path(),
            "work",
            r#"{"agent:work:main":{"sessionId":"s1","label":"SK:TASK:task:a:w:t"}}"#,
        );

        let binding = resolver(dir.path(), false)
            .resolve("work", "s1", None)
            .unwrap();
        assert_eq!(binding.session_key, "agent:work:main");
        assert_eq!(binding.entity_type, EntityType::Task);
        assert_eq!(binding.entity_external_id, "task:a:w:t");
    }

    #[test]
    fn unlabelled_session_unbound() {
        let dir = tempfile::tempdir().unwrap();
        write_sessions_json(
            dir.path(),
            "work",
            r#"{"agent:work:main":{"sessionId":"s1"}}"#,
        );
        assert!(resolver(dir.path(), false).resolve("work", "s1", None).is_none());
    }

    #[test]
    fn non_routing_label_unbound() {
        let dir = tempfile::tempdir().unwrap();
        write_sessions_json(
            dir.path(),
            "work",
            r#"{"agent:work:main":{"sessionId":"s1","label":"chat with bob"}}"#,
        );
        assert!(resolver(dir.path(), false).resolve("work", "s1", None).is_none());
    }

    #[test]
    fn wrapper_object_tolerated() {
        let dir = tempfile::tempdir().unwrap();
        write_sessions_json(
            dir.path(),
            "work",
            r#"{"sessions":{"agent:work:main":{"sessionId":"s1","label":"SK:PROJECT:project:p"}}}"#,
        );
        let binding = resolver(dir.path(), false)
            .resolve("work", "s1", None)
            .unwrap();
        assert_eq!(binding.entity_type, EntityType::Project);
    }

    #[test]
    fn index_reloads_on_mtime_change() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_sessions_json(
            dir.path(),
            "work",
            r#"{"agent:work:main":{"sessionId":"s1","label":"SK:PROJECT:project:p"}}"#,
        );
        let r = resolver(dir.path(), false);
        assert!(r.resolve("work", "s1", None).is_some());
        assert!(r.resolve("work", "s2", None).is_none());

        // Rewrite with a new session and bump mtime past fs granularity.
        std::fs::write(
            &path,
            r#"{"agent:work:other":{"sessionId":"s2","label":"SK:PROJECT:project:q"}}"#,
        )
        .unwrap();
        let later = std::time::SystemTime::now() + std::time::Duration::from_secs(2);
        let file = std::fs::OpenOptions::new().write(true).open(&path).unwrap();
        file.set_modified(later).unwrap();

        let binding = r.resolve("work", "s2", None).unwrap();
        assert_eq!(binding.entity_external_id, "project:q");
    }

    #[test]
    fn hash_scan_finds_external_id() {
        let dir = tempfile::tempdir().unwrap();
        let external_id = "task:alpha:w1:t1";
        let hash = &sha256_hex(external_id)[..16];

        let transcript = dir.path().join("s1.jsonl");
        let mut f = std::fs::File::create(&transcript).unwrap();
        writeln!(f, r#"{{"type":"message","message":{{"role":"user","content":"work on externalId: {external_id} please"}}}}"#).unwrap();

        let found = scan_transcript_for_hash(&transcript, hash).unwrap();
        assert_eq!(found, external_id);
    }

    #[test]
    fn hash_scan_bare_task_pattern() {
        let dir = tempfile::tempdir().unwrap();
        let external_id = "task:alpha:w1:t2";
        let hash = &sha256_hex(external_id)[..16];

        let transcript = dir.path().join("s1.jsonl");
        std::fs::write(&transcript, format!("please pick up {external_id}, thanks\n")).unwrap();

        assert_eq!(
            scan_transcript_for_hash(&transcript, hash).as_deref(),
            Some(external_id)
        );
    }

    #[test]
    fn hash_scan_respects_line_bound() {
        let dir = tempfile::tempdir().unwrap();
        let external_id = "task:alpha:w1:t3";
        let hash = &sha256_hex(external_id)[..16];

        let transcript = dir.path().join("s1.jsonl");
        let mut body = "filler line\n".repeat(HASH_SCAN_MAX_LINES);
        body.push_str(&format!("externalId: {external_id}\n"));
        std::fs::write(&transcript, body).unwrap();

        assert!(scan_transcript_for_hash(&transcript, hash).is_none());
    }

    #[test]
    fn taskh_binding_resolved_and_persisted_in_fix_mode() {
        let dir = tempfile::tempdir().unwrap();
        let external_id = "task:alpha:w1:t4";
        let label = make_sk_task_hash_label(external_id);
        let hash = label.strip_prefix("SK:TASKH:").unwrap();

        write_sessions_json(
            dir.path(),
            "work",
            &format!(r#"{{"agent:work:t4":{{"sessionId":"s4","label":"{label}"}}}}"#),
        );
        let transcript = dir
            .path()
            .join("agents")
            .join("work")
            .join("sessions")
            .join("s4.jsonl");
        std::fs::write(&transcript, format!("externalId={external_id}\n")).unwrap();

        let r = resolver(dir.path(), true);
        let binding = r.resolve("work", "s4", Some(transcript.as_path())).unwrap();
        assert_eq!(binding.entity_external_id, external_id);
        assert_eq!(binding.entity_type, EntityType::Task);

        // Mapping persisted: a fresh resolver answers without the transcript.
        let r2 = resolver(dir.path(), false);
        let binding2 = r2.resolve("work", "s4", None).unwrap();
        assert_eq!(binding2.entity_external_id, external_id);
        let _ = hash;
    }

    #[test]
    fn taskh_miss_without_transcript_is_unbound() {
        let dir = tempfile::tempdir().unwrap();
        let label = make_sk_task_hash_label("task:a:w:missing");
        write_sessions_json(
            dir.path(),
            "work",
            &format!(r#"{{"agent:work:x":{{"sessionId":"s9","label":"{label}"}}}}"#),
        );
        assert!(resolver(dir.path(), false).resolve("work", "s9", None).is_none());
    }
}
