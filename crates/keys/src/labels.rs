//! `SK:*` session routing labels.
//!
//! A session label routes transcripts to a Super-Kanban entity:
//!   `SK:PROJECT:<externalId>` / `SK:WORK_ITEM:<externalId>` / `SK:TASK:<externalId>`
//! or, when the external ID would not fit the label budget,
//!   `SK:TASKH:<sha256(externalId)[0:16]>`
//! which is resolved through the persistent label map.

use sk_domain::records::EntityType;

use crate::sha256_hex;

/// Session labels longer than this are rejected upstream or truncated via
/// [`truncate_session_label`].
pub const MAX_SESSION_LABEL_CHARS: usize = 64;

const TASK_HASH_PREFIX: &str = "SK:TASKH:";
const TASK_HASH_LEN: usize = 16;

/// A parsed routing label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoutingLabel {
    /// The label names its entity directly.
    Direct {
        entity_type: EntityType,
        entity_external_id: String,
    },
    /// The label carries only a 16-hex-digit hash of the task external ID.
    TaskHash { label: String, hash: String },
}

/// Derive the hashed task label for an external ID.
pub fn make_sk_task_hash_label(external_id: &str) -> String {
    let hash = &sha256_hex(external_id)[..TASK_HASH_LEN];
    format!("{TASK_HASH_PREFIX}{hash}")
}

/// Parse a session label into its routing form.  Returns `None` for labels
/// that are not `SK:*` routing labels (those sessions are simply not bound).
pub fn parse_sk_routing_label(label: &str) -> Option<RoutingLabel> {
    let label = label.trim();

    if let Some(hash) = label.strip_prefix(TASK_HASH_PREFIX) {
        if hash.len() == TASK_HASH_LEN && hash.chars().all(|c| c.is_ascii_hexdigit()) {
            return Some(RoutingLabel::TaskHash {
                label: label.to_owned(),
                hash: hash.to_ascii_lowercase(),
            });
        }
        return None;
    }

    let rest = label.strip_prefix("SK:")?;
    let (tag, external_id) = rest.split_once(':')?;
    if external_id.is_empty() {
        return None;
    }
    let entity_type = match tag {
        "PROJECT" => EntityType::Project,
        "WORK_ITEM" => EntityType::WorkItem,
        "TASK" => EntityType::Task,
        _ => return None,
    };
    Some(RoutingLabel::Direct {
        entity_type,
        entity_external_id: external_id.to_owned(),
    })
}

/// Deterministically shorten a label to `max` characters as
/// `<head>~<sha256(label)[0:10]>`.  Labels already within budget pass
/// through unchanged.
pub fn truncate_session_label(label: &str, max: usize) -> String {
    let label = label.trim();
    if label.chars().count() <= max {
        return label.to_owned();
    }

    let suffix = format!("~{}", &sha256_hex(label)[..10]);
    let head_len = max.saturating_sub(suffix.chars().count());
    let head: String = label.chars().take(head_len).collect();
    format!("{head}{suffix}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_hash_label_shape() {
        let label = make_sk_task_hash_label("task:alpha:w1:t1");
        assert!(label.starts_with("SK:TASKH:"));
        assert_eq!(label.len(), "SK:TASKH:".len() + 16);
    }

    #[test]
    fn task_hash_label_matches_sha256_prefix() {
        let external_id = "task:alpha:w1:t1";
        let label = make_sk_task_hash_label(external_id);
        let hash = label.strip_prefix("SK:TASKH:").unwrap();
        assert_eq!(hash, &sha256_hex(external_id)[..16]);
    }

    #[test]
    fn parse_direct_labels() {
        assert_eq!(
            parse_sk_routing_label("SK:PROJECT:project:alpha"),
            Some(RoutingLabel::Direct {
                entity_type: EntityType::Project,
                entity_external_id: "project:alpha".into(),
            })
        );
        assert_eq!(
            parse_sk_routing_label(" SK:WORK_ITEM:workitem:alpha:w1 "),
            Some(RoutingLabel::Direct {
                entity_type: EntityType::WorkItem,
                entity_external_id: "workitem:alpha:w1".into(),
            })
        );
    }

    #[test]
    fn parse_task_hash_label() {
        let label = make_sk_task_hash_label("task:alpha:w1:t1");
        match parse_sk_routing_label(&label) {
            Some(RoutingLabel::TaskHash { hash, .. }) => assert_eq!(hash.len(), 16),
            other => panic!("unexpected parse: {other:?}"),
        }
    }

    #[test]
    fn parse_rejects_non_routing_labels() {
        assert_eq!(parse_sk_routing_label("my chat about cats"), None);
        assert_eq!(parse_sk_routing_label("SK:TASKH:nothex"), None);
        assert_eq!(parse_sk_routing_label("SK:EPIC:whatever"), None);
        assert_eq!(parse_sk_routing_label("SK:TASK:"), None);
    }

    #[test]
    fn truncate_within_budget_is_identity() {
        assert_eq!(truncate_session_label("short", 64), "short");
    }

    #[test]
    fn truncate_is_deterministic_and_sized() {
        let long = "x".repeat(200);
        let a = truncate_session_label(&long, 64);
        let b = truncate_session_label(&long, 64);
        assert_eq!(a, b);
        assert_eq!(a.chars().count(), 64);
        assert!(a.contains('~'));
    }

    #[test]
    fn truncate_distinguishes_different_tails() {
        let a = truncate_session_label(&format!("{}A", "x".repeat(200)), 64);
        let b = truncate_session_label(&format!("{}B", "x".repeat(200)), 64);
        assert_ne!(a, b);
    }
}
