//! Deterministic key and label derivation.
//!
//! Everything the pipeline posts to Super-Kanban is keyed here: canonical
//! external IDs, `SK:*` routing labels, hashed task labels, and the
//! message/tool-call keys that make replays idempotent.  All derivations are
//! pure functions of their inputs.

mod external_id;
mod labels;
mod message_key;
mod session_path;

pub use external_id::{
    canonicalize_project_external_id, canonicalize_task_external_id,
    canonicalize_work_item_external_id, leaf_key,
};
pub use labels::{
    make_sk_task_hash_label, parse_sk_routing_label, truncate_session_label, RoutingLabel,
    MAX_SESSION_LABEL_CHARS,
};
pub use message_key::{build_sk_message_key, build_sk_tool_call_key};
pub use session_path::parse_session_file_context;

use sha2::{Digest, Sha256};

/// Lowercase hex SHA-256 of a string.
pub fn sha256_hex(input: &str) -> String {
    hex::encode(Sha256::digest(input.as_bytes()))
}

/// Lowercase hex SHA-1 of a string.
pub fn sha1_hex(input: &str) -> String {
    use sha1::Sha1;
    hex::encode(Sha1::digest(input.as_bytes()))
}
