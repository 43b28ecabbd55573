//! Transcript-path parsing.
//!
//! Transcripts live at
//! `…/agents/<agentId>/sessions/<sessionId>[-topic-<urlEncodedTopic>].jsonl`.
//! The session ID is mandatory; the agent ID is only present when the path
//! matches that canonical shape.

use std::path::Path;

use sk_domain::records::SessionFileContext;

/// Derive the session identity from a transcript path.  Returns `None` when
/// the file name does not yield a non-empty session ID.
pub fn parse_session_file_context(path: &Path) -> Option<SessionFileContext> {
    let file_name = path.file_name()?.to_str()?;
    let stem = file_name.strip_suffix(".jsonl")?;

    let (session_id, topic_id) = match stem.split_once("-topic-") {
        Some((sid, enc)) => {
            let topic = urlencoding::decode(enc).ok().map(|t| t.into_owned());
            (sid, topic)
        }
        None => (stem, None),
    };
    if session_id.is_empty() {
        return None;
    }

    // agentId is only trusted when the parent chain is `agents/<id>/sessions`.
    let agent_id = path
        .parent()
        .filter(|dir| dir.file_name().is_some_and(|n| n == "sessions"))
        .and_then(|dir| dir.parent())
        .filter(|dir| {
            dir.parent()
                .and_then(|p| p.file_name())
                .is_some_and(|n| n == "agents")
        })
        .and_then(|dir| dir.file_name())
        .and_then(|n| n.to_str())
        .map(str::to_owned);

    Some(SessionFileContext {
        agent_id,
        session_id: session_id.to_owned(),
        topic_id,
    })
}
