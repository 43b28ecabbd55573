//! Wake-parent-on-end tracking.
//!
//! Keyed by `runId`; a single wake per run, no matter how many lifecycle
//! hooks observe the same end.  The entry is removed *before* the RPC is
//! attempted so a concurrent second hook can never fire a duplicate, and it
//! stays removed whether or not the wake succeeds.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use uuid::Uuid;

use sk_domain::records::SessionState;
use sk_domain::trace::TraceEvent;

use crate::traits::{GatewayRpc, WakeDeliver, WakeRequest};

pub const WAKE_LANE: &str = "sk-sync-wake";

#[derive(Debug, Clone)]
pub struct WakeEntry {
    pub parent_session_key: String,
    pub child_session_key: String,
    pub wake_parent_on_end: bool,
}

pub struct WakeTracker {
    rpc: Arc<dyn GatewayRpc>,
    deliver: WakeDeliver,
    entries: Mutex<HashMap<String, WakeEntry>>,
}

impl WakeTracker {
    pub fn new(rpc: Arc<dyn GatewayRpc>, deliver_to_channel: bool) -> Self {
        let deliver = if deliver_to_channel {
            WakeDeliver::last_channel()
        } else {
            WakeDeliver::disabled()
        };
        Self {
            rpc,
            deliver,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn register(&self, run_id: &str, entry: WakeEntry) {
        self.entries.lock().insert(run_id.to_owned(), entry);
    }

    pub fn tracked_runs(&self) -> usize {
        self.entries.lock().len()
    }

    /// Fire the wake for a run, at most once.  Every wake carries a fresh
    /// idempotency key; the at-most-once property comes from removing the
    /// entry up front.
    pub async fn fire(&self, run_id: &str, state: SessionState, outcome: Option<&str>) {
        let Some(entry) = self.entries.lock().remove(run_id) else {
            return;
        };
        if !entry.wake_parent_on_end {
            return;
        }

        let state_str = serde_json::to_value(state)
            .ok()
            .and_then(|v| v.as_str().map(str::to_owned))
            .unwrap_or_else(|| "FAILED".into());
        let message = format!(
            "SK-sync: child session ended status={} outcome={} child={} run={}",
            state_str,
            outcome.unwrap_or("unknown"),
            entry.child_session_key,
            run_id,
        );

        let req = WakeRequest {
            session_key: entry.parent_session_key.clone(),
            message,
            deliver: self.deliver.clone(),
            lane: WAKE_LANE.into(),
            idempotency_key: Uuid::new_v4().to_string(),
        };

        TraceEvent::WakeIssued {
            run_id: run_id.to_owned(),
            parent_session_key: entry.parent_session_key.clone(),
        }
        .emit();

        if let Err(e) = self.rpc.agent_wake(&req).await {
            // The entry is already gone: a failed wake is not retried.
            tracing::warn!(run_id, error = %e, "parent wake failed");
        }
    }
}
