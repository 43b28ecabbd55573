//! Readiness phases and the presence registry.
//!
//! Readiness is monotonic: `starting → listening → ready → error`.  Each
//! distinct phase is appended to the history exactly once, revisits are
//! no-ops, and transitions never move backwards.  Presence/health versions
//! are bumped before every broadcast so receivers can discard stale fan-out.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio::sync::broadcast;

use sk_domain::trace::TraceEvent;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Readiness
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadinessPhase {
    Starting,
    Listening,
    Ready,
    Error,
}

impl ReadinessPhase {
    fn order(self) -> u8 {
        match self {
            Self::Starting => 0,
            Self::Listening => 1,
            Self::Ready => 2,
            Self::Error => 3,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseEntry {
    pub phase: ReadinessPhase,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadinessSnapshot {
    pub phase: ReadinessPhase,
    pub since: DateTime<Utc>,
    pub phases: Vec<PhaseEntry>,
}

pub struct Readiness {
    inner: Mutex<ReadinessSnapshot>,
}

impl Readiness {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            inner: Mutex::new(ReadinessSnapshot {
                phase: ReadinessPhase::Starting,
                since: now,
                phases: vec![PhaseEntry {
                    phase: ReadinessPhase::Starting,
                    at: now,
                }],
            }),
        }
    }

    /// Advance to `phase`.  Returns whether a transition happened.
    pub fn transition(&self, phase: ReadinessPhase) -> bool {
        let mut inner = self.inner.lock();
        if phase.order() <= inner.phase.order() {
            return false;
        }
        let now = Utc::now();
        inner.phase = phase;
        inner.since = now;
        inner.phases.push(PhaseEntry { phase, at: now });
        true
    }

    pub fn snapshot(&self) -> ReadinessSnapshot {
        self.inner.lock().clone()
    }
}

impl Default for Readiness {
    fn default() -> Self {
        Self::new()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Presence registry
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionInfo {
    pub conn_id: String,
    pub role: Option<String>,
    pub connected_at: DateTime<Utc>,
}

/// One presence fan-out payload.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceUpdate {
    pub presence_version: u64,
    pub health_version: u64,
    pub connections: Vec<ConnectionInfo>,
}

pub struct PresenceRegistry {
    connections: RwLock<HashMap<String, ConnectionInfo>>,
    presence_version: AtomicU64,
    health_version: AtomicU64,
    events: broadcast::Sender<PresenceUpdate>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            connections: RwLock::new(HashMap::new()),
            presence_version: AtomicU64::new(0),
            health_version: AtomicU64::new(0),
            events,
        }
    }

    pub fn register(&self, conn_id: &str, role: Option<String>) {
        self.connections.write().insert(
            conn_id.to_owned(),
            ConnectionInfo {
                conn_id: conn_id.to_owned(),
                role,
                connected_at: Utc::now(),
            },
        );
        self.broadcast();
    }

    pub fn remove(&self, conn_id: &str) -> bool {
        let removed = self.connections.write().remove(conn_id).is_some();
        if removed {
            self.broadcast();
        }
        removed
    }

    pub fn set_role(&self, conn_id: &str, role: Option<String>) {
        if let Some(info) = self.connections.write().get_mut(conn_id) {
            info.role = role;
        }
        self.broadcast();
    }

    pub fn connection_count(&self) -> usize {
        self.connections.read().len()
    }

    pub fn presence_version(&self) -> u64 {
        self.presence_version.load(Ordering::SeqCst)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PresenceUpdate> {
        self.events.subscribe()
    }

    /// Bump versions, then fan out the fresh snapshot.
    fn broadcast(&self) {
        let presence_version = self.presence_version.fetch_add(1, Ordering::SeqCst) + 1;
        let health_version = self.health_version.fetch_add(1, Ordering::SeqCst) + 1;

        let mut connections: Vec<ConnectionInfo> =
            self.connections.read().values().cloned().collect();
        connections.sort_by(|a, b| a.conn_id.cmp(&b.conn_id));

        TraceEvent::PresenceBroadcast {
            presence_version,
            connections: connections.len(),
        }
        .emit();

        let _ = self.events.send(PresenceUpdate {
            presence_version,
            health_version,
            connections,
        });
    }
}

impl Default for PresenceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn readiness_is_monotonic() {
        let r = Readiness::new();
        assert!(r.transition(ReadinessPhase::Listening));
        assert!(r.transition(ReadinessPhase::Ready));
        // Revisit and backwards are no-ops.
        assert!(!r.transition(ReadinessPhase::Ready));
        assert!(!r.transition(ReadinessPhase::Listening));

        let snap = r.snapshot();
        assert_eq!(snap.phase, ReadinessPhase::Ready);
        let phases: Vec<ReadinessPhase> = snap.phases.iter().map(|p| p.phase).collect();
        assert_eq!(
            phases,
            vec![
                ReadinessPhase::Starting,
                ReadinessPhase::Listening,
                ReadinessPhase::Ready
            ]
        );
    }

    #[test]
    fn readiness_timestamps_non_decreasing() {
        let r = Readiness::new();
        r.transition(ReadinessPhase::Listening);
        r.transition(ReadinessPhase::Ready);
        r.transition(ReadinessPhase::Error);
        let snap = r.snapshot();
        for pair in snap.phases.windows(2) {
            assert!(pair[0].at <= pair[1].at);
        }
        // Each phase appears exactly once.
        let mut seen = std::collections::HashSet::new();
        for p in &snap.phases {
            assert!(seen.insert(p.phase.order()));
        }
    }

    #[test]
    fn error_reachable_from_anywhere_forward() {
        let r = Readiness::new();
        assert!(r.transition(ReadinessPhase::Error));
        assert!(!r.transition(ReadinessPhase::Ready), "no going back");
    }

    #[test]
    fn presence_versions_bump_before_fanout() {
        let reg = PresenceRegistry::new();
        let mut rx = reg.subscribe();

        reg.register("c1", None);
        let update = rx.try_recv().unwrap();
        assert_eq!(update.presence_version, 1);
        assert_eq!(update.connections.len(), 1);

        reg.register("c2", Some("node".into()));
        let update = rx.try_recv().unwrap();
        assert_eq!(update.presence_version, 2);
        assert_eq!(update.connections.len(), 2);

        assert!(reg.remove("c1"));
        let update = rx.try_recv().unwrap();
        assert_eq!(update.presence_version, 3);
        assert_eq!(update.connections.len(), 1);
    }

    #[test]
    fn removing_unknown_connection_is_silent() {
        let reg = PresenceRegistry::new();
        let mut rx = reg.subscribe();
        assert!(!reg.remove("ghost"));
        assert!(rx.try_recv().is_err(), "no broadcast for a no-op removal");
    }
}
