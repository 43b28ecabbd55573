//! Per-lane minimum-interval gate.
//!
//! The search lane must not hit its upstream more often than the configured
//! gap (`BRAVE_SEARCH_MIN_INTERVAL_MS`).  Callers await `pace()` before each
//! request; the gate sleeps out whatever remains of the gap.

use std::time::{Duration, Instant};

use parking_lot::Mutex;

pub struct LaneGate {
    min_interval: Duration,
    last: Mutex<Option<Instant>>,
}

impl LaneGate {
    pub fn new(min_interval_ms: u64) -> Self {
        Self {
            min_interval: Duration::from_millis(min_interval_ms),
            last: Mutex::new(None),
        }
    }

    /// Wait until the lane is clear, then claim the slot.
    pub async fn pace(&self) {
        if self.min_interval.is_zero() {
            return;
        }
        loop {
            let wait = {
                let mut last = self.last.lock();
                let now = Instant::now();
                match *last {
                    Some(prev) if now.duration_since(prev) < self.min_interval => {
                        Some(self.min_interval - now.duration_since(prev))
                    }
                    _ => {
                        *last = Some(now);
                        None
                    }
                }
            };
            match wait {
                Some(d) => tokio::time::sleep(d).await,
                None => return,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn zero_interval_never_waits() {
        let gate = LaneGate::new(0);
        let start = Instant::now();
        gate.pace().await;
        gate.pace().await;
        assert!(start.elapsed() < Duration::from_millis(20));
    }

    #[tokio::test]
    async fn enforces_gap_between_claims() {
        let gate = LaneGate::new(50);
        let start = Instant::now();
        gate.pace().await;
        gate.pace().await;
        assert!(start.elapsed() >= Duration::from_millis(50));
    }
}
