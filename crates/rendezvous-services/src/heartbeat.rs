//! Heartbeat monitor: periodic sweep that demotes stale peers.
//!
//! Runs independently of request handling. Each sweep is one registry
//! operation, so it cannot interleave with a heartbeat refreshing the same
//! record.

use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;

use rendezvous_core::protocol::{HEARTBEAT_INTERVAL, STALE_AFTER};
use rendezvous_core::time::{millis, now_millis};

use crate::registry::PeerRegistry;

pub struct HeartbeatMonitor {
    registry: PeerRegistry,
    interval: Duration,
    stale_after: Duration,
}

impl HeartbeatMonitor {
    pub fn new(registry: PeerRegistry, interval: Duration, stale_after: Duration) -> Self {
        Self {
            registry,
            interval,
            stale_after,
        }
    }

    /// Sweep every 30s, demoting peers silent for more than 60s.
    pub fn with_defaults(registry: PeerRegistry) -> Self {
        Self::new(registry, HEARTBEAT_INTERVAL, STALE_AFTER)
    }

    /// Run one sweep against the current wall clock.
    pub async fn sweep(&self) -> Vec<String> {
        self.sweep_at(now_millis()).await
    }

    /// Run one sweep as if the time were `now` (Unix millis).
    pub async fn sweep_at(&self, now: u64) -> Vec<String> {
        let expired = self
            .registry
            .expire_stale(now, millis(self.stale_after))
            .await;
        if !expired.is_empty() {
            tracing::info!(count = expired.len(), "heartbeat sweep demoted stale peers");
        }
        expired
    }

    /// Sweep on a fixed interval until shutdown is signalled.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!(
            interval_secs = self.interval.as_secs(),
            stale_after_secs = self.stale_after.as_secs(),
            "heartbeat monitor starting"
        );

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.sweep().await;
                }
                _ = shutdown.recv() => {
                    tracing::info!("heartbeat monitor stopping");
                    return;
                }
            }
        }
    }
}
