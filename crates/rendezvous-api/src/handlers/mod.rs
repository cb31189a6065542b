//! HTTP monitoring handlers: exposes registry state as JSON.

pub mod status;

use std::time::Instant;

use rendezvous_services::ConnectionManager;

#[derive(Clone)]
pub struct ApiState {
    pub manager: ConnectionManager,
    /// Process start, for uptime reporting.
    pub started_at: Instant,
}

impl ApiState {
    pub fn new(manager: ConnectionManager) -> Self {
        Self {
            manager,
            started_at: Instant::now(),
        }
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}

pub use status::{handle_health, handle_peers, handle_status};
