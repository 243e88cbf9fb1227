//! Health check payload.

use std::time::Instant;

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub uptime_secs: u64,
    /// Registered observers.
    pub connections: usize,
    /// Drivers with a known location.
    pub tracked_drivers: usize,
}

pub fn health_check(start_time: Instant, connections: usize, tracked_drivers: usize) -> HealthResponse {
    HealthResponse {
        status: "ok".into(),
        uptime_secs: start_time.elapsed().as_secs(),
        connections,
        tracked_drivers,
    }
}
