//! Host update loop configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Settings for the `host-update` thread, read from the `[host]` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct HostConfig {
    /// Update rate of the host clock in Hz.
    pub tick_rate_hz: u32,

    /// Elevation of structure floors.
    pub floor_y: i32,

    /// Queued tasks handled per tick; the rest wait for the next one.
    pub max_tasks_per_tick: usize,

    /// Block writes applied per tick across all pending structures.
    pub max_writes_per_tick: usize,

    /// Capacity of the task queue. Senders wait when it is full.
    pub queue_capacity: usize,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            tick_rate_hz: 20,
            floor_y: 100,
            max_tasks_per_tick: 256,
            max_writes_per_tick: 4096,
            queue_capacity: 1024,
        }
    }
}

impl HostConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.tick_rate_hz.max(1) as f64)
    }
}
