//! Configuration for the queue module.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Admission and execution limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Maximum number of jobs waiting for a slot. Jobs being processed do
    /// not count.
    #[serde(default = "default_max_queue_length")]
    pub max_queue_length: usize,

    /// Maximum number of jobs processed at once.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Delay between a job finishing and the next dispatch, in milliseconds.
    #[serde(default = "default_pacing_delay")]
    pub pacing_delay_ms: u64,
}

fn default_max_queue_length() -> usize {
    3
}

fn default_max_concurrency() -> usize {
    1
}

fn default_pacing_delay() -> u64 {
    500
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_queue_length: default_max_queue_length(),
            max_concurrency: default_max_concurrency(),
            pacing_delay_ms: default_pacing_delay(),
        }
    }
}

impl QueueConfig {
    /// Sets the maximum queue length.
    pub fn with_max_queue_length(mut self, max: usize) -> Self {
        self.max_queue_length = max;
        self
    }

    /// Sets the maximum concurrency.
    pub fn with_max_concurrency(mut self, max: usize) -> Self {
        self.max_concurrency = max;
        self
    }

    /// Sets the pacing delay.
    pub fn with_pacing_delay(mut self, delay: Duration) -> Self {
        self.pacing_delay_ms = delay.as_millis() as u64;
        self
    }

    /// Returns the pacing delay as a `Duration`.
    pub fn pacing_delay(&self) -> Duration {
        Duration::from_millis(self.pacing_delay_ms)
    }
}
