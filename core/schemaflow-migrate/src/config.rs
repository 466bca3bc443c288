//! Migration configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tuning for the migration worker pool.
///
/// Every field has a default, so a JSON config may override any subset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MigrationConfig {
    /// Parallel instance workers.
    pub workers: usize,
    /// Instance ids read per page when enumerating a version's instances.
    pub page_size: usize,
    /// Capacity of the queue between enumeration and the workers.
    pub queue_capacity: usize,
    /// Attempts per instance transaction before it is reported failed.
    pub max_attempts: u32,
    /// Base delay between attempts; attempt `n` waits `n * retry_backoff_ms`.
    pub retry_backoff_ms: u64,
    /// Overall deadline for a migration run (ms). `None` waits indefinitely.
    pub timeout_ms: Option<u64>,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            page_size: 100,
            queue_capacity: 256,
            max_attempts: 3,
            retry_backoff_ms: 25,
            timeout_ms: None,
        }
    }
}

impl MigrationConfig {
    /// Parses a config from JSON, filling missing fields with defaults.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    pub(crate) fn worker_count(&self) -> usize {
        self.workers.max(1)
    }

    pub(crate) fn page_limit(&self) -> usize {
        self.page_size.max(1)
    }

    pub(crate) fn queue_bound(&self) -> usize {
        self.queue_capacity.max(1)
    }

    pub(crate) fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    pub(crate) fn backoff(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.retry_backoff_ms.saturating_mul(u64::from(attempt)))
    }

    pub(crate) fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}
