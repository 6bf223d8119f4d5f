//! Loader configuration
//!
//! Plain, programmatically-constructed config; loading it from a file or
//! environment is out of scope for the core (spec.md §1 Non-goals).

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Numeric knobs named in spec.md §4 and §5.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// C1: fetch retry attempts before giving up (404 is never retried).
    pub fetch_retry_attempts: u32,
    /// C1: exponential backoff base delay.
    pub fetch_backoff_base_secs: u64,
    /// C1: exponential backoff cap.
    pub fetch_backoff_cap_secs: u64,
    /// C1/§5: per-request fetch timeout.
    pub fetch_timeout_secs: u64,

    /// §5: bounded concurrency for fetching artifacts of the same version.
    pub fetch_concurrency: usize,

    /// §5: per-artifact wall-clock cap.
    pub artifact_timeout_secs: u64,
    /// §5: per-visit wall-clock cap.
    pub visit_timeout_secs: u64,

    /// C4: staging batch size for Content objects.
    pub content_batch_size: usize,
    /// C4: staging batch size for Directory objects.
    pub directory_batch_size: usize,
    /// C4: staging batch size for Release objects.
    pub release_batch_size: usize,

    /// C4/C6: maximum flush retries before the visit is marked failed.
    pub flush_retry_attempts: u32,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            fetch_retry_attempts: 3,
            fetch_backoff_base_secs: 10,
            fetch_backoff_cap_secs: 120,
            fetch_timeout_secs: 120,
            fetch_concurrency: 4,
            artifact_timeout_secs: 3600,
            visit_timeout_secs: 6 * 3600,
            content_batch_size: 1000,
            directory_batch_size: 2500,
            release_batch_size: 1000,
            flush_retry_attempts: 3,
        }
    }
}

impl LoaderConfig {
    #[must_use]
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    #[must_use]
    pub fn artifact_timeout(&self) -> Duration {
        Duration::from_secs(self.artifact_timeout_secs)
    }

    #[must_use]
    pub fn visit_timeout(&self) -> Duration {
        Duration::from_secs(self.visit_timeout_secs)
    }

    #[must_use]
    pub fn backoff_base(&self) -> Duration {
        Duration::from_secs(self.fetch_backoff_base_secs)
    }

    #[must_use]
    pub fn backoff_cap(&self) -> Duration {
        Duration::from_secs(self.fetch_backoff_cap_secs)
    }
}
