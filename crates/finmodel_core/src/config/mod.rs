//! Engine and orchestrator configuration
//!
//! All settings are plain serde structs with defaults, so a partial YAML or
//! JSON document fills in the rest:
//!
//! ```yaml
//! orchestrator:
//!   workers: 4
//!   job_timeout_secs: 300
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

pub mod builder;

pub use builder::AssumptionsBuilder;

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

fn default_job_timeout_secs() -> u64 {
    15 * 60
}

fn default_watchdog_interval_ms() -> u64 {
    250
}

fn default_max_retries() -> u32 {
    1
}

fn default_max_trials() -> usize {
    100_000
}

fn default_max_horizon() -> u32 {
    600
}

/// Settings for the job orchestrator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Worker threads executing jobs
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Jobs running longer than this are failed with `Timeout`
    #[serde(default = "default_job_timeout_secs")]
    pub job_timeout_secs: u64,
    /// How often the watchdog scans running jobs and flushes progress
    #[serde(default = "default_watchdog_interval_ms")]
    pub watchdog_interval_ms: u64,
    /// Retries allowed for retryable failures (timeouts, store outages)
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Upper bound on Monte Carlo trials accepted at submission
    #[serde(default = "default_max_trials")]
    pub max_trials: usize,
    /// Upper bound on projection horizon accepted at submission
    #[serde(default = "default_max_horizon")]
    pub max_horizon: u32,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            job_timeout_secs: default_job_timeout_secs(),
            watchdog_interval_ms: default_watchdog_interval_ms(),
            max_retries: default_max_retries(),
            max_trials: default_max_trials(),
            max_horizon: default_max_horizon(),
        }
    }
}

impl OrchestratorConfig {
    #[must_use]
    pub fn job_timeout(&self) -> Duration {
        Duration::from_secs(self.job_timeout_secs)
    }

    #[must_use]
    pub fn watchdog_interval(&self) -> Duration {
        Duration::from_millis(self.watchdog_interval_ms.max(1))
    }
}
