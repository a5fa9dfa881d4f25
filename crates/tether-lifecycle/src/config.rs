//! Lifecycle timing.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Timing of claims, heartbeats and stop polling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleConfig {
    /// Lifetime of the generation claim. A crashed owner's claim disappears
    /// after this long.
    #[serde(default = "default_claim_ttl_secs")]
    pub claim_ttl_secs: u64,
    /// Minimum time between claim refreshes while output is flowing.
    #[serde(default = "default_heartbeat_interval_secs")]
    pub heartbeat_interval_secs: u64,
    /// Delay between claim reads while waiting for a stop.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Claim reads before a wait gives up with `TimedOut`.
    #[serde(default = "default_poll_attempts")]
    pub poll_attempts: u32,
}

fn default_claim_ttl_secs() -> u64 {
    15
}

fn default_heartbeat_interval_secs() -> u64 {
    5
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_poll_attempts() -> u32 {
    60
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            claim_ttl_secs: default_claim_ttl_secs(),
            heartbeat_interval_secs: default_heartbeat_interval_secs(),
            poll_interval_ms: default_poll_interval_ms(),
            poll_attempts: default_poll_attempts(),
        }
    }
}

impl LifecycleConfig {
    /// Claim lifetime.
    pub fn claim_ttl(&self) -> Duration {
        Duration::from_secs(self.claim_ttl_secs)
    }

    /// Minimum gap between claim refreshes.
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    /// Gap between stop polls.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}
