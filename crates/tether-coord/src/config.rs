//! Coordination store configuration.

use serde::{Deserialize, Serialize};

/// Connection settings for the coordination store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CoordinationConfig {
    /// Store endpoint, e.g. `redis://127.0.0.1:6379`. When absent the
    /// subsystem runs in single-process mode on an in-memory store.
    #[serde(default)]
    pub url: Option<String>,
}

impl CoordinationConfig {
    /// Builds a config pointing at `url`.
    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
        }
    }

    /// Applies an out-of-band override (the `REDIS_URL` environment variable).
    pub fn override_url(&mut self, url: Option<String>) {
        if let Some(url) = url.filter(|u| !u.trim().is_empty()) {
            self.url = Some(url);
        }
    }
}
