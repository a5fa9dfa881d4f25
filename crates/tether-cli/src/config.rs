//! `tether.toml` loading.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use tether_agent::DriverConfig;
use tether_coord::CoordinationConfig;
use tether_lifecycle::LifecycleConfig;
use tracing::warn;

#[derive(Debug, Deserialize)]
pub struct TetherConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub security: SecurityConfig,
    #[serde(default)]
    pub coordination: CoordinationConfig,
    #[serde(default)]
    pub lifecycle: LifecycleConfig,
    #[serde(default)]
    pub driver: DriverConfig,
    #[serde(default)]
    pub engine: EngineConfig,
}

impl Default for TetherConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            server: ServerConfig::default(),
            security: SecurityConfig::default(),
            coordination: CoordinationConfig::default(),
            lifecycle: LifecycleConfig::default(),
            driver: DriverConfig::default(),
            engine: EngineConfig::default(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct SecurityConfig {
    #[serde(default)]
    pub api_keys: Vec<String>,
}

/// Settings of the built-in echo engine used by `serve`.
#[derive(Debug, Deserialize)]
pub struct EngineConfig {
    /// Delay before each streamed word.
    #[serde(default = "default_chunk_delay_ms")]
    pub chunk_delay_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            chunk_delay_ms: default_chunk_delay_ms(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    3000
}
fn default_chunk_delay_ms() -> u64 {
    50
}

impl TetherConfig {
    /// Reads `path`, or returns defaults when it does not exist.
    pub async fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = match tokio::fs::read_to_string(path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(path = %path.display(), "Config file not found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(anyhow::anyhow!(
                    "Failed to read config file '{}': {}",
                    path.display(),
                    e
                ))
            }
        };
        Ok(toml::from_str(&raw)?)
    }

    /// Applies environment overrides (`REDIS_URL`).
    pub fn with_env(mut self, redis_url: Option<String>) -> Self {
        self.coordination.override_url(redis_url);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_file_gives_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let config = TetherConfig::load(&tmp.path().join("nope.toml")).await.unwrap();
        assert_eq!(config.server.port, 3000);
        assert!(config.coordination.url.is_none());
        assert_eq!(config.lifecycle.claim_ttl_secs, 15);
        assert_eq!(config.driver.max_steps, 100);
    }

    #[tokio::test]
    async fn test_partial_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("tether.toml");
        tokio::fs::write(
            &path,
            r#"
data_dir = "/var/lib/tether"

[server]
port = 8080

[coordination]
url = "redis://cache:6379"

[lifecycle]
heartbeat_interval_secs = 3

[security]
api_keys = ["k1"]
"#,
        )
        .await
        .unwrap();

        let config = TetherConfig::load(&path).await.unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/var/lib/tether"));
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.coordination.url.as_deref(), Some("redis://cache:6379"));
        assert_eq!(config.lifecycle.heartbeat_interval_secs, 3);
        assert_eq!(config.lifecycle.claim_ttl_secs, 15);
        assert_eq!(config.security.api_keys, vec!["k1"]);
        assert_eq!(config.engine.chunk_delay_ms, 50);
    }

    #[tokio::test]
    async fn test_malformed_file_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("tether.toml");
        tokio::fs::write(&path, "[server\nport = ").await.unwrap();
        assert!(TetherConfig::load(&path).await.is_err());
    }

    #[test]
    fn test_redis_url_env_override() {
        let config = TetherConfig::default().with_env(Some("redis://env:6379".into()));
        assert_eq!(config.coordination.url.as_deref(), Some("redis://env:6379"));

        let config = TetherConfig::default().with_env(Some("  ".into()));
        assert!(config.coordination.url.is_none());
    }
}
