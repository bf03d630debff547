use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use dp1_queue::{ConsumerConfig, DEFAULT_MAX_ATTEMPTS};
use dp1_store::MAX_PAGE_SIZE;
use serde::{Deserialize, Serialize};

use crate::error::{ServerError, ServerResult};

/// Environment variable that overrides `api_key`.
pub const API_KEY_VAR: &str = "API_KEY";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    /// Bearer key required on write routes. Writes are open when unset.
    pub api_key: Option<String>,
    pub max_page_size: usize,
    pub queue: QueueConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8787)),
            api_key: None,
            max_page_size: MAX_PAGE_SIZE,
            queue: QueueConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn from_toml_str(s: &str) -> ServerResult<Self> {
        toml::from_str(s).map_err(|e| ServerError::Config(e.to_string()))
    }

    pub fn load(path: &Path) -> ServerResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Apply `API_KEY` from the environment, if set.
    pub fn with_env_overrides(self) -> Self {
        self.with_api_key(std::env::var(API_KEY_VAR).ok())
    }

    /// Replace `api_key` when `key` is a non-blank value.
    pub fn with_api_key(mut self, key: Option<String>) -> Self {
        if let Some(key) = key.filter(|k| !k.trim().is_empty()) {
            self.api_key = Some(key);
        }
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub name: String,
    pub batch_size: usize,
    pub max_attempts: u32,
    pub poll_interval_ms: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            name: "dp1-write-operations".into(),
            batch_size: 10,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            poll_interval_ms: 100,
        }
    }
}

impl QueueConfig {
    pub fn consumer_config(&self) -> ConsumerConfig {
        ConsumerConfig {
            batch_size: self.batch_size.max(1),
            poll_interval: Duration::from_millis(self.poll_interval_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let c = ServerConfig::default();
        assert_eq!(c.bind_addr, "127.0.0.1:8787".parse::<SocketAddr>().unwrap());
        assert_eq!(c.max_page_size, 100);
        assert!(c.api_key.is_none());
        assert_eq!(c.queue.batch_size, 10);
        assert_eq!(c.queue.max_attempts, 5);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let c = ServerConfig::from_toml_str(
            r#"
            bind_addr = "0.0.0.0:9000"

            [queue]
            batch_size = 25
            "#,
        )
        .unwrap();
        assert_eq!(c.bind_addr.port(), 9000);
        assert_eq!(c.queue.batch_size, 25);
        assert_eq!(c.queue.poll_interval_ms, 100);
        assert_eq!(c.max_page_size, 100);
    }

    #[test]
    fn malformed_toml_is_a_config_error() {
        let err = ServerConfig::from_toml_str("bind_addr = 12").unwrap_err();
        assert!(matches!(err, ServerError::Config(_)));
    }

    #[test]
    fn api_key_override() {
        let c = ServerConfig::default().with_api_key(Some("secret".into()));
        assert_eq!(c.api_key.as_deref(), Some("secret"));
        let c = c.with_api_key(Some("  ".into()));
        assert_eq!(c.api_key.as_deref(), Some("secret"));
    }

    #[test]
    fn consumer_config_from_queue_config() {
        let q = QueueConfig {
            batch_size: 0,
            poll_interval_ms: 250,
            ..QueueConfig::default()
        };
        let c = q.consumer_config();
        assert_eq!(c.batch_size, 1);
        assert_eq!(c.poll_interval, Duration::from_millis(250));
    }
}
