//! Application configuration structures.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use taskline_core::{TasklineError, TelemetryConfig};
use url::Url;

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Application name and metadata.
    #[serde(default)]
    pub app: AppMetadata,

    /// Redis backend configuration.
    #[serde(default)]
    pub redis: RedisConfig,

    /// Worker loop configuration.
    #[serde(default)]
    pub worker: WorkerConfig,

    /// Logging configuration.
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// Application metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppMetadata {
    /// Application name.
    pub name: String,
    /// Application version.
    pub version: String,
    /// Environment (development, staging, production).
    pub environment: String,
}

impl Default for AppMetadata {
    fn default() -> Self {
        Self {
            name: "taskline".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            environment: "development".to_string(),
        }
    }
}

/// Redis backend configuration.
///
/// Either `url` or `host`/`port` locate the server; when `url` is set it wins,
/// and `password`/`database` still override what the URL carries.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    /// Full connection URL (`redis://[:password@]host:port[/db]`).
    pub url: Option<String>,
    /// Server host.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Password sent with AUTH.
    pub password: Option<String>,
    /// Database index selected after connecting.
    pub database: Option<i64>,
    /// Keep pooled connections open between operations.
    pub persistent: bool,
    /// Upper bound for connecting and for every round-trip, in seconds.
    pub timeout_secs: u64,
    /// Maximum pooled connections when `persistent` is set.
    pub pool_size: usize,
    /// Prefix for every key the engine touches.
    pub key_prefix: String,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: None,
            host: "127.0.0.1".to_string(),
            port: 6379,
            password: None,
            database: None,
            persistent: true,
            timeout_secs: 5,
            pool_size: 4,
            key_prefix: "taskline".to_string(),
        }
    }
}

impl RedisConfig {
    /// Creates a configuration pointing at the given URL.
    #[must_use]
    pub fn from_url(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Self::default()
        }
    }

    /// Returns the operation timeout as a Duration.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Builds the effective connection URL from `url` or `host`/`port`,
    /// applying `password` and `database` on top.
    pub fn connection_url(&self) -> Result<Url, TasklineError> {
        let parse = |raw: &str| {
            Url::parse(raw)
                .map_err(|e| TasklineError::configuration(format!("Invalid Redis URL '{}': {}", raw, e)))
        };
        let mut url = match &self.url {
            Some(raw) => parse(raw)?,
            None => parse(&format!("redis://{}:{}", self.host, self.port))?,
        };

        if let Some(password) = &self.password {
            url.set_password(Some(password)).map_err(|()| {
                TasklineError::configuration(format!("Redis URL '{}' cannot carry a password", url))
            })?;
        }

        if let Some(database) = self.database {
            url.set_path(&format!("/{}", database));
        }

        Ok(url)
    }
}

/// Worker loop configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Queue the worker polls.
    pub queue: String,
    /// Stop after this many poll iterations (unbounded when absent).
    pub max_iterations: Option<u64>,
    /// Pause after an empty poll, in milliseconds.
    pub poll_interval_ms: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            queue: "default".to_string(),
            max_iterations: None,
            poll_interval_ms: 1000,
        }
    }
}

impl WorkerConfig {
    /// Returns the empty-poll pause as a Duration.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}
