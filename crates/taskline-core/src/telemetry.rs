//! Logging initialisation.
//!
//! Installs a `tracing` subscriber with an `EnvFilter` and either the
//! human-readable or the JSON formatter. `RUST_LOG` wins over the configured
//! level when it is set.

use crate::{TasklineError, TasklineResult};
use serde::{Deserialize, Serialize};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Output format of the log subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Pretty,
    /// One JSON object per event.
    Json,
}

/// Telemetry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Service name attached to the startup log line.
    #[serde(default = "default_service_name")]
    pub service_name: String,

    /// Default filter directive (e.g. `info` or `info,taskline_jobs=debug`).
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Output format.
    #[serde(default)]
    pub format: LogFormat,

    /// Whether to emit logs at all.
    #[serde(default = "default_console_output")]
    pub console_output: bool,
}

fn default_service_name() -> String {
    "taskline-worker".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_console_output() -> bool {
    true
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: default_service_name(),
            log_level: default_log_level(),
            format: LogFormat::default(),
            console_output: default_console_output(),
        }
    }
}

impl TelemetryConfig {
    /// Builds the filter: `RUST_LOG` if present, otherwise the configured level.
    pub fn env_filter(&self) -> TasklineResult<EnvFilter> {
        match EnvFilter::try_from_default_env() {
            Ok(filter) => Ok(filter),
            Err(_) => EnvFilter::try_new(&self.log_level).map_err(|e| {
                TasklineError::Telemetry(format!("Invalid log filter '{}': {}", self.log_level, e))
            }),
        }
    }
}

/// Initialize logging with the given configuration.
///
/// Fails if a global subscriber is already installed.
pub fn init_logging(config: &TelemetryConfig) -> TasklineResult<()> {
    if !config.console_output {
        return Ok(());
    }

    let filter = config.env_filter()?;
    let registry = tracing_subscriber::registry().with(filter);

    let installed = match config.format {
        LogFormat::Pretty => registry
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .try_init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_target(true))
            .try_init(),
    };

    installed.map_err(|e| TasklineError::Telemetry(format!("Failed to install subscriber: {}", e)))?;

    tracing::info!(service = %config.service_name, format = ?config.format, "Logging initialized");
    Ok(())
}
