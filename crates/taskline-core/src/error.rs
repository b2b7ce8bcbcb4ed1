//! Unified error type for the configuration and process layers.

use thiserror::Error;

/// Application-level error for Taskline.
///
/// Queue operations never surface this type: the engine converts backend
/// faults into sentinels and the worker only sees those. This error covers
/// what happens around the queue (loading configuration, bootstrapping the
/// worker process, installing the log subscriber).
#[derive(Error, Debug)]
pub enum TasklineError {
    /// Configuration could not be loaded or is invalid
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Backend could not be reached, or was lost while working
    #[error("Connection error: {0}")]
    Connection(String),

    /// Logging or metrics setup failed
    #[error("Telemetry error: {0}")]
    Telemetry(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl TasklineError {
    /// Returns a machine-readable error code.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "CONFIGURATION_ERROR",
            Self::Connection(_) => "CONNECTION_ERROR",
            Self::Telemetry(_) => "TELEMETRY_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Process exit code used by the worker binary.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Configuration(_) => 78,
            Self::Connection(_) => 69,
            Self::Telemetry(_) | Self::Internal(_) => 1,
        }
    }

    /// Creates a configuration error.
    #[must_use]
    pub fn configuration<T: Into<String>>(message: T) -> Self {
        Self::Configuration(message.into())
    }

    /// Creates a connection error.
    #[must_use]
    pub fn connection<T: Into<String>>(message: T) -> Self {
        Self::Connection(message.into())
    }

    /// Creates an internal error.
    #[must_use]
    pub fn internal<T: Into<String>>(message: T) -> Self {
        Self::Internal(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(TasklineError::configuration("bad").error_code(), "CONFIGURATION_ERROR");
        assert_eq!(TasklineError::connection("down").error_code(), "CONNECTION_ERROR");
        assert_eq!(TasklineError::internal("oops").error_code(), "INTERNAL_ERROR");
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(TasklineError::configuration("bad").exit_code(), 78);
        assert_eq!(TasklineError::connection("down").exit_code(), 69);
        assert_eq!(TasklineError::internal("oops").exit_code(), 1);
    }

    #[test]
    fn test_error_display() {
        let err = TasklineError::configuration("worker.queue must not be empty");
        assert!(err.to_string().contains("worker.queue"));
    }
}
