//! Engine error types.
//!
//! These errors stay inside the engines. The engine contract reports
//! failures as sentinels (`false`, `None`), and only `pop` hands an
//! `EngineError` to the worker so it can tell "backend broken" apart from
//! "queue empty".

use std::time::Duration;
use thiserror::Error;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Engine-related errors.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Redis error.
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Pool error.
    #[error("Pool error: {0}")]
    Pool(#[from] deadpool_redis::PoolError),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A backend round-trip exceeded the configured timeout.
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    /// The backend refused to serve requests.
    #[error("Backend unavailable: {0}")]
    Unavailable(String),
}

impl EngineError {
    /// Short label used for metrics and structured logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Redis(_) => "redis",
            Self::Pool(_) => "pool",
            Self::Serialization(_) => "serialization",
            Self::Configuration(_) => "configuration",
            Self::Timeout(_) => "timeout",
            Self::Unavailable(_) => "unavailable",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(EngineError::Timeout(Duration::from_secs(1)).kind(), "timeout");
        assert_eq!(EngineError::Configuration("x".into()).kind(), "configuration");
        assert_eq!(EngineError::Unavailable("down".into()).kind(), "unavailable");
    }

    #[test]
    fn test_serialization_errors_convert() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        assert_eq!(EngineError::from(json_err).kind(), "serialization");
    }

    #[test]
    fn test_timeout_display() {
        let err = EngineError::Timeout(Duration::from_secs(5));
        assert_eq!(err.to_string(), "Operation timed out after 5s");
    }
}
