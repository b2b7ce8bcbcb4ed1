//! Redis-backed engine.

mod engine;

pub use engine::RedisEngine;

use crate::error::{EngineError, EngineResult};
use deadpool_redis::{Config, Pool, Runtime};
use redis::aio::{ConnectionLike, MultiplexedConnection};
use redis::{Cmd, Pipeline, RedisFuture, Value};
use taskline_config::RedisConfig;
use tracing::info;

/// How the engine reaches the server.
pub(crate) enum Backend {
    /// Connections are pooled and kept open between operations.
    Pooled(Pool),
    /// A fresh connection is opened for every operation.
    Direct(redis::Client),
}

impl Backend {
    /// Build the backend described by `config` and verify it answers PING.
    pub(crate) async fn open(config: &RedisConfig) -> EngineResult<Self> {
        let url = config
            .connection_url()
            .map_err(|e| EngineError::Configuration(e.to_string()))?;

        let backend = if config.persistent {
            info!(pool_size = config.pool_size, "Creating Redis connection pool...");
            let pool = Config::from_url(url.as_str())
                .builder()
                .map_err(|e| EngineError::Configuration(format!("Invalid Redis config: {}", e)))?
                .max_size(config.pool_size)
                .runtime(Runtime::Tokio1)
                .build()
                .map_err(|e| EngineError::Configuration(format!("Failed to create pool: {}", e)))?;
            Self::Pooled(pool)
        } else {
            info!("Using per-operation Redis connections");
            Self::Direct(redis::Client::open(url.as_str())?)
        };

        // Test connection
        let mut conn = backend.get().await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;

        info!("Redis backend ready");
        Ok(backend)
    }

    /// Borrow a pooled connection or open a new one.
    pub(crate) async fn get(&self) -> EngineResult<Connection> {
        match self {
            Self::Pooled(pool) => Ok(Connection::Pooled(pool.get().await?)),
            Self::Direct(client) => Ok(Connection::Direct(
                client.get_multiplexed_async_connection().await?,
            )),
        }
    }
}

/// A connection from either backend flavour.
pub(crate) enum Connection {
    Pooled(deadpool_redis::Connection),
    Direct(MultiplexedConnection),
}

impl ConnectionLike for Connection {
    fn req_packed_command<'a>(&'a mut self, cmd: &'a Cmd) -> RedisFuture<'a, Value> {
        match self {
            Self::Pooled(conn) => conn.req_packed_command(cmd),
            Self::Direct(conn) => conn.req_packed_command(cmd),
        }
    }

    fn req_packed_commands<'a>(
        &'a mut self,
        cmd: &'a Pipeline,
        offset: usize,
        count: usize,
    ) -> RedisFuture<'a, Vec<Value>> {
        match self {
            Self::Pooled(conn) => conn.req_packed_commands(cmd, offset, count),
            Self::Direct(conn) => conn.req_packed_commands(cmd, offset, count),
        }
    }

    fn get_db(&self) -> i64 {
        match self {
            Self::Pooled(conn) => conn.get_db(),
            Self::Direct(conn) => conn.get_db(),
        }
    }
}

/// Redis key builder.
#[derive(Debug, Clone)]
pub struct RedisKeys {
    prefix: String,
}

impl RedisKeys {
    /// Create a new key builder with the given prefix.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Registry of every queue name ever used (set).
    pub fn queues(&self) -> String {
        format!("{}:queues", self.prefix)
    }

    /// Visible items of a queue (list, head first).
    pub fn queue(&self, queue_name: &str) -> String {
        format!("{}:queue:{}", self.prefix, queue_name)
    }

    /// Delayed items of a queue (sorted set by visible-at ms).
    pub fn delayed(&self, queue_name: &str) -> String {
        format!("{}:delayed:{}", self.prefix, queue_name)
    }

    /// Expiry deadlines of a queue's items (sorted set by expires-at ms).
    pub fn expiring(&self, queue_name: &str) -> String {
        format!("{}:expiring:{}", self.prefix, queue_name)
    }
}

impl Default for RedisKeys {
    fn default() -> Self {
        Self::new("taskline")
    }
}
