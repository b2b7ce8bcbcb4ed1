//! Redis engine implementation.

use super::{Backend, Connection, RedisKeys};
use crate::clock::{Clock, SystemClock};
use crate::engine::{Delivery, Engine};
use crate::error::{EngineError, EngineResult};
use crate::item::{duration_millis, PushOptions, QueueItem, StoredRecord};
use crate::metrics::EngineMetrics;
use async_trait::async_trait;
use redis::{AsyncCommands, Script};
use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;
use taskline_config::RedisConfig;
use tokio::sync::OnceCell;
use tracing::{debug, error, info, warn};

const BACKEND: &str = "redis";

/// Reap expired members, promote due delayed members, then pop the head.
///
/// KEYS: list, delayed set, expiring set. ARGV: current time in ms.
const POP_SCRIPT: &str = r"
local now = ARGV[1]

local expired = redis.call('ZRANGEBYSCORE', KEYS[3], '-inf', now)
for _, member in ipairs(expired) do
    redis.call('LREM', KEYS[1], 1, member)
    redis.call('ZREM', KEYS[2], member)
end
if #expired > 0 then
    redis.call('ZREMRANGEBYSCORE', KEYS[3], '-inf', now)
end

local due = redis.call('ZRANGEBYSCORE', KEYS[2], '-inf', now)
for _, member in ipairs(due) do
    redis.call('RPUSH', KEYS[1], member)
end
if #due > 0 then
    redis.call('ZREMRANGEBYSCORE', KEYS[2], '-inf', now)
end

local item = redis.call('LPOP', KEYS[1])
if item then
    redis.call('ZREM', KEYS[3], item)
end
return item
";

/// Remove one stored member. Reports 0 for a member that is gone or whose
/// deadline already passed; the latter is purged all the same.
///
/// KEYS: list, delayed set, expiring set. ARGV: record, current time in ms.
const DELETE_SCRIPT: &str = r"
local deadline = redis.call('ZSCORE', KEYS[3], ARGV[1])
redis.call('ZREM', KEYS[3], ARGV[1])
local removed = redis.call('LREM', KEYS[1], 1, ARGV[1])
if removed == 0 then
    removed = redis.call('ZREM', KEYS[2], ARGV[1])
end
if deadline and tonumber(deadline) <= tonumber(ARGV[2]) then
    return 0
end
return removed
";

/// Redis-backed engine.
///
/// The backend is opened on first use (or by [`Engine::connect`]) and then
/// shared by every operation. Each round-trip is bounded by the configured
/// timeout.
pub struct RedisEngine {
    config: RedisConfig,
    keys: RedisKeys,
    clock: Arc<dyn Clock>,
    backend: OnceCell<Backend>,
    pop_script: Script,
    delete_script: Script,
}

impl RedisEngine {
    /// Create a new Redis engine. No connection is made yet.
    pub fn new(config: RedisConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Create a Redis engine that reads time from `clock`.
    pub fn with_clock(config: RedisConfig, clock: Arc<dyn Clock>) -> Self {
        let keys = RedisKeys::new(&config.key_prefix);
        Self {
            config,
            keys,
            clock,
            backend: OnceCell::new(),
            pop_script: Script::new(POP_SCRIPT),
            delete_script: Script::new(DELETE_SCRIPT),
        }
    }

    /// Key layout used by this engine.
    pub fn keys(&self) -> &RedisKeys {
        &self.keys
    }

    /// Get a connection, opening the backend if needed.
    async fn conn(&self) -> EngineResult<Connection> {
        let backend = self
            .backend
            .get_or_try_init(|| Backend::open(&self.config))
            .await?;
        backend.get().await
    }

    /// Run one backend interaction under the configured timeout.
    async fn bounded<T>(&self, operation: impl Future<Output = EngineResult<T>>) -> EngineResult<T> {
        let timeout = self.config.timeout();
        tokio::time::timeout(timeout, operation)
            .await
            .map_err(|_| EngineError::Timeout(timeout))?
    }

    async fn push_record(&self, record: &StoredRecord) -> EngineResult<()> {
        let payload = record.encode()?;
        let now = self.clock.now_millis();
        let queue = record.item.queue.as_str();
        let options = &record.item.options;

        let mut pipe = redis::pipe();
        pipe.atomic().sadd(self.keys.queues(), queue).ignore();

        match options.delay {
            Some(delay) if !delay.is_zero() => {
                let visible_at = now.saturating_add(duration_millis(delay));
                pipe.zadd(self.keys.delayed(queue), &payload, visible_at).ignore();
            }
            _ => {
                pipe.rpush(self.keys.queue(queue), &payload).ignore();
            }
        }

        if let Some(ttl) = options.expires_in {
            let deadline = now.saturating_add(duration_millis(ttl));
            pipe.zadd(self.keys.expiring(queue), &payload, deadline).ignore();
        }

        let mut conn = self.conn().await?;
        let _: () = pipe.query_async(&mut conn).await?;
        Ok(())
    }

    async fn pop_record(&self, queue: &str) -> EngineResult<Option<String>> {
        let mut conn = self.conn().await?;
        let raw: Option<String> = self
            .pop_script
            .key(self.keys.queue(queue))
            .key(self.keys.delayed(queue))
            .key(self.keys.expiring(queue))
            .arg(self.clock.now_millis())
            .invoke_async(&mut conn)
            .await?;
        Ok(raw)
    }

    /// Scan every registered queue for stored copies of `item` and remove
    /// the first live one.
    async fn delete_record(&self, item: &QueueItem) -> EngineResult<bool> {
        let mut conn = self.conn().await?;
        let names: BTreeSet<String> = conn.smembers(self.keys.queues()).await?;

        for name in &names {
            let mut members: Vec<String> = conn.lrange(self.keys.queue(name), 0, -1).await?;
            let delayed: Vec<String> = conn.zrange(self.keys.delayed(name), 0, -1).await?;
            members.extend(delayed);

            for member in members.iter().filter(|raw| StoredRecord::holds(raw, item)) {
                let removed: i64 = self
                    .delete_script
                    .key(self.keys.queue(name))
                    .key(self.keys.delayed(name))
                    .key(self.keys.expiring(name))
                    .arg(member)
                    .arg(self.clock.now_millis())
                    .invoke_async(&mut conn)
                    .await?;
                if removed > 0 {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    async fn release_record(&self, item: &QueueItem, queue: &str) -> EngineResult<u64> {
        let record = StoredRecord::new(item.with_push_options(&PushOptions::from(queue)));
        let payload = record.encode()?;
        let mut conn = self.conn().await?;
        let (length,): (u64,) = redis::pipe()
            .atomic()
            .sadd(self.keys.queues(), queue)
            .ignore()
            .rpush(self.keys.queue(queue), &payload)
            .query_async(&mut conn)
            .await?;
        Ok(length)
    }

    async fn queue_names(&self) -> EngineResult<BTreeSet<String>> {
        let mut conn = self.conn().await?;
        Ok(conn.smembers(self.keys.queues()).await?)
    }

    /// Delete every key of every registered queue, and the registry itself.
    pub async fn flush(&self) -> EngineResult<()> {
        self.bounded(async {
            let names = self.queue_names().await?;
            let mut keys = vec![self.keys.queues()];
            for name in &names {
                keys.push(self.keys.queue(name));
                keys.push(self.keys.delayed(name));
                keys.push(self.keys.expiring(name));
            }

            let mut conn = self.conn().await?;
            let _: () = conn.del(&keys).await?;
            info!(queues = names.len(), "Flushed Redis queues");
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl Engine for RedisEngine {
    async fn connect(&self) -> bool {
        let opened = self
            .bounded(async {
                self.backend
                    .get_or_try_init(|| Backend::open(&self.config))
                    .await
                    .map(|_| ())
            })
            .await;

        match opened {
            Ok(()) => true,
            Err(e) => {
                error!(error = %e, "Failed to connect to Redis");
                EngineMetrics::error(BACKEND, "connect", e.kind());
                false
            }
        }
    }

    async fn push(&self, item: &QueueItem, options: PushOptions) -> bool {
        let record = StoredRecord::new(item.with_push_options(&options));
        let queue = record.item.queue.as_str();
        match self.bounded(self.push_record(&record)).await {
            Ok(()) => {
                debug!(item_id = %item.id, queue = %queue, "Pushed item");
                EngineMetrics::pushed(BACKEND, queue);
                true
            }
            Err(e) => {
                error!(error = %e, item_id = %item.id, queue = %queue, "Failed to push item");
                EngineMetrics::error(BACKEND, "push", e.kind());
                false
            }
        }
    }

    async fn pop(&self, queue: &str) -> EngineResult<Option<Delivery>> {
        match self.bounded(self.pop_record(queue)).await {
            Ok(Some(raw)) => {
                EngineMetrics::popped(BACKEND, queue);
                Ok(Some(Delivery::decode(raw)))
            }
            Ok(None) => Ok(None),
            Err(e) => {
                error!(error = %e, queue = %queue, "Failed to pop item");
                EngineMetrics::error(BACKEND, "pop", e.kind());
                Err(e)
            }
        }
    }

    async fn delete(&self, item: &QueueItem) -> bool {
        match self.bounded(self.delete_record(item)).await {
            Ok(removed) => {
                if removed {
                    debug!(item_id = %item.id, "Deleted item");
                }
                removed
            }
            Err(e) => {
                warn!(error = %e, item_id = %item.id, "Failed to delete item");
                EngineMetrics::error(BACKEND, "delete", e.kind());
                false
            }
        }
    }

    async fn release(&self, item: Option<&QueueItem>, queue: &str) -> Option<u64> {
        let Some(item) = item else {
            debug!(queue = %queue, "Nothing to release");
            return None;
        };

        match self.bounded(self.release_record(item, queue)).await {
            Ok(length) => {
                debug!(item_id = %item.id, queue = %queue, length, "Released item");
                Some(length)
            }
            Err(e) => {
                warn!(error = %e, item_id = %item.id, queue = %queue, "Failed to release item");
                EngineMetrics::error(BACKEND, "release", e.kind());
                None
            }
        }
    }

    async fn queues(&self) -> BTreeSet<String> {
        match self.bounded(self.queue_names()).await {
            Ok(names) => names,
            Err(e) => {
                warn!(error = %e, "Failed to list queues");
                EngineMetrics::error(BACKEND, "queues", e.kind());
                BTreeSet::new()
            }
        }
    }
}
