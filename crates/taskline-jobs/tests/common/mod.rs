//! Common test infrastructure for engine and worker integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use futures::FutureExt;
use parking_lot::Mutex;
use std::collections::{BTreeSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use taskline_config::RedisConfig;
use taskline_jobs::{
    Delivery, Engine, EngineResult, HandlerRegistry, PushOptions, QueueItem,
};
use testcontainers::runners::AsyncRunner;
use testcontainers::ContainerAsync;
use testcontainers_modules::redis::Redis;
use uuid::Uuid;

/// Redis server for integration tests.
///
/// Uses `REDIS_URL` when it is set, otherwise starts a throwaway container.
pub struct TestRedis {
    _container: Option<ContainerAsync<Redis>>,
    url: String,
}

impl TestRedis {
    /// Returns `None` when no server is configured and Docker is unavailable.
    pub async fn start() -> Option<Self> {
        if let Ok(url) = std::env::var("REDIS_URL") {
            return Some(Self {
                _container: None,
                url,
            });
        }

        let container = match Redis::default().start().await {
            Ok(container) => container,
            Err(e) => {
                eprintln!("Skipping Redis test, no REDIS_URL and no container: {e}");
                return None;
            }
        };

        let port = container
            .get_host_port_ipv4(6379)
            .await
            .expect("Failed to get Redis port");

        Some(Self {
            _container: Some(container),
            url: format!("redis://127.0.0.1:{}", port),
        })
    }

    /// Configuration with a key prefix no other test shares.
    pub fn config(&self) -> RedisConfig {
        RedisConfig {
            key_prefix: format!("taskline-test-{}", Uuid::new_v4()),
            timeout_secs: 2,
            ..RedisConfig::from_url(&self.url)
        }
    }
}

/// Engine whose `pop` answers come from a fixed script.
///
/// Once the script runs out every pop reports an empty queue.
pub struct ScriptedEngine {
    pops: Mutex<VecDeque<EngineResult<Option<Delivery>>>>,
    pop_calls: AtomicUsize,
}

impl ScriptedEngine {
    pub fn new(script: Vec<EngineResult<Option<Delivery>>>) -> Self {
        Self {
            pops: Mutex::new(script.into()),
            pop_calls: AtomicUsize::new(0),
        }
    }

    pub fn pop_calls(&self) -> usize {
        self.pop_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Engine for ScriptedEngine {
    async fn connect(&self) -> bool {
        true
    }

    async fn push(&self, _item: &QueueItem, _options: PushOptions) -> bool {
        false
    }

    async fn pop(&self, _queue: &str) -> EngineResult<Option<Delivery>> {
        self.pop_calls.fetch_add(1, Ordering::SeqCst);
        self.pops.lock().pop_front().unwrap_or(Ok(None))
    }

    async fn delete(&self, _item: &QueueItem) -> bool {
        false
    }

    async fn release(&self, _item: Option<&QueueItem>, _queue: &str) -> Option<u64> {
        None
    }

    async fn queues(&self) -> BTreeSet<String> {
        BTreeSet::new()
    }
}

/// Wrap an item as a successful delivery.
pub fn delivered(item: QueueItem) -> EngineResult<Option<Delivery>> {
    Ok(Some(Delivery::Item(item)))
}

/// Handlers covering every callable shape and outcome.
pub fn fixture_registry() -> HandlerRegistry {
    let mut registry = HandlerRegistry::new();
    registry
        .register_fn("fail_method", |_job| async { Ok(Some(false)) }.boxed())
        .register_fn("null_method", |_job| async { Ok(None) }.boxed())
        .register_fn("true_method", |_job| async { Ok(Some(true)) }.boxed())
        .register_method("MyJob", "performTrue", |_job| async { Ok(Some(true)) }.boxed())
        .register_method("MyJob", "performFail", |_job| async { Ok(Some(false)) }.boxed())
        .register_method("MyJob", "performNull", |_job| async { Ok(None) }.boxed())
        .register_method("MyJob", "performException", |_job| {
            async { Err(anyhow::anyhow!("Exception")) }.boxed()
        })
        .register_method("MyJob", "perform", |job| {
            async move { Ok(job.data("return").and_then(serde_json::Value::as_bool)) }.boxed()
        });
    registry
}
