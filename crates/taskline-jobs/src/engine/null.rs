//! Engine that stores nothing.

use super::{Delivery, Engine};
use crate::error::{EngineError, EngineResult};
use crate::item::{PushOptions, QueueItem};
use async_trait::async_trait;
use std::collections::BTreeSet;

/// Engine whose every answer is fixed by one health flag.
///
/// A healthy instance accepts pushes and always reports an empty queue;
/// an unhealthy one fails to connect and fails every pop. Useful for
/// exercising worker control flow without a backend.
#[derive(Debug, Clone, Copy)]
pub struct NullEngine {
    healthy: bool,
}

impl NullEngine {
    /// Creates an engine with the given health.
    #[must_use]
    pub const fn new(healthy: bool) -> Self {
        Self { healthy }
    }
}

impl Default for NullEngine {
    fn default() -> Self {
        Self::new(true)
    }
}

#[async_trait]
impl Engine for NullEngine {
    async fn connect(&self) -> bool {
        self.healthy
    }

    async fn push(&self, _item: &QueueItem, _options: PushOptions) -> bool {
        self.healthy
    }

    async fn pop(&self, _queue: &str) -> EngineResult<Option<Delivery>> {
        if self.healthy {
            Ok(None)
        } else {
            Err(EngineError::Unavailable("null engine is configured to fail".to_string()))
        }
    }

    async fn delete(&self, _item: &QueueItem) -> bool {
        self.healthy
    }

    async fn release(&self, item: Option<&QueueItem>, _queue: &str) -> Option<u64> {
        item.filter(|_| self.healthy).map(|_| 0)
    }

    async fn queues(&self) -> BTreeSet<String> {
        BTreeSet::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_healthy_engine() {
        let engine = NullEngine::default();
        let item = QueueItem::new("f");

        assert!(engine.connect().await);
        assert!(engine.push(&item, PushOptions::default()).await);
        assert!(engine.pop("default").await.unwrap().is_none());
        assert!(engine.delete(&item).await);
        assert_eq!(engine.release(Some(&item), "default").await, Some(0));
        assert_eq!(engine.release(None, "default").await, None);
        assert!(engine.queues().await.is_empty());
    }

    #[tokio::test]
    async fn test_unhealthy_engine() {
        let engine = NullEngine::new(false);
        let item = QueueItem::new("f");

        assert!(!engine.connect().await);
        assert!(!engine.push(&item, PushOptions::default()).await);
        assert!(matches!(engine.pop("default").await, Err(EngineError::Unavailable(_))));
        assert!(!engine.delete(&item).await);
        assert_eq!(engine.release(Some(&item), "default").await, None);
    }
}
