//! Engine contract.
//!
//! An engine stores [`QueueItem`]s in named queues. Operations report
//! failure as sentinels rather than errors: a worker draining a queue only
//! needs to know whether something happened, and backend details are
//! logged where they occur. `pop` is the exception, because "queue empty"
//! and "backend gone" must lead to different worker behaviour.

mod memory;
mod null;

pub use memory::MemoryEngine;
pub use null::NullEngine;

use crate::error::EngineResult;
use crate::item::{PushOptions, QueueItem, StoredRecord};
use crate::job::Job;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::debug;

/// What a successful `pop` handed out.
#[derive(Debug, Clone, PartialEq)]
pub enum Delivery {
    /// A decoded item.
    Item(QueueItem),
    /// A stored record that is not a valid item. It has been removed from
    /// the queue all the same.
    Malformed {
        /// The stored bytes.
        raw: String,
        /// Why decoding failed.
        reason: String,
    },
}

impl Delivery {
    /// Decode a raw stored record.
    #[must_use]
    pub fn decode(raw: String) -> Self {
        match StoredRecord::decode(&raw) {
            Ok(record) => Self::Item(record.item),
            Err(e) => Self::Malformed {
                raw,
                reason: e.to_string(),
            },
        }
    }

    /// Consume into the decoded item, if any.
    #[must_use]
    pub fn into_item(self) -> Option<QueueItem> {
        match self {
            Self::Item(item) => Some(item),
            Self::Malformed { .. } => None,
        }
    }
}

/// Queue backend.
#[async_trait]
pub trait Engine: Send + Sync {
    /// Establish the backend connection. Idempotent.
    async fn connect(&self) -> bool;

    /// Store an item. `options` override the item's queue and delivery
    /// window. The queue is registered even if it was never seen before.
    async fn push(&self, item: &QueueItem, options: PushOptions) -> bool;

    /// Atomically remove and return the next visible item.
    ///
    /// `Ok(None)` means the queue is empty (or everything in it is still
    /// delayed); `Err` means the backend could not be asked.
    async fn pop(&self, queue: &str) -> EngineResult<Option<Delivery>>;

    /// Remove one stored copy of `item`, in whichever queue it was pushed
    /// or released to. Copies match by payload identity. False when no live
    /// copy matched; an expired copy is purged but does not count.
    async fn delete(&self, item: &QueueItem) -> bool;

    /// Put an item back at the tail of `queue`, returning the queue length
    /// afterwards. The stored copy names `queue` as its queue. `None` for an
    /// absent item or a backend failure.
    async fn release(&self, item: Option<&QueueItem>, queue: &str) -> Option<u64>;

    /// Every queue name that has ever received a push or release.
    async fn queues(&self) -> BTreeSet<String>;

    /// Type name of the job handle handed to handlers.
    fn job_class(&self) -> &'static str {
        std::any::type_name::<Job<'static>>()
    }

    /// Delete by untyped value. Anything that is not an item yields false.
    async fn delete_value(&self, value: &Value) -> bool {
        match QueueItem::from_value(value.clone()) {
            Ok(item) => self.delete(&item).await,
            Err(e) => {
                debug!(error = %e, "Refusing to delete a value that is not a queue item");
                false
            }
        }
    }
}

#[async_trait]
impl<E: Engine + ?Sized> Engine for Arc<E> {
    async fn connect(&self) -> bool {
        (**self).connect().await
    }

    async fn push(&self, item: &QueueItem, options: PushOptions) -> bool {
        (**self).push(item, options).await
    }

    async fn pop(&self, queue: &str) -> EngineResult<Option<Delivery>> {
        (**self).pop(queue).await
    }

    async fn delete(&self, item: &QueueItem) -> bool {
        (**self).delete(item).await
    }

    async fn release(&self, item: Option<&QueueItem>, queue: &str) -> Option<u64> {
        (**self).release(item, queue).await
    }

    async fn queues(&self) -> BTreeSet<String> {
        (**self).queues().await
    }

    fn job_class(&self) -> &'static str {
        (**self).job_class()
    }

    async fn delete_value(&self, value: &Value) -> bool {
        (**self).delete_value(value).await
    }
}

#[async_trait]
impl<E: Engine + ?Sized> Engine for Box<E> {
    async fn connect(&self) -> bool {
        (**self).connect().await
    }

    async fn push(&self, item: &QueueItem, options: PushOptions) -> bool {
        (**self).push(item, options).await
    }

    async fn pop(&self, queue: &str) -> EngineResult<Option<Delivery>> {
        (**self).pop(queue).await
    }

    async fn delete(&self, item: &QueueItem) -> bool {
        (**self).delete(item).await
    }

    async fn release(&self, item: Option<&QueueItem>, queue: &str) -> Option<u64> {
        (**self).release(item, queue).await
    }

    async fn queues(&self) -> BTreeSet<String> {
        (**self).queues().await
    }

    fn job_class(&self) -> &'static str {
        (**self).job_class()
    }

    async fn delete_value(&self, value: &Value) -> bool {
        (**self).delete_value(value).await
    }
}
