//! Job handle passed to handlers.

use crate::engine::Engine;
use crate::item::{HandlerSpec, QueueItem};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// A popped item together with the engine that delivered it.
///
/// Handlers read their arguments through [`Job::data`] and may use
/// [`Job::engine`] to push follow-up work, delete, or release.
pub struct Job<'e> {
    item: QueueItem,
    engine: &'e dyn Engine,
}

impl<'e> Job<'e> {
    /// Wrap a popped item.
    pub fn new(item: QueueItem, engine: &'e dyn Engine) -> Self {
        Self { item, engine }
    }

    /// Argument `key`, if present.
    #[must_use]
    pub fn data(&self, key: &str) -> Option<&Value> {
        self.item.args.get(key)
    }

    /// All arguments.
    #[must_use]
    pub const fn args(&self) -> &BTreeMap<String, Value> {
        &self.item.args
    }

    /// Item identifier.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.item.id
    }

    /// Queue the item came from.
    #[must_use]
    pub fn queue(&self) -> &str {
        &self.item.queue
    }

    /// Handler the item names.
    #[must_use]
    pub const fn handler(&self) -> &HandlerSpec {
        &self.item.class
    }

    /// The underlying item.
    #[must_use]
    pub const fn item(&self) -> &QueueItem {
        &self.item
    }

    /// Engine that delivered the item.
    #[must_use]
    pub fn engine(&self) -> &'e dyn Engine {
        self.engine
    }

    /// Consume the handle, keeping the item.
    #[must_use]
    pub fn into_item(self) -> QueueItem {
        self.item
    }
}

impl fmt::Debug for Job<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("item", &self.item)
            .field("engine", &self.engine.job_class())
            .finish()
    }
}
