//! Queue item codec.
//!
//! A [`QueueItem`] is the unit that travels through an engine. Engines store
//! it wrapped in a [`StoredRecord`], which adds a token unique to that one
//! push or release. Two pushes of an equal item are therefore two distinct
//! members in every backend, each with its own delay and expiry.
//!
//! `delete` matches by payload identity (id, handler, arguments), not by the
//! stored bytes: push options rewrite the queue and delivery window, and the
//! caller still holds the item as it was before the push.

use crate::error::EngineResult;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

/// Queue used when a push does not name one.
pub const DEFAULT_QUEUE: &str = "default";

fn default_queue() -> String {
    DEFAULT_QUEUE.to_string()
}

/// Reference to the handler that performs an item.
///
/// Serialises as a plain string for a free function, or as a two element
/// array `["Class", "method"]` for a method on a registered type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HandlerSpec {
    /// Free function registered by name.
    Function(String),
    /// Method registered under a class name.
    Method(String, String),
}

impl HandlerSpec {
    /// Creates a function reference.
    pub fn function(name: impl Into<String>) -> Self {
        Self::Function(name.into())
    }

    /// Creates a method reference.
    pub fn method(class: impl Into<String>, method: impl Into<String>) -> Self {
        Self::Method(class.into(), method.into())
    }
}

impl fmt::Display for HandlerSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Function(name) => write!(f, "{}", name),
            Self::Method(class, method) => write!(f, "{}::{}", class, method),
        }
    }
}

impl From<&str> for HandlerSpec {
    fn from(name: &str) -> Self {
        Self::Function(name.to_string())
    }
}

impl From<String> for HandlerSpec {
    fn from(name: String) -> Self {
        Self::Function(name)
    }
}

impl From<(&str, &str)> for HandlerSpec {
    fn from((class, method): (&str, &str)) -> Self {
        Self::method(class, method)
    }
}

/// Delivery window carried inside an item.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryOptions {
    /// Item stays invisible until this much time has passed since the push.
    #[serde(
        rename = "delay_ms",
        default,
        with = "millis",
        skip_serializing_if = "Option::is_none"
    )]
    pub delay: Option<Duration>,

    /// Item is dropped if still queued this long after the push.
    #[serde(
        rename = "expires_in_ms",
        default,
        with = "millis",
        skip_serializing_if = "Option::is_none"
    )]
    pub expires_in: Option<Duration>,
}

impl DeliveryOptions {
    /// True when neither a delay nor an expiry is set.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.delay.is_none() && self.expires_in.is_none()
    }
}

/// Options applied at push time.
///
/// `From<&str>` covers the common case of only naming the queue:
/// `engine.push(&item, "mail".into())`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PushOptions {
    /// Target queue; falls back to the item's own queue.
    pub queue: Option<String>,
    /// Overrides the item's delay.
    pub delay: Option<Duration>,
    /// Overrides the item's expiry.
    pub expires_in: Option<Duration>,
}

impl PushOptions {
    /// Creates empty push options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the target queue.
    #[must_use]
    pub fn queue(mut self, queue: impl Into<String>) -> Self {
        self.queue = Some(queue.into());
        self
    }

    /// Set the delay.
    #[must_use]
    pub const fn delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Set the expiry window.
    #[must_use]
    pub const fn expires_in(mut self, expires_in: Duration) -> Self {
        self.expires_in = Some(expires_in);
        self
    }
}

impl From<&str> for PushOptions {
    fn from(queue: &str) -> Self {
        Self::new().queue(queue)
    }
}

impl From<String> for PushOptions {
    fn from(queue: String) -> Self {
        Self::new().queue(queue)
    }
}

/// A unit of work as stored in a queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueItem {
    /// Unique item identifier.
    pub id: String,

    /// Queue the item was pushed to.
    #[serde(default = "default_queue")]
    pub queue: String,

    /// Handler that performs the item.
    pub class: HandlerSpec,

    /// Arguments for the handler.
    #[serde(default)]
    pub args: BTreeMap<String, Value>,

    /// Delivery window.
    #[serde(default, skip_serializing_if = "DeliveryOptions::is_empty")]
    pub options: DeliveryOptions,
}

impl QueueItem {
    /// Creates an item for the given handler on the default queue.
    pub fn new(class: impl Into<HandlerSpec>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            queue: default_queue(),
            class: class.into(),
            args: BTreeMap::new(),
            options: DeliveryOptions::default(),
        }
    }

    /// Set the queue.
    #[must_use]
    pub fn queue(mut self, queue: impl Into<String>) -> Self {
        self.queue = queue.into();
        self
    }

    /// Replace the identifier.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Add one argument.
    #[must_use]
    pub fn arg(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.args.insert(key.into(), value.into());
        self
    }

    /// Replace all arguments.
    #[must_use]
    pub fn args(mut self, args: BTreeMap<String, Value>) -> Self {
        self.args = args;
        self
    }

    /// Set the delay.
    #[must_use]
    pub const fn delay(mut self, delay: Duration) -> Self {
        self.options.delay = Some(delay);
        self
    }

    /// Set the expiry window.
    #[must_use]
    pub const fn expires_in(mut self, expires_in: Duration) -> Self {
        self.options.expires_in = Some(expires_in);
        self
    }

    /// Returns the record an engine stores for this item pushed with
    /// `options`. Push options win over the item's own settings.
    #[must_use]
    pub fn with_push_options(&self, options: &PushOptions) -> Self {
        let mut record = self.clone();
        if let Some(queue) = &options.queue {
            record.queue.clone_from(queue);
        }
        if options.delay.is_some() {
            record.options.delay = options.delay;
        }
        if options.expires_in.is_some() {
            record.options.expires_in = options.expires_in;
        }
        record
    }

    /// Serialize to the stored JSON form.
    pub fn encode(&self) -> EngineResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Deserialize from the stored JSON form.
    pub fn decode(raw: &str) -> EngineResult<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Interpret an untyped value as an item.
    pub fn from_value(value: Value) -> EngineResult<Self> {
        Ok(serde_json::from_value(value)?)
    }

    /// True when both items carry the same payload, wherever they were
    /// routed and whatever delivery window they were given.
    #[must_use]
    pub fn same_payload(&self, other: &Self) -> bool {
        self.id == other.id && self.class == other.class && self.args == other.args
    }
}

/// One stored copy of an item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct StoredRecord {
    /// Unique per store operation.
    pub(crate) token: String,
    pub(crate) item: QueueItem,
}

impl StoredRecord {
    pub(crate) fn new(item: QueueItem) -> Self {
        Self {
            token: Uuid::new_v4().simple().to_string(),
            item,
        }
    }

    pub(crate) fn encode(&self) -> EngineResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub(crate) fn decode(raw: &str) -> EngineResult<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Whether the stored bytes `raw` hold a copy of `item`.
    pub(crate) fn holds(raw: &str, item: &QueueItem) -> bool {
        Self::decode(raw).is_ok_and(|record| record.item.same_payload(item))
    }
}

pub(crate) fn duration_millis(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(duration) => {
                serializer.serialize_u64(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
            }
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_millis))
    }
}
