//! Taskline Jobs - backend-agnostic job queue
//!
//! Producers push [`QueueItem`]s into named queues through an [`Engine`];
//! a [`Worker`] pops them one at a time, resolves the handler each item
//! names, invokes it, and keeps [`Stats`] on what happened.
//!
//! - Engines: [`RedisEngine`] for production, [`MemoryEngine`] for tests and
//!   embedding, [`NullEngine`] for exercising control flow.
//! - Delivery windows: an item can be delayed (invisible until due) and can
//!   expire (dropped if not popped in time).
//! - Handlers live in a [`HandlerRegistry`] keyed by function name or by
//!   `(class, method)`.
//!
//! # Example
//!
//! ```rust,ignore
//! use futures::FutureExt;
//! use std::sync::Arc;
//! use taskline_jobs::prelude::*;
//!
//! let engine = RedisEngine::new(config.redis.clone());
//! engine.push(&QueueItem::new("send_welcome").arg("user_id", 42), "mail".into()).await;
//!
//! let mut registry = HandlerRegistry::new();
//! registry.register_fn("send_welcome", |job| {
//!     async move {
//!         let user_id = job.data("user_id").and_then(|v| v.as_u64());
//!         Ok(Some(user_id.is_some()))
//!     }
//!     .boxed()
//! });
//!
//! let options = WorkerOptions::default().queue("mail");
//! let mut worker = Worker::with_options(engine, Arc::new(registry), options);
//! worker.work(Some(100)).await;
//! println!("{:?}", worker.stats());
//! ```

pub mod clock;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod item;
pub mod job;
pub mod metrics;
pub mod redis;
pub mod stats;
pub mod worker;

pub use clock::{Clock, ManualClock, SystemClock};
pub use dispatch::{Dispatch, Handler, HandlerRegistry, HandlerResult, Outcome};
pub use engine::{Delivery, Engine, MemoryEngine, NullEngine};
pub use error::{EngineError, EngineResult};
pub use item::{DeliveryOptions, HandlerSpec, PushOptions, QueueItem, DEFAULT_QUEUE};
pub use job::Job;
pub use crate::metrics::{register_metrics, EngineMetrics, WorkerMetrics};
pub use crate::redis::{RedisEngine, RedisKeys};
pub use stats::{Stats, Tally};
pub use worker::{Worker, WorkerOptions};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::dispatch::{Dispatch, HandlerRegistry, HandlerResult};
    pub use crate::engine::{Engine, MemoryEngine};
    pub use crate::item::{HandlerSpec, PushOptions, QueueItem};
    pub use crate::job::Job;
    pub use crate::redis::RedisEngine;
    pub use crate::worker::{Worker, WorkerOptions};
}
