//! Resolving handler references and invoking handlers.
//!
//! Items name their handler with a [`HandlerSpec`]; a [`Dispatch`]
//! implementation decides whether that name is callable and runs it. The
//! stock implementation is [`HandlerRegistry`], an explicit table filled at
//! startup.

use crate::item::HandlerSpec;
use crate::job::Job;
use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::panic::AssertUnwindSafe;
use tracing::{debug, info};

/// What a handler returns.
///
/// `Ok(Some(true))` is success, `Ok(None)` means the handler had nothing
/// to report (also a success), `Ok(Some(false))` is a business failure and
/// `Err` is a fault.
pub type HandlerResult = anyhow::Result<Option<bool>>;

/// Boxed handler stored in a [`HandlerRegistry`].
pub type Handler = Box<dyn for<'a> Fn(&'a Job<'a>) -> BoxFuture<'a, HandlerResult> + Send + Sync>;

/// Classified result of one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Handler returned `Some(true)`.
    Success,
    /// Handler returned `None`.
    NoResult,
    /// Handler returned `Some(false)`.
    Failure,
    /// Handler returned an error or panicked.
    Fault(String),
    /// No handler is registered under the item's reference.
    Unresolved,
}

impl Outcome {
    /// True for [`Outcome::Success`] and [`Outcome::NoResult`].
    #[must_use]
    pub const fn succeeded(&self) -> bool {
        matches!(self, Self::Success | Self::NoResult)
    }
}

impl From<HandlerResult> for Outcome {
    fn from(result: HandlerResult) -> Self {
        match result {
            Ok(Some(true)) => Self::Success,
            Ok(None) => Self::NoResult,
            Ok(Some(false)) => Self::Failure,
            Err(e) => Self::Fault(format!("{e:#}")),
        }
    }
}

/// Handler lookup and invocation.
#[async_trait]
pub trait Dispatch: Send + Sync {
    /// Whether `spec` names a callable handler.
    fn resolves(&self, spec: &HandlerSpec) -> bool;

    /// Run the handler named by `spec` against `job`.
    async fn invoke(&self, spec: &HandlerSpec, job: &Job<'_>) -> Outcome;
}

/// Table of handlers keyed by their reference.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<HandlerSpec, Handler>,
}

impl HandlerRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler under an explicit reference, replacing any
    /// previous one.
    pub fn register<F>(&mut self, spec: HandlerSpec, handler: F) -> &mut Self
    where
        F: for<'a> Fn(&'a Job<'a>) -> BoxFuture<'a, HandlerResult> + Send + Sync + 'static,
    {
        info!(handler = %spec, "Registered handler");
        self.handlers.insert(spec, Box::new(handler));
        self
    }

    /// Register a free function handler.
    pub fn register_fn<F>(&mut self, name: impl Into<String>, handler: F) -> &mut Self
    where
        F: for<'a> Fn(&'a Job<'a>) -> BoxFuture<'a, HandlerResult> + Send + Sync + 'static,
    {
        self.register(HandlerSpec::Function(name.into()), handler)
    }

    /// Register a method handler under `class`.
    pub fn register_method<F>(
        &mut self,
        class: impl Into<String>,
        method: impl Into<String>,
        handler: F,
    ) -> &mut Self
    where
        F: for<'a> Fn(&'a Job<'a>) -> BoxFuture<'a, HandlerResult> + Send + Sync + 'static,
    {
        self.register(HandlerSpec::Method(class.into(), method.into()), handler)
    }

    /// Number of registered handlers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// True when nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<String> = self.handlers.keys().map(ToString::to_string).collect();
        names.sort();
        f.debug_struct("HandlerRegistry").field("handlers", &names).finish()
    }
}

#[async_trait]
impl Dispatch for HandlerRegistry {
    fn resolves(&self, spec: &HandlerSpec) -> bool {
        self.handlers.contains_key(spec)
    }

    async fn invoke(&self, spec: &HandlerSpec, job: &Job<'_>) -> Outcome {
        let Some(handler) = self.handlers.get(spec) else {
            debug!(handler = %spec, "No handler registered");
            return Outcome::Unresolved;
        };

        // A handler may panic while building its future or while polling it.
        let future = match std::panic::catch_unwind(AssertUnwindSafe(|| handler(job))) {
            Ok(future) => future,
            Err(panic) => return Outcome::Fault(panic_message(panic.as_ref())),
        };

        match AssertUnwindSafe(future).catch_unwind().await {
            Ok(result) => Outcome::from(result),
            Err(panic) => Outcome::Fault(panic_message(panic.as_ref())),
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        format!("handler panicked: {}", message)
    } else if let Some(message) = panic.downcast_ref::<String>() {
        format!("handler panicked: {}", message)
    } else {
        "handler panicked".to_string()
    }
}
