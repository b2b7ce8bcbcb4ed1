//! Handlers every worker process ships with.

use futures::FutureExt;
use serde_json::Value;
use taskline_jobs::HandlerRegistry;
use tracing::info;

/// Registry holding the built-in handlers:
///
/// - `noop` does nothing and reports no result.
/// - `log` logs its arguments and succeeds.
/// - `fail` reports a failure, with an optional `reason` argument.
pub fn builtin_registry() -> HandlerRegistry {
    let mut registry = HandlerRegistry::new();
    registry
        .register_fn("noop", |_job| async { Ok(None) }.boxed())
        .register_fn("log", |job| {
            async move {
                let args = Value::Object(job.args().clone().into_iter().collect());
                info!(item_id = %job.id(), queue = %job.queue(), args = %args, "Logged item");
                Ok(Some(true))
            }
            .boxed()
        })
        .register_fn("fail", |job| {
            async move {
                let reason = job.data("reason").and_then(Value::as_str).unwrap_or("requested");
                info!(item_id = %job.id(), reason, "Failing item on request");
                Ok(Some(false))
            }
            .boxed()
        });
    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskline_jobs::{Dispatch, HandlerSpec, Job, NullEngine, Outcome, QueueItem};

    async fn invoke(item: QueueItem) -> Outcome {
        let registry = builtin_registry();
        let engine = NullEngine::default();
        let job = Job::new(item, &engine);
        let spec = job.handler().clone();
        registry.invoke(&spec, &job).await
    }

    #[test]
    fn test_builtins_are_registered() {
        let registry = builtin_registry();
        for name in ["noop", "log", "fail"] {
            assert!(registry.resolves(&HandlerSpec::function(name)), "{name} missing");
        }
        assert_eq!(registry.len(), 3);
    }

    #[tokio::test]
    async fn test_builtin_outcomes() {
        assert_eq!(invoke(QueueItem::new("noop")).await, Outcome::NoResult);
        assert_eq!(invoke(QueueItem::new("log").arg("user", 7)).await, Outcome::Success);
        assert_eq!(
            invoke(QueueItem::new("fail").arg("reason", "bad input")).await,
            Outcome::Failure
        );
    }
}
