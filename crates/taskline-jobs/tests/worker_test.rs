//! Integration tests for the sequential worker.

mod common;

use common::{delivered, fixture_registry, ScriptedEngine};
use futures::FutureExt;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use taskline_jobs::{
    Delivery, Dispatch, Engine, EngineError, HandlerRegistry, HandlerSpec, Job, MemoryEngine, NullEngine,
    PushOptions, QueueItem, Stats, Worker, WorkerOptions,
};

fn dispatcher() -> Arc<dyn Dispatch> {
    Arc::new(fixture_registry())
}

fn options() -> WorkerOptions {
    WorkerOptions::default().poll_interval(Duration::ZERO)
}

fn item(class: impl Into<HandlerSpec>) -> QueueItem {
    QueueItem::new(class).arg("return", true)
}

#[tokio::test]
async fn test_canonical_run() {
    let engine = ScriptedEngine::new(vec![
        Ok(None),
        delivered(item(("MyJob", "perform"))),
        delivered(item(("MyJob", "performFail"))),
        delivered(item(("MyJob", "performException"))),
        Ok(None),
    ]);

    let mut worker = Worker::with_options(engine, dispatcher(), options());
    assert!(worker.work(Some(5)).await);
    assert_eq!(
        worker.stats(),
        Stats {
            seen: 5,
            empty: 2,
            exception: 1,
            invalid: 0,
            success: 1,
            failure: 1,
        }
    );
    assert_eq!(worker.engine().pop_calls(), 5);
}

#[tokio::test]
async fn test_malformed_first_run() {
    let engine = ScriptedEngine::new(vec![
        Ok(Some(Delivery::decode("true".to_string()))),
        delivered(item(("MyJob", "perform"))),
        delivered(item(("MyJob", "performFail"))),
        delivered(item(("MyJob", "performException"))),
        Ok(None),
    ]);

    let mut worker = Worker::with_options(engine, dispatcher(), options());
    assert!(worker.work(Some(5)).await);

    // Faults count as exceptions only, never also as failures.
    assert_eq!(
        worker.stats(),
        Stats {
            seen: 5,
            empty: 1,
            exception: 1,
            invalid: 1,
            success: 1,
            failure: 1,
        }
    );
}

#[tokio::test]
async fn test_unresolvable_handler_is_invalid_not_exception() {
    let engine = ScriptedEngine::new(vec![
        delivered(item("nonexistent_method")),
        delivered(item(("Missing", "perform"))),
        delivered(item(("MyJob", "missing"))),
    ]);

    let mut worker = Worker::with_options(engine, dispatcher(), options());
    assert!(worker.work(Some(3)).await);

    let stats = worker.stats();
    assert_eq!(stats.invalid, 3);
    assert_eq!(stats.exception, 0);
}

#[tokio::test]
async fn test_pop_failure_mid_run_stops() {
    let engine = ScriptedEngine::new(vec![
        delivered(item("true_method")),
        Err(EngineError::Unavailable("connection reset".to_string())),
        delivered(item("true_method")),
    ]);

    let mut worker = Worker::with_options(engine, dispatcher(), options());
    assert!(!worker.work(Some(5)).await);

    let stats = worker.stats();
    assert_eq!(stats.seen, 1);
    assert_eq!(stats.success, 1);
    assert_eq!(worker.engine().pop_calls(), 2);
}

#[tokio::test]
async fn test_connect_follows_engine() {
    let worker = Worker::new(NullEngine::default(), dispatcher());
    assert!(worker.connect().await);

    let mut worker = Worker::new(NullEngine::new(false), dispatcher());
    assert!(!worker.connect().await);
    assert!(!worker.work(None).await);
}

#[tokio::test]
async fn test_perform_shapes() {
    let engine = NullEngine::default();
    let worker = Worker::new(NullEngine::default(), dispatcher());

    let cases = [
        (HandlerSpec::function("nonexistent_method"), false),
        (HandlerSpec::function("fail_method"), false),
        (HandlerSpec::function("null_method"), true),
        (HandlerSpec::function("true_method"), true),
        (HandlerSpec::method("MyJob", "performFail"), false),
        (HandlerSpec::method("MyJob", "performTrue"), true),
        (HandlerSpec::method("MyJob", "performNull"), true),
        (HandlerSpec::method("MyJob", "performException"), false),
        (HandlerSpec::method("MyJob", "perform"), true),
    ];

    for (spec, expected) in cases {
        let job = Job::new(item(spec.clone()), &engine);
        assert_eq!(worker.perform(&spec, &job).await, expected, "handler {spec}");
    }
    assert_eq!(worker.stats(), Stats::default());
}

#[tokio::test]
async fn test_stats_is_a_snapshot() {
    let engine = ScriptedEngine::new(vec![delivered(item("true_method"))]);
    let mut worker = Worker::with_options(engine, dispatcher(), options());

    let before = worker.stats();
    assert!(worker.work(Some(2)).await);
    assert_eq!(before, Stats::default());
    assert_eq!(worker.stats().seen, 2);
}

#[tokio::test]
async fn test_empty_poll_waits_between_iterations() {
    let options = WorkerOptions::default().poll_interval(Duration::from_millis(20));
    let mut worker = Worker::with_options(NullEngine::default(), dispatcher(), options);

    let started = std::time::Instant::now();
    assert!(worker.work(Some(3)).await);

    // Two pauses; the last iteration does not wait.
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(40), "elapsed {elapsed:?}");
    assert_eq!(worker.stats().empty, 3);
}

#[tokio::test]
async fn test_worker_drains_memory_engine() {
    let engine = MemoryEngine::new();
    engine.push(&item("true_method"), PushOptions::default()).await;
    engine.push(&item("fail_method"), "other".into()).await;
    engine.push(&item(("MyJob", "perform")), PushOptions::default()).await;

    let mut worker = Worker::with_options(engine, dispatcher(), options());
    assert!(worker.work(Some(3)).await);

    let stats = worker.stats();
    assert_eq!(stats.success, 2);
    assert_eq!(stats.empty, 1);
    assert_eq!(worker.engine().len("other"), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_workers_receive_each_item_once() {
    const ITEMS: usize = 200;

    let engine = Arc::new(MemoryEngine::new());
    let mut pushed = Vec::with_capacity(ITEMS);
    for n in 0..ITEMS {
        let queued = QueueItem::new("record").arg("n", n);
        pushed.push(queued.id.clone());
        assert!(engine.push(&queued, PushOptions::default()).await);
    }

    let received = Arc::new(Mutex::new(Vec::new()));
    let mut registry = HandlerRegistry::new();
    let sink = received.clone();
    registry.register_fn("record", move |job| {
        let sink = sink.clone();
        async move {
            sink.lock().push(job.id().to_string());
            Ok(Some(true))
        }
        .boxed()
    });
    let dispatcher: Arc<dyn Dispatch> = Arc::new(registry);

    let handles: Vec<_> = (0..2)
        .map(|_| {
            let mut worker = Worker::with_options(engine.clone(), dispatcher.clone(), options());
            tokio::spawn(async move {
                assert!(worker.work(Some(ITEMS as u64)).await);
                worker.stats()
            })
        })
        .collect();

    let mut successes = 0;
    for handle in handles {
        let stats = handle.await.unwrap();
        assert!(stats.is_consistent());
        successes += stats.success;
    }

    let mut received = received.lock().clone();
    received.sort();
    pushed.sort();
    assert_eq!(received, pushed);
    assert_eq!(successes, ITEMS as u64);
    assert!(engine.is_empty("default"));
}
