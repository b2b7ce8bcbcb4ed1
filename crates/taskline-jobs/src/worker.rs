//! Sequential worker.
//!
//! A [`Worker`] drains one queue: pop, classify, invoke, record, repeat.
//! Iterations never overlap within a worker; running several workers
//! against one queue is safe because `pop` is atomic in every engine.

use crate::dispatch::{Dispatch, Outcome};
use crate::engine::{Delivery, Engine};
use crate::item::{HandlerSpec, QueueItem, DEFAULT_QUEUE};
use crate::job::Job;
use crate::metrics::WorkerMetrics;
use crate::stats::{Stats, Tally};
use std::sync::Arc;
use std::time::{Duration, Instant};
use taskline_config::WorkerConfig;
use tracing::{debug, error, info, warn, Instrument};
use uuid::Uuid;

/// Worker loop options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerOptions {
    /// Queue to drain.
    pub queue: String,

    /// Pause after an empty poll. Zero polls again immediately.
    pub poll_interval: Duration,
}

impl Default for WorkerOptions {
    fn default() -> Self {
        Self {
            queue: DEFAULT_QUEUE.to_string(),
            poll_interval: Duration::from_secs(1),
        }
    }
}

impl WorkerOptions {
    /// Set the queue.
    #[must_use]
    pub fn queue(mut self, queue: impl Into<String>) -> Self {
        self.queue = queue.into();
        self
    }

    /// Set the empty-poll pause.
    #[must_use]
    pub const fn poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }
}

impl From<&WorkerConfig> for WorkerOptions {
    fn from(config: &WorkerConfig) -> Self {
        Self {
            queue: config.queue.clone(),
            poll_interval: config.poll_interval(),
        }
    }
}

/// Drains a queue one item at a time.
pub struct Worker<E: Engine> {
    /// Unique worker ID.
    id: String,

    engine: E,

    dispatcher: Arc<dyn Dispatch>,

    options: WorkerOptions,

    stats: Stats,
}

impl<E: Engine> Worker<E> {
    /// Create a worker with default options.
    pub fn new(engine: E, dispatcher: Arc<dyn Dispatch>) -> Self {
        Self::with_options(engine, dispatcher, WorkerOptions::default())
    }

    /// Create a worker.
    pub fn with_options(engine: E, dispatcher: Arc<dyn Dispatch>, options: WorkerOptions) -> Self {
        Self {
            id: format!("worker-{}", Uuid::new_v4()),
            engine,
            dispatcher,
            options,
            stats: Stats::default(),
        }
    }

    /// Worker identifier used in logs.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The engine this worker drains.
    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Loop options.
    pub fn options(&self) -> &WorkerOptions {
        &self.options
    }

    /// Counter snapshot.
    pub fn stats(&self) -> Stats {
        self.stats
    }

    /// Connect the engine. The loop will not start if this fails.
    pub async fn connect(&self) -> bool {
        let connected = self.engine.connect().await;
        if connected {
            debug!(worker_id = %self.id, "Engine connected");
        } else {
            error!(worker_id = %self.id, "Engine failed to connect");
        }
        connected
    }

    /// Run the poll loop.
    ///
    /// Stops after `max_iterations` polls when bounded. Returns `true` on a
    /// clean finish and `false` when the engine cannot connect or a pop
    /// fails; the failed pop is not counted.
    pub async fn work(&mut self, max_iterations: Option<u64>) -> bool {
        let span = tracing::info_span!("worker", worker_id = %self.id, queue = %self.options.queue);
        self.run(max_iterations).instrument(span).await
    }

    async fn run(&mut self, max_iterations: Option<u64>) -> bool {
        if !self.connect().await {
            return false;
        }

        info!(max_iterations = ?max_iterations, "Worker started");
        let mut iteration = 0u64;

        while max_iterations.map_or(true, |max| iteration < max) {
            iteration += 1;

            let delivery = match self.engine.pop(&self.options.queue).await {
                Ok(delivery) => delivery,
                Err(e) => {
                    error!(error = %e, iteration, "Pop failed, stopping worker");
                    return false;
                }
            };

            let tally = match delivery {
                None => Tally::Empty,
                Some(Delivery::Malformed { raw, reason }) => {
                    warn!(reason = %reason, bytes = raw.len(), "Discarding malformed record");
                    Tally::Invalid
                }
                Some(Delivery::Item(item)) => self.process(item).await,
            };

            self.stats.record(tally);
            WorkerMetrics::iteration(&self.options.queue, tally);

            let last = max_iterations.is_some_and(|max| iteration >= max);
            if tally == Tally::Empty && !last && !self.options.poll_interval.is_zero() {
                tokio::time::sleep(self.options.poll_interval).await;
            }
        }

        info!(stats = ?self.stats, "Worker finished");
        true
    }

    async fn process(&self, item: QueueItem) -> Tally {
        if !self.dispatcher.resolves(&item.class) {
            warn!(item_id = %item.id, handler = %item.class, "Handler not resolvable");
            return Tally::Invalid;
        }

        let spec = item.class.clone();
        let job = Job::new(item, &self.engine);
        let started = Instant::now();
        let outcome = self.dispatcher.invoke(&spec, &job).await;

        let tally = match outcome {
            Outcome::Success | Outcome::NoResult => {
                debug!(item_id = %job.id(), handler = %spec, "Item succeeded");
                Tally::Success
            }
            Outcome::Failure => {
                info!(item_id = %job.id(), handler = %spec, "Item failed");
                Tally::Failure
            }
            Outcome::Fault(message) => {
                warn!(item_id = %job.id(), handler = %spec, error = %message, "Handler raised");
                Tally::Exception
            }
            Outcome::Unresolved => {
                warn!(item_id = %job.id(), handler = %spec, "Handler not resolvable");
                Tally::Invalid
            }
        };

        WorkerMetrics::job_duration(job.queue(), tally, started.elapsed());
        tally
    }

    /// Invoke one handler directly. True on success or no result; false on
    /// failure, fault, or an unknown handler. Counters are not touched.
    pub async fn perform(&self, spec: &HandlerSpec, job: &Job<'_>) -> bool {
        if !self.dispatcher.resolves(spec) {
            debug!(handler = %spec, "Handler not resolvable");
            return false;
        }
        self.dispatcher.invoke(spec, job).await.succeeded()
    }
}
