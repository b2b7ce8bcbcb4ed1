//! # Taskline Worker
//!
//! Drains one Redis-backed queue with the built-in handlers.
//!
//! Exit codes: 0 after a clean run, 69 when the backend cannot be reached or
//! is lost mid-run, 78 for invalid configuration, 1 otherwise.

use std::sync::Arc;
use taskline_config::{AppConfig, ConfigLoader};
use taskline_core::{init_logging, TasklineError, TasklineResult};
use taskline_jobs::{register_metrics, RedisEngine, Worker, WorkerOptions};
use tracing::{debug, error, info};

mod handlers;

#[tokio::main]
async fn main() {
    let loader = match ConfigLoader::from_default_location() {
        Ok(loader) => loader,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(e.exit_code());
        }
    };
    let config = loader.get().await;

    if let Err(e) = init_logging(&config.telemetry) {
        eprintln!("{}", e);
        std::process::exit(e.exit_code());
    }

    info!("Starting Taskline worker...");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    info!("Environment: {}", config.app.environment);
    if let Ok(rendered) = loader.render_toml().await {
        debug!("Effective configuration:\n{}", rendered);
    }

    if let Err(e) = run(config).await {
        error!(code = e.error_code(), "Worker error: {}", e);
        std::process::exit(e.exit_code());
    }
}

/// Connect and drain the configured queue.
async fn run(config: AppConfig) -> TasklineResult<()> {
    register_metrics();

    let engine = RedisEngine::new(config.redis.clone());
    let registry = handlers::builtin_registry();
    let options = WorkerOptions::from(&config.worker);

    info!(
        queue = %options.queue,
        max_iterations = ?config.worker.max_iterations,
        handlers = registry.len(),
        "Worker configured"
    );

    let mut worker = Worker::with_options(engine, Arc::new(registry), options);

    if !worker.connect().await {
        return Err(TasklineError::connection(format!(
            "Could not connect to Redis at {}:{}",
            config.redis.host, config.redis.port
        )));
    }

    let completed = worker.work(config.worker.max_iterations).await;
    let stats = worker.stats();
    info!(
        seen = stats.seen,
        empty = stats.empty,
        success = stats.success,
        failure = stats.failure,
        exception = stats.exception,
        invalid = stats.invalid,
        "Worker stopped"
    );

    if completed {
        Ok(())
    } else {
        Err(TasklineError::connection("Lost the Redis backend while working"))
    }
}
