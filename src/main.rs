//! Process entry point.
//!
//! The same binary plays two roles, selected by the `LIFECYCLE_DRIVER_WORKER`
//! environment variable:
//!
//! - unset: the parent. Spawns `process_pool_size` worker processes and
//!   blocks until a shutdown signal arrives, then tears the pool down.
//! - set: a worker. Resets the signal dispositions it inherited, builds a
//!   request queue and response publisher, and drains the queue until it's
//!   closed or the parent asks it to stop.
//!
//! No durable queue transport ships with this crate (see `request_queue`/
//! `response_publisher`); a worker process defaults to the in-process
//! channel adapters wired to nothing, which means an unconfigured worker
//! simply idles. Embedding crates that do have a transport construct their
//! own `RequestQueue`/`ResponsePublisher` and call `worker::run` directly
//! instead of going through this binary.

use lifecycle_driver::config::Config;
use lifecycle_driver::lifecycle_executor::LifecycleExecutor;
use lifecycle_driver::request_queue::{ChannelRequestQueue, RequestQueue};
use lifecycle_driver::response_publisher::NullResponsePublisher;
use lifecycle_driver::worker;
use lifecycle_driver::worker_pool::{self, WorkerPool, WORKER_ENV_VAR};
use std::env;
use std::process::ExitCode;
use std::sync::atomic::AtomicBool;
use tracing::{error, info};

fn main() -> ExitCode {
    lifecycle_driver::logger::init();
    let config = Config::from_env();

    if env::var(WORKER_ENV_VAR).is_ok() {
        run_worker(config);
        return ExitCode::SUCCESS;
    }

    run_parent(config)
}

fn run_parent(config: Config) -> ExitCode {
    info!(pool_size = config.process_pool_size, "starting lifecycle driver");

    match WorkerPool::start(config.process_pool_size, config.shutdown_grace_period) {
        Ok(pool) => {
            pool.run_until_shutdown();
            info!("lifecycle driver shut down cleanly");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "failed to start worker pool");
            ExitCode::FAILURE
        }
    }
}

/// A worker with no durable transport configured has nothing to consume:
/// the queue is built empty and closed immediately so the process exits
/// rather than spinning forever. Real deployments wire a transport-backed
/// `RequestQueue`/`ResponsePublisher` pair in place of this pair before
/// calling `worker::run`.
fn run_worker(config: Config) {
    worker_pool::reset_child_signal_disposition();

    let executor = LifecycleExecutor::new(config);
    let (queue, _sender) = ChannelRequestQueue::new();
    queue.close(); // no producer: close up front so `next` returns immediately
    let publisher = NullResponsePublisher;
    let active = AtomicBool::new(true);

    worker::run(&queue, &publisher, &executor, &active);
}
