//! Fixed-size pool of independent OS-process workers.
//!
//! A worker is realised by re-executing the driver's own binary (passing
//! `LIFECYCLE_DRIVER_WORKER=1` through the environment) rather than
//! `fork()`ing the parent: forking a process that already has logging and
//! bookkeeping threads running is undefined behaviour. Each worker process
//! independently builds its own `RequestQueue`/`ResponsePublisher` from
//! configuration, exactly as a Kafka-backed deployment would.

use once_cell::sync::OnceCell;
use std::env;
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{info, warn};

pub const WORKER_ENV_VAR: &str = "LIFECYCLE_DRIVER_WORKER";

static SHUTDOWN_REQUESTED: AtomicBool = AtomicBool::new(false);
static HANDLERS_INSTALLED: OnceCell<()> = OnceCell::new();

extern "C" fn request_shutdown(_signum: libc::c_int) {
    SHUTDOWN_REQUESTED.store(true, Ordering::SeqCst);
}

/// Installs `SIGINT`/`SIGTERM` handlers in the parent process only. Workers
/// must not inherit these: they reset `SIGCHLD` to the default disposition
/// instead, so the OS reaps playbook subprocesses and zombies never
/// accumulate (see [`reset_child_signal_disposition`]).
fn install_parent_signal_handlers() {
    HANDLERS_INSTALLED.get_or_init(|| unsafe {
        libc::signal(libc::SIGINT, request_shutdown as usize);
        libc::signal(libc::SIGTERM, request_shutdown as usize);
    });
}

/// Called at the top of a re-exec'd worker's entry point, before it starts
/// consuming the request queue.
pub fn reset_child_signal_disposition() {
    unsafe {
        libc::signal(libc::SIGCHLD, libc::SIG_DFL);
    }
}

pub fn shutdown_was_requested() -> bool {
    SHUTDOWN_REQUESTED.load(Ordering::SeqCst)
}

struct TrackedWorker {
    child: Child,
}

pub struct WorkerPool {
    active: Arc<AtomicBool>,
    grace_period: Duration,
    workers: Mutex<Vec<TrackedWorker>>,
}

impl WorkerPool {
    /// Spawns `pool_size` worker processes and installs the parent's signal
    /// handlers. Idempotent to call `shutdown` multiple times afterward.
    pub fn start(pool_size: usize, grace_period: Duration) -> std::io::Result<Self> {
        install_parent_signal_handlers();

        let current_exe = env::current_exe()?;
        let mut workers = Vec::with_capacity(pool_size);

        for index in 0..pool_size {
            let mut command = Command::new(&current_exe);
            command.env(WORKER_ENV_VAR, "1").stdin(Stdio::null());

            // Each worker becomes its own process-group leader so the parent
            // can signal the worker and everything it spawns (the playbook
            // subprocess tree) as a single unit.
            unsafe {
                use std::os::unix::process::CommandExt;
                command.pre_exec(|| {
                    libc::setsid();
                    Ok(())
                });
            }

            let child = command.spawn()?;
            info!(worker_index = index, pid = child.id(), "worker process started");
            workers.push(TrackedWorker { child });
        }

        Ok(WorkerPool {
            active: Arc::new(AtomicBool::new(true)),
            grace_period,
            workers: Mutex::new(workers),
        })
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Blocks the calling thread until a shutdown signal arrives, then tears
    /// the pool down. Intended to be called from the process's main thread.
    pub fn run_until_shutdown(&self) {
        while self.active.load(Ordering::SeqCst) && !shutdown_was_requested() {
            thread::sleep(Duration::from_millis(200));
        }
        self.shutdown();
    }

    /// Clears `active`, signals every worker's process group, waits out the
    /// grace period, and hard-kills anything still alive. Idempotent.
    pub fn shutdown(&self) {
        if !self.active.swap(false, Ordering::SeqCst) {
            return;
        }

        let mut workers = self.workers.lock().unwrap_or_else(|e| e.into_inner());
        for worker in workers.iter_mut() {
            let pgid = worker.child.id() as i32;
            unsafe {
                libc::kill(-pgid, libc::SIGTERM);
            }
        }

        let deadline = Instant::now() + self.grace_period;
        for worker in workers.iter_mut() {
            loop {
                match worker.child.try_wait() {
                    Ok(Some(status)) => {
                        info!(pid = worker.child.id(), ?status, "worker process exited");
                        break;
                    }
                    Ok(None) if Instant::now() >= deadline => {
                        warn!(pid = worker.child.id(), "worker did not exit within grace period, hard killing");
                        let pgid = worker.child.id() as i32;
                        unsafe {
                            libc::kill(-pgid, libc::SIGKILL);
                        }
                        let _ = worker.child.wait();
                        break;
                    }
                    Ok(None) => thread::sleep(Duration::from_millis(100)),
                    Err(e) => {
                        warn!(error = %e, "error waiting on worker process");
                        break;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shutdown_is_idempotent_with_no_workers() {
        let pool = WorkerPool {
            active: Arc::new(AtomicBool::new(true)),
            grace_period: Duration::from_millis(50),
            workers: Mutex::new(Vec::new()),
        };
        pool.shutdown();
        pool.shutdown();
        assert!(!pool.is_active());
    }
}
