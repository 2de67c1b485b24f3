//! The loop a single worker runs: pull one request at a time from the
//! queue, execute it, publish the outcome. Runs until the queue is closed
//! or `active` is cleared.

use crate::lifecycle_executor::{inactive_outcome, LifecycleExecutor};
use crate::request_queue::RequestQueue;
use crate::response_publisher::ResponsePublisher;
use crate::worker_pool::shutdown_was_requested;
use std::fs;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{info, info_span, warn};

/// Drains `queue` until it closes or `active` flips false, running each
/// request through `executor` and publishing its outcome. Progress events
/// are published as they're produced; the outcome is published after.
pub fn run(queue: &dyn RequestQueue, publisher: &dyn ResponsePublisher, executor: &LifecycleExecutor, active: &AtomicBool) {
    loop {
        if !active.load(Ordering::Acquire) || shutdown_was_requested() {
            return;
        }

        let delivered = queue.next(&mut |request| {
            // `tracing` spans only carry fields declared at the `span!` call
            // site -- `loggingContext` keys are caller-chosen and unknown
            // ahead of time, so they can't be `record()`ed individually.
            // Re-establish them as one structured field instead.
            let _span = info_span!(
                "lifecycle_run",
                request_id = %request.request_id,
                lifecycle_name = %request.lifecycle_name,
                logging_context = ?request.logging_context,
            )
            .entered();

            if !active.load(Ordering::Acquire) {
                info!("rejecting request, worker is no longer active");
                publisher.publish_outcome(inactive_outcome(&request.request_id));
                return;
            }

            let request_id = request.request_id.clone();
            let outcome = executor.execute(
                &request,
                &mut |event| publisher.publish_event(&request_id, event),
                &|| !active.load(Ordering::Acquire) || shutdown_was_requested(),
            );

            publisher.publish_outcome(outcome);
            log_surviving_children();
        });

        if !delivered {
            return;
        }
    }
}

/// `CHLD` is reset to default disposition so the OS can reap the playbook
/// subprocess tree the moment it exits; this is a diagnostic safety net on
/// top of that, per the spec's "enumerate children and log any still live"
/// requirement. Walks `/proc` for processes whose parent is this worker --
/// anything found means a subprocess outlived its run and didn't get
/// reaped.
fn log_surviving_children() {
    let my_pid = std::process::id();

    let entries = match fs::read_dir("/proc") {
        Ok(entries) => entries,
        Err(e) => {
            warn!(error = %e, "unable to enumerate /proc for surviving children");
            return;
        }
    };

    for entry in entries.filter_map(|e| e.ok()) {
        let Some(pid) = entry.file_name().to_str().and_then(|s| s.parse::<u32>().ok()) else {
            continue;
        };

        let Ok(stat) = fs::read_to_string(entry.path().join("stat")) else {
            continue;
        };

        // Format is "pid (comm) state ppid ...". `comm` may itself contain
        // spaces or parens, so split on the last ')' rather than whitespace.
        let Some(after_comm) = stat.rfind(')').map(|i| &stat[i + 1..]) else {
            continue;
        };
        let mut fields = after_comm.split_whitespace();
        let (Some(state), Some(ppid)) = (fields.next(), fields.next().and_then(|s| s.parse::<u32>().ok())) else {
            continue;
        };

        if ppid == my_pid {
            warn!(pid, state, "child process still present after lifecycle run");
        }
    }
}
