//! The "unreachable -> retry with floor-delay" loop around [`PlaybookRunner`].
//!
//! Retrying is scoped to the `unreachable` classification only: an
//! infrastructure failure is terminal on the first attempt. The delay
//! floors at `unreachable_sleep` regardless of how long the attempt itself
//! took, so a slow unreachable attempt doesn't shorten the backoff.

use crate::playbook::{PlaybookError, PlaybookRunner, ReducerOutcome};
use crate::progress::ProgressEvent;
use crate::request::ConnectionType;
use serde_json::Value;
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};
use tracing::info;

pub struct RetryController {
    max_unreachable_retries: u32,
    unreachable_sleep: Duration,
}

impl RetryController {
    pub fn new(max_unreachable_retries: u32, unreachable_sleep: Duration) -> Self {
        RetryController {
            max_unreachable_retries,
            unreachable_sleep,
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn run_with_retries(
        &self,
        runner: &PlaybookRunner,
        request_id: &str,
        connection_type: ConnectionType,
        inventory_path: &Path,
        playbook_path: &Path,
        vars: &Value,
        event_sink: &mut dyn FnMut(ProgressEvent),
        is_canceled: &dyn Fn() -> bool,
    ) -> Result<ReducerOutcome, PlaybookError> {
        let mut attempt = 0;

        loop {
            attempt += 1;
            let started_at = Instant::now();

            let outcome = runner.run(
                request_id,
                connection_type,
                inventory_path,
                playbook_path,
                vars,
                event_sink,
                is_canceled,
            )?;

            if !outcome.unreachable || attempt >= self.max_unreachable_retries {
                return Ok(outcome);
            }

            let elapsed = started_at.elapsed();
            let sleep_for = self.unreachable_sleep.saturating_sub(elapsed);
            info!(
                request_id,
                attempt,
                sleep_secs = sleep_for.as_secs(),
                "resource unreachable, retrying after floor delay"
            );
            if !sleep_for.is_zero() {
                thread::sleep(sleep_for);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{FailureCode, FailureDetails};
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn unreachable_outcome() -> ReducerOutcome {
        ReducerOutcome {
            failed: false,
            unreachable: true,
            failure: Some(FailureDetails::new(FailureCode::ResourceNotFound, "unreachable")),
            outputs: BTreeMap::new(),
            associated_topology: crate::request::TopologyMap::new(),
        }
    }

    fn success_outcome() -> ReducerOutcome {
        ReducerOutcome {
            failed: false,
            unreachable: false,
            failure: None,
            outputs: BTreeMap::new(),
            associated_topology: crate::request::TopologyMap::new(),
        }
    }

    #[test]
    fn stops_retrying_as_soon_as_reachable() {
        let attempts = AtomicU32::new(0);
        let controller = RetryController::new(3, Duration::from_millis(1));

        let result = simulate(&controller, &attempts, |n| if n < 2 { unreachable_outcome() } else { success_outcome() });

        assert_eq!(attempts.load(Ordering::SeqCst), 2);
        assert!(result.unwrap().is_success());
    }

    #[test]
    fn stops_after_max_retries_even_if_still_unreachable() {
        let attempts = AtomicU32::new(0);
        let controller = RetryController::new(3, Duration::from_millis(1));

        let result = simulate(&controller, &attempts, |_| unreachable_outcome());

        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        assert!(result.unwrap().unreachable);
    }

    fn simulate(
        controller: &RetryController,
        attempts: &AtomicU32,
        mut next: impl FnMut(u32) -> ReducerOutcome,
    ) -> Result<ReducerOutcome, PlaybookError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            attempts.store(attempt, Ordering::SeqCst);
            let outcome = next(attempt);
            if !outcome.unreachable || attempt >= controller.max_unreachable_retries {
                return Ok(outcome);
            }
        }
    }
}
