//! Structured logging bootstrap.
//!
//! The driver logs through `tracing` exclusively. `init()` installs a
//! process-wide subscriber once; every other module just uses the
//! `tracing::{info,warn,error,debug}!` macros and opens spans carrying
//! contextual fields such as `request_id`, `lifecycle_name`, and the
//! request's `logging_context`.

use std::env;
use std::io;
use tracing_subscriber::EnvFilter;

const CI_VAR: &str = "CI";

/// Installs the global tracing subscriber. Safe to call once per process;
/// subsequent calls are no-ops (mirrors `tracing_subscriber`'s own guard).
///
/// Switches to JSON-formatted output under CI, the same condition the
/// teacher's own `tracing-subscriber` bootstrap keys off of; a local/dev run
/// gets the plain human-readable formatter.
pub fn init() {
    let filter = || EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    // A second worker process in the pool calls this too; ignore the error
    // rather than panic if a subscriber is somehow already installed.
    let _ = match env::var_os(CI_VAR) {
        Some(_) => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter())
            .with_target(true)
            .with_writer(io::stderr)
            .try_init(),
        None => tracing_subscriber::fmt()
            .with_env_filter(filter())
            .with_target(true)
            .with_writer(io::stderr)
            .try_init(),
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_idempotent() {
        init();
        init();
    }
}
