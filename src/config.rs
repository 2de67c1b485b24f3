//! Process-wide configuration.
//!
//! A config-file loader is explicitly out of scope; this module reads the
//! same dotted keys from environment variables (the dotted key upper-cased
//! with `.` replaced by `_`, e.g. `process.process_pool_size` becomes
//! `PROCESS_PROCESS_POOL_SIZE`). Every key has a default so the driver runs
//! sensibly unconfigured.

use std::env;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub process_pool_size: usize,
    pub max_unreachable_retries: u32,
    pub unreachable_sleep: Duration,
    pub output_prop_prefix: String,
    pub associated_topology_prefix: String,
    pub log_progress_events: bool,
    /// `resource_driver.keep_files`: the global default the out-of-scope API
    /// edge applies to a request's `keepFiles` before enqueueing it. The
    /// core never reads this itself -- by the time a `LifecycleRequest`
    /// reaches `LifecycleExecutor`, `keepFiles` is already resolved -- but
    /// it's surfaced here so an embedding binary has one place to read it
    /// from alongside the rest of process configuration.
    pub keep_files_default: bool,
    pub shutdown_grace_period: Duration,
    /// `resource_driver.workspace_root`: root under which synthesised driver
    /// files live when the out-of-scope API edge hasn't pre-staged a
    /// directory itself. Not read by the core executor -- `LifecycleRequest`
    /// always arrives with a concrete `driverFiles` handle -- only by local
    /// or dev wiring that needs somewhere to create one.
    pub workspace_root: String,
    pub playbook_executable: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            process_pool_size: 2,
            max_unreachable_retries: 1000,
            unreachable_sleep: Duration::from_secs(5),
            output_prop_prefix: "output__".to_string(),
            associated_topology_prefix: "associated_topology__".to_string(),
            log_progress_events: true,
            keep_files_default: false,
            shutdown_grace_period: Duration::from_secs(30),
            workspace_root: ".".to_string(),
            playbook_executable: "ansible-playbook".to_string(),
        }
    }
}

impl Config {
    /// Loads configuration from environment variables, falling back to
    /// [`Config::default`] for anything unset or unparsable.
    pub fn from_env() -> Self {
        let defaults = Config::default();

        Config {
            process_pool_size: env_usize("PROCESS_PROCESS_POOL_SIZE", defaults.process_pool_size),
            max_unreachable_retries: env_u32(
                "ANSIBLE_MAX_UNREACHABLE_RETRIES",
                defaults.max_unreachable_retries,
            ),
            unreachable_sleep: Duration::from_secs(env_u64(
                "ANSIBLE_UNREACHABLE_SLEEP_SECONDS",
                defaults.unreachable_sleep.as_secs(),
            )),
            output_prop_prefix: env_string("ANSIBLE_OUTPUT_PROP_PREFIX", &defaults.output_prop_prefix),
            associated_topology_prefix: env_string(
                "ANSIBLE_ASSOCIATED_TOPOLOGY_PREFIX",
                &defaults.associated_topology_prefix,
            ),
            log_progress_events: env_bool("ANSIBLE_LOG_PROGRESS_EVENTS", defaults.log_progress_events),
            keep_files_default: env_bool("RESOURCE_DRIVER_KEEP_FILES", defaults.keep_files_default),
            shutdown_grace_period: Duration::from_secs(env_u64(
                "RESOURCE_DRIVER_SHUTDOWN_GRACE_PERIOD_SECONDS",
                defaults.shutdown_grace_period.as_secs(),
            )),
            workspace_root: env_string("RESOURCE_DRIVER_WORKSPACE_ROOT", &defaults.workspace_root),
            playbook_executable: env_string("RESOURCE_DRIVER_PLAYBOOK_EXECUTABLE", &defaults.playbook_executable),
        }
    }
}

fn env_string(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_bool(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(v) => matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"),
        Err(_) => default,
    }
}

fn env_usize(key: &str, default: usize) -> usize {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_u32(key: &str, default: u32) -> u32 {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn defaults_match_spec() {
        let cfg = Config::default();
        assert_eq!(cfg.process_pool_size, 2);
        assert_eq!(cfg.max_unreachable_retries, 1000);
        assert_eq!(cfg.unreachable_sleep, Duration::from_secs(5));
        assert_eq!(cfg.output_prop_prefix, "output__");
        assert_eq!(cfg.associated_topology_prefix, "associated_topology__");
        assert!(cfg.log_progress_events);
        assert!(!cfg.keep_files_default);
    }

    #[test]
    #[serial]
    fn reads_overrides_from_env() {
        unsafe {
            env::set_var("PROCESS_PROCESS_POOL_SIZE", "7");
            env::set_var("ANSIBLE_UNREACHABLE_SLEEP_SECONDS", "2");
            env::set_var("RESOURCE_DRIVER_KEEP_FILES", "true");
        }

        let cfg = Config::from_env();

        assert_eq!(cfg.process_pool_size, 7);
        assert_eq!(cfg.unreachable_sleep, Duration::from_secs(2));
        assert!(cfg.keep_files_default);

        unsafe {
            env::remove_var("PROCESS_PROCESS_POOL_SIZE");
            env::remove_var("ANSIBLE_UNREACHABLE_SLEEP_SECONDS");
            env::remove_var("RESOURCE_DRIVER_KEEP_FILES");
        }
    }
}
