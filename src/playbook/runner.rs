//! Single playbook invocation: spawns the external playbook process, feeds
//! its line-delimited JSON event stream through an [`EventReducer`], and
//! blocks until the process tree terminates.

use crate::cmd::{CommandKiller, DriverCommand, ExecutableCommand};
use crate::playbook::event::RawEvent;
use crate::playbook::reducer::{EventReducer, PlaybookError, ReducerConfig, ReducerOutcome};
use crate::progress::ProgressEvent;
use crate::request::ConnectionType;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::warn;

pub struct PlaybookRunner {
    executable: PathBuf,
    reducer_config: ReducerConfig,
}

impl PlaybookRunner {
    pub fn new(executable: impl Into<PathBuf>, reducer_config: ReducerConfig) -> Self {
        PlaybookRunner {
            executable: executable.into(),
            reducer_config,
        }
    }

    /// Runs one playbook invocation. `vars` becomes the top-level variable
    /// scope passed to the process; events are streamed synchronously
    /// through the reducer to `event_sink`. `is_canceled` is polled between
    /// output lines so a pool shutdown can terminate the run early.
    #[allow(clippy::too_many_arguments)]
    pub fn run(
        &self,
        request_id: &str,
        connection_type: ConnectionType,
        inventory_path: &Path,
        playbook_path: &Path,
        vars: &Value,
        event_sink: &mut dyn FnMut(ProgressEvent),
        is_canceled: &dyn Fn() -> bool,
    ) -> Result<ReducerOutcome, PlaybookError> {
        let vars_json = serde_json::to_string(vars).unwrap_or_else(|_| "{}".to_string());
        let connection_flag = match connection_type {
            ConnectionType::Ssh => "ssh",
            ConnectionType::Kubectl => "kubectl",
        };

        let mut command = DriverCommand::new(
            &self.executable,
            &[
                "-i",
                &inventory_path.to_string_lossy(),
                "--extra-vars",
                &vars_json,
                &playbook_path.to_string_lossy(),
            ],
            &[("DRIVER_CONNECTION_TYPE", connection_flag), ("DRIVER_REQUEST_ID", request_id)],
        );

        let mut reducer = EventReducer::new(self.reducer_config.clone());

        let killer = CommandKiller::from_cancelable(is_canceled);
        command.exec_with_abort(
            &mut |line| self.handle_line(&mut reducer, &line, event_sink),
            &mut |line| warn!(request_id, "playbook stderr: {}", line),
            &killer,
        )?;

        reducer.finish()
    }

    fn handle_line(&self, reducer: &mut EventReducer, line: &str, event_sink: &mut dyn FnMut(ProgressEvent)) {
        if line.trim().is_empty() {
            return;
        }

        match serde_json::from_str::<RawEvent>(line) {
            Ok(event) => reducer.handle(event, event_sink),
            Err(e) => warn!(error = %e, line, "unparsable playbook event line, skipping"),
        }
    }
}
