//! Orchestrates one full request: location -> inventory -> keys -> templates
//! -> retry loop -> cleanup. Always returns a [`LifecycleOutcome`]; never
//! raises past its boundary.

use crate::config::Config;
use crate::deployment_location::DeploymentLocation;
use crate::errors::{ExecutorError, FailureCode, FailureDetails, RequestValidationError};
use crate::inventory;
use crate::key_property_processor::KeyPropertyProcessor;
use crate::outcome::LifecycleOutcome;
use crate::playbook::{PlaybookRunner, ReducerConfig, ReducerOutcome};
use crate::progress::ProgressEvent;
use crate::render_context::RenderContext;
use crate::request::LifecycleRequest;
use crate::retry_controller::RetryController;
use std::collections::BTreeMap;
use tracing::{info, instrument};

pub struct LifecycleExecutor {
    config: Config,
    runner: PlaybookRunner,
}

impl LifecycleExecutor {
    pub fn new(config: Config) -> Self {
        let reducer_config = ReducerConfig {
            output_prefix: config.output_prop_prefix.clone(),
            topology_prefix: config.associated_topology_prefix.clone(),
            log_progress_events: config.log_progress_events,
        };
        let runner = PlaybookRunner::new(config.playbook_executable.clone(), reducer_config);

        LifecycleExecutor { config, runner }
    }

    /// Runs every stage for `request`, converting any escaping error into a
    /// `FAILED` outcome. `is_canceled` lets the caller (the worker) abort a
    /// run mid-flight on shutdown.
    #[instrument(skip_all, fields(request_id = %request.request_id, lifecycle_name = %request.lifecycle_name))]
    pub fn execute(
        &self,
        request: &LifecycleRequest,
        event_sink: &mut dyn FnMut(ProgressEvent),
        is_canceled: &dyn Fn() -> bool,
    ) -> LifecycleOutcome {
        match self.try_execute(request, event_sink, is_canceled) {
            Ok(outcome) => outcome,
            Err(err) => {
                tracing::error!(error = %err, "lifecycle execution failed");
                LifecycleOutcome::failed(request.request_id.clone(), err.to_failure_details())
            }
        }
    }

    fn try_execute(
        &self,
        request: &LifecycleRequest,
        event_sink: &mut dyn FnMut(ProgressEvent),
        is_canceled: &dyn Fn() -> bool,
    ) -> Result<LifecycleOutcome, ExecutorError> {
        validate(request)?;

        let mut location_properties = request.deployment_location.properties.clone();
        let location = DeploymentLocation::resolve(&request.deployment_location, &mut location_properties, request.driver_files.root())?;

        let playbook_path = request
            .driver_files
            .playbook_path(&request.lifecycle_name)
            .ok_or_else(|| ExecutorError::PlaybookNotFound("No playbook to run".to_string()))?;

        // Cleanup must run on every exit path -- including an unexpected
        // panic inside a stage below -- not just a normal `Ok`/`Err` return,
        // so each stage's release is a `scopeguard` rather than a final
        // statement. Drop order is LIFO, so declaring the driver-files guard
        // first and the location guard second reproduces the spec's
        // required reverse order: keys (cleared inside `run_stages`), then
        // location/kubeconfig, then driver files.
        let keep_files = request.keep_files;
        let driver_files = request.driver_files.clone();
        let _files_guard = scopeguard::guard((), move |_| {
            if !keep_files {
                if let Err(e) = driver_files.remove() {
                    tracing::warn!(error = %e, "failed to remove driver files");
                }
            }
        });
        let location_guard = scopeguard::guard(location, |location| location.cleanup());

        self.run_stages(request, &playbook_path, &mut location_properties, &location_guard, event_sink, is_canceled)
    }

    fn run_stages(
        &self,
        request: &LifecycleRequest,
        playbook_path: &std::path::Path,
        location_properties: &mut crate::properties::PropertyBag,
        location: &DeploymentLocation,
        event_sink: &mut dyn FnMut(ProgressEvent),
        is_canceled: &dyn Fn() -> bool,
    ) -> Result<LifecycleOutcome, ExecutorError> {
        let inventory_path = inventory::resolve(&request.driver_files.config_dir(), &request.deployment_location.location_type)?;

        let mut resource_properties = request.resource_properties.clone();
        let mut system_properties = request.system_properties.clone();
        let request_properties = request.request_properties.clone();

        // Key materialisation covers resource/system/deployment-location
        // bags only; requestProperties is not a target per the contract.
        let mut key_processor = KeyPropertyProcessor::new();
        key_processor.process(&mut resource_properties, request.driver_files.root())?;
        key_processor.process(&mut system_properties, request.driver_files.root())?;
        key_processor.process(location_properties, request.driver_files.root())?;

        let scoped_request = LifecycleRequest {
            resource_properties,
            system_properties,
            request_properties,
            ..request.clone()
        };

        let render_context = RenderContext::build(&scoped_request, &*location_properties);
        render_context.render_config_tree(&request.driver_files.config_dir())?;

        let retry_controller = RetryController::new(self.config.max_unreachable_retries, self.config.unreachable_sleep);

        let vars = render_context.to_vars();
        let reducer_outcome = retry_controller.run_with_retries(
            &self.runner,
            &request.request_id,
            scoped_request.connection_type(),
            &inventory_path,
            playbook_path,
            &vars,
            event_sink,
            is_canceled,
        );

        // key_processor.clear() also runs on Drop, but calling it explicitly
        // keeps cleanup ordering visible at the call site.
        key_processor.clear();

        let reducer_outcome = reducer_outcome?;
        Ok(outcome_from_reducer(&request.request_id, reducer_outcome))
    }
}

fn validate(request: &LifecycleRequest) -> Result<(), RequestValidationError> {
    if request.request_id.trim().is_empty() {
        return Err(RequestValidationError::MissingRequestId);
    }
    if request.lifecycle_name.trim().is_empty() {
        return Err(RequestValidationError::MissingLifecycleName);
    }
    // driver_files is a required, non-optional field on LifecycleRequest, so
    // an empty root is the only representable form of "missing".
    if request.driver_files.root().as_os_str().is_empty() {
        return Err(RequestValidationError::MissingDriverFiles);
    }
    Ok(())
}

fn outcome_from_reducer(request_id: &str, outcome: ReducerOutcome) -> LifecycleOutcome {
    let outputs: BTreeMap<String, serde_json::Value> = outcome.outputs.into_iter().collect();
    let topology = outcome.associated_topology;

    if outcome.is_success() {
        LifecycleOutcome::complete(request_id, outputs, topology)
    } else {
        let failure = outcome.failure.unwrap_or_else(|| FailureDetails::new(FailureCode::InternalError, "unknown playbook failure"));
        LifecycleOutcome::failed_with(request_id, failure, outputs, topology)
    }
}

/// Used by the worker when a request is delivered while the pool is no
/// longer accepting work.
pub fn inactive_outcome(request_id: &str) -> LifecycleOutcome {
    LifecycleOutcome::failed(
        request_id,
        FailureDetails::new(FailureCode::InsufficientCapacity, "Driver is inactive"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver_files::DriverFiles;
    use crate::properties::PropertyBag;
    use crate::request::DeploymentLocationSpec;
    use std::collections::BTreeMap;

    fn base_request() -> LifecycleRequest {
        LifecycleRequest {
            request_id: "r1".to_string(),
            lifecycle_name: "install".to_string(),
            driver_files: DriverFiles::new("/tmp/anything"),
            resource_properties: PropertyBag::new(),
            system_properties: PropertyBag::new(),
            request_properties: PropertyBag::new(),
            deployment_location: DeploymentLocationSpec {
                name: "loc".to_string(),
                location_type: "Generic".to_string(),
                properties: PropertyBag::new(),
            },
            associated_topology: crate::request::TopologyMap::new(),
            keep_files: false,
            logging_context: BTreeMap::new(),
        }
    }

    #[test]
    fn missing_request_id_is_rejected() {
        let mut request = base_request();
        request.request_id = String::new();
        assert!(matches!(validate(&request), Err(RequestValidationError::MissingRequestId)));
    }

    #[test]
    fn missing_lifecycle_name_is_rejected() {
        let mut request = base_request();
        request.lifecycle_name = String::new();
        assert!(matches!(validate(&request), Err(RequestValidationError::MissingLifecycleName)));
    }

    #[test]
    fn missing_playbook_yields_internal_error_without_running() {
        let config = Config::default();
        let executor = LifecycleExecutor::new(config);
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("scripts")).unwrap();

        let mut request = base_request();
        request.driver_files = DriverFiles::new(dir.path());

        let outcome = executor.execute(&request, &mut |_| {}, &|| false);
        assert_eq!(outcome.status, crate::outcome::LifecycleStatus::Failed);
        assert_eq!(outcome.failure.unwrap().code, FailureCode::InternalError);
    }
}
