//! Near-copy of [`crate::lifecycle_executor::LifecycleExecutor`] for the
//! fixed `Find` lifecycle: returns a reference result synchronously to the
//! caller instead of publishing to the response channel, and raises a
//! domain error rather than folding failures into an outcome.

use crate::config::Config;
use crate::deployment_location::DeploymentLocation;
use crate::errors::ExecutorError;
use crate::inventory;
use crate::key_property_processor::KeyPropertyProcessor;
use crate::playbook::{PlaybookRunner, ReducerConfig};
use crate::properties::PropertyBag;
use crate::render_context::RenderContext;
use crate::request::{LifecycleRequest, TopologyMap};
use crate::retry_controller::RetryController;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::instrument;

/// `{instanceId, associatedTopology, properties}` returned synchronously.
#[derive(Debug, Clone)]
pub struct FindReferenceResult {
    pub instance_id: Option<String>,
    pub associated_topology: TopologyMap,
    pub properties: BTreeMap<String, Value>,
}

pub struct FindExecutor {
    config: Config,
    runner: PlaybookRunner,
}

impl FindExecutor {
    pub fn new(config: Config) -> Self {
        let reducer_config = ReducerConfig {
            output_prefix: config.output_prop_prefix.clone(),
            topology_prefix: config.associated_topology_prefix.clone(),
            log_progress_events: config.log_progress_events,
        };
        let runner = PlaybookRunner::new(config.playbook_executable.clone(), reducer_config);

        FindExecutor { config, runner }
    }

    #[instrument(skip_all, fields(lifecycle_name = %request.lifecycle_name))]
    pub fn execute(&self, request: &LifecycleRequest) -> Result<FindReferenceResult, ExecutorError> {
        let mut location_properties = request.deployment_location.properties.clone();
        let location = DeploymentLocation::resolve(&request.deployment_location, &mut location_properties, request.driver_files.root())?;

        let playbook_path = request
            .driver_files
            .playbook_path(&request.lifecycle_name)
            .ok_or_else(|| ExecutorError::PlaybookNotFound("No playbook to run".to_string()))?;

        // See `LifecycleExecutor::try_execute` for why these are
        // `scopeguard`s rather than a final cleanup block: cleanup must run
        // even if a stage below panics, and the LIFO drop order reproduces
        // the spec's required location-then-driver-files sequence.
        let keep_files = request.keep_files;
        let driver_files = request.driver_files.clone();
        let _files_guard = scopeguard::guard((), move |_| {
            if !keep_files {
                if let Err(e) = driver_files.remove() {
                    tracing::warn!(error = %e, "failed to remove driver files");
                }
            }
        });
        let _location_guard = scopeguard::guard(location, |location| location.cleanup());

        self.run_stages(request, &playbook_path, &mut location_properties)
    }

    fn run_stages(
        &self,
        request: &LifecycleRequest,
        playbook_path: &std::path::Path,
        location_properties: &mut PropertyBag,
    ) -> Result<FindReferenceResult, ExecutorError> {
        let inventory_path = inventory::resolve(&request.driver_files.config_dir(), &request.deployment_location.location_type)?;

        let mut resource_properties = request.resource_properties.clone();
        let mut system_properties = request.system_properties.clone();

        let mut key_processor = KeyPropertyProcessor::new();
        key_processor.process(&mut resource_properties, request.driver_files.root())?;
        key_processor.process(&mut system_properties, request.driver_files.root())?;
        key_processor.process(location_properties, request.driver_files.root())?;

        let scoped_request = LifecycleRequest {
            resource_properties,
            system_properties,
            ..request.clone()
        };

        let render_context = RenderContext::build(&scoped_request, &*location_properties);
        render_context.render_config_tree(&request.driver_files.config_dir())?;

        let retry_controller = RetryController::new(self.config.max_unreachable_retries, self.config.unreachable_sleep);
        let vars = render_context.to_vars();

        let reducer_outcome = retry_controller.run_with_retries(
            &self.runner,
            "find",
            scoped_request.connection_type(),
            &inventory_path,
            playbook_path,
            &vars,
            &mut |_event| {},
            &|| false,
        );

        key_processor.clear();

        let reducer_outcome = reducer_outcome?;

        if !reducer_outcome.is_success() {
            let failure = reducer_outcome
                .failure
                .unwrap_or_else(|| crate::errors::FailureDetails::internal("find lifecycle failed"));
            return Err(ExecutorError::Playbook(crate::playbook::PlaybookError::Reduced(failure)));
        }

        let mut outputs = reducer_outcome.outputs;
        let instance_id = outputs.remove("instance_id").and_then(|v| v.as_str().map(str::to_string));

        Ok(FindReferenceResult {
            instance_id,
            associated_topology: reducer_outcome.associated_topology,
            properties: outputs,
        })
    }
}
