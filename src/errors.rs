//! Public error taxonomy for the lifecycle driver.
//!
//! Every stage-local component (deployment location, inventory, key
//! materialisation, rendering, the playbook runner) defines its own
//! `thiserror` enum close to where the failure actually happens. This module
//! holds the two things that are genuinely process-wide: the small set of
//! [`FailureCode`]s the orchestrator is allowed to surface on the response
//! channel, and [`ExecutorError`], the aggregate error [`crate::lifecycle_executor::LifecycleExecutor`]
//! folds every stage's error into before converting it to a [`FailureDetails`].

use crate::deployment_location::LocationError;
use crate::inventory::InventoryError;
use crate::key_property_processor::KeyProcessorError;
use crate::playbook::reducer::PlaybookError;
use crate::render_context::RenderError;
use std::fmt;

/// Surface-visible failure classification.
///
/// Retrying is unlikely to help for `InternalError`; `InfrastructureError`
/// means the playbook ran against reachable targets and failed there;
/// `ResourceNotFound` means the host never became reachable after all
/// retries; `InsufficientCapacity` means the driver itself couldn't accept
/// the request (shutting down, queue saturated).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum FailureCode {
    InternalError,
    InfrastructureError,
    ResourceNotFound,
    InsufficientCapacity,
}

impl fmt::Display for FailureCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureCode::InternalError => "INTERNAL_ERROR",
            FailureCode::InfrastructureError => "INFRASTRUCTURE_ERROR",
            FailureCode::ResourceNotFound => "RESOURCE_NOT_FOUND",
            FailureCode::InsufficientCapacity => "INSUFFICIENT_CAPACITY",
        };
        f.write_str(s)
    }
}

/// `{code, description}` pair attached to a `FAILED` [`crate::outcome::LifecycleOutcome`].
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct FailureDetails {
    pub code: FailureCode,
    pub description: String,
}

impl fmt::Display for FailureDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.description)
    }
}

impl FailureDetails {
    pub fn new(code: FailureCode, description: impl Into<String>) -> Self {
        FailureDetails {
            code,
            description: description.into(),
        }
    }

    pub fn internal(description: impl Into<String>) -> Self {
        FailureDetails::new(FailureCode::InternalError, description)
    }
}

/// Request-validation failure, raised before any stage touches infrastructure.
#[derive(Debug, thiserror::Error)]
pub enum RequestValidationError {
    #[error("request is missing a requestId")]
    MissingRequestId,
    #[error("request is missing a lifecycleName")]
    MissingLifecycleName,
    #[error("request is missing driverFiles")]
    MissingDriverFiles,
}

/// Aggregate error for one [`crate::lifecycle_executor::LifecycleExecutor::execute`] call.
///
/// Every stage of the executor returns into this type via `#[from]`; the
/// executor is the only place that knows how to turn one of these into a
/// public [`FailureDetails`].
#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
    #[error("invalid request: {0}")]
    InvalidRequest(#[from] RequestValidationError),

    #[error("no playbook to run: {0}")]
    PlaybookNotFound(String),

    #[error(transparent)]
    Location(#[from] LocationError),

    #[error(transparent)]
    Inventory(#[from] InventoryError),

    #[error(transparent)]
    Keys(#[from] KeyProcessorError),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error(transparent)]
    Playbook(#[from] PlaybookError),

    #[error("driver is inactive")]
    DriverInactive,

    #[error("internal error: {0}")]
    Internal(String),
}

impl ExecutorError {
    /// Maps an internal error onto the public failure taxonomy.
    ///
    /// Only [`ExecutorError::Playbook`] can end up classified as anything
    /// other than `INTERNAL_ERROR`, and only when the wrapped
    /// [`PlaybookError`] itself carries a `RESOURCE_NOT_FOUND`/`INFRASTRUCTURE_ERROR`
    /// failure produced by the reducer.
    pub fn to_failure_details(&self) -> FailureDetails {
        match self {
            ExecutorError::DriverInactive => {
                FailureDetails::new(FailureCode::InsufficientCapacity, "Driver is inactive".to_string())
            }
            ExecutorError::Playbook(PlaybookError::Reduced(details)) => details.clone(),
            other => FailureDetails::internal(other.to_string()),
        }
    }
}
