//! The one-and-only published result of a lifecycle execution.

use crate::errors::FailureDetails;
use crate::request::TopologyMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LifecycleStatus {
    Complete,
    Failed,
    InProgress,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleOutcome {
    pub request_id: String,
    pub status: LifecycleStatus,
    pub failure: Option<FailureDetails>,
    pub outputs: BTreeMap<String, serde_json::Value>,
    pub associated_topology: TopologyMap,
}

impl LifecycleOutcome {
    pub fn complete(request_id: impl Into<String>, outputs: BTreeMap<String, serde_json::Value>, associated_topology: TopologyMap) -> Self {
        LifecycleOutcome {
            request_id: request_id.into(),
            status: LifecycleStatus::Complete,
            failure: None,
            outputs,
            associated_topology,
        }
    }

    pub fn failed(request_id: impl Into<String>, failure: FailureDetails) -> Self {
        LifecycleOutcome {
            request_id: request_id.into(),
            status: LifecycleStatus::Failed,
            failure: Some(failure),
            outputs: BTreeMap::new(),
            associated_topology: TopologyMap::new(),
        }
    }

    pub fn failed_with(
        request_id: impl Into<String>,
        failure: FailureDetails,
        outputs: BTreeMap<String, serde_json::Value>,
        associated_topology: TopologyMap,
    ) -> Self {
        LifecycleOutcome {
            request_id: request_id.into(),
            status: LifecycleStatus::Failed,
            failure: Some(failure),
            outputs,
            associated_topology,
        }
    }
}
