//! The inbound work item: one lifecycle execution request.

use crate::driver_files::DriverFiles;
use crate::properties::PropertyBag;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// `deployment_location.properties.connection_type`; defaults to `Ssh`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionType {
    Ssh,
    Kubectl,
}

impl Default for ConnectionType {
    fn default() -> Self {
        ConnectionType::Ssh
    }
}

/// `{name, type, properties}` describing the addressable target environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentLocationSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub location_type: String,
    #[serde(default)]
    pub properties: PropertyBag,
}

/// `{id, type}` identifying an external resource a playbook manipulated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopologyEntry {
    pub id: String,
    #[serde(rename = "type")]
    pub entry_type: String,
}

pub type TopologyMap = BTreeMap<String, TopologyEntry>;

/// Immutable once enqueued.
#[derive(Debug, Clone)]
pub struct LifecycleRequest {
    pub request_id: String,
    pub lifecycle_name: String,
    pub driver_files: DriverFiles,
    pub resource_properties: PropertyBag,
    pub system_properties: PropertyBag,
    pub request_properties: PropertyBag,
    pub deployment_location: DeploymentLocationSpec,
    pub associated_topology: TopologyMap,
    pub keep_files: bool,
    pub logging_context: BTreeMap<String, String>,
}

impl LifecycleRequest {
    pub fn connection_type(&self) -> ConnectionType {
        match self.deployment_location.properties.get("connection_type").and_then(|v| v.as_str()) {
            Some("kubectl") => ConnectionType::Kubectl,
            _ if self.deployment_location.location_type == "Kubernetes" => ConnectionType::Kubectl,
            _ => ConnectionType::Ssh,
        }
    }
}
