//! Resolves the addressable target environment for a request and, for
//! `kubectl` locations, materialises a kubeconfig file that downstream
//! templates and the playbook runner can reference.

use crate::properties::PropertyBag;
use crate::request::{ConnectionType, DeploymentLocationSpec};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum LocationError {
    #[error("deployment location is missing a type")]
    MissingType,
    #[error("kubectl location is missing k8s-server")]
    MissingServer,
    #[error("kubectl location has neither certificate credentials nor a token")]
    MissingCredentials,
    #[error("failed to write kubeconfig: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to encode kubeconfig: {0}")]
    Encode(#[from] serde_yaml::Error),
}

#[derive(Serialize)]
struct Kubeconfig {
    #[serde(rename = "apiVersion")]
    api_version: &'static str,
    kind: &'static str,
    #[serde(rename = "current-context")]
    current_context: String,
    preferences: serde_yaml::Mapping,
    clusters: Vec<NamedCluster>,
    contexts: Vec<NamedContext>,
    users: Vec<NamedUser>,
}

#[derive(Serialize)]
struct NamedCluster {
    name: String,
    cluster: ClusterBlock,
}

#[derive(Serialize)]
struct ClusterBlock {
    server: String,
    #[serde(rename = "certificate-authority-data", skip_serializing_if = "Option::is_none")]
    certificate_authority_data: Option<String>,
    #[serde(rename = "insecure-skip-tls-verify")]
    insecure_skip_tls_verify: bool,
}

#[derive(Serialize)]
struct NamedContext {
    name: String,
    context: ContextBlock,
}

#[derive(Serialize)]
struct ContextBlock {
    cluster: String,
    user: String,
}

#[derive(Serialize)]
struct NamedUser {
    name: String,
    user: UserBlock,
}

#[derive(Serialize)]
struct UserBlock {
    #[serde(rename = "client-certificate-data", skip_serializing_if = "Option::is_none")]
    client_certificate_data: Option<String>,
    #[serde(rename = "client-key-data", skip_serializing_if = "Option::is_none")]
    client_key_data: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    token: Option<String>,
}

/// Owns, and is responsible for deleting, the kubeconfig file (if any) it
/// wrote for one request.
pub struct DeploymentLocation {
    connection_type: ConnectionType,
    kubeconfig_path: Option<PathBuf>,
}

impl DeploymentLocation {
    /// Resolves the location and, for a `kubectl` connection, writes a
    /// kubeconfig under `workspace_dir` and injects `kubeconfig_path` into
    /// `properties` so downstream templates can reference it.
    pub fn resolve(
        spec: &DeploymentLocationSpec,
        properties: &mut PropertyBag,
        workspace_dir: &Path,
    ) -> Result<Self, LocationError> {
        if spec.location_type.trim().is_empty() {
            return Err(LocationError::MissingType);
        }

        let connection_type = if spec.location_type == "Kubernetes" {
            ConnectionType::Kubectl
        } else {
            match properties.get("connection_type").and_then(|v| v.as_str()) {
                Some("kubectl") => ConnectionType::Kubectl,
                _ => ConnectionType::Ssh,
            }
        };

        let kubeconfig_path = match connection_type {
            ConnectionType::Ssh => None,
            ConnectionType::Kubectl => {
                let path = workspace_dir.join(format!("kubeconfig-{}.yaml", Uuid::new_v4()));
                let document = build_kubeconfig(properties)?;
                fs::create_dir_all(workspace_dir)?;
                fs::write(&path, document)?;

                properties.insert(
                    "kubeconfig_path".to_string(),
                    crate::properties::PropertyValue::String(path.to_string_lossy().to_string()),
                );

                Some(path)
            }
        };

        Ok(DeploymentLocation {
            connection_type,
            kubeconfig_path,
        })
    }

    pub fn connection_type(&self) -> ConnectionType {
        self.connection_type
    }

    /// Deletes the kubeconfig file, if one was written. Idempotent.
    pub fn cleanup(&self) {
        if let Some(path) = &self.kubeconfig_path {
            if let Err(e) = fs::remove_file(path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!(error = %e, path = %path.display(), "failed to remove kubeconfig file");
                }
            }
        }
    }
}

fn build_kubeconfig(properties: &PropertyBag) -> Result<String, LocationError> {
    let get = |k: &str| properties.get(k).and_then(|v| v.as_str()).map(str::to_string);

    let server = get("k8s-server").ok_or(LocationError::MissingServer)?;
    let ca = get("k8s-certificate-authority-data");
    let cert = get("k8s-client-certificate-data");
    let key = get("k8s-client-key-data");
    let token = get("k8s-token");

    let (cluster, user) = if let (Some(ca), Some(cert), Some(key)) = (ca, cert, key) {
        (
            ClusterBlock {
                server,
                certificate_authority_data: Some(ca),
                insecure_skip_tls_verify: false,
            },
            UserBlock {
                client_certificate_data: Some(cert),
                client_key_data: Some(key),
                token: None,
            },
        )
    } else if let Some(token) = token {
        (
            ClusterBlock {
                server,
                certificate_authority_data: None,
                insecure_skip_tls_verify: true,
            },
            UserBlock {
                client_certificate_data: None,
                client_key_data: None,
                token: Some(token),
            },
        )
    } else {
        return Err(LocationError::MissingCredentials);
    };

    let config = Kubeconfig {
        api_version: "v1",
        kind: "Config",
        current_context: "mycluster-context".to_string(),
        preferences: serde_yaml::Mapping::new(),
        clusters: vec![NamedCluster {
            name: "mycluster".to_string(),
            cluster,
        }],
        contexts: vec![NamedContext {
            name: "mycluster-context".to_string(),
            context: ContextBlock {
                cluster: "mycluster".to_string(),
                user: "ald-user".to_string(),
            },
        }],
        users: vec![NamedUser {
            name: "ald-user".to_string(),
            user,
        }],
    };

    Ok(serde_yaml::to_string(&config)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::properties::PropertyValue;
    use tempfile::tempdir;

    fn prop(s: &str) -> PropertyValue {
        PropertyValue::String(s.to_string())
    }

    #[test]
    fn ssh_location_writes_no_file() {
        let spec = DeploymentLocationSpec {
            name: "loc".to_string(),
            location_type: "Generic".to_string(),
            properties: PropertyBag::new(),
        };
        let mut props = PropertyBag::new();
        let dir = tempdir().unwrap();

        let location = DeploymentLocation::resolve(&spec, &mut props, dir.path()).unwrap();
        assert_eq!(location.connection_type(), ConnectionType::Ssh);
        assert!(!props.contains_key("kubeconfig_path"));
    }

    #[test]
    fn kubernetes_type_forces_kubectl_and_writes_token_kubeconfig() {
        let mut props = PropertyBag::new();
        props.insert("k8s-server".to_string(), prop("https://cluster.example.com"));
        props.insert("k8s-token".to_string(), prop("abc123"));

        let spec = DeploymentLocationSpec {
            name: "loc".to_string(),
            location_type: "Kubernetes".to_string(),
            properties: props.clone(),
        };
        let dir = tempdir().unwrap();

        let location = DeploymentLocation::resolve(&spec, &mut props, dir.path()).unwrap();
        assert_eq!(location.connection_type(), ConnectionType::Kubectl);
        let path = props.get("kubeconfig_path").unwrap().as_str().unwrap().to_string();
        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains("token: abc123"));
        assert!(content.contains("insecure-skip-tls-verify: true"));

        location.cleanup();
        assert!(!Path::new(&path).exists());
    }

    #[test]
    fn missing_credentials_is_an_error() {
        let mut props = PropertyBag::new();
        props.insert("k8s-server".to_string(), prop("https://cluster.example.com"));

        let spec = DeploymentLocationSpec {
            name: "loc".to_string(),
            location_type: "Kubernetes".to_string(),
            properties: props.clone(),
        };
        let dir = tempdir().unwrap();

        let err = DeploymentLocation::resolve(&spec, &mut props, dir.path()).unwrap_err();
        assert!(matches!(err, LocationError::MissingCredentials));
    }
}
