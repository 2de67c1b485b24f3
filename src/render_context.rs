//! Builds the variable scope for one request and renders every templated
//! file under `config/` against it.

use crate::properties::{PropertyBag, PropertyValue};
use crate::request::{LifecycleRequest, TopologyMap};
use serde_json::{Map, Value};
use std::fs;
use tera::{Context, Tera};
use walkdir::WalkDir;

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("failed to read {path}: {source}")]
    Read { path: String, source: std::io::Error },
    #[error("failed to write {path}: {source}")]
    Write { path: String, source: std::io::Error },
    #[error("template error in {path}: {source}")]
    Template { path: String, source: tera::Error },
}

/// The flat variable scope handed to the templating engine and to the
/// playbook runner as its top-level `vars`.
pub struct RenderContext {
    scope: Map<String, Value>,
}

impl RenderContext {
    /// Merges, low precedence to high: system properties, resource
    /// properties, request properties, deployment-location properties,
    /// associated topology. Resource properties are additionally exposed
    /// under a top-level `properties` key for backward compatibility.
    pub fn build(request: &LifecycleRequest, location_properties: &PropertyBag) -> Self {
        let mut scope = Map::new();

        merge_bag(&mut scope, &request.system_properties);
        merge_bag(&mut scope, &request.resource_properties);
        merge_bag(&mut scope, &request.request_properties);
        merge_bag(&mut scope, location_properties);
        merge_topology(&mut scope, &request.associated_topology);

        let mut resource_view = Map::new();
        merge_bag(&mut resource_view, &request.resource_properties);
        scope.insert("properties".to_string(), Value::Object(resource_view));

        RenderContext { scope }
    }

    pub fn to_tera_context(&self) -> Context {
        Context::from_value(Value::Object(self.scope.clone())).unwrap_or_default()
    }

    pub fn to_vars(&self) -> Value {
        Value::Object(self.scope.clone())
    }

    /// Walks every file under `config_dir`, renders UTF-8 files against the
    /// scope and writes the result back in place; non-UTF-8 files are
    /// skipped silently. Symlinked directories are not descended into, so a
    /// link can't smuggle rendering outside the driver-files tree.
    pub fn render_config_tree(&self, config_dir: &std::path::Path) -> Result<(), RenderError> {
        let context = self.to_tera_context();

        for entry in WalkDir::new(config_dir).follow_links(false).into_iter().filter_map(|e| e.ok()) {
            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            let path_str = path.to_string_lossy().to_string();

            let bytes = fs::read(path).map_err(|source| RenderError::Read {
                path: path_str.clone(),
                source,
            })?;

            let content = match String::from_utf8(bytes) {
                Ok(s) => s,
                Err(_) => continue,
            };

            let rendered = Tera::one_off(&content, &context, false).map_err(|source| RenderError::Template {
                path: path_str.clone(),
                source,
            })?;

            if rendered != content {
                fs::write(path, rendered).map_err(|source| RenderError::Write {
                    path: path_str.clone(),
                    source,
                })?;
            }
        }

        Ok(())
    }
}

fn merge_bag(scope: &mut Map<String, Value>, bag: &PropertyBag) {
    for (name, value) in bag {
        scope.insert(name.clone(), property_view(value));
    }
}

/// `key`-typed properties are re-expressed as `{keyName, publicKey, privateKey}`
/// in the render view (`PropertyValue::to_json` already does this).
fn property_view(value: &PropertyValue) -> Value {
    value.to_json()
}

/// Merges each topology entry directly into `scope` by name, at the highest
/// precedence -- the same flat-merge treatment `merge_bag` gives the other
/// four property bags, so a topology entry can override a colliding
/// property name and a template can reference it directly.
fn merge_topology(scope: &mut Map<String, Value>, topology: &TopologyMap) {
    for (name, entry) in topology {
        scope.insert(name.clone(), serde_json::json!({ "id": entry.id, "type": entry.entry_type }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver_files::DriverFiles;
    use crate::request::{ConnectionType, DeploymentLocationSpec};
    use std::collections::BTreeMap;
    use std::fs::{create_dir_all, File};
    use std::io::Write;
    use tempfile::tempdir;

    fn sample_request(dir: &std::path::Path) -> LifecycleRequest {
        let mut resource_properties = PropertyBag::new();
        resource_properties.insert("hostname".to_string(), PropertyValue::String("web1".to_string()));

        LifecycleRequest {
            request_id: "req-1".to_string(),
            lifecycle_name: "install".to_string(),
            driver_files: DriverFiles::new(dir),
            resource_properties,
            system_properties: PropertyBag::new(),
            request_properties: PropertyBag::new(),
            deployment_location: DeploymentLocationSpec {
                name: "loc".to_string(),
                location_type: "Generic".to_string(),
                properties: PropertyBag::new(),
            },
            associated_topology: TopologyMap::new(),
            keep_files: false,
            logging_context: BTreeMap::new(),
        }
    }

    #[test]
    fn exposes_resource_properties_under_top_level_and_properties_key() {
        let dir = tempdir().unwrap();
        let request = sample_request(dir.path());
        let ctx = RenderContext::build(&request, &PropertyBag::new());
        let vars = ctx.to_vars();

        assert_eq!(vars["hostname"], "web1");
        assert_eq!(vars["properties"]["hostname"], "web1");
        let _ = ConnectionType::Ssh;
    }

    #[test]
    fn topology_entries_merge_flatly_at_highest_precedence() {
        let dir = tempdir().unwrap();
        let mut request = sample_request(dir.path());
        request.associated_topology.insert(
            "hostname".to_string(),
            crate::request::TopologyEntry {
                id: "abc123".to_string(),
                entry_type: "Openstack".to_string(),
            },
        );

        let ctx = RenderContext::build(&request, &PropertyBag::new());
        let vars = ctx.to_vars();

        assert_eq!(vars["hostname"]["id"], "abc123");
        assert_eq!(vars["hostname"]["type"], "Openstack");
        assert!(vars.get("associatedTopology").is_none());
    }

    #[test]
    fn renders_templated_file_in_place_and_skips_binary() {
        let dir = tempdir().unwrap();
        let config_dir = dir.path().join("config");
        create_dir_all(&config_dir).unwrap();

        let mut f = File::create(config_dir.join("hosts.ini")).unwrap();
        write!(f, "host={{{{ hostname }}}}").unwrap();

        fs::write(config_dir.join("binary.dat"), [0xFF, 0xFE, 0x00, 0xD8]).unwrap();

        let request = sample_request(dir.path());
        let ctx = RenderContext::build(&request, &PropertyBag::new());
        ctx.render_config_tree(&config_dir).unwrap();

        assert_eq!(fs::read_to_string(config_dir.join("hosts.ini")).unwrap(), "host=web1");
        assert_eq!(fs::read(config_dir.join("binary.dat")).unwrap(), vec![0xFF, 0xFE, 0x00, 0xD8]);
    }

    #[test]
    fn rendering_an_already_resolved_tree_is_a_no_op() {
        let dir = tempdir().unwrap();
        let config_dir = dir.path().join("config");
        create_dir_all(&config_dir).unwrap();
        fs::write(config_dir.join("hosts.ini"), "host=web1").unwrap();

        let request = sample_request(dir.path());
        let ctx = RenderContext::build(&request, &PropertyBag::new());
        let before = fs::read(config_dir.join("hosts.ini")).unwrap();
        ctx.render_config_tree(&config_dir).unwrap();
        let after = fs::read(config_dir.join("hosts.ini")).unwrap();
        assert_eq!(before, after);
    }
}
