//! Selects or synthesises the inventory file handed to the playbook runner.

use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum InventoryError {
    #[error("Missing config directory")]
    MissingConfigDir,
    #[error("failed to synthesise default inventory: {0}")]
    Io(#[from] std::io::Error),
}

const DEFAULT_INVENTORY: &str =
    "[run_hosts]\nlocalhost ansible_connection=local ansible_python_interpreter=\"/usr/bin/env python3\" host_key_checking=False\n";

/// Selection order: `config/inventory.<infra_type>`, then (for Kubernetes)
/// `config/inventory.k8s`, then `config/inventory`, synthesising the last if
/// nothing exists.
pub fn resolve(config_dir: &Path, infrastructure_type: &str) -> Result<PathBuf, InventoryError> {
    if !config_dir.is_dir() {
        return Err(InventoryError::MissingConfigDir);
    }

    let typed = config_dir.join(format!("inventory.{infrastructure_type}"));
    if typed.is_file() {
        return Ok(typed);
    }

    if infrastructure_type == "Kubernetes" {
        let k8s = config_dir.join("inventory.k8s");
        if k8s.is_file() {
            return Ok(k8s);
        }
    }

    let plain = config_dir.join("inventory");
    if plain.is_file() {
        return Ok(plain);
    }

    fs::write(&plain, DEFAULT_INVENTORY)?;
    Ok(plain)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{create_dir_all, File};
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn missing_config_dir_is_an_error() {
        let dir = tempdir().unwrap();
        let err = resolve(&dir.path().join("config"), "Generic").unwrap_err();
        assert!(matches!(err, InventoryError::MissingConfigDir));
    }

    #[test]
    fn synthesises_default_when_nothing_present() {
        let dir = tempdir().unwrap();
        create_dir_all(dir.path()).unwrap();

        let path = resolve(dir.path(), "Generic").unwrap();
        assert_eq!(path, dir.path().join("inventory"));
        assert_eq!(fs::read_to_string(path).unwrap(), DEFAULT_INVENTORY);
    }

    #[test]
    fn kubernetes_prefers_typed_then_k8s_then_plain() {
        let dir = tempdir().unwrap();
        File::create(dir.path().join("inventory.k8s"))
            .unwrap()
            .write_all(b"k8s")
            .unwrap();
        File::create(dir.path().join("inventory")).unwrap().write_all(b"plain").unwrap();

        let path = resolve(dir.path(), "Kubernetes").unwrap();
        assert_eq!(fs::read_to_string(path).unwrap(), "k8s");

        File::create(dir.path().join("inventory.Kubernetes"))
            .unwrap()
            .write_all(b"typed")
            .unwrap();
        let path = resolve(dir.path(), "Kubernetes").unwrap();
        assert_eq!(fs::read_to_string(path).unwrap(), "typed");
    }
}
