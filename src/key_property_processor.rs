//! Materialises `key`-typed property values to temporary files and tracks
//! them for guaranteed deletion.

use crate::properties::{PropertyBag, PropertyValue};
use std::fs::{self, File};
use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum KeyProcessorError {
    #[error("failed to write key material to {path}: {source}")]
    Write { path: PathBuf, source: std::io::Error },
}

pub struct KeyPropertyProcessor {
    written: Vec<PathBuf>,
}

impl KeyPropertyProcessor {
    pub fn new() -> Self {
        KeyPropertyProcessor { written: Vec::new() }
    }

    /// Walks every entry in `bag` whose type is `key`, writes the private
    /// key to a fresh `0600` file under `workspace_dir`, and adds
    /// `<name>_path` / `<name>_name` siblings to the same bag.
    pub fn process(&mut self, bag: &mut PropertyBag, workspace_dir: &Path) -> Result<(), KeyProcessorError> {
        let key_entries: Vec<(String, crate::properties::KeyMaterial)> = bag
            .iter()
            .filter_map(|(name, value)| value.as_key().map(|k| (name.clone(), k.clone())))
            .collect();

        for (name, key) in key_entries {
            let path = workspace_dir.join(format!("{name}-{}.pem", Uuid::new_v4()));
            self.write_key_file(&path, &key.private_key)?;

            bag.insert(format!("{name}_path"), PropertyValue::String(path.to_string_lossy().to_string()));
            bag.insert(format!("{name}_name"), PropertyValue::String(key.key_name.clone()));

            self.written.push(path);
        }

        Ok(())
    }

    fn write_key_file(&self, path: &Path, private_key: &str) -> Result<(), KeyProcessorError> {
        if let Some(parent) = path.parent() {
            let _ = fs::create_dir_all(parent);
        }

        let mut file = File::create(path).map_err(|source| KeyProcessorError::Write {
            path: path.to_path_buf(),
            source,
        })?;

        file.write_all(private_key.as_bytes())
            .map_err(|source| KeyProcessorError::Write {
                path: path.to_path_buf(),
                source,
            })?;

        let mut perms = file
            .metadata()
            .map_err(|source| KeyProcessorError::Write {
                path: path.to_path_buf(),
                source,
            })?
            .permissions();
        perms.set_mode(0o600);
        file.set_permissions(perms).map_err(|source| KeyProcessorError::Write {
            path: path.to_path_buf(),
            source,
        })?;

        Ok(())
    }

    /// Deletes every file this instance created, ignoring not-found errors.
    /// Called on every executor exit path.
    pub fn clear(&mut self) {
        for path in self.written.drain(..) {
            if let Err(e) = fs::remove_file(&path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!(error = %e, path = %path.display(), "failed to remove materialised key file");
                }
            }
        }
    }
}

impl Default for KeyPropertyProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for KeyPropertyProcessor {
    fn drop(&mut self) {
        self.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::properties::KeyMaterial;
    use tempfile::tempdir;

    #[test]
    fn writes_key_and_injects_path_and_name() {
        let dir = tempdir().unwrap();
        let mut bag = PropertyBag::new();
        bag.insert(
            "ssh_key".to_string(),
            PropertyValue::Key(KeyMaterial {
                key_name: "deploy-key".to_string(),
                private_key: "-----BEGIN KEY-----".to_string(),
                public_key: "ssh-rsa AAAA".to_string(),
            }),
        );

        let mut processor = KeyPropertyProcessor::new();
        processor.process(&mut bag, dir.path()).unwrap();

        let path = bag.get("ssh_key_path").unwrap().as_str().unwrap().to_string();
        assert_eq!(bag.get("ssh_key_name").unwrap().as_str().unwrap(), "deploy-key");
        assert_eq!(fs::read_to_string(&path).unwrap(), "-----BEGIN KEY-----");

        processor.clear();
        assert!(!Path::new(&path).exists());
        // idempotent
        processor.clear();
    }
}
