//! The per-request working directory.
//!
//! Owns `scripts/` (playbooks) and `config/` (inventory, templates) for the
//! lifetime of one request. Removal is explicit via [`DriverFiles::remove`]
//! rather than on drop: the executor decides whether to keep the tree based
//! on `keepFiles`, so dropping it unconditionally would be wrong.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct DriverFiles {
    root: PathBuf,
}

impl DriverFiles {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        DriverFiles { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn scripts_dir(&self) -> PathBuf {
        self.root.join("scripts")
    }

    pub fn config_dir(&self) -> PathBuf {
        self.root.join("config")
    }

    pub fn config_dir_exists(&self) -> bool {
        self.config_dir().is_dir()
    }

    /// Locates `scripts/<lifecycle_name>.{yaml,yml}`; lookup is case-sensitive
    /// on the filename.
    pub fn playbook_path(&self, lifecycle_name: &str) -> Option<PathBuf> {
        for ext in ["yaml", "yml"] {
            let candidate = self.scripts_dir().join(format!("{lifecycle_name}.{ext}"));
            if candidate.is_file() {
                return Some(candidate);
            }
        }
        None
    }

    /// Removes the whole tree, ignoring a not-found error so cleanup is
    /// idempotent on every exit path.
    pub fn remove(&self) -> io::Result<()> {
        match fs::remove_dir_all(&self.root) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }

    pub fn exists(&self) -> bool {
        self.root.exists()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{create_dir_all, File};
    use tempfile::tempdir;

    #[test]
    fn resolves_case_sensitive_playbook_name() {
        let dir = tempdir().unwrap();
        create_dir_all(dir.path().join("scripts")).unwrap();
        File::create(dir.path().join("scripts/Install.yml")).unwrap();

        let df = DriverFiles::new(dir.path());
        assert!(df.playbook_path("install").is_none());
        assert!(df.playbook_path("Install").is_some());
    }

    #[test]
    fn prefers_yaml_over_yml() {
        let dir = tempdir().unwrap();
        create_dir_all(dir.path().join("scripts")).unwrap();
        File::create(dir.path().join("scripts/start.yaml")).unwrap();
        File::create(dir.path().join("scripts/start.yml")).unwrap();

        let df = DriverFiles::new(dir.path());
        assert_eq!(df.playbook_path("start").unwrap().extension().unwrap(), "yaml");
    }

    #[test]
    fn remove_is_idempotent() {
        let dir = tempdir().unwrap();
        let df = DriverFiles::new(dir.path().join("nonexistent"));
        assert!(df.remove().is_ok());
        assert!(df.remove().is_ok());
    }
}
