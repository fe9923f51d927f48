//! Named JSON objects in the user config directory
//!
//! Handles loading and saving `~/.config/secretsync/<name>.json`. A missing
//! file loads as the type's default value.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::StoreError;

/// Directory holding the user-level config objects
#[derive(Debug, Clone)]
pub struct ConfigDir {
    root: PathBuf,
}

impl ConfigDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// `~/.config/secretsync` (or the platform equivalent)
    pub fn user_default() -> Self {
        Self::new(
            dirs::config_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("secretsync"),
        )
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the object called `name`
    pub fn path_for(&self, name: &str) -> PathBuf {
        self.root.join(format!("{name}.json"))
    }

    /// Load the object called `name`
    pub fn load<T: DeserializeOwned + Default>(&self, name: &str) -> Result<T, StoreError> {
        read_json_file(&self.path_for(name))
    }

    /// Save the object called `name`, creating the directory when needed
    pub fn save<T: Serialize>(&self, name: &str, value: &T) -> Result<(), StoreError> {
        if self.root.exists() && !self.root.is_dir() {
            return Err(StoreError::NotADirectory(self.root.clone()));
        }
        write_json_file(&self.path_for(name), value)
    }
}

/// Read a JSON file; a missing file yields `T::default()`
pub fn read_json_file<T: DeserializeOwned + Default>(path: &Path) -> Result<T, StoreError> {
    let content = match fs::read(path) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(T::default()),
        Err(source) => {
            return Err(StoreError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    serde_json::from_slice(&content).map_err(|source| StoreError::Json {
        path: path.to_path_buf(),
        source,
    })
}

/// Write a JSON file with owner-only permissions where supported
pub fn write_json_file<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    let io_err = |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io_err)?;
    }

    let mut content = serde_json::to_vec_pretty(value).map_err(|source| StoreError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    content.push(b'\n');
    fs::write(path, content).map_err(io_err)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600)).map_err(io_err)?;
    }

    tracing::debug!(path = %path.display(), "Saved user config");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_missing_object_loads_default() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigDir::new(dir.path());

        let loaded: BTreeMap<String, String> = store.load("auth").unwrap();
        assert!(loaded.is_empty());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigDir::new(dir.path().join("nested"));

        let mut value = BTreeMap::new();
        value.insert("host".to_string(), "vault.example.com".to_string());
        store.save("vault", &value).unwrap();

        assert!(store.path_for("vault").exists());
        let loaded: BTreeMap<String, String> = store.load("vault").unwrap();
        assert_eq!(loaded, value);
    }

    #[test]
    fn test_invalid_json_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigDir::new(dir.path());
        fs::write(store.path_for("auth"), "{not json").unwrap();

        let result: Result<BTreeMap<String, String>, _> = store.load("auth");
        assert!(matches!(result, Err(StoreError::Json { .. })));
    }
}
