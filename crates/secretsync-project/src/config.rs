//! The project: `secrets.yaml` plus the lock and class files next to it
//!
//! ```yaml
//! secrets:
//!   - file: config/db.json
//!     class: dev
//!     vault:
//!       url: https://vault.example.com/secret/app/db
//!       mapping:
//!         fromData:
//!           format: json
//! ```

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use secretsync_common::RunMode;
use secretsync_vault::VaultSecretConfig;
use serde::{Deserialize, Serialize};

use crate::classes::{ClassFilter, ClassUpdate};
use crate::gitignore::ensure_ignored;
use crate::lock::LockState;
use crate::SyncError;

pub const PROJECT_FILE: &str = "secrets.yaml";
pub const LOCK_FILE: &str = "secrets.lock";
pub const CLASS_FILE: &str = ".localsecretclasses";

/// One tracked file and the remote secret it mirrors
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecretEntry {
    /// Path relative to the project root, unique across entries
    pub file: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class: Option<String>,
    #[serde(flatten)]
    pub backend: BackendConfig,
}

/// Backend-specific configuration of an entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BackendConfig {
    Vault(VaultSecretConfig),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectConfig {
    #[serde(default)]
    pub secrets: Vec<SecretEntry>,
}

impl ProjectConfig {
    /// Reject entries sharing a `file` or pointing at a malformed secret URL
    pub fn validate(&self) -> Result<(), SyncError> {
        let mut seen = HashSet::new();
        for entry in &self.secrets {
            if entry.file.is_empty() {
                return Err(SyncError::config("secret entry with an empty file name"));
            }
            if !seen.insert(entry.file.as_str()) {
                return Err(SyncError::config(format!(
                    "duplicate filename in config: {}",
                    entry.file
                )));
            }
            entry.check_location()?;
        }
        Ok(())
    }
}

impl SecretEntry {
    /// Fail when the remote address cannot be mapped to an API location
    fn check_location(&self) -> Result<(), SyncError> {
        let BackendConfig::Vault(vault) = &self.backend;
        vault
            .location()
            .map(|_| ())
            .map_err(|e| SyncError::config(format!("secret '{}': {e}", self.file)))
    }
}

/// An opened project
#[derive(Debug)]
pub struct Project {
    root: PathBuf,
    workdir: PathBuf,
    mode: RunMode,
    config: ProjectConfig,
    classes: ClassFilter,
    last_state: LockState,
}

impl Project {
    /// Find `secrets.yaml` in `workdir` or its closest parent and open it
    pub fn open(workdir: &Path, mode: RunMode) -> Result<Self, SyncError> {
        let mut root = workdir.to_path_buf();
        loop {
            let candidate = root.join(PROJECT_FILE);
            match fs::metadata(&candidate) {
                Ok(_) => break,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(SyncError::io(candidate, e)),
            }

            if !root.pop() {
                return Err(SyncError::config(
                    "could not find a secrets manifest in working directory or parent directories",
                ));
            }
        }

        Self::open_at(root, workdir.to_path_buf(), mode)
    }

    /// Open the project rooted at `root`
    pub fn open_at(root: PathBuf, workdir: PathBuf, mode: RunMode) -> Result<Self, SyncError> {
        let path = root.join(PROJECT_FILE);
        let content = fs::read(&path).map_err(|e| SyncError::io(&path, e))?;
        let config: ProjectConfig = if content.iter().all(u8::is_ascii_whitespace) {
            ProjectConfig::default()
        } else {
            serde_yaml::from_slice(&content).map_err(|e| SyncError::yaml(&path, e))?
        };
        config.validate()?;

        let classes = if mode.cicd {
            ClassFilter::default()
        } else {
            ClassFilter::load(&root.join(CLASS_FILE))?
        };
        let last_state = LockState::read(&root.join(LOCK_FILE))?;

        tracing::debug!(
            root = %root.display(),
            entries = config.secrets.len(),
            "Opened project"
        );

        Ok(Self {
            root,
            workdir,
            mode,
            config,
            classes,
            last_state,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn mode(&self) -> RunMode {
        self.mode
    }

    pub fn config(&self) -> &ProjectConfig {
        &self.config
    }

    pub fn entries(&self) -> &[SecretEntry] {
        &self.config.secrets
    }

    pub fn classes(&self) -> &ClassFilter {
        &self.classes
    }

    /// Lock state as read when the project was opened, or as last saved
    pub fn last_state(&self) -> &LockState {
        &self.last_state
    }

    /// Absolute path of an entry's file
    pub fn file_path(&self, file: &str) -> PathBuf {
        self.root.join(file)
    }

    /// Entry file path as shown to the user, relative to the working directory
    pub fn display_path(&self, file: &str) -> String {
        relative_to(&self.file_path(file), &self.workdir)
            .display()
            .to_string()
    }

    /// Append an entry; its `file` must not be tracked yet
    pub fn add_entry(&mut self, entry: SecretEntry) -> Result<(), SyncError> {
        if self.config.secrets.iter().any(|e| e.file == entry.file) {
            return Err(SyncError::config(format!(
                "File '{}' already exists in {PROJECT_FILE}",
                entry.file
            )));
        }
        entry.check_location()?;
        self.config.secrets.push(entry);
        Ok(())
    }

    /// Rewrite `secrets.yaml`
    pub fn save(&self) -> Result<(), SyncError> {
        let path = self.root.join(PROJECT_FILE);
        let content = serde_yaml::to_string(&self.config).map_err(|e| SyncError::yaml(&path, e))?;
        fs::write(&path, content).map_err(|e| SyncError::io(&path, e))
    }

    /// Merge a class update and persist the result (never in CI/CD mode)
    pub fn apply_class_update(&mut self, update: &ClassUpdate) -> Result<(), SyncError> {
        self.classes.apply(update);

        if self.mode.cicd {
            return Ok(());
        }
        if self.classes.save(&self.root.join(CLASS_FILE))? {
            ensure_ignored(&self.root, CLASS_FILE)?;
        }
        Ok(())
    }

    /// Replace the lock state on disk
    pub(crate) fn save_lock(&mut self, state: LockState) -> Result<(), SyncError> {
        if !self.mode.cicd {
            ensure_ignored(&self.root, LOCK_FILE)?;
        }
        state.write(&self.root.join(LOCK_FILE))?;
        self.last_state = state;
        Ok(())
    }
}

/// Lexical relative path from `base` to `target`
fn relative_to(target: &Path, base: &Path) -> PathBuf {
    let target: Vec<Component> = target.components().collect();
    let base: Vec<Component> = base.components().collect();

    let common = target
        .iter()
        .zip(&base)
        .take_while(|(a, b)| a == b)
        .count();

    if common == 0 {
        return target.iter().collect();
    }

    let mut relative = PathBuf::new();
    for _ in common..base.len() {
        relative.push("..");
    }
    for component in &target[common..] {
        relative.push(component);
    }
    relative
}
