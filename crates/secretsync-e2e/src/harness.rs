//! Test project harness
//!
//! A [`TestProject`] owns a temporary project directory and a temporary user
//! config directory, and runs the real sync engine against them.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use secretsync_common::testing::ScriptedConsole;
use secretsync_common::{ConfigDir, RunMode};
use secretsync_project::{
    LockState, Project, SyncError, SyncOptions, SyncReport, VaultBackend, LOCK_FILE,
    PROJECT_FILE,
};
use secretsync_vault::{CredentialSet, CredentialStore, VaultAuth, VaultCredential};
use tempfile::TempDir;

/// Initialize tracing for tests
pub fn init_test() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("secretsync=debug,secretsync_vault=debug,secretsync_project=debug")
        .with_test_writer()
        .try_init();
}

/// One `secrets.yaml` entry; `mapping` is the YAML body under `mapping:`
pub fn vault_entry(file: &str, url: &str, mapping: &str) -> String {
    format!("  - file: {file}\n    vault:\n      url: {url}\n      mapping: {mapping}\n")
}

pub struct TestProject {
    dir: TempDir,
    config: TempDir,
}

impl TestProject {
    /// A project whose `secrets.yaml` lists `entries` (see [`vault_entry`])
    pub fn new(entries: &[String]) -> Self {
        let dir = tempfile::tempdir().expect("Failed to create project dir");
        let config = tempfile::tempdir().expect("Failed to create config dir");

        let manifest = format!("secrets:\n{}", entries.concat());
        fs::write(dir.path().join(PROJECT_FILE), manifest).expect("Failed to write manifest");

        Self { dir, config }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn path(&self, file: &str) -> PathBuf {
        self.dir.path().join(file)
    }

    pub fn read(&self, file: &str) -> String {
        fs::read_to_string(self.path(file)).expect("Failed to read project file")
    }

    pub fn write(&self, file: &str, content: &str) {
        fs::write(self.path(file), content).expect("Failed to write project file");
    }

    pub fn lock(&self) -> LockState {
        LockState::read(&self.path(LOCK_FILE)).expect("Failed to read lock file")
    }

    pub fn config_dir(&self) -> ConfigDir {
        ConfigDir::new(self.config.path())
    }

    /// Save a credential to the user credential store
    pub fn save_credential(&self, host: &str, credential: &VaultCredential) {
        CredentialStore::new(self.config_dir())
            .save_credential(host, credential)
            .expect("Failed to save credential");
    }

    /// Write a standalone credential file, as passed with `--auth-config`
    pub fn credential_file(&self, host: &str, credential: VaultCredential) -> PathBuf {
        let path = self.config.path().join("ci-auth.json");
        let mut set = CredentialSet::default();
        set.insert(host, credential);
        set.save_file(&path).expect("Failed to write credential file");
        path
    }

    /// Run one sync the way the CLI does: fresh auth context, fresh project
    pub async fn sync(
        &self,
        mode: RunMode,
        console: &Arc<ScriptedConsole>,
        options: &SyncOptions,
    ) -> Result<SyncReport, SyncError> {
        self.sync_with(mode, console, options, &[]).await
    }

    pub async fn sync_with(
        &self,
        mode: RunMode,
        console: &Arc<ScriptedConsole>,
        options: &SyncOptions,
        auth_configs: &[PathBuf],
    ) -> Result<SyncReport, SyncError> {
        let auth = VaultAuth::from_config(mode, console.clone(), self.config_dir(), auth_configs)?;
        let mut backend = VaultBackend::new(auth);

        let mut project = Project::open(self.root(), mode)?;
        project
            .sync(&mut backend, console.as_ref(), options)
            .await
    }
}
