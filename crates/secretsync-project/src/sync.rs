//! Three-way reconciliation of local files, the lock state and remote secrets
//!
//! Every selected entry is prepared and fetched first, so credential and
//! network problems abort the run before any file is touched. The new lock
//! state is written once, after every entry has been handled.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use secretsync_common::{ConflictChoice, Console, RunMode};
use secretsync_data::canonical_hash;
use secretsync_vault::FetchedSecret;

use crate::backend::SecretBackend;
use crate::classes::ClassUpdate;
use crate::lock::{LocalContent, LockState, LockedFile};
use crate::{Project, SecretEntry, SyncError};

/// Options of one sync run, mostly from command-line flags
#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
    /// Resolve conflicts by pulling
    pub pull: bool,
    /// Resolve conflicts by pushing
    pub push: bool,
    /// Apply fixes without asking
    pub fix: bool,
    pub classes: ClassUpdate,
}

/// What happened to one entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    UpToDate,
    Pulled,
    Pushed,
    /// Left as is, either by choice or because the run could not decide
    Skipped,
    /// Neither a local file nor remote data exist
    Missing,
}

#[derive(Debug, Default)]
pub struct SyncReport {
    /// Outcome per selected entry, in config order
    pub outcomes: Vec<(String, Outcome)>,
    /// Orphaned files that were deleted
    pub deleted: Vec<String>,
    /// Orphaned files that were kept
    pub kept: Vec<String>,
}

impl SyncReport {
    pub fn outcome(&self, file: &str) -> Option<Outcome> {
        self.outcomes
            .iter()
            .find(|(f, _)| f == file)
            .map(|(_, outcome)| *outcome)
    }

    pub fn count(&self, outcome: Outcome) -> usize {
        self.outcomes.iter().filter(|(_, o)| *o == outcome).count()
    }

    /// True when nothing was pulled, pushed or deleted
    pub fn is_noop(&self) -> bool {
        self.count(Outcome::Pulled) == 0 && self.count(Outcome::Pushed) == 0 && self.deleted.is_empty()
    }
}

/// Classification of an entry before policies are applied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Situation {
    BothMissing,
    RemoteOnly,
    Unparsable,
    UnparsableRemoteMissing,
    LocalOnly,
    /// Same content in another format; `upgrade` when the lock recorded that format
    FormatMismatch { upgrade: bool },
    InSync,
    /// Content differs and the file was never synced
    Untracked,
    BothChanged,
    RemoteChanged,
    LocalChanged,
    /// Content differs although neither side changed since the lock
    CorruptLock,
}

fn classify(
    local: &LocalContent,
    remote: &FetchedSecret,
    remote_hash: Option<&str>,
    previous: Option<&LockedFile>,
) -> Situation {
    let (hash, format) = match local {
        LocalContent::Absent if remote.is_missing_data() => return Situation::BothMissing,
        LocalContent::Absent => return Situation::RemoteOnly,
        LocalContent::Unparsable { .. } if remote.is_missing_data() => {
            return Situation::UnparsableRemoteMissing
        }
        LocalContent::Unparsable { .. } => return Situation::Unparsable,
        LocalContent::Parsed { hash, format, .. } => (hash, *format),
    };

    let Some(remote_hash) = remote_hash else {
        return Situation::LocalOnly;
    };

    if hash == remote_hash {
        if format != remote.format() {
            let upgrade = previous.is_some_and(|p| p.local_format == Some(format));
            return Situation::FormatMismatch { upgrade };
        }
        return Situation::InSync;
    }

    let Some(previous) = previous else {
        return Situation::Untracked;
    };

    let remote_changed = remote.version() != previous.remote_version.as_ref();
    let local_changed = Some(hash.as_str()) != previous.local_hash.as_deref();

    match (remote_changed, local_changed) {
        (true, true) => Situation::BothChanged,
        (true, false) => Situation::RemoteChanged,
        (false, true) => Situation::LocalChanged,
        (false, false) => Situation::CorruptLock,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Pull,
    Push,
}

/// Messages for a decision that applies a fix
struct FixPrompt {
    forced: String,
    report: String,
    question: String,
    confirm: &'static str,
}

/// Messages for a push/pull/skip conflict
struct ConflictPrompt {
    pull: String,
    push: String,
    report: String,
    question: String,
}

struct OrphanPrompt {
    forced: String,
    report: String,
    question: String,
}

/// Decision rules shared by every entry of a run
struct Policy<'a> {
    mode: RunMode,
    options: &'a SyncOptions,
    console: &'a dyn Console,
}

impl Policy<'_> {
    fn notice(&self, message: &str) {
        self.console.notice(message);
    }

    /// CI/CD or `--fix` act, a terminal asks, anything else only reports
    fn fix(&self, prompt: FixPrompt) -> Result<bool, SyncError> {
        if self.mode.cicd {
            self.notice(&format!("{} (--cicd flag is enabled)", prompt.forced));
            return Ok(true);
        }
        if self.options.fix {
            self.notice(&format!("{} (--fix flag is enabled)", prompt.forced));
            return Ok(true);
        }
        if !self.mode.interactive {
            self.notice(&prompt.report);
            return Ok(false);
        }

        self.notice(&prompt.question);
        Ok(self.console.confirm(prompt.confirm, true)?)
    }

    /// CI/CD pulls, `--pull`/`--push` decide, a terminal asks, anything else reports
    fn conflict(&self, prompt: ConflictPrompt) -> Result<Option<Direction>, SyncError> {
        if self.mode.cicd {
            self.notice(&format!("{} (--cicd flag is enabled)", prompt.pull));
            return Ok(Some(Direction::Pull));
        }
        if self.options.pull {
            self.notice(&format!("{} (--pull flag is enabled)", prompt.pull));
            return Ok(Some(Direction::Pull));
        }
        if self.options.push {
            self.notice(&format!("{} (--push flag is enabled)", prompt.push));
            return Ok(Some(Direction::Push));
        }
        if !self.mode.interactive {
            self.notice(&prompt.report);
            return Ok(None);
        }

        self.notice(&prompt.question);
        Ok(match self.console.choose_resolution()? {
            ConflictChoice::Pull => Some(Direction::Pull),
            ConflictChoice::Push => Some(Direction::Push),
            ConflictChoice::Skip => None,
        })
    }

    /// CI/CD deletes, a terminal asks (default yes), anything else warns
    fn delete(&self, prompt: OrphanPrompt) -> Result<bool, SyncError> {
        if self.mode.cicd {
            self.notice(&format!("{} (--cicd flag is enabled)", prompt.forced));
            return Ok(true);
        }
        if !self.mode.interactive {
            self.notice(&prompt.report);
            return Ok(false);
        }

        self.notice(&prompt.question);
        Ok(self.console.confirm("Delete file?", true)?)
    }
}

impl Project {
    /// Reconcile every selected entry with its remote secret
    pub async fn sync(
        &mut self,
        backend: &mut dyn SecretBackend,
        console: &dyn Console,
        options: &SyncOptions,
    ) -> Result<SyncReport, SyncError> {
        if options.pull && options.push {
            return Err(SyncError::config(
                "--pull flag and --push flag cannot both be enabled",
            ));
        }

        self.apply_class_update(&options.classes)?;

        let (selected, excluded): (Vec<SecretEntry>, Vec<SecretEntry>) = {
            let (selected, excluded) = self.classes().partition(self.entries());
            (
                selected.into_iter().cloned().collect(),
                excluded.into_iter().cloned().collect(),
            )
        };
        tracing::debug!(
            selected = selected.len(),
            excluded = excluded.len(),
            "Starting sync"
        );

        for entry in &selected {
            backend.prepare(entry).await?;
        }

        let mut fetched = Vec::with_capacity(selected.len());
        for entry in &selected {
            fetched.push(backend.fetch(entry).await?);
        }

        let mut locals = Vec::with_capacity(selected.len());
        for (entry, remote) in selected.iter().zip(&fetched) {
            let recorded = self
                .last_state()
                .get(&entry.file)
                .and_then(|previous| previous.local_format);
            locals.push(LocalContent::read(
                &self.file_path(&entry.file),
                recorded,
                remote.format(),
            )?);
        }

        let policy = Policy {
            mode: self.mode(),
            options,
            console,
        };
        let mut next = LockState::default();
        let mut report = SyncReport::default();

        for ((entry, remote), local) in selected.iter().zip(&fetched).zip(&locals) {
            let previous = self.last_state().get(&entry.file);
            let (outcome, record) = self.reconcile(&policy, entry, remote, local, previous).await?;

            if let Some(record) = record {
                next.files.insert(entry.file.clone(), record);
            }
            report.outcomes.push((entry.file.clone(), outcome));
        }

        for entry in &excluded {
            let name = self.display_path(&entry.file);
            let prompt = OrphanPrompt {
                forced: format!("Deleting unreferenced secret file at '{name}'"),
                report: format!("Warning: unreferenced secret file at '{name}'"),
                question: format!("Unreferenced file at '{name}', would you like to remove it?"),
            };
            let kept = self.handle_orphan(&policy, &entry.file, prompt, &mut report)?;
            if kept {
                if let Some(previous) = self.last_state().get(&entry.file) {
                    next.files.insert(entry.file.clone(), previous.clone());
                }
            }
        }

        let configured: HashSet<&str> = self.entries().iter().map(|e| e.file.as_str()).collect();
        let removed: Vec<String> = self
            .last_state()
            .files
            .keys()
            .filter(|file| !configured.contains(file.as_str()))
            .cloned()
            .collect();
        for file in &removed {
            let name = self.display_path(file);
            let prompt = OrphanPrompt {
                forced: format!("Deleting removed secret file at '{name}'"),
                report: format!("Warning: removed secret file at '{name}'"),
                question: format!("Removed file at '{name}', would you like to remove it?"),
            };
            self.handle_orphan(&policy, file, prompt, &mut report)?;
        }

        self.save_lock(next)?;

        tracing::info!(
            pulled = report.count(Outcome::Pulled),
            pushed = report.count(Outcome::Pushed),
            skipped = report.count(Outcome::Skipped),
            deleted = report.deleted.len(),
            "Sync finished"
        );
        Ok(report)
    }

    /// Decide and act on one entry, returning its new lock record
    async fn reconcile(
        &self,
        policy: &Policy<'_>,
        entry: &SecretEntry,
        remote: &FetchedSecret,
        local: &LocalContent,
        previous: Option<&LockedFile>,
    ) -> Result<(Outcome, Option<LockedFile>), SyncError> {
        let name = self.display_path(&entry.file);
        let remote_hash = remote.value().map(canonical_hash);
        let situation = classify(local, remote, remote_hash.as_deref(), previous);
        tracing::debug!(file = %entry.file, ?situation, "Classified secret");

        // (direction, whether the choice resolved a conflict)
        let decision: Option<(Direction, bool)> = match situation {
            Situation::BothMissing => {
                policy.notice(&format!("No local file or remote data for secret '{name}'"));
                return Ok((Outcome::Missing, previous.cloned()));
            }
            Situation::RemoteOnly => {
                policy.notice(&format!("Writing new secret to '{name}'"));
                Some((Direction::Pull, false))
            }
            Situation::LocalOnly => policy
                .fix(FixPrompt {
                    forced: format!(
                        "Pushing secret '{name}' because remote secret is incomplete or does not exist"
                    ),
                    report: format!(
                        "Remote secret for '{name}' is incomplete or does not exist, use the --fix flag to fix it"
                    ),
                    question: format!(
                        "Remote secret for '{name}' is incomplete or does not exist, do you want to push it?"
                    ),
                    confirm: "Push secret?",
                })?
                .then_some((Direction::Push, false)),
            Situation::UnparsableRemoteMissing => {
                policy.notice(&format!(
                    "Failed to parse secret '{name}' and its remote secret is incomplete or does not exist"
                ));
                None
            }
            Situation::Unparsable => policy
                .fix(FixPrompt {
                    forced: format!("Overwriting secret that failed parsing '{name}'"),
                    report: format!("Failed to parse secret '{name}', use the --fix flag to fix it"),
                    question: format!("Failed to parse secret '{name}', do you want to fix it?"),
                    confirm: "Overwrite file?",
                })?
                .then_some((Direction::Pull, false)),
            Situation::FormatMismatch { upgrade: true } => {
                policy.notice(&format!("Updating secret '{name}' to newer format"));
                Some((Direction::Pull, false))
            }
            Situation::FormatMismatch { upgrade: false } => policy
                .fix(FixPrompt {
                    forced: format!("Updating secret '{name}' to correct format"),
                    report: format!(
                        "Secret '{name}' has the same data but in a different format, use the --fix flag to fix it"
                    ),
                    question: format!(
                        "Secret '{name}' has the same data but in a different format, do you want to fix it?"
                    ),
                    confirm: "Fix format?",
                })?
                .then_some((Direction::Pull, false)),
            Situation::InSync => {
                if let Some(previous) = previous {
                    if previous.remote_version.as_ref() != remote.version() {
                        policy.notice(&format!(
                            "info: remote version for '{name}' changed but is already in sync"
                        ));
                    }
                    if previous.local_hash.as_deref() != local.hash() {
                        policy.notice(&format!(
                            "info: local secret '{name}' contents changed but is already in sync"
                        ));
                    }
                }
                policy.notice(&format!("Secret '{name}' is already up to date"));

                let record = LockedFile {
                    remote_version: remote.version().cloned(),
                    local_hash: local.hash().map(str::to_string),
                    local_format: local.format(),
                };
                return Ok((Outcome::UpToDate, Some(record)));
            }
            Situation::Untracked => policy
                .conflict(ConflictPrompt {
                    pull: format!("Overwriting new secret file '{name}' with remote copy"),
                    push: format!("Overwriting new remote secret with local copy '{name}'"),
                    report: format!("New secret file '{name}' does not match remote copy"),
                    question: format!(
                        "New secret file '{name}' does not match remote copy, do you want to pull, push, or leave it as is?"
                    ),
                })?
                .map(|direction| (direction, true)),
            Situation::BothChanged => policy
                .conflict(ConflictPrompt {
                    pull: format!("Overwriting modified secret file '{name}' with remote copy"),
                    push: format!("Overwriting remote secret with modified local copy '{name}'"),
                    report: format!(
                        "Modified secret file '{name}' does not match modified remote copy"
                    ),
                    question: format!(
                        "Modified secret file '{name}' does not match modified remote copy, do you want to pull, push, or leave it as is?"
                    ),
                })?
                .map(|direction| (direction, true)),
            Situation::RemoteChanged => {
                policy.notice(&format!("Pulling new version of secret '{name}'"));
                Some((Direction::Pull, false))
            }
            Situation::LocalChanged => {
                policy.notice(&format!("Pushing new version of secret '{name}'"));
                Some((Direction::Push, false))
            }
            Situation::CorruptLock => policy
                .conflict(ConflictPrompt {
                    pull: format!("Lockfile is corrupt, overwriting secret file '{name}' with remote copy"),
                    push: format!("Lockfile is corrupt, overwriting remote secret with local copy '{name}'"),
                    report: format!(
                        "Lockfile is corrupt, secret file '{name}' does not match remote copy but neither are modified"
                    ),
                    question: format!(
                        "Lockfile is corrupt, secret file '{name}' does not match remote copy, do you want to pull, push, or leave it as is?"
                    ),
                })?
                .map(|direction| (direction, true)),
        };

        match decision {
            Some((Direction::Pull, conflict)) => {
                let record = self.pull(entry, remote)?;
                policy.notice(if conflict { "    pulled" } else { "    done" });
                Ok((Outcome::Pulled, Some(record)))
            }
            Some((Direction::Push, conflict)) => {
                let record = push(remote, local).await?;
                policy.notice(if conflict { "    pushed" } else { "    done" });
                Ok((Outcome::Pushed, Some(record)))
            }
            None => {
                policy.notice("    skipped");
                Ok((Outcome::Skipped, previous.cloned()))
            }
        }
    }

    /// Overwrite the local file with the remote value
    fn pull(&self, entry: &SecretEntry, remote: &FetchedSecret) -> Result<LockedFile, SyncError> {
        let value = remote.value().ok_or_else(|| {
            SyncError::config(format!("no remote data to pull for '{}'", entry.file))
        })?;
        let rendered = remote.format().render(value)?;

        let path = self.file_path(&entry.file);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| SyncError::io(parent, e))?;
        }
        fs::write(&path, rendered).map_err(|e| SyncError::io(&path, e))?;

        Ok(LockedFile {
            remote_version: remote.version().cloned(),
            local_hash: Some(canonical_hash(value)),
            local_format: Some(remote.format()),
        })
    }

    /// Offer to delete a file that is no longer synced; returns whether it was kept
    fn handle_orphan(
        &self,
        policy: &Policy<'_>,
        file: &str,
        prompt: OrphanPrompt,
        report: &mut SyncReport,
    ) -> Result<bool, SyncError> {
        let path = self.file_path(file);
        if !path.exists() {
            return Ok(false);
        }

        if policy.delete(prompt)? {
            remove_file(&path)?;
            policy.notice("    deleted");
            report.deleted.push(file.to_string());
            Ok(false)
        } else {
            policy.notice("    skipped");
            report.kept.push(file.to_string());
            Ok(true)
        }
    }
}

/// Upload the local value, returning the record for the new remote version
async fn push(remote: &FetchedSecret, local: &LocalContent) -> Result<LockedFile, SyncError> {
    let LocalContent::Parsed {
        value,
        hash,
        format,
    } = local
    else {
        return Err(SyncError::config("cannot push a local file that failed to parse"));
    };

    let version = remote.upload_new(value).await?;
    Ok(LockedFile {
        remote_version: Some(version),
        local_hash: Some(hash.clone()),
        local_format: Some(*format),
    })
}

fn remove_file(path: &Path) -> Result<(), SyncError> {
    fs::remove_file(path).map_err(|e| SyncError::io(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Arc;

    use async_trait::async_trait;
    use parking_lot::Mutex;
    use secretsync_common::testing::ScriptedConsole;
    use secretsync_data::{Format, RemoteVersion, Value};
    use secretsync_vault::{SecretWriter, VaultError};
    use serde_json::json;

    use crate::config::{CLASS_FILE, LOCK_FILE, PROJECT_FILE};

    #[derive(Clone)]
    struct Remote {
        value: Option<Value>,
        version: Option<u64>,
        format: Format,
    }

    type Uploads = Arc<Mutex<Vec<(String, Value)>>>;

    struct FakeWriter {
        file: String,
        uploads: Uploads,
        new_version: u64,
    }

    #[async_trait]
    impl SecretWriter for FakeWriter {
        async fn upload_new(&self, value: &Value) -> Result<RemoteVersion, VaultError> {
            self.uploads.lock().push((self.file.clone(), value.clone()));
            Ok(RemoteVersion::from(self.new_version))
        }
    }

    #[derive(Default)]
    struct FakeBackend {
        remotes: HashMap<String, Remote>,
        uploads: Uploads,
        fail_fetch: Option<String>,
    }

    impl FakeBackend {
        fn with(mut self, file: &str, value: Option<Value>, version: Option<u64>, format: Format) -> Self {
            self.remotes.insert(
                file.to_string(),
                Remote {
                    value,
                    version,
                    format,
                },
            );
            self
        }

        fn uploads(&self) -> Vec<(String, Value)> {
            self.uploads.lock().clone()
        }
    }

    #[async_trait]
    impl SecretBackend for FakeBackend {
        async fn prepare(&mut self, _entry: &SecretEntry) -> Result<(), SyncError> {
            Ok(())
        }

        async fn fetch(&mut self, entry: &SecretEntry) -> Result<FetchedSecret, SyncError> {
            if self.fail_fetch.as_deref() == Some(entry.file.as_str()) {
                return Err(SyncError::Vault(VaultError::auth_failed("vault", "denied")));
            }
            let remote = self.remotes.get(&entry.file).cloned().unwrap_or(Remote {
                value: None,
                version: None,
                format: Format::Json,
            });
            let writer = Box::new(FakeWriter {
                file: entry.file.clone(),
                uploads: self.uploads.clone(),
                new_version: remote.version.unwrap_or(0) + 1,
            });
            let version = remote.version.map(RemoteVersion::from);
            Ok(match remote.value {
                Some(value) => FetchedSecret::found(value, version, remote.format, writer),
                None => FetchedSecret::missing(version, remote.format, writer),
            })
        }
    }

    fn entry_yaml(file: &str, class: Option<&str>, format: &str) -> String {
        let class = class
            .map(|c| format!("    class: {c}\n"))
            .unwrap_or_default();
        format!(
            "  - file: {file}\n{class}    vault:\n      url: https://vault.example.com/secret/{file}\n      mapping:\n        fromData:\n          format: {format}\n"
        )
    }

    struct Fixture {
        dir: tempfile::TempDir,
    }

    impl Fixture {
        fn new(entries: &[String]) -> Self {
            let dir = tempfile::tempdir().unwrap();
            let config = format!("secrets:\n{}", entries.concat());
            fs::write(dir.path().join(PROJECT_FILE), config).unwrap();
            Self { dir }
        }

        fn path(&self, file: &str) -> std::path::PathBuf {
            self.dir.path().join(file)
        }

        fn write(&self, file: &str, content: &str) {
            fs::write(self.path(file), content).unwrap();
        }

        fn read(&self, file: &str) -> String {
            fs::read_to_string(self.path(file)).unwrap()
        }

        fn write_lock(&self, state: &LockState) {
            state.write(&self.path(LOCK_FILE)).unwrap();
        }

        fn lock(&self) -> LockState {
            LockState::read(&self.path(LOCK_FILE)).unwrap()
        }

        fn open(&self, mode: RunMode) -> Project {
            Project::open(self.dir.path(), mode).unwrap()
        }

        async fn sync(
            &self,
            mode: RunMode,
            backend: &mut FakeBackend,
            console: &ScriptedConsole,
            options: SyncOptions,
        ) -> Result<SyncReport, SyncError> {
            self.open(mode).sync(backend, console, &options).await
        }

        /// Decide the first entry alone, with an already read local file
        async fn reconcile(
            &self,
            mode: RunMode,
            backend: &mut FakeBackend,
            console: &ScriptedConsole,
            options: SyncOptions,
            local: LocalContent,
            previous: Option<&LockedFile>,
        ) -> Result<(Outcome, Option<LockedFile>), SyncError> {
            let project = self.open(mode);
            let entry = project.entries()[0].clone();
            let remote = backend.fetch(&entry).await?;
            let policy = Policy {
                mode,
                options: &options,
                console,
            };
            project.reconcile(&policy, &entry, &remote, &local, previous).await
        }
    }

    fn locked(version: u64, hash: &str, format: Format) -> LockedFile {
        LockedFile {
            remote_version: Some(version.into()),
            local_hash: Some(hash.to_string()),
            local_format: Some(format),
        }
    }

    fn lock_with(file: &str, record: LockedFile) -> LockState {
        let mut state = LockState::default();
        state.files.insert(file.to_string(), record);
        state
    }

    #[tokio::test]
    async fn test_pull_new_secret() {
        let fx = Fixture::new(&[entry_yaml("db.json", None, "json")]);
        let remote = json!({"user": "a", "pass": "b"});
        let mut backend = FakeBackend::default().with("db.json", Some(remote.clone()), Some(1), Format::Json);
        let console = ScriptedConsole::new();

        let report = fx
            .sync(RunMode::batch(), &mut backend, &console, SyncOptions::default())
            .await
            .unwrap();

        assert_eq!(report.outcome("db.json"), Some(Outcome::Pulled));
        let written: Value = serde_json::from_str(&fx.read("db.json")).unwrap();
        assert_eq!(written, remote);
        assert_eq!(
            fx.lock().get("db.json"),
            Some(&locked(1, &canonical_hash(&remote), Format::Json))
        );
        assert_eq!(console.notices(), vec!["Writing new secret to 'db.json'", "    done"]);
        assert!(fx.read(".gitignore").contains("/secrets.lock"));
    }

    #[tokio::test]
    async fn test_both_missing_is_reported() {
        let fx = Fixture::new(&[entry_yaml("db.json", None, "json")]);
        let mut backend = FakeBackend::default();
        let console = ScriptedConsole::new();

        let report = fx
            .sync(RunMode::cicd(), &mut backend, &console, SyncOptions::default())
            .await
            .unwrap();

        assert_eq!(report.outcome("db.json"), Some(Outcome::Missing));
        assert!(!fx.path("db.json").exists());
        assert!(fx.lock().files.is_empty());
    }

    #[tokio::test]
    async fn test_local_only_reports_without_fix() {
        let fx = Fixture::new(&[entry_yaml("db.json", None, "json")]);
        fx.write("db.json", r#"{"user": "a"}"#);
        let mut backend = FakeBackend::default().with("db.json", None, None, Format::Json);
        let console = ScriptedConsole::new();

        let report = fx
            .sync(RunMode::batch(), &mut backend, &console, SyncOptions::default())
            .await
            .unwrap();

        assert_eq!(report.outcome("db.json"), Some(Outcome::Skipped));
        assert!(backend.uploads().is_empty());
        assert!(fx.lock().get("db.json").is_none());
    }

    #[tokio::test]
    async fn test_local_only_pushed_with_fix() {
        let fx = Fixture::new(&[entry_yaml("db.json", None, "json")]);
        fx.write("db.json", r#"{"user": "a"}"#);
        let mut backend = FakeBackend::default().with("db.json", None, None, Format::Json);
        let console = ScriptedConsole::new();
        let options = SyncOptions {
            fix: true,
            ..Default::default()
        };

        let report = fx
            .sync(RunMode::batch(), &mut backend, &console, options)
            .await
            .unwrap();

        assert_eq!(report.outcome("db.json"), Some(Outcome::Pushed));
        assert_eq!(backend.uploads(), vec![("db.json".to_string(), json!({"user": "a"}))]);
        assert_eq!(
            fx.lock().get("db.json").unwrap().remote_version,
            Some(RemoteVersion::Number(1))
        );
    }

    #[tokio::test]
    async fn test_unparsable_local_asks_before_overwrite() {
        let fx = Fixture::new(&[entry_yaml("db.json", None, "json")]);
        fx.write("db.json", "{broken");
        let mut backend = FakeBackend::default().with("db.json", Some(json!({"a": 1})), Some(2), Format::Json);
        let console = ScriptedConsole::with_answers([""]);

        let report = fx
            .sync(RunMode::interactive(), &mut backend, &console, SyncOptions::default())
            .await
            .unwrap();

        assert_eq!(report.outcome("db.json"), Some(Outcome::Pulled));
        assert_eq!(console.questions(), vec!["Overwrite file? (Y/n)"]);
        assert_eq!(fx.read("db.json"), "{\n    \"a\": 1\n}\n");
    }

    #[tokio::test]
    async fn test_in_sync_is_noop_with_drift_notice() {
        let fx = Fixture::new(&[entry_yaml("db.json", None, "json")]);
        let value = json!({"a": 1});
        fx.write("db.json", r#"{"a": 1}"#);
        fx.write_lock(&lock_with("db.json", locked(1, &canonical_hash(&value), Format::Json)));
        let mut backend = FakeBackend::default().with("db.json", Some(value.clone()), Some(2), Format::Json);
        let console = ScriptedConsole::new();

        let report = fx
            .sync(RunMode::batch(), &mut backend, &console, SyncOptions::default())
            .await
            .unwrap();

        assert_eq!(report.outcome("db.json"), Some(Outcome::UpToDate));
        assert!(report.is_noop());
        assert_eq!(
            console.notices(),
            vec![
                "info: remote version for 'db.json' changed but is already in sync",
                "Secret 'db.json' is already up to date",
            ]
        );
        assert_eq!(
            fx.lock().get("db.json").unwrap().remote_version,
            Some(RemoteVersion::Number(2))
        );
    }

    #[tokio::test]
    async fn test_format_upgrade_pulls_automatically() {
        let fx = Fixture::new(&[entry_yaml("db.conf", None, "yaml")]);
        let value = json!({"a": 1});
        fx.write("db.conf", r#"{"a": 1}"#);
        fx.write_lock(&lock_with("db.conf", locked(1, &canonical_hash(&value), Format::Json)));
        let mut backend = FakeBackend::default().with("db.conf", Some(value), Some(1), Format::Yaml);
        let console = ScriptedConsole::new();

        let report = fx
            .sync(RunMode::batch(), &mut backend, &console, SyncOptions::default())
            .await
            .unwrap();

        assert_eq!(report.outcome("db.conf"), Some(Outcome::Pulled));
        assert_eq!(fx.read("db.conf"), "a: 1\n");
        assert_eq!(fx.lock().get("db.conf").unwrap().local_format, Some(Format::Yaml));
    }

    #[tokio::test]
    async fn test_unparsable_local_reported_in_batch_mode() {
        let fx = Fixture::new(&[entry_yaml("db.conf", None, "json")]);
        fx.write("db.conf", "a: 1\n");
        let mut backend = FakeBackend::default().with("db.conf", Some(json!({"a": 1})), Some(1), Format::Json);
        let console = ScriptedConsole::new();

        // no recorded format, so only json is tried
        let report = fx
            .sync(RunMode::batch(), &mut backend, &console, SyncOptions::default())
            .await
            .unwrap();
        assert_eq!(report.outcome("db.conf"), Some(Outcome::Skipped));
        assert_eq!(fx.read("db.conf"), "a: 1\n");
        assert_eq!(
            console.notices()[0],
            "Failed to parse secret 'db.conf', use the --fix flag to fix it"
        );
    }

    #[tokio::test]
    async fn test_only_local_changed_pushes() {
        let fx = Fixture::new(&[entry_yaml("db.json", None, "json")]);
        fx.write("db.json", r#"{"user": "b"}"#);
        fx.write_lock(&lock_with("db.json", locked(3, "A", Format::Json)));
        let mut backend = FakeBackend::default().with("db.json", Some(json!({"user": "a"})), Some(3), Format::Json);
        let console = ScriptedConsole::new();

        let report = fx
            .sync(RunMode::batch(), &mut backend, &console, SyncOptions::default())
            .await
            .unwrap();

        assert_eq!(report.outcome("db.json"), Some(Outcome::Pushed));
        assert_eq!(backend.uploads(), vec![("db.json".to_string(), json!({"user": "b"}))]);
        let record = fx.lock().get("db.json").cloned().unwrap();
        assert_eq!(record.remote_version, Some(RemoteVersion::Number(4)));
        assert_eq!(record.local_hash, Some(canonical_hash(&json!({"user": "b"}))));
    }

    #[tokio::test]
    async fn test_only_remote_changed_pulls() {
        let fx = Fixture::new(&[entry_yaml("db.json", None, "json")]);
        let old = json!({"user": "a"});
        fx.write("db.json", r#"{"user": "a"}"#);
        fx.write_lock(&lock_with("db.json", locked(3, &canonical_hash(&old), Format::Json)));
        let mut backend = FakeBackend::default().with("db.json", Some(json!({"user": "z"})), Some(4), Format::Json);
        let console = ScriptedConsole::new();

        let report = fx
            .sync(RunMode::batch(), &mut backend, &console, SyncOptions::default())
            .await
            .unwrap();

        assert_eq!(report.outcome("db.json"), Some(Outcome::Pulled));
        assert!(fx.read("db.json").contains("\"z\""));
        assert_eq!(
            fx.lock().get("db.json").unwrap().remote_version,
            Some(RemoteVersion::Number(4))
        );
    }

    #[tokio::test]
    async fn test_both_changed_prompts_for_resolution() {
        let fx = Fixture::new(&[entry_yaml("db.json", None, "json")]);
        fx.write("db.json", r#"{"user": "local"}"#);
        fx.write_lock(&lock_with("db.json", locked(3, "A", Format::Json)));
        let mut backend = FakeBackend::default().with("db.json", Some(json!({"user": "remote"})), Some(5), Format::Json);
        let console = ScriptedConsole::with_answers(["what", "u"]);

        let report = fx
            .sync(RunMode::interactive(), &mut backend, &console, SyncOptions::default())
            .await
            .unwrap();

        assert_eq!(report.outcome("db.json"), Some(Outcome::Pushed));
        assert_eq!(console.remaining_answers(), 0);
        assert!(console.notices().iter().any(|n| n == "    pushed"));
    }

    #[tokio::test]
    async fn test_untracked_conflict_in_cicd_pulls() {
        let fx = Fixture::new(&[entry_yaml("db.json", None, "json")]);
        fx.write("db.json", r#"{"user": "local"}"#);
        let mut backend = FakeBackend::default().with("db.json", Some(json!({"user": "remote"})), Some(1), Format::Json);
        let console = ScriptedConsole::new();

        let report = fx
            .sync(RunMode::cicd(), &mut backend, &console, SyncOptions::default())
            .await
            .unwrap();

        assert_eq!(report.outcome("db.json"), Some(Outcome::Pulled));
        assert!(fx.read("db.json").contains("remote"));
        assert!(!fx.path(".gitignore").exists());
    }

    #[tokio::test]
    async fn test_untracked_conflict_with_push_flag() {
        let fx = Fixture::new(&[entry_yaml("db.json", None, "json")]);
        fx.write("db.json", r#"{"user": "local"}"#);
        let mut backend = FakeBackend::default().with("db.json", Some(json!({"user": "remote"})), Some(1), Format::Json);
        let console = ScriptedConsole::new();
        let options = SyncOptions {
            push: true,
            ..Default::default()
        };

        let report = fx
            .sync(RunMode::batch(), &mut backend, &console, options)
            .await
            .unwrap();

        assert_eq!(report.outcome("db.json"), Some(Outcome::Pushed));
        assert_eq!(console.notices()[0], "Overwriting new remote secret with local copy 'db.json' (--push flag is enabled)");
    }

    #[tokio::test]
    async fn test_corrupt_lock_reports_and_keeps_record() {
        let fx = Fixture::new(&[entry_yaml("db.json", None, "json")]);
        let local = json!({"user": "local"});
        fx.write("db.json", r#"{"user": "local"}"#);
        let record = locked(3, &canonical_hash(&local), Format::Json);
        fx.write_lock(&lock_with("db.json", record.clone()));
        let mut backend = FakeBackend::default().with("db.json", Some(json!({"user": "remote"})), Some(3), Format::Json);
        let console = ScriptedConsole::new();

        let report = fx
            .sync(RunMode::batch(), &mut backend, &console, SyncOptions::default())
            .await
            .unwrap();

        assert_eq!(report.outcome("db.json"), Some(Outcome::Skipped));
        assert!(console.notices()[0].starts_with("Lockfile is corrupt"));
        assert_eq!(fx.lock().get("db.json"), Some(&record));
    }

    #[tokio::test]
    async fn test_pull_and_push_together_rejected() {
        let fx = Fixture::new(&[entry_yaml("db.json", None, "json")]);
        let mut backend = FakeBackend::default();
        let console = ScriptedConsole::new();
        let options = SyncOptions {
            pull: true,
            push: true,
            ..Default::default()
        };

        let result = fx.sync(RunMode::batch(), &mut backend, &console, options).await;
        assert!(matches!(result, Err(SyncError::Config(_))));
    }

    #[tokio::test]
    async fn test_fetch_failure_leaves_lock_untouched() {
        let fx = Fixture::new(&[
            entry_yaml("a.json", None, "json"),
            entry_yaml("b.json", None, "json"),
        ]);
        let before = lock_with("a.json", locked(1, "x", Format::Json));
        fx.write_lock(&before);
        let mut backend = FakeBackend {
            fail_fetch: Some("b.json".to_string()),
            ..Default::default()
        }
        .with("a.json", Some(json!({"k": "v"})), Some(2), Format::Json);
        let console = ScriptedConsole::new();

        let result = fx
            .sync(RunMode::cicd(), &mut backend, &console, SyncOptions::default())
            .await;

        assert!(matches!(result, Err(SyncError::Vault(VaultError::AuthFailed { .. }))));
        assert_eq!(fx.lock(), before);
        assert!(!fx.path("a.json").exists());
    }

    #[tokio::test]
    async fn test_second_run_is_noop() {
        let fx = Fixture::new(&[
            entry_yaml("db.json", None, "json"),
            entry_yaml("app.yaml", None, "yaml"),
        ]);
        let mut backend = FakeBackend::default()
            .with("db.json", Some(json!({"user": "a", "pass": "b"})), Some(1), Format::Json)
            .with("app.yaml", Some(json!({"list": [1, 2]})), Some(7), Format::Yaml);
        let console = ScriptedConsole::new();

        let first = fx
            .sync(RunMode::batch(), &mut backend, &console, SyncOptions::default())
            .await
            .unwrap();
        assert_eq!(first.count(Outcome::Pulled), 2);

        let second = fx
            .sync(RunMode::batch(), &mut backend, &console, SyncOptions::default())
            .await
            .unwrap();
        assert!(second.is_noop());
        assert_eq!(second.count(Outcome::UpToDate), 2);
    }

    #[tokio::test]
    async fn test_excluded_entry_deleted_in_cicd() {
        let fx = Fixture::new(&[
            entry_yaml("dev.json", Some("dev"), "json"),
            entry_yaml("shared.json", None, "json"),
        ]);
        fx.write("dev.json", "{}");
        let mut backend = FakeBackend::default().with("shared.json", Some(json!({})), Some(1), Format::Json);
        let console = ScriptedConsole::new();

        let report = fx
            .sync(RunMode::cicd(), &mut backend, &console, SyncOptions::default())
            .await
            .unwrap();

        assert_eq!(report.deleted, vec!["dev.json"]);
        assert!(!fx.path("dev.json").exists());
        assert_eq!(report.outcome("dev.json"), None);
    }

    #[tokio::test]
    async fn test_excluded_entry_kept_in_batch_mode_keeps_record() {
        let fx = Fixture::new(&[entry_yaml("dev.json", Some("dev"), "json")]);
        fx.write("dev.json", "{}");
        let record = locked(1, "h", Format::Json);
        fx.write_lock(&lock_with("dev.json", record.clone()));
        let mut backend = FakeBackend::default();
        let console = ScriptedConsole::new();

        let report = fx
            .sync(RunMode::batch(), &mut backend, &console, SyncOptions::default())
            .await
            .unwrap();

        assert_eq!(report.kept, vec!["dev.json"]);
        assert!(fx.path("dev.json").exists());
        assert_eq!(fx.lock().get("dev.json"), Some(&record));
        assert_eq!(console.notices()[0], "Warning: unreferenced secret file at 'dev.json'");
    }

    #[tokio::test]
    async fn test_class_selection_includes_entry() {
        let fx = Fixture::new(&[entry_yaml("dev.json", Some("dev"), "json")]);
        let mut backend = FakeBackend::default().with("dev.json", Some(json!({"k": 1})), Some(1), Format::Json);
        let console = ScriptedConsole::new();
        let options = SyncOptions {
            classes: ClassUpdate::parse("+dev").unwrap(),
            ..Default::default()
        };

        let report = fx
            .sync(RunMode::batch(), &mut backend, &console, options)
            .await
            .unwrap();

        assert_eq!(report.outcome("dev.json"), Some(Outcome::Pulled));
        assert_eq!(fx.read(CLASS_FILE), "+dev\n");
    }

    #[tokio::test]
    async fn test_removed_entry_file_deleted_after_prompt() {
        let fx = Fixture::new(&[entry_yaml("db.json", None, "json")]);
        fx.write("old.json", "{}");
        fx.write_lock(&lock_with("old.json", locked(1, "h", Format::Json)));
        let mut backend = FakeBackend::default().with("db.json", None, None, Format::Json);
        let console = ScriptedConsole::with_answers(["y"]);

        let report = fx
            .sync(RunMode::interactive(), &mut backend, &console, SyncOptions::default())
            .await
            .unwrap();

        assert_eq!(report.deleted, vec!["old.json"]);
        assert!(!fx.path("old.json").exists());
        assert!(fx.lock().get("old.json").is_none());
        assert_eq!(console.questions(), vec!["Delete file? (Y/n)"]);
    }

    /// `db.json` configured as json, holding the same data as yaml
    fn yaml_copy_of_json_secret() -> (Fixture, FakeBackend, LocalContent) {
        let fx = Fixture::new(&[entry_yaml("db.json", None, "json")]);
        fx.write("db.json", "a: 1\n");
        let backend = FakeBackend::default().with("db.json", Some(json!({"a": 1})), Some(3), Format::Json);
        let local = LocalContent::parse(fx.read("db.json").as_bytes(), Some(Format::Yaml), Format::Json);
        (fx, backend, local)
    }

    #[test]
    fn test_classify_format_mismatch() {
        let value = json!({"a": 1});
        let hash = canonical_hash(&value);
        let writer = Box::new(FakeWriter {
            file: "db.json".to_string(),
            uploads: Uploads::default(),
            new_version: 2,
        });
        let remote = FetchedSecret::found(value, Some(RemoteVersion::from(1)), Format::Json, writer);
        let local = LocalContent::parse(b"a: 1\n", Some(Format::Yaml), Format::Json);

        assert_eq!(
            classify(&local, &remote, Some(&hash), None),
            Situation::FormatMismatch { upgrade: false }
        );
        assert_eq!(
            classify(&local, &remote, Some(&hash), Some(&locked(1, &hash, Format::Json))),
            Situation::FormatMismatch { upgrade: false }
        );
        assert_eq!(
            classify(&local, &remote, Some(&hash), Some(&locked(1, &hash, Format::Yaml))),
            Situation::FormatMismatch { upgrade: true }
        );
    }

    #[tokio::test]
    async fn test_format_mismatch_reported_in_batch_mode() {
        let (fx, mut backend, local) = yaml_copy_of_json_secret();
        let console = ScriptedConsole::new();

        let (outcome, record) = fx
            .reconcile(RunMode::batch(), &mut backend, &console, SyncOptions::default(), local, None)
            .await
            .unwrap();

        assert_eq!(outcome, Outcome::Skipped);
        assert_eq!(record, None);
        assert_eq!(fx.read("db.json"), "a: 1\n");
        assert_eq!(
            console.notices(),
            vec![
                "Secret 'db.json' has the same data but in a different format, use the --fix flag to fix it",
                "    skipped",
            ]
        );
    }

    #[tokio::test]
    async fn test_format_mismatch_fixed_with_fix_flag() {
        let (fx, mut backend, local) = yaml_copy_of_json_secret();
        let previous = locked(1, "stale", Format::Json);
        let console = ScriptedConsole::new();
        let options = SyncOptions {
            fix: true,
            ..Default::default()
        };

        let (outcome, record) = fx
            .reconcile(RunMode::batch(), &mut backend, &console, options, local, Some(&previous))
            .await
            .unwrap();

        assert_eq!(outcome, Outcome::Pulled);
        assert_eq!(fx.read("db.json"), "{\n    \"a\": 1\n}\n");
        assert_eq!(record.unwrap().local_format, Some(Format::Json));
        assert_eq!(
            console.notices(),
            vec![
                "Updating secret 'db.json' to correct format (--fix flag is enabled)",
                "    done",
            ]
        );
        assert!(backend.uploads().is_empty());
    }

    #[tokio::test]
    async fn test_format_mismatch_fixed_in_cicd_mode() {
        let (fx, mut backend, local) = yaml_copy_of_json_secret();
        let console = ScriptedConsole::new();

        let (outcome, _) = fx
            .reconcile(RunMode::cicd(), &mut backend, &console, SyncOptions::default(), local, None)
            .await
            .unwrap();

        assert_eq!(outcome, Outcome::Pulled);
        assert_eq!(
            console.notices()[0],
            "Updating secret 'db.json' to correct format (--cicd flag is enabled)"
        );
    }

    #[tokio::test]
    async fn test_format_mismatch_asks_before_fixing() {
        let (fx, mut backend, local) = yaml_copy_of_json_secret();
        let console = ScriptedConsole::with_answers([""]);

        let (outcome, _) = fx
            .reconcile(RunMode::interactive(), &mut backend, &console, SyncOptions::default(), local, None)
            .await
            .unwrap();

        assert_eq!(outcome, Outcome::Pulled);
        assert_eq!(console.questions(), vec!["Fix format? (Y/n)"]);
        assert_eq!(
            console.notices()[0],
            "Secret 'db.json' has the same data but in a different format, do you want to fix it?"
        );
        assert_eq!(fx.read("db.json"), "{\n    \"a\": 1\n}\n");
    }

    #[tokio::test]
    async fn test_format_mismatch_declined_keeps_file() {
        let (fx, mut backend, local) = yaml_copy_of_json_secret();
        let console = ScriptedConsole::with_answers(["n"]);

        let (outcome, _) = fx
            .reconcile(RunMode::interactive(), &mut backend, &console, SyncOptions::default(), local, None)
            .await
            .unwrap();

        assert_eq!(outcome, Outcome::Skipped);
        assert_eq!(fx.read("db.json"), "a: 1\n");
        assert_eq!(console.notices().last().map(String::as_str), Some("    skipped"));
    }

    #[tokio::test]
    async fn test_unparsable_local_with_missing_remote_is_never_fixed() {
        let runs = [
            (RunMode::batch(), SyncOptions::default()),
            (
                RunMode::batch(),
                SyncOptions {
                    fix: true,
                    ..Default::default()
                },
            ),
            (RunMode::cicd(), SyncOptions::default()),
            (RunMode::interactive(), SyncOptions::default()),
        ];

        for (mode, options) in runs {
            let fx = Fixture::new(&[entry_yaml("db.json", None, "json")]);
            fx.write("db.json", "{broken");
            let mut backend = FakeBackend::default().with("db.json", None, Some(4), Format::Json);
            let console = ScriptedConsole::new();

            let report = fx.sync(mode, &mut backend, &console, options).await.unwrap();

            assert_eq!(report.outcome("db.json"), Some(Outcome::Skipped));
            assert_eq!(fx.read("db.json"), "{broken");
            assert!(backend.uploads().is_empty());
            assert!(console.questions().is_empty());
            assert_eq!(
                console.notices()[..2],
                [
                    "Failed to parse secret 'db.json' and its remote secret is incomplete or does not exist",
                    "    skipped",
                ]
            );
            assert!(fx.lock().get("db.json").is_none());
        }
    }
}
