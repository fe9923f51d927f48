//! Command handlers

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context as _, Result};
use secretsync_common::{ConfigDir, Console};
use secretsync_project::{ClassUpdate, Outcome, Project, SyncOptions, VaultBackend, PROJECT_FILE};
use secretsync_tui::{AddWizard, TerminalConsole};
use secretsync_vault::{CredentialSet, CredentialStore, LoginArgs, VaultAuth, VaultHost};

use crate::{Context, LoginCommand, SyncArgs};

pub(crate) async fn sync(ctx: &Context, args: SyncArgs) -> Result<()> {
    let classes = match &args.classes {
        Some(raw) => ClassUpdate::parse(raw)?,
        None => ClassUpdate::default(),
    };
    let options = SyncOptions {
        pull: args.pull,
        push: args.push,
        fix: args.fix,
        classes,
    };

    let workdir = std::env::current_dir().context("Failed to read the working directory")?;
    let mut project = Project::open(&workdir, ctx.mode)?;

    let console: Arc<dyn Console> = Arc::new(TerminalConsole::new(ctx.color));
    let auth = VaultAuth::from_config(
        ctx.mode,
        console.clone(),
        ConfigDir::user_default(),
        &ctx.auth_configs,
    )
    .context("Failed to load Vault credentials")?;
    let mut backend = VaultBackend::new(auth);

    let report = project
        .sync(&mut backend, console.as_ref(), &options)
        .await?;

    tracing::debug!(
        up_to_date = report.count(Outcome::UpToDate),
        missing = report.count(Outcome::Missing),
        kept = report.kept.len(),
        "Sync report"
    );
    Ok(())
}

pub(crate) fn add(ctx: &Context, file: &str) -> Result<()> {
    if !ctx.mode.interactive {
        bail!("'add' needs an interactive terminal");
    }

    let workdir = std::env::current_dir().context("Failed to read the working directory")?;
    let mut project = Project::open(&workdir, ctx.mode)?;
    let file = project_relative(project.root(), &workdir, file)?;

    if project.entries().iter().any(|entry| entry.file == file) {
        bail!("File '{file}' already exists in {PROJECT_FILE}");
    }

    let mut credentials = CredentialStore::new(ConfigDir::user_default())
        .load()
        .context("Failed to load Vault credentials")?;
    for path in &ctx.auth_configs {
        credentials.merge(CredentialSet::load_file(path)?);
    }

    let console = TerminalConsole::new(ctx.color);
    let entry = AddWizard::new(&console, credentials.hosts()).run(&file)?;

    project.add_entry(entry)?;
    project.save()?;
    console.notice(&format!(
        "Added '{file}' to {PROJECT_FILE}, run 'secretsync sync' to fetch it"
    ));
    Ok(())
}

pub(crate) async fn login(ctx: &Context, args: LoginCommand) -> Result<()> {
    if args.save_to.is_none() && ctx.mode.cicd {
        bail!("--save-to is required in CI/CD mode");
    }
    let console: Arc<dyn Console> = Arc::new(TerminalConsole::new(ctx.color));

    let host = match &args.host {
        Some(host) => host.clone(),
        None if ctx.mode.interactive => console.ask("Vault host")?,
        None => bail!("a Vault host is required"),
    };
    let host = VaultHost::parse(&host)?;

    let login_args = LoginArgs {
        token: args.token,
        username: args.username,
        password: args.password,
        role_id: args.role_id,
        secret_id: args.secret_id,
        oidc: args.oidc,
        oidc_mount: args.oidc_mount,
        oidc_role: args.oidc_role,
    };
    let credential = login_args.resolve(ctx.mode, console.as_ref())?;

    let mut auth = VaultAuth::from_config(
        ctx.mode,
        console.clone(),
        ConfigDir::user_default(),
        &ctx.auth_configs,
    )?;
    auth.verify_credential(&host, &credential)
        .await
        .with_context(|| format!("Failed to log in to '{host}'"))?;

    match &args.save_to {
        Some(path) => {
            let path = PathBuf::from(shellexpand::tilde(path).into_owned());
            let mut set = CredentialSet::load_file(&path)?;
            set.insert(host.name(), credential.clone());
            set.save_file(&path)?;
        }
        None => CredentialStore::new(ConfigDir::user_default())
            .save_credential(host.name(), &credential)?,
    }

    console.notice(&format!(
        "Saved {} credential for '{}'",
        credential.method_name(),
        host.name()
    ));
    Ok(())
}

/// `file` (relative to `workdir`) as a `/`-separated path relative to the project root
fn project_relative(root: &Path, workdir: &Path, file: &str) -> Result<String> {
    let mut absolute = PathBuf::new();
    for component in workdir.join(file).components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                absolute.pop();
            }
            other => absolute.push(other),
        }
    }

    let relative = absolute.strip_prefix(root).with_context(|| {
        format!("'{file}' is outside the project at '{}'", root.display())
    })?;

    let segments: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    if segments.is_empty() {
        bail!("'{file}' is not a file");
    }
    Ok(segments.join("/"))
}
