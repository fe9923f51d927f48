use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use crossterm::tty::IsTty;
use secretsync_common::RunMode;
use tracing_subscriber::EnvFilter;

mod commands;

/// secretsync - keep local secret files in sync with Vault
#[derive(Parser, Debug)]
#[command(name = "secretsync", version)]
#[command(about = "Sync local secret files with secrets stored in Vault")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Non-interactive CI/CD mode (also enabled by a non-empty CICD variable)
    #[arg(long, global = true)]
    cicd: bool,

    /// Extra credential file to load (repeatable)
    #[arg(long = "auth-config", value_name = "FILE", global = true)]
    auth_config: Vec<String>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Reconcile local secret files with their remote secrets
    Sync(SyncArgs),

    /// Track a new secret file
    Add {
        /// Path of the local file, relative to the current directory
        file: String,
    },

    /// Manage user configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },

    /// Show the build version and commit
    Version,
}

#[derive(Args, Debug)]
struct SyncArgs {
    /// Class selection changes, e.g. "+all,-staging" or "+dev"
    classes: Option<String>,

    /// Resolve conflicts with the remote copy
    #[arg(long)]
    pull: bool,

    /// Resolve conflicts with the local copy
    #[arg(long)]
    push: bool,

    /// Fix incomplete remote secrets, unparsable files and wrong formats without asking
    #[arg(long)]
    fix: bool,
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Verify and save a Vault credential
    Login(LoginCommand),
}

#[derive(Args, Debug)]
struct LoginCommand {
    /// Vault host, e.g. vault.example.com
    host: Option<String>,

    /// Vault token
    #[arg(long)]
    token: Option<String>,

    /// Userpass username
    #[arg(long)]
    username: Option<String>,

    /// Userpass password (prompted when omitted)
    #[arg(long)]
    password: Option<String>,

    /// AppRole role ID
    #[arg(long)]
    role_id: Option<String>,

    /// AppRole secret ID (prompted when omitted)
    #[arg(long)]
    secret_id: Option<String>,

    /// Log in through the browser with OIDC
    #[arg(long)]
    oidc: bool,

    /// Mount of the OIDC auth method
    #[arg(long)]
    oidc_mount: Option<String>,

    /// OIDC role (the mount's default role when omitted)
    #[arg(long)]
    oidc_role: Option<String>,

    /// Save to this credential file instead of the user config
    #[arg(long, value_name = "FILE")]
    save_to: Option<String>,
}

/// Settings shared by every command
struct Context {
    mode: RunMode,
    /// Emit colors and styling
    color: bool,
    auth_configs: Vec<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_logging(cli.verbose) {
        eprintln!("Error: failed to set up logging: {e:#}");
        return ExitCode::FAILURE;
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let tty = io::stdout().is_tty();
    let mode = RunMode::detect(cli.cicd, tty);
    tracing::debug!(cicd = mode.cicd, interactive = mode.interactive, "Resolved run mode");

    let ctx = Context {
        mode,
        color: tty,
        auth_configs: cli
            .auth_config
            .iter()
            .map(|path| PathBuf::from(shellexpand::tilde(path).into_owned()))
            .collect(),
    };

    match cli.command {
        Commands::Sync(args) => commands::sync(&ctx, args).await,
        Commands::Add { file } => commands::add(&ctx, &file),
        Commands::Config {
            command: ConfigCommands::Login(args),
        } => commands::login(&ctx, args).await,
        Commands::Version => {
            println!("{}", version_text());
            Ok(())
        }
    }
}

/// `SECRETSYNC_COMMIT` is read at build time when set
fn version_text() -> String {
    format!(
        "Build Version: {}\nBuild Commit: {}",
        env!("CARGO_PKG_VERSION"),
        option_env!("SECRETSYNC_COMMIT").unwrap_or("unknown")
    )
}

fn init_logging(verbose: bool) -> Result<()> {
    let level = if verbose { "debug" } else { "info" };

    let mut filter = EnvFilter::from_default_env();
    for target in ["secretsync", "secretsync_vault", "secretsync_project"] {
        filter = filter.add_directive(format!("{target}={level}").parse()?);
    }

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
    Ok(())
}
