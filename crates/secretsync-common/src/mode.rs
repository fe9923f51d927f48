//! How the current process may interact with its user

use std::env;

/// Environment variable that enables CI/CD mode when non-empty
pub const CICD_ENV: &str = "CICD";

/// Run mode resolved once at startup and passed to every component
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunMode {
    /// Streamlined, non-interactive CI/CD operation: resolve conflicts from
    /// the remote copy and never persist anything to the user config directory
    pub cicd: bool,
    /// A user is at a terminal and may be prompted
    pub interactive: bool,
}

impl RunMode {
    /// Build a run mode; CI/CD mode is never interactive
    pub fn new(cicd: bool, tty: bool) -> Self {
        Self {
            cicd,
            interactive: tty && !cicd,
        }
    }

    /// Resolve from the `--cicd` flag, the `CICD` variable and TTY detection
    pub fn detect(cicd_flag: bool, tty: bool) -> Self {
        let cicd_env = env::var(CICD_ENV)
            .map(|value| !value.is_empty())
            .unwrap_or(false);
        Self::new(cicd_flag || cicd_env, tty)
    }

    pub fn cicd() -> Self {
        Self::new(true, false)
    }

    pub fn interactive() -> Self {
        Self::new(false, true)
    }

    /// No TTY and no CI/CD flag: report problems but never act on them
    pub fn batch() -> Self {
        Self::new(false, false)
    }
}
