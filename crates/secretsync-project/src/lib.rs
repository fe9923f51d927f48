//! secretsync project model and reconciliation engine
//!
//! A project is a `secrets.yaml` listing the tracked files, the `secrets.lock`
//! recording the last reconciled state of each file, and an optional
//! `.localsecretclasses` selecting which classed entries this checkout syncs.
//! [`Project::sync`] reconciles every selected entry with its remote secret
//! through a [`SecretBackend`].

mod backend;
mod classes;
mod config;
mod error;
mod gitignore;
mod lock;
mod sync;

pub use backend::{SecretBackend, VaultBackend};
pub use classes::{ClassFilter, ClassUpdate};
pub use config::{BackendConfig, Project, ProjectConfig, SecretEntry, CLASS_FILE, LOCK_FILE, PROJECT_FILE};
pub use error::SyncError;
pub use gitignore::ensure_ignored;
pub use lock::{LocalContent, LockState, LockedFile};
pub use sync::{Outcome, SyncOptions, SyncReport};
