use std::path::PathBuf;

use secretsync_common::ConsoleError;
use secretsync_data::DataError;
use secretsync_vault::VaultError;
use thiserror::Error;

/// Errors that abort a project operation
#[derive(Debug, Error)]
pub enum SyncError {
    /// Malformed project file or command-line options
    #[error("{0}")]
    Config(String),

    #[error(transparent)]
    Vault(#[from] VaultError),

    #[error(transparent)]
    Data(#[from] DataError),

    #[error("Failed to access '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid YAML in '{path}': {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error(transparent)]
    Prompt(#[from] ConsoleError),
}

impl SyncError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn yaml(path: impl Into<PathBuf>, source: serde_yaml::Error) -> Self {
        Self::Yaml {
            path: path.into(),
            source,
        }
    }
}
