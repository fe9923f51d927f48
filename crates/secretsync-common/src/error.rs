use std::path::PathBuf;

use thiserror::Error;

/// Errors from reading or writing files in the user config directory
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Failed to access '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid JSON in '{path}': {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Config path '{0}' is not a directory")]
    NotADirectory(PathBuf),
}

/// Errors from interactive prompts
#[derive(Debug, Error)]
pub enum ConsoleError {
    #[error("Prompt interrupted")]
    Interrupted,

    #[error("Terminal error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}
