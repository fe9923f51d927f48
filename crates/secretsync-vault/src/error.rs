use reqwest::StatusCode;
use secretsync_common::{ConsoleError, StoreError};
use secretsync_data::DataError;
use thiserror::Error;

/// Errors from the Vault backend
#[derive(Debug, Error)]
pub enum VaultError {
    /// Malformed secret URL or mapping
    #[error("Invalid Vault configuration: {0}")]
    Config(String),

    /// No credential configured for a host and no way to ask for one
    #[error("No auth config for Vault instance at '{host}'")]
    AuthMissing { host: String },

    /// The host rejected the credential
    #[error("Login to Vault instance at '{host}' failed: {reason}")]
    AuthFailed { host: String, reason: String },

    /// Network or HTTP client failure
    #[error("HTTP request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// Unexpected HTTP status
    #[error("Got status {status} while {context}")]
    Status { status: StatusCode, context: String },

    /// Response body did not have the expected shape
    #[error("Unexpected response from Vault: {0}")]
    Decode(String),

    /// Check-and-set kept failing because other writers raced us
    #[error("Remote secret kept changing during push, gave up after {attempts} attempts")]
    VersionConflict { attempts: u32 },

    #[error(transparent)]
    Data(#[from] DataError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Prompt(#[from] ConsoleError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl VaultError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub fn auth_failed(host: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::AuthFailed {
            host: host.into(),
            reason: reason.into(),
        }
    }

    pub fn status(status: StatusCode, context: impl Into<String>) -> Self {
        Self::Status {
            status,
            context: context.into(),
        }
    }
}
