use std::fmt;

use async_trait::async_trait;
use secretsync_data::{Format, RemoteVersion, Value};

use crate::VaultError;

/// Writes a new value back to the remote secret a [`FetchedSecret`] came from
#[async_trait]
pub trait SecretWriter: Send + Sync {
    /// Replace the mapped value and return the new remote version
    async fn upload_new(&self, value: &Value) -> Result<RemoteVersion, VaultError>;
}

/// Result of fetching one remote secret
pub struct FetchedSecret {
    value: Option<Value>,
    version: Option<RemoteVersion>,
    format: Format,
    writer: Box<dyn SecretWriter>,
}

impl FetchedSecret {
    /// The mapped value exists
    pub fn found(
        value: Value,
        version: Option<RemoteVersion>,
        format: Format,
        writer: Box<dyn SecretWriter>,
    ) -> Self {
        Self {
            value: Some(value),
            version,
            format,
            writer,
        }
    }

    /// The document, or the mapped path inside it, does not exist
    pub fn missing(version: Option<RemoteVersion>, format: Format, writer: Box<dyn SecretWriter>) -> Self {
        Self {
            value: None,
            version,
            format,
            writer,
        }
    }

    pub fn value(&self) -> Option<&Value> {
        self.value.as_ref()
    }

    pub fn version(&self) -> Option<&RemoteVersion> {
        self.version.as_ref()
    }

    /// Format the local file is configured to use
    pub fn format(&self) -> Format {
        self.format
    }

    pub fn is_missing_data(&self) -> bool {
        self.value.is_none()
    }

    pub async fn upload_new(&self, value: &Value) -> Result<RemoteVersion, VaultError> {
        self.writer.upload_new(value).await
    }
}

impl fmt::Debug for FetchedSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchedSecret")
            .field("present", &self.value.is_some())
            .field("version", &self.version)
            .field("format", &self.format)
            .finish_non_exhaustive()
    }
}
