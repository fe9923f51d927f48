//! Seam between the reconciliation engine and the secret backends

use async_trait::async_trait;
use secretsync_vault::{FetchedSecret, VaultAuth};

use crate::{BackendConfig, SecretEntry, SyncError};

/// Prepares and fetches the remote side of entries
#[async_trait]
pub trait SecretBackend: Send {
    /// Make sure the entry can be fetched, e.g. by setting up credentials
    async fn prepare(&mut self, entry: &SecretEntry) -> Result<(), SyncError>;

    async fn fetch(&mut self, entry: &SecretEntry) -> Result<FetchedSecret, SyncError>;
}

/// Backend for entries configured with `vault:`
pub struct VaultBackend {
    auth: VaultAuth,
}

impl VaultBackend {
    pub fn new(auth: VaultAuth) -> Self {
        Self { auth }
    }

    pub fn auth(&self) -> &VaultAuth {
        &self.auth
    }
}

#[async_trait]
impl SecretBackend for VaultBackend {
    async fn prepare(&mut self, entry: &SecretEntry) -> Result<(), SyncError> {
        match &entry.backend {
            BackendConfig::Vault(config) => Ok(config.prepare(&mut self.auth).await?),
        }
    }

    async fn fetch(&mut self, entry: &SecretEntry) -> Result<FetchedSecret, SyncError> {
        match &entry.backend {
            BackendConfig::Vault(config) => Ok(config.fetch(&mut self.auth).await?),
        }
    }
}
