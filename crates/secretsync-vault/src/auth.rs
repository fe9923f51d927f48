//! Per-host authentication state and token lifecycle
//!
//! A host moves from unconfigured to configuring (while prompting for a
//! credential) to ready. Tokens are validated once per process; derived tokens
//! are kept in the [`TokenCache`] across runs.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

use secretsync_common::{ConfigDir, Console, RunMode};

use crate::credential::{prompt_userpass, CredentialSet, CredentialStore, VaultCredential};
use crate::token_cache::{cache_key, TokenCache};
use crate::{oidc, VaultApi, VaultError, VaultHost};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostState {
    Configuring,
    Ready,
}

/// Authentication context shared by every Vault secret of a run
pub struct VaultAuth {
    api: VaultApi,
    mode: RunMode,
    console: Arc<dyn Console>,
    credentials: CredentialSet,
    store: Option<CredentialStore>,
    cache: TokenCache,
    hosts: HashMap<String, HostState>,
    /// Cache keys whose token was accepted during this process
    validated: HashSet<String>,
}

impl VaultAuth {
    pub fn new(
        api: VaultApi,
        mode: RunMode,
        console: Arc<dyn Console>,
        credentials: CredentialSet,
        store: Option<CredentialStore>,
        cache: TokenCache,
    ) -> Self {
        Self {
            api,
            mode,
            console,
            credentials,
            store,
            cache,
            hosts: HashMap::new(),
            validated: HashSet::new(),
        }
    }

    /// Build the context from the user config directory and extra credential files
    ///
    /// In CI/CD mode nothing is read from or written to the user config
    /// directory; only `extra_credentials` are used. Other non-interactive
    /// runs read the token cache but never write it.
    pub fn from_config(
        mode: RunMode,
        console: Arc<dyn Console>,
        config_dir: ConfigDir,
        extra_credentials: &[PathBuf],
    ) -> Result<Self, VaultError> {
        let (mut credentials, store, cache) = if mode.cicd {
            (CredentialSet::default(), None, TokenCache::in_memory())
        } else {
            let store = CredentialStore::new(config_dir.clone());
            let cache = if mode.interactive {
                TokenCache::load(config_dir)?
            } else {
                TokenCache::load_read_only(&config_dir)?
            };
            (store.load()?, Some(store), cache)
        };

        for path in extra_credentials {
            tracing::debug!(path = %path.display(), "Loading extra Vault credentials");
            credentials.merge(CredentialSet::load_file(path)?);
        }

        Ok(Self::new(VaultApi::new(), mode, console, credentials, store, cache))
    }

    pub fn api(&self) -> &VaultApi {
        &self.api
    }

    pub fn mode(&self) -> RunMode {
        self.mode
    }

    pub fn credentials(&self) -> &CredentialSet {
        &self.credentials
    }

    pub fn host_state(&self, host: &VaultHost) -> Option<HostState> {
        self.hosts.get(host.name()).copied()
    }

    /// Make sure a credential is available for `host`
    ///
    /// Interactive runs prompt for a username and password once, verify them
    /// and save them to the credential store.
    pub async fn prepare_for_host(&mut self, host: &VaultHost) -> Result<(), VaultError> {
        if self.host_state(host) == Some(HostState::Ready) {
            return Ok(());
        }

        if self.credentials.get(host.name()).is_some() {
            self.hosts.insert(host.name().to_string(), HostState::Ready);
            return Ok(());
        }

        if !self.mode.interactive {
            return Err(VaultError::AuthMissing {
                host: host.name().to_string(),
            });
        }

        self.hosts.insert(host.name().to_string(), HostState::Configuring);
        self.console.notice(&format!(
            "No auth config for Vault instance at '{host}', please enter a username and password to be saved locally"
        ));

        let (credential, token) = loop {
            let credential = prompt_userpass(self.console.as_ref())?;
            match self.login(host, &credential).await {
                Ok(token) => break (credential, token),
                Err(e @ (VaultError::AuthFailed { .. } | VaultError::Status { .. })) => {
                    self.console.notice(&format!("{e}, please try again"));
                }
                Err(e) => return Err(e),
            }
        };

        if let Some(store) = &self.store {
            store.save_credential(host.name(), &credential)?;
        }
        self.remember(host, &credential, &token)?;
        self.credentials.insert(host.name(), credential);
        self.hosts.insert(host.name().to_string(), HostState::Ready);

        Ok(())
    }

    /// Token for a prepared host
    ///
    /// A token already validated in this process is returned without any
    /// network call. A cached token is validated once; if rejected it is
    /// dropped and the credential is exchanged again.
    pub async fn get_token(&mut self, host: &VaultHost) -> Result<String, VaultError> {
        if self.host_state(host) != Some(HostState::Ready) {
            return Err(VaultError::AuthMissing {
                host: host.name().to_string(),
            });
        }
        let credential = self
            .credentials
            .get(host.name())
            .cloned()
            .ok_or_else(|| VaultError::AuthMissing {
                host: host.name().to_string(),
            })?;
        let key = cache_key(host.name(), &credential);

        if let VaultCredential::Token(token) = &credential {
            if !self.validated.contains(&key) {
                if !self.api.lookup_self(host, token).await? {
                    return Err(VaultError::auth_failed(host.name(), "token was rejected"));
                }
                self.validated.insert(key);
            }
            return Ok(token.clone());
        }

        if let Some(cached) = self.cache.get(&key).map(|c| c.token.clone()) {
            if self.validated.contains(&key) {
                return Ok(cached);
            }

            if self.api.lookup_self(host, &cached).await? {
                tracing::debug!(host = %host, "Reusing cached Vault token");
                self.validated.insert(key.clone());
                self.cache.insert(&key, &cached)?;
                return Ok(cached);
            }

            tracing::info!(host = %host, "Cached Vault token was rejected, logging in again");
            self.cache.remove(&key)?;
        }

        let token = self.login(host, &credential).await?;
        self.remember(host, &credential, &token)?;
        Ok(token)
    }

    /// Exchange `credential` for a token and keep it, without storing the credential
    pub async fn verify_credential(
        &mut self,
        host: &VaultHost,
        credential: &VaultCredential,
    ) -> Result<(), VaultError> {
        let token = match credential {
            VaultCredential::Token(token) => {
                if !self.api.lookup_self(host, token).await? {
                    return Err(VaultError::auth_failed(host.name(), "token was rejected"));
                }
                token.clone()
            }
            _ => self.login(host, credential).await?,
        };
        self.remember(host, credential, &token)
    }

    async fn login(&self, host: &VaultHost, credential: &VaultCredential) -> Result<String, VaultError> {
        tracing::info!(host = %host, method = credential.method_name(), "Logging in to Vault");

        match credential {
            VaultCredential::Token(token) => Ok(token.clone()),
            VaultCredential::Userpass { username, password } => {
                self.api.login_userpass(host, username, password).await
            }
            VaultCredential::AppRole { role_id, secret_id } => {
                self.api.login_approle(host, role_id, secret_id).await
            }
            VaultCredential::Oidc { mount, role } => {
                if !self.mode.interactive {
                    return Err(VaultError::config("OIDC login needs an interactive terminal"));
                }
                oidc::login(&self.api, host, mount, role.as_deref(), self.console.as_ref()).await
            }
        }
    }

    fn remember(
        &mut self,
        host: &VaultHost,
        credential: &VaultCredential,
        token: &str,
    ) -> Result<(), VaultError> {
        let key = cache_key(host.name(), credential);
        self.validated.insert(key.clone());

        if credential.is_cacheable() {
            self.cache.insert(&key, token)?;
        }
        Ok(())
    }
}
