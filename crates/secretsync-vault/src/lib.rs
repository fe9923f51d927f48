//! Vault KV v2 backend for secretsync
//!
//! - [`VaultAuth`]: per-host credentials, token validation and the token cache
//! - [`VaultSecretConfig`]: fetches a secret and projects it through its [`Mapping`]
//! - [`FetchedSecret`]: the fetched value plus a check-and-set writer bound to it
//!
//! Secrets are addressed as `https://<host>/<mount>/<path>`; API calls go to
//! `/v1/<mount>/data/<path>`.

mod api;
mod auth;
pub mod credential;
mod error;
mod fetched;
pub mod oidc;
mod secret;
pub mod token_cache;

pub use api::{KvDocument, VaultApi, VaultHost, WriteOutcome, CAS_MISMATCH};
pub use auth::{HostState, VaultAuth};
pub use credential::{CredentialSet, CredentialStore, LoginArgs, VaultCredential};
pub use error::VaultError;
pub use fetched::{FetchedSecret, SecretWriter};
pub use secret::{Mapping, SecretLocation, VaultSecretConfig, MAX_CAS_ATTEMPTS};
pub use token_cache::{cache_key, CachedToken, TokenCache, TOKEN_TTL_SECS};
