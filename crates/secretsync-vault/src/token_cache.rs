//! Persistent cache of tokens derived from credentials
//!
//! Stored as `~/.config/secretsync/vault.json`:
//! `{"tokenCache": {"<host>,<method>,<identity>": {"token": "...", "expires": <unix secs>}}}`.
//! Without a backing [`ConfigDir`] the cache only lives for the current run.

use std::collections::BTreeMap;

use chrono::Utc;
use secretsync_common::ConfigDir;
use serde::{Deserialize, Serialize};

use crate::{VaultCredential, VaultError};

/// Name of the token cache object in the user config directory
pub const TOKEN_CACHE_NAME: &str = "vault";

/// Lifetime given to a token each time it is cached or re-validated
pub const TOKEN_TTL_SECS: i64 = 30 * 24 * 60 * 60;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedToken {
    pub token: String,
    /// Unix timestamp (seconds) after which the entry is dropped
    pub expires: i64,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CacheFile {
    #[serde(default)]
    token_cache: BTreeMap<String, CachedToken>,
}

/// Unexpired entries of the cache file, plus how many were dropped
fn read_entries(store: &ConfigDir, now: i64) -> Result<(BTreeMap<String, CachedToken>, usize), VaultError> {
    let file: CacheFile = store.load(TOKEN_CACHE_NAME)?;
    let total = file.token_cache.len();

    let entries: BTreeMap<_, _> = file
        .token_cache
        .into_iter()
        .filter(|(_, cached)| cached.expires >= now)
        .collect();

    let evicted = total - entries.len();
    Ok((entries, evicted))
}

/// Cache key for tokens obtained with `credential` on `host`
pub fn cache_key(host: &str, credential: &VaultCredential) -> String {
    format!("{host},{},{}", credential.method_name(), credential.identity())
}

#[derive(Debug, Default)]
pub struct TokenCache {
    entries: BTreeMap<String, CachedToken>,
    store: Option<ConfigDir>,
}

impl TokenCache {
    /// A cache that is never written to disk
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Load the cache from `store`, evicting expired entries
    pub fn load(store: ConfigDir) -> Result<Self, VaultError> {
        Self::load_at(store, Utc::now().timestamp())
    }

    /// Load the cache from `store` without ever writing it back
    pub fn load_read_only(store: &ConfigDir) -> Result<Self, VaultError> {
        let (entries, _) = read_entries(store, Utc::now().timestamp())?;
        Ok(Self {
            entries,
            store: None,
        })
    }

    fn load_at(store: ConfigDir, now: i64) -> Result<Self, VaultError> {
        let (entries, evicted) = read_entries(&store, now)?;
        let cache = Self {
            entries,
            store: Some(store),
        };

        if evicted > 0 {
            tracing::debug!(evicted, "Evicted expired Vault tokens");
            cache.save()?;
        }
        Ok(cache)
    }

    pub fn get(&self, key: &str) -> Option<&CachedToken> {
        let now = Utc::now().timestamp();
        self.entries.get(key).filter(|cached| cached.expires >= now)
    }

    /// Store or refresh a token with a fresh TTL
    pub fn insert(&mut self, key: &str, token: &str) -> Result<(), VaultError> {
        self.entries.insert(
            key.to_string(),
            CachedToken {
                token: token.to_string(),
                expires: Utc::now().timestamp() + TOKEN_TTL_SECS,
            },
        );
        self.save()
    }

    pub fn remove(&mut self, key: &str) -> Result<(), VaultError> {
        if self.entries.remove(key).is_some() {
            self.save()?;
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn save(&self) -> Result<(), VaultError> {
        let Some(store) = &self.store else {
            return Ok(());
        };

        let file = CacheFile {
            token_cache: self.entries.clone(),
        };
        store.save(TOKEN_CACHE_NAME, &file)?;
        Ok(())
    }
}
