//! Vault credentials and the user credential store
//!
//! The store lives in `~/.config/secretsync/auth.json`:
//!
//! ```json
//! {"vault": {"vault.example.com": {"userpass": {"username": "me", "password": "..."}}}}
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use secretsync_common::{read_json_file, write_json_file, ConfigDir, Console, RunMode};
use secretsync_data::fingerprint;
use serde::{Deserialize, Serialize};

use crate::VaultError;

/// Name of the credential store object in the user config directory
pub const CREDENTIAL_STORE_NAME: &str = "auth";

/// Default mount of the OIDC auth method
pub const DEFAULT_OIDC_MOUNT: &str = "oidc";

fn default_oidc_mount() -> String {
    DEFAULT_OIDC_MOUNT.to_string()
}

/// One way of authenticating against a Vault host
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum VaultCredential {
    /// A bare token, used as-is and never cached
    Token(String),
    Userpass {
        username: String,
        password: String,
    },
    AppRole {
        #[serde(rename = "roleID")]
        role_id: String,
        #[serde(rename = "secretID")]
        secret_id: String,
    },
    /// Browser login through the OIDC auth method (interactive only)
    Oidc {
        #[serde(default = "default_oidc_mount")]
        mount: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        role: Option<String>,
    },
}

impl VaultCredential {
    /// Auth method name used in token cache keys
    pub fn method_name(&self) -> &'static str {
        match self {
            VaultCredential::Token(_) => "token",
            VaultCredential::Userpass { .. } => "userpass",
            VaultCredential::AppRole { .. } => "approle",
            VaultCredential::Oidc { .. } => "oidc",
        }
    }

    /// Stable, non-secret identity of the credential
    pub fn identity(&self) -> String {
        match self {
            VaultCredential::Token(token) => fingerprint(token),
            VaultCredential::Userpass { username, .. } => username.clone(),
            VaultCredential::AppRole { role_id, .. } => role_id.clone(),
            VaultCredential::Oidc { mount, role } => match role {
                Some(role) => format!("{mount}/{role}"),
                None => mount.clone(),
            },
        }
    }

    /// Whether tokens derived from this credential go to the token cache
    pub fn is_cacheable(&self) -> bool {
        !matches!(self, VaultCredential::Token(_))
    }
}

impl fmt::Debug for VaultCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VaultCredential::Token(_) => f.write_str("Token(<redacted>)"),
            VaultCredential::Userpass { username, .. } => f
                .debug_struct("Userpass")
                .field("username", username)
                .finish_non_exhaustive(),
            VaultCredential::AppRole { role_id, .. } => f
                .debug_struct("AppRole")
                .field("role_id", role_id)
                .finish_non_exhaustive(),
            VaultCredential::Oidc { mount, role } => f
                .debug_struct("Oidc")
                .field("mount", mount)
                .field("role", role)
                .finish(),
        }
    }
}

/// Credentials per Vault host (`host[:port]`)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CredentialSet {
    #[serde(default)]
    pub vault: BTreeMap<String, VaultCredential>,
}

impl CredentialSet {
    /// Read a credential file such as one passed with `--auth-config`
    pub fn load_file(path: &Path) -> Result<Self, VaultError> {
        Ok(read_json_file(path)?)
    }

    pub fn save_file(&self, path: &Path) -> Result<(), VaultError> {
        Ok(write_json_file(path, self)?)
    }

    pub fn get(&self, host: &str) -> Option<&VaultCredential> {
        self.vault.get(host)
    }

    pub fn insert(&mut self, host: impl Into<String>, credential: VaultCredential) {
        self.vault.insert(host.into(), credential);
    }

    /// Overlay `other`; its hosts win
    pub fn merge(&mut self, other: CredentialSet) {
        self.vault.extend(other.vault);
    }

    pub fn hosts(&self) -> impl Iterator<Item = &str> {
        self.vault.keys().map(String::as_str)
    }
}

/// Credential store in the user config directory
#[derive(Debug, Clone)]
pub struct CredentialStore {
    dir: ConfigDir,
}

impl CredentialStore {
    pub fn new(dir: ConfigDir) -> Self {
        Self { dir }
    }

    pub fn load(&self) -> Result<CredentialSet, VaultError> {
        Ok(self.dir.load(CREDENTIAL_STORE_NAME)?)
    }

    /// Persist one host's credential, keeping the others
    pub fn save_credential(&self, host: &str, credential: &VaultCredential) -> Result<(), VaultError> {
        let mut set = self.load()?;
        set.insert(host, credential.clone());
        self.dir.save(CREDENTIAL_STORE_NAME, &set)?;
        tracing::info!(host = %host, method = credential.method_name(), "Saved Vault credential");
        Ok(())
    }
}

/// Credential material supplied on the command line
#[derive(Debug, Clone, Default)]
pub struct LoginArgs {
    pub token: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub role_id: Option<String>,
    pub secret_id: Option<String>,
    pub oidc: bool,
    pub oidc_mount: Option<String>,
    pub oidc_role: Option<String>,
}

impl LoginArgs {
    /// Pick a credential: token, then userpass, then approle, then OIDC,
    /// then an interactive chooser
    pub fn resolve(&self, mode: RunMode, console: &dyn Console) -> Result<VaultCredential, VaultError> {
        if self.password.is_some() && self.username.is_none() {
            return Err(VaultError::config("a password was given without a username"));
        }
        if self.secret_id.is_some() && self.role_id.is_none() {
            return Err(VaultError::config("a secret ID was given without a role ID"));
        }

        if let Some(token) = &self.token {
            return Ok(VaultCredential::Token(token.clone()));
        }

        if let Some(username) = &self.username {
            let password = match &self.password {
                Some(password) => password.clone(),
                None if mode.interactive => console.ask_hidden("Password")?,
                None => return Err(VaultError::config("a username was given without a password")),
            };
            return Ok(VaultCredential::Userpass {
                username: username.clone(),
                password,
            });
        }

        if let Some(role_id) = &self.role_id {
            let secret_id = match &self.secret_id {
                Some(secret_id) => secret_id.clone(),
                None if mode.interactive => console.ask_hidden("Secret ID")?,
                None => return Err(VaultError::config("a role ID was given without a secret ID")),
            };
            return Ok(VaultCredential::AppRole {
                role_id: role_id.clone(),
                secret_id,
            });
        }

        if self.oidc {
            if !mode.interactive {
                return Err(VaultError::config("OIDC login needs an interactive terminal"));
            }
            return Ok(VaultCredential::Oidc {
                mount: self.oidc_mount.clone().unwrap_or_else(default_oidc_mount),
                role: self.oidc_role.clone(),
            });
        }

        if mode.interactive {
            return prompt_credential(console);
        }

        Err(VaultError::config(
            "no credential given; pass --token, --username, --role-id or --oidc",
        ))
    }
}

/// Ask which auth method to use, then for its fields
pub fn prompt_credential(console: &dyn Console) -> Result<VaultCredential, VaultError> {
    let methods = vec![
        "userpass".to_string(),
        "token".to_string(),
        "approle".to_string(),
        "oidc".to_string(),
    ];

    Ok(match console.choose("Auth method", &methods)? {
        0 => prompt_userpass(console)?,
        1 => VaultCredential::Token(console.ask_hidden("Token")?),
        2 => VaultCredential::AppRole {
            role_id: console.ask("Role ID")?,
            secret_id: console.ask_hidden("Secret ID")?,
        },
        _ => {
            let mount = console.ask(&format!("OIDC mount [{DEFAULT_OIDC_MOUNT}]"))?;
            let role = console.ask("OIDC role (empty for the default role)")?;
            VaultCredential::Oidc {
                mount: if mount.is_empty() { default_oidc_mount() } else { mount },
                role: (!role.is_empty()).then_some(role),
            }
        }
    })
}

pub fn prompt_userpass(console: &dyn Console) -> Result<VaultCredential, VaultError> {
    Ok(VaultCredential::Userpass {
        username: console.ask("Username")?,
        password: console.ask_hidden("Password")?,
    })
}
