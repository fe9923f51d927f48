//! Vault KV v2 secrets as configured in `secrets.yaml`
//!
//! ```yaml
//! vault:
//!   url: https://vault.example.com/secret/app/db
//!   mapping:
//!     fromData:
//!       format: json
//!       path: credentials
//! ```

use async_trait::async_trait;
use secretsync_data::{path, DataFormat, Format, Path, RemoteVersion, Value};
use serde::{Deserialize, Serialize};
use serde_json::Map;
use url::Url;

use crate::api::WriteOutcome;
use crate::fetched::{FetchedSecret, SecretWriter};
use crate::{VaultApi, VaultAuth, VaultError, VaultHost};

/// Check-and-set attempts before a push gives up
pub const MAX_CAS_ATTEMPTS: u32 = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VaultSecretConfig {
    /// `https://<host>/<mount>/<path>`
    pub url: String,
    pub mapping: Mapping,
}

/// How a local file corresponds to part of a secret document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawMapping", into = "RawMapping")]
pub enum Mapping {
    /// A structured sub-document (the whole document for the root path)
    FromData { format: DataFormat, path: Path },
    /// A single string leaf
    FromText { path: Path },
}

impl Mapping {
    pub fn format(&self) -> Format {
        match self {
            Mapping::FromData { format, .. } => (*format).into(),
            Mapping::FromText { .. } => Format::Text,
        }
    }

    pub fn path(&self) -> &Path {
        match self {
            Mapping::FromData { path, .. } | Mapping::FromText { path } => path,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawMapping {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    from_data: Option<RawFromData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    from_text: Option<RawFromText>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawFromData {
    format: DataFormat,
    #[serde(default, skip_serializing_if = "Path::is_empty")]
    path: Path,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawFromText {
    path: Path,
}

impl TryFrom<RawMapping> for Mapping {
    type Error = String;

    fn try_from(raw: RawMapping) -> Result<Self, Self::Error> {
        match (raw.from_data, raw.from_text) {
            (Some(data), None) => Ok(Mapping::FromData {
                format: data.format,
                path: data.path,
            }),
            (None, Some(text)) if text.path.is_empty() => {
                Err("No path provided for fromText secret mapping".to_string())
            }
            (None, Some(text)) => Ok(Mapping::FromText { path: text.path }),
            (Some(_), Some(_)) => Err("mapping must set only one of fromData and fromText".to_string()),
            (None, None) => Err("No mapping provided for secret".to_string()),
        }
    }
}

impl From<Mapping> for RawMapping {
    fn from(mapping: Mapping) -> Self {
        match mapping {
            Mapping::FromData { format, path } => RawMapping {
                from_data: Some(RawFromData { format, path }),
                from_text: None,
            },
            Mapping::FromText { path } => RawMapping {
                from_data: None,
                from_text: Some(RawFromText { path }),
            },
        }
    }
}

/// Resolved API location of a secret
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretLocation {
    pub host: VaultHost,
    /// `https://<host>/v1/<mount>/data/<path>`
    pub api_url: Url,
}

impl VaultSecretConfig {
    /// Insert `/data` after the mount and prefix `/v1`
    pub fn location(&self) -> Result<SecretLocation, VaultError> {
        let mut url = Url::parse(&self.url)
            .map_err(|e| VaultError::config(format!("invalid secret URL '{}': {e}", self.url)))?;
        let host = VaultHost::from_url(&url)?;

        let path = url.path().to_string();
        let trimmed = path.trim_start_matches('/');
        let (mount, rest) = trimmed
            .split_once('/')
            .ok_or_else(|| VaultError::config(format!("URL '{}' has only one path segment", self.url)))?;
        if mount.is_empty() || rest.trim_matches('/').is_empty() {
            return Err(VaultError::config(format!(
                "URL '{}' needs both a mount and a secret path",
                self.url
            )));
        }

        url.set_path(&format!("/v1/{mount}/data/{rest}"));
        url.set_query(None);
        url.set_fragment(None);

        Ok(SecretLocation { host, api_url: url })
    }

    /// Ensure authentication is set up for this secret's host
    pub async fn prepare(&self, auth: &mut VaultAuth) -> Result<(), VaultError> {
        let location = self.location()?;
        auth.prepare_for_host(&location.host).await
    }

    /// Download the secret and project it through the mapping
    pub async fn fetch(&self, auth: &mut VaultAuth) -> Result<FetchedSecret, VaultError> {
        let location = self.location()?;
        let format = self.mapping.format();
        let token = auth.get_token(&location.host).await?;

        let writer = Box::new(VaultWriter {
            api: auth.api().clone(),
            url: location.api_url.clone(),
            token: token.clone(),
            mapping: self.mapping.clone(),
        });

        let Some(document) = auth.api().read_document(&location.api_url, &token).await? else {
            tracing::debug!(url = %self.url, "Secret does not exist");
            return Ok(FetchedSecret::missing(None, format, writer));
        };

        let version = Some(RemoteVersion::from(document.version));
        let data = Value::Object(document.data);

        let value = match path::read(&data, self.mapping.path()) {
            Ok(value) => value.clone(),
            Err(e) if e.is_missing_data() => {
                tracing::debug!(url = %self.url, "{e}");
                return Ok(FetchedSecret::missing(version, format, writer));
            }
            Err(e) => return Err(e.into()),
        };

        if matches!(self.mapping, Mapping::FromText { .. }) && !value.is_string() {
            return Err(VaultError::config(format!(
                "value at '{}' in '{}' for text mapping is not a string",
                self.mapping.path(),
                self.url
            )));
        }

        Ok(FetchedSecret::found(value, version, format, writer))
    }
}

/// Pushes a value into a secret with check-and-set
struct VaultWriter {
    api: VaultApi,
    url: Url,
    token: String,
    mapping: Mapping,
}

#[async_trait]
impl SecretWriter for VaultWriter {
    async fn upload_new(&self, value: &Value) -> Result<RemoteVersion, VaultError> {
        for attempt in 1..=MAX_CAS_ATTEMPTS {
            let (mut document, cas) = match self.api.read_document(&self.url, &self.token).await? {
                Some(current) => (Value::Object(current.data), current.version),
                None => (Value::Object(Map::new()), 0),
            };

            path::write(&mut document, self.mapping.path(), value.clone())?;
            let Value::Object(data) = document else {
                return Err(VaultError::config(format!(
                    "a secret document must be an object, refusing to push to '{}'",
                    self.url
                )));
            };

            match self.api.write_document(&self.url, &self.token, cas, &data).await? {
                WriteOutcome::Written { version } => return Ok(RemoteVersion::from(version)),
                WriteOutcome::Conflict => {
                    tracing::info!(attempt, "remote secret was edited during push, retrying");
                }
            }
        }

        Err(VaultError::VersionConflict {
            attempts: MAX_CAS_ATTEMPTS,
        })
    }
}
