//! Thin client for the Vault HTTP endpoints used by secretsync

use std::fmt;

use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use url::Url;

use crate::VaultError;

/// Error message Vault returns when the `cas` option is stale
pub const CAS_MISMATCH: &str = "check-and-set parameter did not match the current version";

/// A Vault server, identified by `host[:port]`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VaultHost {
    base: Url,
    name: String,
}

impl VaultHost {
    /// Host of an absolute URL
    pub fn from_url(url: &Url) -> Result<Self, VaultError> {
        let host = url
            .host_str()
            .ok_or_else(|| VaultError::config(format!("URL '{url}' has no host")))?;
        let name = match url.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        };

        let mut base = url.clone();
        base.set_path("/");
        base.set_query(None);
        base.set_fragment(None);

        Ok(Self { base, name })
    }

    /// Parse `https://host[:port]` or a bare `host[:port]` (HTTPS assumed)
    pub fn parse(raw: &str) -> Result<Self, VaultError> {
        let with_scheme = if raw.contains("://") {
            raw.to_string()
        } else {
            format!("https://{raw}")
        };
        let url = Url::parse(&with_scheme)
            .map_err(|e| VaultError::config(format!("invalid Vault host '{raw}': {e}")))?;
        Self::from_url(&url)
    }

    /// Key used for credentials and token cache entries
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Absolute URL of an API path such as `/v1/auth/token/lookup-self`
    pub fn endpoint(&self, path: &str) -> Url {
        let mut url = self.base.clone();
        url.set_path(path);
        url
    }
}

impl fmt::Display for VaultHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// A KV v2 secret document and its version
#[derive(Debug, Clone, PartialEq)]
pub struct KvDocument {
    pub data: Map<String, Value>,
    pub version: u64,
}

/// Result of a check-and-set write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Written { version: u64 },
    /// The document changed since it was read
    Conflict,
}

#[derive(Debug, Deserialize)]
struct SecretResponse {
    data: SecretEnvelope,
}

#[derive(Debug, Deserialize)]
struct SecretEnvelope {
    #[serde(default)]
    data: Option<Map<String, Value>>,
    metadata: SecretMetadata,
}

#[derive(Debug, Deserialize)]
struct SecretMetadata {
    version: u64,
}

#[derive(Debug, Serialize)]
struct SecretWrite<'a> {
    options: CasOptions,
    data: &'a Map<String, Value>,
}

#[derive(Debug, Serialize)]
struct CasOptions {
    cas: u64,
}

#[derive(Debug, Deserialize)]
struct WriteResponse {
    data: SecretMetadata,
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    auth: Option<LoginAuth>,
}

#[derive(Debug, Deserialize)]
struct LoginAuth {
    #[serde(default)]
    client_token: String,
}

#[derive(Debug, Serialize)]
struct OidcAuthUrlRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'a str>,
    redirect_uri: &'a str,
    client_nonce: &'a str,
}

#[derive(Debug, Deserialize)]
struct OidcAuthUrlResponse {
    data: OidcAuthUrl,
}

#[derive(Debug, Deserialize)]
struct OidcAuthUrl {
    #[serde(default)]
    auth_url: String,
}

/// Vault API client
#[derive(Debug, Clone, Default)]
pub struct VaultApi {
    client: Client,
}

impl VaultApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    /// Read a KV v2 document; `None` when it does not exist
    pub async fn read_document(&self, url: &Url, token: &str) -> Result<Option<KvDocument>, VaultError> {
        tracing::debug!(url = %url, "Reading secret");

        let response = self.client.get(url.clone()).bearer_auth(token).send().await?;
        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(VaultError::status(status, "fetching secret"));
        }

        let body: SecretResponse = decode(response).await?;
        Ok(Some(KvDocument {
            data: body.data.data.unwrap_or_default(),
            version: body.data.metadata.version,
        }))
    }

    /// Write a KV v2 document, accepted only if its version is still `cas`
    pub async fn write_document(
        &self,
        url: &Url,
        token: &str,
        cas: u64,
        data: &Map<String, Value>,
    ) -> Result<WriteOutcome, VaultError> {
        tracing::debug!(url = %url, cas, "Writing secret");

        let response = self
            .client
            .post(url.clone())
            .bearer_auth(token)
            .json(&SecretWrite {
                options: CasOptions { cas },
                data,
            })
            .send()
            .await?;
        let status = response.status();

        if status.is_success() {
            let body: WriteResponse = decode(response).await?;
            return Ok(WriteOutcome::Written {
                version: body.data.version,
            });
        }

        let body = response.text().await?;
        if is_cas_mismatch(&body) {
            return Ok(WriteOutcome::Conflict);
        }

        Err(VaultError::status(status, "setting secret"))
    }

    /// Check that a token is still accepted
    pub async fn lookup_self(&self, host: &VaultHost, token: &str) -> Result<bool, VaultError> {
        let response = self
            .client
            .get(host.endpoint("/v1/auth/token/lookup-self"))
            .bearer_auth(token)
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => Ok(true),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Ok(false),
            status => Err(VaultError::status(status, "validating token")),
        }
    }

    pub async fn login_userpass(
        &self,
        host: &VaultHost,
        username: &str,
        password: &str,
    ) -> Result<String, VaultError> {
        let response = self
            .client
            .post(host.endpoint(&format!("/v1/auth/userpass/login/{username}")))
            .json(&serde_json::json!({ "password": password }))
            .send()
            .await?;

        client_token(host, response).await
    }

    pub async fn login_approle(
        &self,
        host: &VaultHost,
        role_id: &str,
        secret_id: &str,
    ) -> Result<String, VaultError> {
        let response = self
            .client
            .post(host.endpoint("/v1/auth/approle/login"))
            .json(&serde_json::json!({ "role_id": role_id, "secret_id": secret_id }))
            .send()
            .await?;

        client_token(host, response).await
    }

    /// Start an OIDC login and return the URL the user must open
    pub async fn oidc_auth_url(
        &self,
        host: &VaultHost,
        mount: &str,
        role: Option<&str>,
        redirect_uri: &str,
        client_nonce: &str,
    ) -> Result<String, VaultError> {
        let response = self
            .client
            .post(host.endpoint(&format!("/v1/auth/{mount}/oidc/auth_url")))
            .json(&OidcAuthUrlRequest {
                role,
                redirect_uri,
                client_nonce,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(VaultError::auth_failed(host.name(), format!("status {status}")));
        }

        let body: OidcAuthUrlResponse = decode(response).await?;
        if body.data.auth_url.is_empty() {
            return Err(VaultError::auth_failed(
                host.name(),
                "OIDC role did not return an auth URL",
            ));
        }
        Ok(body.data.auth_url)
    }

    /// Finish an OIDC login with the parameters of the browser redirect
    pub async fn oidc_callback(
        &self,
        host: &VaultHost,
        mount: &str,
        state: &str,
        code: &str,
        client_nonce: &str,
    ) -> Result<String, VaultError> {
        let mut url = host.endpoint(&format!("/v1/auth/{mount}/oidc/callback"));
        url.query_pairs_mut()
            .append_pair("state", state)
            .append_pair("code", code)
            .append_pair("client_nonce", client_nonce);

        let response = self.client.get(url).send().await?;
        client_token(host, response).await
    }
}

async fn decode<T: serde::de::DeserializeOwned>(response: Response) -> Result<T, VaultError> {
    let bytes = response.bytes().await?;
    serde_json::from_slice(&bytes).map_err(|e| VaultError::Decode(e.to_string()))
}

async fn client_token(host: &VaultHost, response: Response) -> Result<String, VaultError> {
    let status = response.status();
    if !status.is_success() {
        return Err(VaultError::auth_failed(host.name(), format!("status {status}")));
    }

    let body: LoginResponse = decode(response).await?;
    match body.auth {
        Some(auth) if !auth.client_token.is_empty() => Ok(auth.client_token),
        _ => Err(VaultError::auth_failed(host.name(), "no client token in response")),
    }
}

/// Recognise a CAS failure in either `{"errors": [...]}` or `{"data": {"error": ...}}`
fn is_cas_mismatch(body: &str) -> bool {
    let Ok(value) = serde_json::from_str::<Value>(body) else {
        return false;
    };

    let in_errors = value["errors"]
        .as_array()
        .is_some_and(|errors| errors.iter().any(|e| e.as_str().is_some_and(|e| e.contains(CAS_MISMATCH))));
    let in_data = value["data"]["error"]
        .as_str()
        .is_some_and(|e| e.contains(CAS_MISMATCH));

    in_errors || in_data
}
