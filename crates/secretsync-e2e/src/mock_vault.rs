//! Mock Vault server for E2E tests
//!
//! Implements the subset of the Vault HTTP API secretsync uses: userpass and
//! AppRole login, token lookup and KV v2 reads and check-and-set writes. Every
//! request is recorded for assertions.

use std::collections::{HashMap, HashSet};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::header::{AUTHORIZATION, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use parking_lot::RwLock;
use serde_json::{json, Map, Value};
use tokio::net::TcpListener;

/// Error Vault returns when a check-and-set version is stale
pub const CAS_ERROR: &str = "check-and-set parameter did not match the current version";

/// A request received by the mock
#[derive(Clone, Debug)]
pub struct RecordedRequest {
    pub method: String,
    /// URI path, without the query
    pub path: String,
    /// Bearer token, if any
    pub token: Option<String>,
    /// JSON body (`Null` when empty or not JSON)
    pub body: Value,
}

#[derive(Debug, Clone)]
struct StoredSecret {
    data: Map<String, Value>,
    version: u64,
}

#[derive(Debug, Default)]
struct VaultState {
    /// Keyed by `<mount>/<path>`
    secrets: HashMap<String, StoredSecret>,
    tokens: HashSet<String>,
    users: HashMap<String, String>,
    approles: HashMap<String, String>,
    /// Writes that will fail with a CAS error as if another client wrote first
    pending_conflicts: u32,
    issued: u64,
    requests: Vec<RecordedRequest>,
}

/// A mock Vault server on an ephemeral port
pub struct MockVault {
    addr: SocketAddr,
    state: Arc<RwLock<VaultState>>,
}

impl MockVault {
    /// Start a mock Vault server on an ephemeral port
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind mock Vault");
        let addr = listener.local_addr().unwrap();

        let state = Arc::new(RwLock::new(VaultState::default()));
        let state_clone = state.clone();

        tokio::spawn(async move {
            loop {
                let (stream, _) = match listener.accept().await {
                    Ok(conn) => conn,
                    Err(_) => break,
                };

                let state = state_clone.clone();
                tokio::spawn(async move {
                    let service = service_fn(move |req: Request<Incoming>| {
                        let state = state.clone();
                        async move { handle(state, req).await }
                    });

                    let _ = http1::Builder::new()
                        .serve_connection(TokioIo::new(stream), service)
                        .await;
                });
            }
        });

        Self { addr, state }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Base URL, e.g. `http://127.0.0.1:12345`
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Host name used for credentials and cache keys, e.g. `127.0.0.1:12345`
    pub fn host(&self) -> String {
        self.addr.to_string()
    }

    /// Secret URL as written in `secrets.yaml` for `<mount>/<path>`
    pub fn secret_url(&self, path: &str) -> String {
        format!("{}/{path}", self.url())
    }

    /// Write a secret directly, as another client would; returns the new version
    pub fn put_secret(&self, path: &str, data: Value) -> u64 {
        let Value::Object(data) = data else {
            panic!("secret data must be an object");
        };

        let mut state = self.state.write();
        let version = state.secrets.get(path).map_or(0, |s| s.version) + 1;
        state
            .secrets
            .insert(path.to_string(), StoredSecret { data, version });
        version
    }

    /// Current data and version of a secret
    pub fn secret(&self, path: &str) -> Option<(Value, u64)> {
        self.state
            .read()
            .secrets
            .get(path)
            .map(|s| (Value::Object(s.data.clone()), s.version))
    }

    pub fn add_user(&self, username: &str, password: &str) {
        self.state
            .write()
            .users
            .insert(username.to_string(), password.to_string());
    }

    pub fn add_approle(&self, role_id: &str, secret_id: &str) {
        self.state
            .write()
            .approles
            .insert(role_id.to_string(), secret_id.to_string());
    }

    /// Accept a static token
    pub fn add_token(&self, token: &str) {
        self.state.write().tokens.insert(token.to_string());
    }

    /// Invalidate every token issued or added so far
    pub fn revoke_tokens(&self) {
        self.state.write().tokens.clear();
    }

    /// Make the next `count` writes fail with a CAS error after bumping the version
    pub fn inject_conflicts(&self, count: u32) {
        self.state.write().pending_conflicts = count;
    }

    /// Get all recorded requests
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.read().requests.clone()
    }

    /// Count recorded requests with `method` whose path starts with `prefix`
    pub fn count(&self, method: &str, prefix: &str) -> usize {
        self.state
            .read()
            .requests
            .iter()
            .filter(|r| r.method == method && r.path.starts_with(prefix))
            .count()
    }

    /// Userpass and AppRole logins received
    pub fn login_count(&self) -> usize {
        self.count("POST", "/v1/auth/userpass/login/") + self.count("POST", "/v1/auth/approle/login")
    }

    /// Writes received for `<mount>/<path>`
    pub fn write_count(&self, path: &str) -> usize {
        let (mount, rest) = path.split_once('/').unwrap_or((path, ""));
        let data_path = format!("/v1/{mount}/data/{rest}");
        self.state
            .read()
            .requests
            .iter()
            .filter(|r| r.method == "POST" && r.path == data_path)
            .count()
    }

    /// Clear recorded requests
    pub fn clear_requests(&self) {
        self.state.write().requests.clear();
    }
}

async fn handle(
    state: Arc<RwLock<VaultState>>,
    req: Request<Incoming>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let token = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_string);

    let body = req
        .into_body()
        .collect()
        .await
        .map(|b| b.to_bytes())
        .unwrap_or_default();
    let body: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);

    let (status, response) = {
        let mut state = state.write();
        state.requests.push(RecordedRequest {
            method: method.to_string(),
            path: path.clone(),
            token: token.clone(),
            body: body.clone(),
        });
        state.route(&method, &path, token.as_deref(), &body)
    };

    Ok(Response::builder()
        .status(status)
        .header(CONTENT_TYPE, "application/json")
        .body(Full::new(Bytes::from(response.to_string())))
        .unwrap())
}

fn errors(messages: &[&str]) -> Value {
    json!({ "errors": messages })
}

impl VaultState {
    fn route(
        &mut self,
        method: &Method,
        path: &str,
        token: Option<&str>,
        body: &Value,
    ) -> (StatusCode, Value) {
        let Some(rest) = path.strip_prefix("/v1/") else {
            return (StatusCode::NOT_FOUND, errors(&[]));
        };

        if let Some(username) = rest.strip_prefix("auth/userpass/login/") {
            let accepted = self
                .users
                .get(username)
                .is_some_and(|password| body["password"].as_str() == Some(password.as_str()));
            return self.login(accepted);
        }
        if rest == "auth/approle/login" {
            let accepted = body["role_id"]
                .as_str()
                .and_then(|role| self.approles.get(role))
                .is_some_and(|secret| body["secret_id"].as_str() == Some(secret.as_str()));
            return self.login(accepted);
        }

        let authorized = token.is_some_and(|t| self.tokens.contains(t));
        if rest == "auth/token/lookup-self" {
            return if authorized {
                (StatusCode::OK, json!({ "data": { "id": token } }))
            } else {
                (StatusCode::FORBIDDEN, errors(&["permission denied"]))
            };
        }

        let Some((mount, secret)) = rest.split_once("/data/") else {
            return (StatusCode::NOT_FOUND, errors(&[]));
        };
        if !authorized {
            return (StatusCode::FORBIDDEN, errors(&["permission denied"]));
        }

        let key = format!("{mount}/{secret}");
        match *method {
            Method::GET => self.read(&key),
            Method::POST => self.write(&key, body),
            _ => (StatusCode::METHOD_NOT_ALLOWED, errors(&[])),
        }
    }

    fn login(&mut self, accepted: bool) -> (StatusCode, Value) {
        if !accepted {
            return (StatusCode::BAD_REQUEST, errors(&["invalid credentials"]));
        }

        self.issued += 1;
        let token = format!("s.mock{}", self.issued);
        self.tokens.insert(token.clone());
        (
            StatusCode::OK,
            json!({ "auth": { "client_token": token, "lease_duration": 3600 } }),
        )
    }

    fn read(&self, key: &str) -> (StatusCode, Value) {
        match self.secrets.get(key) {
            Some(secret) => (
                StatusCode::OK,
                json!({
                    "data": {
                        "data": secret.data,
                        "metadata": { "version": secret.version }
                    }
                }),
            ),
            None => (StatusCode::NOT_FOUND, errors(&[])),
        }
    }

    fn write(&mut self, key: &str, body: &Value) -> (StatusCode, Value) {
        let Some(data) = body["data"].as_object().cloned() else {
            return (StatusCode::BAD_REQUEST, errors(&["no data provided"]));
        };

        if self.pending_conflicts > 0 {
            self.pending_conflicts -= 1;
            if let Some(secret) = self.secrets.get_mut(key) {
                secret.version += 1;
            }
            return (StatusCode::BAD_REQUEST, errors(&[CAS_ERROR]));
        }

        let current = self.secrets.get(key).map_or(0, |s| s.version);
        if body["options"]["cas"]
            .as_u64()
            .is_some_and(|cas| cas != current)
        {
            return (StatusCode::BAD_REQUEST, errors(&[CAS_ERROR]));
        }

        let version = current + 1;
        self.secrets
            .insert(key.to_string(), StoredSecret { data, version });
        (StatusCode::OK, json!({ "data": { "version": version } }))
    }
}
