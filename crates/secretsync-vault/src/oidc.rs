//! Browser-based OIDC login
//!
//! Vault redirects the browser to a one-shot listener on
//! `localhost:8250/oidc/callback`, which hands `state` and `code` back to the
//! callback endpoint in exchange for a client token.

use std::convert::Infallible;
use std::io;
use std::sync::Arc;

use bytes::Bytes;
use http_body_util::Full;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode, Uri};
use hyper_util::rt::TokioIo;
use parking_lot::Mutex;
use secretsync_common::Console;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use url::form_urlencoded;
use uuid::Uuid;

use crate::{VaultApi, VaultError, VaultHost};

pub const OIDC_CALLBACK_PORT: u16 = 8250;
pub const OIDC_REDIRECT_URI: &str = "http://localhost:8250/oidc/callback";

const CALLBACK_PATH: &str = "/oidc/callback";

/// Taken by the first valid callback
type CallbackSender = Arc<Mutex<Option<oneshot::Sender<(String, String)>>>>;

pub async fn login(
    api: &VaultApi,
    host: &VaultHost,
    mount: &str,
    role: Option<&str>,
    console: &dyn Console,
) -> Result<String, VaultError> {
    let listener = TcpListener::bind(("127.0.0.1", OIDC_CALLBACK_PORT)).await?;
    let nonce = Uuid::new_v4().to_string();

    let auth_url = api
        .oidc_auth_url(host, mount, role, OIDC_REDIRECT_URI, &nonce)
        .await?;
    console.notice(&format!(
        "Complete the login for '{host}' in your browser:\n    {auth_url}"
    ));

    let (state, code) = wait_for_callback(listener).await?;
    api.oidc_callback(host, mount, &state, &code, &nonce).await
}

/// Serve the listener until a browser delivers `(state, code)`
async fn wait_for_callback(listener: TcpListener) -> Result<(String, String), VaultError> {
    let (tx, rx) = oneshot::channel();
    let sender: CallbackSender = Arc::new(Mutex::new(Some(tx)));

    tokio::select! {
        received = rx => received
            .map_err(|_| VaultError::from(io::Error::other("OIDC callback listener closed"))),
        err = serve_callbacks(listener, sender) => Err(err.into()),
    }
}

/// Accept connections until the listener fails
async fn serve_callbacks(listener: TcpListener, sender: CallbackSender) -> io::Error {
    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(conn) => conn,
            Err(e) => return e,
        };
        tracing::debug!(%peer, "OIDC callback connection");

        let sender = sender.clone();
        tokio::spawn(async move {
            let service = service_fn(move |req: Request<hyper::body::Incoming>| {
                let response = callback_response(&req, &sender);
                async move { Ok::<_, Infallible>(response) }
            });

            if let Err(e) = http1::Builder::new()
                .serve_connection(TokioIo::new(stream), service)
                .await
            {
                tracing::debug!(%peer, "OIDC callback connection error: {e}");
            }
        });
    }
}

fn callback_response<B>(req: &Request<B>, sender: &CallbackSender) -> Response<Full<Bytes>> {
    let Some(params) = parse_callback(req.method(), req.uri()) else {
        return text_response(StatusCode::NOT_FOUND, "Not found\n");
    };

    match sender.lock().take() {
        Some(tx) => {
            let _ = tx.send(params);
            text_response(StatusCode::OK, "Login complete, you may close this window.\n")
        }
        None => text_response(StatusCode::GONE, "Login already completed.\n"),
    }
}

fn text_response(status: StatusCode, body: &'static str) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from_static(body.as_bytes())));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"));
    response
}

/// Extract `state` and `code` from a callback request
fn parse_callback(method: &Method, uri: &Uri) -> Option<(String, String)> {
    if *method != Method::GET || uri.path() != CALLBACK_PATH {
        return None;
    }

    let mut state = None;
    let mut code = None;
    for (key, value) in form_urlencoded::parse(uri.query()?.as_bytes()) {
        match key.as_ref() {
            "state" => state = Some(value.into_owned()),
            "code" => code = Some(value.into_owned()),
            _ => {}
        }
    }
    Some((state?, code?))
}
