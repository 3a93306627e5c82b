//! Network access.
//!
//! Strategies never talk to a transport directly; they go through the
//! [`Network`] trait so hosts can substitute a real client, a scripted one,
//! or a permanently disconnected one.

use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use url::Url;

use crate::error::NetworkError;
use crate::http::{Headers, Request, RequestMode, Response};

/// Something that can perform an HTTP exchange.
///
/// A non-2xx status is a successful exchange; only transport failures are
/// errors.
#[async_trait]
pub trait Network: Send + Sync {
    async fn fetch(&self, request: &Request) -> Result<Response, NetworkError>;
}

// ── HttpNetwork ─────────────────────────────────────────────

/// Upper bound on one exchange; a hung request becomes `Unreachable`.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// `reqwest`-backed network.
///
/// Of the request modes only `same-origin` is enforced: a redirect that
/// leaves the request's origin fails the exchange. The other modes need a
/// page origin to check CORS against, which a standalone client lacks, so
/// they are sent as plain requests.
#[derive(Debug, Clone)]
pub struct HttpNetwork {
    client: reqwest::Client,
}

impl HttpNetwork {
    pub fn new() -> Result<Self, NetworkError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("sstdms-offline/", env!("CARGO_PKG_VERSION")))
            .timeout(REQUEST_TIMEOUT)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| NetworkError::Transport(e.to_string()))?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Network for HttpNetwork {
    async fn fetch(&self, request: &Request) -> Result<Response, NetworkError> {
        let method = reqwest::Method::from_bytes(request.method.as_str().as_bytes())
            .map_err(|e| NetworkError::InvalidRequest(e.to_string()))?;

        let mut builder = self.client.request(method, request.url.clone());
        for (name, value) in request.headers.iter() {
            builder = builder.header(name, value);
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let reply = builder.send().await.map_err(|e| {
            if e.is_connect() || e.is_timeout() {
                NetworkError::Unreachable {
                    url: request.url.to_string(),
                    reason: e.to_string(),
                }
            } else {
                NetworkError::Transport(e.to_string())
            }
        })?;

        check_mode(request, reply.url())?;

        let status = reply.status();
        let mut headers = Headers::new();
        for (name, value) in reply.headers() {
            match value.to_str() {
                Ok(value) => headers.append(name.as_str(), value),
                Err(_) => debug!("skipping non-text header {name} from {}", request.url),
            }
        }
        let body = reply
            .bytes()
            .await
            .map_err(|e| NetworkError::Transport(e.to_string()))?;

        let mut response = Response::new(status.as_u16()).with_body(body.to_vec());
        if let Some(reason) = status.canonical_reason() {
            response.status_text = reason.to_string();
        }
        response.headers = headers;
        Ok(response)
    }
}

/// Reject a `same-origin` request that ended up at another origin.
fn check_mode(request: &Request, final_url: &Url) -> Result<(), NetworkError> {
    if request.mode == RequestMode::SameOrigin && final_url.origin() != request.url.origin() {
        return Err(NetworkError::InvalidRequest(format!(
            "same-origin request to {} redirected to {final_url}",
            request.url
        )));
    }
    Ok(())
}

// ── Disconnected ────────────────────────────────────────────

/// A network that is never reachable.
#[derive(Debug, Clone, Copy, Default)]
pub struct Disconnected;

#[async_trait]
impl Network for Disconnected {
    async fn fetch(&self, request: &Request) -> Result<Response, NetworkError> {
        Err(NetworkError::Unreachable {
            url: request.url.to_string(),
            reason: "offline".to_string(),
        })
    }
}
