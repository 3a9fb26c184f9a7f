use std::error::Error as StdError;
use std::io;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use nexusgate_config::ProxyConfig;
use secrecy::ExposeSecret;
use thiserror::Error;

use crate::provider::UpstreamRequest;

/// Network-level failure, classified by a POSIX-style code
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{code}: {message}")]
pub struct TransportError {
    /// `ECONNRESET`, `ETIMEDOUT`, ... or `EUNKNOWN`
    pub code: String,
    /// Full error chain rendered as text
    pub message: String,
}

impl TransportError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    /// An attempt that ran out of time
    pub fn timeout(after: Duration) -> Self {
        Self::new("ETIMEDOUT", format!("request timed out after {}ms", after.as_millis()))
    }

    pub fn from_reqwest(err: &reqwest::Error) -> Self {
        let message = error_chain(err);
        let lowered = message.to_ascii_lowercase();

        let code = if err.is_timeout() {
            "ETIMEDOUT"
        } else if let Some(kind) = io_error_kind(err) {
            match kind {
                io::ErrorKind::ConnectionRefused => "ECONNREFUSED",
                io::ErrorKind::ConnectionReset | io::ErrorKind::UnexpectedEof => "ECONNRESET",
                io::ErrorKind::ConnectionAborted => "ECONNABORTED",
                io::ErrorKind::BrokenPipe => "EPIPE",
                io::ErrorKind::TimedOut => "ETIMEDOUT",
                _ => "EUNKNOWN",
            }
        } else if lowered.contains("dns error") || lowered.contains("failed to lookup") {
            "ENOTFOUND"
        } else {
            "EUNKNOWN"
        };

        Self::new(code, message)
    }

    /// Whether any indicator equals the code or appears in the message
    pub fn matches_any(&self, indicators: &[String]) -> bool {
        let message = self.message.to_ascii_lowercase();

        indicators.iter().any(|indicator| {
            self.code.eq_ignore_ascii_case(indicator) || message.contains(&indicator.to_ascii_lowercase())
        })
    }
}

fn error_chain(err: &(dyn StdError + 'static)) -> String {
    let mut rendered = err.to_string();
    let mut source = err.source();

    while let Some(cause) = source {
        let text = cause.to_string();
        if !rendered.contains(&text) {
            rendered.push_str(": ");
            rendered.push_str(&text);
        }
        source = cause.source();
    }

    rendered
}

fn io_error_kind(err: &(dyn StdError + 'static)) -> Option<io::ErrorKind> {
    let mut source = err.source();

    while let Some(cause) = source {
        if let Some(io_err) = cause.downcast_ref::<io::Error>() {
            return Some(io_err.kind());
        }
        source = cause.source();
    }

    None
}

/// Sends built upstream requests
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: UpstreamRequest) -> Result<reqwest::Response, TransportError>;
}

/// `reqwest` transport with one pooled client per distinct proxy
#[derive(Debug)]
pub struct HttpTransport {
    direct: reqwest::Client,
    proxied: DashMap<String, reqwest::Client>,
}

impl HttpTransport {
    pub fn new() -> Result<Self, TransportError> {
        let direct = reqwest::Client::builder()
            .build()
            .map_err(|e| TransportError::new("ECLIENT", error_chain(&e)))?;

        Ok(Self {
            direct,
            proxied: DashMap::new(),
        })
    }

    fn client_for(&self, proxy: Option<&ProxyConfig>) -> Result<reqwest::Client, TransportError> {
        let Some(proxy) = proxy else {
            return Ok(self.direct.clone());
        };

        let key = format!("{}|{}", proxy.url, proxy.username.as_deref().unwrap_or_default());
        if let Some(client) = self.proxied.get(&key) {
            return Ok(client.clone());
        }

        let mut upstream_proxy =
            reqwest::Proxy::all(proxy.url.as_str()).map_err(|e| TransportError::new("EPROXY", error_chain(&e)))?;
        if let Some(username) = &proxy.username {
            let password = proxy.password.as_ref().map_or("", ExposeSecret::expose_secret);
            upstream_proxy = upstream_proxy.basic_auth(username, password);
        }

        let client = reqwest::Client::builder()
            .proxy(upstream_proxy)
            .build()
            .map_err(|e| TransportError::new("EPROXY", error_chain(&e)))?;

        tracing::debug!(proxy = %proxy.url, "created proxied upstream client");
        self.proxied.insert(key, client.clone());

        Ok(client)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: UpstreamRequest) -> Result<reqwest::Response, TransportError> {
        let client = self.client_for(request.proxy.as_ref())?;

        client
            .request(request.method, request.url)
            .headers(request.headers)
            .json(&request.body)
            .send()
            .await
            .map_err(|e| TransportError::from_reqwest(&e))
    }
}
