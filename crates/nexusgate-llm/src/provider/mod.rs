//! Upstream protocols
//!
//! Each adapter builds the outbound HTTP request for a candidate, parses a
//! complete upstream reply, and decodes a streamed one into canonical events.
//! Adapters hold no per-request state.

pub mod anthropic;
pub mod azure;
pub mod ollama;
pub mod openai;
pub mod responses;
mod stream;

use async_trait::async_trait;
use http::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use http::Method;
use nexusgate_config::ProxyConfig;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use url::Url;

pub use stream::EventStream;

use crate::candidate::Candidate;
use crate::error::LlmError;
use crate::failover::TransportError;
use crate::types::{CompletionRequest, CompletionResponse};

/// Fully built outbound request
#[derive(Debug, Clone)]
pub struct UpstreamRequest {
    /// HTTP method
    pub method: Method,
    /// Target URL
    pub url: Url,
    /// Request headers, credentials included
    pub headers: HeaderMap,
    /// JSON body
    pub body: Value,
    /// Proxy the request must go through
    pub proxy: Option<ProxyConfig>,
}

/// One outbound provider protocol
#[async_trait]
pub trait UpstreamAdapter: Send + Sync {
    /// Registry key of the protocol
    fn protocol(&self) -> &'static str;

    /// Build the HTTP request serving `request` on `candidate`; performs no I/O
    fn build_request(&self, request: &CompletionRequest, candidate: &Candidate) -> Result<UpstreamRequest, LlmError>;

    /// Parse a complete successful reply
    async fn parse_response(&self, response: reqwest::Response) -> Result<CompletionResponse, LlmError>;

    /// Decode a streaming reply into canonical events
    fn parse_stream_response(&self, response: reqwest::Response) -> EventStream;
}

/// Join `path` onto the provider base URL, or `default` when none is configured
pub(crate) fn endpoint(base: Option<&Url>, default: &str, path: &str) -> Result<Url, LlmError> {
    let base = base.map_or(default, Url::as_str).trim_end_matches('/');

    Url::parse(&format!("{base}/{path}"))
        .map_err(|e| LlmError::Internal(anyhow::anyhow!("invalid upstream url {base}/{path}: {e}")))
}

/// JSON content negotiation headers
pub(crate) fn json_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(ACCEPT, HeaderValue::from_static("application/json, text/event-stream"));
    headers
}

/// Put an API key into `name`, marked sensitive so it never shows in debug output
pub(crate) fn set_secret_header(
    headers: &mut HeaderMap,
    name: HeaderName,
    prefix: &str,
    key: &SecretString,
) -> Result<(), LlmError> {
    let mut value = HeaderValue::try_from(format!("{prefix}{}", key.expose_secret()))
        .map_err(|_| LlmError::Internal(anyhow::anyhow!("api key contains characters not allowed in a header")))?;
    value.set_sensitive(true);
    headers.insert(name, value);
    Ok(())
}

/// `Authorization: Bearer` when a key is configured
pub(crate) fn bearer_auth(headers: &mut HeaderMap, key: Option<&SecretString>) -> Result<(), LlmError> {
    match key {
        Some(key) => set_secret_header(headers, AUTHORIZATION, "Bearer ", key),
        None => Ok(()),
    }
}

/// Add client extra params without replacing anything the adapter set
pub(crate) fn merge_extra_params(body: &mut Value, extra: &Map<String, Value>) {
    let Value::Object(body) = body else {
        return;
    };

    for (key, value) in extra {
        if !body.contains_key(key) {
            body.insert(key.clone(), value.clone());
        }
    }
}

/// Add forwarded client headers without replacing anything the adapter set
pub(crate) fn merge_extra_headers(headers: &mut HeaderMap, extra: &HeaderMap) {
    for name in extra.keys() {
        if headers.contains_key(name) {
            continue;
        }

        for value in extra.get_all(name) {
            headers.append(name.clone(), value.clone());
        }
    }
}

/// Serialize a wire request into a JSON body
pub(crate) fn to_body(wire: &impl Serialize, extra: &Map<String, Value>) -> Result<Value, LlmError> {
    let mut body = serde_json::to_value(wire).map_err(|e| LlmError::Internal(e.into()))?;
    merge_extra_params(&mut body, extra);
    Ok(body)
}

/// Read and decode a complete reply, keeping a bounded preview on failure
pub(crate) async fn read_json<T: DeserializeOwned>(response: reqwest::Response, format: &str) -> Result<T, LlmError> {
    let text = response.text().await.map_err(|e| TransportError::from_reqwest(&e))?;

    serde_json::from_str(&text).map_err(|e| {
        tracing::debug!(format, error = %e, "upstream body did not match the protocol schema");
        LlmError::parse(format, e, &text)
    })
}
