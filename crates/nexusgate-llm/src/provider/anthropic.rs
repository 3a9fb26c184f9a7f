//! Anthropic Messages upstream

use async_trait::async_trait;
use http::Method;
use http::header::{HeaderName, HeaderValue};

use super::{EventStream, UpstreamAdapter, UpstreamRequest, endpoint, json_headers, merge_extra_headers, read_json, set_secret_header, to_body};
use crate::candidate::Candidate;
use crate::convert::anthropic::{AnthropicDecoder, to_anthropic_request};
use crate::error::LlmError;
use crate::protocol::anthropic::AnthropicResponse;
use crate::types::{CompletionRequest, CompletionResponse};

/// Registry key
pub const PROTOCOL: &str = "anthropic";

/// Default Anthropic API base URL
pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";

/// Anthropic API version header value
const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Debug, Clone, Copy, Default)]
pub struct AnthropicUpstream;

#[async_trait]
impl UpstreamAdapter for AnthropicUpstream {
    fn protocol(&self) -> &'static str {
        PROTOCOL
    }

    fn build_request(&self, request: &CompletionRequest, candidate: &Candidate) -> Result<UpstreamRequest, LlmError> {
        let provider = &candidate.provider;

        let mut headers = json_headers();
        headers.insert(
            HeaderName::from_static("anthropic-version"),
            HeaderValue::from_static(ANTHROPIC_VERSION),
        );
        if let Some(key) = &provider.api_key {
            set_secret_header(&mut headers, HeaderName::from_static("x-api-key"), "", key)?;
        }
        merge_extra_headers(&mut headers, &request.extra_headers);

        let wire = to_anthropic_request(request, candidate.upstream_model());

        Ok(UpstreamRequest {
            method: Method::POST,
            url: endpoint(provider.base_url.as_ref(), DEFAULT_BASE_URL, "messages")?,
            headers,
            body: to_body(&wire, &request.extra_params)?,
            proxy: provider.proxy.clone(),
        })
    }

    async fn parse_response(&self, response: reqwest::Response) -> Result<CompletionResponse, LlmError> {
        let wire: AnthropicResponse = read_json(response, PROTOCOL).await?;
        Ok(wire.into())
    }

    fn parse_stream_response(&self, response: reqwest::Response) -> EventStream {
        EventStream::spawn(response, AnthropicDecoder::new())
    }
}
