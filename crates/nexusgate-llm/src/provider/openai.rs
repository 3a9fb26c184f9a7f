//! `OpenAI` chat completions upstream

use async_trait::async_trait;
use http::Method;
use serde_json::Value;
use url::Url;

use super::{EventStream, UpstreamAdapter, UpstreamRequest, bearer_auth, endpoint, json_headers, merge_extra_headers, read_json, to_body};
use crate::candidate::Candidate;
use crate::convert::openai::{OpenAiDecoder, to_openai_request};
use crate::error::LlmError;
use crate::protocol::openai::{OpenAiResponse, OpenAiStreamOptions};
use crate::types::{CompletionRequest, CompletionResponse};

/// Registry key
pub const PROTOCOL: &str = "openai";

/// Default `OpenAI` API base URL
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Whether `url` points at `OpenAI` itself rather than a compatible server
fn is_canonical_openai(url: &Url) -> bool {
    url.host_str().is_some_and(|h| h == "api.openai.com")
}

/// Chat completions body for `candidate`
///
/// `include_usage` asks for a trailing usage chunk on streams; many
/// compatible servers reject the option, so callers only set it when the
/// upstream is known to accept it.
pub(crate) fn chat_body(request: &CompletionRequest, candidate: &Candidate, include_usage: bool) -> Result<Value, LlmError> {
    let mut wire = to_openai_request(request, candidate.upstream_model());

    if request.stream && include_usage {
        wire.stream_options = Some(OpenAiStreamOptions { include_usage: true });
    }

    to_body(&wire, &request.extra_params)
}

/// Parse a complete chat completions reply
pub(crate) async fn parse_chat_response(response: reqwest::Response, format: &str) -> Result<CompletionResponse, LlmError> {
    let wire: OpenAiResponse = read_json(response, format).await?;
    Ok(wire.into())
}

/// OpenAI-compatible chat completions
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenAiUpstream;

#[async_trait]
impl UpstreamAdapter for OpenAiUpstream {
    fn protocol(&self) -> &'static str {
        PROTOCOL
    }

    fn build_request(&self, request: &CompletionRequest, candidate: &Candidate) -> Result<UpstreamRequest, LlmError> {
        let provider = &candidate.provider;
        let url = endpoint(provider.base_url.as_ref(), DEFAULT_BASE_URL, "chat/completions")?;

        let mut headers = json_headers();
        bearer_auth(&mut headers, provider.api_key.as_ref())?;
        merge_extra_headers(&mut headers, &request.extra_headers);

        Ok(UpstreamRequest {
            method: Method::POST,
            body: chat_body(request, candidate, is_canonical_openai(&url))?,
            url,
            headers,
            proxy: provider.proxy.clone(),
        })
    }

    async fn parse_response(&self, response: reqwest::Response) -> Result<CompletionResponse, LlmError> {
        parse_chat_response(response, PROTOCOL).await
    }

    fn parse_stream_response(&self, response: reqwest::Response) -> EventStream {
        EventStream::spawn(response, OpenAiDecoder::new())
    }
}
