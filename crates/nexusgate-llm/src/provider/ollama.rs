//! Ollama through its OpenAI-compatible endpoint

use async_trait::async_trait;
use http::Method;

use super::openai::{chat_body, parse_chat_response};
use super::{EventStream, UpstreamAdapter, UpstreamRequest, bearer_auth, endpoint, json_headers, merge_extra_headers};
use crate::candidate::Candidate;
use crate::convert::openai::OpenAiDecoder;
use crate::error::LlmError;
use crate::types::{CompletionRequest, CompletionResponse};

/// Registry key
pub const PROTOCOL: &str = "ollama";

/// Local Ollama server
pub const DEFAULT_BASE_URL: &str = "http://localhost:11434/v1";

#[derive(Debug, Clone, Copy, Default)]
pub struct OllamaUpstream;

#[async_trait]
impl UpstreamAdapter for OllamaUpstream {
    fn protocol(&self) -> &'static str {
        PROTOCOL
    }

    fn build_request(&self, request: &CompletionRequest, candidate: &Candidate) -> Result<UpstreamRequest, LlmError> {
        let provider = &candidate.provider;

        let mut headers = json_headers();
        bearer_auth(&mut headers, provider.api_key.as_ref())?;
        merge_extra_headers(&mut headers, &request.extra_headers);

        Ok(UpstreamRequest {
            method: Method::POST,
            url: endpoint(provider.base_url.as_ref(), DEFAULT_BASE_URL, "chat/completions")?,
            headers,
            body: chat_body(request, candidate, false)?,
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
