//! Azure `OpenAI` deployments

use async_trait::async_trait;
use http::Method;
use http::header::HeaderName;

use super::openai::{chat_body, parse_chat_response};
use super::{EventStream, UpstreamAdapter, UpstreamRequest, json_headers, merge_extra_headers, set_secret_header};
use crate::candidate::Candidate;
use crate::convert::openai::OpenAiDecoder;
use crate::error::LlmError;
use crate::types::{CompletionRequest, CompletionResponse};

/// Registry key
pub const PROTOCOL: &str = "azure";

/// `api-version` used when the provider does not set one
pub const DEFAULT_API_VERSION: &str = "2024-10-21";

/// Chat completions against a named deployment
#[derive(Debug, Clone, Copy, Default)]
pub struct AzureUpstream;

#[async_trait]
impl UpstreamAdapter for AzureUpstream {
    fn protocol(&self) -> &'static str {
        PROTOCOL
    }

    fn build_request(&self, request: &CompletionRequest, candidate: &Candidate) -> Result<UpstreamRequest, LlmError> {
        let provider = &candidate.provider;

        let Some(base) = &provider.base_url else {
            return Err(LlmError::Internal(anyhow::anyhow!(
                "azure provider {} has no base_url",
                candidate.provider_id()
            )));
        };

        let mut url = base.clone();
        url.path_segments_mut()
            .map_err(|()| LlmError::Internal(anyhow::anyhow!("azure base_url {base} cannot carry a path")))?
            .pop_if_empty()
            .extend(["openai", "deployments", candidate.upstream_model(), "chat", "completions"]);
        url.query_pairs_mut().append_pair(
            "api-version",
            provider.api_version.as_deref().unwrap_or(DEFAULT_API_VERSION),
        );

        let mut headers = json_headers();
        if let Some(key) = &provider.api_key {
            set_secret_header(&mut headers, HeaderName::from_static("api-key"), "", key)?;
        }
        merge_extra_headers(&mut headers, &request.extra_headers);

        Ok(UpstreamRequest {
            method: Method::POST,
            url,
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
