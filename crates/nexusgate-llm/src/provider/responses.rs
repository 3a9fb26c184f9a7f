//! `OpenAI` Responses upstream

use async_trait::async_trait;
use http::Method;

use super::openai::DEFAULT_BASE_URL;
use super::{EventStream, UpstreamAdapter, UpstreamRequest, bearer_auth, endpoint, json_headers, merge_extra_headers, read_json, to_body};
use crate::candidate::Candidate;
use crate::convert::responses::{ResponsesDecoder, to_responses_request};
use crate::error::LlmError;
use crate::protocol::responses::ResponsesResponse;
use crate::types::{CompletionRequest, CompletionResponse};

/// Registry key
pub const PROTOCOL: &str = "openai-responses";

#[derive(Debug, Clone, Copy, Default)]
pub struct ResponsesUpstream;

#[async_trait]
impl UpstreamAdapter for ResponsesUpstream {
    fn protocol(&self) -> &'static str {
        PROTOCOL
    }

    fn build_request(&self, request: &CompletionRequest, candidate: &Candidate) -> Result<UpstreamRequest, LlmError> {
        let provider = &candidate.provider;

        let mut headers = json_headers();
        bearer_auth(&mut headers, provider.api_key.as_ref())?;
        merge_extra_headers(&mut headers, &request.extra_headers);

        let wire = to_responses_request(request, candidate.upstream_model());

        Ok(UpstreamRequest {
            method: Method::POST,
            url: endpoint(provider.base_url.as_ref(), DEFAULT_BASE_URL, "responses")?,
            headers,
            body: to_body(&wire, &request.extra_params)?,
            proxy: provider.proxy.clone(),
        })
    }

    async fn parse_response(&self, response: reqwest::Response) -> Result<CompletionResponse, LlmError> {
        let wire: ResponsesResponse = read_json(response, PROTOCOL).await?;
        Ok(wire.into())
    }

    fn parse_stream_response(&self, response: reqwest::Response) -> EventStream {
        EventStream::spawn(response, ResponsesDecoder::new())
    }
}
