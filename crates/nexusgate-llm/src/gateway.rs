//! Request orchestration: inbound format → candidates → failover → client format

use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, ready};
use std::time::{Duration, Instant};

use bytes::Bytes;
use futures_util::Stream;
use http::{HeaderMap, StatusCode};
use nexusgate_config::LlmConfig;
use nexusgate_core::{HttpError, RequestContext};
use serde_json::Value;

use crate::candidate::{Candidate, CandidateSource, ModelCatalog};
use crate::completion_log::{CompletionRecord, CompletionSink, CompletionStatus, TracingSink};
use crate::error::LlmError;
use crate::failover::{FailoverEngine, FailoverResult, HttpTransport};
use crate::format::{ResponseAdapter, StreamContext};
use crate::provider::EventStream;
use crate::registry::AdapterRegistry;
use crate::selector::select;
use crate::types::{CompletionResponse, ContentBlock, StreamEvent, Usage};

/// What the inbound layer sends back to the client
#[derive(Debug)]
pub enum GatewayReply {
    /// Complete response in the client's format
    Json(Value),
    /// Framed stream in the client's format
    Stream(ReplyStream),
    /// Non-retriable upstream failure, forwarded as received
    Upstream {
        status: StatusCode,
        headers: HeaderMap,
        body: Bytes,
    },
}

/// Serves completion requests
#[derive(Clone)]
pub struct Gateway {
    inner: Arc<GatewayInner>,
}

#[derive(Clone)]
struct GatewayInner {
    registry: Arc<AdapterRegistry>,
    candidates: Arc<dyn CandidateSource>,
    engine: FailoverEngine,
    forward_headers: Vec<String>,
    sink: Arc<dyn CompletionSink>,
}

impl std::fmt::Debug for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gateway")
            .field("registry", &self.inner.registry)
            .field("engine", &self.inner.engine)
            .finish_non_exhaustive()
    }
}

impl Gateway {
    /// Gateway over the models and providers in `config`, using the built-in adapters
    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        let transport = HttpTransport::new()?;

        Ok(Self::new(
            Arc::new(AdapterRegistry::with_defaults()),
            Arc::new(ModelCatalog::from_config(config)),
            FailoverEngine::new(config.failover.clone(), Arc::new(transport)),
            config.forward_headers.clone(),
        ))
    }

    pub fn new(
        registry: Arc<AdapterRegistry>,
        candidates: Arc<dyn CandidateSource>,
        engine: FailoverEngine,
        forward_headers: Vec<String>,
    ) -> Self {
        Self {
            inner: Arc::new(GatewayInner {
                registry,
                candidates,
                engine,
                forward_headers,
                sink: Arc::new(TracingSink),
            }),
        }
    }

    /// Replace the completion log destination
    #[must_use]
    pub fn with_sink(self, sink: Arc<dyn CompletionSink>) -> Self {
        let inner = Arc::unwrap_or_clone(self.inner);
        Self {
            inner: Arc::new(GatewayInner { sink, ..inner }),
        }
    }

    /// Serve one request body in `format`
    pub async fn handle(&self, format: &str, body: Value, ctx: &RequestContext) -> Result<GatewayReply, LlmError> {
        let started = Instant::now();
        let inner = &self.inner;

        let response_adapter = inner.registry.response(format)?;
        let mut request = inner.registry.request(format)?.parse(body)?;
        request
            .extra_headers
            .extend(ctx.forwardable_headers(&inner.forward_headers));

        let pool = inner.candidates.candidates(&request.model, ctx.provider_pin());
        if pool.is_empty() {
            return Err(LlmError::ModelNotFound { model: request.model });
        }
        let ranked = select(&pool, inner.engine.config().max_provider_attempts);

        tracing::debug!(
            model = %request.model,
            format,
            stream = request.stream,
            candidates = ranked.len(),
            "dispatching completion"
        );

        let result = inner
            .engine
            .execute(&ranked, |candidate| {
                inner
                    .registry
                    .upstream(candidate.protocol())?
                    .build_request(&request, candidate)
            })
            .await;

        let draft = RecordDraft::new(format, &request.model, request.stream, ctx, &result, started);

        let FailoverResult {
            success,
            response,
            candidate,
            total_attempts,
            final_error,
            ..
        } = result;

        let (Some(response), Some(candidate)) = (response, candidate) else {
            inner.sink.record(draft.finish(CompletionStatus::Failed, Outcome::default()));
            return Err(LlmError::FailoverExhausted {
                attempts: total_attempts,
                summary: final_error.unwrap_or_else(|| "no candidates".to_owned()),
            });
        };

        if !success {
            return self.passthrough(response, draft).await;
        }

        let upstream = inner.registry.upstream(candidate.protocol())?;

        if request.stream {
            let events = upstream.parse_stream_response(response);
            return Ok(GatewayReply::Stream(ReplyStream::new(
                events,
                response_adapter,
                StreamContext::new(candidate.upstream_model()),
                draft,
                Arc::clone(&inner.sink),
            )));
        }

        match upstream.parse_response(response).await {
            Ok(completion) => {
                inner
                    .sink
                    .record(draft.finish(CompletionStatus::Completed, Outcome::from_response(&completion)));
                Ok(GatewayReply::Json(response_adapter.serialize(&completion)))
            }
            Err(e) => {
                inner.sink.record(draft.finish(
                    CompletionStatus::Failed,
                    Outcome {
                        error: Some(e.to_string()),
                        ..Outcome::default()
                    },
                ));
                Err(e)
            }
        }
    }

    async fn passthrough(&self, response: reqwest::Response, draft: RecordDraft) -> Result<GatewayReply, LlmError> {
        let status = response.status();
        let headers = response.headers().clone();

        let body = match response.bytes().await {
            Ok(body) => body,
            Err(e) => {
                let error = LlmError::Transport(crate::failover::TransportError::from_reqwest(&e));
                self.inner.sink.record(draft.finish(
                    CompletionStatus::Failed,
                    Outcome {
                        error: Some(error.to_string()),
                        ..Outcome::default()
                    },
                ));
                return Err(error);
            }
        };

        tracing::debug!(%status, "forwarding non-retriable upstream reply");
        self.inner.sink.record(draft.finish(CompletionStatus::Failed, Outcome::default()));

        Ok(GatewayReply::Upstream { status, headers, body })
    }
}

/// Record fields known once failover is over
#[derive(Debug)]
struct RecordDraft {
    model: String,
    format: String,
    request_id: Option<String>,
    candidate: Option<Candidate>,
    stream: bool,
    attempts: u32,
    errors: Vec<String>,
    started: Instant,
}

/// Record fields known once the reply is done
#[derive(Debug, Default)]
struct Outcome {
    text: String,
    thinking: String,
    usage: Usage,
    error: Option<String>,
    time_to_first_event: Option<Duration>,
}

impl Outcome {
    fn from_response(response: &CompletionResponse) -> Self {
        Self {
            text: response.text(),
            thinking: response
                .content
                .iter()
                .filter_map(|b| match b {
                    ContentBlock::Thinking { thinking, .. } => Some(thinking.as_str()),
                    _ => None,
                })
                .collect(),
            usage: response.usage,
            ..Self::default()
        }
    }
}

impl RecordDraft {
    fn new(
        format: &str,
        model: &str,
        stream: bool,
        ctx: &RequestContext,
        result: &FailoverResult,
        started: Instant,
    ) -> Self {
        Self {
            model: model.to_owned(),
            format: format.to_owned(),
            request_id: ctx.request_id().map(str::to_owned),
            candidate: result.candidate.clone(),
            stream,
            attempts: result.total_attempts,
            errors: result.errors.iter().map(|e| e.message.clone()).collect(),
            started,
        }
    }

    fn finish(self, status: CompletionStatus, outcome: Outcome) -> CompletionRecord {
        let mut errors = self.errors;
        errors.extend(outcome.error);

        CompletionRecord {
            model: self.model,
            format: self.format,
            request_id: self.request_id,
            provider_id: self.candidate.as_ref().map(|c| c.provider_id().to_owned()),
            provider_name: self.candidate.as_ref().map(|c| c.provider_name().to_owned()),
            upstream_model: self.candidate.as_ref().map(|c| c.upstream_model().to_owned()),
            status,
            stream: self.stream,
            text: outcome.text,
            thinking: outcome.thinking,
            usage: outcome.usage,
            attempts: self.attempts,
            errors,
            duration: self.started.elapsed(),
            time_to_first_event: outcome.time_to_first_event,
        }
    }
}

/// Client-format frames of one streamed completion
///
/// Failures after the first frame become an in-band error frame followed by
/// the format's terminal marker. Dropping the stream early closes the upstream
/// connection and logs the completion as aborted.
pub struct ReplyStream {
    events: EventStream,
    adapter: Arc<dyn ResponseAdapter>,
    ctx: StreamContext,
    pending: VecDeque<Bytes>,
    log: Option<(RecordDraft, Arc<dyn CompletionSink>)>,
    first_event: Option<Duration>,
}

impl std::fmt::Debug for ReplyStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplyStream")
            .field("format", &self.adapter.format())
            .field("ctx", &self.ctx)
            .finish_non_exhaustive()
    }
}

impl ReplyStream {
    fn new(
        events: EventStream,
        adapter: Arc<dyn ResponseAdapter>,
        ctx: StreamContext,
        draft: RecordDraft,
        sink: Arc<dyn CompletionSink>,
    ) -> Self {
        Self {
            events,
            adapter,
            ctx,
            pending: VecDeque::new(),
            log: Some((draft, sink)),
            first_event: None,
        }
    }

    /// Per-stream state observed so far
    pub const fn context(&self) -> &StreamContext {
        &self.ctx
    }

    fn push(&mut self, frame: String) {
        if !frame.is_empty() {
            self.pending.push_back(Bytes::from(frame));
        }
    }

    fn close(&mut self, status: CompletionStatus, error: Option<String>) {
        let terminal = self.adapter.terminal_marker();
        self.push(terminal.to_owned());
        self.finish(status, error);
    }

    fn finish(&mut self, status: CompletionStatus, error: Option<String>) {
        let Some((draft, sink)) = self.log.take() else {
            return;
        };

        let accumulator = self.ctx.accumulator();
        sink.record(draft.finish(
            status,
            Outcome {
                text: accumulator.text(),
                thinking: accumulator.thinking(),
                usage: accumulator.usage(),
                error,
                time_to_first_event: self.first_event,
            },
        ));
    }

    fn on_event(&mut self, event: &StreamEvent) {
        if self.first_event.is_none() {
            self.first_event = self.log.as_ref().map(|(draft, _)| draft.started.elapsed());
        }

        self.ctx.observe(event);
        let frame = self.adapter.serialize_stream_chunk(event, &mut self.ctx);
        self.push(frame);

        match event {
            StreamEvent::MessageStop => self.close(CompletionStatus::Completed, None),
            StreamEvent::Error { message, .. } => self.close(CompletionStatus::Failed, Some(message.clone())),
            _ => {}
        }
    }

    fn on_error(&mut self, error: &LlmError) {
        tracing::warn!(error = %error, "stream failed after it started");

        let frame = self.adapter.serialize_error(error.error_type(), &error.client_message());
        self.push(frame);
        self.close(CompletionStatus::Failed, Some(error.to_string()));
    }

    const fn is_done(&self) -> bool {
        self.log.is_none()
    }
}

impl Stream for ReplyStream {
    type Item = Bytes;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            if let Some(frame) = self.pending.pop_front() {
                return Poll::Ready(Some(frame));
            }
            if self.is_done() {
                return Poll::Ready(None);
            }

            match ready!(Pin::new(&mut self.events).poll_next(cx)) {
                Some(Ok(event)) => self.on_event(&event),
                Some(Err(error)) => self.on_error(&error),
                None => {
                    let finished = self.ctx.accumulator().is_finished();
                    let (status, error) = if finished {
                        (CompletionStatus::Completed, None)
                    } else {
                        (
                            CompletionStatus::Failed,
                            Some("upstream stream closed unexpectedly".to_owned()),
                        )
                    };
                    self.close(status, error);
                }
            }
        }
    }
}

impl Drop for ReplyStream {
    fn drop(&mut self) {
        if !self.is_done() {
            tracing::debug!("client went away before the stream finished");
            self.finish(CompletionStatus::Aborted, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use futures_util::StreamExt;
    use nexusgate_config::{FailoverConfig, ProviderType};
    use serde_json::json;

    use super::*;
    use crate::candidate::testing::candidate;
    use crate::failover::{Transport, TransportError};
    use crate::provider::UpstreamRequest;

    /// Replies with canned `(status, content-type, body)` triples in order
    struct Canned {
        replies: Mutex<VecDeque<(u16, &'static str, String)>>,
        seen: Mutex<Vec<UpstreamRequest>>,
    }

    impl Canned {
        fn first(&self) -> UpstreamRequest {
            self.seen.lock().unwrap()[0].clone()
        }
    }

    #[async_trait]
    impl Transport for Canned {
        async fn send(&self, request: UpstreamRequest) -> Result<reqwest::Response, TransportError> {
            self.seen.lock().unwrap().push(request);
            let (status, content_type, body) = self.replies.lock().unwrap().pop_front().unwrap();
            Ok(http::Response::builder()
                .status(status)
                .header("content-type", content_type)
                .body(body)
                .unwrap()
                .into())
        }
    }

    struct Fixed(Vec<Candidate>);

    impl CandidateSource for Fixed {
        fn candidates(&self, model: &str, _pin: Option<&str>) -> Vec<Candidate> {
            if model == "gpt-4o" { self.0.clone() } else { Vec::new() }
        }
    }

    #[derive(Default)]
    struct Collect(Mutex<Vec<CompletionRecord>>);

    impl CompletionSink for Collect {
        fn record(&self, record: CompletionRecord) {
            self.0.lock().unwrap().push(record);
        }
    }

    fn gateway(replies: Vec<(u16, &'static str, String)>) -> (Gateway, Arc<Canned>, Arc<Collect>) {
        let transport = Arc::new(Canned {
            replies: Mutex::new(replies.into()),
            seen: Mutex::new(Vec::new()),
        });
        let sink = Arc::new(Collect::default());
        let config = FailoverConfig {
            same_provider_retries: 0,
            ..FailoverConfig::default()
        };

        let gateway = Gateway::new(
            Arc::new(AdapterRegistry::with_defaults()),
            Arc::new(Fixed(vec![candidate("primary", ProviderType::Openai, Some("http://up.test/v1"), 1)])),
            FailoverEngine::new(config, transport.clone()),
            vec!["x-trace".to_owned()],
        )
        .with_sink(sink.clone());

        (gateway, transport, sink)
    }

    fn chat_completion() -> String {
        json!({
            "id": "chatcmpl-1",
            "object": "chat.completion",
            "created": 1,
            "model": "gpt-4o",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": "hello"},
                "finish_reason": "stop"
            }],
            "usage": {"prompt_tokens": 3, "completion_tokens": 1, "total_tokens": 4}
        })
        .to_string()
    }

    #[tokio::test]
    async fn anthropic_client_served_by_openai_upstream() {
        let (gateway, transport, sink) = gateway(vec![(200, "application/json", chat_completion())]);

        let reply = gateway
            .handle(
                "anthropic",
                json!({"model": "gpt-4o", "max_tokens": 64, "messages": [{"role": "user", "content": "hi"}]}),
                &RequestContext::empty(),
            )
            .await
            .unwrap();

        let GatewayReply::Json(body) = reply else {
            panic!("expected json reply");
        };
        assert_eq!(body["type"], "message");
        assert_eq!(body["content"][0]["text"], "hello");
        assert_eq!(body["stop_reason"], "end_turn");

        assert_eq!(transport.first().body["messages"][0]["content"], "hi");

        let records = sink.0.lock().unwrap();
        assert_eq!(records[0].status, CompletionStatus::Completed);
        assert_eq!(records[0].usage.input_tokens, Some(3));
        assert_eq!(records[0].provider_id.as_deref(), Some("primary"));
    }

    #[tokio::test]
    async fn unknown_model_is_not_found() {
        let (gateway, _, _) = gateway(vec![]);

        let err = gateway
            .handle(
                "openai-chat",
                json!({"model": "nope", "messages": [{"role": "user", "content": "hi"}]}),
                &RequestContext::empty(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, LlmError::ModelNotFound { .. }));
    }

    #[tokio::test]
    async fn client_error_is_forwarded_verbatim() {
        let upstream_body = r#"{"error":{"message":"bad temperature","type":"invalid_request_error"}}"#;
        let (gateway, _, sink) = gateway(vec![(400, "application/json", upstream_body.to_owned())]);

        let reply = gateway
            .handle(
                "openai-chat",
                json!({"model": "gpt-4o", "messages": [{"role": "user", "content": "hi"}]}),
                &RequestContext::empty(),
            )
            .await
            .unwrap();

        let GatewayReply::Upstream { status, body, .. } = reply else {
            panic!("expected passthrough");
        };
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, upstream_body.as_bytes());
        let records = sink.0.lock().unwrap();
        assert_eq!(records[0].status, CompletionStatus::Failed);
        assert_eq!(records[0].errors, ["upstream returned 400"]);
    }

    #[tokio::test]
    async fn exhaustion_is_an_error() {
        let (gateway, _, sink) = gateway(vec![(503, "application/json", "{}".to_owned())]);

        let err = gateway
            .handle(
                "openai-chat",
                json!({"model": "gpt-4o", "messages": [{"role": "user", "content": "hi"}]}),
                &RequestContext::empty(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, LlmError::FailoverExhausted { attempts: 1, .. }));
        assert_eq!(sink.0.lock().unwrap()[0].errors, ["upstream returned 503"]);
    }

    #[tokio::test]
    async fn streams_in_client_format() {
        let upstream = concat!(
            "data: {\"id\":\"c1\",\"model\":\"gpt-4o\",\"choices\":[{\"index\":0,\"delta\":{\"role\":\"assistant\",\"content\":\"Hel\"}}]}\n\n",
            "data: {\"id\":\"c1\",\"model\":\"gpt-4o\",\"choices\":[{\"index\":0,\"delta\":{\"content\":\"lo\"},\"finish_reason\":\"stop\"}]}\n\n",
            "data: [DONE]\n\n",
        );
        let (gateway, _, sink) = gateway(vec![(200, "text/event-stream", upstream.to_owned())]);

        let reply = gateway
            .handle(
                "openai-chat",
                json!({"model": "gpt-4o", "stream": true, "messages": [{"role": "user", "content": "hi"}]}),
                &RequestContext::empty(),
            )
            .await
            .unwrap();

        let GatewayReply::Stream(stream) = reply else {
            panic!("expected stream");
        };
        let frames: Vec<Bytes> = stream.collect().await;
        let text: String = frames.iter().map(|f| String::from_utf8_lossy(f).into_owned()).collect();

        assert!(text.contains("\"content\":\"Hel\""));
        assert!(text.ends_with("data: [DONE]\n\n"));

        let records = sink.0.lock().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, CompletionStatus::Completed);
        assert_eq!(records[0].text, "Hello");
        assert!(records[0].time_to_first_event.is_some());
    }

    #[tokio::test]
    async fn dropped_stream_is_logged_as_aborted() {
        let upstream = concat!(
            "data: {\"id\":\"c1\",\"model\":\"gpt-4o\",\"choices\":[{\"index\":0,\"delta\":{\"content\":\"partial\"}}]}\n\n",
            "data: {\"id\":\"c1\",\"model\":\"gpt-4o\",\"choices\":[{\"index\":0,\"delta\":{\"content\":\" more\"}}]}\n\n",
        );
        let (gateway, _, sink) = gateway(vec![(200, "text/event-stream", upstream.to_owned())]);

        let reply = gateway
            .handle(
                "openai-chat",
                json!({"model": "gpt-4o", "stream": true, "messages": [{"role": "user", "content": "hi"}]}),
                &RequestContext::empty(),
            )
            .await
            .unwrap();

        let GatewayReply::Stream(mut stream) = reply else {
            panic!("expected stream");
        };
        stream.next().await.unwrap();
        drop(stream);

        let records = sink.0.lock().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, CompletionStatus::Aborted);
    }

    #[tokio::test]
    async fn forwards_allowed_client_headers() {
        let (gateway, transport, _) = gateway(vec![(200, "application/json", chat_completion())]);
        let mut headers = HeaderMap::new();
        headers.insert("x-trace", "abc".parse().unwrap());
        headers.insert("authorization", "Bearer client".parse().unwrap());

        gateway
            .handle(
                "openai-chat",
                json!({"model": "gpt-4o", "messages": [{"role": "user", "content": "hi"}]}),
                &RequestContext::new(headers),
            )
            .await
            .unwrap();

        let sent = transport.first();
        assert_eq!(sent.headers["x-trace"], "abc");
        assert_eq!(sent.headers["authorization"], "Bearer sk-test");
    }
}
