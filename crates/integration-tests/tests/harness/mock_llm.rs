//! Mock LLM backend server for integration tests
//!
//! Speaks just enough of the `OpenAI` chat completions and Anthropic Messages
//! APIs to return canned responses, complete or streamed.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router, routing};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

/// Mock LLM backend that returns predictable responses
pub struct MockLlm {
    addr: SocketAddr,
    shutdown: CancellationToken,
    state: Arc<MockLlmState>,
}

struct MockLlmState {
    completion_count: AtomicU32,
    /// Number of requests to fail before succeeding
    fail_count: AtomicU32,
    fail_status: StatusCode,
    /// Custom response content (if set)
    response_content: Option<String>,
    /// Never answer
    stall: bool,
    last_headers: Mutex<Option<HeaderMap>>,
    last_body: Mutex<Option<Value>>,
}

impl MockLlm {
    /// Start the mock server, returning immediately
    pub async fn start() -> anyhow::Result<Self> {
        Self::start_inner(0, StatusCode::INTERNAL_SERVER_ERROR, None, false).await
    }

    /// Start a mock server that fails the first `n` requests with 500
    pub async fn start_failing(n: u32) -> anyhow::Result<Self> {
        Self::start_inner(n, StatusCode::INTERNAL_SERVER_ERROR, None, false).await
    }

    /// Start a mock server that answers every request with `status`
    pub async fn start_rejecting(status: StatusCode) -> anyhow::Result<Self> {
        Self::start_inner(u32::MAX, status, None, false).await
    }

    /// Start a mock server with a custom response content
    pub async fn start_with_response(content: &str) -> anyhow::Result<Self> {
        Self::start_inner(0, StatusCode::INTERNAL_SERVER_ERROR, Some(content.to_owned()), false).await
    }

    /// Start a mock server that accepts requests but never answers
    pub async fn start_stalled() -> anyhow::Result<Self> {
        Self::start_inner(0, StatusCode::INTERNAL_SERVER_ERROR, None, true).await
    }

    async fn start_inner(
        fail_count: u32,
        fail_status: StatusCode,
        response_content: Option<String>,
        stall: bool,
    ) -> anyhow::Result<Self> {
        let state = Arc::new(MockLlmState {
            completion_count: AtomicU32::new(0),
            fail_count: AtomicU32::new(fail_count),
            fail_status,
            response_content,
            stall,
            last_headers: Mutex::new(None),
            last_body: Mutex::new(None),
        });

        let app = Router::new()
            .route("/v1/chat/completions", routing::post(handle_chat_completions))
            .route("/v1/messages", routing::post(handle_messages))
            .with_state(Arc::clone(&state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let shutdown = CancellationToken::new();
        let shutdown_clone = shutdown.clone();

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    shutdown_clone.cancelled().await;
                })
                .await
                .ok();
        });

        Ok(Self { addr, shutdown, state })
    }

    /// Base URL for configuring the mock as a provider
    ///
    /// Includes `/v1` since upstream adapters append paths like `/chat/completions`
    pub fn base_url(&self) -> String {
        format!("http://{}/v1", self.addr)
    }

    /// Number of completion requests received
    pub fn completion_count(&self) -> u32 {
        self.state.completion_count.load(Ordering::Relaxed)
    }

    /// Headers of the most recent request
    pub fn last_headers(&self) -> Option<HeaderMap> {
        self.state.last_headers.lock().unwrap().clone()
    }

    /// JSON body of the most recent request
    pub fn last_body(&self) -> Option<Value> {
        self.state.last_body.lock().unwrap().clone()
    }
}

impl Drop for MockLlm {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

impl MockLlmState {
    fn content(&self) -> &str {
        self.response_content.as_deref().unwrap_or("Hello from mock LLM")
    }

    /// Count the request and decide whether it fails
    async fn admit(&self, headers: HeaderMap, body: &Value) -> Option<Response> {
        self.completion_count.fetch_add(1, Ordering::Relaxed);
        *self.last_headers.lock().unwrap() = Some(headers);
        *self.last_body.lock().unwrap() = Some(body.clone());

        if self.stall {
            std::future::pending::<()>().await;
        }

        let remaining = self.fail_count.load(Ordering::Relaxed);
        if remaining == 0 {
            return None;
        }
        if remaining != u32::MAX {
            self.fail_count.fetch_sub(1, Ordering::Relaxed);
        }

        Some(
            (
                self.fail_status,
                Json(json!({
                    "error": {
                        "message": "mock server intentional failure",
                        "type": "server_error"
                    }
                })),
            )
                .into_response(),
        )
    }
}

fn sse(body: String) -> Response {
    (
        StatusCode::OK,
        [(axum::http::header::CONTENT_TYPE, "text/event-stream")],
        body,
    )
        .into_response()
}

// -- OpenAI chat completions --

#[derive(Debug, Serialize)]
struct StreamChunk {
    id: &'static str,
    object: &'static str,
    created: u64,
    model: String,
    choices: Vec<StreamChoice>,
    #[serde(skip_serializing_if = "Option::is_none")]
    usage: Option<Value>,
}

#[derive(Debug, Serialize)]
struct StreamChoice {
    index: u32,
    delta: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    finish_reason: Option<&'static str>,
}

impl StreamChunk {
    fn new(model: &str, delta: Value, finish_reason: Option<&'static str>) -> Self {
        Self {
            id: "chatcmpl-test-stream",
            object: "chat.completion.chunk",
            created: 1_700_000_000,
            model: model.to_owned(),
            choices: vec![StreamChoice {
                index: 0,
                delta,
                finish_reason,
            }],
            usage: None,
        }
    }

    fn frame(&self) -> String {
        format!("data: {}\n\n", serde_json::to_string(self).unwrap())
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletionRequest {
    model: String,
    #[serde(default)]
    stream: Option<bool>,
    #[serde(default)]
    tools: Option<Vec<Value>>,
}

async fn handle_chat_completions(
    State(state): State<Arc<MockLlmState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if let Some(failure) = state.admit(headers, &body).await {
        return failure;
    }

    let req: ChatCompletionRequest = serde_json::from_value(body).unwrap();
    let has_tools = req.tools.is_some();

    if req.stream.unwrap_or(false) {
        return sse(chat_stream(state.content(), &req.model, has_tools));
    }

    let message = if has_tools {
        json!({
            "role": "assistant",
            "content": null,
            "tool_calls": [{
                "id": "call_test_123",
                "type": "function",
                "function": {"name": "get_weather", "arguments": r#"{"location":"San Francisco"}"#}
            }]
        })
    } else {
        json!({"role": "assistant", "content": state.content()})
    };

    Json(json!({
        "id": "chatcmpl-test-123",
        "object": "chat.completion",
        "created": 1_700_000_000,
        "model": req.model,
        "choices": [{
            "index": 0,
            "message": message,
            "finish_reason": if has_tools { "tool_calls" } else { "stop" }
        }],
        "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
    }))
    .into_response()
}

fn chat_stream(content: &str, model: &str, has_tools: bool) -> String {
    let mut body = String::new();

    if has_tools {
        body.push_str(
            &StreamChunk::new(
                model,
                json!({
                    "role": "assistant",
                    "tool_calls": [{
                        "index": 0,
                        "id": "call_test_stream",
                        "type": "function",
                        "function": {"name": "get_weather"}
                    }]
                }),
                None,
            )
            .frame(),
        );
        for fragment in [r#"{"location":"#, r#""San Francisco"}"#] {
            body.push_str(
                &StreamChunk::new(
                    model,
                    json!({"tool_calls": [{"index": 0, "function": {"arguments": fragment}}]}),
                    None,
                )
                .frame(),
            );
        }
        body.push_str(&StreamChunk::new(model, json!({}), Some("tool_calls")).frame());
    } else {
        body.push_str(&StreamChunk::new(model, json!({"role": "assistant", "content": ""}), None).frame());
        for word in content.split_whitespace() {
            body.push_str(&StreamChunk::new(model, json!({"content": format!("{word} ")}), None).frame());
        }
        body.push_str(&StreamChunk::new(model, json!({}), Some("stop")).frame());
    }

    let mut usage = StreamChunk::new(model, json!({}), None);
    usage.choices.clear();
    usage.usage = Some(json!({"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}));
    body.push_str(&usage.frame());

    body.push_str("data: [DONE]\n\n");
    body
}

// -- Anthropic messages --

async fn handle_messages(State(state): State<Arc<MockLlmState>>, headers: HeaderMap, Json(body): Json<Value>) -> Response {
    if let Some(failure) = state.admit(headers, &body).await {
        return failure;
    }

    let model = body["model"].as_str().unwrap_or("claude-mock").to_owned();

    if body["stream"].as_bool().unwrap_or(false) {
        return sse(messages_stream(state.content(), &model));
    }

    Json(json!({
        "id": "msg_test_123",
        "type": "message",
        "role": "assistant",
        "model": model,
        "content": [
            {"type": "thinking", "thinking": "mock reasoning", "signature": "sig_1"},
            {"type": "text", "text": state.content()}
        ],
        "stop_reason": "end_turn",
        "stop_sequence": null,
        "usage": {"input_tokens": 12, "output_tokens": 6}
    }))
    .into_response()
}

fn messages_stream(content: &str, model: &str) -> String {
    let events = [
        json!({
            "type": "message_start",
            "message": {
                "id": "msg_test_stream", "type": "message", "role": "assistant", "model": model,
                "content": [], "stop_reason": null, "usage": {"input_tokens": 12, "output_tokens": 0}
            }
        }),
        json!({"type": "content_block_start", "index": 0, "content_block": {"type": "text", "text": ""}}),
        json!({"type": "content_block_delta", "index": 0, "delta": {"type": "text_delta", "text": content}}),
        json!({"type": "content_block_stop", "index": 0}),
        json!({"type": "message_delta", "delta": {"stop_reason": "end_turn"}, "usage": {"output_tokens": 6}}),
        json!({"type": "message_stop"}),
    ];

    events
        .iter()
        .map(|event| format!("event: {}\ndata: {event}\n\n", event["type"].as_str().unwrap()))
        .collect()
}
