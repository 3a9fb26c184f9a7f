mod harness;

use harness::config::ConfigBuilder;
use harness::mock_llm::MockLlm;
use harness::reply::{collect_stream, data_payloads, event_names};
use nexusgate_core::RequestContext;
use nexusgate_llm::{CompletionStatus, GatewayReply};
use serde_json::{Value, json};

fn text_of(payloads: &[Value], pointer: &str) -> String {
    payloads
        .iter()
        .filter_map(|p| p.pointer(pointer).and_then(Value::as_str))
        .collect()
}

#[tokio::test]
async fn openai_chat_stream_through_openai_upstream() {
    let mock = MockLlm::start().await.unwrap();
    let (gateway, mut records) = ConfigBuilder::new()
        .with_openai_provider("openai", &mock.base_url())
        .with_model("gpt-4o", "openai", 1)
        .gateway()
        .unwrap();

    let reply = gateway
        .handle(
            "openai-chat",
            json!({
                "model": "gpt-4o",
                "stream": true,
                "messages": [{"role": "user", "content": "Hello"}]
            }),
            &RequestContext::empty(),
        )
        .await
        .unwrap();

    let raw = collect_stream(reply).await;
    assert!(raw.ends_with("data: [DONE]\n\n"), "{raw}");

    let chunks = data_payloads(&raw);
    assert!(chunks.iter().all(|c| c["object"] == "chat.completion.chunk"));
    assert_eq!(text_of(&chunks, "/choices/0/delta/content"), "Hello from mock LLM ");
    assert!(chunks.iter().any(|c| c["choices"][0]["finish_reason"] == "stop"));

    // Compatible hosts are not sent `stream_options`
    let upstream = mock.last_body().unwrap();
    assert_eq!(upstream["stream"], true);
    assert!(upstream.get("stream_options").is_none());

    let record = records.recv().await.unwrap();
    assert_eq!(record.status, CompletionStatus::Completed);
    assert!(record.stream);
    assert_eq!(record.text, "Hello from mock LLM ");
    assert_eq!(record.usage.input_tokens, Some(10));
    assert!(record.time_to_first_event.is_some());
}

#[tokio::test]
async fn anthropic_stream_from_openai_upstream() {
    let mock = MockLlm::start().await.unwrap();
    let (gateway, _records) = ConfigBuilder::new()
        .with_openai_provider("openai", &mock.base_url())
        .with_model("gpt-4o", "openai", 1)
        .gateway()
        .unwrap();

    let reply = gateway
        .handle(
            "anthropic",
            json!({
                "model": "gpt-4o",
                "max_tokens": 128,
                "stream": true,
                "messages": [{"role": "user", "content": "Hello"}]
            }),
            &RequestContext::empty(),
        )
        .await
        .unwrap();

    let raw = collect_stream(reply).await;
    let names = event_names(&raw);
    assert_eq!(names.first(), Some(&"message_start"));
    assert_eq!(names.last(), Some(&"message_stop"));
    assert!(names.contains(&"content_block_start"));
    assert!(names.contains(&"content_block_stop"));
    assert!(names.contains(&"message_delta"));

    let payloads = data_payloads(&raw);
    assert_eq!(text_of(&payloads, "/delta/text"), "Hello from mock LLM ");

    let message_delta = payloads.iter().find(|p| p["type"] == "message_delta").unwrap();
    assert_eq!(message_delta["delta"]["stop_reason"], "end_turn");
}

#[tokio::test]
async fn responses_stream_from_anthropic_upstream() {
    let mock = MockLlm::start_with_response("streamed via messages").await.unwrap();
    let (gateway, mut records) = ConfigBuilder::new()
        .with_anthropic_provider("anthropic", &mock.base_url())
        .with_model("claude-sonnet-4", "anthropic", 1)
        .gateway()
        .unwrap();

    let reply = gateway
        .handle(
            "openai-responses",
            json!({"model": "claude-sonnet-4", "stream": true, "input": "Hello"}),
            &RequestContext::empty(),
        )
        .await
        .unwrap();

    let raw = collect_stream(reply).await;
    let names = event_names(&raw);
    assert_eq!(names.first(), Some(&"response.created"));
    assert_eq!(names.last(), Some(&"response.completed"));

    let payloads = data_payloads(&raw);
    let deltas: String = payloads
        .iter()
        .filter(|p| p["type"] == "response.output_text.delta")
        .filter_map(|p| p["delta"].as_str())
        .collect();
    assert_eq!(deltas, "streamed via messages");

    // Sequence numbers increase by one across the whole stream
    let sequence: Vec<u64> = payloads.iter().filter_map(|p| p["sequence_number"].as_u64()).collect();
    assert!(sequence.windows(2).all(|w| w[1] == w[0] + 1), "{sequence:?}");

    let completed = payloads.last().unwrap();
    assert_eq!(completed["response"]["status"], "completed");
    assert_eq!(completed["response"]["model"], "claude-sonnet-4");

    let record = records.recv().await.unwrap();
    assert_eq!(record.status, CompletionStatus::Completed);
    assert_eq!(record.usage.output_tokens, Some(6));
}

#[tokio::test]
async fn tool_call_stream_is_translated_for_anthropic_client() {
    let mock = MockLlm::start().await.unwrap();
    let (gateway, _records) = ConfigBuilder::new()
        .with_openai_provider("openai", &mock.base_url())
        .with_model("gpt-4o", "openai", 1)
        .gateway()
        .unwrap();

    let reply = gateway
        .handle(
            "anthropic",
            json!({
                "model": "gpt-4o",
                "max_tokens": 128,
                "stream": true,
                "messages": [{"role": "user", "content": "Weather in SF?"}],
                "tools": [{
                    "name": "get_weather",
                    "input_schema": {"type": "object", "properties": {"location": {"type": "string"}}}
                }]
            }),
            &RequestContext::empty(),
        )
        .await
        .unwrap();

    let raw = collect_stream(reply).await;
    let payloads = data_payloads(&raw);

    let start = payloads
        .iter()
        .find(|p| p["type"] == "content_block_start" && p["content_block"]["type"] == "tool_use")
        .expect("tool_use block start");
    assert_eq!(start["content_block"]["id"], "call_test_stream");
    assert_eq!(start["content_block"]["name"], "get_weather");

    let arguments = text_of(&payloads, "/delta/partial_json");
    let arguments: Value = serde_json::from_str(&arguments).unwrap();
    assert_eq!(arguments["location"], "San Francisco");

    let message_delta = payloads.iter().find(|p| p["type"] == "message_delta").unwrap();
    assert_eq!(message_delta["delta"]["stop_reason"], "tool_use");
}

#[tokio::test]
async fn dropped_stream_is_recorded_as_aborted() {
    let mock = MockLlm::start().await.unwrap();
    let (gateway, mut records) = ConfigBuilder::new()
        .with_openai_provider("openai", &mock.base_url())
        .with_model("gpt-4o", "openai", 1)
        .gateway()
        .unwrap();

    let reply = gateway
        .handle(
            "openai-chat",
            json!({
                "model": "gpt-4o",
                "stream": true,
                "messages": [{"role": "user", "content": "Hello"}]
            }),
            &RequestContext::empty(),
        )
        .await
        .unwrap();

    assert!(matches!(reply, GatewayReply::Stream(_)));
    drop(reply);

    let record = records.recv().await.unwrap();
    assert_eq!(record.status, CompletionStatus::Aborted);
}
