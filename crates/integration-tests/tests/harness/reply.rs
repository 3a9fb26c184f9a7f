//! Helpers for inspecting gateway replies

use futures_util::StreamExt;
use nexusgate_llm::GatewayReply;
use serde_json::Value;

/// Body of a translated, non-streaming reply
pub fn expect_json(reply: GatewayReply) -> Value {
    match reply {
        GatewayReply::Json(value) => value,
        GatewayReply::Stream(_) => panic!("expected a JSON reply, got a stream"),
        GatewayReply::Upstream { status, .. } => panic!("expected a JSON reply, got upstream {status}"),
    }
}

/// Drain a streaming reply into one string
pub async fn collect_stream(reply: GatewayReply) -> String {
    let GatewayReply::Stream(mut frames) = reply else {
        panic!("expected a streaming reply");
    };

    let mut out = String::new();
    while let Some(frame) = frames.next().await {
        out.push_str(std::str::from_utf8(&frame).expect("utf-8 frame"));
    }
    out
}

/// JSON payloads of every `data:` line, skipping `[DONE]`
pub fn data_payloads(raw: &str) -> Vec<Value> {
    raw.lines()
        .filter_map(|line| line.strip_prefix("data: "))
        .filter(|data| *data != "[DONE]")
        .map(|data| serde_json::from_str(data).expect("valid JSON payload"))
        .collect()
}

/// Names of every `event:` line, in order
pub fn event_names(raw: &str) -> Vec<&str> {
    raw.lines().filter_map(|line| line.strip_prefix("event: ")).collect()
}
