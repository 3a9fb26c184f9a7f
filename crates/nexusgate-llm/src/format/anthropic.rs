//! Anthropic Messages client format

use serde_json::{Value, json};

use super::{RequestAdapter, ResponseAdapter, StreamContext, event_frame, from_known, split_known_fields, to_json};
use crate::convert::anthropic::{block_to_anthropic, stop_reason_to_anthropic, to_anthropic_usage};
use crate::error::LlmError;
use crate::protocol::anthropic::{AnthropicRequest, AnthropicResponse};
use crate::types::{CompletionRequest, CompletionResponse, StreamEvent};

/// Registry key
pub const FORMAT: &str = "anthropic";

const KNOWN_FIELDS: &[&str] = &[
    "model",
    "messages",
    "system",
    "max_tokens",
    "temperature",
    "top_p",
    "top_k",
    "stream",
    "tools",
    "tool_choice",
    "stop_sequences",
];

#[derive(Debug, Clone, Copy, Default)]
pub struct AnthropicRequestAdapter;

impl RequestAdapter for AnthropicRequestAdapter {
    fn format(&self) -> &'static str {
        FORMAT
    }

    fn parse(&self, body: Value) -> Result<CompletionRequest, LlmError> {
        let (known, extra) = split_known_fields(body, KNOWN_FIELDS)?;
        let wire: AnthropicRequest = from_known(known)?;

        let mut request = CompletionRequest::from(wire);
        request.extra_params = extra;
        Ok(request)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AnthropicResponseAdapter;

impl ResponseAdapter for AnthropicResponseAdapter {
    fn format(&self) -> &'static str {
        FORMAT
    }

    fn serialize(&self, response: &CompletionResponse) -> Value {
        to_json(&AnthropicResponse::from(response))
    }

    fn serialize_stream_chunk(&self, event: &StreamEvent, ctx: &mut StreamContext) -> String {
        let (name, payload) = match event {
            StreamEvent::MessageStart { message } => (
                "message_start",
                json!({
                    "type": "message_start",
                    "message": {
                        "id": ctx.id(),
                        "type": "message",
                        "role": "assistant",
                        "model": ctx.model(),
                        "content": [],
                        "stop_reason": null,
                        "stop_sequence": null,
                        "usage": to_json(&to_anthropic_usage(&message.usage)),
                    },
                }),
            ),
            StreamEvent::ContentBlockStart { index, content_block } => (
                "content_block_start",
                json!({
                    "type": "content_block_start",
                    "index": index,
                    "content_block": to_json(&block_to_anthropic(content_block)),
                }),
            ),
            StreamEvent::ContentBlockDelta { index, delta } => (
                "content_block_delta",
                json!({
                    "type": "content_block_delta",
                    "index": index,
                    "delta": to_json(delta),
                }),
            ),
            StreamEvent::ContentBlockStop { index } => (
                "content_block_stop",
                json!({"type": "content_block_stop", "index": index}),
            ),
            StreamEvent::MessageDelta { stop_reason, usage } => (
                "message_delta",
                json!({
                    "type": "message_delta",
                    "delta": {
                        "stop_reason": stop_reason.map(stop_reason_to_anthropic),
                        "stop_sequence": null,
                    },
                    "usage": to_json(&to_anthropic_usage(usage)),
                }),
            ),
            StreamEvent::MessageStop => ("message_stop", json!({"type": "message_stop"})),
            StreamEvent::Error { error_type, message } => return self.serialize_error(error_type, message),
        };

        event_frame(name, &payload)
    }

    fn serialize_error(&self, error_type: &str, message: &str) -> String {
        event_frame(
            "error",
            &json!({
                "type": "error",
                "error": {"type": error_type, "message": message},
            }),
        )
    }

    fn terminal_marker(&self) -> &'static str {
        ""
    }
}
