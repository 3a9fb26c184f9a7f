//! `OpenAI` Chat Completions client format

use serde_json::{Value, json};

use super::{RequestAdapter, ResponseAdapter, StreamContext, data_frame, from_known, split_known_fields, to_json};
use crate::convert::openai::{finish_reason, to_openai_usage};
use crate::error::LlmError;
use crate::protocol::openai::{OpenAiRequest, OpenAiResponse};
use crate::types::{BlockDelta, CompletionRequest, CompletionResponse, ContentBlock, StopReason, StreamEvent};

/// Registry key
pub const FORMAT: &str = "openai-chat";

const KNOWN_FIELDS: &[&str] = &[
    "model",
    "messages",
    "max_tokens",
    "max_completion_tokens",
    "temperature",
    "top_p",
    "top_k",
    "stream",
    "stream_options",
    "tools",
    "tool_choice",
    "stop",
];

#[derive(Debug, Clone, Copy, Default)]
pub struct OpenAiChatRequestAdapter;

impl RequestAdapter for OpenAiChatRequestAdapter {
    fn format(&self) -> &'static str {
        FORMAT
    }

    fn parse(&self, body: Value) -> Result<CompletionRequest, LlmError> {
        let (known, extra) = split_known_fields(body, KNOWN_FIELDS)?;
        let wire: OpenAiRequest = from_known(known)?;

        let mut request = CompletionRequest::from(wire);
        request.extra_params = extra;
        Ok(request)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct OpenAiChatResponseAdapter;

impl OpenAiChatResponseAdapter {
    fn chunk(ctx: &StreamContext, delta: &Value, finish_reason: Option<&str>) -> String {
        data_frame(&json!({
            "id": ctx.id(),
            "object": "chat.completion.chunk",
            "created": ctx.created(),
            "model": ctx.model(),
            "choices": [{
                "index": 0,
                "delta": delta,
                "finish_reason": finish_reason,
            }],
        }))
    }

    fn tool_delta(ctx: &StreamContext, index: u32, call: Value) -> String {
        let ordinal = ctx.accumulator().tool_ordinal(index).unwrap_or_default();

        let mut call = call;
        call["index"] = json!(ordinal);
        Self::chunk(ctx, &json!({ "tool_calls": [call] }), None)
    }
}

impl ResponseAdapter for OpenAiChatResponseAdapter {
    fn format(&self) -> &'static str {
        FORMAT
    }

    fn serialize(&self, response: &CompletionResponse) -> Value {
        to_json(&OpenAiResponse::from(response))
    }

    fn serialize_stream_chunk(&self, event: &StreamEvent, ctx: &mut StreamContext) -> String {
        match event {
            StreamEvent::MessageStart { .. } => Self::chunk(ctx, &json!({"role": "assistant", "content": ""}), None),
            StreamEvent::ContentBlockStart {
                index,
                content_block: ContentBlock::ToolUse(tool),
            } => Self::tool_delta(
                ctx,
                *index,
                json!({
                    "id": tool.id,
                    "type": "function",
                    "function": {"name": tool.name, "arguments": ""},
                }),
            ),
            StreamEvent::ContentBlockDelta { index, delta } => match delta {
                BlockDelta::TextDelta { text } => Self::chunk(ctx, &json!({ "content": text }), None),
                BlockDelta::ThinkingDelta { thinking } => {
                    Self::chunk(ctx, &json!({ "reasoning_content": thinking }), None)
                }
                BlockDelta::InputJsonDelta { partial_json } => {
                    Self::tool_delta(ctx, *index, json!({ "function": {"arguments": partial_json} }))
                }
                BlockDelta::SignatureDelta { .. } => String::new(),
            },
            StreamEvent::MessageDelta { stop_reason, usage } => {
                let reason = finish_reason(stop_reason.unwrap_or(StopReason::EndTurn));
                let mut frames = Self::chunk(ctx, &json!({}), Some(reason));

                if !usage.is_empty() {
                    frames.push_str(&data_frame(&json!({
                        "id": ctx.id(),
                        "object": "chat.completion.chunk",
                        "created": ctx.created(),
                        "model": ctx.model(),
                        "choices": [],
                        "usage": to_json(&to_openai_usage(usage)),
                    })));
                }

                frames
            }
            StreamEvent::Error { error_type, message } => self.serialize_error(error_type, message),
            StreamEvent::ContentBlockStart { .. } | StreamEvent::ContentBlockStop { .. } | StreamEvent::MessageStop => {
                String::new()
            }
        }
    }

    fn serialize_error(&self, error_type: &str, message: &str) -> String {
        data_frame(&json!({
            "error": {
                "message": message,
                "type": error_type,
            }
        }))
    }

    fn terminal_marker(&self) -> &'static str {
        "data: [DONE]\n\n"
    }
}
