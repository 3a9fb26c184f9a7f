//! `OpenAI` Responses client format

use serde_json::{Value, json};

use super::{RequestAdapter, ResponseAdapter, StreamContext, event_frame, from_known, split_known_fields, to_json};
use crate::accumulate::AccumulatedBlock;
use crate::convert::responses::{item_id, output_item};
use crate::error::LlmError;
use crate::protocol::responses::{ResponsesOutputItem, ResponsesRequest, ResponsesResponse};
use crate::types::{BlockDelta, CompletionRequest, CompletionResponse, ContentBlock, StreamEvent};

/// Registry key
pub const FORMAT: &str = "openai-responses";

const KNOWN_FIELDS: &[&str] = &[
    "model",
    "input",
    "instructions",
    "max_output_tokens",
    "temperature",
    "top_p",
    "stream",
    "tools",
    "tool_choice",
];

#[derive(Debug, Clone, Copy, Default)]
pub struct ResponsesRequestAdapter;

impl RequestAdapter for ResponsesRequestAdapter {
    fn format(&self) -> &'static str {
        FORMAT
    }

    fn parse(&self, body: Value) -> Result<CompletionRequest, LlmError> {
        let (mut known, extra) = split_known_fields(body, KNOWN_FIELDS)?;

        // Message items may leave out their type
        if let Some(Value::Array(items)) = known.get_mut("input") {
            for item in items.iter_mut().filter_map(Value::as_object_mut) {
                if !item.contains_key("type") && item.contains_key("role") {
                    item.insert("type".to_owned(), json!("message"));
                }
            }
        }

        let wire: ResponsesRequest = from_known(known)?;

        let mut request = CompletionRequest::from(wire);
        request.extra_params = extra;
        Ok(request)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ResponsesResponseAdapter;

impl ResponsesResponseAdapter {
    fn frame(ctx: &mut StreamContext, name: &str, payload: Value) -> String {
        let mut payload = payload;
        payload["type"] = json!(name);
        payload["sequence_number"] = json!(ctx.next_sequence());
        event_frame(name, &payload)
    }

    fn skeleton(ctx: &StreamContext, status: &str) -> Value {
        json!({
            "id": ctx.id(),
            "object": "response",
            "created_at": ctx.created(),
            "model": ctx.model(),
            "status": status,
            "output": [],
        })
    }

    fn block_started(ctx: &mut StreamContext, index: u32, block: &ContentBlock) -> String {
        let id = ctx.id().to_owned();

        match block {
            ContentBlock::Text { .. } => {
                let item_id = item_id("msg", &id, index);
                let mut frames = Self::frame(
                    ctx,
                    "response.output_item.added",
                    json!({
                        "output_index": index,
                        "item": {
                            "type": "message",
                            "id": item_id,
                            "role": "assistant",
                            "status": "in_progress",
                            "content": [],
                        },
                    }),
                );
                frames.push_str(&Self::frame(
                    ctx,
                    "response.content_part.added",
                    json!({
                        "item_id": item_id,
                        "output_index": index,
                        "content_index": 0,
                        "part": {"type": "output_text", "text": "", "annotations": []},
                    }),
                ));
                frames
            }
            ContentBlock::Thinking { .. } => Self::frame(
                ctx,
                "response.output_item.added",
                json!({
                    "output_index": index,
                    "item": {"type": "reasoning", "id": item_id("rs", &id, index), "summary": []},
                }),
            ),
            ContentBlock::ToolUse(tool) => Self::frame(
                ctx,
                "response.output_item.added",
                json!({
                    "output_index": index,
                    "item": {
                        "type": "function_call",
                        "id": item_id("fc", &id, index),
                        "call_id": tool.id,
                        "name": tool.name,
                        "arguments": "",
                        "status": "in_progress",
                    },
                }),
            ),
            ContentBlock::ToolResult { .. } | ContentBlock::Image { .. } => String::new(),
        }
    }

    fn block_delta(ctx: &mut StreamContext, index: u32, delta: &BlockDelta) -> String {
        let id = ctx.id().to_owned();

        match delta {
            BlockDelta::TextDelta { text } => Self::frame(
                ctx,
                "response.output_text.delta",
                json!({
                    "item_id": item_id("msg", &id, index),
                    "output_index": index,
                    "content_index": 0,
                    "delta": text,
                }),
            ),
            BlockDelta::ThinkingDelta { thinking } => Self::frame(
                ctx,
                "response.reasoning_summary_text.delta",
                json!({
                    "item_id": item_id("rs", &id, index),
                    "output_index": index,
                    "summary_index": 0,
                    "delta": thinking,
                }),
            ),
            BlockDelta::InputJsonDelta { partial_json } => Self::frame(
                ctx,
                "response.function_call_arguments.delta",
                json!({
                    "item_id": item_id("fc", &id, index),
                    "output_index": index,
                    "delta": partial_json,
                }),
            ),
            BlockDelta::SignatureDelta { .. } => String::new(),
        }
    }

    fn block_stopped(ctx: &mut StreamContext, index: u32) -> String {
        let Some(block) = ctx.accumulator().block(index).cloned() else {
            return String::new();
        };
        let id = ctx.id().to_owned();

        let (mut frames, item) = match &block {
            AccumulatedBlock::Text { text } => {
                let item_id = item_id("msg", &id, index);
                let mut frames = Self::frame(
                    ctx,
                    "response.output_text.done",
                    json!({"item_id": item_id, "output_index": index, "content_index": 0, "text": text}),
                );
                frames.push_str(&Self::frame(
                    ctx,
                    "response.content_part.done",
                    json!({
                        "item_id": item_id,
                        "output_index": index,
                        "content_index": 0,
                        "part": {"type": "output_text", "text": text, "annotations": []},
                    }),
                ));
                (frames, output_item(&id, index, &block.to_content_block(), "completed"))
            }
            AccumulatedBlock::Thinking { thinking, .. } => (
                Self::frame(
                    ctx,
                    "response.reasoning_summary_text.done",
                    json!({
                        "item_id": item_id("rs", &id, index),
                        "output_index": index,
                        "summary_index": 0,
                        "text": thinking,
                    }),
                ),
                output_item(&id, index, &block.to_content_block(), "completed"),
            ),
            AccumulatedBlock::ToolUse {
                id: call_id,
                name,
                arguments,
            } => {
                let item_id = item_id("fc", &id, index);
                (
                    Self::frame(
                        ctx,
                        "response.function_call_arguments.done",
                        json!({"item_id": item_id, "output_index": index, "arguments": arguments}),
                    ),
                    Some(ResponsesOutputItem::FunctionCall {
                        id: item_id,
                        call_id: call_id.clone(),
                        name: name.clone(),
                        arguments: arguments.clone(),
                        status: Some("completed".to_owned()),
                    }),
                )
            }
        };

        if let Some(item) = item {
            frames.push_str(&Self::frame(
                ctx,
                "response.output_item.done",
                json!({"output_index": index, "item": to_json(&item)}),
            ));
        }

        frames
    }

    fn completed(ctx: &mut StreamContext) -> String {
        let mut snapshot = ctx.accumulator().snapshot();
        ctx.id().clone_into(&mut snapshot.id);
        ctx.model().clone_into(&mut snapshot.model);
        snapshot.created = Some(ctx.created());

        let response = ResponsesResponse::from(&snapshot);
        let name = if response.status == "incomplete" {
            "response.incomplete"
        } else {
            "response.completed"
        };

        Self::frame(ctx, name, json!({ "response": to_json(&response) }))
    }
}

impl ResponseAdapter for ResponsesResponseAdapter {
    fn format(&self) -> &'static str {
        FORMAT
    }

    fn serialize(&self, response: &CompletionResponse) -> Value {
        to_json(&ResponsesResponse::from(response))
    }

    fn serialize_stream_chunk(&self, event: &StreamEvent, ctx: &mut StreamContext) -> String {
        match event {
            StreamEvent::MessageStart { .. } => {
                let skeleton = Self::skeleton(ctx, "in_progress");
                let mut frames = Self::frame(ctx, "response.created", json!({ "response": skeleton }));
                frames.push_str(&Self::frame(ctx, "response.in_progress", json!({ "response": skeleton })));
                frames
            }
            StreamEvent::ContentBlockStart { index, content_block } => Self::block_started(ctx, *index, content_block),
            StreamEvent::ContentBlockDelta { index, delta } => Self::block_delta(ctx, *index, delta),
            StreamEvent::ContentBlockStop { index } => Self::block_stopped(ctx, *index),
            StreamEvent::MessageStop => Self::completed(ctx),
            StreamEvent::Error { error_type, message } => self.serialize_error(error_type, message),
            StreamEvent::MessageDelta { .. } => String::new(),
        }
    }

    fn serialize_error(&self, error_type: &str, message: &str) -> String {
        event_frame(
            "error",
            &json!({
                "type": "error",
                "code": error_type,
                "message": message,
            }),
        )
    }

    fn terminal_marker(&self) -> &'static str {
        ""
    }
}
