//! Conversion between canonical types and `OpenAI` Responses wire format

use std::collections::HashSet;

use serde_json::{Value, json};

use super::{BlockKey, ChunkDecoder, StreamBuilder, synthetic_call_id};
use crate::protocol::responses::{
    ResponsesContentPart, ResponsesIncompleteDetails, ResponsesInput, ResponsesInputItem, ResponsesInputTokensDetails,
    ResponsesMessageContent, ResponsesOutputItem, ResponsesRequest, ResponsesResponse, ResponsesStreamEvent,
    ResponsesSummaryPart, ResponsesTool, ResponsesUsage,
};
use crate::types::{
    BlockDelta, CompletionRequest, CompletionResponse, Content, ContentBlock, ImageSource, Message, Role,
    SamplingParams, StopReason, StreamEvent, ToolChoice, ToolDefinition, ToolUse, Usage, safe_parse_tool_args,
    unix_now,
};

/// Canonical stop reason for a finished response
///
/// Responses carry no stop reason of their own: `incomplete` names its cause,
/// and a completed response that called a tool stopped for tool use.
pub fn stop_reason_from_status(status: &str, incomplete_reason: Option<&str>, saw_tool_use: bool) -> Option<StopReason> {
    match status {
        "incomplete" => match incomplete_reason {
            Some("max_output_tokens") => Some(StopReason::MaxTokens),
            Some("content_filter") => Some(StopReason::ContentFilter),
            _ => None,
        },
        "completed" if saw_tool_use => Some(StopReason::ToolUse),
        "completed" => Some(StopReason::EndTurn),
        _ => None,
    }
}

/// Status and incomplete details reported for a canonical stop reason
pub fn response_status(stop_reason: Option<StopReason>) -> (String, Option<ResponsesIncompleteDetails>) {
    let reason = match stop_reason {
        Some(StopReason::MaxTokens) => "max_output_tokens",
        Some(StopReason::ContentFilter) => "content_filter",
        _ => return ("completed".to_owned(), None),
    };

    (
        "incomplete".to_owned(),
        Some(ResponsesIncompleteDetails {
            reason: reason.to_owned(),
        }),
    )
}

/// Identifier of the output item built from canonical block `index`
pub fn item_id(prefix: &str, response_id: &str, index: u32) -> String {
    format!("{prefix}_{response_id}_{index}")
}

// -- Inbound: Responses wire format -> canonical --

impl From<ResponsesRequest> for CompletionRequest {
    fn from(req: ResponsesRequest) -> Self {
        let mut messages = Vec::new();

        match req.input {
            ResponsesInput::Text(text) => messages.push(Message::user(text)),
            ResponsesInput::Items(items) => {
                for item in items {
                    push_input_item(&mut messages, item);
                }
            }
        }

        Self {
            model: req.model,
            messages,
            system: req.instructions.filter(|s| !s.is_empty()),
            params: SamplingParams {
                max_tokens: req.max_output_tokens,
                temperature: req.temperature,
                top_p: req.top_p,
                top_k: None,
            },
            stream: req.stream.unwrap_or(false),
            tools: req
                .tools
                .unwrap_or_default()
                .into_iter()
                .filter_map(|tool| match tool {
                    ResponsesTool::Function {
                        name,
                        description,
                        parameters,
                    } => Some(ToolDefinition {
                        name,
                        description,
                        input_schema: parameters.unwrap_or_else(|| json!({"type": "object", "properties": {}})),
                    }),
                    ResponsesTool::Unsupported => None,
                })
                .collect(),
            tool_choice: req.tool_choice.as_ref().and_then(super::openai::parse_tool_choice),
            stop_sequences: Vec::new(),
            extra_params: serde_json::Map::new(),
            extra_headers: http::HeaderMap::new(),
        }
    }
}

fn push_input_item(messages: &mut Vec<Message>, item: ResponsesInputItem) {
    match item {
        ResponsesInputItem::Message { role, content } => {
            let role = match role.as_str() {
                "system" | "developer" => Role::System,
                "assistant" => Role::Assistant,
                _ => Role::User,
            };

            let content = match content {
                ResponsesMessageContent::Text(text) => Content::Text(text),
                ResponsesMessageContent::Parts(parts) => Content::from_blocks(
                    parts
                        .into_iter()
                        .filter_map(|part| match part {
                            ResponsesContentPart::InputText { text } | ResponsesContentPart::OutputText { text, .. } => {
                                Some(ContentBlock::Text { text })
                            }
                            ResponsesContentPart::Refusal { refusal } => Some(ContentBlock::Text { text: refusal }),
                            ResponsesContentPart::InputImage { image_url } => image_url.map(|url| ContentBlock::Image {
                                source: ImageSource::from_url(&url),
                            }),
                            ResponsesContentPart::Unsupported => None,
                        })
                        .collect(),
                ),
            };

            messages.push(Message::new(role, content));
        }
        ResponsesInputItem::FunctionCall {
            call_id,
            name,
            arguments,
        } => {
            let tool_use = ToolUse {
                id: call_id,
                name,
                input: safe_parse_tool_args(&arguments),
            };

            match messages.last_mut() {
                Some(last) if last.role == Role::Assistant => {
                    last.tool_calls.get_or_insert_with(Vec::new).push(tool_use);
                }
                _ => {
                    let mut message = Message::new(Role::Assistant, Content::default());
                    message.tool_calls = Some(vec![tool_use]);
                    messages.push(message);
                }
            }
        }
        ResponsesInputItem::FunctionCallOutput { call_id, output } => {
            messages.push(Message::tool_result(call_id, Content::Text(output)));
        }
        ResponsesInputItem::Unsupported => {}
    }
}

impl From<&ResponsesUsage> for Usage {
    fn from(usage: &ResponsesUsage) -> Self {
        Self {
            input_tokens: usage.input_tokens,
            output_tokens: usage.output_tokens,
            cache_creation_input_tokens: None,
            cache_read_input_tokens: usage.input_tokens_details.as_ref().and_then(|d| d.cached_tokens),
        }
    }
}

impl From<ResponsesResponse> for CompletionResponse {
    fn from(resp: ResponsesResponse) -> Self {
        let mut content = Vec::new();
        let mut refused = false;

        for item in resp.output {
            match item {
                ResponsesOutputItem::Reasoning { summary, .. } => {
                    let thinking: String = summary
                        .into_iter()
                        .map(|ResponsesSummaryPart::SummaryText { text }| text)
                        .collect();
                    if !thinking.is_empty() {
                        content.push(ContentBlock::Thinking {
                            thinking,
                            signature: None,
                        });
                    }
                }
                ResponsesOutputItem::Message { content: parts, .. } => {
                    for part in parts {
                        match part {
                            ResponsesContentPart::OutputText { text, .. } => content.push(ContentBlock::Text { text }),
                            ResponsesContentPart::Refusal { refusal } => {
                                refused = true;
                                content.push(ContentBlock::Text { text: refusal });
                            }
                            _ => {}
                        }
                    }
                }
                ResponsesOutputItem::FunctionCall {
                    call_id,
                    name,
                    arguments,
                    ..
                } => content.push(ContentBlock::ToolUse(ToolUse {
                    id: call_id,
                    name,
                    input: safe_parse_tool_args(&arguments),
                })),
                ResponsesOutputItem::Unsupported => {}
            }
        }

        let saw_tool_use = content.iter().any(|b| matches!(b, ContentBlock::ToolUse(_)));
        let stop_reason = if refused {
            Some(StopReason::ContentFilter)
        } else {
            stop_reason_from_status(
                &resp.status,
                resp.incomplete_details.as_ref().map(|d| d.reason.as_str()),
                saw_tool_use,
            )
        };

        Self {
            id: resp.id,
            model: resp.model,
            content,
            stop_reason,
            usage: resp.usage.as_ref().map(Usage::from).unwrap_or_default(),
            created: (resp.created_at != 0).then_some(resp.created_at),
        }
    }
}

// -- Outbound: canonical -> Responses wire format --

/// Build the upstream Responses request body
pub fn to_responses_request(req: &CompletionRequest, model: &str) -> ResponsesRequest {
    let mut items = Vec::with_capacity(req.messages.len());

    for message in &req.messages {
        match message.role {
            Role::System => {}
            Role::User | Role::Tool => {
                items.extend(message.tool_results().iter().map(|r| ResponsesInputItem::FunctionCallOutput {
                    call_id: r.tool_use_id.to_owned(),
                    output: r.content.to_owned(),
                }));

                if message.role == Role::User
                    && let Some(content) = user_content(&message.content)
                {
                    items.push(ResponsesInputItem::Message {
                        role: "user".to_owned(),
                        content,
                    });
                }
            }
            Role::Assistant => {
                let text = message.content.as_text();
                if !text.is_empty() {
                    items.push(ResponsesInputItem::Message {
                        role: "assistant".to_owned(),
                        content: ResponsesMessageContent::Parts(vec![ResponsesContentPart::OutputText {
                            text,
                            annotations: Vec::new(),
                        }]),
                    });
                }

                items.extend(message.tool_uses().into_iter().map(|t| ResponsesInputItem::FunctionCall {
                    call_id: t.id.clone(),
                    name: t.name.clone(),
                    arguments: t.input.to_string(),
                }));
            }
        }
    }

    ResponsesRequest {
        model: model.to_owned(),
        input: ResponsesInput::Items(items),
        instructions: req.system_text(),
        max_output_tokens: req.params.max_tokens,
        temperature: req.params.temperature,
        top_p: req.params.top_p,
        stream: req.stream.then_some(true),
        tools: (!req.tools.is_empty()).then(|| {
            req.tools
                .iter()
                .map(|t| ResponsesTool::Function {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    parameters: Some(t.input_schema.clone()),
                })
                .collect()
        }),
        tool_choice: req.tool_choice.as_ref().map(tool_choice_value),
    }
}

fn tool_choice_value(choice: &ToolChoice) -> Value {
    match choice {
        ToolChoice::Auto => json!("auto"),
        ToolChoice::Any => json!("required"),
        ToolChoice::None => json!("none"),
        ToolChoice::Tool { name } => json!({"type": "function", "name": name}),
    }
}

fn user_content(content: &Content) -> Option<ResponsesMessageContent> {
    match content {
        Content::Text(text) => Some(ResponsesMessageContent::Text(text.clone())),
        Content::Blocks(blocks) => {
            let parts: Vec<ResponsesContentPart> = blocks
                .iter()
                .filter_map(|b| match b {
                    ContentBlock::Text { text } => Some(ResponsesContentPart::InputText { text: text.clone() }),
                    ContentBlock::Image { source } => Some(ResponsesContentPart::InputImage {
                        image_url: Some(source.to_url()),
                    }),
                    _ => None,
                })
                .collect();

            (!parts.is_empty()).then_some(ResponsesMessageContent::Parts(parts))
        }
    }
}

/// Output item for canonical block `index`; `None` for blocks with no output form
pub fn output_item(response_id: &str, index: u32, block: &ContentBlock, status: &str) -> Option<ResponsesOutputItem> {
    match block {
        ContentBlock::Text { text } => Some(ResponsesOutputItem::Message {
            id: item_id("msg", response_id, index),
            role: "assistant".to_owned(),
            status: Some(status.to_owned()),
            content: vec![ResponsesContentPart::OutputText {
                text: text.clone(),
                annotations: Vec::new(),
            }],
        }),
        ContentBlock::Thinking { thinking, .. } => Some(ResponsesOutputItem::Reasoning {
            id: item_id("rs", response_id, index),
            summary: vec![ResponsesSummaryPart::SummaryText { text: thinking.clone() }],
        }),
        ContentBlock::ToolUse(tool) => Some(ResponsesOutputItem::FunctionCall {
            id: item_id("fc", response_id, index),
            call_id: tool.id.clone(),
            name: tool.name.clone(),
            arguments: tool.input.to_string(),
            status: Some(status.to_owned()),
        }),
        ContentBlock::ToolResult { .. } | ContentBlock::Image { .. } => None,
    }
}

/// Wire usage with unknown counts reported as zero
pub fn to_responses_usage(usage: &Usage) -> ResponsesUsage {
    let input = usage.input_tokens.unwrap_or(0);
    let output = usage.output_tokens.unwrap_or(0);

    ResponsesUsage {
        input_tokens: Some(input),
        output_tokens: Some(output),
        total_tokens: Some(input.saturating_add(output)),
        input_tokens_details: usage
            .cache_read_input_tokens
            .map(|cached| ResponsesInputTokensDetails { cached_tokens: Some(cached) }),
    }
}

impl From<&CompletionResponse> for ResponsesResponse {
    fn from(resp: &CompletionResponse) -> Self {
        let (status, incomplete_details) = response_status(resp.stop_reason);

        let output = resp
            .content
            .iter()
            .zip(0u32..)
            .filter_map(|(block, index)| output_item(&resp.id, index, block, "completed"))
            .collect();

        Self {
            id: resp.id.clone(),
            object: "response".to_owned(),
            created_at: resp.created.unwrap_or_else(unix_now),
            model: resp.model.clone(),
            status,
            output,
            incomplete_details,
            error: None,
            usage: Some(to_responses_usage(&resp.usage)),
        }
    }
}

// -- Stream decoding --

/// Decoder for Responses named-event streams
#[derive(Debug, Default)]
pub struct ResponsesDecoder {
    builder: StreamBuilder,
    streamed_arguments: HashSet<String>,
}

impl ResponsesDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    fn arguments(&mut self, item_id: String, partial_json: String, out: &mut Vec<StreamEvent>) {
        if partial_json.is_empty() {
            return;
        }

        self.streamed_arguments.insert(item_id.clone());
        self.builder.delta(
            BlockKey::Item(item_id),
            || {
                ContentBlock::ToolUse(ToolUse {
                    id: synthetic_call_id(),
                    name: String::new(),
                    input: json!({}),
                })
            },
            BlockDelta::InputJsonDelta { partial_json },
            out,
        );
    }

    fn item_done(&mut self, item: ResponsesOutputItem, out: &mut Vec<StreamEvent>) {
        match item {
            ResponsesOutputItem::FunctionCall {
                id,
                call_id,
                name,
                arguments,
                ..
            } => {
                let key = BlockKey::Item(id.clone());
                if !self.streamed_arguments.contains(&id) {
                    self.builder.start_block(
                        key.clone(),
                        ContentBlock::ToolUse(ToolUse {
                            id: call_id,
                            name,
                            input: json!({}),
                        }),
                        out,
                    );
                    self.arguments(id, arguments, out);
                }
                self.builder.stop_block(&key, out);
            }
            ResponsesOutputItem::Reasoning { id, .. } => self.builder.stop_block(&BlockKey::Reasoning(id), out),
            ResponsesOutputItem::Message { id, .. } => self
                .builder
                .close_where(|key| matches!(key, BlockKey::Part(item, _) if *item == id), out),
            ResponsesOutputItem::Unsupported => {}
        }
    }

    fn complete(&mut self, response: &ResponsesResponse, out: &mut Vec<StreamEvent>) {
        if let Some(usage) = &response.usage {
            self.builder.merge_usage(&usage.into());
        }

        if let Some(reason) = stop_reason_from_status(
            &response.status,
            response.incomplete_details.as_ref().map(|d| d.reason.as_str()),
            self.builder.saw_tool_use(),
        ) {
            self.builder.set_stop_reason(reason);
        }

        self.builder.finish(out);
    }
}

fn thinking_header() -> ContentBlock {
    ContentBlock::Thinking {
        thinking: String::new(),
        signature: None,
    }
}

impl ChunkDecoder for ResponsesDecoder {
    fn decode(&mut self, _event: &str, data: &str) -> Vec<StreamEvent> {
        let mut out = Vec::new();

        let event = match serde_json::from_str::<ResponsesStreamEvent>(data.trim()) {
            Ok(event) => event,
            Err(e) => {
                tracing::debug!(error = %e, "skipping unparsable responses stream frame");
                return out;
            }
        };

        match event {
            ResponsesStreamEvent::Created { response } | ResponsesStreamEvent::InProgress { response } => {
                self.builder.identify(&response.id, &response.model);
                self.builder.start(&mut out);
            }
            ResponsesStreamEvent::OutputItemAdded {
                item: ResponsesOutputItem::FunctionCall { id, call_id, name, .. },
                ..
            } => {
                self.builder.start_block(
                    BlockKey::Item(id),
                    ContentBlock::ToolUse(ToolUse {
                        id: call_id,
                        name,
                        input: json!({}),
                    }),
                    &mut out,
                );
            }
            ResponsesStreamEvent::OutputTextDelta {
                item_id,
                content_index,
                delta,
                ..
            } => {
                if !delta.is_empty() {
                    self.builder.delta(
                        BlockKey::Part(item_id, content_index),
                        || ContentBlock::Text { text: String::new() },
                        BlockDelta::TextDelta { text: delta },
                        &mut out,
                    );
                }
            }
            ResponsesStreamEvent::OutputTextDone {
                item_id, content_index, ..
            }
            | ResponsesStreamEvent::ContentPartDone {
                item_id, content_index, ..
            } => self.builder.stop_block(&BlockKey::Part(item_id, content_index), &mut out),
            ResponsesStreamEvent::ReasoningSummaryTextDelta { item_id, delta, .. }
            | ResponsesStreamEvent::ReasoningTextDelta { item_id, delta, .. } => {
                if !delta.is_empty() {
                    self.builder.delta(
                        BlockKey::Reasoning(item_id),
                        thinking_header,
                        BlockDelta::ThinkingDelta { thinking: delta },
                        &mut out,
                    );
                }
            }
            ResponsesStreamEvent::FunctionCallArgumentsDelta { item_id, delta, .. } => {
                self.arguments(item_id, delta, &mut out);
            }
            ResponsesStreamEvent::FunctionCallArgumentsDone { item_id, arguments, .. } => {
                if !self.streamed_arguments.contains(&item_id) {
                    self.arguments(item_id, arguments, &mut out);
                }
            }
            ResponsesStreamEvent::OutputItemDone { item, .. } => self.item_done(item, &mut out),
            ResponsesStreamEvent::Completed { response } | ResponsesStreamEvent::Incomplete { response } => {
                self.builder.identify(&response.id, &response.model);
                self.complete(&response, &mut out);
            }
            ResponsesStreamEvent::Failed { response } => {
                let error = response.error.clone();
                out.push(StreamEvent::Error {
                    error_type: error
                        .as_ref()
                        .and_then(|e| e.code.clone())
                        .unwrap_or_else(|| "response_failed".to_owned()),
                    message: error.map(|e| e.message).unwrap_or_default(),
                });
                self.complete(&response, &mut out);
            }
            ResponsesStreamEvent::Error { code, message } => out.push(StreamEvent::Error {
                error_type: code.unwrap_or_else(|| "api_error".to_owned()),
                message,
            }),
            _ => {}
        }

        out
    }

    fn finish(&mut self) -> Vec<StreamEvent> {
        let mut out = Vec::new();
        self.builder.finish(&mut out);
        out
    }

    fn is_finished(&self) -> bool {
        self.builder.is_finished()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(body: Value) -> CompletionRequest {
        serde_json::from_value::<ResponsesRequest>(body).unwrap().into()
    }

    #[test]
    fn string_input_is_one_user_message() {
        let req = parse(json!({"model": "gpt-4o", "input": "Tell me a joke"}));

        assert_eq!(req.messages.len(), 1);
        assert_eq!(req.messages[0].role, Role::User);
        assert_eq!(req.messages[0].content, Content::Text("Tell me a joke".to_owned()));
    }

    #[test]
    fn function_calls_attach_to_assistant_turn() {
        let req = parse(json!({
            "model": "gpt-4o",
            "input": [
                {"type": "message", "role": "user", "content": "weather?"},
                {"type": "function_call", "call_id": "c1", "name": "weather", "arguments": "{\"city\":\"Oslo\"}"},
                {"type": "function_call", "call_id": "c2", "name": "weather", "arguments": "{\"city\":\"Rome\"}"},
                {"type": "function_call_output", "call_id": "c1", "output": "cold"}
            ]
        }));

        assert_eq!(req.messages.len(), 3);
        assert_eq!(req.messages[1].tool_uses().len(), 2);
        assert_eq!(req.messages[2].tool_results()[0].content, "cold");
    }

    #[test]
    fn image_part_keeps_blocks() {
        let req = parse(json!({
            "model": "gpt-4o",
            "input": [{"type": "message", "role": "user", "content": [
                {"type": "input_text", "text": "what is this"},
                {"type": "input_image", "image_url": "https://example.com/a.png"}
            ]}]
        }));

        assert!(matches!(req.messages[0].content, Content::Blocks(ref b) if b.len() == 2));
    }

    #[test]
    fn incomplete_max_tokens_maps_to_max_tokens() {
        assert_eq!(
            stop_reason_from_status("incomplete", Some("max_output_tokens"), false),
            Some(StopReason::MaxTokens)
        );
        assert_eq!(stop_reason_from_status("completed", None, true), Some(StopReason::ToolUse));
    }

    #[test]
    fn function_call_stream_decodes() {
        let mut decoder = ResponsesDecoder::new();
        let frames = [
            r#"{"type":"response.created","response":{"id":"resp_1","model":"gpt-4o","status":"in_progress","output":[]}}"#,
            r#"{"type":"response.output_item.added","output_index":0,"item":{"type":"function_call","id":"fc_1","call_id":"call_9","name":"lookup","arguments":""}}"#,
            r#"{"type":"response.function_call_arguments.delta","item_id":"fc_1","output_index":0,"delta":"{\"q\":"}"#,
            r#"{"type":"response.function_call_arguments.delta","item_id":"fc_1","output_index":0,"delta":"1}"}"#,
            r#"{"type":"response.function_call_arguments.done","item_id":"fc_1","output_index":0,"arguments":"{\"q\":1}"}"#,
            r#"{"type":"response.output_item.done","output_index":0,"item":{"type":"function_call","id":"fc_1","call_id":"call_9","name":"lookup","arguments":"{\"q\":1}"}}"#,
            r#"{"type":"response.completed","response":{"id":"resp_1","model":"gpt-4o","status":"completed","output":[],"usage":{"input_tokens":3,"output_tokens":4,"total_tokens":7}}}"#,
        ];

        let events: Vec<StreamEvent> = frames.iter().flat_map(|f| decoder.decode("", f)).collect();

        let deltas = events
            .iter()
            .filter(|e| matches!(e, StreamEvent::ContentBlockDelta { delta: BlockDelta::InputJsonDelta { .. }, .. }))
            .count();
        assert_eq!(deltas, 2);
        assert!(events.contains(&StreamEvent::ContentBlockStart {
            index: 0,
            content_block: ContentBlock::ToolUse(ToolUse {
                id: "call_9".to_owned(),
                name: "lookup".to_owned(),
                input: json!({}),
            }),
        }));
        assert!(events.contains(&StreamEvent::MessageDelta {
            stop_reason: Some(StopReason::ToolUse),
            usage: Usage {
                input_tokens: Some(3),
                output_tokens: Some(4),
                ..Default::default()
            },
        }));
        assert!(decoder.is_finished());
    }

    #[test]
    fn output_items_follow_block_order() {
        let resp = CompletionResponse {
            id: "r1".to_owned(),
            model: "m".to_owned(),
            content: vec![
                ContentBlock::Thinking {
                    thinking: "t".to_owned(),
                    signature: None,
                },
                ContentBlock::Text { text: "a".to_owned() },
            ],
            stop_reason: Some(StopReason::MaxTokens),
            usage: Usage::default(),
            created: Some(1),
        };

        let wire = ResponsesResponse::from(&resp);
        assert_eq!(wire.status, "incomplete");
        assert!(matches!(&wire.output[0], ResponsesOutputItem::Reasoning { id, .. } if id == "rs_r1_0"));
        assert!(matches!(&wire.output[1], ResponsesOutputItem::Message { id, .. } if id == "msg_r1_1"));
    }
}
