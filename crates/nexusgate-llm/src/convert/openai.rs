//! Conversion between canonical types and `OpenAI` chat wire format

use serde_json::{Value, json};

use super::{BlockKey, ChunkDecoder, StreamBuilder, synthetic_call_id};
use crate::protocol::openai::{
    OpenAiChoice, OpenAiChoiceMessage, OpenAiContent, OpenAiContentPart, OpenAiErrorResponse, OpenAiFunction,
    OpenAiFunctionCall, OpenAiImageUrl, OpenAiMessage, OpenAiPromptTokensDetails, OpenAiRequest, OpenAiResponse,
    OpenAiStop, OpenAiStreamChunk, OpenAiStreamToolCall, OpenAiTool, OpenAiToolCall, OpenAiUsage,
};
use crate::types::{
    BlockDelta, CompletionRequest, CompletionResponse, Content, ContentBlock, ImageSource, Message, Role,
    SamplingParams, StopReason, StreamEvent, ToolChoice, ToolDefinition, ToolUse, Usage, safe_parse_tool_args,
    unix_now,
};

/// Map an `OpenAI` `finish_reason` onto the canonical stop reason
pub fn stop_reason_from_openai(reason: &str) -> Option<StopReason> {
    match reason {
        "stop" => Some(StopReason::EndTurn),
        "length" => Some(StopReason::MaxTokens),
        "tool_calls" | "function_call" => Some(StopReason::ToolUse),
        "content_filter" => Some(StopReason::ContentFilter),
        _ => None,
    }
}

/// `OpenAI` `finish_reason` for a canonical stop reason
pub const fn finish_reason(reason: StopReason) -> &'static str {
    match reason {
        StopReason::EndTurn | StopReason::StopSequence => "stop",
        StopReason::MaxTokens => "length",
        StopReason::ToolUse => "tool_calls",
        StopReason::ContentFilter => "content_filter",
    }
}

// -- Inbound: OpenAI wire format -> canonical --

impl From<OpenAiRequest> for CompletionRequest {
    fn from(req: OpenAiRequest) -> Self {
        Self {
            model: req.model,
            messages: req.messages.into_iter().map(Into::into).collect(),
            system: None,
            params: SamplingParams {
                max_tokens: req.max_completion_tokens.or(req.max_tokens),
                temperature: req.temperature,
                top_p: req.top_p,
                top_k: req.top_k,
            },
            stream: req.stream.unwrap_or(false),
            tools: req
                .tools
                .unwrap_or_default()
                .into_iter()
                .map(|t| ToolDefinition {
                    name: t.function.name,
                    description: t.function.description,
                    input_schema: t.function.parameters.unwrap_or_else(empty_schema),
                })
                .collect(),
            tool_choice: req.tool_choice.as_ref().and_then(parse_tool_choice),
            stop_sequences: req.stop.map(OpenAiStop::into_vec).unwrap_or_default(),
            extra_params: serde_json::Map::new(),
            extra_headers: http::HeaderMap::new(),
        }
    }
}

impl From<OpenAiMessage> for Message {
    fn from(msg: OpenAiMessage) -> Self {
        let role = match msg.role.as_str() {
            "system" | "developer" => Role::System,
            "assistant" => Role::Assistant,
            "tool" | "function" => Role::Tool,
            _ => Role::User,
        };

        let content = match msg.content {
            Some(OpenAiContent::Text(text)) => Content::Text(text),
            Some(OpenAiContent::Parts(parts)) => Content::from_blocks(
                parts
                    .into_iter()
                    .filter_map(|part| match part {
                        OpenAiContentPart::Text { text } => Some(ContentBlock::Text { text }),
                        OpenAiContentPart::ImageUrl { image_url } => Some(ContentBlock::Image {
                            source: ImageSource::from_url(&image_url.url),
                        }),
                        OpenAiContentPart::Unsupported => None,
                    })
                    .collect(),
            ),
            None => Content::default(),
        };

        let tool_calls = msg
            .tool_calls
            .filter(|calls| !calls.is_empty())
            .map(|calls| calls.into_iter().map(tool_use_from_call).collect());

        Self {
            role,
            content,
            tool_call_id: msg.tool_call_id,
            tool_calls,
        }
    }
}

fn tool_use_from_call(call: OpenAiToolCall) -> ToolUse {
    ToolUse {
        id: call.id,
        name: call.function.name,
        input: safe_parse_tool_args(&call.function.arguments),
    }
}

/// Parse `OpenAI`'s flexible `tool_choice` field
pub fn parse_tool_choice(value: &Value) -> Option<ToolChoice> {
    match value {
        Value::String(s) => match s.as_str() {
            "none" => Some(ToolChoice::None),
            "auto" => Some(ToolChoice::Auto),
            "required" => Some(ToolChoice::Any),
            _ => None,
        },
        Value::Object(obj) => obj
            .get("function")
            .and_then(|f| f.get("name"))
            .or_else(|| obj.get("name"))
            .and_then(Value::as_str)
            .map(|name| ToolChoice::Tool { name: name.to_owned() }),
        _ => None,
    }
}

fn empty_schema() -> Value {
    json!({"type": "object", "properties": {}})
}

impl From<&OpenAiUsage> for Usage {
    fn from(usage: &OpenAiUsage) -> Self {
        Self {
            input_tokens: usage.prompt_tokens,
            output_tokens: usage.completion_tokens,
            cache_creation_input_tokens: None,
            cache_read_input_tokens: usage.prompt_tokens_details.as_ref().and_then(|d| d.cached_tokens),
        }
    }
}

impl From<OpenAiResponse> for CompletionResponse {
    fn from(resp: OpenAiResponse) -> Self {
        let (message, finish) = resp
            .choices
            .into_iter()
            .next()
            .map(|c| (c.message, c.finish_reason))
            .unwrap_or_default();

        let mut content = Vec::new();

        if let Some(thinking) = message.reasoning_content.or(message.reasoning).filter(|s| !s.is_empty()) {
            content.push(ContentBlock::Thinking {
                thinking,
                signature: None,
            });
        }

        if let Some(text) = message.content.filter(|s| !s.is_empty()) {
            content.push(ContentBlock::Text { text });
        }

        content.extend(
            message
                .tool_calls
                .unwrap_or_default()
                .into_iter()
                .map(|call| ContentBlock::ToolUse(tool_use_from_call(call))),
        );

        Self {
            id: resp.id,
            model: resp.model,
            content,
            stop_reason: finish.as_deref().and_then(stop_reason_from_openai),
            usage: resp.usage.as_ref().map(Usage::from).unwrap_or_default(),
            created: (resp.created != 0).then_some(resp.created),
        }
    }
}

// -- Outbound: canonical -> OpenAI wire format --

/// Build the upstream chat request body
pub fn to_openai_request(req: &CompletionRequest, model: &str) -> OpenAiRequest {
    OpenAiRequest {
        model: model.to_owned(),
        messages: to_openai_messages(req),
        temperature: req.params.temperature,
        top_p: req.params.top_p,
        top_k: req.params.top_k,
        max_tokens: req.params.max_tokens,
        max_completion_tokens: None,
        stop: (!req.stop_sequences.is_empty()).then(|| OpenAiStop::Many(req.stop_sequences.clone())),
        stream: req.stream.then_some(true),
        stream_options: None,
        tools: (!req.tools.is_empty()).then(|| {
            req.tools
                .iter()
                .map(|t| OpenAiTool {
                    tool_type: "function".to_owned(),
                    function: OpenAiFunction {
                        name: t.name.clone(),
                        description: t.description.clone(),
                        parameters: Some(t.input_schema.clone()),
                    },
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
        ToolChoice::Tool { name } => json!({"type": "function", "function": {"name": name}}),
    }
}

fn to_openai_messages(req: &CompletionRequest) -> Vec<OpenAiMessage> {
    let mut out = Vec::with_capacity(req.messages.len() + 1);

    if let Some(system) = req.system.as_ref().filter(|s| !s.is_empty()) {
        out.push(plain_message("system", OpenAiContent::Text(system.clone())));
    }

    for message in &req.messages {
        match message.role {
            Role::System => out.push(plain_message("system", OpenAiContent::Text(message.content.as_text()))),
            Role::Tool => {
                let results = message.tool_results();
                if results.is_empty() {
                    let mut msg = plain_message("tool", OpenAiContent::Text(message.content.as_text()));
                    msg.tool_call_id.clone_from(&message.tool_call_id);
                    out.push(msg);
                }
                out.extend(results.iter().map(|r| tool_message(r.tool_use_id, r.content)));
            }
            Role::User => {
                out.extend(message.tool_results().iter().map(|r| tool_message(r.tool_use_id, r.content)));
                if let Some(content) = user_content(&message.content) {
                    out.push(plain_message("user", content));
                }
            }
            Role::Assistant => {
                let text = message.content.as_text();
                let calls: Vec<OpenAiToolCall> = message
                    .tool_uses()
                    .into_iter()
                    .map(|t| OpenAiToolCall {
                        id: t.id.clone(),
                        tool_type: "function".to_owned(),
                        function: OpenAiFunctionCall {
                            name: t.name.clone(),
                            arguments: t.input.to_string(),
                        },
                    })
                    .collect();

                out.push(OpenAiMessage {
                    role: "assistant".to_owned(),
                    content: (!text.is_empty() || calls.is_empty()).then_some(OpenAiContent::Text(text)),
                    name: None,
                    tool_calls: (!calls.is_empty()).then_some(calls),
                    tool_call_id: None,
                });
            }
        }
    }

    out
}

/// User content with tool results removed; `None` if nothing remains
fn user_content(content: &Content) -> Option<OpenAiContent> {
    match content {
        Content::Text(text) => Some(OpenAiContent::Text(text.clone())),
        Content::Blocks(blocks) => {
            let parts: Vec<OpenAiContentPart> = blocks
                .iter()
                .filter_map(|b| match b {
                    ContentBlock::Text { text } => Some(OpenAiContentPart::Text { text: text.clone() }),
                    ContentBlock::Image { source } => Some(OpenAiContentPart::ImageUrl {
                        image_url: OpenAiImageUrl {
                            url: source.to_url(),
                            detail: None,
                        },
                    }),
                    _ => None,
                })
                .collect();

            if parts.is_empty() {
                None
            } else if parts.iter().all(|p| matches!(p, OpenAiContentPart::Text { .. })) {
                Some(OpenAiContent::Text(content.as_text()))
            } else {
                Some(OpenAiContent::Parts(parts))
            }
        }
    }
}

fn plain_message(role: &str, content: OpenAiContent) -> OpenAiMessage {
    OpenAiMessage {
        role: role.to_owned(),
        content: Some(content),
        name: None,
        tool_calls: None,
        tool_call_id: None,
    }
}

fn tool_message(tool_call_id: &str, content: &str) -> OpenAiMessage {
    OpenAiMessage {
        role: "tool".to_owned(),
        content: Some(OpenAiContent::Text(content.to_owned())),
        name: None,
        tool_calls: None,
        tool_call_id: Some(tool_call_id.to_owned()),
    }
}

/// Wire usage with unknown counts reported as zero
pub fn to_openai_usage(usage: &Usage) -> OpenAiUsage {
    let prompt = usage.input_tokens.unwrap_or(0);
    let completion = usage.output_tokens.unwrap_or(0);

    OpenAiUsage {
        prompt_tokens: Some(prompt),
        completion_tokens: Some(completion),
        total_tokens: Some(prompt.saturating_add(completion)),
        prompt_tokens_details: usage
            .cache_read_input_tokens
            .map(|cached| OpenAiPromptTokensDetails { cached_tokens: Some(cached) }),
    }
}

impl From<&CompletionResponse> for OpenAiResponse {
    fn from(resp: &CompletionResponse) -> Self {
        let mut thinking = String::new();
        let mut calls = Vec::new();

        for block in &resp.content {
            match block {
                ContentBlock::Thinking { thinking: t, .. } => thinking.push_str(t),
                ContentBlock::ToolUse(tool) => calls.push(OpenAiToolCall {
                    id: tool.id.clone(),
                    tool_type: "function".to_owned(),
                    function: OpenAiFunctionCall {
                        name: tool.name.clone(),
                        arguments: tool.input.to_string(),
                    },
                }),
                _ => {}
            }
        }

        let text = resp.text();

        Self {
            id: resp.id.clone(),
            object: "chat.completion".to_owned(),
            created: resp.created.unwrap_or_else(unix_now),
            model: resp.model.clone(),
            choices: vec![OpenAiChoice {
                index: 0,
                message: OpenAiChoiceMessage {
                    role: "assistant".to_owned(),
                    content: (!text.is_empty() || calls.is_empty()).then_some(text),
                    reasoning_content: (!thinking.is_empty()).then_some(thinking),
                    reasoning: None,
                    tool_calls: (!calls.is_empty()).then_some(calls),
                },
                finish_reason: resp.stop_reason.map(|r| finish_reason(r).to_owned()),
            }],
            usage: Some(to_openai_usage(&resp.usage)),
        }
    }
}

// -- Stream decoding --

/// Decoder for `OpenAI`-compatible `chat.completion.chunk` streams
#[derive(Debug, Default)]
pub struct OpenAiDecoder {
    builder: StreamBuilder,
}

impl OpenAiDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    fn tool_call(&mut self, call: OpenAiStreamToolCall, out: &mut Vec<StreamEvent>) {
        let key = BlockKey::Slot(call.index);
        let (name, arguments) = call.function.map(|f| (f.name, f.arguments)).unwrap_or_default();

        if call.id.is_some() || name.is_some() {
            self.builder.start_block(
                key.clone(),
                ContentBlock::ToolUse(ToolUse {
                    id: call.id.unwrap_or_else(synthetic_call_id),
                    name: name.unwrap_or_default(),
                    input: json!({}),
                }),
                out,
            );
        }

        if let Some(partial_json) = arguments.filter(|a| !a.is_empty()) {
            self.builder.delta(
                key,
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
    }
}

impl ChunkDecoder for OpenAiDecoder {
    fn decode(&mut self, _event: &str, data: &str) -> Vec<StreamEvent> {
        let mut out = Vec::new();
        let data = data.trim();

        if data.is_empty() {
            return out;
        }

        if data == "[DONE]" {
            self.builder.finish(&mut out);
            return out;
        }

        if let Ok(err) = serde_json::from_str::<OpenAiErrorResponse>(data) {
            out.push(StreamEvent::Error {
                error_type: err.error.error_type.unwrap_or_else(|| "api_error".to_owned()),
                message: err.error.message,
            });
            return out;
        }

        let chunk = match serde_json::from_str::<OpenAiStreamChunk>(data) {
            Ok(chunk) => chunk,
            Err(e) => {
                tracing::debug!(error = %e, "skipping unparsable openai stream frame");
                return out;
            }
        };

        self.builder.identify(&chunk.id, &chunk.model);
        self.builder.start(&mut out);

        if let Some(choice) = chunk.choices.into_iter().next() {
            let delta = choice.delta;

            if let Some(thinking) = delta.reasoning_content.or(delta.reasoning).filter(|s| !s.is_empty()) {
                self.builder.delta(
                    BlockKey::Thinking,
                    || ContentBlock::Thinking {
                        thinking: String::new(),
                        signature: None,
                    },
                    BlockDelta::ThinkingDelta { thinking },
                    &mut out,
                );
            }

            if let Some(text) = delta.content.filter(|s| !s.is_empty()) {
                self.builder.delta(
                    BlockKey::Text,
                    || ContentBlock::Text { text: String::new() },
                    BlockDelta::TextDelta { text },
                    &mut out,
                );
            }

            for call in delta.tool_calls.unwrap_or_default() {
                self.tool_call(call, &mut out);
            }

            if let Some(reason) = choice.finish_reason.as_deref().and_then(stop_reason_from_openai) {
                self.builder.set_stop_reason(reason);
            }
        }

        if let Some(usage) = &chunk.usage {
            self.builder.merge_usage(&usage.into());
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
