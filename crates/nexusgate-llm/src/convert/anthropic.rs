//! Conversion between canonical types and Anthropic Messages wire format

use serde_json::json;

use super::{BlockKey, ChunkDecoder, StreamBuilder, synthetic_call_id};
use crate::protocol::anthropic::{
    AnthropicContent, AnthropicContentBlock, AnthropicImageSource, AnthropicMessage, AnthropicRequest,
    AnthropicResponse, AnthropicStreamDelta, AnthropicStreamEvent, AnthropicSystem, AnthropicTool,
    AnthropicToolChoice, AnthropicToolResultContent, AnthropicUsage,
};
use crate::types::{
    BlockDelta, CompletionRequest, CompletionResponse, Content, ContentBlock, ImageSource, Message, Role,
    SamplingParams, StopReason, StreamEvent, ToolChoice, ToolDefinition, ToolUse, Usage,
};

/// Anthropic requires `max_tokens`; used when the client did not set one
pub const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Map an Anthropic `stop_reason` onto the canonical stop reason
pub fn stop_reason_from_anthropic(reason: &str) -> Option<StopReason> {
    match reason {
        "end_turn" | "pause_turn" => Some(StopReason::EndTurn),
        "max_tokens" => Some(StopReason::MaxTokens),
        "stop_sequence" => Some(StopReason::StopSequence),
        "tool_use" => Some(StopReason::ToolUse),
        "refusal" => Some(StopReason::ContentFilter),
        _ => None,
    }
}

/// Anthropic `stop_reason` for a canonical stop reason
pub const fn stop_reason_to_anthropic(reason: StopReason) -> &'static str {
    match reason {
        StopReason::EndTurn => "end_turn",
        StopReason::MaxTokens => "max_tokens",
        StopReason::StopSequence => "stop_sequence",
        StopReason::ToolUse => "tool_use",
        StopReason::ContentFilter => "refusal",
    }
}

// -- Inbound: Anthropic wire format -> canonical --

impl From<AnthropicRequest> for CompletionRequest {
    fn from(req: AnthropicRequest) -> Self {
        Self {
            model: req.model,
            messages: req.messages.into_iter().map(Into::into).collect(),
            system: req.system.map(AnthropicSystem::into_text).filter(|s| !s.is_empty()),
            params: SamplingParams {
                max_tokens: req.max_tokens,
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
                    name: t.name,
                    description: t.description,
                    input_schema: t.input_schema,
                })
                .collect(),
            tool_choice: req.tool_choice.map(|choice| match choice {
                AnthropicToolChoice::Auto => ToolChoice::Auto,
                AnthropicToolChoice::Any => ToolChoice::Any,
                AnthropicToolChoice::None => ToolChoice::None,
                AnthropicToolChoice::Tool { name } => ToolChoice::Tool { name },
            }),
            stop_sequences: req.stop_sequences.unwrap_or_default(),
            extra_params: serde_json::Map::new(),
            extra_headers: http::HeaderMap::new(),
        }
    }
}

impl From<AnthropicMessage> for Message {
    fn from(msg: AnthropicMessage) -> Self {
        let role = if msg.role == "assistant" { Role::Assistant } else { Role::User };

        let content = match msg.content {
            AnthropicContent::Text(text) => Content::Text(text),
            AnthropicContent::Blocks(blocks) => {
                Content::from_blocks(blocks.into_iter().filter_map(block_from_anthropic).collect())
            }
        };

        Self::new(role, content)
    }
}

fn block_from_anthropic(block: AnthropicContentBlock) -> Option<ContentBlock> {
    match block {
        AnthropicContentBlock::Text { text } => Some(ContentBlock::Text { text }),
        AnthropicContentBlock::Image { source } => Some(ContentBlock::Image {
            source: match source {
                AnthropicImageSource::Base64 { media_type, data } => ImageSource::Base64 { media_type, data },
                AnthropicImageSource::Url { url } => ImageSource::Url { url },
            },
        }),
        AnthropicContentBlock::ToolUse { id, name, input } => Some(ContentBlock::ToolUse(ToolUse { id, name, input })),
        AnthropicContentBlock::ToolResult {
            tool_use_id,
            content,
            is_error,
        } => Some(ContentBlock::ToolResult {
            tool_use_id,
            content: content.map(AnthropicToolResultContent::into_text).unwrap_or_default(),
            is_error,
        }),
        AnthropicContentBlock::Thinking { thinking, signature } => Some(ContentBlock::Thinking { thinking, signature }),
        AnthropicContentBlock::RedactedThinking { .. } | AnthropicContentBlock::Unsupported => None,
    }
}

impl From<&AnthropicUsage> for Usage {
    fn from(usage: &AnthropicUsage) -> Self {
        Self {
            input_tokens: usage.input_tokens,
            output_tokens: usage.output_tokens,
            cache_creation_input_tokens: usage.cache_creation_input_tokens,
            cache_read_input_tokens: usage.cache_read_input_tokens,
        }
    }
}

impl From<AnthropicResponse> for CompletionResponse {
    fn from(resp: AnthropicResponse) -> Self {
        Self {
            id: resp.id,
            model: resp.model,
            content: resp.content.into_iter().filter_map(block_from_anthropic).collect(),
            stop_reason: resp.stop_reason.as_deref().and_then(stop_reason_from_anthropic),
            usage: Usage::from(&resp.usage),
            created: None,
        }
    }
}

// -- Outbound: canonical -> Anthropic wire format --

/// Build the upstream messages request body
///
/// System messages fold into `system`, tool results travel in user turns,
/// consecutive turns of the same role merge, and reasoning without a
/// signature is dropped since Anthropic rejects it.
pub fn to_anthropic_request(req: &CompletionRequest, model: &str) -> AnthropicRequest {
    let mut messages: Vec<AnthropicMessage> = Vec::with_capacity(req.messages.len());

    for message in &req.messages {
        let (role, blocks) = match message.role {
            Role::System => continue,
            Role::User | Role::Tool => ("user", user_blocks(message)),
            Role::Assistant => ("assistant", assistant_blocks(message)),
        };

        if blocks.is_empty() {
            continue;
        }

        if let Some(last) = messages.last_mut()
            && last.role == role
            && let AnthropicContent::Blocks(existing) = &mut last.content
        {
            existing.extend(blocks);
        } else {
            messages.push(AnthropicMessage {
                role: role.to_owned(),
                content: AnthropicContent::Blocks(blocks),
            });
        }
    }

    AnthropicRequest {
        model: model.to_owned(),
        max_tokens: Some(req.params.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS)),
        system: req.system_text().map(AnthropicSystem::Text),
        messages,
        temperature: req.params.temperature,
        top_p: req.params.top_p,
        top_k: req.params.top_k,
        stop_sequences: (!req.stop_sequences.is_empty()).then(|| req.stop_sequences.clone()),
        stream: req.stream.then_some(true),
        tools: (!req.tools.is_empty()).then(|| {
            req.tools
                .iter()
                .map(|t| AnthropicTool {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    input_schema: t.input_schema.clone(),
                })
                .collect()
        }),
        tool_choice: req.tool_choice.as_ref().map(|choice| match choice {
            ToolChoice::Auto => AnthropicToolChoice::Auto,
            ToolChoice::Any => AnthropicToolChoice::Any,
            ToolChoice::None => AnthropicToolChoice::None,
            ToolChoice::Tool { name } => AnthropicToolChoice::Tool { name: name.clone() },
        }),
    }
}

fn tool_result_block(tool_use_id: &str, content: &str, is_error: Option<bool>) -> AnthropicContentBlock {
    AnthropicContentBlock::ToolResult {
        tool_use_id: tool_use_id.to_owned(),
        content: Some(AnthropicToolResultContent::Text(content.to_owned())),
        is_error,
    }
}

fn user_blocks(message: &Message) -> Vec<AnthropicContentBlock> {
    let mut blocks: Vec<AnthropicContentBlock> = message
        .tool_results()
        .iter()
        .map(|r| tool_result_block(r.tool_use_id, r.content, r.is_error))
        .collect();

    if message.role == Role::Tool {
        return blocks;
    }

    for block in message.content.to_blocks() {
        match block {
            ContentBlock::Text { text } if !text.is_empty() => blocks.push(AnthropicContentBlock::Text { text }),
            ContentBlock::Image { source } => blocks.push(AnthropicContentBlock::Image {
                source: image_to_anthropic(source),
            }),
            _ => {}
        }
    }

    blocks
}

fn assistant_blocks(message: &Message) -> Vec<AnthropicContentBlock> {
    let mut blocks = Vec::new();

    for block in message.content.to_blocks() {
        match block {
            ContentBlock::Text { text } if !text.is_empty() => blocks.push(AnthropicContentBlock::Text { text }),
            ContentBlock::Thinking {
                thinking,
                signature: Some(signature),
            } => blocks.push(AnthropicContentBlock::Thinking {
                thinking,
                signature: Some(signature),
            }),
            _ => {}
        }
    }

    blocks.extend(message.tool_uses().into_iter().map(|t| AnthropicContentBlock::ToolUse {
        id: t.id.clone(),
        name: t.name.clone(),
        input: t.input.clone(),
    }));

    blocks
}

fn image_to_anthropic(source: ImageSource) -> AnthropicImageSource {
    match source {
        ImageSource::Base64 { media_type, data } => AnthropicImageSource::Base64 { media_type, data },
        ImageSource::Url { url } => AnthropicImageSource::Url { url },
    }
}

/// Wire block for a canonical block
pub fn block_to_anthropic(block: &ContentBlock) -> AnthropicContentBlock {
    match block.clone() {
        ContentBlock::Text { text } => AnthropicContentBlock::Text { text },
        ContentBlock::Thinking { thinking, signature } => AnthropicContentBlock::Thinking { thinking, signature },
        ContentBlock::ToolUse(ToolUse { id, name, input }) => AnthropicContentBlock::ToolUse { id, name, input },
        ContentBlock::ToolResult {
            tool_use_id,
            content,
            is_error,
        } => tool_result_block(&tool_use_id, &content, is_error),
        ContentBlock::Image { source } => AnthropicContentBlock::Image {
            source: image_to_anthropic(source),
        },
    }
}

/// Wire usage with unknown input/output counts reported as zero
pub fn to_anthropic_usage(usage: &Usage) -> AnthropicUsage {
    AnthropicUsage {
        input_tokens: Some(usage.input_tokens.unwrap_or(0)),
        output_tokens: Some(usage.output_tokens.unwrap_or(0)),
        cache_creation_input_tokens: usage.cache_creation_input_tokens,
        cache_read_input_tokens: usage.cache_read_input_tokens,
    }
}

impl From<&CompletionResponse> for AnthropicResponse {
    fn from(resp: &CompletionResponse) -> Self {
        Self {
            id: resp.id.clone(),
            response_type: "message".to_owned(),
            role: "assistant".to_owned(),
            content: resp.content.iter().map(block_to_anthropic).collect(),
            model: resp.model.clone(),
            stop_reason: resp.stop_reason.map(|r| stop_reason_to_anthropic(r).to_owned()),
            stop_sequence: None,
            usage: to_anthropic_usage(&resp.usage),
        }
    }
}

// -- Stream decoding --

/// Decoder for Anthropic Messages event streams
#[derive(Debug, Default)]
pub struct AnthropicDecoder {
    builder: StreamBuilder,
}

impl AnthropicDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    fn block_start(&mut self, index: u32, block: AnthropicContentBlock, out: &mut Vec<StreamEvent>) {
        let key = BlockKey::Slot(index);

        match block {
            AnthropicContentBlock::Text { text } => {
                self.builder.start_block(key.clone(), ContentBlock::Text { text: String::new() }, out);
                if !text.is_empty() {
                    self.builder.delta(key, text_header, BlockDelta::TextDelta { text }, out);
                }
            }
            AnthropicContentBlock::Thinking { thinking, .. } => {
                self.builder.start_block(key.clone(), thinking_header(), out);
                if !thinking.is_empty() {
                    self.builder.delta(key, thinking_header, BlockDelta::ThinkingDelta { thinking }, out);
                }
            }
            AnthropicContentBlock::ToolUse { id, name, input } => {
                self.builder.start_block(
                    key.clone(),
                    ContentBlock::ToolUse(ToolUse {
                        id,
                        name,
                        input: json!({}),
                    }),
                    out,
                );
                if input.as_object().is_some_and(|o| !o.is_empty()) {
                    self.builder.delta(
                        key,
                        tool_header,
                        BlockDelta::InputJsonDelta {
                            partial_json: input.to_string(),
                        },
                        out,
                    );
                }
            }
            _ => {}
        }
    }

    fn block_delta(&mut self, index: u32, delta: AnthropicStreamDelta, out: &mut Vec<StreamEvent>) {
        let key = BlockKey::Slot(index);

        match delta {
            AnthropicStreamDelta::TextDelta { text } => {
                self.builder.delta(key, text_header, BlockDelta::TextDelta { text }, out);
            }
            AnthropicStreamDelta::ThinkingDelta { thinking } => {
                self.builder.delta(key, thinking_header, BlockDelta::ThinkingDelta { thinking }, out);
            }
            AnthropicStreamDelta::SignatureDelta { signature } => {
                self.builder.delta(key, thinking_header, BlockDelta::SignatureDelta { signature }, out);
            }
            AnthropicStreamDelta::InputJsonDelta { partial_json } => {
                if !partial_json.is_empty() {
                    self.builder.delta(key, tool_header, BlockDelta::InputJsonDelta { partial_json }, out);
                }
            }
            AnthropicStreamDelta::Unsupported => {}
        }
    }
}

fn text_header() -> ContentBlock {
    ContentBlock::Text { text: String::new() }
}

fn thinking_header() -> ContentBlock {
    ContentBlock::Thinking {
        thinking: String::new(),
        signature: None,
    }
}

fn tool_header() -> ContentBlock {
    ContentBlock::ToolUse(ToolUse {
        id: synthetic_call_id(),
        name: String::new(),
        input: json!({}),
    })
}

impl ChunkDecoder for AnthropicDecoder {
    fn decode(&mut self, _event: &str, data: &str) -> Vec<StreamEvent> {
        let mut out = Vec::new();

        let event = match serde_json::from_str::<AnthropicStreamEvent>(data.trim()) {
            Ok(event) => event,
            Err(e) => {
                tracing::debug!(error = %e, "skipping unparsable anthropic stream frame");
                return out;
            }
        };

        match event {
            AnthropicStreamEvent::MessageStart { message } => {
                self.builder.identify(&message.id, &message.model);
                if let Some(usage) = &message.usage {
                    self.builder.merge_usage(&usage.into());
                }
                self.builder.start(&mut out);
            }
            AnthropicStreamEvent::ContentBlockStart { index, content_block } => {
                self.block_start(index, content_block, &mut out);
            }
            AnthropicStreamEvent::ContentBlockDelta { index, delta } => self.block_delta(index, delta, &mut out),
            AnthropicStreamEvent::ContentBlockStop { index } => self.builder.stop_block(&BlockKey::Slot(index), &mut out),
            AnthropicStreamEvent::MessageDelta { delta, usage } => {
                if let Some(reason) = delta.stop_reason.as_deref().and_then(stop_reason_from_anthropic) {
                    self.builder.set_stop_reason(reason);
                }
                if let Some(usage) = &usage {
                    self.builder.merge_usage(&usage.into());
                }
            }
            AnthropicStreamEvent::MessageStop => self.builder.finish(&mut out),
            AnthropicStreamEvent::Error { error } => out.push(StreamEvent::Error {
                error_type: error.error_type,
                message: error.message,
            }),
            AnthropicStreamEvent::Ping | AnthropicStreamEvent::Unsupported => {}
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

    #[test]
    fn unsigned_thinking_is_not_replayed() {
        let req = CompletionRequest {
            model: "m".to_owned(),
            messages: vec![
                Message::user("hi"),
                Message::new(
                    Role::Assistant,
                    Content::Blocks(vec![
                        ContentBlock::Thinking {
                            thinking: "private".to_owned(),
                            signature: None,
                        },
                        ContentBlock::Text {
                            text: "hello".to_owned(),
                        },
                    ]),
                ),
            ],
            ..Default::default()
        };

        let wire = to_anthropic_request(&req, "claude");
        let AnthropicContent::Blocks(blocks) = &wire.messages[1].content else {
            panic!("expected blocks");
        };
        assert_eq!(blocks.len(), 1);
        assert!(matches!(blocks[0], AnthropicContentBlock::Text { .. }));
        assert_eq!(wire.max_tokens, Some(DEFAULT_MAX_TOKENS));
    }

    #[test]
    fn consecutive_tool_results_merge_into_one_user_turn() {
        let mut assistant = Message::new(Role::Assistant, Content::default());
        assistant.tool_calls = Some(vec![
            ToolUse {
                id: "a".to_owned(),
                name: "f".to_owned(),
                input: json!({}),
            },
            ToolUse {
                id: "b".to_owned(),
                name: "f".to_owned(),
                input: json!({}),
            },
        ]);

        let req = CompletionRequest {
            model: "m".to_owned(),
            system: Some("sys".to_owned()),
            messages: vec![
                Message::new(Role::System, Content::Text("more".to_owned())),
                Message::user("go"),
                assistant,
                Message::tool_result("a", Content::Text("1".to_owned())),
                Message::tool_result("b", Content::Text("2".to_owned())),
            ],
            ..Default::default()
        };

        let wire = to_anthropic_request(&req, "claude");
        assert_eq!(wire.messages.len(), 3);
        assert_eq!(wire.messages[2].role, "user");
        let AnthropicContent::Blocks(blocks) = &wire.messages[2].content else {
            panic!("expected blocks");
        };
        assert_eq!(blocks.len(), 2);
        assert!(matches!(wire.system, Some(AnthropicSystem::Text(ref s)) if s == "sys\n\nmore"));
    }

    #[test]
    fn thinking_stream_decodes_with_signature() {
        let mut decoder = AnthropicDecoder::new();
        let frames = [
            r#"{"type":"message_start","message":{"id":"msg_1","type":"message","role":"assistant","model":"claude","content":[],"usage":{"input_tokens":5,"output_tokens":1}}}"#,
            r#"{"type":"content_block_start","index":0,"content_block":{"type":"thinking","thinking":""}}"#,
            r#"{"type":"content_block_delta","index":0,"delta":{"type":"thinking_delta","thinking":"hmm"}}"#,
            r#"{"type":"content_block_delta","index":0,"delta":{"type":"signature_delta","signature":"sig"}}"#,
            r#"{"type":"content_block_stop","index":0}"#,
            r#"{"type":"content_block_start","index":1,"content_block":{"type":"text","text":""}}"#,
            r#"{"type":"content_block_delta","index":1,"delta":{"type":"text_delta","text":"Hi"}}"#,
            r#"{"type":"content_block_stop","index":1}"#,
            r#"{"type":"message_delta","delta":{"stop_reason":"end_turn"},"usage":{"output_tokens":7}}"#,
            r#"{"type":"message_stop"}"#,
        ];

        let events: Vec<StreamEvent> = frames.iter().flat_map(|f| decoder.decode("", f)).collect();

        assert!(decoder.is_finished());
        assert!(events.contains(&StreamEvent::ContentBlockDelta {
            index: 0,
            delta: BlockDelta::SignatureDelta {
                signature: "sig".to_owned()
            },
        }));
        assert!(events.contains(&StreamEvent::MessageDelta {
            stop_reason: Some(StopReason::EndTurn),
            usage: Usage {
                input_tokens: Some(5),
                output_tokens: Some(7),
                ..Default::default()
            },
        }));
        assert_eq!(
            events.iter().filter(|e| matches!(e, StreamEvent::ContentBlockStop { .. })).count(),
            2
        );
    }

    #[test]
    fn refusal_maps_to_content_filter() {
        assert_eq!(stop_reason_from_anthropic("refusal"), Some(StopReason::ContentFilter));
        assert_eq!(stop_reason_to_anthropic(StopReason::ContentFilter), "refusal");
    }
}
