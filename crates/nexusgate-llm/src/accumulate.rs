//! Fold canonical stream events back into a complete response

use std::collections::{BTreeMap, HashMap};

use crate::types::{
    BlockDelta, CompletionResponse, ContentBlock, StopReason, StreamEvent, ToolUse, Usage, safe_parse_tool_args,
};

/// A content block as seen so far
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccumulatedBlock {
    /// Text block
    Text { text: String },
    /// Reasoning block
    Thinking { thinking: String, signature: Option<String> },
    /// Tool call with its raw argument text
    ToolUse { id: String, name: String, arguments: String },
}

impl AccumulatedBlock {
    fn from_header(block: &ContentBlock) -> Option<Self> {
        match block {
            ContentBlock::Text { text } => Some(Self::Text { text: text.clone() }),
            ContentBlock::Thinking { thinking, signature } => Some(Self::Thinking {
                thinking: thinking.clone(),
                signature: signature.clone(),
            }),
            ContentBlock::ToolUse(tool) => Some(Self::ToolUse {
                id: tool.id.clone(),
                name: tool.name.clone(),
                arguments: match tool.input.as_object() {
                    Some(map) if map.is_empty() => String::new(),
                    _ => tool.input.to_string(),
                },
            }),
            ContentBlock::ToolResult { .. } | ContentBlock::Image { .. } => None,
        }
    }

    fn from_delta(delta: &BlockDelta) -> Self {
        match delta {
            BlockDelta::TextDelta { .. } => Self::Text { text: String::new() },
            BlockDelta::ThinkingDelta { .. } | BlockDelta::SignatureDelta { .. } => Self::Thinking {
                thinking: String::new(),
                signature: None,
            },
            BlockDelta::InputJsonDelta { .. } => Self::ToolUse {
                id: String::new(),
                name: String::new(),
                arguments: String::new(),
            },
        }
    }

    fn apply(&mut self, delta: &BlockDelta) {
        match (self, delta) {
            (Self::Text { text }, BlockDelta::TextDelta { text: more }) => text.push_str(more),
            (Self::Thinking { thinking, .. }, BlockDelta::ThinkingDelta { thinking: more }) => thinking.push_str(more),
            (Self::Thinking { signature, .. }, BlockDelta::SignatureDelta { signature: more }) => {
                signature.get_or_insert_with(String::new).push_str(more);
            }
            (Self::ToolUse { arguments, .. }, BlockDelta::InputJsonDelta { partial_json }) => {
                arguments.push_str(partial_json);
            }
            (block, delta) => {
                tracing::debug!(?block, ?delta, "ignoring delta that does not match its block");
            }
        }
    }

    /// Canonical block; tool arguments are parsed leniently
    pub fn to_content_block(&self) -> ContentBlock {
        match self {
            Self::Text { text } => ContentBlock::Text { text: text.clone() },
            Self::Thinking { thinking, signature } => ContentBlock::Thinking {
                thinking: thinking.clone(),
                signature: signature.clone(),
            },
            Self::ToolUse { id, name, arguments } => ContentBlock::ToolUse(ToolUse {
                id: id.clone(),
                name: name.clone(),
                input: safe_parse_tool_args(arguments),
            }),
        }
    }
}

/// Running view of one canonical event stream
///
/// Owned by whoever consumes the stream; feed it every event in order.
#[derive(Debug, Default)]
pub struct StreamAccumulator {
    id: String,
    model: String,
    created: Option<u64>,
    blocks: BTreeMap<u32, AccumulatedBlock>,
    tool_ordinals: HashMap<u32, u32>,
    stop_reason: Option<StopReason>,
    usage: Usage,
    events: usize,
    finished: bool,
}

impl StreamAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one event into the running state
    pub fn observe(&mut self, event: &StreamEvent) {
        self.events += 1;

        match event {
            StreamEvent::MessageStart { message } => {
                if self.id.is_empty() {
                    self.id.clone_from(&message.id);
                }
                if self.model.is_empty() {
                    self.model.clone_from(&message.model);
                }
                self.created = self.created.or(message.created);
                self.usage.merge(&message.usage);
            }
            StreamEvent::ContentBlockStart { index, content_block } => {
                if let Some(block) = AccumulatedBlock::from_header(content_block) {
                    if matches!(block, AccumulatedBlock::ToolUse { .. }) {
                        let ordinal = u32::try_from(self.tool_ordinals.len()).unwrap_or(u32::MAX);
                        self.tool_ordinals.entry(*index).or_insert(ordinal);
                    }
                    self.blocks.insert(*index, block);
                }
            }
            StreamEvent::ContentBlockDelta { index, delta } => {
                self.blocks
                    .entry(*index)
                    .or_insert_with(|| AccumulatedBlock::from_delta(delta))
                    .apply(delta);
            }
            StreamEvent::MessageDelta { stop_reason, usage } => {
                if stop_reason.is_some() {
                    self.stop_reason = *stop_reason;
                }
                self.usage.merge(usage);
            }
            StreamEvent::MessageStop => self.finished = true,
            StreamEvent::ContentBlockStop { .. } | StreamEvent::Error { .. } => {}
        }
    }

    /// Response assembled from everything observed so far
    pub fn snapshot(&self) -> CompletionResponse {
        CompletionResponse {
            id: self.id.clone(),
            model: self.model.clone(),
            content: self.blocks.values().map(AccumulatedBlock::to_content_block).collect(),
            stop_reason: self.stop_reason,
            usage: self.usage,
            created: self.created,
        }
    }

    /// Block at canonical `index`
    pub fn block(&self, index: u32) -> Option<&AccumulatedBlock> {
        self.blocks.get(&index)
    }

    /// Zero-based position of the tool call at canonical `index` among all tool calls
    pub fn tool_ordinal(&self, index: u32) -> Option<u32> {
        self.tool_ordinals.get(&index).copied()
    }

    /// Number of events observed
    pub const fn event_count(&self) -> usize {
        self.events
    }

    /// Concatenated text of all text blocks
    pub fn text(&self) -> String {
        self.blocks
            .values()
            .filter_map(|b| match b {
                AccumulatedBlock::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Concatenated reasoning of all thinking blocks
    pub fn thinking(&self) -> String {
        self.blocks
            .values()
            .filter_map(|b| match b {
                AccumulatedBlock::Thinking { thinking, .. } => Some(thinking.as_str()),
                _ => None,
            })
            .collect()
    }

    pub const fn usage(&self) -> Usage {
        self.usage
    }

    pub const fn stop_reason(&self) -> Option<StopReason> {
        self.stop_reason
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Whether `message_stop` was observed
    pub const fn is_finished(&self) -> bool {
        self.finished
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn start() -> StreamEvent {
        StreamEvent::MessageStart {
            message: CompletionResponse {
                id: "msg_1".to_owned(),
                model: "claude".to_owned(),
                content: Vec::new(),
                stop_reason: None,
                usage: Usage {
                    input_tokens: Some(12),
                    ..Default::default()
                },
                created: Some(7),
            },
        }
    }

    #[test]
    fn folds_text_and_tool_call() {
        let mut acc = StreamAccumulator::new();
        let events = [
            start(),
            StreamEvent::ContentBlockStart {
                index: 0,
                content_block: ContentBlock::Text { text: String::new() },
            },
            StreamEvent::ContentBlockDelta {
                index: 0,
                delta: BlockDelta::TextDelta { text: "Hel".to_owned() },
            },
            StreamEvent::ContentBlockDelta {
                index: 0,
                delta: BlockDelta::TextDelta { text: "lo".to_owned() },
            },
            StreamEvent::ContentBlockStop { index: 0 },
            StreamEvent::ContentBlockStart {
                index: 1,
                content_block: ContentBlock::ToolUse(ToolUse {
                    id: "call_1".to_owned(),
                    name: "lookup".to_owned(),
                    input: json!({}),
                }),
            },
            StreamEvent::ContentBlockDelta {
                index: 1,
                delta: BlockDelta::InputJsonDelta {
                    partial_json: "{\"q\":".to_owned(),
                },
            },
            StreamEvent::ContentBlockDelta {
                index: 1,
                delta: BlockDelta::InputJsonDelta {
                    partial_json: "\"rust\"}".to_owned(),
                },
            },
            StreamEvent::ContentBlockStop { index: 1 },
            StreamEvent::MessageDelta {
                stop_reason: Some(StopReason::ToolUse),
                usage: Usage {
                    output_tokens: Some(5),
                    ..Default::default()
                },
            },
            StreamEvent::MessageStop,
        ];

        for event in &events {
            acc.observe(event);
        }

        let resp = acc.snapshot();
        assert_eq!(resp.id, "msg_1");
        assert_eq!(resp.text(), "Hello");
        assert_eq!(
            resp.content[1],
            ContentBlock::ToolUse(ToolUse {
                id: "call_1".to_owned(),
                name: "lookup".to_owned(),
                input: json!({"q": "rust"}),
            })
        );
        assert_eq!(resp.usage.total(), Some(17));
        assert_eq!(acc.tool_ordinal(1), Some(0));
        assert_eq!(acc.event_count(), events.len());
        assert!(acc.is_finished());
    }

    #[test]
    fn truncated_arguments_become_empty_object() {
        let mut acc = StreamAccumulator::new();
        acc.observe(&StreamEvent::ContentBlockDelta {
            index: 0,
            delta: BlockDelta::InputJsonDelta {
                partial_json: "{\"a\":".to_owned(),
            },
        });

        let resp = acc.snapshot();
        assert!(matches!(&resp.content[0], ContentBlock::ToolUse(t) if t.input == json!({})));
        assert!(!acc.is_finished());
    }

    #[test]
    fn unknown_usage_stays_unknown() {
        let mut acc = StreamAccumulator::new();
        acc.observe(&start());
        acc.observe(&StreamEvent::MessageDelta {
            stop_reason: None,
            usage: Usage::default(),
        });

        assert_eq!(acc.usage().input_tokens, Some(12));
        assert_eq!(acc.usage().output_tokens, None);
        assert_eq!(acc.usage().total(), None);
    }
}
