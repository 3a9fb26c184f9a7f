use serde::{Deserialize, Serialize};

use super::message::ContentBlock;
use super::response::{CompletionResponse, StopReason, Usage};

/// Canonical streaming event
///
/// Every decoded upstream stream is normalized into this sequence:
/// `MessageStart`, then for each block `ContentBlockStart`, deltas and
/// `ContentBlockStop`, then one `MessageDelta` and `MessageStop`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Stream opened; `message` carries id and model with empty content
    MessageStart {
        /// Response skeleton
        message: CompletionResponse,
    },
    /// A new content block begins at `index`
    ContentBlockStart {
        /// Canonical block index
        index: u32,
        /// Block header; text and arguments arrive through deltas
        content_block: ContentBlock,
    },
    /// Incremental content for the block at `index`
    ContentBlockDelta {
        /// Canonical block index
        index: u32,
        /// Fragment
        delta: BlockDelta,
    },
    /// The block at `index` is complete
    ContentBlockStop {
        /// Canonical block index
        index: u32,
    },
    /// Final message-level metadata
    MessageDelta {
        /// Why generation ended
        #[serde(default, skip_serializing_if = "Option::is_none")]
        stop_reason: Option<StopReason>,
        /// Token accounting
        #[serde(default)]
        usage: Usage,
    },
    /// End of stream
    MessageStop,
    /// Upstream reported an error mid-stream
    Error {
        /// Error category
        error_type: String,
        /// Human-readable message
        message: String,
    },
}

impl StreamEvent {
    /// Canonical block index the event refers to, if any
    pub const fn index(&self) -> Option<u32> {
        match self {
            Self::ContentBlockStart { index, .. } | Self::ContentBlockDelta { index, .. } | Self::ContentBlockStop { index } => {
                Some(*index)
            }
            _ => None,
        }
    }
}

/// Fragment of a content block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BlockDelta {
    /// Text fragment
    TextDelta {
        /// Appended text
        text: String,
    },
    /// Reasoning fragment
    ThinkingDelta {
        /// Appended reasoning
        thinking: String,
    },
    /// Reasoning signature
    SignatureDelta {
        /// Signature value
        signature: String,
    },
    /// Tool argument fragment
    InputJsonDelta {
        /// Appended JSON text
        partial_json: String,
    },
}
