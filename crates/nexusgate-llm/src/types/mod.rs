//! Canonical types for LLM request/response representation
//!
//! These types are protocol-agnostic and serve as the normalized internal
//! representation that every wire format converts to and from.

pub mod message;
pub mod request;
pub mod response;
pub mod stream;
pub mod tool;

pub use message::{Content, ContentBlock, ImageSource, Message, Role, ToolResultRef, ToolUse};
pub use request::{CompletionRequest, SamplingParams};
pub use response::{CompletionResponse, StopReason, Usage, unix_now};
pub use stream::{BlockDelta, StreamEvent};
pub use tool::{ToolChoice, ToolDefinition, safe_parse_tool_args};
