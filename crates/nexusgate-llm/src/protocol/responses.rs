//! `OpenAI` Responses API wire format types

use serde::{Deserialize, Serialize};

// -- Request types --

/// Responses API request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResponsesRequest {
    /// Model identifier
    pub model: String,
    /// Conversation input
    pub input: ResponsesInput,
    /// System-level instructions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    /// Maximum tokens to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
    /// Sampling temperature
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    /// Nucleus sampling threshold
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    /// Whether to stream the response
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
    /// Tool definitions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ResponsesTool>>,
    /// Tool choice configuration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<serde_json::Value>,
}

/// Input is a single string or a list of items
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResponsesInput {
    /// One user message
    Text(String),
    /// Conversation items
    Items(Vec<ResponsesInputItem>),
}

impl Default for ResponsesInput {
    fn default() -> Self {
        Self::Items(Vec::new())
    }
}

/// One item of conversation input
///
/// Message items may omit `type`; the request adapter fills it in before
/// deserializing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponsesInputItem {
    /// Chat message
    Message {
        /// Author role (`user`, `assistant`, `system`, `developer`)
        role: String,
        /// Message content
        content: ResponsesMessageContent,
    },
    /// Tool call previously made by the model
    FunctionCall {
        /// Call identifier answered by a later `function_call_output`
        call_id: String,
        /// Function name
        name: String,
        /// JSON-encoded arguments
        #[serde(default)]
        arguments: String,
    },
    /// Result of a tool call
    FunctionCallOutput {
        /// Call being answered
        call_id: String,
        /// Tool output
        output: String,
    },
    /// Item kinds the gateway does not model (reasoning replay, web search)
    #[serde(other)]
    Unsupported,
}

/// Message content as a string or a list of parts
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResponsesMessageContent {
    /// Plain text
    Text(String),
    /// Typed parts
    Parts(Vec<ResponsesContentPart>),
}

/// One typed content part
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponsesContentPart {
    /// Text supplied by the user or system
    InputText {
        /// Text
        text: String,
    },
    /// Text previously produced by the model
    OutputText {
        /// Text
        text: String,
        /// Citations and file references
        #[serde(default)]
        annotations: Vec<serde_json::Value>,
    },
    /// Image
    InputImage {
        /// Image URL or data URI
        #[serde(default, skip_serializing_if = "Option::is_none")]
        image_url: Option<String>,
    },
    /// Refusal text
    Refusal {
        /// Refusal message
        refusal: String,
    },
    /// Part kinds the gateway does not model
    #[serde(other)]
    Unsupported,
}

/// Tool definition
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponsesTool {
    /// Function tool
    Function {
        /// Function name
        name: String,
        /// What the function does
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
        /// JSON schema for the arguments
        #[serde(default, skip_serializing_if = "Option::is_none")]
        parameters: Option<serde_json::Value>,
    },
    /// Hosted tools the gateway cannot forward across protocols
    #[serde(other)]
    Unsupported,
}

// -- Response types --

/// Responses API response object
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponsesResponse {
    /// Response identifier
    #[serde(default)]
    pub id: String,
    /// Object type (always "response")
    #[serde(default = "response_object")]
    pub object: String,
    /// Creation timestamp
    #[serde(default)]
    pub created_at: u64,
    /// Model used
    #[serde(default)]
    pub model: String,
    /// `completed`, `incomplete`, `in_progress` or `failed`
    #[serde(default)]
    pub status: String,
    /// Output items
    #[serde(default)]
    pub output: Vec<ResponsesOutputItem>,
    /// Why the response is incomplete
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub incomplete_details: Option<ResponsesIncompleteDetails>,
    /// Failure details
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ResponsesError>,
    /// Token usage
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<ResponsesUsage>,
}

fn response_object() -> String {
    "response".to_owned()
}

/// Reason an output was cut short
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponsesIncompleteDetails {
    /// `max_output_tokens` or `content_filter`
    pub reason: String,
}

/// Error attached to a failed response or emitted as an event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponsesError {
    /// Error code
    #[serde(default)]
    pub code: Option<String>,
    /// Error message
    #[serde(default)]
    pub message: String,
}

/// Output item
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponsesOutputItem {
    /// Assistant message
    Message {
        /// Item identifier
        #[serde(default)]
        id: String,
        /// Role (always "assistant")
        #[serde(default = "assistant_role")]
        role: String,
        /// Item status
        #[serde(default, skip_serializing_if = "Option::is_none")]
        status: Option<String>,
        /// Content parts
        #[serde(default)]
        content: Vec<ResponsesContentPart>,
    },
    /// Reasoning summary
    Reasoning {
        /// Item identifier
        #[serde(default)]
        id: String,
        /// Summary parts
        #[serde(default)]
        summary: Vec<ResponsesSummaryPart>,
    },
    /// Tool call
    FunctionCall {
        /// Item identifier
        #[serde(default)]
        id: String,
        /// Call identifier
        call_id: String,
        /// Function name
        name: String,
        /// JSON-encoded arguments
        #[serde(default)]
        arguments: String,
        /// Item status
        #[serde(default, skip_serializing_if = "Option::is_none")]
        status: Option<String>,
    },
    /// Item kinds the gateway does not model
    #[serde(other)]
    Unsupported,
}

fn assistant_role() -> String {
    "assistant".to_owned()
}

/// One reasoning summary part
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponsesSummaryPart {
    /// Summary text
    SummaryText {
        /// Text
        text: String,
    },
}

/// Token usage
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResponsesUsage {
    /// Input tokens
    #[serde(default)]
    pub input_tokens: Option<u32>,
    /// Output tokens
    #[serde(default)]
    pub output_tokens: Option<u32>,
    /// Total tokens
    #[serde(default)]
    pub total_tokens: Option<u32>,
    /// Input token breakdown
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_tokens_details: Option<ResponsesInputTokensDetails>,
}

/// Input token breakdown
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResponsesInputTokensDetails {
    /// Tokens served from the prompt cache
    #[serde(default)]
    pub cached_tokens: Option<u32>,
}

// -- Streaming types --

/// Named streaming events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ResponsesStreamEvent {
    /// Response object created
    #[serde(rename = "response.created")]
    Created {
        /// Skeleton response
        response: ResponsesResponse,
    },
    /// Generation started
    #[serde(rename = "response.in_progress")]
    InProgress {
        /// Skeleton response
        response: ResponsesResponse,
    },
    /// New output item
    #[serde(rename = "response.output_item.added")]
    OutputItemAdded {
        /// Position in `output`
        output_index: u32,
        /// Item header
        item: ResponsesOutputItem,
    },
    /// Output item finished
    #[serde(rename = "response.output_item.done")]
    OutputItemDone {
        /// Position in `output`
        output_index: u32,
        /// Complete item
        item: ResponsesOutputItem,
    },
    /// New content part inside a message item
    #[serde(rename = "response.content_part.added")]
    ContentPartAdded {
        /// Owning item
        item_id: String,
        /// Position in `output`
        output_index: u32,
        /// Position in the item's `content`
        content_index: u32,
        /// Part header
        part: ResponsesContentPart,
    },
    /// Content part finished
    #[serde(rename = "response.content_part.done")]
    ContentPartDone {
        /// Owning item
        item_id: String,
        /// Position in `output`
        output_index: u32,
        /// Position in the item's `content`
        content_index: u32,
        /// Complete part
        part: ResponsesContentPart,
    },
    /// Text fragment
    #[serde(rename = "response.output_text.delta")]
    OutputTextDelta {
        /// Owning item
        item_id: String,
        /// Position in `output`
        output_index: u32,
        /// Position in the item's `content`
        content_index: u32,
        /// Appended text
        delta: String,
    },
    /// Text part finished
    #[serde(rename = "response.output_text.done")]
    OutputTextDone {
        /// Owning item
        item_id: String,
        /// Position in `output`
        output_index: u32,
        /// Position in the item's `content`
        content_index: u32,
        /// Complete text
        text: String,
    },
    /// Reasoning summary fragment
    #[serde(rename = "response.reasoning_summary_text.delta")]
    ReasoningSummaryTextDelta {
        /// Owning item
        item_id: String,
        /// Position in `output`
        output_index: u32,
        /// Position in the item's `summary`
        #[serde(default)]
        summary_index: u32,
        /// Appended text
        delta: String,
    },
    /// Reasoning summary finished
    #[serde(rename = "response.reasoning_summary_text.done")]
    ReasoningSummaryTextDone {
        /// Owning item
        item_id: String,
        /// Position in `output`
        output_index: u32,
        /// Position in the item's `summary`
        #[serde(default)]
        summary_index: u32,
        /// Complete text
        text: String,
    },
    /// Raw reasoning fragment (open-weight models)
    #[serde(rename = "response.reasoning_text.delta")]
    ReasoningTextDelta {
        /// Owning item
        item_id: String,
        /// Position in `output`
        output_index: u32,
        /// Appended text
        delta: String,
    },
    /// Tool argument fragment
    #[serde(rename = "response.function_call_arguments.delta")]
    FunctionCallArgumentsDelta {
        /// Owning item
        item_id: String,
        /// Position in `output`
        output_index: u32,
        /// Appended JSON text
        delta: String,
    },
    /// Tool arguments finished
    #[serde(rename = "response.function_call_arguments.done")]
    FunctionCallArgumentsDone {
        /// Owning item
        item_id: String,
        /// Position in `output`
        output_index: u32,
        /// Complete JSON text
        arguments: String,
    },
    /// Generation finished
    #[serde(rename = "response.completed")]
    Completed {
        /// Final response
        response: ResponsesResponse,
    },
    /// Generation stopped early
    #[serde(rename = "response.incomplete")]
    Incomplete {
        /// Final response
        response: ResponsesResponse,
    },
    /// Generation failed
    #[serde(rename = "response.failed")]
    Failed {
        /// Final response with `error`
        response: ResponsesResponse,
    },
    /// Stream-level error
    #[serde(rename = "error")]
    Error {
        /// Error code
        #[serde(default)]
        code: Option<String>,
        /// Error message
        message: String,
    },
    /// Event types the gateway does not model
    #[serde(other)]
    Unsupported,
}

impl ResponsesStreamEvent {
    /// SSE event name for this payload
    pub const fn event_name(&self) -> &'static str {
        match self {
            Self::Created { .. } => "response.created",
            Self::InProgress { .. } => "response.in_progress",
            Self::OutputItemAdded { .. } => "response.output_item.added",
            Self::OutputItemDone { .. } => "response.output_item.done",
            Self::ContentPartAdded { .. } => "response.content_part.added",
            Self::ContentPartDone { .. } => "response.content_part.done",
            Self::OutputTextDelta { .. } => "response.output_text.delta",
            Self::OutputTextDone { .. } => "response.output_text.done",
            Self::ReasoningSummaryTextDelta { .. } => "response.reasoning_summary_text.delta",
            Self::ReasoningSummaryTextDone { .. } => "response.reasoning_summary_text.done",
            Self::ReasoningTextDelta { .. } => "response.reasoning_text.delta",
            Self::FunctionCallArgumentsDelta { .. } => "response.function_call_arguments.delta",
            Self::FunctionCallArgumentsDone { .. } => "response.function_call_arguments.done",
            Self::Completed { .. } => "response.completed",
            Self::Incomplete { .. } => "response.incomplete",
            Self::Failed { .. } => "response.failed",
            Self::Error { .. } => "error",
            Self::Unsupported => "unknown",
        }
    }
}
