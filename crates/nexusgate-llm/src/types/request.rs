use http::HeaderMap;
use serde::{Deserialize, Serialize};

use super::message::Message;
use super::tool::{ToolChoice, ToolDefinition};

/// Sampling parameters shared by every protocol
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SamplingParams {
    /// Maximum tokens to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Sampling temperature
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    /// Nucleus sampling
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    /// Top-k sampling
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,
}

/// Format-independent completion request
///
/// System-role messages stay in `messages`; `system` holds top-level
/// instructions from formats that carry them separately. Upstream builders
/// fold both into whatever their protocol expects.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// Requested model
    pub model: String,
    /// Conversation history
    pub messages: Vec<Message>,
    /// Top-level system instructions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    /// Sampling parameters
    #[serde(default)]
    pub params: SamplingParams,
    /// Whether the client asked for streaming
    #[serde(default)]
    pub stream: bool,
    /// Tools the model may call
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,
    /// How the model should pick tools
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<ToolChoice>,
    /// Sequences that end generation
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stop_sequences: Vec<String>,
    /// Fields not recognized by the inbound format, passed through verbatim
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub extra_params: serde_json::Map<String, serde_json::Value>,
    /// Client headers selected for forwarding upstream
    #[serde(skip)]
    pub extra_headers: HeaderMap,
}

impl CompletionRequest {
    /// System instructions gathered from `system` and system-role messages
    ///
    /// Returns `None` if there are none.
    pub fn system_text(&self) -> Option<String> {
        let parts: Vec<String> = self
            .system
            .iter()
            .cloned()
            .chain(
                self.messages
                    .iter()
                    .filter(|m| m.role == super::Role::System)
                    .map(|m| m.content.as_text()),
            )
            .filter(|s| !s.is_empty())
            .collect();

        if parts.is_empty() { None } else { Some(parts.join("\n\n")) }
    }
}
