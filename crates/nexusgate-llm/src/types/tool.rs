use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Tool the model may call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Tool name
    pub name: String,
    /// What the tool does
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// JSON schema for the arguments
    pub input_schema: Value,
}

/// How the model should choose tools
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolChoice {
    /// Model decides
    Auto,
    /// Model must call some tool
    Any,
    /// Model must not call tools
    None,
    /// Model must call the named tool
    Tool {
        /// Tool name
        name: String,
    },
}

/// Parse streamed tool arguments leniently
///
/// Anything that is not a JSON object, including truncated input, yields an
/// empty object.
pub fn safe_parse_tool_args(raw: &str) -> Value {
    match serde_json::from_str::<Value>(raw) {
        Ok(value @ Value::Object(_)) => value,
        _ => Value::Object(serde_json::Map::new()),
    }
}
