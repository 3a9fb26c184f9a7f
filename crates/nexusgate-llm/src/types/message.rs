use serde::{Deserialize, Serialize};

/// Role of a message participant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System instruction
    System,
    /// User message
    User,
    /// Assistant response
    Assistant,
    /// Tool result
    Tool,
}

/// Message in a conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Role of the message author
    pub role: Role,
    /// Message content
    pub content: Content,
    /// Tool invocation this message answers (role = tool)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// Tools invoked by this turn (role = assistant)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolUse>>,
}

impl Message {
    /// Message with the given role and content
    pub const fn new(role: Role, content: Content) -> Self {
        Self {
            role,
            content,
            tool_call_id: None,
            tool_calls: None,
        }
    }

    /// Plain-text user message
    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, Content::Text(text.into()))
    }

    /// Tool result answering `tool_call_id`
    pub fn tool_result(tool_call_id: impl Into<String>, content: Content) -> Self {
        Self {
            role: Role::Tool,
            content,
            tool_call_id: Some(tool_call_id.into()),
            tool_calls: None,
        }
    }

    /// Every tool invocation carried by this message
    ///
    /// Includes both `tool_calls` and `ToolUse` blocks inside the content.
    pub fn tool_uses(&self) -> Vec<&ToolUse> {
        let mut uses: Vec<&ToolUse> = self.tool_calls.iter().flatten().collect();
        if let Content::Blocks(blocks) = &self.content {
            uses.extend(blocks.iter().filter_map(|b| match b {
                ContentBlock::ToolUse(tool_use) => Some(tool_use),
                _ => None,
            }));
        }
        uses
    }

    /// Every tool result carried by this message
    ///
    /// A tool-role message with plain content yields one result; `ToolResult`
    /// blocks inside any message yield one each.
    pub fn tool_results(&self) -> Vec<ToolResultRef<'_>> {
        let mut results = Vec::new();

        match (&self.content, self.role, &self.tool_call_id) {
            (Content::Text(text), Role::Tool, Some(id)) => results.push(ToolResultRef {
                tool_use_id: id,
                content: text,
                is_error: None,
            }),
            (Content::Blocks(blocks), _, _) => {
                for block in blocks {
                    if let ContentBlock::ToolResult {
                        tool_use_id,
                        content,
                        is_error,
                    } = block
                    {
                        results.push(ToolResultRef {
                            tool_use_id,
                            content,
                            is_error: *is_error,
                        });
                    }
                }
                if results.is_empty()
                    && self.role == Role::Tool
                    && let Some(id) = &self.tool_call_id
                {
                    results.push(ToolResultRef {
                        tool_use_id: id,
                        content: "",
                        is_error: None,
                    });
                }
            }
            _ => {}
        }

        results
    }
}

/// Borrowed view of one tool result, whichever way it was encoded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToolResultRef<'a> {
    /// Invocation being answered
    pub tool_use_id: &'a str,
    /// Tool output
    pub content: &'a str,
    /// Whether the tool reported failure
    pub is_error: Option<bool>,
}

/// Message content, either plain text or structured blocks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Content {
    /// Plain text content
    Text(String),
    /// Ordered content blocks
    Blocks(Vec<ContentBlock>),
}

impl Default for Content {
    fn default() -> Self {
        Self::Text(String::new())
    }
}

impl Content {
    /// Collapse parsed blocks into the cheapest faithful representation
    ///
    /// Purely textual input becomes one concatenated string; anything else
    /// (an image, a tool block, reasoning) keeps the block list.
    pub fn from_blocks(blocks: Vec<ContentBlock>) -> Self {
        if blocks.iter().all(|b| matches!(b, ContentBlock::Text { .. })) {
            let text = blocks
                .into_iter()
                .filter_map(|b| match b {
                    ContentBlock::Text { text } => Some(text),
                    _ => None,
                })
                .collect::<String>();
            return Self::Text(text);
        }
        Self::Blocks(blocks)
    }

    /// Text content, joining text blocks if necessary
    pub fn as_text(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Blocks(blocks) => blocks
                .iter()
                .filter_map(|b| match b {
                    ContentBlock::Text { text } => Some(text.as_str()),
                    _ => None,
                })
                .collect(),
        }
    }

    /// Content as a block list
    pub fn to_blocks(&self) -> Vec<ContentBlock> {
        match self {
            Self::Text(text) if text.is_empty() => Vec::new(),
            Self::Text(text) => vec![ContentBlock::Text { text: text.clone() }],
            Self::Blocks(blocks) => blocks.clone(),
        }
    }

    /// Whether there is nothing to send
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Text(text) => text.is_empty(),
            Self::Blocks(blocks) => blocks.is_empty(),
        }
    }
}

/// One unit of structured content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    /// Text
    Text {
        /// The text string
        text: String,
    },
    /// Model reasoning, replayed upstream only together with its signature
    Thinking {
        /// Reasoning text
        thinking: String,
        /// Provider signature authenticating the reasoning
        #[serde(default, skip_serializing_if = "Option::is_none")]
        signature: Option<String>,
    },
    /// Tool invocation
    ToolUse(ToolUse),
    /// Result of a tool invocation
    ToolResult {
        /// Invocation being answered
        tool_use_id: String,
        /// Tool output
        content: String,
        /// Whether the tool reported failure
        #[serde(default, skip_serializing_if = "Option::is_none")]
        is_error: Option<bool>,
    },
    /// Image
    Image {
        /// Where the image bytes come from
        source: ImageSource,
    },
}

/// A tool invocation requested by the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolUse {
    /// Unique identifier for this invocation
    pub id: String,
    /// Tool name
    pub name: String,
    /// Arguments as a JSON object
    pub input: serde_json::Value,
}

/// Image payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ImageSource {
    /// Inline base64 data
    Base64 {
        /// MIME type, e.g. `image/png`
        media_type: String,
        /// Base64-encoded bytes
        data: String,
    },
    /// Remote image
    Url {
        /// Image URL
        url: String,
    },
}

impl ImageSource {
    /// Interpret a URL, unpacking `data:<mime>;base64,<data>` URIs
    pub fn from_url(url: &str) -> Self {
        if let Some(rest) = url.strip_prefix("data:")
            && let Some((meta, data)) = rest.split_once(',')
            && let Some(media_type) = meta.strip_suffix(";base64")
        {
            return Self::Base64 {
                media_type: media_type.to_owned(),
                data: data.to_owned(),
            };
        }
        Self::Url { url: url.to_owned() }
    }

    /// URL form, packing inline data into a `data:` URI
    pub fn to_url(&self) -> String {
        match self {
            Self::Base64 { media_type, data } => format!("data:{media_type};base64,{data}"),
            Self::Url { url } => url.clone(),
        }
    }
}
