use http::StatusCode;
use nexusgate_core::HttpError;
use thiserror::Error;

use crate::failover::TransportError;

/// Maximum number of body characters kept in parse errors
pub const PREVIEW_CHARS: usize = 200;

/// Errors that can occur while serving a request
#[derive(Debug, Error)]
pub enum LlmError {
    /// No candidate serves the requested model
    #[error("model not found: {model}")]
    ModelNotFound { model: String },

    /// No adapter is registered under the given key
    #[error("unknown {kind}: {name}")]
    UnknownAdapter { kind: &'static str, name: String },

    /// Client sent a request that cannot be coerced into the canonical shape
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Upstream body did not match the protocol's schema
    #[error("failed to parse {format} response: {message} (body: {preview})")]
    Parse {
        /// Wire format the body was decoded as
        format: String,
        /// Decoder error
        message: String,
        /// Bounded prefix of the raw body
        preview: String,
    },

    /// Network failure or timeout talking to the upstream
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Every candidate and retry failed
    #[error("all upstream attempts failed after {attempts} attempt(s): {summary}")]
    FailoverExhausted { attempts: u32, summary: String },

    /// Failure after a stream has started flowing
    #[error("streaming error: {0}")]
    Streaming(String),

    /// Upstream closed the stream without sending anything decodable
    #[error("no chunk received from upstream")]
    NoChunkReceived,

    /// Unexpected internal error
    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl LlmError {
    /// Build a parse error with a bounded preview of `body`
    pub fn parse(format: impl Into<String>, message: impl std::fmt::Display, body: &str) -> Self {
        Self::Parse {
            format: format.into(),
            message: message.to_string(),
            preview: body_preview(body),
        }
    }
}

/// First [`PREVIEW_CHARS`] characters of `body`, with an ellipsis when cut
pub fn body_preview(body: &str) -> String {
    let mut chars = body.char_indices();
    match chars.nth(PREVIEW_CHARS) {
        Some((cut, _)) => format!("{}...", &body[..cut]),
        None => body.to_owned(),
    }
}

impl HttpError for LlmError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::ModelNotFound { .. } => StatusCode::NOT_FOUND,
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::Parse { .. }
            | Self::Transport(_)
            | Self::FailoverExhausted { .. }
            | Self::Streaming(_)
            | Self::NoChunkReceived => StatusCode::BAD_GATEWAY,
            Self::UnknownAdapter { .. } | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_type(&self) -> &str {
        match self {
            Self::ModelNotFound { .. } => "not_found_error",
            Self::InvalidRequest(_) => "invalid_request_error",
            Self::Parse { .. } | Self::Transport(_) | Self::FailoverExhausted { .. } => "upstream_error",
            Self::Streaming(_) | Self::NoChunkReceived => "streaming_error",
            Self::UnknownAdapter { .. } | Self::Internal(_) => "internal_error",
        }
    }

    fn client_message(&self) -> String {
        match self {
            Self::FailoverExhausted { .. } | Self::Transport(_) | Self::Parse { .. } => {
                "upstream providers are currently unavailable".to_owned()
            }
            Self::UnknownAdapter { .. } | Self::Internal(_) => "an internal error occurred".to_owned(),
            other => other.to_string(),
        }
    }
}
