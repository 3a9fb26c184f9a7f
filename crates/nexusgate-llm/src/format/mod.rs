//! Client-facing wire formats
//!
//! A request adapter turns an inbound body into a [`CompletionRequest`]; the
//! matching response adapter renders canonical responses and stream events
//! back into that format. Adapters hold no per-request state and are shared by
//! every request; per-stream bookkeeping lives in [`StreamContext`].

pub mod anthropic;
pub mod openai_chat;
pub mod openai_responses;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::accumulate::StreamAccumulator;
use crate::error::LlmError;
use crate::types::{CompletionRequest, CompletionResponse, StreamEvent, unix_now};

/// Parses one inbound wire format into the canonical request
pub trait RequestAdapter: Send + Sync {
    /// Registry key of the format
    fn format(&self) -> &'static str;

    /// Coerce `body` into a canonical request
    ///
    /// Top-level fields the format does not model end up in `extra_params`.
    fn parse(&self, body: Value) -> Result<CompletionRequest, LlmError>;
}

/// Renders canonical output in one client wire format
pub trait ResponseAdapter: Send + Sync {
    /// Registry key of the format
    fn format(&self) -> &'static str;

    /// Complete (non-streamed) response body
    fn serialize(&self, response: &CompletionResponse) -> Value;

    /// Wire frames for one stream event, possibly empty
    ///
    /// `ctx` has already observed `event`.
    fn serialize_stream_chunk(&self, event: &StreamEvent, ctx: &mut StreamContext) -> String;

    /// In-band error frame for a stream that has already started
    fn serialize_error(&self, error_type: &str, message: &str) -> String;

    /// Frame that ends the stream; empty when the format has none
    fn terminal_marker(&self) -> &'static str;
}

/// Per-stream bookkeeping owned by the caller driving a response adapter
#[derive(Debug)]
pub struct StreamContext {
    id: String,
    model: String,
    created: u64,
    accumulator: StreamAccumulator,
    sequence: u64,
}

impl StreamContext {
    /// Context for a stream serving `model`
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            id: format!("msg_{}", uuid::Uuid::new_v4().simple()),
            model: model.into(),
            created: unix_now(),
            accumulator: StreamAccumulator::new(),
            sequence: 0,
        }
    }

    /// Record `event` before it is serialized
    pub fn observe(&mut self, event: &StreamEvent) {
        if let StreamEvent::MessageStart { message } = event {
            if !message.id.is_empty() {
                self.id.clone_from(&message.id);
            }
            if !message.model.is_empty() {
                self.model.clone_from(&message.model);
            }
            if let Some(created) = message.created {
                self.created = created;
            }
        }

        self.accumulator.observe(event);
    }

    /// Next value of the per-stream sequence counter, starting at 0
    pub const fn next_sequence(&mut self) -> u64 {
        let sequence = self.sequence;
        self.sequence += 1;
        sequence
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub const fn created(&self) -> u64 {
        self.created
    }

    pub const fn accumulator(&self) -> &StreamAccumulator {
        &self.accumulator
    }

    /// Take the accumulated state once the stream is done
    pub fn into_accumulator(self) -> StreamAccumulator {
        self.accumulator
    }
}

/// Split `body` into the fields listed in `known` and everything else
pub(crate) fn split_known_fields(body: Value, known: &[&str]) -> Result<(Value, Map<String, Value>), LlmError> {
    let Value::Object(map) = body else {
        return Err(LlmError::InvalidRequest("request body must be a JSON object".to_owned()));
    };

    let (known_fields, extra): (Map<String, Value>, Map<String, Value>) =
        map.into_iter().partition(|(key, _)| known.contains(&key.as_str()));

    Ok((Value::Object(known_fields), extra))
}

/// Deserialize the known part of a request body
pub(crate) fn from_known<T: serde::de::DeserializeOwned>(known: Value) -> Result<T, LlmError> {
    serde_json::from_value(known).map_err(|e| LlmError::InvalidRequest(e.to_string()))
}

/// Serialize a wire object, falling back to `null` on failure
pub(crate) fn to_json(value: &impl Serialize) -> Value {
    serde_json::to_value(value).unwrap_or_else(|e| {
        tracing::error!(error = %e, "failed to serialize wire object");
        Value::Null
    })
}

/// Unnamed SSE frame
pub(crate) fn data_frame(payload: &Value) -> String {
    format!("data: {payload}\n\n")
}

/// Named SSE frame
pub(crate) fn event_frame(event: &str, payload: &Value) -> String {
    format!("event: {event}\ndata: {payload}\n\n")
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::types::Usage;

    #[test]
    fn unknown_fields_are_split_off() {
        let body = json!({"model": "m", "messages": [], "seed": 7, "user": "u1"});
        let (known, extra) = split_known_fields(body, &["model", "messages"]).unwrap();

        assert_eq!(known, json!({"model": "m", "messages": []}));
        assert_eq!(extra.get("seed"), Some(&json!(7)));
        assert_eq!(extra.len(), 2);
    }

    #[test]
    fn non_object_body_is_invalid() {
        let err = split_known_fields(json!([1, 2]), &[]).unwrap_err();
        assert!(matches!(err, LlmError::InvalidRequest(_)));
    }

    #[test]
    fn context_adopts_upstream_identity() {
        let mut ctx = StreamContext::new("alias");
        ctx.observe(&StreamEvent::MessageStart {
            message: CompletionResponse {
                id: "resp_9".to_owned(),
                model: "gpt-4o".to_owned(),
                content: Vec::new(),
                stop_reason: None,
                usage: Usage::default(),
                created: Some(42),
            },
        });

        assert_eq!(ctx.id(), "resp_9");
        assert_eq!(ctx.model(), "gpt-4o");
        assert_eq!(ctx.created(), 42);
        assert_eq!(ctx.next_sequence(), 0);
        assert_eq!(ctx.next_sequence(), 1);
        assert_eq!(ctx.accumulator().event_count(), 1);
    }
}
