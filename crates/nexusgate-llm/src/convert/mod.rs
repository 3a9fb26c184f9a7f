//! Bidirectional conversion between canonical types and wire formats
//!
//! Each submodule handles one protocol: request and response mapping in both
//! directions plus an incremental decoder for the protocol's event stream.

pub mod anthropic;
mod builder;
pub mod openai;
pub mod responses;

pub use builder::{BlockKey, StreamBuilder};

use crate::types::StreamEvent;

/// Incremental decoder turning upstream SSE frames into canonical events
///
/// One decoder instance belongs to exactly one stream.
pub trait ChunkDecoder: Send {
    /// Decode one frame; `event` is the SSE event name (empty when absent)
    fn decode(&mut self, event: &str, data: &str) -> Vec<StreamEvent>;

    /// Close the stream after transport EOF without an explicit terminal frame
    fn finish(&mut self) -> Vec<StreamEvent>;

    /// Whether `message_stop` has been emitted
    fn is_finished(&self) -> bool;
}

/// Identity of a tool call whose id was never sent
pub(crate) fn synthetic_call_id() -> String {
    format!("call_{}", uuid::Uuid::new_v4().simple())
}
