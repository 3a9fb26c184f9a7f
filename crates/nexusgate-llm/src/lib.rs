//! Protocol adapters and failover engine for `NexusGate`
//!
//! Translates between client wire formats (`OpenAI` Chat, `OpenAI` Responses,
//! Anthropic Messages) and a canonical request/response/stream model, forwards
//! requests to weighted upstream candidates with retry and failover, and turns
//! upstream replies, including token streams, back into the client's format.

#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

pub mod accumulate;
pub mod candidate;
pub mod completion_log;
pub mod convert;
pub mod error;
pub mod failover;
pub mod format;
pub mod gateway;
pub mod protocol;
pub mod provider;
pub mod registry;
pub mod selector;
pub mod types;

pub use accumulate::StreamAccumulator;
pub use candidate::{Candidate, CandidateSource, ModelCatalog};
pub use completion_log::{ChannelSink, CompletionRecord, CompletionSink, CompletionStatus, TracingSink};
pub use error::LlmError;
pub use failover::{FailoverEngine, FailoverError, FailoverResult, HttpTransport, Transport, TransportError};
pub use format::{RequestAdapter, ResponseAdapter, StreamContext};
pub use gateway::{Gateway, GatewayReply, ReplyStream};
pub use provider::{EventStream, UpstreamAdapter, UpstreamRequest};
pub use registry::AdapterRegistry;
pub use selector::select;
pub use types::{CompletionRequest, CompletionResponse, StreamEvent};
