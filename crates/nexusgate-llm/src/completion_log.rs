//! Completion records handed to an external log store

use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc;

use crate::types::Usage;

/// Final state of a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionStatus {
    Completed,
    Failed,
    /// Client went away before the stream finished
    Aborted,
}

impl CompletionStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Aborted => "aborted",
        }
    }
}

/// Everything known about one finished request
#[derive(Debug, Clone, Serialize)]
pub struct CompletionRecord {
    /// Model name the client asked for
    pub model: String,
    /// Inbound wire format
    pub format: String,
    pub request_id: Option<String>,
    pub provider_id: Option<String>,
    pub provider_name: Option<String>,
    pub upstream_model: Option<String>,
    pub status: CompletionStatus,
    pub stream: bool,
    pub text: String,
    pub thinking: String,
    /// Unknown counts stay `None`
    pub usage: Usage,
    pub attempts: u32,
    /// One message per failed attempt, oldest first
    pub errors: Vec<String>,
    pub duration: Duration,
    /// Time until the first upstream stream event
    pub time_to_first_event: Option<Duration>,
}

/// Destination for completion records
///
/// Called inline on the request path: implementations must not block and must
/// swallow their own failures.
pub trait CompletionSink: Send + Sync {
    fn record(&self, record: CompletionRecord);
}

/// Emits each record as one `info` event
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl CompletionSink for TracingSink {
    fn record(&self, record: CompletionRecord) {
        tracing::info!(
            model = %record.model,
            format = %record.format,
            request_id = record.request_id.as_deref(),
            provider = record.provider_id.as_deref(),
            upstream_model = record.upstream_model.as_deref(),
            status = record.status.as_str(),
            stream = record.stream,
            input_tokens = record.usage.input_tokens,
            output_tokens = record.usage.output_tokens,
            attempts = record.attempts,
            failed_attempts = record.errors.len(),
            duration_ms = u64::try_from(record.duration.as_millis()).unwrap_or(u64::MAX),
            ttfe_ms = record
                .time_to_first_event
                .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX)),
            "completion finished"
        );
    }
}

/// Forwards records to a background consumer over an unbounded channel
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<CompletionRecord>,
}

impl ChannelSink {
    /// Sink and the receiving end the consumer drains
    pub fn new() -> (Self, mpsc::UnboundedReceiver<CompletionRecord>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl CompletionSink for ChannelSink {
    fn record(&self, record: CompletionRecord) {
        if let Err(e) = self.tx.send(record) {
            tracing::warn!(error = %e, "failed to enqueue completion record, channel closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(status: CompletionStatus) -> CompletionRecord {
        CompletionRecord {
            model: "gpt-4o".to_owned(),
            format: "openai-chat".to_owned(),
            request_id: None,
            provider_id: Some("openai".to_owned()),
            provider_name: None,
            upstream_model: Some("gpt-4o-2024-08-06".to_owned()),
            status,
            stream: false,
            text: "hi".to_owned(),
            thinking: String::new(),
            usage: Usage {
                input_tokens: Some(3),
                output_tokens: None,
                ..Usage::default()
            },
            attempts: 1,
            errors: Vec::new(),
            duration: Duration::from_millis(12),
            time_to_first_event: None,
        }
    }

    #[test]
    fn status_serializes_snake_case() {
        let value = serde_json::to_value(record(CompletionStatus::Aborted)).unwrap();
        assert_eq!(value["status"], "aborted");
        assert!(value["usage"].get("output_tokens").is_none());
    }

    #[tokio::test]
    async fn channel_sink_delivers_records() {
        let (sink, mut rx) = ChannelSink::new();
        sink.record(record(CompletionStatus::Completed));

        let received = rx.recv().await.unwrap();
        assert_eq!(received.status, CompletionStatus::Completed);
    }

    #[test]
    fn closed_channel_is_swallowed() {
        let (sink, rx) = ChannelSink::new();
        drop(rx);

        sink.record(record(CompletionStatus::Failed));
    }
}
