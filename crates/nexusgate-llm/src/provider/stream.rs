use std::pin::Pin;
use std::task::{Context, Poll};

use eventsource_stream::{EventStreamError, Eventsource};
use futures_util::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::convert::ChunkDecoder;
use crate::error::LlmError;
use crate::failover::TransportError;
use crate::types::StreamEvent;

/// Decoded events buffered ahead of a slow consumer
const CHANNEL_CAPACITY: usize = 64;

type Decoded = Result<StreamEvent, LlmError>;

/// Canonical events decoded from one upstream streaming reply
///
/// A background task reads the transport and publishes into a bounded
/// channel. Dropping the stream aborts that task and with it the upstream
/// connection. The sequence is finite and cannot be restarted.
#[derive(Debug)]
pub struct EventStream {
    rx: mpsc::Receiver<Decoded>,
    task: JoinHandle<()>,
}

impl EventStream {
    /// Start decoding `response` with `decoder`
    pub fn spawn<D>(response: reqwest::Response, decoder: D) -> Self
    where
        D: ChunkDecoder + 'static,
    {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);

        let task = tokio::spawn(async move {
            tokio::select! {
                () = tx.closed() => {
                    tracing::debug!("stream consumer went away, dropping upstream connection");
                }
                () = pump(response, decoder, &tx) => {}
            }
        });

        Self { rx, task }
    }
}

async fn pump<D: ChunkDecoder>(response: reqwest::Response, mut decoder: D, tx: &mpsc::Sender<Decoded>) {
    let mut frames = response.bytes_stream().eventsource();
    let mut emitted = false;

    while let Some(frame) = frames.next().await {
        let frame = match frame {
            Ok(frame) => frame,
            Err(e) => {
                let error = match e {
                    EventStreamError::Transport(e) => LlmError::Transport(TransportError::from_reqwest(&e)),
                    other => LlmError::Streaming(other.to_string()),
                };
                tracing::warn!(error = %error, "upstream stream failed");
                if tx.send(Err(error)).await.is_err() {
                    tracing::debug!("stream consumer dropped before the error was delivered");
                }
                return;
            }
        };

        for event in decoder.decode(&frame.event, &frame.data) {
            emitted = true;
            if tx.send(Ok(event)).await.is_err() {
                return;
            }
        }

        if decoder.is_finished() {
            return;
        }
    }

    if !emitted {
        if tx.send(Err(LlmError::NoChunkReceived)).await.is_err() {
            tracing::debug!("stream consumer dropped before the error was delivered");
        }
        return;
    }

    tracing::debug!("upstream stream ended without a terminal event");

    for event in decoder.finish() {
        if tx.send(Ok(event)).await.is_err() {
            return;
        }
    }
}

impl Stream for EventStream {
    type Item = Decoded;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

impl Drop for EventStream {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use futures_util::stream;

    use super::*;
    use crate::convert::openai::OpenAiDecoder;
    use crate::types::{BlockDelta, ContentBlock};

    fn response(chunks: Vec<&'static str>) -> reqwest::Response {
        let body = stream::iter(chunks.into_iter().map(|c| Ok::<_, std::io::Error>(Bytes::from_static(c.as_bytes()))));
        http::Response::builder()
            .status(200)
            .header("content-type", "text/event-stream")
            .body(reqwest::Body::wrap_stream(body))
            .unwrap()
            .into()
    }

    async fn collect(stream: EventStream) -> Vec<Decoded> {
        stream.collect().await
    }

    #[tokio::test]
    async fn frames_split_across_reads_are_reassembled() {
        let chunks = vec![
            "data: {\"id\":\"c1\",\"model\":\"m\",\"choices\":[{\"index\":0,\"delta\":{\"tool_calls\":[{\"index\":0,\"id\":\"call_1\",\"function\":{\"name\":\"lookup\"}}]}}]}\n\n",
            "data:{\"id\":\"c1\",\"model\":\"m\",\"choices\":[{\"index\":0,\"delta\":{\"tool_calls\":[{\"index\":0,\"function\":{\"arguments\":\"{\\\"q\\\":\"}}]}}]}\n",
            "\ndata: {\"id\":\"c1\",\"model\":\"m\",\"choices\":[{\"index\":0,\"delta\":{\"tool_calls\":[{\"index\":0,\"function\":{\"argu",
            "ments\":\"1}\"}}]}}]}\n\n",
            "data: {\"id\":\"c1\",\"model\":\"m\",\"choices\":[{\"index\":0,\"delta\":{},\"finish_reason\":\"tool_calls\"}]}\n\n",
            "data: [DONE]\n\n",
        ];

        let events: Vec<StreamEvent> = collect(EventStream::spawn(response(chunks), OpenAiDecoder::new()))
            .await
            .into_iter()
            .map(Result::unwrap)
            .collect();

        let starts: Vec<_> = events
            .iter()
            .filter(|e| matches!(e, StreamEvent::ContentBlockStart { content_block: ContentBlock::ToolUse(_), .. }))
            .collect();
        assert_eq!(starts.len(), 1);

        let fragments: Vec<&str> = events
            .iter()
            .filter_map(|e| match e {
                StreamEvent::ContentBlockDelta {
                    delta: BlockDelta::InputJsonDelta { partial_json },
                    ..
                } => Some(partial_json.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(fragments, vec!["{\"q\":", "1}"]);

        let stops = events.iter().filter(|e| matches!(e, StreamEvent::ContentBlockStop { .. })).count();
        assert_eq!(stops, 1);
        assert_eq!(events.iter().filter(|e| matches!(e, StreamEvent::MessageStop)).count(), 1);
        assert_eq!(events.last(), Some(&StreamEvent::MessageStop));
    }

    #[tokio::test]
    async fn eof_without_terminal_still_stops_once() {
        let chunks = vec!["data: {\"id\":\"c1\",\"model\":\"m\",\"choices\":[{\"index\":0,\"delta\":{\"content\":\"hi\"}}]}\n\n"];

        let events: Vec<StreamEvent> = collect(EventStream::spawn(response(chunks), OpenAiDecoder::new()))
            .await
            .into_iter()
            .map(Result::unwrap)
            .collect();

        assert!(matches!(events.first(), Some(StreamEvent::MessageStart { .. })));
        assert_eq!(events.iter().filter(|e| matches!(e, StreamEvent::MessageStop)).count(), 1);
    }

    #[tokio::test]
    async fn empty_stream_is_an_error() {
        let items = collect(EventStream::spawn(response(vec![": keep-alive\n\n"]), OpenAiDecoder::new())).await;

        assert_eq!(items.len(), 1);
        assert!(matches!(items[0], Err(LlmError::NoChunkReceived)));
    }

    #[tokio::test]
    async fn pump_returns_once_consumer_is_gone() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);

        let text = "data: {\"id\":\"c1\",\"model\":\"m\",\"choices\":[{\"index\":0,\"delta\":{\"content\":\"hi\"}}]}\n\n";
        let finished = tokio::time::timeout(
            std::time::Duration::from_secs(1),
            pump(response(vec![text, text, text]), OpenAiDecoder::new(), &tx),
        )
        .await;
        assert!(finished.is_ok());

        let finished = tokio::time::timeout(
            std::time::Duration::from_secs(1),
            pump(response(vec![": keep-alive\n\n"]), OpenAiDecoder::new(), &tx),
        )
        .await;
        assert!(finished.is_ok());
    }
}
