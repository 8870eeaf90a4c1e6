//! Streaming relay.
//!
//! Reads the upstream byte stream, frames it into SSE events, lets a
//! [`StreamInspector`] look at each event and hands it to an
//! [`EventTranscoder`] that decides what the client receives. The relay runs
//! inside the response body stream itself, so dropping the client connection
//! drops the upstream read with it.

pub mod accumulator;
pub mod inspector;
pub mod sse;

use axum::http::StatusCode;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use llmgate_types::{ApiProtocol, ErrorKind};
use llmgate_types::protocol::openai::ChatCompletionChunk;
use std::convert::Infallible;

use crate::error::ErrorEnvelope;
use crate::proxy::upstream::ByteStream;

pub use accumulator::{AccumulatedToolCall, ToolCallAccumulator};
pub use inspector::{StreamDiagnostic, StreamInspector};
pub use sse::{EventTooLarge, SseEvent, SseFramer};

/// Decides the client-facing bytes for each upstream event.
pub trait EventTranscoder: Send + 'static {
    /// Bytes to emit for one upstream event, if any.
    fn on_event(&mut self, event: &SseEvent, chunk: Option<&ChatCompletionChunk>) -> Option<Bytes>;

    /// Called once when the upstream finishes cleanly.
    fn on_end(&mut self) -> Option<Bytes>;

    /// Terminal in-band error event after a mid-stream failure.
    fn on_error(&mut self, message: &str) -> Bytes;
}

/// Forwards every upstream event byte-for-byte.
#[derive(Debug, Default, Clone, Copy)]
pub struct Passthrough;

impl EventTranscoder for Passthrough {
    fn on_event(&mut self, event: &SseEvent, _chunk: Option<&ChatCompletionChunk>) -> Option<Bytes> {
        Some(event.raw.clone())
    }

    fn on_end(&mut self) -> Option<Bytes> {
        None
    }

    fn on_error(&mut self, message: &str) -> Bytes {
        ErrorEnvelope::new(
            StatusCode::BAD_GATEWAY,
            ErrorKind::ConnectionError,
            format!("Upstream stream failed: {message}"),
            ApiProtocol::OpenAI,
        )
        .to_sse_event()
    }
}

/// Logs an early client disconnect when the relay is dropped before finishing.
struct RelayGuard {
    trace_id: String,
    finished: bool,
}

impl Drop for RelayGuard {
    fn drop(&mut self) {
        if !self.finished {
            tracing::info!("[{}] Client disconnected, upstream stream cancelled", self.trace_id);
        }
    }
}

fn inspect(inspector: &mut StreamInspector, event: &SseEvent) -> Option<ChatCompletionChunk> {
    match event.chunk() {
        Ok(Some(chunk)) => {
            inspector.observe(&chunk);
            Some(chunk)
        },
        Ok(None) => None,
        Err(e) => {
            inspector.record_parse_failure(&e);
            None
        },
    }
}

/// Relay `upstream` to the client through `transcoder`.
///
/// Events are emitted in arrival order. A mid-stream upstream failure, or an
/// event that outgrows the framer, yields a single terminal error event and
/// ends the stream.
pub fn relay_stream<T: EventTranscoder>(
    mut upstream: ByteStream,
    mut inspector: StreamInspector,
    mut transcoder: T,
) -> impl Stream<Item = Result<Bytes, Infallible>> + Send + 'static {
    async_stream::stream! {
        let mut guard = RelayGuard { trace_id: inspector.trace_id().to_string(), finished: false };
        let mut framer = SseFramer::new();

        while let Some(item) = upstream.next().await {
            match item {
                Ok(bytes) => {
                    let events = match framer.push(&bytes) {
                        Ok(events) => events,
                        Err(e) => {
                            tracing::error!("[{}] {}", guard.trace_id, e);
                            guard.finished = true;
                            inspector.summarize();
                            yield Ok(transcoder.on_error(&e.to_string()));
                            return;
                        },
                    };
                    for event in events {
                        let chunk = inspect(&mut inspector, &event);
                        if let Some(out) = transcoder.on_event(&event, chunk.as_ref()) {
                            yield Ok(out);
                        }
                    }
                },
                Err(e) => {
                    tracing::error!("[{}] Upstream stream error: {}", guard.trace_id, e);
                    guard.finished = true;
                    inspector.summarize();
                    yield Ok(transcoder.on_error(&e));
                    return;
                },
            }
        }

        if let Some(event) = framer.finish() {
            let chunk = inspect(&mut inspector, &event);
            if let Some(out) = transcoder.on_event(&event, chunk.as_ref()) {
                yield Ok(out);
            }
        }
        if let Some(out) = transcoder.on_end() {
            yield Ok(out);
        }
        guard.finished = true;
        inspector.summarize();
    }
}
