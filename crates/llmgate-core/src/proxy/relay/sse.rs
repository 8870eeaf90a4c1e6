//! Server-sent event framing.
//!
//! Splits an arbitrary byte stream into complete events while keeping each
//! event's raw bytes, terminator included, so they can be forwarded verbatim.

use bytes::{Bytes, BytesMut};
use llmgate_types::protocol::openai::ChatCompletionChunk;
use thiserror::Error;

/// Largest event the framer will hold while waiting for its blank line.
pub const MAX_PENDING_EVENT_BYTES: usize = 16 * 1024 * 1024;

/// Split one event line at its first colon.
///
/// Leading spaces are dropped from the value. Lines without a colon, and
/// comment lines (empty field name), yield `None`.
pub fn split_field(line: &str) -> Option<(&str, &str)> {
    match line.split_once(':')? {
        ("", _) => None,
        (field, value) => Some((field, value.trim_start())),
    }
}

/// One complete upstream event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    /// Exact bytes as received, terminator included
    pub raw: Bytes,
    pub event: Option<String>,
    /// `data:` lines joined with `\n`
    pub data: Option<String>,
}

impl SseEvent {
    fn parse(raw: Bytes) -> Self {
        let text = String::from_utf8_lossy(&raw);
        let mut event = None;
        let mut data: Option<String> = None;

        for line in text.lines().map(|l| l.trim_end_matches('\r')) {
            let Some((field, value)) = split_field(line) else {
                continue;
            };
            match field {
                "event" => event = Some(value.to_string()),
                "data" => match &mut data {
                    Some(existing) => {
                        existing.push('\n');
                        existing.push_str(value);
                    },
                    None => data = Some(value.to_string()),
                },
                _ => {},
            }
        }
        Self { raw, event, data }
    }

    /// `data: [DONE]` sentinel.
    pub fn is_done(&self) -> bool {
        self.data.as_deref().is_some_and(|d| d.trim() == "[DONE]")
    }

    /// Parse the payload as a chat chunk.
    ///
    /// `Ok(None)` for events without a JSON payload (comments, `[DONE]`).
    pub fn chunk(&self) -> Result<Option<ChatCompletionChunk>, serde_json::Error> {
        match self.data.as_deref() {
            Some(data) if !self.is_done() && !data.trim().is_empty() => {
                serde_json::from_str(data).map(Some)
            },
            _ => Ok(None),
        }
    }
}

/// Upstream kept sending one event past the framer's limit.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("upstream event exceeds {limit} bytes without a terminator")]
pub struct EventTooLarge {
    pub limit: usize,
}

/// Incremental event splitter.
#[derive(Debug)]
pub struct SseFramer {
    buffer: BytesMut,
    /// Bytes before this offset are known to hold no terminator
    scanned: usize,
    limit: usize,
}

impl Default for SseFramer {
    fn default() -> Self {
        Self::with_limit(MAX_PENDING_EVENT_BYTES)
    }
}

/// First `\n\n` or `\r\n\r\n` at or after `from`, as (start, terminator length).
fn find_boundary(buf: &[u8], from: usize) -> Option<(usize, usize)> {
    let mut i = from;
    while i + 1 < buf.len() {
        if buf[i] == b'\n' && buf[i + 1] == b'\n' {
            return Some((i, 2));
        }
        if buf[i..].starts_with(b"\r\n\r\n") {
            return Some((i, 4));
        }
        i += 1;
    }
    None
}

impl SseFramer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limit(limit: usize) -> Self {
        Self { buffer: BytesMut::new(), scanned: 0, limit }
    }

    /// Feed bytes; returns every event completed by them, in order.
    ///
    /// Fails once the unterminated tail grows past the limit.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<SseEvent>, EventTooLarge> {
        self.buffer.extend_from_slice(chunk);
        let mut events = Vec::new();

        while let Some((pos, len)) = find_boundary(&self.buffer, self.scanned) {
            let raw = self.buffer.split_to(pos + len).freeze();
            self.scanned = 0;
            events.push(SseEvent::parse(raw));
        }
        // A terminator may straddle the next push; rescan its possible start.
        self.scanned = self.buffer.len().saturating_sub(3);

        if self.buffer.len() > self.limit {
            self.buffer.clear();
            self.scanned = 0;
            return Err(EventTooLarge { limit: self.limit });
        }
        Ok(events)
    }

    /// Flush whatever is left at end of stream as a terminated event.
    pub fn finish(&mut self) -> Option<SseEvent> {
        if self.buffer.iter().all(u8::is_ascii_whitespace) {
            self.buffer.clear();
            return None;
        }
        self.scanned = 0;
        let mut raw = self.buffer.split();
        if !raw.ends_with(b"\n") {
            raw.extend_from_slice(b"\n");
        }
        raw.extend_from_slice(b"\n");
        Some(SseEvent::parse(raw.freeze()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_split_field() {
        assert_eq!(split_field("data: {\"a\":1}"), Some(("data", "{\"a\":1}")));
        assert_eq!(split_field("event:ping"), Some(("event", "ping")));
        assert_eq!(split_field("data: a: b"), Some(("data", "a: b")));
        assert_eq!(split_field(": keep-alive"), None);
        assert_eq!(split_field("garbage"), None);
    }

    #[test]
    fn test_events_split_across_chunks() {
        let mut framer = SseFramer::new();
        assert!(framer.push(b"data: {\"x\"").unwrap().is_empty());
        let events = framer.push(b":1}\n\ndata: [DO").unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].raw.as_ref(), b"data: {\"x\":1}\n\n");
        assert_eq!(events[0].data.as_deref(), Some("{\"x\":1}"));

        let events = framer.push(b"NE]\n\n").unwrap();
        assert_eq!(events.len(), 1);
        assert!(events[0].is_done());
        assert!(framer.finish().is_none());
    }

    #[test]
    fn test_crlf_terminators_preserved() {
        let mut framer = SseFramer::new();
        let events = framer.push(b"event: delta\r\ndata: 1\r\n\r\ndata: 2\n\n").unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].raw.as_ref(), b"event: delta\r\ndata: 1\r\n\r\n");
        assert_eq!(events[0].event.as_deref(), Some("delta"));
        assert_eq!(events[0].data.as_deref(), Some("1"));
        assert_eq!(events[1].data.as_deref(), Some("2"));
    }

    #[test]
    fn test_multiline_data_joined() {
        let mut framer = SseFramer::new();
        let events = framer.push(b"data: a\ndata: b\n\n").unwrap();
        assert_eq!(events[0].data.as_deref(), Some("a\nb"));
    }

    #[test]
    fn test_unterminated_tail_gets_terminator() {
        let mut framer = SseFramer::new();
        assert!(framer.push(b"data: {\"tail\":true}").unwrap().is_empty());
        let event = framer.finish().unwrap();
        assert_eq!(event.raw.as_ref(), b"data: {\"tail\":true}\n\n");
        assert_eq!(event.data.as_deref(), Some("{\"tail\":true}"));
    }

    #[test]
    fn test_comment_and_chunk_parse() {
        let mut framer = SseFramer::new();
        let events = framer.push(b": keep-alive\n\ndata: {\"choices\":[]}\n\ndata: {oops\n\n").unwrap();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].data, None);
        assert!(events[0].chunk().unwrap().is_none());
        assert!(events[1].chunk().unwrap().is_some());
        assert!(events[2].chunk().is_err());
    }

    #[test]
    fn test_large_event_in_small_pieces() {
        let payload = "x".repeat(64 * 1024);
        let wire = format!("data: {payload}\r\n\r\ndata: 2\n\n");
        let mut framer = SseFramer::new();
        let mut events = Vec::new();
        for piece in wire.as_bytes().chunks(7) {
            events.extend(framer.push(piece).unwrap());
        }
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].data.as_deref(), Some(payload.as_str()));
        assert!(events[0].raw.ends_with(b"\r\n\r\n"));
        assert_eq!(events[1].data.as_deref(), Some("2"));
    }

    #[test]
    fn test_terminator_split_between_pushes() {
        let mut framer = SseFramer::new();
        assert!(framer.push(b"data: 1\r\n\r").unwrap().is_empty());
        let events = framer.push(b"\ndata: 2\n").unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].raw.as_ref(), b"data: 1\r\n\r\n");
        assert_eq!(framer.push(b"\n").unwrap()[0].data.as_deref(), Some("2"));
    }

    #[test]
    fn test_unterminated_event_over_limit() {
        let mut framer = SseFramer::with_limit(32);
        assert!(framer.push(b"data: 0123456789").unwrap().is_empty());
        assert_eq!(
            framer.push(b"0123456789012345678901234567").unwrap_err(),
            EventTooLarge { limit: 32 }
        );
        // Buffer is dropped, so the framer can continue with fresh input.
        assert_eq!(framer.push(b"data: ok\n\n").unwrap().len(), 1);
    }
}
