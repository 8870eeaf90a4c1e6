//! Canonical chat chunks -> Anthropic Messages stream events.

use axum::http::StatusCode;
use bytes::{Bytes, BytesMut};
use llmgate_types::protocol::claude::stop_reason_for;
use llmgate_types::protocol::openai::{ChatCompletionChunk, Usage};
use llmgate_types::{ApiProtocol, ErrorKind};
use serde_json::{json, Value};

use crate::error::ErrorEnvelope;
use crate::proxy::mappers::claude::response::message_id;
use crate::proxy::relay::{EventTranscoder, SseEvent};

pub struct AnthropicTranscoder {
    requested_model: String,
    message_start_sent: bool,
    message_stop_sent: bool,
    stop_reason: &'static str,
    usage: Usage,
}

impl AnthropicTranscoder {
    pub fn new(requested_model: impl Into<String>) -> Self {
        Self {
            requested_model: requested_model.into(),
            message_start_sent: false,
            message_stop_sent: false,
            stop_reason: stop_reason_for(None),
            usage: Usage::default(),
        }
    }

    fn emit(out: &mut BytesMut, event_type: &str, data: Value) {
        out.extend_from_slice(
            format!(
                "event: {}\ndata: {}\n\n",
                event_type,
                serde_json::to_string(&data).unwrap_or_default()
            )
            .as_bytes(),
        );
    }

    fn emit_message_start(&mut self, out: &mut BytesMut, upstream_id: &str) {
        if self.message_start_sent {
            return;
        }
        self.message_start_sent = true;

        Self::emit(
            out,
            "message_start",
            json!({
                "type": "message_start",
                "message": {
                    "id": message_id(upstream_id),
                    "type": "message",
                    "role": "assistant",
                    "content": [],
                    "model": self.requested_model,
                    "stop_reason": null,
                    "stop_sequence": null,
                    "usage": {
                        "input_tokens": self.usage.prompt_tokens,
                        "output_tokens": 0,
                    },
                },
            }),
        );
        Self::emit(
            out,
            "content_block_start",
            json!({
                "type": "content_block_start",
                "index": 0,
                "content_block": { "type": "text", "text": "" },
            }),
        );
    }

    fn emit_finish(&mut self, out: &mut BytesMut) {
        if self.message_stop_sent {
            return;
        }
        self.emit_message_start(out, "");
        self.message_stop_sent = true;

        Self::emit(out, "content_block_stop", json!({ "type": "content_block_stop", "index": 0 }));
        Self::emit(
            out,
            "message_delta",
            json!({
                "type": "message_delta",
                "delta": { "stop_reason": self.stop_reason, "stop_sequence": null },
                "usage": { "output_tokens": self.usage.completion_tokens },
            }),
        );
        Self::emit(out, "message_stop", json!({ "type": "message_stop" }));
    }

    fn handle_chunk(&mut self, out: &mut BytesMut, chunk: &ChatCompletionChunk) {
        if let Some(usage) = chunk.usage {
            self.usage = usage;
        }
        self.emit_message_start(out, &chunk.id);

        for choice in chunk.choices.iter().filter(|c| c.index == 0) {
            if let Some(text) = choice.content_fragment().filter(|t| !t.is_empty()) {
                Self::emit(
                    out,
                    "content_block_delta",
                    json!({
                        "type": "content_block_delta",
                        "index": 0,
                        "delta": { "type": "text_delta", "text": text },
                    }),
                );
            }
            if let Some(reason) = choice.finish_reason.as_deref() {
                self.stop_reason = stop_reason_for(Some(reason));
            }
        }
    }
}

fn non_empty(out: BytesMut) -> Option<Bytes> {
    (!out.is_empty()).then(|| out.freeze())
}

impl EventTranscoder for AnthropicTranscoder {
    fn on_event(&mut self, event: &SseEvent, chunk: Option<&ChatCompletionChunk>) -> Option<Bytes> {
        if self.message_stop_sent {
            return None;
        }
        let mut out = BytesMut::new();
        if event.is_done() {
            self.emit_finish(&mut out);
        } else if let Some(chunk) = chunk {
            self.handle_chunk(&mut out, chunk);
        }
        non_empty(out)
    }

    fn on_end(&mut self) -> Option<Bytes> {
        let mut out = BytesMut::new();
        self.emit_finish(&mut out);
        non_empty(out)
    }

    fn on_error(&mut self, message: &str) -> Bytes {
        self.message_stop_sent = true;
        ErrorEnvelope::new(
            StatusCode::BAD_GATEWAY,
            ErrorKind::ApiError,
            format!("Upstream stream failed: {message}"),
            ApiProtocol::Anthropic,
        )
        .to_sse_event()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::proxy::relay::SseFramer;

    fn run(input: &str) -> Vec<(String, Value)> {
        let mut transcoder = AnthropicTranscoder::new("claude-x");
        let mut framer = SseFramer::new();
        let mut raw = String::new();
        for event in framer.push(input.as_bytes()).unwrap() {
            let chunk = event.chunk().ok().flatten();
            if let Some(out) = transcoder.on_event(&event, chunk.as_ref()) {
                raw.push_str(std::str::from_utf8(&out).unwrap());
            }
        }
        if let Some(out) = transcoder.on_end() {
            raw.push_str(std::str::from_utf8(&out).unwrap());
        }

        SseFramer::new()
            .push(raw.as_bytes())
            .unwrap()
            .into_iter()
            .map(|e| (e.event.unwrap(), serde_json::from_str(&e.data.unwrap()).unwrap()))
            .collect()
    }

    #[test]
    fn test_full_event_sequence() {
        let events = run(concat!(
            "data: {\"id\":\"chatcmpl-7\",\"choices\":[{\"index\":0,\"delta\":{\"role\":\"assistant\",\"content\":\"Hel\"}}]}\n\n",
            "data: {\"id\":\"chatcmpl-7\",\"choices\":[{\"index\":0,\"delta\":{\"content\":\"lo\"}}]}\n\n",
            "data: {\"id\":\"chatcmpl-7\",\"choices\":[{\"index\":0,\"delta\":{},\"finish_reason\":\"length\"}],",
            "\"usage\":{\"prompt_tokens\":4,\"completion_tokens\":2,\"total_tokens\":6}}\n\n",
            "data: [DONE]\n\n",
        ));

        let names: Vec<&str> = events.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "message_start",
                "content_block_start",
                "content_block_delta",
                "content_block_delta",
                "content_block_stop",
                "message_delta",
                "message_stop",
            ]
        );
        assert_eq!(events[0].1["message"]["id"], "msg_7");
        assert_eq!(events[0].1["message"]["model"], "claude-x");
        assert_eq!(events[2].1["delta"]["text"], "Hel");
        assert_eq!(events[5].1["delta"]["stop_reason"], "max_tokens");
        assert_eq!(events[5].1["usage"]["output_tokens"], 2);
    }

    #[test]
    fn test_closes_without_done_sentinel() {
        let events = run("data: {\"id\":\"x\",\"choices\":[{\"index\":0,\"delta\":{\"content\":\"a\"}}]}\n\n");
        assert_eq!(events.last().unwrap().0, "message_stop");
        assert_eq!(events.iter().filter(|(n, _)| n == "message_stop").count(), 1);
        assert_eq!(events[events.len() - 2].1["delta"]["stop_reason"], "end_turn");
    }

    #[test]
    fn test_error_event_shape() {
        let mut transcoder = AnthropicTranscoder::new("claude-x");
        let out = transcoder.on_error("reset");
        let text = std::str::from_utf8(&out).unwrap();
        assert!(text.starts_with("event: error\ndata: "));
        assert!(text.contains("\"api_error\""));
        assert!(transcoder.on_end().is_none());
    }
}
