//! Deterministic synthetic backend for offline use.

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream;
use llmgate_types::protocol::openai::Usage;
use llmgate_types::GatewayError;
use serde_json::{json, Value};

use super::{ByteStream, ChatUpstream, UpstreamRoute};

pub const CHAT_PLACEHOLDER_TEXT: &str = "This is a placeholder response from the local LLM proxy. \
     Configure TARGET_ENDPOINT to connect to your actual LLM service.";
pub const COMPLETION_PLACEHOLDER_TEXT: &str = "This is a placeholder response.";

const CHAT_USAGE: Usage = Usage::new(10, 20);
const COMPLETION_USAGE: Usage = Usage::new(5, 10);

#[derive(Debug, Default, Clone, Copy)]
pub struct PlaceholderUpstream;

struct Shape {
    id: String,
    object: &'static str,
    chunk_object: &'static str,
    model: String,
    text: &'static str,
    usage: Usage,
}

impl Shape {
    fn for_route(route: UpstreamRoute, body: &Value) -> Self {
        let requested = body.get("model").and_then(Value::as_str);
        let hex = uuid::Uuid::new_v4().simple().to_string();
        let hex = &hex[..24];
        match route {
            UpstreamRoute::ChatCompletions => Self {
                id: format!("chatcmpl-{hex}"),
                object: "chat.completion",
                chunk_object: "chat.completion.chunk",
                model: requested.unwrap_or("gpt-4").to_string(),
                text: CHAT_PLACEHOLDER_TEXT,
                usage: CHAT_USAGE,
            },
            UpstreamRoute::Completions => Self {
                id: format!("cmpl-{hex}"),
                object: "text_completion",
                chunk_object: "text_completion",
                model: requested.unwrap_or("gpt-3.5-turbo").to_string(),
                text: COMPLETION_PLACEHOLDER_TEXT,
                usage: COMPLETION_USAGE,
            },
        }
    }

    fn choice(&self, route: UpstreamRoute, text: Option<&str>, finish: Option<&str>, stream: bool) -> Value {
        match (route, stream) {
            (UpstreamRoute::ChatCompletions, false) => json!({
                "index": 0,
                "message": { "role": "assistant", "content": text },
                "finish_reason": finish,
            }),
            (UpstreamRoute::ChatCompletions, true) => {
                let delta = match text {
                    Some(t) => json!({ "role": "assistant", "content": t }),
                    None => json!({}),
                };
                json!({ "index": 0, "delta": delta, "finish_reason": finish })
            },
            (UpstreamRoute::Completions, _) => json!({
                "index": 0,
                "text": text.unwrap_or_default(),
                "finish_reason": finish,
            }),
        }
    }
}

fn created() -> i64 {
    chrono::Utc::now().timestamp()
}

#[async_trait]
impl ChatUpstream for PlaceholderUpstream {
    async fn send(&self, route: UpstreamRoute, body: Value) -> Result<Value, GatewayError> {
        let shape = Shape::for_route(route, &body);
        tracing::debug!("Placeholder {} response for model {}", shape.object, shape.model);
        Ok(json!({
            "id": shape.id,
            "object": shape.object,
            "created": created(),
            "model": shape.model,
            "choices": [shape.choice(route, Some(shape.text), Some("stop"), false)],
            "usage": shape.usage,
        }))
    }

    async fn send_stream(&self, route: UpstreamRoute, body: Value) -> Result<ByteStream, GatewayError> {
        let shape = Shape::for_route(route, &body);
        let created = created();
        let event = |choice: Value, usage: Option<Usage>| -> Result<Bytes, String> {
            let mut chunk = json!({
                "id": shape.id,
                "object": shape.chunk_object,
                "created": created,
                "model": shape.model,
                "choices": [choice],
            });
            if let Some(usage) = usage {
                chunk["usage"] = json!(usage);
            }
            Ok(Bytes::from(format!("data: {chunk}\n\n")))
        };

        let mut events: Vec<Result<Bytes, String>> = shape
            .text
            .split_inclusive(' ')
            .map(|word| event(shape.choice(route, Some(word), None, true), None))
            .collect();
        events.push(event(shape.choice(route, None, Some("stop"), true), Some(shape.usage)));
        events.push(Ok(Bytes::from_static(b"data: [DONE]\n\n")));

        Ok(Box::pin(stream::iter(events)))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::proxy::relay::SseFramer;
    use futures::StreamExt;
    use llmgate_types::protocol::openai::ChatCompletionChunk;

    #[tokio::test]
    async fn test_chat_placeholder() {
        let body = PlaceholderUpstream
            .send(UpstreamRoute::ChatCompletions, json!({"model": "gpt-4o"}))
            .await
            .unwrap();
        assert!(body["id"].as_str().unwrap().starts_with("chatcmpl-"));
        assert_eq!(body["id"].as_str().unwrap().len(), "chatcmpl-".len() + 24);
        assert_eq!(body["model"], "gpt-4o");
        assert_eq!(body["choices"][0]["message"]["content"], CHAT_PLACEHOLDER_TEXT);
        assert_eq!(body["usage"], json!({"prompt_tokens": 10, "completion_tokens": 20, "total_tokens": 30}));
    }

    #[tokio::test]
    async fn test_completion_placeholder_defaults_model() {
        let body = PlaceholderUpstream.send(UpstreamRoute::Completions, json!({})).await.unwrap();
        assert_eq!(body["object"], "text_completion");
        assert_eq!(body["model"], "gpt-3.5-turbo");
        assert_eq!(body["choices"][0]["text"], COMPLETION_PLACEHOLDER_TEXT);
        assert_eq!(body["usage"]["total_tokens"], 15);
    }

    #[tokio::test]
    async fn test_stream_one_chunk_per_word() {
        let stream = PlaceholderUpstream
            .send_stream(UpstreamRoute::ChatCompletions, json!({"model": "m"}))
            .await
            .unwrap();
        let raw: Vec<Bytes> = stream.map(Result::unwrap).collect().await;

        let mut framer = SseFramer::new();
        let events: Vec<_> = raw.iter().flat_map(|b| framer.push(b).unwrap()).collect();
        let words = CHAT_PLACEHOLDER_TEXT.split(' ').count();
        assert_eq!(events.len(), words + 2);
        assert!(events.last().unwrap().is_done());

        let chunks: Vec<ChatCompletionChunk> =
            events.iter().filter_map(|e| e.chunk().unwrap()).collect();
        let text: String = chunks.iter().filter_map(|c| c.choices[0].content_fragment()).collect();
        assert_eq!(text, CHAT_PLACEHOLDER_TEXT);

        let last = chunks.last().unwrap();
        assert_eq!(last.choices[0].finish_reason.as_deref(), Some("stop"));
        assert_eq!(last.usage, Some(CHAT_USAGE));
    }
}
