#![allow(unused_crate_dependencies)]
#![allow(clippy::tests_outside_test_module, reason = "integration tests live in tests/ dir")]
#![allow(clippy::unwrap_used, reason = "integration test: panics are the assertion mechanism")]

use async_trait::async_trait;
use axum::http::StatusCode;
use axum_test::TestServer;
use bytes::Bytes;
use llmgate_core::proxy::relay::SseFramer;
use llmgate_core::proxy::upstream::{ByteStream, ChatUpstream, UpstreamRoute};
use llmgate_core::{build_router, GatewayContext};
use llmgate_types::models::{GatewayConfig, OAuthConfig, UpstreamConfig};
use llmgate_types::GatewayError;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const SECRET: &str = "llm-proxy-test-secret";

fn config() -> GatewayConfig {
    GatewayConfig { access_token: SECRET.to_string(), ..GatewayConfig::default() }
}

fn placeholder_config() -> GatewayConfig {
    GatewayConfig { placeholder_mode: true, ..config() }
}

fn upstream_config(server: &MockServer) -> GatewayConfig {
    GatewayConfig {
        upstream: UpstreamConfig {
            endpoint: format!("{}/v1", server.uri()),
            api_key: Some("sk-upstream".to_string()),
            ..UpstreamConfig::default()
        },
        ..config()
    }
}

fn serve(config: GatewayConfig) -> (TestServer, GatewayContext) {
    let context = GatewayContext::build(config).unwrap();
    let server = TestServer::new(build_router(context.state.clone())).unwrap();
    (server, context)
}

fn sse_events(text: &str) -> Vec<(Option<String>, String)> {
    SseFramer::new()
        .push(text.as_bytes())
        .unwrap()
        .into_iter()
        .map(|e| (e.event, e.data.unwrap_or_default()))
        .collect()
}

#[tokio::test]
async fn test_health_needs_no_secret() {
    let (server, _ctx) = serve(placeholder_config());
    let response = server.get("/health").await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["status"], "healthy");
    assert!(body["timestamp"].is_string());
}

#[tokio::test]
async fn test_unauthorized_before_any_token_fetch() {
    let oauth = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access_token": "t", "expires_in": 3600})))
        .expect(0)
        .mount(&oauth)
        .await;

    let (server, _ctx) = serve(GatewayConfig {
        oauth: OAuthConfig {
            token_endpoint: Some(format!("{}/token", oauth.uri())),
            client_id: Some("id".to_string()),
            client_secret: Some("secret".to_string()),
            ..OAuthConfig::default()
        },
        ..config()
    });

    let response = server
        .post("/v1/chat/completions")
        .json(&json!({"model": "gpt-4", "messages": [{"role": "user", "content": "hi"}]}))
        .await;
    response.assert_status(StatusCode::UNAUTHORIZED);
    let body: Value = response.json();
    assert_eq!(body["error"]["type"], "invalid_request_error");
    assert_eq!(body["error"]["message"], "Missing or invalid Authorization header");

    let response = server
        .post("/v1/messages")
        .authorization_bearer("wrong")
        .json(&json!({"model": "claude-x", "messages": [{"role": "user", "content": "hi"}]}))
        .await;
    response.assert_status(StatusCode::UNAUTHORIZED);
    let body: Value = response.json();
    assert_eq!(body["type"], "error");
    assert_eq!(body["error"]["message"], "Invalid access token");
}

#[tokio::test]
async fn test_placeholder_chat_completion() {
    let (server, ctx) = serve(placeholder_config());
    let response = server
        .post("/v1/chat/completions")
        .authorization_bearer(SECRET)
        .json(&json!({"model": "gpt-4o", "messages": [{"role": "user", "content": "hi"}]}))
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["object"], "chat.completion");
    assert_eq!(body["model"], "gpt-4o");
    assert_eq!(body["usage"], json!({"prompt_tokens": 10, "completion_tokens": 20, "total_tokens": 30}));

    let logs = ctx.log_store.get_logs(None);
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].path, "/v1/chat/completions");
    assert_eq!(logs[0].model.as_deref(), Some("gpt-4o"));
    assert_eq!(logs[0].status, 200);
}

#[tokio::test]
async fn test_placeholder_completion_and_validation() {
    let (server, _ctx) = serve(placeholder_config());
    let response = server
        .post("/v1/completions")
        .authorization_bearer(SECRET)
        .json(&json!({"model": "gpt-3.5-turbo", "prompt": "Say hi"}))
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["choices"][0]["text"], "This is a placeholder response.");

    let response = server
        .post("/v1/chat/completions")
        .authorization_bearer(SECRET)
        .json(&json!({"messages": [{"role": "user", "content": "hi"}]}))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["error"]["param"], "model");

    let response = server
        .post("/v1/chat/completions")
        .authorization_bearer(SECRET)
        .text("{not json")
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_placeholder_messages_round_trip() {
    let mut config = placeholder_config();
    config.models.aliases = BTreeMap::from([("claude-*".to_string(), "gpt-4o".to_string())]);
    let (server, _ctx) = serve(config);

    let response = server
        .post("/v1/messages")
        .authorization_bearer(SECRET)
        .json(&json!({
            "model": "claude-sonnet",
            "system": "be brief",
            "max_tokens": 64,
            "messages": [{"role": "user", "content": [{"type": "text", "text": "hi"}]}]
        }))
        .await;
    response.assert_status_ok();
    assert_eq!(response.header("x-mapped-model"), "gpt-4o");
    assert_eq!(response.header("x-mapping-reason"), "wildcard:claude-*");

    let body: Value = response.json();
    assert_eq!(body["type"], "message");
    assert_eq!(body["role"], "assistant");
    assert_eq!(body["model"], "claude-sonnet");
    assert!(body["id"].as_str().unwrap().starts_with("msg_"));
    assert_eq!(body["content"][0]["type"], "text");
    assert_eq!(body["stop_reason"], "end_turn");
    assert_eq!(body["usage"], json!({"input_tokens": 10, "output_tokens": 20}));
}

#[tokio::test]
async fn test_messages_without_text_rejected() {
    let (server, _ctx) = serve(placeholder_config());
    let response = server
        .post("/v1/messages")
        .authorization_bearer(SECRET)
        .json(&json!({
            "model": "claude-x",
            "messages": [{"role": "user", "content": [{"type": "image", "source": {"type": "base64", "data": "AA"}}]}]
        }))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body, json!({"type": "error", "error": {"type": "invalid_request_error", "message": "no valid messages"}}));
}

#[tokio::test]
async fn test_placeholder_messages_stream() {
    let (server, ctx) = serve(placeholder_config());
    let response = server
        .post("/v1/messages")
        .authorization_bearer(SECRET)
        .json(&json!({"model": "claude-x", "stream": true, "messages": [{"role": "user", "content": "hi"}]}))
        .await;
    response.assert_status_ok();
    assert!(response.header("content-type").to_str().unwrap().starts_with("text/event-stream"));

    let events = sse_events(&response.text());
    let names: Vec<&str> = events.iter().filter_map(|(n, _)| n.as_deref()).collect();
    assert_eq!(names.first(), Some(&"message_start"));
    assert_eq!(names.last(), Some(&"message_stop"));
    assert_eq!(names.iter().filter(|n| **n == "message_stop").count(), 1);

    let text: String = events
        .iter()
        .filter(|(n, _)| n.as_deref() == Some("content_block_delta"))
        .map(|(_, d)| serde_json::from_str::<Value>(d).unwrap()["delta"]["text"].as_str().unwrap().to_string())
        .collect();
    assert!(text.starts_with("This is a placeholder response from the local LLM proxy."));

    assert_eq!(ctx.log_store.get_logs(None).len(), 1);
}

#[tokio::test]
async fn test_stream_passthrough_is_byte_identical() {
    let upstream = MockServer::start().await;
    let sse = concat!(
        "data: {\"id\":\"c1\",\"choices\":[{\"index\":0,\"delta\":{\"role\":\"assistant\",\"content\":\"Hi\"}}]}\n\n",
        ": keep-alive\n\n",
        "data: {\"id\":\"c1\",\"choices\":[{\"index\":0,\"delta\":{\"tool_calls\":[{\"index\":0,\"id\":\"call_1\",\"type\":\"function\",\"function\":{\"name\":\"get_weather\",\"arguments\":\"{\\\"city\\\":\"}}]}}]}\n\n",
        "data: {\"id\":\"c1\",\"choices\":[{\"index\":0,\"delta\":{\"tool_calls\":[{\"index\":0,\"function\":{\"arguments\":\"\\\"Paris\\\"}\"}}]}}]}\n\n",
        "data: {\"id\":\"c1\",\"choices\":[{\"index\":0,\"delta\":{},\"finish_reason\":\"tool_calls\"}]}\n\n",
        "data: [DONE]\n\n",
    );
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer sk-upstream"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(sse, "text/event-stream"))
        .expect(1)
        .mount(&upstream)
        .await;

    let (server, _ctx) = serve(upstream_config(&upstream));
    let response = server
        .post("/v1/chat/completions")
        .authorization_bearer(SECRET)
        .json(&json!({"model": "gpt-4", "stream": true, "messages": [{"role": "user", "content": "weather?"}]}))
        .await;
    response.assert_status_ok();
    assert_eq!(response.text(), sse);
    assert_eq!(sse_events(&response.text()).len(), 6);
}

/// Accepts a streaming call, sends one chunk, then loses the connection.
struct ResetMidStream;

#[async_trait]
impl ChatUpstream for ResetMidStream {
    async fn send(&self, _route: UpstreamRoute, _body: Value) -> Result<Value, GatewayError> {
        Err(GatewayError::internal("streaming only"))
    }

    async fn send_stream(&self, _route: UpstreamRoute, _body: Value) -> Result<ByteStream, GatewayError> {
        let parts: Vec<Result<Bytes, String>> = vec![
            Ok(Bytes::from_static(
                b"data: {\"id\":\"c1\",\"choices\":[{\"index\":0,\"delta\":{\"content\":\"Hel\"}}]}\n\n",
            )),
            Err("connection reset by peer".to_string()),
        ];
        Ok(Box::pin(futures::stream::iter(parts)))
    }
}

fn serve_with_upstream(upstream: Arc<dyn ChatUpstream>) -> (TestServer, GatewayContext) {
    let mut context = GatewayContext::build(config()).unwrap();
    context.state.upstream = upstream;
    let server = TestServer::new(build_router(context.state.clone())).unwrap();
    (server, context)
}

#[tokio::test]
async fn test_mid_stream_failure_ends_openai_stream_with_error() {
    let (server, ctx) = serve_with_upstream(Arc::new(ResetMidStream));
    let response = server
        .post("/v1/chat/completions")
        .authorization_bearer(SECRET)
        .json(&json!({"model": "gpt-4", "stream": true, "messages": [{"role": "user", "content": "hi"}]}))
        .await;
    response.assert_status_ok();

    let events = sse_events(&response.text());
    assert_eq!(events.len(), 2);
    assert!(events[0].1.contains("\"Hel\""));
    let error: Value = serde_json::from_str(&events[1].1).unwrap();
    assert_eq!(error["error"]["type"], "connection_error");
    assert!(error["error"]["message"].as_str().unwrap().contains("connection reset by peer"));
    assert!(!response.text().contains("[DONE]"));

    assert_eq!(ctx.log_store.get_logs(None).len(), 1);
}

#[tokio::test]
async fn test_mid_stream_failure_ends_messages_stream_with_error() {
    let (server, _ctx) = serve_with_upstream(Arc::new(ResetMidStream));
    let response = server
        .post("/v1/messages")
        .authorization_bearer(SECRET)
        .json(&json!({"model": "claude-x", "stream": true, "messages": [{"role": "user", "content": "hi"}]}))
        .await;
    response.assert_status_ok();

    let events = sse_events(&response.text());
    let names: Vec<&str> = events.iter().filter_map(|(n, _)| n.as_deref()).collect();
    assert_eq!(names.first(), Some(&"message_start"));
    assert_eq!(names.last(), Some(&"error"));
    assert!(!names.contains(&"message_stop"));

    let (_, data) = events.last().unwrap();
    let error: Value = serde_json::from_str(data).unwrap();
    assert_eq!(error["type"], "error");
    assert!(error["error"]["message"].as_str().unwrap().contains("connection reset by peer"));
}

#[tokio::test]
async fn test_upstream_error_shapes() {
    let upstream = MockServer::start().await;
    let upstream_body = json!({"error": {"message": "Rate limit reached", "type": "rate_limit"}});
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(429).set_body_json(upstream_body.clone()))
        .mount(&upstream)
        .await;

    let (server, _ctx) = serve(upstream_config(&upstream));

    let response = server
        .post("/v1/chat/completions")
        .authorization_bearer(SECRET)
        .json(&json!({"model": "gpt-4", "messages": [{"role": "user", "content": "hi"}]}))
        .await;
    response.assert_status(StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(response.json::<Value>(), upstream_body);

    let response = server
        .post("/v1/messages")
        .authorization_bearer(SECRET)
        .json(&json!({"model": "claude-x", "messages": [{"role": "user", "content": "hi"}]}))
        .await;
    response.assert_status(StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(
        response.json::<Value>(),
        json!({"type": "error", "error": {"type": "rate_limit_error", "message": "Rate limit reached"}})
    );
}

#[tokio::test]
async fn test_unreachable_upstream() {
    let (server, _ctx) = serve(GatewayConfig {
        upstream: UpstreamConfig { endpoint: "http://127.0.0.1:1/v1".to_string(), ..UpstreamConfig::default() },
        ..config()
    });
    let response = server
        .post("/v1/chat/completions")
        .authorization_bearer(SECRET)
        .json(&json!({"model": "gpt-4", "messages": [{"role": "user", "content": "hi"}]}))
        .await;
    response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = response.json();
    assert_eq!(body["error"]["type"], "connection_error");
    assert_eq!(body["error"]["code"], "target_connection_failed");
}

#[tokio::test]
async fn test_oauth_token_fetched_once_and_attached() {
    let oauth = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access_token": "oauth-token", "expires_in": 3600})))
        .expect(1)
        .mount(&oauth)
        .await;

    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer oauth-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "chatcmpl-1", "object": "chat.completion", "choices": []
        })))
        .expect(3)
        .mount(&upstream)
        .await;

    let mut config = upstream_config(&upstream);
    config.oauth = OAuthConfig {
        token_endpoint: Some(format!("{}/token", oauth.uri())),
        client_id: Some("id".to_string()),
        client_secret: Some("secret".to_string()),
        ..OAuthConfig::default()
    };
    let (server, ctx) = serve(config);

    for _ in 0..3 {
        server
            .post("/v1/chat/completions")
            .authorization_bearer(SECRET)
            .json(&json!({"model": "gpt-4", "messages": [{"role": "user", "content": "hi"}]}))
            .await
            .assert_status_ok();
    }
    assert_eq!(ctx.state.credentials.status().state, "valid");
    ctx.state.credentials.shutdown();
}

#[tokio::test]
async fn test_models_and_unknown_routes() {
    let (server, _ctx) = serve(placeholder_config());

    let body: Value = server.get("/v1/models").authorization_bearer(SECRET).await.json();
    assert_eq!(body["object"], "list");
    assert_eq!(body["data"][0], json!({"id": "gpt-4", "object": "model", "created": 1_687_882_410, "owned_by": "openai"}));

    let response = server.get("/v1/models/gpt-4o").authorization_bearer(SECRET).await;
    response.assert_status_ok();

    let response = server.get("/v1/models/nope").authorization_bearer(SECRET).await;
    response.assert_status(StatusCode::NOT_FOUND);
    let body: Value = response.json();
    assert_eq!(body["error"]["message"], "Model 'nope' not found");
    assert_eq!(body["error"]["code"], "model_not_found");
    assert_eq!(body["error"]["param"], "model");

    let response = server.get("/v2/anything").authorization_bearer(SECRET).await;
    response.assert_status(StatusCode::NOT_FOUND);
    let body: Value = response.json();
    assert_eq!(body["error"]["type"], "invalid_request_error");
}
