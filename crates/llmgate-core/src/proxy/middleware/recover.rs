use axum::{
    extract::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};
use futures::FutureExt;
use llmgate_types::{ApiProtocol, GatewayError};
use std::any::Any;
use std::panic::AssertUnwindSafe;

use crate::error::ProtocolError;

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

/// Turns a handler panic into a 500 `api_error` envelope instead of a dropped connection.
pub async fn recover_middleware(request: Request, next: Next) -> Response {
    let protocol = ApiProtocol::for_path(request.uri().path());
    let path = request.uri().path().to_string();

    match AssertUnwindSafe(next.run(request)).catch_unwind().await {
        Ok(response) => response,
        Err(payload) => {
            tracing::error!("Handler panicked on {}: {}", path, panic_message(payload.as_ref()));
            ProtocolError::new(GatewayError::internal("Internal server error"), protocol)
                .into_response()
        },
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use axum::middleware::from_fn;
    use axum::routing::{get, post};
    use axum::Router;
    use axum_test::TestServer;
    use serde_json::Value;

    async fn explode() -> &'static str {
        panic!("handler exploded");
    }

    fn server() -> TestServer {
        let app = Router::new()
            .route("/v1/messages", post(explode))
            .route("/v1/chat/completions", post(explode))
            .route("/v1/models", get(|| async { "ok" }))
            .layer(from_fn(recover_middleware));
        TestServer::new(app).unwrap()
    }

    #[tokio::test]
    async fn test_panic_becomes_anthropic_api_error() {
        let response = server().post("/v1/messages").await;
        response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);

        let body: Value = response.json();
        assert_eq!(body["type"], "error");
        assert_eq!(body["error"]["type"], "api_error");
        assert_eq!(body["error"]["message"], "Internal server error");
        assert!(!response.text().contains("handler exploded"));
    }

    #[tokio::test]
    async fn test_panic_becomes_openai_api_error() {
        let response = server().post("/v1/chat/completions").await;
        response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);

        let body: Value = response.json();
        assert_eq!(body["error"]["type"], "api_error");
        assert_eq!(body["error"]["message"], "Internal server error");
    }

    #[tokio::test]
    async fn test_healthy_handler_untouched() {
        let response = server().get("/v1/models").await;
        response.assert_status_ok();
        assert_eq!(response.text(), "ok");
    }

    #[test]
    fn test_panic_message_payloads() {
        let owned: Box<dyn Any + Send> = Box::new("boom".to_string());
        assert_eq!(panic_message(owned.as_ref()), "boom");
        let other: Box<dyn Any + Send> = Box::new(7_u8);
        assert_eq!(panic_message(other.as_ref()), "unknown panic");
    }
}
