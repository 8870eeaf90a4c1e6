// Records every `/v1/*` call to the observability hook exactly once.
// Streaming calls are recorded when the relayed body ends or the client goes away.

use axum::{
    body::Body,
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::{IntoResponse, Response},
};
use futures::StreamExt;
use llmgate_types::{ApiProtocol, GatewayError};
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;

use crate::error::ProtocolError;
use crate::proxy::handlers::MAPPED_MODEL_HEADER;
use crate::proxy::monitor::{ApiCallRecord, ObservabilityHook};
use crate::proxy::server::{AppState, MAX_BODY_BYTES};

/// Logged bodies are cut to this many characters.
const MAX_LOGGED_BODY_CHARS: usize = 16 * 1024;

fn truncate_for_log(bytes: &[u8]) -> Option<String> {
    if bytes.is_empty() {
        return None;
    }
    let text = String::from_utf8_lossy(bytes);
    match text.char_indices().nth(MAX_LOGGED_BODY_CHARS) {
        Some((idx, _)) => Some(format!("{}...", &text[..idx])),
        None => Some(text.into_owned()),
    }
}

/// A record that is emitted once: by `finish`, or on drop if never finished.
struct PendingRecord {
    record: Option<ApiCallRecord>,
    hook: Arc<dyn ObservabilityHook>,
    start: Instant,
}

impl PendingRecord {
    fn finish(&mut self) {
        if let Some(mut record) = self.record.take() {
            record.duration_ms = self.start.elapsed().as_millis() as u64;
            self.hook.record(record);
        }
    }
}

impl Drop for PendingRecord {
    fn drop(&mut self) {
        self.finish();
    }
}

pub async fn monitor_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();
    if !path.starts_with("/v1/") {
        return next.run(request).await;
    }

    let protocol = ApiProtocol::for_path(&path);
    let start = Instant::now();
    let method = request.method().to_string();
    let mut model = None;
    let mut request_body = None;

    let request = if request.method() == axum::http::Method::POST {
        let (parts, body) = request.into_parts();
        match axum::body::to_bytes(body, MAX_BODY_BYTES).await {
            Ok(bytes) => {
                model = serde_json::from_slice::<Value>(&bytes)
                    .ok()
                    .and_then(|v| v.get("model").and_then(Value::as_str).map(str::to_string));
                request_body = truncate_for_log(&bytes);
                Request::from_parts(parts, Body::from(bytes))
            },
            Err(e) => {
                let error = GatewayError::validation(
                    format!("Failed to read request body: {e}"),
                    None,
                );
                let response = ProtocolError::new(error, protocol).into_response();
                let mut pending = PendingRecord {
                    record: Some(ApiCallRecord {
                        id: uuid::Uuid::new_v4().to_string(),
                        timestamp: chrono::Utc::now().timestamp_millis(),
                        method,
                        path,
                        status: response.status().as_u16(),
                        duration_ms: 0,
                        model: None,
                        mapped_model: None,
                        request_body: None,
                        response_body: None,
                    }),
                    hook: Arc::clone(&state.hook),
                    start,
                };
                pending.finish();
                return response;
            },
        }
    } else {
        request
    };

    let response = next.run(request).await;

    let mapped_model = response
        .headers()
        .get(MAPPED_MODEL_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let is_sse = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.contains("text/event-stream"));

    let mut pending = PendingRecord {
        record: Some(ApiCallRecord {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: chrono::Utc::now().timestamp_millis(),
            method,
            path,
            status: response.status().as_u16(),
            duration_ms: 0,
            model,
            mapped_model,
            request_body,
            response_body: None,
        }),
        hook: Arc::clone(&state.hook),
        start,
    };

    if is_sse {
        let (parts, body) = response.into_parts();
        let mut upstream = body.into_data_stream();
        let stream = async_stream::stream! {
            while let Some(chunk) = upstream.next().await {
                yield chunk;
            }
            pending.finish();
        };
        return Response::from_parts(parts, Body::from_stream(stream));
    }

    let (parts, body) = response.into_parts();
    match axum::body::to_bytes(body, usize::MAX).await {
        Ok(bytes) => {
            if let Some(record) = pending.record.as_mut() {
                record.response_body = truncate_for_log(&bytes);
            }
            pending.finish();
            Response::from_parts(parts, Body::from(bytes))
        },
        Err(e) => {
            tracing::error!("Failed to buffer response body for logging: {}", e);
            if let Some(record) = pending.record.as_mut() {
                record.status = 500;
            }
            pending.finish();
            ProtocolError::new(GatewayError::internal("Failed to read response body"), protocol)
                .into_response()
        },
    }
}
