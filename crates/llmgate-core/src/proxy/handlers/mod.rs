//! HTTP handlers. Each returns `Result<Response, ProtocolError>` so failures
//! render in the calling route's wire format.

pub mod claude;
pub mod models;
pub mod openai;

use axum::body::Body;
use axum::http::{header, HeaderValue, Method, Uri};
use axum::response::{IntoResponse, Response};
use axum::Json;
use bytes::Bytes;
use futures::Stream;
use llmgate_types::{ApiProtocol, GatewayError};
use serde_json::json;
use std::convert::Infallible;

use crate::error::ProtocolError;
use crate::proxy::mappers::model_mapping::ModelRoute;

pub const MAPPED_MODEL_HEADER: &str = "x-mapped-model";
pub const MAPPING_REASON_HEADER: &str = "x-mapping-reason";

pub async fn handle_health() -> Response {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
    .into_response()
}

pub async fn handle_not_found(method: Method, uri: Uri) -> ProtocolError {
    let path = uri.path().to_string();
    ProtocolError::new(
        GatewayError::RouteNotFound { method: method.to_string(), path: path.clone() },
        ApiProtocol::for_path(&path),
    )
}

/// Wrap a relay stream as a `text/event-stream` response.
pub fn build_sse_response<S>(stream: S) -> Response
where
    S: Stream<Item = Result<Bytes, Infallible>> + Send + 'static,
{
    let mut response = Response::new(Body::from_stream(stream));
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/event-stream"));
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
    response
}

/// Attach `X-Mapped-Model` / `X-Mapping-Reason`.
pub fn with_mapping_headers(mut response: Response, route: &ModelRoute) -> Response {
    let headers = response.headers_mut();
    if let Ok(v) = HeaderValue::from_str(&route.model) {
        headers.insert(MAPPED_MODEL_HEADER, v);
    }
    if let Ok(v) = HeaderValue::from_str(&route.reason) {
        headers.insert(MAPPING_REASON_HEADER, v);
    }
    response
}

/// Per-call id used as the log prefix, e.g. `oai_1718000000123456`.
pub(crate) fn trace_id(prefix: &str) -> String {
    format!("{}_{}", prefix, chrono::Utc::now().timestamp_micros())
}
