//! Error envelopes.
//!
//! Every failure on the request path leaves the gateway as a JSON envelope
//! shaped for the protocol of the route that was called:
//!
//! - OpenAI: `{"error": {"message", "type", "param", "code"}}`
//! - Anthropic: `{"type": "error", "error": {"type", "message"}}`
//!
//! Upstream non-2xx bodies on OpenAI routes are passed through unchanged when
//! they are JSON, or wrapped as `{"error": {"message": <raw text>}}` otherwise.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use bytes::Bytes;
use llmgate_types::{ApiProtocol, ErrorKind, GatewayError};
use serde_json::{json, Value};

/// Anthropic error `type` for an upstream HTTP status.
pub fn anthropic_error_type(status: u16) -> &'static str {
    match status {
        400 => "invalid_request_error",
        401 => "authentication_error",
        403 => "permission_error",
        404 => "not_found_error",
        429 => "rate_limit_error",
        529 => "overloaded_error",
        _ => "api_error",
    }
}

/// A protocol-shaped error body plus its HTTP status.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorEnvelope {
    pub status: StatusCode,
    pub kind: String,
    pub message: String,
    pub protocol: ApiProtocol,
    pub param: Option<String>,
    pub code: Option<String>,
    /// Upstream body forwarded verbatim (OpenAI routes only)
    pub passthrough: Option<Value>,
}

impl ErrorEnvelope {
    pub fn new(status: StatusCode, kind: ErrorKind, message: impl Into<String>, protocol: ApiProtocol) -> Self {
        Self {
            status,
            kind: kind.as_str().to_string(),
            message: message.into(),
            protocol,
            param: None,
            code: None,
            passthrough: None,
        }
    }

    /// Map a request-path failure onto the envelope for `protocol`.
    pub fn from_error(err: &GatewayError, protocol: ApiProtocol) -> Self {
        let status =
            StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let mut envelope = Self::new(status, err.kind(), err.to_string(), protocol);

        match err {
            GatewayError::Validation { param, .. } => envelope.param = param.clone(),
            GatewayError::ModelNotFound { .. } => {
                envelope.param = Some("model".to_string());
                envelope.code = Some("model_not_found".to_string());
            },
            GatewayError::Connection { .. } => {
                envelope.code = Some("target_connection_failed".to_string());
            },
            GatewayError::InvalidResponse { message, preview } => {
                envelope.message = format!("{message}. Body preview: {preview}");
            },
            GatewayError::Upstream { status, body } => {
                return Self::from_upstream(*status, body, protocol);
            },
            _ => {},
        }
        envelope
    }

    fn from_upstream(status: u16, body: &str, protocol: ApiProtocol) -> Self {
        let http_status = StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY);
        let parsed = serde_json::from_str::<Value>(body).ok();
        let message = parsed
            .as_ref()
            .and_then(upstream_message)
            .unwrap_or_else(|| body.to_string());

        let mut envelope = Self::new(http_status, ErrorKind::ApiError, message, protocol);
        match protocol {
            ApiProtocol::OpenAI => {
                envelope.passthrough =
                    Some(parsed.unwrap_or_else(|| json!({ "error": { "message": body } })));
            },
            ApiProtocol::Anthropic => {
                envelope.kind = anthropic_error_type(status).to_string();
            },
        }
        envelope
    }

    pub fn body(&self) -> Value {
        if let Some(passthrough) = &self.passthrough {
            return passthrough.clone();
        }
        match self.protocol {
            ApiProtocol::OpenAI => json!({
                "error": {
                    "message": self.message,
                    "type": self.kind,
                    "param": self.param,
                    "code": self.code,
                }
            }),
            ApiProtocol::Anthropic => json!({
                "type": "error",
                "error": {
                    "type": self.kind,
                    "message": self.message,
                }
            }),
        }
    }

    /// Terminal in-band event for a stream that has already started.
    pub fn to_sse_event(&self) -> Bytes {
        match self.protocol {
            ApiProtocol::OpenAI => Bytes::from(format!("data: {}\n\n", self.body())),
            ApiProtocol::Anthropic => Bytes::from(format!("event: error\ndata: {}\n\n", self.body())),
        }
    }
}

impl IntoResponse for ErrorEnvelope {
    fn into_response(self) -> Response {
        (self.status, Json(self.body())).into_response()
    }
}

/// Pull a human-readable message out of a JSON error body.
fn upstream_message(body: &Value) -> Option<String> {
    body.pointer("/error/message")
        .or_else(|| body.get("message"))
        .or_else(|| body.get("error").filter(|e| e.is_string()))
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// A `GatewayError` bound to the protocol of the route that produced it.
#[derive(Debug, Clone)]
pub struct ProtocolError {
    pub error: GatewayError,
    pub protocol: ApiProtocol,
}

impl ProtocolError {
    pub fn new(error: GatewayError, protocol: ApiProtocol) -> Self {
        Self { error, protocol }
    }

    pub fn envelope(&self) -> ErrorEnvelope {
        ErrorEnvelope::from_error(&self.error, self.protocol)
    }
}

impl IntoResponse for ProtocolError {
    fn into_response(self) -> Response {
        if self.error.is_client_error() {
            tracing::debug!("[{}] Rejected: {}", self.protocol, self.error);
        } else {
            tracing::error!("[{}] Request failed: {}", self.protocol, self.error);
        }
        self.envelope().into_response()
    }
}

/// Bind a result's `GatewayError` to a protocol: `parse(body).on(protocol)?`.
pub trait OnProtocol<T> {
    fn on(self, protocol: ApiProtocol) -> Result<T, ProtocolError>;
}

impl<T> OnProtocol<T> for Result<T, GatewayError> {
    fn on(self, protocol: ApiProtocol) -> Result<T, ProtocolError> {
        self.map_err(|error| ProtocolError::new(error, protocol))
    }
}
