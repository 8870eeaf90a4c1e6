//! Request-path errors.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use super::CredentialError;

/// Wire-level error category carried in every error envelope.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidRequestError,
    ConnectionError,
    InvalidResponseError,
    ApiError,
}

impl ErrorKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidRequestError => "invalid_request_error",
            Self::ConnectionError => "connection_error",
            Self::InvalidResponseError => "invalid_response_error",
            Self::ApiError => "api_error",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that can occur while serving one inbound call.
#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "details")]
pub enum GatewayError {
    /// Missing or wrong gateway bearer secret
    #[error("{message}")]
    Unauthorized { message: String },

    /// Request body failed validation before translation
    #[error("{message}")]
    Validation { message: String, param: Option<String> },

    /// Anthropic request reduced to zero forwardable messages
    #[error("no valid messages")]
    NoValidMessages,

    /// Requested model id is not listed
    #[error("Model '{model}' not found")]
    ModelNotFound { model: String },

    /// No route matches the request path
    #[error("Unknown endpoint: {method} {path}")]
    RouteNotFound { method: String, path: String },

    /// Upstream answered with a non-2xx status; `body` is the raw upstream text
    #[error("Upstream returned {status}")]
    Upstream { status: u16, body: String },

    /// Upstream unreachable or timed out
    #[error("Failed to connect to target endpoint: {message}")]
    Connection { message: String },

    /// Upstream answered 2xx with a body that is not the expected format
    #[error("{message}")]
    InvalidResponse { message: String, preview: String },

    /// Policy requires an upstream credential and none could be obtained
    #[error("Upstream authorization unavailable: {0}")]
    CredentialUnavailable(#[from] CredentialError),

    /// Anything else
    #[error("{message}")]
    Internal { message: String },
}

impl GatewayError {
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized { message: message.into() }
    }

    pub fn validation(message: impl Into<String>, param: Option<&str>) -> Self {
        Self::Validation { message: message.into(), param: param.map(str::to_string) }
    }

    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection { message: message.into() }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal { message: message.into() }
    }

    /// Build an `InvalidResponse` carrying at most `PREVIEW_CHARS` characters of the raw body.
    pub fn invalid_response(message: impl Into<String>, raw: &str) -> Self {
        Self::InvalidResponse { message: message.into(), preview: body_preview(raw) }
    }

    /// HTTP status code for this error.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Unauthorized { .. } => 401,
            Self::Validation { .. } | Self::NoValidMessages => 400,
            Self::ModelNotFound { .. } | Self::RouteNotFound { .. } => 404,
            Self::Upstream { status, .. } => *status,
            Self::Connection { .. }
            | Self::InvalidResponse { .. }
            | Self::CredentialUnavailable(_)
            | Self::Internal { .. } => 500,
        }
    }

    /// Wire-level error kind for this error.
    ///
    /// `Upstream` reports `ApiError` here; envelopes for upstream failures
    /// prefer the upstream's own body when it has one.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Unauthorized { .. }
            | Self::Validation { .. }
            | Self::NoValidMessages
            | Self::ModelNotFound { .. }
            | Self::RouteNotFound { .. } => ErrorKind::InvalidRequestError,
            Self::Connection { .. } => ErrorKind::ConnectionError,
            Self::InvalidResponse { .. } => ErrorKind::InvalidResponseError,
            Self::Upstream { .. } | Self::CredentialUnavailable(_) | Self::Internal { .. } => {
                ErrorKind::ApiError
            },
        }
    }

    /// Check if this is a client error (4xx equivalent).
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.http_status())
    }
}

/// Maximum characters of a raw upstream body echoed back in an error.
pub const PREVIEW_CHARS: usize = 500;

fn body_preview(raw: &str) -> String {
    match raw.char_indices().nth(PREVIEW_CHARS) {
        Some((cut, _)) => format!("{}...", &raw[..cut]),
        None => raw.to_string(),
    }
}
