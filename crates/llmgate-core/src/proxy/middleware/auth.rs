use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, Method},
    middleware::Next,
    response::{IntoResponse, Response},
};
use llmgate_types::{ApiProtocol, GatewayError};
use subtle::ConstantTimeEq;

use crate::error::ProtocolError;
use crate::proxy::server::AppState;

/// Checks the gateway bearer secret. Runs before any other work on a request.
pub struct AccessGate {
    secret: String,
}

impl AccessGate {
    pub fn new(secret: impl Into<String>) -> Self {
        Self { secret: secret.into() }
    }

    pub fn authorize(&self, headers: &HeaderMap) -> Result<(), GatewayError> {
        let token = headers
            .get(header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .and_then(|s| s.strip_prefix("Bearer "))
            .ok_or_else(|| GatewayError::unauthorized("Missing or invalid Authorization header"))?;

        if !self.accepts(token) {
            return Err(GatewayError::unauthorized("Invalid access token"));
        }
        Ok(())
    }

    /// Whether `presented` is the configured secret.
    ///
    /// Timing depends on the secret's length only. An empty secret accepts nothing.
    fn accepts(&self, presented: &str) -> bool {
        let secret = self.secret.as_bytes();
        !secret.is_empty() && bool::from(secret.ct_eq(presented.as_bytes()))
    }

    /// First characters of the secret, for logs and the dashboard.
    pub fn secret_prefix(&self) -> String {
        let prefix: String = self.secret.chars().take(16).collect();
        format!("{prefix}...")
    }
}

fn is_health_check(path: &str) -> bool {
    path == "/health"
}

pub async fn auth_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path();
    if request.method() == Method::OPTIONS || is_health_check(path) {
        return next.run(request).await;
    }

    match state.gate.authorize(request.headers()) {
        Ok(()) => next.run(request).await,
        Err(e) => {
            tracing::warn!("Unauthorized request: {} {} ({})", request.method(), path, e);
            ProtocolError::new(e, ApiProtocol::for_path(path)).into_response()
        },
    }
}
