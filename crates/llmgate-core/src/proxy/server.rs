use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use llmgate_types::{ConfigError, GatewayConfig};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::proxy::credentials::CredentialManager;
use crate::proxy::middleware::AccessGate;
use crate::proxy::monitor::{ObservabilityHook, RequestLogStore, ServerEventLog};
use crate::proxy::upstream::{build_http_client, ChatUpstream, HttpUpstream, PlaceholderUpstream};

/// Request bodies above this are rejected before buffering.
pub const MAX_BODY_BYTES: usize = 100 * 1024 * 1024;

/// Everything a request needs, built once at startup.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<GatewayConfig>,
    pub gate: Arc<AccessGate>,
    pub credentials: Arc<CredentialManager>,
    pub upstream: Arc<dyn ChatUpstream>,
    pub hook: Arc<dyn ObservabilityHook>,
}

/// Composition root: the request state plus handles the binary keeps for itself.
pub struct GatewayContext {
    pub state: AppState,
    pub log_store: Arc<RequestLogStore>,
    pub events: Arc<ServerEventLog>,
}

impl GatewayContext {
    pub fn build(config: GatewayConfig) -> Result<Self, ConfigError> {
        config.check()?;

        let http = build_http_client()?;
        let events = Arc::new(ServerEventLog::new(config.log_capacity));
        let credentials = Arc::new(CredentialManager::from_config(
            &config,
            http.clone(),
            Arc::clone(&events),
        ));
        let upstream: Arc<dyn ChatUpstream> = if config.placeholder_mode {
            tracing::warn!("Placeholder mode enabled: requests will not reach the target endpoint");
            events.warn("Placeholder mode enabled", None);
            Arc::new(PlaceholderUpstream)
        } else {
            Arc::new(HttpUpstream::new(http, config.upstream.clone(), Arc::clone(&credentials)))
        };
        let log_store = Arc::new(RequestLogStore::new(config.log_capacity));

        let state = AppState {
            gate: Arc::new(AccessGate::new(config.access_token.clone())),
            config: Arc::new(config),
            credentials,
            upstream,
            hook: log_store.clone(),
        };
        Ok(Self { state, log_store, events })
    }
}

pub fn build_router(state: AppState) -> Router {
    build_router_with(state, Router::new())
}

/// Gateway routes plus `extra` (already stated), all behind the same middleware stack.
pub fn build_router_with(state: AppState, extra: Router) -> Router {
    use crate::proxy::{handlers, middleware};

    Router::new()
        .route("/health", get(handlers::handle_health))
        // OpenAI Protocol
        .route("/v1/models", get(handlers::models::handle_list_models))
        .route("/v1/models/:model_id", get(handlers::models::handle_get_model))
        .route("/v1/chat/completions", post(handlers::openai::handle_chat_completions))
        .route("/v1/completions", post(handlers::openai::handle_completions))
        // Anthropic Protocol
        .route("/v1/messages", post(handlers::claude::handle_messages))
        .with_state(state.clone())
        .merge(extra)
        .fallback(handlers::handle_not_found)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::monitor::monitor_middleware,
        ))
        .layer(axum::middleware::from_fn_with_state(state, middleware::auth::auth_middleware))
        .layer(axum::middleware::from_fn(middleware::recover::recover_middleware))
        .layer(TraceLayer::new_for_http())
}
