//! Dashboard API
//!
//! JSON endpoints for the request log, the server event log and a redacted
//! view of the running configuration. Mounted under `/api`, behind the
//! gateway's access gate.

use axum::{
    extract::{Query, State},
    response::Json,
    routing::get,
    Router,
};
use llmgate_core::proxy::{CredentialStatus, LogStats};
use llmgate_types::{ApiCallRecord, ServerEvent};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::state::ApiState;

pub fn router() -> Router<ApiState> {
    Router::new()
        .route("/logs", get(get_logs).delete(clear_logs))
        .route("/logs/api-calls", get(get_api_calls))
        .route("/logs/server-events", get(get_server_events))
        .route("/config", get(get_config))
}

#[derive(Debug, Deserialize)]
pub struct LogsQuery {
    pub limit: Option<usize>,
}

#[derive(Serialize)]
struct LogsResponse {
    api_calls: Vec<ApiCallRecord>,
    server_events: Vec<ServerEvent>,
    stats: LogStats,
}

async fn get_logs(State(state): State<ApiState>, Query(query): Query<LogsQuery>) -> Json<LogsResponse> {
    Json(LogsResponse {
        api_calls: state.log_store.get_logs(query.limit),
        server_events: state.events.get_events(query.limit),
        stats: state.log_store.stats(),
    })
}

async fn get_api_calls(
    State(state): State<ApiState>,
    Query(query): Query<LogsQuery>,
) -> Json<Vec<ApiCallRecord>> {
    Json(state.log_store.get_logs(query.limit))
}

async fn get_server_events(
    State(state): State<ApiState>,
    Query(query): Query<LogsQuery>,
) -> Json<Vec<ServerEvent>> {
    Json(state.events.get_events(query.limit))
}

/// Clears both logs. Call totals in `stats` keep counting.
async fn clear_logs(State(state): State<ApiState>) -> Json<serde_json::Value> {
    state.log_store.clear_logs();
    state.events.clear();
    tracing::info!("🧹 Request and server event logs cleared");
    Json(serde_json::json!({ "message": "Logs cleared" }))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ConfigResponse {
    local_port: u16,
    local_base_url: String,
    /// Prefix only; the full secret never leaves the process
    access_token: String,
    target_endpoint: String,
    use_placeholder_mode: bool,
    oauth_configured: bool,
    default_model: String,
    available_models: Vec<String>,
    model_aliases: BTreeMap<String, String>,
    credential: CredentialStatus,
}

async fn get_config(State(state): State<ApiState>) -> Json<ConfigResponse> {
    let config = &state.config;
    Json(ConfigResponse {
        local_port: config.port,
        local_base_url: format!("http://localhost:{}", config.port),
        access_token: state.gate.secret_prefix(),
        target_endpoint: config.upstream.endpoint.clone(),
        use_placeholder_mode: config.placeholder_mode,
        oauth_configured: config.oauth.is_configured(),
        default_model: config.models.default_model.clone(),
        available_models: config.models.available_models.clone(),
        model_aliases: config.models.aliases.clone(),
        credential: state.credentials.status(),
    })
}
