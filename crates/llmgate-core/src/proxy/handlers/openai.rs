// OpenAI Handler
use axum::{extract::State, response::IntoResponse, response::Response, Json};
use bytes::Bytes;
use llmgate_types::ApiProtocol;

use super::{build_sse_response, trace_id};
use crate::error::{OnProtocol, ProtocolError};
use crate::proxy::mappers::openai::{
    normalize_chat_request, normalize_completion_request, PassthroughRequest,
};
use crate::proxy::relay::{relay_stream, Passthrough, StreamInspector};
use crate::proxy::server::AppState;
use crate::proxy::upstream::UpstreamRoute;

const PROTOCOL: ApiProtocol = ApiProtocol::OpenAI;

pub async fn handle_chat_completions(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Response, ProtocolError> {
    let request = normalize_chat_request(&body, &state.config.translation).on(PROTOCOL)?;
    let trace_id = trace_id("oai");
    tracing::info!(
        "[{}] Chat completion | model: {} | stream: {} | messages: {}",
        trace_id,
        request.model,
        request.stream,
        request.messages
    );
    forward(&state, UpstreamRoute::ChatCompletions, request, trace_id).await
}

pub async fn handle_completions(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Response, ProtocolError> {
    let request = normalize_completion_request(&body, &state.config.translation).on(PROTOCOL)?;
    let trace_id = trace_id("oai");
    tracing::info!(
        "[{}] Completion | model: {} | stream: {}",
        trace_id,
        request.model,
        request.stream
    );
    forward(&state, UpstreamRoute::Completions, request, trace_id).await
}

/// Forward a passthrough request; the upstream answer goes back unchanged.
async fn forward(
    state: &AppState,
    route: UpstreamRoute,
    request: PassthroughRequest,
    trace_id: String,
) -> Result<Response, ProtocolError> {
    let PassthroughRequest { stream, body, .. } = request;

    if stream {
        let upstream = state.upstream.send_stream(route, body).await.on(PROTOCOL)?;
        let inspector = StreamInspector::new(trace_id, state.config.stream_limits);
        return Ok(build_sse_response(relay_stream(upstream, inspector, Passthrough)));
    }

    let response = state.upstream.send(route, body).await.on(PROTOCOL)?;
    tracing::debug!("[{}] Upstream response received", trace_id);
    Ok(Json(response).into_response())
}
