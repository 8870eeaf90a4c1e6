// Claude Handler
use axum::{extract::State, response::IntoResponse, response::Response, Json};
use bytes::Bytes;
use llmgate_types::{ApiProtocol, GatewayError};

use super::{build_sse_response, trace_id, with_mapping_headers};
use crate::error::{OnProtocol, ProtocolError};
use crate::proxy::mappers::claude::{
    translate_chat_response, translate_messages_request, AnthropicTranscoder,
};
use crate::proxy::relay::{relay_stream, StreamInspector};
use crate::proxy::server::AppState;
use crate::proxy::upstream::UpstreamRoute;

const PROTOCOL: ApiProtocol = ApiProtocol::Anthropic;

/// `/v1/messages`: translate to a canonical chat request, forward, translate back.
pub async fn handle_messages(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Response, ProtocolError> {
    let translated = translate_messages_request(
        &body,
        &state.config.models.aliases,
        &state.config.translation,
    )
    .on(PROTOCOL)?;

    let trace_id = trace_id("msg");
    let stream = translated.request.stream;
    tracing::info!(
        "[{}] Claude request | model: {} -> {} ({}) | stream: {} | messages: {}",
        trace_id,
        translated.requested_model,
        translated.route.model,
        translated.route.reason,
        stream,
        translated.request.messages.len()
    );

    let body = serde_json::to_value(&translated.request)
        .map_err(|e| GatewayError::internal(format!("failed to encode request: {e}")))
        .on(PROTOCOL)?;

    let response = if stream {
        let upstream = state
            .upstream
            .send_stream(UpstreamRoute::ChatCompletions, body)
            .await
            .on(PROTOCOL)?;
        let inspector = StreamInspector::new(trace_id, state.config.stream_limits);
        let transcoder = AnthropicTranscoder::new(translated.requested_model.as_str());
        build_sse_response(relay_stream(upstream, inspector, transcoder))
    } else {
        let upstream = state
            .upstream
            .send(UpstreamRoute::ChatCompletions, body)
            .await
            .on(PROTOCOL)?;
        let message = translate_chat_response(upstream, &translated.requested_model).on(PROTOCOL)?;
        tracing::debug!(
            "[{}] Claude response | stop_reason: {} | output_tokens: {}",
            trace_id,
            message.stop_reason,
            message.usage.output_tokens
        );
        Json(message).into_response()
    };

    Ok(with_mapping_headers(response, &translated.route))
}
