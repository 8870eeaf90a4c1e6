//! Canonical chat response -> Anthropic Messages response (non-streaming).

use llmgate_types::protocol::claude::{
    stop_reason_for, ClaudeRole, ClaudeUsage, ContentBlock, MessagesResponse,
};
use llmgate_types::protocol::openai::ChatCompletionResponse;
use llmgate_types::GatewayError;
use serde_json::Value;

/// Rewrite an OpenAI-style id (`chatcmpl-abc`) into the Anthropic convention (`msg_abc`).
pub fn message_id(upstream_id: &str) -> String {
    let suffix = upstream_id
        .strip_prefix("chatcmpl-")
        .or_else(|| upstream_id.strip_prefix("cmpl-"))
        .unwrap_or(upstream_id);
    if suffix.is_empty() {
        format!("msg_{}", uuid::Uuid::new_v4().simple())
    } else {
        format!("msg_{suffix}")
    }
}

pub fn transform_response(
    response: &ChatCompletionResponse,
    requested_model: &str,
) -> Result<MessagesResponse, GatewayError> {
    let choice = response.choices.first().ok_or_else(|| {
        GatewayError::invalid_response(
            "Upstream response has no choices",
            &serde_json::to_string(response).unwrap_or_default(),
        )
    })?;

    let usage = response.usage.unwrap_or_default();
    Ok(MessagesResponse {
        id: message_id(&response.id),
        object: "message".to_string(),
        role: ClaudeRole::Assistant,
        model: requested_model.to_string(),
        content: vec![ContentBlock::text(choice.message.content.clone().unwrap_or_default())],
        stop_reason: stop_reason_for(choice.finish_reason.as_deref()).to_string(),
        stop_sequence: None,
        usage: ClaudeUsage {
            input_tokens: usage.prompt_tokens,
            output_tokens: usage.completion_tokens,
        },
    })
}

/// Parse the upstream JSON body and map it, reporting shape mismatches as invalid responses.
pub fn translate_chat_response(
    body: Value,
    requested_model: &str,
) -> Result<MessagesResponse, GatewayError> {
    let preview = body.to_string();
    let response: ChatCompletionResponse = serde_json::from_value(body).map_err(|e| {
        GatewayError::invalid_response(
            format!("Upstream response is not a chat completion: {e}"),
            &preview,
        )
    })?;
    transform_response(&response, requested_model)
}
