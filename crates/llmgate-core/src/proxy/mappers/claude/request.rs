//! Anthropic Messages request -> canonical chat request.

use llmgate_types::models::TranslationPolicy;
use llmgate_types::protocol::claude::{
    ClaudeContent, ClaudeMessage, ClaudeRole, ContentBlock, MessagesRequest, SystemPrompt,
};
use llmgate_types::protocol::openai::{
    ChatCompletionRequest, ChatMessage, OpenAIRole, StopSequences,
};
use llmgate_types::GatewayError;
use serde_json::Map;
use std::collections::BTreeMap;

use crate::proxy::mappers::model_mapping::{resolve_model_route, ModelRoute};
use crate::proxy::mappers::openai::{into_typed, parse_json_body, require_messages, require_model};

/// Canonical request plus what the reverse mapping needs to know.
#[derive(Debug, Clone)]
pub struct TranslatedRequest {
    pub request: ChatCompletionRequest,
    pub route: ModelRoute,
    /// Model name as the client sent it; echoed back in responses
    pub requested_model: String,
}

fn text_of_blocks(blocks: &[ContentBlock]) -> String {
    blocks
        .iter()
        .filter_map(|block| match block {
            ContentBlock::Text { text } => Some(text.as_str()),
            ContentBlock::Other => None,
        })
        .collect()
}

fn system_messages(system: Option<&SystemPrompt>) -> Vec<ChatMessage> {
    match system {
        Some(SystemPrompt::Text(text)) if !text.is_empty() => {
            vec![ChatMessage::text(OpenAIRole::System, text.as_str())]
        },
        Some(SystemPrompt::Blocks(blocks)) => blocks
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } if !text.is_empty() => {
                    Some(ChatMessage::text(OpenAIRole::System, text.as_str()))
                },
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

/// Reduce one message to plain text, or `None` when nothing forwardable is left.
fn convert_message(index: usize, message: &ClaudeMessage) -> Option<ChatMessage> {
    let text = match &message.content {
        ClaudeContent::Text(text) => text.clone(),
        ClaudeContent::Blocks(blocks) => text_of_blocks(blocks),
    };
    let role = match message.role {
        ClaudeRole::User => OpenAIRole::User,
        ClaudeRole::Assistant => OpenAIRole::Assistant,
    };

    if text.trim().is_empty() {
        tracing::warn!(
            "[Claude-Request] Dropping message {} ({:?}): no text content after reduction",
            index,
            role
        );
        return None;
    }
    Some(ChatMessage::text(role, text))
}

pub fn transform_claude_request(
    claude_req: &MessagesRequest,
    aliases: &BTreeMap<String, String>,
    policy: &TranslationPolicy,
) -> Result<TranslatedRequest, GatewayError> {
    let conversation: Vec<ChatMessage> = claude_req
        .messages
        .iter()
        .enumerate()
        .filter_map(|(index, message)| convert_message(index, message))
        .collect();
    if conversation.is_empty() {
        return Err(GatewayError::NoValidMessages);
    }

    let mut messages = system_messages(claude_req.system.as_ref());
    messages.extend(conversation);

    let route = resolve_model_route(&claude_req.model, aliases);
    let request = ChatCompletionRequest {
        model: route.model.clone(),
        messages,
        max_tokens: claude_req.max_tokens.or(policy.default_max_tokens),
        max_completion_tokens: None,
        // A literal 0 counts as unset.
        temperature: claude_req.temperature.filter(|t| *t > 0.0),
        top_p: claude_req.top_p,
        stop: claude_req.stop_sequences.clone().map(StopSequences::Many),
        stream: claude_req.stream,
        tools: None,
        tool_choice: None,
        extra: Map::new(),
    };

    Ok(TranslatedRequest { request, route, requested_model: claude_req.model.clone() })
}

/// Validate and translate a raw `/v1/messages` body.
pub fn translate_messages_request(
    body: &[u8],
    aliases: &BTreeMap<String, String>,
    policy: &TranslationPolicy,
) -> Result<TranslatedRequest, GatewayError> {
    let value = parse_json_body(body)?;
    require_model(&value)?;
    require_messages(&value, true)?;
    let claude_req: MessagesRequest = into_typed(value)?;
    transform_claude_request(&claude_req, aliases, policy)
}
