//! OpenAI passthrough adapter.
//!
//! Requests already arrive in canonical shape. The adapter only validates the
//! required fields and applies the optional normalizations; the upstream
//! response goes back to the client unchanged.

use llmgate_types::models::TranslationPolicy;
use llmgate_types::GatewayError;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

pub(crate) fn parse_json_body(body: &[u8]) -> Result<Value, GatewayError> {
    serde_json::from_slice(body)
        .map_err(|e| GatewayError::validation(format!("Invalid JSON body: {e}"), None))
}

pub(crate) fn require_model(body: &Value) -> Result<(), GatewayError> {
    match body.get("model").and_then(Value::as_str) {
        Some(model) if !model.is_empty() => Ok(()),
        _ => Err(GatewayError::validation("you must provide a model parameter", Some("model"))),
    }
}

/// `messages` must be an array; `allow_empty` leaves the emptiness check to the caller.
pub(crate) fn require_messages(body: &Value, allow_empty: bool) -> Result<(), GatewayError> {
    match body.get("messages").and_then(Value::as_array) {
        Some(messages) if allow_empty || !messages.is_empty() => Ok(()),
        _ => Err(GatewayError::validation(
            "you must provide a messages parameter",
            Some("messages"),
        )),
    }
}

pub(crate) fn into_typed<T: DeserializeOwned>(body: Value) -> Result<T, GatewayError> {
    serde_json::from_value(body)
        .map_err(|e| GatewayError::validation(format!("Invalid request body: {e}"), None))
}

/// A validated passthrough body and the fields the gateway logs.
#[derive(Debug, Clone, PartialEq)]
pub struct PassthroughRequest {
    pub model: String,
    pub stream: bool,
    /// Chat messages in the body; zero for prompt completions
    pub messages: usize,
    /// What goes upstream: the client's JSON with only the policy edits applied
    pub body: Value,
}

fn into_passthrough(value: Value, policy: &TranslationPolicy) -> Result<PassthroughRequest, GatewayError> {
    let Value::Object(mut body) = value else {
        return Err(GatewayError::validation("Request body must be a JSON object", None));
    };
    apply_policy(&mut body, policy);

    let model = body.get("model").and_then(Value::as_str).unwrap_or_default().to_string();
    let stream = body.get("stream").and_then(Value::as_bool).unwrap_or(false);
    let messages = body.get("messages").and_then(Value::as_array).map_or(0, Vec::len);
    Ok(PassthroughRequest { model, stream, messages, body: Value::Object(body) })
}

/// Fill a missing output-token limit and drop a zero temperature, as configured.
/// Every other field is left exactly as the client sent it.
fn apply_policy(body: &mut Map<String, Value>, policy: &TranslationPolicy) {
    let has_limit = ["max_tokens", "max_completion_tokens"]
        .iter()
        .any(|key| body.get(*key).is_some_and(|v| !v.is_null()));
    if let (false, Some(default)) = (has_limit, policy.default_max_tokens) {
        body.insert("max_tokens".to_string(), Value::from(default));
    }

    if policy.strip_zero_temperature
        && body.get("temperature").and_then(Value::as_f64) == Some(0.0)
    {
        tracing::debug!("Stripping temperature=0");
        body.remove("temperature");
    }
}

/// Validate and normalize a `/v1/chat/completions` body.
pub fn normalize_chat_request(
    body: &[u8],
    policy: &TranslationPolicy,
) -> Result<PassthroughRequest, GatewayError> {
    let value = parse_json_body(body)?;
    require_model(&value)?;
    require_messages(&value, false)?;
    into_passthrough(value, policy)
}

/// Validate and normalize a `/v1/completions` body. Only `model` is required.
pub fn normalize_completion_request(
    body: &[u8],
    policy: &TranslationPolicy,
) -> Result<PassthroughRequest, GatewayError> {
    let value = parse_json_body(body)?;
    require_model(&value)?;
    into_passthrough(value, policy)
}
