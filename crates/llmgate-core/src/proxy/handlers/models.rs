use axum::{
    extract::{Path, State},
    Json,
};
use llmgate_types::models::ModelConfig;
use llmgate_types::{ApiProtocol, GatewayError};
use serde::Serialize;

use crate::error::ProtocolError;
use crate::proxy::server::AppState;

/// Fixed creation stamp advertised for every model.
const MODEL_CREATED: i64 = 1_687_882_410;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ModelEntry {
    pub id: String,
    pub object: &'static str,
    pub created: i64,
    pub owned_by: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModelList {
    pub object: &'static str,
    pub data: Vec<ModelEntry>,
}

fn entry(id: &str, owned_by: &'static str) -> ModelEntry {
    ModelEntry { id: id.to_string(), object: "model", created: MODEL_CREATED, owned_by }
}

/// Advertised models followed by alias names; wildcard patterns are not listed.
pub fn list_models(models: &ModelConfig) -> Vec<ModelEntry> {
    let mut entries: Vec<ModelEntry> =
        models.available_models.iter().map(|id| entry(id, "openai")).collect();
    for alias in models.aliases.keys() {
        if alias.contains('*') || entries.iter().any(|e| &e.id == alias) {
            continue;
        }
        entries.push(entry(alias, "alias"));
    }
    entries
}

pub async fn handle_list_models(State(state): State<AppState>) -> Json<ModelList> {
    Json(ModelList { object: "list", data: list_models(&state.config.models) })
}

pub async fn handle_get_model(
    State(state): State<AppState>,
    Path(model_id): Path<String>,
) -> Result<Json<ModelEntry>, ProtocolError> {
    list_models(&state.config.models)
        .into_iter()
        .find(|m| m.id == model_id)
        .map(Json)
        .ok_or_else(|| {
            ProtocolError::new(GatewayError::ModelNotFound { model: model_id }, ApiProtocol::OpenAI)
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_aliases_listed_after_models() {
        let models = ModelConfig {
            default_model: "gpt-4".to_string(),
            available_models: vec!["gpt-4".to_string(), "gpt-4o".to_string()],
            aliases: BTreeMap::from([
                ("claude-*".to_string(), "gpt-4o".to_string()),
                ("claude-haiku".to_string(), "gpt-4o-mini".to_string()),
                ("gpt-4".to_string(), "gpt-4o".to_string()),
            ]),
        };
        let ids: Vec<_> = list_models(&models).into_iter().map(|m| (m.id, m.owned_by)).collect();
        assert_eq!(
            ids,
            vec![
                ("gpt-4".to_string(), "openai"),
                ("gpt-4o".to_string(), "openai"),
                ("claude-haiku".to_string(), "alias"),
            ]
        );
    }
}
