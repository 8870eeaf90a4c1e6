use llmgate_core::proxy::{AccessGate, CredentialManager, RequestLogStore, ServerEventLog};
use llmgate_core::GatewayContext;
use llmgate_types::GatewayConfig;
use std::sync::Arc;

/// Handles the dashboard API reads from; shared with the gateway routes.
#[derive(Clone)]
pub struct ApiState {
    pub config: Arc<GatewayConfig>,
    pub gate: Arc<AccessGate>,
    pub credentials: Arc<CredentialManager>,
    pub log_store: Arc<RequestLogStore>,
    pub events: Arc<ServerEventLog>,
}

impl ApiState {
    pub fn from_context(context: &GatewayContext) -> Self {
        Self {
            config: Arc::clone(&context.state.config),
            gate: Arc::clone(&context.state.gate),
            credentials: Arc::clone(&context.state.credentials),
            log_store: Arc::clone(&context.log_store),
            events: Arc::clone(&context.events),
        }
    }
}
