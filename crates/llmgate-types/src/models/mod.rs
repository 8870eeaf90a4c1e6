//! Gateway configuration and observability records.

mod config;
mod log;

pub use config::{
    GatewayConfig, MissingCredentialPolicy, ModelConfig, OAuthConfig, StreamLimits,
    TranslationPolicy, UpstreamConfig,
};
pub use log::{ApiCallRecord, EventLevel, ServerEvent};
