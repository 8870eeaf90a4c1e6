use clap::builder::BoolishValueParser;
use clap::Parser;
use llmgate_types::models::{
    GatewayConfig, MissingCredentialPolicy, ModelConfig, OAuthConfig, StreamLimits,
    TranslationPolicy, UpstreamConfig,
};
use llmgate_types::ConfigError;
use rand::RngCore;

#[derive(Parser, Debug)]
#[command(
    name = "llmgate",
    about = "llmgate - OpenAI/Anthropic compatible LLM gateway",
    version = env!("CARGO_PKG_VERSION"),
    author
)]
pub struct Cli {
    #[arg(short, long, env = "PROXY_PORT", default_value = "3000")]
    pub port: u16,

    #[arg(long, env = "PROXY_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Bearer secret clients must present; generated when absent
    #[arg(long, env = "PROXY_ACCESS_TOKEN", hide_env_values = true)]
    pub access_token: Option<String>,

    #[arg(short, long, env = "RUST_LOG", default_value = "info")]
    pub log_level: String,

    // Upstream
    #[arg(long, env = "TARGET_ENDPOINT", default_value = "https://your-llm-endpoint.com/v1")]
    pub target_endpoint: String,

    #[arg(long, env = "TARGET_API_KEY", hide_env_values = true)]
    pub target_api_key: Option<String>,

    #[arg(long, env = "UPSTREAM_TIMEOUT_SECS", default_value = "120")]
    pub upstream_timeout_secs: u64,

    #[arg(long, env = "UPSTREAM_STREAM_TIMEOUT_SECS", default_value = "1800")]
    pub upstream_stream_timeout_secs: u64,

    #[arg(long, env = "MISSING_CREDENTIAL_POLICY", default_value = "proceed")]
    pub missing_credential_policy: MissingCredentialPolicy,

    #[arg(
        long,
        env = "USE_PLACEHOLDER_MODE",
        default_value = "false",
        value_parser = BoolishValueParser::new()
    )]
    pub use_placeholder_mode: bool,

    // OAuth client credentials
    #[arg(long, env = "OAUTH_TOKEN_ENDPOINT")]
    pub oauth_token_endpoint: Option<String>,

    #[arg(long, env = "OAUTH_CLIENT_ID")]
    pub oauth_client_id: Option<String>,

    #[arg(long, env = "OAUTH_CLIENT_SECRET", hide_env_values = true)]
    pub oauth_client_secret: Option<String>,

    #[arg(long, env = "OAUTH_SCOPE")]
    pub oauth_scope: Option<String>,

    #[arg(long, env = "OAUTH_REFRESH_BUFFER_MINUTES", default_value = "5")]
    pub oauth_refresh_buffer_minutes: u64,

    // Models and translation
    #[arg(
        long,
        env = "AVAILABLE_MODELS",
        default_value = "gpt-4,gpt-4-turbo,gpt-4o,gpt-4o-mini,gpt-3.5-turbo"
    )]
    pub available_models: String,

    #[arg(long, env = "DEFAULT_MODEL", default_value = "gpt-4")]
    pub default_model: String,

    #[arg(long, env = "DEFAULT_MAX_TOKENS")]
    pub default_max_tokens: Option<u32>,

    /// `from=to` pairs, comma separated; `from` may contain one `*`
    #[arg(long, env = "MODEL_ALIASES", default_value = "")]
    pub model_aliases: String,

    #[arg(
        long,
        env = "STRIP_ZERO_TEMPERATURE",
        default_value = "false",
        value_parser = BoolishValueParser::new()
    )]
    pub strip_zero_temperature: bool,

    // Stream diagnostics
    #[arg(long, env = "CONTEXT_NEAR_LIMIT_TOKENS", default_value = "100000")]
    pub context_near_limit_tokens: u64,

    #[arg(long, env = "CONTEXT_HARD_LIMIT_TOKENS", default_value = "128000")]
    pub context_hard_limit_tokens: u64,

    #[arg(long, env = "LOG_CAPACITY", default_value = "100")]
    pub log_capacity: usize,
}

/// `llm-proxy-` followed by 64 hex characters.
pub fn generate_access_token() -> String {
    let mut bytes = [0_u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    let hex: String = bytes.iter().map(|b| format!("{b:02x}")).collect();
    format!("llm-proxy-{hex}")
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

impl Cli {
    /// Assemble and validate the gateway configuration.
    pub fn into_config(self) -> Result<GatewayConfig, ConfigError> {
        let access_token =
            non_empty(self.access_token).unwrap_or_else(generate_access_token);

        let config = GatewayConfig {
            host: self.host,
            port: self.port,
            access_token,
            upstream: UpstreamConfig {
                endpoint: self.target_endpoint.trim_end_matches('/').to_string(),
                api_key: non_empty(self.target_api_key),
                timeout_secs: self.upstream_timeout_secs,
                stream_timeout_secs: self.upstream_stream_timeout_secs,
                missing_credential_policy: self.missing_credential_policy,
            },
            oauth: OAuthConfig {
                token_endpoint: non_empty(self.oauth_token_endpoint),
                client_id: non_empty(self.oauth_client_id),
                client_secret: non_empty(self.oauth_client_secret),
                scope: non_empty(self.oauth_scope),
                refresh_buffer_minutes: self.oauth_refresh_buffer_minutes,
            },
            models: ModelConfig {
                default_model: self.default_model,
                available_models: ModelConfig::parse_list(&self.available_models),
                aliases: ModelConfig::parse_aliases(&self.model_aliases)?,
            },
            translation: TranslationPolicy {
                strip_zero_temperature: self.strip_zero_temperature,
                default_max_tokens: self.default_max_tokens,
            },
            stream_limits: StreamLimits {
                near_limit_tokens: self.context_near_limit_tokens,
                hard_limit_tokens: self.context_hard_limit_tokens,
            },
            placeholder_mode: self.use_placeholder_mode,
            log_capacity: self.log_capacity,
        };
        config.check()?;
        Ok(config)
    }
}
