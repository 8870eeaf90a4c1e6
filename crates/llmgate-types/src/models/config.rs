//! Gateway configuration model.
//!
//! Built once by the binary from CLI arguments and environment, validated,
//! then frozen inside the application context.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use validator::{Validate, ValidationError};

use crate::error::ConfigError;

/// What forwarding does when no upstream credential can be attached.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum MissingCredentialPolicy {
    /// Send the request without an `Authorization` header
    #[default]
    Proceed,
    /// Fail the call with a 500 `api_error`
    Reject,
}

impl fmt::Display for MissingCredentialPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MissingCredentialPolicy::Proceed => write!(f, "proceed"),
            MissingCredentialPolicy::Reject => write!(f, "reject"),
        }
    }
}

impl FromStr for MissingCredentialPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "proceed" => Ok(Self::Proceed),
            "reject" => Ok(Self::Reject),
            other => Err(ConfigError::parse(
                "MISSING_CREDENTIAL_POLICY",
                format!("expected 'proceed' or 'reject', got '{other}'"),
            )),
        }
    }
}

/// Upstream LLM endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Validate)]
pub struct UpstreamConfig {
    /// Base URL including the version prefix, e.g. `https://host/v1`
    #[validate(url)]
    pub endpoint: String,
    /// Static bearer key, used when OAuth is absent or unavailable
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    #[validate(range(min = 1_u64, max = 3600_u64))]
    pub timeout_secs: u64,
    #[validate(range(min = 1_u64, max = 86400_u64))]
    pub stream_timeout_secs: u64,
    #[serde(default)]
    pub missing_credential_policy: MissingCredentialPolicy,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://your-llm-endpoint.com/v1".to_string(),
            api_key: None,
            timeout_secs: 120,
            stream_timeout_secs: 1800,
            missing_credential_policy: MissingCredentialPolicy::default(),
        }
    }
}

impl UpstreamConfig {
    /// Join a route suffix (`chat/completions`) onto the base URL.
    pub fn url(&self, suffix: &str) -> String {
        format!("{}/{}", self.endpoint.trim_end_matches('/'), suffix.trim_start_matches('/'))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn stream_timeout(&self) -> Duration {
        Duration::from_secs(self.stream_timeout_secs)
    }
}

/// OAuth client-credentials settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Validate)]
pub struct OAuthConfig {
    #[validate(url)]
    pub token_endpoint: Option<String>,
    pub client_id: Option<String>,
    #[serde(default, skip_serializing)]
    pub client_secret: Option<String>,
    pub scope: Option<String>,
    #[validate(range(max = 1440_u64))]
    pub refresh_buffer_minutes: u64,
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            token_endpoint: None,
            client_id: None,
            client_secret: None,
            scope: None,
            refresh_buffer_minutes: 5,
        }
    }
}

impl OAuthConfig {
    /// OAuth is live only when endpoint, client id and client secret are all non-empty.
    pub fn is_configured(&self) -> bool {
        [&self.token_endpoint, &self.client_id, &self.client_secret]
            .iter()
            .all(|v| v.as_deref().is_some_and(|s| !s.is_empty()))
    }

    pub fn refresh_buffer(&self) -> Duration {
        Duration::from_secs(self.refresh_buffer_minutes * 60)
    }
}

/// Advertised models and Anthropic model aliases.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Validate)]
pub struct ModelConfig {
    #[validate(length(min = 1_u64))]
    pub default_model: String,
    pub available_models: Vec<String>,
    /// `from -> to`; `from` may hold one `*` wildcard
    #[serde(default)]
    pub aliases: BTreeMap<String, String>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            default_model: "gpt-4".to_string(),
            available_models: Self::parse_list("gpt-4,gpt-4-turbo,gpt-4o,gpt-4o-mini,gpt-3.5-turbo"),
            aliases: BTreeMap::new(),
        }
    }
}

impl ModelConfig {
    /// Parse a comma-separated model list, dropping blanks.
    pub fn parse_list(raw: &str) -> Vec<String> {
        raw.split(',').map(str::trim).filter(|m| !m.is_empty()).map(str::to_string).collect()
    }

    /// Parse `from=to,from2=to2`.
    pub fn parse_aliases(raw: &str) -> Result<BTreeMap<String, String>, ConfigError> {
        let mut aliases = BTreeMap::new();
        for pair in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let Some((from, to)) = pair.split_once('=') else {
                return Err(ConfigError::parse("MODEL_ALIASES", format!("missing '=' in '{pair}'")));
            };
            let (from, to) = (from.trim(), to.trim());
            if from.is_empty() || to.is_empty() {
                return Err(ConfigError::parse("MODEL_ALIASES", format!("empty side in '{pair}'")));
            }
            if from.matches('*').count() > 1 {
                return Err(ConfigError::parse(
                    "MODEL_ALIASES",
                    format!("at most one '*' allowed in '{from}'"),
                ));
            }
            aliases.insert(from.to_string(), to.to_string());
        }
        Ok(aliases)
    }
}

/// Optional request normalizations applied by the passthrough adapter.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct TranslationPolicy {
    /// Drop an explicit `temperature: 0`
    #[serde(default)]
    pub strip_zero_temperature: bool,
    /// Injected as `max_tokens` when the caller sets no ceiling
    #[serde(default)]
    pub default_max_tokens: Option<u32>,
}

/// Prompt-size thresholds for stream diagnostics.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Validate)]
#[validate(schema(function = "validate_stream_limits"))]
pub struct StreamLimits {
    pub near_limit_tokens: u64,
    pub hard_limit_tokens: u64,
}

impl Default for StreamLimits {
    fn default() -> Self {
        Self { near_limit_tokens: 100_000, hard_limit_tokens: 128_000 }
    }
}

fn validate_stream_limits(limits: &StreamLimits) -> Result<(), ValidationError> {
    if limits.near_limit_tokens > limits.hard_limit_tokens {
        return Err(ValidationError::new("near_limit_exceeds_hard_limit"));
    }
    Ok(())
}

/// Full gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Validate)]
pub struct GatewayConfig {
    pub host: String,
    #[validate(range(min = 1_u16))]
    pub port: u16,
    /// Bearer secret clients must present
    #[validate(length(min = 1_u64))]
    #[serde(skip_serializing)]
    pub access_token: String,
    #[validate(nested)]
    pub upstream: UpstreamConfig,
    #[validate(nested)]
    pub oauth: OAuthConfig,
    #[validate(nested)]
    pub models: ModelConfig,
    #[serde(default)]
    pub translation: TranslationPolicy,
    #[validate(nested)]
    pub stream_limits: StreamLimits,
    /// Replace forwarding with a deterministic synthetic backend
    #[serde(default)]
    pub placeholder_mode: bool,
    #[validate(range(min = 1_usize, max = 100_000_usize))]
    pub log_capacity: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            access_token: String::new(),
            upstream: UpstreamConfig::default(),
            oauth: OAuthConfig::default(),
            models: ModelConfig::default(),
            translation: TranslationPolicy::default(),
            stream_limits: StreamLimits::default(),
            placeholder_mode: false,
            log_capacity: 100,
        }
    }
}

impl GatewayConfig {
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Validate and convert the validator report into a `ConfigError`.
    pub fn check(&self) -> Result<(), ConfigError> {
        self.validate().map_err(ConfigError::from)
    }
}
