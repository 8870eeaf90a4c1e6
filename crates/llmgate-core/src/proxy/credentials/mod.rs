//! Upstream authorization.
//!
//! OAuth client-credentials when configured, a static key otherwise. When OAuth
//! is configured but unavailable, forwarding falls back to the static key if
//! there is one.

mod oauth;

pub use oauth::{OAuthSettings, OAuthStatus, OAuthToken, OAuthTokenManager, TOKEN_REQUEST_TIMEOUT};

use chrono::{DateTime, Utc};
use llmgate_types::{CredentialError, GatewayConfig};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

use crate::proxy::monitor::ServerEventLog;

/// Authorization material to attach to one upstream request.
#[derive(Clone)]
pub enum Credential {
    OAuth(OAuthToken),
    StaticKey(String),
}

impl Credential {
    pub fn bearer(&self) -> &str {
        match self {
            Credential::OAuth(token) => &token.access_token,
            Credential::StaticKey(key) => key,
        }
    }

    pub fn source(&self) -> &'static str {
        match self {
            Credential::OAuth(_) => "oauth",
            Credential::StaticKey(_) => "static_key",
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credential::OAuth(token) => f.debug_tuple("OAuth").field(token).finish(),
            Credential::StaticKey(_) => f.write_str("StaticKey(<redacted>)"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CredentialMode {
    OAuth,
    StaticKey,
    None,
}

/// Snapshot for the dashboard and startup logs.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CredentialStatus {
    pub mode: CredentialMode,
    pub state: &'static str,
    pub expires_at: Option<DateTime<Utc>>,
    pub expires_in_secs: Option<u64>,
    pub last_error: Option<String>,
    pub static_key_fallback: bool,
}

pub struct CredentialManager {
    oauth: Option<OAuthTokenManager>,
    static_key: Option<String>,
}

impl CredentialManager {
    pub fn new(oauth: Option<OAuthTokenManager>, static_key: Option<String>) -> Self {
        Self { oauth, static_key: static_key.filter(|k| !k.is_empty()) }
    }

    /// Token lifecycle changes are reported to `events`.
    pub fn from_config(
        config: &GatewayConfig,
        http: reqwest::Client,
        events: Arc<ServerEventLog>,
    ) -> Self {
        let oauth = OAuthSettings::from_config(&config.oauth)
            .map(|settings| OAuthTokenManager::with_event_log(settings, http, events));
        Self::new(oauth, config.upstream.api_key.clone())
    }

    pub fn mode(&self) -> CredentialMode {
        match (&self.oauth, &self.static_key) {
            (Some(_), _) => CredentialMode::OAuth,
            (None, Some(_)) => CredentialMode::StaticKey,
            (None, None) => CredentialMode::None,
        }
    }

    /// The primary credential: the OAuth token when OAuth is configured, else the static key.
    pub async fn get_credential(&self) -> Result<Credential, CredentialError> {
        match (&self.oauth, &self.static_key) {
            (Some(oauth), _) => oauth.get_token().await.map(Credential::OAuth),
            (None, Some(key)) => Ok(Credential::StaticKey(key.clone())),
            (None, None) => Err(CredentialError::NotConfigured),
        }
    }

    /// What forwarding attaches: the primary credential, or the static key when
    /// OAuth is unavailable.
    pub async fn authorization(&self) -> Result<Credential, CredentialError> {
        match self.get_credential().await {
            Ok(credential) => {
                tracing::debug!("Using {} credential", credential.source());
                Ok(credential)
            },
            Err(e) => match (&self.oauth, &self.static_key) {
                (Some(_), Some(key)) => {
                    tracing::warn!("OAuth unavailable ({}), falling back to static API key", e);
                    Ok(Credential::StaticKey(key.clone()))
                },
                _ => Err(e),
            },
        }
    }

    pub fn status(&self) -> CredentialStatus {
        match &self.oauth {
            Some(oauth) => {
                let OAuthStatus { state, expires_at, expires_in_secs, last_error, .. } =
                    oauth.status();
                CredentialStatus {
                    mode: CredentialMode::OAuth,
                    state,
                    expires_at,
                    expires_in_secs,
                    last_error,
                    static_key_fallback: self.static_key.is_some(),
                }
            },
            None => CredentialStatus {
                mode: self.mode(),
                state: if self.static_key.is_some() { "valid" } else { "no_token" },
                expires_at: None,
                expires_in_secs: None,
                last_error: None,
                static_key_fallback: false,
            },
        }
    }

    /// Cancel any armed background refresh.
    pub fn shutdown(&self) {
        if let Some(oauth) = &self.oauth {
            oauth.shutdown();
        }
    }
}
