//! OAuth client-credentials token lifecycle.
//!
//! ```text
//! NoToken ──get──▶ Fetching ──ok──▶ Valid ──(expiry - buffer)──▶ Fetching ──▶ ...
//!                     │
//!                     └──err──▶ Failed ──get──▶ Fetching
//! ```
//!
//! One `parking_lot::Mutex` guards the whole machine. It is never held across
//! an `.await`. A fetch runs on its own task and is published as a `Shared`
//! future, so every caller (and the background refresh) joins the same
//! in-flight request.

use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use llmgate_types::models::OAuthConfig;
use llmgate_types::CredentialError;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::proxy::monitor::{EventLevel, ServerEventLog};

/// Token endpoint requests are cut off after this long.
pub const TOKEN_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Lifetime assumed when the token response carries no `expires_in`.
const DEFAULT_EXPIRES_IN_SECS: u64 = 3600;

/// Longest lifetime a token is trusted for, whatever `expires_in` claims.
pub const MAX_TOKEN_LIFETIME: Duration = Duration::from_secs(365 * 24 * 60 * 60);

#[derive(Clone)]
pub struct OAuthSettings {
    pub token_endpoint: String,
    pub client_id: String,
    pub client_secret: String,
    pub scope: Option<String>,
    pub refresh_buffer: Duration,
    pub request_timeout: Duration,
}

impl OAuthSettings {
    /// `None` unless endpoint, client id and secret are all present.
    pub fn from_config(config: &OAuthConfig) -> Option<Self> {
        if !config.is_configured() {
            return None;
        }
        Some(Self {
            token_endpoint: config.token_endpoint.clone()?,
            client_id: config.client_id.clone()?,
            client_secret: config.client_secret.clone()?,
            scope: config.scope.clone().filter(|s| !s.is_empty()),
            refresh_buffer: config.refresh_buffer(),
            request_timeout: TOKEN_REQUEST_TIMEOUT,
        })
    }
}

impl fmt::Debug for OAuthSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthSettings")
            .field("token_endpoint", &self.token_endpoint)
            .field("client_id", &self.client_id)
            .field("scope", &self.scope)
            .field("refresh_buffer", &self.refresh_buffer)
            .finish_non_exhaustive()
    }
}

/// An access token and its absolute expiry.
#[derive(Clone)]
pub struct OAuthToken {
    pub access_token: String,
    pub expires_at: Instant,
    pub expires_at_utc: DateTime<Utc>,
}

impl OAuthToken {
    /// `lifetime` is capped at [`MAX_TOKEN_LIFETIME`] so expiry arithmetic cannot overflow.
    pub fn new(access_token: String, lifetime: Duration) -> Self {
        let lifetime = lifetime.min(MAX_TOKEN_LIFETIME);
        let expires_at_utc = chrono::Duration::from_std(lifetime)
            .ok()
            .and_then(|d| Utc::now().checked_add_signed(d))
            .unwrap_or_else(Utc::now);
        Self { access_token, expires_at: Instant::now() + lifetime, expires_at_utc }
    }

    pub fn time_to_expiry(&self) -> Duration {
        self.expires_at.saturating_duration_since(Instant::now())
    }
}

impl fmt::Debug for OAuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthToken")
            .field("access_token", &"<redacted>")
            .field("expires_at_utc", &self.expires_at_utc)
            .finish()
    }
}

type SharedFetch = Shared<BoxFuture<'static, Result<OAuthToken, CredentialError>>>;

enum TokenState {
    NoToken,
    /// `id` tells a crashed fetch apart from any fetch started after it
    Fetching { id: u64, fetch: SharedFetch },
    Valid(OAuthToken),
    Failed { reason: CredentialError },
}

impl TokenState {
    fn name(&self) -> &'static str {
        match self {
            TokenState::NoToken => "no_token",
            TokenState::Fetching { .. } => "fetching",
            TokenState::Valid(_) => "valid",
            TokenState::Failed { .. } => "failed",
        }
    }
}

struct RefreshHandle {
    id: u64,
    task: JoinHandle<()>,
}

struct Machine {
    state: TokenState,
    refresh: Option<RefreshHandle>,
    last_error: Option<CredentialError>,
    shut_down: bool,
}

impl Machine {
    fn cancel_refresh(&mut self) {
        if let Some(handle) = self.refresh.take() {
            handle.task.abort();
        }
    }
}

/// Point-in-time view of the token machine.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct OAuthStatus {
    pub state: &'static str,
    pub expires_at: Option<DateTime<Utc>>,
    pub expires_in_secs: Option<u64>,
    pub last_error: Option<String>,
    pub refresh_armed: bool,
    pub fetch_count: u64,
}

#[derive(Serialize)]
struct ClientCredentialsGrant<'a> {
    grant_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    scope: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    client_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    client_secret: Option<&'a str>,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

struct Inner {
    settings: OAuthSettings,
    http: reqwest::Client,
    machine: Mutex<Machine>,
    fetch_count: AtomicU64,
    next_fetch_id: AtomicU64,
    next_refresh_id: AtomicU64,
    events: Option<Arc<ServerEventLog>>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.machine.get_mut().cancel_refresh();
    }
}

impl Inner {
    fn event(&self, level: EventLevel, message: &str, data: Option<Value>) {
        if let Some(events) = &self.events {
            events.record(level, message, data);
        }
    }

    /// Start a fetch on its own task and publish it. Caller holds the machine lock.
    fn begin_fetch(self: &Arc<Self>, machine: &mut Machine) -> SharedFetch {
        let task = tokio::spawn(Arc::clone(self).run_fetch());
        self.publish_fetch(machine, task)
    }

    /// Make `task` the in-flight fetch every caller joins.
    ///
    /// A task that dies without reporting back (panic, abort) moves the machine
    /// to `Failed` when joined, so the next caller starts a fresh fetch.
    fn publish_fetch(
        self: &Arc<Self>,
        machine: &mut Machine,
        task: JoinHandle<Result<OAuthToken, CredentialError>>,
    ) -> SharedFetch {
        let id = self.next_fetch_id.fetch_add(1, Ordering::Relaxed);
        let weak: Weak<Self> = Arc::downgrade(self);
        let fetch = async move {
            match task.await {
                Ok(result) => result,
                Err(e) => {
                    let reason = CredentialError::Transport {
                        message: format!("token fetch task ended abnormally: {e}"),
                    };
                    if let Some(inner) = weak.upgrade() {
                        inner.abandon_fetch(id, &reason);
                    }
                    Err(reason)
                },
            }
        }
        .boxed()
        .shared();
        machine.state = TokenState::Fetching { id, fetch: fetch.clone() };
        fetch
    }

    fn abandon_fetch(&self, id: u64, reason: &CredentialError) {
        let mut machine = self.machine.lock();
        if !matches!(machine.state, TokenState::Fetching { id: current, .. } if current == id) {
            return;
        }
        tracing::error!("OAuth token fetch died: {}", reason);
        self.event(EventLevel::Error, "OAuth token fetch died", Some(json!({ "error": reason.to_string() })));
        machine.cancel_refresh();
        machine.state = TokenState::Failed { reason: reason.clone() };
        machine.last_error = Some(reason.clone());
    }

    async fn run_fetch(self: Arc<Self>) -> Result<OAuthToken, CredentialError> {
        self.fetch_count.fetch_add(1, Ordering::Relaxed);
        tracing::info!("Fetching OAuth token from {}", self.settings.token_endpoint);

        let result = self.request_token().await;

        let mut machine = self.machine.lock();
        if machine.shut_down {
            return Err(CredentialError::ShutDown);
        }
        match &result {
            Ok(token) => {
                let expires_in = token.time_to_expiry().as_secs();
                tracing::info!("OAuth token obtained (expires in {}s)", expires_in);
                self.event(
                    EventLevel::Info,
                    "OAuth token obtained",
                    Some(json!({ "expires_in_secs": expires_in })),
                );
                machine.state = TokenState::Valid(token.clone());
                self.arm_refresh(&mut machine, token);
            },
            Err(e) => {
                tracing::error!("Failed to fetch OAuth token: {}", e);
                self.event(
                    EventLevel::Error,
                    "OAuth token fetch failed",
                    Some(json!({ "error": e.to_string() })),
                );
                machine.cancel_refresh();
                machine.state = TokenState::Failed { reason: e.clone() };
                machine.last_error = Some(e.clone());
            },
        }
        result
    }

    /// Replace any armed refresh with one that fires at `expiry - buffer`.
    fn arm_refresh(self: &Arc<Self>, machine: &mut Machine, token: &OAuthToken) {
        machine.cancel_refresh();

        let delay = token.time_to_expiry().saturating_sub(self.settings.refresh_buffer);
        let id = self.next_refresh_id.fetch_add(1, Ordering::Relaxed);
        let weak: Weak<Self> = Arc::downgrade(self);
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(inner) = weak.upgrade() {
                inner.background_refresh(id);
            }
        });
        tracing::debug!("OAuth refresh armed in {}s", delay.as_secs());
        machine.refresh = Some(RefreshHandle { id, task });
    }

    fn background_refresh(self: &Arc<Self>, id: u64) {
        let mut machine = self.machine.lock();
        if machine.shut_down || machine.refresh.as_ref().map(|r| r.id) != Some(id) {
            return;
        }
        machine.refresh = None;

        if matches!(machine.state, TokenState::Fetching { .. }) {
            tracing::debug!("OAuth refresh due, fetch already in flight");
            return;
        }
        tracing::info!("Refreshing OAuth token...");
        self.event(EventLevel::Info, "OAuth token refresh started", None);
        drop(self.begin_fetch(&mut machine));
    }

    async fn request_token(&self) -> Result<OAuthToken, CredentialError> {
        let mut response = self.post_grant(true).await?;

        if response.status() == reqwest::StatusCode::BAD_REQUEST {
            tracing::warn!("Basic Auth failed, trying with credentials in request body...");
            response = self.post_grant(false).await?;
        }

        let status = response.status();
        let body = response.text().await.map_err(|e| CredentialError::Transport {
            message: format!("reading token response: {e}"),
        })?;

        if !status.is_success() {
            return Err(CredentialError::Rejected { status: status.as_u16(), body });
        }

        let parsed: TokenResponse = serde_json::from_str(&body)
            .map_err(|e| CredentialError::Malformed { message: e.to_string() })?;
        if parsed.access_token.is_empty() {
            return Err(CredentialError::Malformed { message: "empty access_token".to_string() });
        }

        let lifetime_secs = parsed.expires_in.unwrap_or(DEFAULT_EXPIRES_IN_SECS);
        if lifetime_secs > MAX_TOKEN_LIFETIME.as_secs() {
            tracing::warn!(
                "Token endpoint claims expires_in={}s, capping at {}s",
                lifetime_secs,
                MAX_TOKEN_LIFETIME.as_secs()
            );
        }
        let buffer_secs = self.settings.refresh_buffer.as_secs();
        if lifetime_secs <= buffer_secs {
            return Err(CredentialError::LifetimeTooShort { lifetime_secs, buffer_secs });
        }

        Ok(OAuthToken::new(parsed.access_token, Duration::from_secs(lifetime_secs)))
    }

    /// One grant request, with credentials in the Basic header or in the form body.
    async fn post_grant(&self, basic_auth: bool) -> Result<reqwest::Response, CredentialError> {
        let settings = &self.settings;
        let grant = ClientCredentialsGrant {
            grant_type: "client_credentials",
            scope: settings.scope.as_deref(),
            client_id: (!basic_auth).then_some(settings.client_id.as_str()),
            client_secret: (!basic_auth).then_some(settings.client_secret.as_str()),
        };

        let mut request = self
            .http
            .post(&settings.token_endpoint)
            .timeout(settings.request_timeout)
            .form(&grant);
        if basic_auth {
            request = request.basic_auth(&settings.client_id, Some(&settings.client_secret));
        }

        request
            .send()
            .await
            .map_err(|e| CredentialError::Transport { message: e.to_string() })
    }
}

/// Owns the OAuth token and its background refresh.
#[derive(Clone)]
pub struct OAuthTokenManager {
    inner: Arc<Inner>,
}

impl OAuthTokenManager {
    pub fn new(settings: OAuthSettings, http: reqwest::Client) -> Self {
        Self::build(settings, http, None)
    }

    /// Like [`Self::new`], also reporting token lifecycle changes to `events`.
    pub fn with_event_log(
        settings: OAuthSettings,
        http: reqwest::Client,
        events: Arc<ServerEventLog>,
    ) -> Self {
        Self::build(settings, http, Some(events))
    }

    fn build(
        settings: OAuthSettings,
        http: reqwest::Client,
        events: Option<Arc<ServerEventLog>>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                settings,
                http,
                machine: Mutex::new(Machine {
                    state: TokenState::NoToken,
                    refresh: None,
                    last_error: None,
                    shut_down: false,
                }),
                fetch_count: AtomicU64::new(0),
                next_fetch_id: AtomicU64::new(0),
                next_refresh_id: AtomicU64::new(0),
                events,
            }),
        }
    }

    /// A token with more than the refresh buffer left, fetching one if needed.
    ///
    /// Concurrent callers share a single in-flight fetch and its outcome.
    pub async fn get_token(&self) -> Result<OAuthToken, CredentialError> {
        let buffer = self.inner.settings.refresh_buffer;
        let fetch = {
            let mut machine = self.inner.machine.lock();
            if machine.shut_down {
                return Err(CredentialError::ShutDown);
            }
            let in_flight = match &machine.state {
                TokenState::Valid(token) if token.time_to_expiry() > buffer => {
                    return Ok(token.clone());
                },
                TokenState::Fetching { fetch, .. } => Some(fetch.clone()),
                TokenState::Valid(_) | TokenState::NoToken | TokenState::Failed { .. } => None,
            };
            in_flight.unwrap_or_else(|| self.inner.begin_fetch(&mut machine))
        };

        let token = fetch.await?;
        let remaining = token.time_to_expiry();
        if remaining <= buffer {
            return Err(CredentialError::LifetimeTooShort {
                lifetime_secs: remaining.as_secs(),
                buffer_secs: buffer.as_secs(),
            });
        }
        Ok(token)
    }

    pub fn status(&self) -> OAuthStatus {
        let machine = self.inner.machine.lock();
        let (expires_at, expires_in_secs) = match &machine.state {
            TokenState::Valid(token) => {
                (Some(token.expires_at_utc), Some(token.time_to_expiry().as_secs()))
            },
            _ => (None, None),
        };
        let last_error = match &machine.state {
            TokenState::Failed { reason } => Some(reason.to_string()),
            _ => machine.last_error.as_ref().map(ToString::to_string),
        };
        OAuthStatus {
            state: machine.state.name(),
            expires_at,
            expires_in_secs,
            last_error,
            refresh_armed: machine.refresh.is_some(),
            fetch_count: self.inner.fetch_count.load(Ordering::Relaxed),
        }
    }

    /// Number of token requests started so far.
    pub fn fetch_count(&self) -> u64 {
        self.inner.fetch_count.load(Ordering::Relaxed)
    }

    /// Cancel the armed refresh and refuse further fetches.
    pub fn shutdown(&self) {
        let mut machine = self.inner.machine.lock();
        machine.shut_down = true;
        machine.cancel_refresh();
        machine.state = TokenState::NoToken;
        tracing::info!("OAuth token manager shut down");
        self.inner.event(EventLevel::Info, "OAuth token manager shut down", None);
    }
}
