use async_trait::async_trait;
use futures::StreamExt;
use llmgate_types::models::{MissingCredentialPolicy, UpstreamConfig};
use llmgate_types::{ConfigError, GatewayError};
use reqwest::{header, Client, RequestBuilder};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use super::{ByteStream, ChatUpstream, UpstreamRoute};
use crate::proxy::credentials::CredentialManager;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// Shared outbound client. Per-call timeouts are set on each request because
/// streaming calls need a much longer ceiling than plain ones.
pub fn build_http_client() -> Result<Client, ConfigError> {
    Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .tcp_nodelay(true)
        .http2_keep_alive_interval(Duration::from_secs(25))
        .http2_keep_alive_timeout(Duration::from_secs(10))
        .http2_keep_alive_while_idle(true)
        .build()
        .map_err(|e| ConfigError::HttpClient { message: e.to_string() })
}

pub struct HttpUpstream {
    http: Client,
    config: UpstreamConfig,
    credentials: Arc<CredentialManager>,
}

impl HttpUpstream {
    pub fn new(http: Client, config: UpstreamConfig, credentials: Arc<CredentialManager>) -> Self {
        Self { http, config, credentials }
    }

    /// Build the outbound request with whatever authorization is available.
    async fn prepare(
        &self,
        route: UpstreamRoute,
        body: &Value,
        timeout: Duration,
    ) -> Result<RequestBuilder, GatewayError> {
        let url = self.config.url(route.path());
        let mut request = self
            .http
            .post(&url)
            .timeout(timeout)
            .header(header::CONTENT_TYPE, "application/json")
            .json(body);

        match self.credentials.authorization().await {
            Ok(credential) => request = request.bearer_auth(credential.bearer()),
            Err(e) => match self.config.missing_credential_policy {
                MissingCredentialPolicy::Proceed => {
                    tracing::warn!("No authentication configured for target endpoint ({})", e);
                },
                MissingCredentialPolicy::Reject => {
                    return Err(GatewayError::CredentialUnavailable(e));
                },
            },
        }

        tracing::debug!("Forwarding to {}", url);
        Ok(request)
    }

    async fn execute(&self, request: RequestBuilder) -> Result<reqwest::Response, GatewayError> {
        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                GatewayError::connection(format!("request timed out ({e})"))
            } else {
                GatewayError::connection(e.to_string())
            }
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        tracing::warn!("Upstream returned {}: {}", status.as_u16(), truncate(&body, 200));
        Err(GatewayError::Upstream { status: status.as_u16(), body })
    }
}

fn truncate(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[async_trait]
impl ChatUpstream for HttpUpstream {
    async fn send(&self, route: UpstreamRoute, body: Value) -> Result<Value, GatewayError> {
        let request = self.prepare(route, &body, self.config.timeout()).await?;
        let response = self.execute(request).await?;

        let text = response
            .text()
            .await
            .map_err(|e| GatewayError::connection(format!("failed to read response body: {e}")))?;
        serde_json::from_str(&text).map_err(|e| {
            GatewayError::invalid_response(format!("Invalid JSON response from target endpoint: {e}"), &text)
        })
    }

    async fn send_stream(&self, route: UpstreamRoute, body: Value) -> Result<ByteStream, GatewayError> {
        let request = self.prepare(route, &body, self.config.stream_timeout()).await?;
        let response = self.execute(request).await?;
        Ok(Box::pin(response.bytes_stream().map(|chunk| chunk.map_err(|e| e.to_string()))))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, header_exists, method, path};
    use wiremock::{Mock, MockServer, Request, ResponseTemplate};

    fn upstream(server: &MockServer, key: Option<&str>, policy: MissingCredentialPolicy) -> HttpUpstream {
        let config = UpstreamConfig {
            endpoint: format!("{}/v1", server.uri()),
            api_key: key.map(str::to_string),
            missing_credential_policy: policy,
            ..UpstreamConfig::default()
        };
        let credentials = Arc::new(CredentialManager::new(None, config.api_key.clone()));
        HttpUpstream::new(build_http_client().unwrap(), config, credentials)
    }

    #[tokio::test]
    async fn test_forwards_with_static_key() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer sk-up"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "chatcmpl-1"})))
            .expect(1)
            .mount(&server)
            .await;

        let client = upstream(&server, Some("sk-up"), MissingCredentialPolicy::Proceed);
        let body = client.send(UpstreamRoute::ChatCompletions, json!({"model": "m"})).await.unwrap();
        assert_eq!(body["id"], "chatcmpl-1");
    }

    #[tokio::test]
    async fn test_proceeds_without_credential() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/completions"))
            .respond_with(|req: &Request| {
                let authed = req.headers.contains_key("authorization");
                ResponseTemplate::new(200).set_body_json(json!({ "authed": authed }))
            })
            .mount(&server)
            .await;

        let client = upstream(&server, None, MissingCredentialPolicy::Proceed);
        let body = client.send(UpstreamRoute::Completions, json!({})).await.unwrap();
        assert_eq!(body["authed"], false);
    }

    #[tokio::test]
    async fn test_reject_policy_skips_upstream() {
        let server = MockServer::start().await;
        Mock::given(header_exists("content-type"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let client = upstream(&server, None, MissingCredentialPolicy::Reject);
        let err = client.send(UpstreamRoute::ChatCompletions, json!({})).await.unwrap_err();
        assert!(matches!(err, GatewayError::CredentialUnavailable(_)));
        assert_eq!(err.http_status(), 500);
    }

    #[tokio::test]
    async fn test_error_status_and_bad_json() {
        let server = MockServer::start().await;
        Mock::given(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
            .mount(&server)
            .await;
        Mock::given(path("/v1/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        let client = upstream(&server, Some("k"), MissingCredentialPolicy::Proceed);
        let err = client.send(UpstreamRoute::ChatCompletions, json!({})).await.unwrap_err();
        assert_eq!(err, GatewayError::Upstream { status: 429, body: "slow down".to_string() });

        let err = client.send(UpstreamRoute::Completions, json!({})).await.unwrap_err();
        assert!(matches!(err, GatewayError::InvalidResponse { ref preview, .. } if preview.contains("oops")));
    }

    #[tokio::test]
    async fn test_unreachable_is_connection_error() {
        let config = UpstreamConfig { endpoint: "http://127.0.0.1:1/v1".to_string(), ..UpstreamConfig::default() };
        let credentials = Arc::new(CredentialManager::new(None, None));
        let client = HttpUpstream::new(build_http_client().unwrap(), config, credentials);
        let err = client.send(UpstreamRoute::ChatCompletions, json!({})).await.unwrap_err();
        assert!(matches!(err, GatewayError::Connection { .. }));
    }
}
