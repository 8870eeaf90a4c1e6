//! Forwarding to the upstream model service.

pub mod client;
pub mod placeholder;

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use llmgate_types::GatewayError;
use serde_json::Value;
use std::pin::Pin;

pub use client::{build_http_client, HttpUpstream};
pub use placeholder::PlaceholderUpstream;

/// Raw upstream body chunks; errors are transport failures after the headers arrived.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, String>> + Send>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamRoute {
    ChatCompletions,
    Completions,
}

impl UpstreamRoute {
    pub fn path(self) -> &'static str {
        match self {
            UpstreamRoute::ChatCompletions => "chat/completions",
            UpstreamRoute::Completions => "completions",
        }
    }
}

/// Where canonical requests go: the real service, or the synthetic generator.
#[async_trait]
pub trait ChatUpstream: Send + Sync {
    /// Non-streaming call; returns the parsed 2xx JSON body.
    async fn send(&self, route: UpstreamRoute, body: Value) -> Result<Value, GatewayError>;

    /// Streaming call; resolves once the upstream accepted the request.
    async fn send_stream(&self, route: UpstreamRoute, body: Value) -> Result<ByteStream, GatewayError>;
}
