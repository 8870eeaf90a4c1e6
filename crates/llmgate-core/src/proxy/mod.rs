//! Proxy module - the gateway request path
//!
//! - `middleware`: access gate, call recording, panic recovery
//! - `handlers`: OpenAI, Anthropic and model-listing routes
//! - `mappers`: request/response translation between the wire protocols
//! - `relay`: SSE framing, tool-call accumulation, stream diagnostics
//! - `credentials`: OAuth client-credentials with static-key fallback
//! - `upstream`: HTTP forwarding and the placeholder backend

pub mod credentials;
pub mod handlers;
pub mod mappers;
pub mod middleware;
pub mod monitor;
pub mod relay;
pub mod server;
pub mod upstream;

pub use credentials::{Credential, CredentialManager, CredentialMode, CredentialStatus};
pub use middleware::AccessGate;
pub use monitor::{LogStats, NoopHook, ObservabilityHook, RequestLogStore, ServerEventLog};
pub use server::{build_router, build_router_with, AppState, GatewayContext};
pub use upstream::{ChatUpstream, UpstreamRoute};
