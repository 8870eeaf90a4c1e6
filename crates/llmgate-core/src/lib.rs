//! # llmgate Core
//!
//! Request path of the llmgate gateway.
//!
//! ```text
//! llmgate-core/src/
//! ├── error.rs          # protocol-shaped error envelopes
//! └── proxy/
//!     ├── middleware/   # access gate, call recording, panic recovery
//!     ├── handlers/     # /v1/chat/completions, /v1/completions, /v1/messages, /v1/models
//!     ├── mappers/      # OpenAI passthrough + Anthropic adapters
//!     ├── relay/        # SSE relay, tool-call accumulator, diagnostics
//!     ├── credentials/  # OAuth token manager + static key
//!     ├── upstream/     # HTTP forwarding, placeholder backend
//!     └── server.rs     # composition root and router
//! ```

#![allow(
    clippy::significant_drop_tightening,
    reason = "Lock guards in the token state machine are scoped explicitly"
)]
#![allow(clippy::implicit_clone, reason = "Explicit .clone() vs .to_string() is stylistic")]
// Test-only lints: allow panic!, float comparisons, etc. in test code
#![cfg_attr(
    test,
    allow(clippy::panic, clippy::float_cmp, clippy::unwrap_used, clippy::expect_used)
)]

pub mod error;
pub mod proxy;

pub use error::{ErrorEnvelope, OnProtocol, ProtocolError};
pub use proxy::{build_router, build_router_with, AppState, GatewayContext};
