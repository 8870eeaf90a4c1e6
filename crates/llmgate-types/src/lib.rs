//! # llmgate Types
//!
//! Core types, models, and error definitions for the llmgate gateway.
//!
//! - **`error`** - Typed error hierarchy for the request path, credentials, and configuration
//! - **`models`** - Gateway configuration and observability records
//! - **`protocol`** - OpenAI chat/completions and Anthropic messages wire records
//!
//! ## Architecture Role
//!
//! `llmgate-types` sits at the bottom of the dependency graph:
//!
//! ```text
//!              llmgate-types (this crate)
//!                      │
//!                      ▼
//!                llmgate-core
//!                      │
//!                      ▼
//!               llmgate-server
//! ```
//!
//! Nothing in here performs I/O.

pub mod error;
pub mod models;
pub mod protocol;

pub use error::{ConfigError, CredentialError, ErrorKind, GatewayError};
pub use models::{ApiCallRecord, EventLevel, GatewayConfig, ServerEvent};
pub use protocol::ApiProtocol;
