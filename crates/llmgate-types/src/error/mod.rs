//! Typed error definitions for llmgate.
//!
//! - **`gateway`** - failures along the inbound request path, each with an HTTP status
//!   and a wire-level error kind
//! - **`credential`** - reasons an upstream credential is unavailable
//! - **`config`** - invalid startup configuration

mod config;
mod credential;
mod gateway;

pub use config::ConfigError;
pub use credential::CredentialError;
pub use gateway::{ErrorKind, GatewayError};
