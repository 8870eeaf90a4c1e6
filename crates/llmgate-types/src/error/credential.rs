//! Upstream credential errors.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why no upstream credential could be produced.
///
/// Every variant means the same thing to a caller: the credential is
/// unavailable right now. The variants exist for logging and status reporting.
#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "details")]
pub enum CredentialError {
    /// Neither OAuth nor a static key is configured
    #[error("No upstream credential configured")]
    NotConfigured,

    /// Token endpoint could not be reached (DNS, connect, timeout)
    #[error("Token endpoint unreachable: {message}")]
    Transport { message: String },

    /// Token endpoint answered with a non-success status after both auth styles
    #[error("Token endpoint rejected the grant ({status}): {body}")]
    Rejected { status: u16, body: String },

    /// Token endpoint answered 2xx but the body is not a usable token response
    #[error("Malformed token response: {message}")]
    Malformed { message: String },

    /// Token was issued with a lifetime that never clears the refresh buffer
    #[error("Token lifetime {lifetime_secs}s does not exceed refresh buffer {buffer_secs}s")]
    LifetimeTooShort { lifetime_secs: u64, buffer_secs: u64 },

    /// Manager was shut down
    #[error("Credential manager is shut down")]
    ShutDown,
}
