//! Wire records for the two client-facing protocols.
//!
//! - OpenAI (ChatCompletions / Completions API), which doubles as the canonical
//!   request shape sent upstream
//! - Anthropic (Claude Messages API)

pub mod claude;
pub mod openai;

use serde::{Deserialize, Serialize};
use std::fmt;

pub use claude::ClaudeRole;
pub use openai::OpenAIRole;

/// Which wire protocol an inbound route speaks. Decides error envelope shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiProtocol {
    #[default]
    OpenAI,
    Anthropic,
}

impl ApiProtocol {
    /// Protocol for an inbound request path.
    ///
    /// Only `/v1/messages` speaks Anthropic; everything else (including
    /// unknown routes) answers in the OpenAI shape.
    pub fn for_path(path: &str) -> Self {
        if path == "/v1/messages" || path.starts_with("/v1/messages/") {
            Self::Anthropic
        } else {
            Self::OpenAI
        }
    }
}

impl fmt::Display for ApiProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiProtocol::OpenAI => write!(f, "openai"),
            ApiProtocol::Anthropic => write!(f, "anthropic"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_for_path() {
        assert_eq!(ApiProtocol::for_path("/v1/messages"), ApiProtocol::Anthropic);
        assert_eq!(ApiProtocol::for_path("/v1/chat/completions"), ApiProtocol::OpenAI);
        assert_eq!(ApiProtocol::for_path("/v1/completions"), ApiProtocol::OpenAI);
        assert_eq!(ApiProtocol::for_path("/nope"), ApiProtocol::OpenAI);
    }
}
