//! Configuration-related errors.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur while assembling the gateway configuration.
#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "details")]
pub enum ConfigError {
    /// A value could not be parsed from its textual form
    #[error("Config parse error for {field}: {message}")]
    ParseError {
        /// Name of the setting being parsed
        field: String,
        /// Description of the parse failure
        message: String,
    },

    /// Config validation error (invalid values)
    #[error("Config validation error: {message}")]
    ValidationError {
        /// Validator report
        message: String,
    },

    /// The outbound HTTP client could not be constructed
    #[error("Failed to build HTTP client: {message}")]
    HttpClient {
        /// Builder failure reason
        message: String,
    },
}

impl ConfigError {
    pub fn parse(field: &str, message: impl Into<String>) -> Self {
        Self::ParseError { field: field.to_string(), message: message.into() }
    }
}

impl From<validator::ValidationErrors> for ConfigError {
    fn from(errors: validator::ValidationErrors) -> Self {
        Self::ValidationError { message: errors.to_string() }
    }
}
