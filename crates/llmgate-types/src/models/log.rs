//! Observability records: one per inbound call, one per lifecycle event.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One completed (or failed) inbound call, as handed to the observability hook.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApiCallRecord {
    pub id: String,
    /// Unix milliseconds at request arrival
    pub timestamp: i64,
    pub method: String,
    pub path: String,
    pub status: u16,
    pub duration_ms: u64,
    /// Model named by the client, when the body carried one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Model actually sent upstream after alias resolution
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mapped_model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_body: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_body: Option<String>,
}

impl ApiCallRecord {
    /// True when the call ended in an error status.
    pub fn is_error(&self) -> bool {
        self.status >= 400
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EventLevel {
    Info,
    Warn,
    Error,
}

/// Something the gateway itself did: start, stop, credential changes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerEvent {
    /// Unix milliseconds
    pub timestamp: i64,
    pub level: EventLevel,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}
