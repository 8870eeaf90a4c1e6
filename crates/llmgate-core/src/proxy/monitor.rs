//! Call and event recording.
//!
//! The request path reports each finished call to an [`ObservabilityHook`]
//! exactly once. [`RequestLogStore`] is the in-memory implementation the
//! dashboard reads from. [`ServerEventLog`] keeps the gateway's own
//! lifecycle events next to it.

pub use llmgate_types::{ApiCallRecord, EventLevel, ServerEvent};
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value;
use std::collections::VecDeque;

/// Receives one record per completed (or failed) inbound call.
pub trait ObservabilityHook: Send + Sync {
    fn record(&self, record: ApiCallRecord);
}

/// A hook that drops everything.
pub struct NoopHook;

impl ObservabilityHook for NoopHook {
    fn record(&self, _record: ApiCallRecord) {}
}

#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct LogStats {
    pub total_calls: u64,
    pub error_calls: u64,
    pub retained: usize,
    pub capacity: usize,
}

/// Bounded append-only call log. Oldest entries are evicted first.
pub struct RequestLogStore {
    logs: RwLock<VecDeque<ApiCallRecord>>,
    max_logs: usize,
    totals: RwLock<(u64, u64)>,
}

impl RequestLogStore {
    pub fn new(max_logs: usize) -> Self {
        let max_logs = max_logs.max(1);
        Self {
            logs: RwLock::new(VecDeque::with_capacity(max_logs)),
            max_logs,
            totals: RwLock::new((0, 0)),
        }
    }

    /// Most recent first.
    pub fn get_logs(&self, limit: Option<usize>) -> Vec<ApiCallRecord> {
        let logs = self.logs.read();
        let limit = limit.unwrap_or(logs.len());
        logs.iter().rev().take(limit).cloned().collect()
    }

    pub fn clear_logs(&self) {
        self.logs.write().clear();
    }

    pub fn stats(&self) -> LogStats {
        let (total_calls, error_calls) = *self.totals.read();
        LogStats { total_calls, error_calls, retained: self.logs.read().len(), capacity: self.max_logs }
    }
}

impl ObservabilityHook for RequestLogStore {
    fn record(&self, record: ApiCallRecord) {
        {
            let mut totals = self.totals.write();
            totals.0 += 1;
            if record.is_error() {
                totals.1 += 1;
            }
        }

        let mut logs = self.logs.write();
        while logs.len() >= self.max_logs {
            logs.pop_front();
        }
        logs.push_back(record);
    }
}

/// Bounded log of lifecycle events, oldest evicted first.
pub struct ServerEventLog {
    events: RwLock<VecDeque<ServerEvent>>,
    max_events: usize,
}

impl ServerEventLog {
    pub fn new(max_events: usize) -> Self {
        let max_events = max_events.max(1);
        Self { events: RwLock::new(VecDeque::with_capacity(max_events)), max_events }
    }

    pub fn record(&self, level: EventLevel, message: impl Into<String>, data: Option<Value>) {
        let event = ServerEvent {
            timestamp: chrono::Utc::now().timestamp_millis(),
            level,
            message: message.into(),
            data,
        };
        let mut events = self.events.write();
        while events.len() >= self.max_events {
            events.pop_front();
        }
        events.push_back(event);
    }

    pub fn info(&self, message: impl Into<String>, data: Option<Value>) {
        self.record(EventLevel::Info, message, data);
    }

    pub fn warn(&self, message: impl Into<String>, data: Option<Value>) {
        self.record(EventLevel::Warn, message, data);
    }

    pub fn error(&self, message: impl Into<String>, data: Option<Value>) {
        self.record(EventLevel::Error, message, data);
    }

    /// Most recent first.
    pub fn get_events(&self, limit: Option<usize>) -> Vec<ServerEvent> {
        let events = self.events.read();
        let limit = limit.unwrap_or(events.len());
        events.iter().rev().take(limit).cloned().collect()
    }

    pub fn clear(&self) {
        self.events.write().clear();
    }
}
