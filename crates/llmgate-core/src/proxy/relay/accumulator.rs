//! Reassembles tool calls delivered in fragments across stream events.

use llmgate_types::protocol::openai::ToolCallDelta;
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct AccumulatedToolCall {
    pub id: Option<String>,
    pub call_type: Option<String>,
    pub function_name: Option<String>,
    /// Every argument fragment for this index, concatenated in arrival order
    pub arguments: String,
}

/// Call index -> partially assembled call. Read-only once finalized.
#[derive(Debug, Default)]
pub struct ToolCallAccumulator {
    calls: BTreeMap<u32, AccumulatedToolCall>,
    finalized: bool,
}

impl ToolCallAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge one fragment. `id`, `type` and name are kept from first sight.
    pub fn merge(&mut self, delta: &ToolCallDelta) {
        if self.finalized {
            tracing::debug!("Ignoring tool call fragment after finish (index {})", delta.index);
            return;
        }
        let call = self.calls.entry(delta.index).or_default();
        if call.id.is_none() {
            call.id.clone_from(&delta.id);
        }
        if call.call_type.is_none() {
            call.call_type.clone_from(&delta.call_type);
        }
        if let Some(function) = &delta.function {
            if call.function_name.is_none() {
                call.function_name.clone_from(&function.name);
            }
            if let Some(arguments) = &function.arguments {
                call.arguments.push_str(arguments);
            }
        }
    }

    /// Freeze the accumulator and return the calls ordered by index.
    pub fn finalize(&mut self) -> Vec<AccumulatedToolCall> {
        self.finalized = true;
        self.calls.values().cloned().collect()
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    pub fn get(&self, index: u32) -> Option<&AccumulatedToolCall> {
        self.calls.get(&index)
    }
}
