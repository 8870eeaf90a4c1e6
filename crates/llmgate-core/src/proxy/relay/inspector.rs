//! Best-effort inspection of relayed events for diagnostics.

use llmgate_types::models::StreamLimits;
use llmgate_types::protocol::openai::ChatCompletionChunk;
use serde::Serialize;

use super::accumulator::{AccumulatedToolCall, ToolCallAccumulator};

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StreamDiagnostic {
    /// Upstream stopped on the output-token limit
    Truncated,
    /// Upstream finished with tool calls
    ToolCalls { names: Vec<String> },
    NearContextLimit { prompt_tokens: u64, threshold: u64 },
    ContextLimitExceeded { prompt_tokens: u64, threshold: u64 },
}

/// Watches the chunks of one relay. Never affects what is forwarded.
pub struct StreamInspector {
    trace_id: String,
    limits: StreamLimits,
    full_text: String,
    tools: ToolCallAccumulator,
    tool_calls: Vec<AccumulatedToolCall>,
    diagnostics: Vec<StreamDiagnostic>,
    events: usize,
    parse_failures: usize,
}

impl StreamInspector {
    pub fn new(trace_id: impl Into<String>, limits: StreamLimits) -> Self {
        Self {
            trace_id: trace_id.into(),
            limits,
            full_text: String::new(),
            tools: ToolCallAccumulator::new(),
            tool_calls: Vec::new(),
            diagnostics: Vec::new(),
            events: 0,
            parse_failures: 0,
        }
    }

    pub fn observe(&mut self, chunk: &ChatCompletionChunk) {
        self.events += 1;

        for choice in &chunk.choices {
            if let Some(fragment) = choice.content_fragment() {
                self.full_text.push_str(fragment);
            }
            if let Some(tool_calls) = choice.delta.as_ref().and_then(|d| d.tool_calls.as_ref()) {
                for delta in tool_calls {
                    self.tools.merge(delta);
                }
            }
            let Some(reason) = choice.finish_reason.as_deref() else {
                continue;
            };
            // Any finish reason closes the tool call set; later fragments are ignored.
            let newly_finalized = !self.tools.is_finalized();
            if newly_finalized {
                self.tool_calls = self.tools.finalize();
            }
            match reason {
                "length" => {
                    tracing::warn!(
                        "[{}] Stream truncated at max tokens ({} chars generated)",
                        self.trace_id,
                        self.full_text.len()
                    );
                    self.diagnostics.push(StreamDiagnostic::Truncated);
                },
                "tool_calls" if newly_finalized => {
                    let names: Vec<String> = self
                        .tool_calls
                        .iter()
                        .map(|c| c.function_name.clone().unwrap_or_else(|| "<unnamed>".to_string()))
                        .collect();
                    tracing::info!("[{}] Tool calls: {}", self.trace_id, names.join(", "));
                    self.diagnostics.push(StreamDiagnostic::ToolCalls { names });
                },
                _ => {},
            }
        }

        if let Some(usage) = chunk.usage {
            self.check_context(usage.prompt_tokens);
        }
    }

    fn check_context(&mut self, prompt_tokens: u64) {
        let StreamLimits { near_limit_tokens, hard_limit_tokens } = self.limits;
        if prompt_tokens >= hard_limit_tokens {
            tracing::warn!(
                "[{}] Prompt of {} tokens exceeds context limit {}",
                self.trace_id,
                prompt_tokens,
                hard_limit_tokens
            );
            self.diagnostics.push(StreamDiagnostic::ContextLimitExceeded {
                prompt_tokens,
                threshold: hard_limit_tokens,
            });
        } else if prompt_tokens >= near_limit_tokens {
            tracing::warn!(
                "[{}] Prompt of {} tokens is near context limit {}",
                self.trace_id,
                prompt_tokens,
                near_limit_tokens
            );
            self.diagnostics.push(StreamDiagnostic::NearContextLimit {
                prompt_tokens,
                threshold: near_limit_tokens,
            });
        }
    }

    pub fn record_parse_failure(&mut self, err: &serde_json::Error) {
        self.parse_failures += 1;
        tracing::debug!("[{}] Unparseable stream event ({}), relaying anyway", self.trace_id, err);
    }

    pub fn trace_id(&self) -> &str {
        &self.trace_id
    }

    pub fn full_text(&self) -> &str {
        &self.full_text
    }

    pub fn tool_calls(&self) -> &[AccumulatedToolCall] {
        &self.tool_calls
    }

    pub fn diagnostics(&self) -> &[StreamDiagnostic] {
        &self.diagnostics
    }

    /// Log a one-line summary once the relay ends.
    pub fn summarize(&self) {
        tracing::info!(
            "[{}] Stream finished | events: {} | chars: {} | parse failures: {} | diagnostics: {}",
            self.trace_id,
            self.events,
            self.full_text.len(),
            self.parse_failures,
            self.diagnostics.len()
        );
    }
}
