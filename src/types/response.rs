//! Normalized response, token usage, and finish reasons.

use crate::types::message::Message;
use crate::types::tool::ToolCall;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Why the model stopped generating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Length,
    ToolCall,
    Unknown,
}

impl FinishReason {
    /// Canonical mapping from vendor finish-reason strings. Total: anything
    /// unrecognized maps to `Unknown`.
    pub fn from_wire(value: &str) -> Self {
        match value {
            "stop" => FinishReason::Stop,
            "length" => FinishReason::Length,
            "tool_call" | "tool_calls" | "tool" => FinishReason::ToolCall,
            _ => FinishReason::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FinishReason::Stop => "stop",
            FinishReason::Length => "length",
            FinishReason::ToolCall => "tool_call",
            FinishReason::Unknown => "unknown",
        }
    }
}

/// Prompt/completion/total token triple.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl Usage {
    pub fn new(prompt_tokens: u32, completion_tokens: u32, total_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens,
        }
    }

    /// Build from vendor counts, computing the total when it is omitted.
    pub fn from_counts(prompt: u32, completion: u32, total: Option<u32>) -> Self {
        Self::new(prompt, completion, total.unwrap_or(prompt + completion))
    }

    /// Accumulate counts from another record (streaming aggregation).
    pub fn accumulate(&mut self, other: &Usage) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
        self.total_tokens += other.total_tokens;
    }
}

/// Normalized provider response. Logically immutable: middlewares that
/// annotate produce a copy with an augmented `raw` map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    /// The assistant's message.
    pub message: Message,
    pub usage: Usage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<FinishReason>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    /// Provider-specific passthrough fields (vendor id, model, timestamps,
    /// fingerprints) and middleware annotations.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub raw: Map<String, Value>,
}

impl ChatResponse {
    pub fn new(message: Message, usage: Usage) -> Self {
        Self {
            message,
            usage,
            finish_reason: None,
            tool_calls: Vec::new(),
            raw: Map::new(),
        }
    }

    pub fn with_finish_reason(mut self, reason: FinishReason) -> Self {
        self.finish_reason = Some(reason);
        self
    }

    pub fn with_tool_calls(mut self, calls: Vec<ToolCall>) -> Self {
        self.tool_calls = calls;
        self
    }

    /// Shorthand for the assistant text.
    pub fn content(&self) -> &str {
        &self.message.content
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finish_reason_mapping_is_total() {
        assert_eq!(FinishReason::from_wire("stop"), FinishReason::Stop);
        assert_eq!(FinishReason::from_wire("length"), FinishReason::Length);
        assert_eq!(FinishReason::from_wire("tool_call"), FinishReason::ToolCall);
        assert_eq!(FinishReason::from_wire("tool_calls"), FinishReason::ToolCall);
        assert_eq!(FinishReason::from_wire("tool"), FinishReason::ToolCall);
        assert_eq!(FinishReason::from_wire("banana"), FinishReason::Unknown);
        assert_eq!(FinishReason::from_wire(""), FinishReason::Unknown);
    }

    #[test]
    fn usage_total_computed_when_vendor_omits_it() {
        assert_eq!(Usage::from_counts(10, 5, None), Usage::new(10, 5, 15));
        assert_eq!(Usage::from_counts(10, 5, Some(16)), Usage::new(10, 5, 16));
    }

    #[test]
    fn usage_accumulates() {
        let mut total = Usage::default();
        total.accumulate(&Usage::new(5, 3, 8));
        total.accumulate(&Usage::new(2, 1, 3));
        assert_eq!(total, Usage::new(7, 4, 11));
    }
}
