//! Streaming event contract.

use crate::types::response::Usage;
use crate::types::tool::ToolCall;
use serde::{Deserialize, Serialize};

/// One incremental event from a streamed response.
///
/// Exactly one terminal event (`Complete` or `Error`) is emitted on graceful
/// completion, and events are delivered in provider-emitted order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StreamEvent {
    /// A fragment of generated text.
    Delta { text: String },

    /// A tool-call fragment. Fragments with the same name belong to the same
    /// call; `arguments_json` pieces concatenate in arrival order.
    ToolCall { call: ToolCall },

    /// A reasoning segment (provider-optional).
    Reasoning { text: String },

    /// Terminal event on graceful completion. May carry the final usage and
    /// the coalesced reasoning text.
    Complete {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        usage: Option<Usage>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reasoning: Option<String>,
    },

    /// Terminal event when the provider surfaced an error it could parse.
    Error {
        #[serde(rename = "error_kind")]
        kind: String,
        message: String,
    },
}

impl StreamEvent {
    pub fn delta(text: impl Into<String>) -> Self {
        StreamEvent::Delta { text: text.into() }
    }

    pub fn complete(usage: Option<Usage>) -> Self {
        StreamEvent::Complete {
            usage,
            reasoning: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::Complete { .. } | StreamEvent::Error { .. })
    }
}
