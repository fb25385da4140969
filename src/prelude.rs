//! Convenience re-exports for the common calling surface.

pub use crate::client::{LlmClient, LlmClientBuilder};
pub use crate::context::ClientOptions;
pub use crate::types::{
    ChatRequest, ChatResponse, FinishReason, Message, ResponseFormat, Role, StreamEvent,
    ToolCall, ToolCollection, ToolDefinition, Usage,
};
pub use crate::{Error, Result};
