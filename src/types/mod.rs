//! Shared data contracts: messages, requests, responses, tools, stream events.

pub mod capabilities;
pub mod events;
pub mod message;
pub mod request;
pub mod response;
pub mod tool;

pub use capabilities::{ModelFormat, ProviderCapabilities, ProviderModel};
pub use events::StreamEvent;
pub use message::{Message, Role};
pub use request::{ChatRequest, ResponseFormat};
pub use response::{ChatResponse, FinishReason, Usage};
pub use tool::{ToolCall, ToolCollection, ToolDefinition};
