//! # llm-comms
//!
//! Provider-agnostic client library for conversational LLM backends. One
//! stable calling surface fans out to OpenAI-style, Ollama, and Azure OpenAI
//! endpoints through a middleware pipeline that uniformly provides request
//! shaping, response normalization, streamed delivery, observability,
//! redaction, validation, caching, and a structured error taxonomy.
//!
//! ```rust,no_run
//! use llm_comms::{ChatRequest, LlmClientBuilder, Message};
//! use llm_comms::providers::OpenAiAdapter;
//! use llm_comms::transport::HttpTransport;
//! use std::sync::Arc;
//!
//! # async fn run() -> llm_comms::Result<()> {
//! let transport = Arc::new(HttpTransport::new()?);
//! let client = LlmClientBuilder::new()
//!     .provider(Arc::new(
//!         OpenAiAdapter::new(transport, "https://api.openai.com/v1").with_api_key("..."),
//!     ))
//!     .model("gpt-4o-mini")
//!     .build()?;
//!
//! let response = client
//!     .ask(ChatRequest::new(vec![Message::user("Hello")]))
//!     .await?;
//! println!("{}", response.content());
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod client;
pub mod context;
pub mod middleware;
pub mod prelude;
pub mod providers;
pub mod resilience;
pub mod transport;
pub mod types;
pub mod utils;

pub mod error;
pub use error::{Error, ErrorContext};

use futures::Stream;
use std::pin::Pin;

/// Result type alias for the library.
pub type Result<T> = std::result::Result<T, Error>;

/// A unified pinned, boxed stream of fallible items.
pub type BoxStream<'a, T> = Pin<Box<dyn Stream<Item = Result<T>> + Send + 'a>>;

// Re-export the main surface for convenience.
pub use client::{LlmClient, LlmClientBuilder};
pub use context::{keys, CallContext, ClientOptions, LlmContext};
pub use middleware::EventStream;
pub use types::{
    ChatRequest, ChatResponse, FinishReason, Message, ModelFormat, ProviderCapabilities,
    ProviderModel, ResponseFormat, Role, StreamEvent, ToolCall, ToolCollection, ToolDefinition,
    Usage,
};
