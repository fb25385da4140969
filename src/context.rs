//! Per-invocation execution context shared through the middleware chain.

use crate::providers::ProviderAdapter;
use crate::types::{ChatRequest, ProviderModel};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use tokio_util::sync::CancellationToken;

/// Well-known context item keys readable by external middlewares.
pub mod keys {
    /// Masked copy of the request messages (JSON array), present when
    /// redaction is enabled.
    pub const REDACTED_MESSAGES: &str = "llm.redacted.messages";
    /// Short sanitized excerpt of the last one-or-two messages.
    pub const REDACTED_PREVIEW: &str = "llm.redacted.preview";
    /// Set when the cache middleware short-circuited with a stored response.
    pub const CACHE_HIT: &str = "llm.cache.hit";
    /// Set when the cache middleware stored the fresh response.
    pub const CACHE_STORED: &str = "llm.cache.stored";
    /// Lenient-mode streaming flag: accumulated text was not a JSON object.
    pub const VALIDATION_JSON_INVALID: &str = "llm.validation.json_invalid";
    /// Lenient-mode streaming flag: a tool call failed validation.
    pub const VALIDATION_TOOL_MISMATCH: &str = "llm.validation.tool_mismatch";
}

/// Client behavior knobs, snapshotted at build time so later mutation does
/// not affect already-built clients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientOptions {
    /// Validator fails (vs. annotates) on invalid JSON or tool mismatch.
    pub throw_on_invalid_json: bool,
    /// Redaction publishes a masked message copy into the context items.
    pub enable_redaction: bool,
    /// Metrics emits the three token histograms.
    pub enable_token_usage_events: bool,
    /// Client concatenates stream text into one delta before the terminal.
    pub coalesce_final_stream_text: bool,
    /// Applied when a request omits `max_output_tokens`.
    pub default_max_output_tokens: u32,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            throw_on_invalid_json: true,
            enable_redaction: true,
            enable_token_usage_events: true,
            coalesce_final_stream_text: false,
            default_max_output_tokens: 512,
        }
    }
}

impl ClientOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_throw_on_invalid_json(mut self, enabled: bool) -> Self {
        self.throw_on_invalid_json = enabled;
        self
    }

    pub fn with_redaction(mut self, enabled: bool) -> Self {
        self.enable_redaction = enabled;
        self
    }

    pub fn with_token_usage_events(mut self, enabled: bool) -> Self {
        self.enable_token_usage_events = enabled;
        self
    }

    pub fn with_coalesce_final_stream_text(mut self, enabled: bool) -> Self {
        self.coalesce_final_stream_text = enabled;
        self
    }

    pub fn with_default_max_output_tokens(mut self, tokens: u32) -> Self {
        self.default_max_output_tokens = tokens;
        self
    }
}

/// Sideband state for one client invocation: the request id plus a mutable
/// bag of items middlewares publish for each other and for the caller.
#[derive(Debug)]
pub struct CallContext {
    request_id: String,
    items: Mutex<HashMap<String, Value>>,
}

impl CallContext {
    pub fn new(request_id: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            items: Mutex::new(HashMap::new()),
        }
    }

    /// Opaque 32-char hex id, generated at client entry.
    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn set_item(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.items.lock().unwrap().insert(key.into(), value.into());
    }

    pub fn item(&self, key: &str) -> Option<Value> {
        self.items.lock().unwrap().get(key).cloned()
    }

    pub fn item_bool(&self, key: &str) -> Option<bool> {
        self.item(key).and_then(|v| v.as_bool())
    }

    pub fn has_item(&self, key: &str) -> bool {
        self.items.lock().unwrap().contains_key(key)
    }
}

/// Execution context passed by shared reference through the chain.
///
/// Middlewares may replace the request with a derived copy but not swap the
/// other references.
pub struct LlmContext {
    pub provider: Arc<dyn ProviderAdapter>,
    pub model: ProviderModel,
    request: RwLock<ChatRequest>,
    pub call: CallContext,
    pub options: ClientOptions,
    pub cancel: CancellationToken,
}

impl LlmContext {
    pub fn new(
        provider: Arc<dyn ProviderAdapter>,
        model: ProviderModel,
        request: ChatRequest,
        call: CallContext,
        options: ClientOptions,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            provider,
            model,
            request: RwLock::new(request),
            call,
            options,
            cancel,
        }
    }

    pub fn request_id(&self) -> &str {
        self.call.request_id()
    }

    /// Read the current request without cloning. The closure must not block.
    pub fn with_request<R>(&self, f: impl FnOnce(&ChatRequest) -> R) -> R {
        f(&self.request.read().unwrap())
    }

    /// Owned copy of the current request (for adapters and policies).
    pub fn request_snapshot(&self) -> ChatRequest {
        self.request.read().unwrap().clone()
    }

    /// Swap in a derived request copy.
    pub fn replace_request(&self, request: ChatRequest) {
        *self.request.write().unwrap() = request;
    }
}
