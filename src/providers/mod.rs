//! Provider adapters: translate the abstract request/response and stream
//! contracts to and from specific vendor wire formats.
//!
//! Shared rules every adapter satisfies:
//! - roles map canonically (`system`/`user`/`assistant`/`tool`);
//! - sampling knobs are sent only when present, values preserved exactly;
//! - tools serialize as `{type: "function", function: {...}}` entries;
//! - a `json_object` response format is never silently dropped;
//! - `<adapter-name>.*` provider hints override shaped body fields;
//! - vendor errors are translated into the taxonomy at the boundary, carrying
//!   the request id; callers never see raw HTTP errors.

mod azure;
mod ollama;
mod openai;

pub use azure::AzureOpenAiAdapter;
pub use ollama::OllamaAdapter;
pub use openai::OpenAiAdapter;

use crate::context::CallContext;
use crate::middleware::EventStream;
use crate::transport::TransportResponse;
use crate::types::{ChatRequest, ChatResponse, ProviderCapabilities, ProviderModel};
use crate::utils::json_path;
use crate::utils::status::{error_from_status, parse_retry_after};
use crate::{Error, ErrorContext, Result};
use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

/// One vendor backend.
///
/// Adapters must allow concurrent `send` and `stream` calls across distinct
/// requests; they hold no per-request state.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Short, lowercase, stable name (used in cache keys and telemetry tags).
    fn name(&self) -> &'static str;

    fn capabilities(&self) -> ProviderCapabilities;

    /// Factory for an opaque model handle.
    fn create_model(&self, id: &str) -> ProviderModel;

    async fn send(
        &self,
        model: &ProviderModel,
        request: &ChatRequest,
        call: &CallContext,
        cancel: &CancellationToken,
    ) -> Result<ChatResponse>;

    /// Ordered stream of events. The default rejects with `not_supported`
    /// without contacting transport; adapters that advertise streaming
    /// override it.
    async fn stream(
        &self,
        model: &ProviderModel,
        request: &ChatRequest,
        call: &CallContext,
        cancel: &CancellationToken,
    ) -> Result<EventStream> {
        let _ = (model, request, call, cancel);
        Err(Error::not_supported(format!(
            "provider '{}' does not support streaming",
            self.name()
        )))
    }
}

/// Apply `<adapter>.*` provider hints onto a shaped body via dot-path set,
/// e.g. `ollama.options.temperature` overrides `options.temperature`.
pub(crate) fn apply_hint_overrides(body: &mut Value, request: &ChatRequest, adapter: &str) {
    let Some(hints) = &request.provider_hints else {
        return;
    };
    let prefix = format!("{}.", adapter);
    for (key, value) in hints {
        if let Some(path) = key.strip_prefix(&prefix) {
            json_path::set_path(body, path, value.clone());
        }
    }
}

/// Translate a non-success transport response into the error taxonomy:
/// status mapping, Retry-After, provider code and message from the common
/// `{"error": {...}}` body shape.
pub(crate) fn translate_error_response(resp: &TransportResponse, request_id: &str) -> Error {
    let retry_after = resp.header_first("retry-after").and_then(parse_retry_after);

    let (message, provider_code) = match serde_json::from_str::<Value>(&resp.body) {
        Ok(v) => {
            let message = v
                .pointer("/error/message")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| resp.body.clone());
            let code = match v.pointer("/error/code") {
                Some(Value::String(s)) => Some(s.clone()),
                Some(Value::Number(n)) => Some(n.to_string()),
                _ => None,
            };
            (message, code)
        }
        Err(_) => (resp.body.clone(), None),
    };

    let mut context = ErrorContext::new()
        .with_status_code(resp.status)
        .with_request_id(request_id);
    if let Some(code) = provider_code {
        context = context.with_provider_code(code);
    }
    error_from_status(resp.status, message, retry_after, None).with_context(context)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    #[test]
    fn prefixed_hints_override_body_fields() {
        let request = ChatRequest::default()
            .with_hint("ollama.options.temperature", 0.1)
            .with_hint("ollama.keep_alive", "5m")
            .with_hint("openai.max_tokens", 9); // other adapter: ignored
        let mut body = json!({"model": "m", "options": {"temperature": 0.9}});
        apply_hint_overrides(&mut body, &request, "ollama");
        assert_eq!(body["options"]["temperature"], json!(0.1));
        assert_eq!(body["keep_alive"], json!("5m"));
        assert!(body.get("max_tokens").is_none());
    }

    #[test]
    fn error_translation_reads_code_message_and_retry_after() {
        let resp = TransportResponse::new(
            429,
            r#"{"error":{"message":"slow down","code":"rate_limit_exceeded"}}"#,
        )
        .with_header("retry-after", "10");
        let err = translate_error_response(&resp, "rid");
        assert_eq!(err.kind(), "rate_limited");
        assert_eq!(err.retry_after(), Some(Duration::from_secs(10)));
        let ctx = err.context().unwrap();
        assert_eq!(ctx.status_code, Some(429));
        assert_eq!(ctx.request_id.as_deref(), Some("rid"));
        assert_eq!(ctx.provider_code.as_deref(), Some("rate_limit_exceeded"));
        assert!(err.to_string().contains("slow down"));
    }

    #[test]
    fn error_translation_falls_back_to_raw_body() {
        let resp = TransportResponse::new(503, "upstream fell over");
        let err = translate_error_response(&resp, "rid");
        assert_eq!(err.kind(), "provider_unavailable");
        assert!(err.to_string().contains("upstream fell over"));
    }
}
