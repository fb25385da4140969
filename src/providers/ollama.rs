//! Ollama chat adapter.
//!
//! Sampling knobs ride in the `options` bag (`num_predict` carries the max
//! output tokens), JSON mode is `format = "json"`, and streaming is
//! newline-delimited JSON terminated by an object with `done = true`.

use super::{apply_hint_overrides, translate_error_response, ProviderAdapter};
use crate::context::CallContext;
use crate::middleware::EventStream;
use crate::transport::{Transport, TransportRequest};
use crate::types::{
    ChatRequest, ChatResponse, FinishReason, Message, ProviderCapabilities, ProviderModel,
    StreamEvent, ToolCall, Usage,
};
use crate::utils::roles::wire_role;
use crate::utils::tools::tools_payload;
use crate::{Error, Result};
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Adapter for a local or remote Ollama server.
pub struct OllamaAdapter {
    transport: Arc<dyn Transport>,
    base_url: String,
}

impl OllamaAdapter {
    pub fn new(transport: Arc<dyn Transport>, base_url: impl Into<String>) -> Self {
        Self {
            transport,
            base_url: base_url.into(),
        }
    }

    fn request_for(&self, body: &Value) -> TransportRequest {
        let url = format!("{}/api/chat", self.base_url.trim_end_matches('/'));
        TransportRequest::post(url, body.to_string())
            .with_header("content-type", "application/json")
    }
}

#[async_trait]
impl ProviderAdapter for OllamaAdapter {
    fn name(&self) -> &'static str {
        "ollama"
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities::new()
            .with_streaming()
            .with_json_mode()
            .with_tools()
    }

    fn create_model(&self, id: &str) -> ProviderModel {
        ProviderModel::chat(id)
    }

    async fn send(
        &self,
        model: &ProviderModel,
        request: &ChatRequest,
        call: &CallContext,
        cancel: &CancellationToken,
    ) -> Result<ChatResponse> {
        let mut body = build_chat_body(model, request, false);
        apply_hint_overrides(&mut body, request, self.name());

        let resp = self.transport.send(self.request_for(&body), cancel).await?;
        if !resp.is_success() {
            return Err(translate_error_response(&resp, call.request_id()));
        }

        let value: Value = serde_json::from_str(&resp.body)
            .map_err(Error::Serialization)
            .map_err(|e| e.ensure_request_id(call.request_id()))?;
        Ok(parse_chat_response(&value))
    }

    async fn stream(
        &self,
        model: &ProviderModel,
        request: &ChatRequest,
        call: &CallContext,
        cancel: &CancellationToken,
    ) -> Result<EventStream> {
        let mut body = build_chat_body(model, request, true);
        apply_hint_overrides(&mut body, request, self.name());

        let resp = self.transport.send(self.request_for(&body), cancel).await?;
        if !resp.is_success() {
            return Err(translate_error_response(&resp, call.request_id()));
        }

        let events = parse_ndjson_stream(&resp.body);
        Ok(Box::pin(futures::stream::iter(events.into_iter().map(Ok))))
    }
}

fn build_chat_body(model: &ProviderModel, request: &ChatRequest, stream: bool) -> Value {
    let messages: Vec<Value> = request
        .messages
        .iter()
        .map(|m| json!({"role": wire_role(m.role), "content": m.content}))
        .collect();

    let mut body = json!({
        "model": model.id,
        "messages": messages,
        "stream": stream,
    });

    let mut options = Map::new();
    if let Some(t) = request.temperature {
        options.insert("temperature".into(), json!(t));
    }
    if let Some(p) = request.top_p {
        options.insert("top_p".into(), json!(p));
    }
    if let Some(max) = request.max_output_tokens {
        options.insert("num_predict".into(), json!(max));
    }
    if !options.is_empty() {
        body["options"] = Value::Object(options);
    }
    if request.wants_json() {
        body["format"] = json!("json");
    }
    if let Some(tools) = &request.tools {
        if !tools.is_empty() {
            body["tools"] = tools_payload(tools);
        }
    }
    body
}

fn parse_chat_response(value: &Value) -> ChatResponse {
    let content = value
        .pointer("/message/content")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let tool_calls = extract_tool_calls(value.pointer("/message/tool_calls"));
    let finish_reason = value
        .get("done_reason")
        .and_then(Value::as_str)
        .map(FinishReason::from_wire);
    let usage = parse_usage(value);

    let mut response =
        ChatResponse::new(Message::assistant(content), usage).with_tool_calls(tool_calls);
    response.finish_reason = finish_reason;
    for key in ["model", "created_at"] {
        if let Some(v) = value.get(key) {
            if !v.is_null() {
                response.raw.insert(key.to_string(), v.clone());
            }
        }
    }
    response
}

/// Ollama sends tool-call arguments as a JSON object; the raw argument string
/// is its serialization. Entries without a name are dropped.
fn extract_tool_calls(calls: Option<&Value>) -> Vec<ToolCall> {
    let Some(Value::Array(entries)) = calls else {
        return Vec::new();
    };
    entries
        .iter()
        .filter_map(|entry| {
            let function = entry.get("function")?;
            let name = function.get("name").and_then(Value::as_str)?;
            if name.is_empty() {
                return None;
            }
            let arguments = match function.get("arguments") {
                Some(Value::String(s)) => s.clone(),
                Some(v) if !v.is_null() => v.to_string(),
                _ => String::from("{}"),
            };
            Some(ToolCall::new(name, arguments))
        })
        .collect()
}

/// `prompt_eval_count`/`eval_count` are Ollama's prompt/completion counts;
/// the total is always computed.
fn parse_usage(value: &Value) -> Usage {
    let prompt = value
        .get("prompt_eval_count")
        .and_then(Value::as_u64)
        .unwrap_or(0) as u32;
    let completion = value.get("eval_count").and_then(Value::as_u64).unwrap_or(0) as u32;
    Usage::from_counts(prompt, completion, None)
}

/// Parse a newline-delimited JSON stream body. Lines after the `done = true`
/// object are ignored; if no such object arrives, a terminal `complete` event
/// is synthesized so the stream never ends silently.
fn parse_ndjson_stream(body: &str) -> Vec<StreamEvent> {
    let mut events = Vec::new();
    let mut reasoning = String::new();
    let mut terminal: Option<StreamEvent> = None;

    for line in body.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let Ok(chunk) = serde_json::from_str::<Value>(line) else {
            continue;
        };

        if chunk.get("done").and_then(Value::as_bool).unwrap_or(false) {
            terminal = Some(StreamEvent::Complete {
                usage: Some(parse_usage(&chunk)),
                reasoning: (!reasoning.is_empty()).then(|| reasoning.clone()),
            });
            break;
        }

        if let Some(text) = chunk.pointer("/message/content").and_then(Value::as_str) {
            if !text.is_empty() {
                events.push(StreamEvent::delta(text));
            }
        }
        if let Some(text) = chunk.pointer("/message/thinking").and_then(Value::as_str) {
            if !text.is_empty() {
                reasoning.push_str(text);
                events.push(StreamEvent::Reasoning {
                    text: text.to_string(),
                });
            }
        }
        for call in extract_tool_calls(chunk.pointer("/message/tool_calls")) {
            events.push(StreamEvent::ToolCall { call });
        }
    }

    events.push(terminal.unwrap_or_else(|| StreamEvent::Complete {
        usage: None,
        reasoning: (!reasoning.is_empty()).then(|| reasoning.clone()),
    }));
    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ResponseFormat;

    fn model() -> ProviderModel {
        ProviderModel::chat("llama3.2")
    }

    #[test]
    fn body_places_knobs_in_options() {
        let request = ChatRequest::new(vec![Message::user("hi")])
            .with_temperature(0.3)
            .with_max_output_tokens(99)
            .with_response_format(ResponseFormat::JsonObject);
        let body = build_chat_body(&model(), &request, false);
        assert_eq!(body["options"]["temperature"], 0.3);
        assert_eq!(body["options"]["num_predict"], 99);
        assert_eq!(body["format"], "json");
        assert_eq!(body["stream"], false);
        assert!(body["options"].get("top_p").is_none());
    }

    #[test]
    fn body_omits_options_when_no_knobs_set() {
        let request = ChatRequest::new(vec![Message::user("hi")]);
        let body = build_chat_body(&model(), &request, true);
        assert!(body.get("options").is_none());
        assert!(body.get("format").is_none());
        assert_eq!(body["stream"], true);
    }

    #[test]
    fn hint_overrides_reach_nested_options() {
        let request = ChatRequest::new(vec![Message::user("hi")])
            .with_temperature(0.9)
            .with_hint("ollama.options.temperature", 0.1)
            .with_hint("ollama.keep_alive", "10m");
        let mut body = build_chat_body(&model(), &request, false);
        apply_hint_overrides(&mut body, &request, "ollama");
        assert_eq!(body["options"]["temperature"], 0.1);
        assert_eq!(body["keep_alive"], "10m");
    }

    #[test]
    fn unary_response_maps_counts_and_done_reason() {
        let value = json!({
            "model": "llama3.2",
            "created_at": "2025-01-01T00:00:00Z",
            "message": {"role": "assistant", "content": "hi there"},
            "done": true,
            "done_reason": "stop",
            "prompt_eval_count": 11,
            "eval_count": 7
        });
        let resp = parse_chat_response(&value);
        assert_eq!(resp.content(), "hi there");
        assert_eq!(resp.finish_reason, Some(FinishReason::Stop));
        assert_eq!(resp.usage, Usage::new(11, 7, 18));
        assert_eq!(resp.raw["model"], "llama3.2");
    }

    #[test]
    fn ndjson_stream_ends_with_usage_terminal() {
        let body = concat!(
            "{\"message\":{\"content\":\"Hello\"},\"done\":false}\n",
            "{\"message\":{\"content\":\" world\"},\"done\":false}\n",
            "{\"done\":true,\"done_reason\":\"stop\",\"prompt_eval_count\":5,\"eval_count\":3}\n",
        );
        let events = parse_ndjson_stream(body);
        assert_eq!(
            events,
            vec![
                StreamEvent::delta("Hello"),
                StreamEvent::delta(" world"),
                StreamEvent::Complete {
                    usage: Some(Usage::new(5, 3, 8)),
                    reasoning: None,
                },
            ]
        );
        assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);
    }

    #[test]
    fn ndjson_stream_without_done_synthesizes_terminal() {
        let body = "{\"message\":{\"content\":\"partial\"},\"done\":false}\n";
        let events = parse_ndjson_stream(body);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0], StreamEvent::delta("partial"));
        assert_eq!(
            events[1],
            StreamEvent::Complete {
                usage: None,
                reasoning: None
            }
        );
    }

    #[test]
    fn ndjson_stream_emits_tool_calls() {
        let body = concat!(
            "{\"message\":{\"tool_calls\":[{\"function\":{\"name\":\"weather\",\"arguments\":{\"city\":\"Oslo\"}}}]},\"done\":false}\n",
            "{\"done\":true,\"done_reason\":\"tool_calls\"}\n",
        );
        let events = parse_ndjson_stream(body);
        match &events[0] {
            StreamEvent::ToolCall { call } => {
                assert_eq!(call.name, "weather");
                let v: Value = serde_json::from_str(&call.arguments_json).unwrap();
                assert_eq!(v["city"], "Oslo");
            }
            other => panic!("expected tool call event, got {:?}", other),
        }
    }
}
