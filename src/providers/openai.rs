//! OpenAI-style chat completions adapter.
//!
//! The wire shaping and mapping functions are shared with the Azure adapter,
//! which speaks the same dialect behind a different URL and auth scheme.

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
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Adapter for OpenAI-compatible chat completion endpoints.
pub struct OpenAiAdapter {
    transport: Arc<dyn Transport>,
    base_url: String,
    api_key: Option<String>,
}

impl OpenAiAdapter {
    pub fn new(transport: Arc<dyn Transport>, base_url: impl Into<String>) -> Self {
        Self {
            transport,
            base_url: base_url.into(),
            api_key: None,
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    fn request_for(&self, body: &Value) -> TransportRequest {
        let url = format!(
            "{}/chat/completions",
            self.base_url.trim_end_matches('/')
        );
        let mut req = TransportRequest::post(url, body.to_string())
            .with_header("content-type", "application/json");
        if let Some(key) = &self.api_key {
            req = req.with_header("authorization", format!("Bearer {}", key));
        }
        req
    }
}

#[async_trait]
impl ProviderAdapter for OpenAiAdapter {
    fn name(&self) -> &'static str {
        "openai"
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities::new()
            .with_streaming()
            .with_json_mode()
            .with_tools()
            .with_vision()
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
        parse_chat_response(&value).map_err(|e| e.ensure_request_id(call.request_id()))
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

        let events = parse_sse_stream(&resp.body);
        Ok(Box::pin(futures::stream::iter(events.into_iter().map(Ok))))
    }
}

/// Shape the request body. Optional knobs are emitted only when present and
/// preserved exactly; `json_object` mode always reaches the wire.
pub(crate) fn build_chat_body(
    model: &ProviderModel,
    request: &ChatRequest,
    stream: bool,
) -> Value {
    let messages: Vec<Value> = request
        .messages
        .iter()
        .map(|m| json!({"role": wire_role(m.role), "content": m.content}))
        .collect();

    let mut body = json!({
        "model": model.id,
        "messages": messages,
    });
    if let Some(t) = request.temperature {
        body["temperature"] = json!(t);
    }
    if let Some(p) = request.top_p {
        body["top_p"] = json!(p);
    }
    if let Some(max) = request.max_output_tokens {
        body["max_tokens"] = json!(max);
    }
    if request.wants_json() {
        body["response_format"] = json!({"type": "json_object"});
    }
    if let Some(tools) = &request.tools {
        if !tools.is_empty() {
            body["tools"] = tools_payload(tools);
        }
    }
    if stream {
        body["stream"] = json!(true);
    }
    body
}

/// Map a unary completion response into the normalized shape.
pub(crate) fn parse_chat_response(value: &Value) -> Result<ChatResponse> {
    let choice = value
        .pointer("/choices/0")
        .ok_or_else(|| Error::llm("provider response has no choices"))?;
    let message = choice.get("message").cloned().unwrap_or(Value::Null);

    let content = extract_content(message.get("content"));
    let tool_calls = extract_tool_calls(message.get("tool_calls"));
    let finish_reason = choice
        .get("finish_reason")
        .and_then(Value::as_str)
        .map(FinishReason::from_wire);
    let usage = parse_usage(value.get("usage"));

    let mut response = ChatResponse::new(Message::assistant(content), usage)
        .with_tool_calls(tool_calls);
    response.finish_reason = finish_reason;

    // Vendor passthrough fields.
    for key in ["id", "model", "created", "system_fingerprint"] {
        if let Some(v) = value.get(key) {
            if !v.is_null() {
                response.raw.insert(key.to_string(), v.clone());
            }
        }
    }
    Ok(response)
}

/// Assistant text: accept both a plain string and an array of typed parts.
fn extract_content(content: Option<&Value>) -> String {
    match content {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Array(parts)) => parts
            .iter()
            .filter_map(|p| p.get("text").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join(""),
        _ => String::new(),
    }
}

/// Ordered tool calls; entries without a name are dropped.
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
                Some(v @ Value::Object(_)) => v.to_string(),
                _ => String::from("{}"),
            };
            Some(ToolCall::new(name, arguments))
        })
        .collect()
}

fn parse_usage(usage: Option<&Value>) -> Usage {
    let prompt = read_u32(usage, "prompt_tokens");
    let completion = read_u32(usage, "completion_tokens");
    let total = usage
        .and_then(|u| u.get("total_tokens"))
        .and_then(Value::as_u64)
        .map(|v| v as u32);
    Usage::from_counts(prompt, completion, total)
}

fn read_u32(value: Option<&Value>, key: &str) -> u32 {
    value
        .and_then(|v| v.get(key))
        .and_then(Value::as_u64)
        .unwrap_or(0) as u32
}

/// Parse an SSE body into ordered stream events.
///
/// Each `data:` line is one JSON object, terminated by a blank line;
/// `data: [DONE]` ends the stream, and any payload still buffered at end of
/// body is parsed as a final event. Exactly one terminal `complete` event is
/// emitted, carrying the final usage and the coalesced reasoning text.
pub(crate) fn parse_sse_stream(body: &str) -> Vec<StreamEvent> {
    let mut events = Vec::new();
    let mut usage: Option<Usage> = None;
    let mut reasoning = String::new();
    let mut tool_names: HashMap<u64, String> = HashMap::new();
    let mut buffered = String::new();

    let absorb = |payload: &str,
                  events: &mut Vec<StreamEvent>,
                  usage: &mut Option<Usage>,
                  reasoning: &mut String,
                  tool_names: &mut HashMap<u64, String>| {
        let Ok(chunk) = serde_json::from_str::<Value>(payload) else {
            // Skip frames that are not JSON.
            return;
        };
        absorb_chunk(&chunk, events, usage, reasoning, tool_names);
    };

    for line in body.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            if !buffered.is_empty() {
                absorb(&buffered, &mut events, &mut usage, &mut reasoning, &mut tool_names);
                buffered.clear();
            }
            continue;
        }
        if trimmed.starts_with(':') {
            continue;
        }
        if let Some(payload) = trimmed.strip_prefix("data:") {
            let payload = payload.trim_start();
            if payload == "[DONE]" {
                break;
            }
            buffered.push_str(payload);
        }
    }
    if !buffered.is_empty() {
        absorb(&buffered, &mut events, &mut usage, &mut reasoning, &mut tool_names);
    }

    events.push(StreamEvent::Complete {
        usage,
        reasoning: (!reasoning.is_empty()).then(|| reasoning.clone()),
    });
    events
}

fn absorb_chunk(
    chunk: &Value,
    events: &mut Vec<StreamEvent>,
    usage: &mut Option<Usage>,
    reasoning: &mut String,
    tool_names: &mut HashMap<u64, String>,
) {
    if let Some(delta) = chunk.pointer("/choices/0/delta") {
        if let Some(text) = delta.get("content").and_then(Value::as_str) {
            if !text.is_empty() {
                events.push(StreamEvent::delta(text));
            }
        }
        if let Some(text) = delta.get("reasoning_content").and_then(Value::as_str) {
            if !text.is_empty() {
                reasoning.push_str(text);
                events.push(StreamEvent::Reasoning {
                    text: text.to_string(),
                });
            }
        }
        if let Some(Value::Array(fragments)) = delta.get("tool_calls") {
            for fragment in fragments {
                let index = fragment.get("index").and_then(Value::as_u64).unwrap_or(0);
                if let Some(name) = fragment.pointer("/function/name").and_then(Value::as_str) {
                    if !name.is_empty() {
                        tool_names.insert(index, name.to_string());
                    }
                }
                // Later fragments carry only argument pieces; resolve the
                // name through the per-index memory. Nameless fragments with
                // no prior name are dropped.
                let Some(name) = tool_names.get(&index).cloned() else {
                    continue;
                };
                let arguments = fragment
                    .pointer("/function/arguments")
                    .and_then(Value::as_str)
                    .unwrap_or("")
                    .to_string();
                events.push(StreamEvent::ToolCall {
                    call: ToolCall::new(name, arguments),
                });
            }
        }
    }
    if let Some(u) = chunk.get("usage") {
        if !u.is_null() {
            *usage = Some(parse_usage(Some(u)));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ResponseFormat, ToolCollection, ToolDefinition};

    fn model() -> ProviderModel {
        ProviderModel::chat("gpt-4o-mini")
    }

    #[test]
    fn body_contains_only_present_fields() {
        let request = ChatRequest::new(vec![Message::user("hi")]);
        let body = build_chat_body(&model(), &request, false);
        assert_eq!(body["model"], "gpt-4o-mini");
        assert_eq!(body["messages"][0]["role"], "user");
        assert!(body.get("temperature").is_none());
        assert!(body.get("top_p").is_none());
        assert!(body.get("max_tokens").is_none());
        assert!(body.get("response_format").is_none());
        assert!(body.get("tools").is_none());
        assert!(body.get("stream").is_none());
    }

    #[test]
    fn body_serializes_knobs_and_json_mode() {
        let mut tools = ToolCollection::new();
        tools.push(ToolDefinition::new("weather", "forecast")).unwrap();
        let request = ChatRequest::new(vec![Message::system("sys"), Message::user("hi")])
            .with_temperature(0.5)
            .with_top_p(0.9)
            .with_max_output_tokens(777)
            .with_response_format(ResponseFormat::JsonObject)
            .with_tools(tools);
        let body = build_chat_body(&model(), &request, true);
        assert_eq!(body["temperature"], 0.5);
        assert_eq!(body["top_p"], 0.9);
        assert_eq!(body["max_tokens"], 777);
        assert_eq!(body["response_format"]["type"], "json_object");
        assert_eq!(body["tools"][0]["function"]["name"], "weather");
        assert_eq!(body["stream"], true);
        assert_eq!(body["messages"][0]["role"], "system");
    }

    #[test]
    fn response_mapping_string_content() {
        let value = json!({
            "id": "chatcmpl-1",
            "model": "gpt-4o-mini",
            "created": 1700000000,
            "system_fingerprint": "fp_x",
            "choices": [{
                "message": {"role": "assistant", "content": "hello"},
                "finish_reason": "stop"
            }],
            "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
        });
        let resp = parse_chat_response(&value).unwrap();
        assert_eq!(resp.content(), "hello");
        assert_eq!(resp.finish_reason, Some(FinishReason::Stop));
        assert_eq!(resp.usage, Usage::new(10, 5, 15));
        assert_eq!(resp.raw["id"], "chatcmpl-1");
        assert_eq!(resp.raw["system_fingerprint"], "fp_x");
        assert_eq!(resp.raw["created"], 1700000000);
    }

    #[test]
    fn response_mapping_parts_content_and_computed_total() {
        let value = json!({
            "choices": [{
                "message": {"content": [
                    {"type": "text", "text": "hel"},
                    {"type": "text", "text": "lo"}
                ]},
                "finish_reason": "length"
            }],
            "usage": {"prompt_tokens": 7, "completion_tokens": 3}
        });
        let resp = parse_chat_response(&value).unwrap();
        assert_eq!(resp.content(), "hello");
        assert_eq!(resp.finish_reason, Some(FinishReason::Length));
        assert_eq!(resp.usage, Usage::new(7, 3, 10));
    }

    #[test]
    fn response_mapping_drops_nameless_tool_calls() {
        let value = json!({
            "choices": [{
                "message": {
                    "content": null,
                    "tool_calls": [
                        {"function": {"name": "weather", "arguments": "{\"city\":\"Oslo\"}"}},
                        {"function": {"arguments": "{}"}},
                        {"function": {"name": "", "arguments": "{}"}}
                    ]
                },
                "finish_reason": "tool_calls"
            }]
        });
        let resp = parse_chat_response(&value).unwrap();
        assert_eq!(resp.tool_calls.len(), 1);
        assert_eq!(resp.tool_calls[0].name, "weather");
        assert_eq!(resp.finish_reason, Some(FinishReason::ToolCall));
    }

    #[test]
    fn missing_choices_is_an_error() {
        assert!(parse_chat_response(&json!({"usage": {}})).is_err());
    }

    #[test]
    fn sse_stream_parses_deltas_and_terminates_once() {
        let body = concat!(
            "data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"lo\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{}}],\"usage\":{\"prompt_tokens\":4,\"completion_tokens\":2,\"total_tokens\":6}}\n\n",
            "data: [DONE]\n\n",
        );
        let events = parse_sse_stream(body);
        assert_eq!(
            events,
            vec![
                StreamEvent::delta("Hel"),
                StreamEvent::delta("lo"),
                StreamEvent::Complete {
                    usage: Some(Usage::new(4, 2, 6)),
                    reasoning: None,
                },
            ]
        );
        assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);
    }

    #[test]
    fn sse_stream_parses_buffered_tail_without_done() {
        let body = "data: {\"choices\":[{\"delta\":{\"content\":\"tail\"}}]}";
        let events = parse_sse_stream(body);
        assert_eq!(events[0], StreamEvent::delta("tail"));
        assert!(matches!(events[1], StreamEvent::Complete { .. }));
    }

    #[test]
    fn sse_stream_coalesces_reasoning() {
        let body = concat!(
            "data: {\"choices\":[{\"delta\":{\"reasoning_content\":\"think \"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"reasoning_content\":\"hard\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"answer\"}}]}\n\n",
            "data: [DONE]\n\n",
        );
        let events = parse_sse_stream(body);
        assert_eq!(
            events.last().unwrap(),
            &StreamEvent::Complete {
                usage: None,
                reasoning: Some("think hard".to_string()),
            }
        );
    }

    #[test]
    fn sse_stream_resolves_tool_call_fragment_names_by_index() {
        let body = concat!(
            "data: {\"choices\":[{\"delta\":{\"tool_calls\":[{\"index\":0,\"function\":{\"name\":\"weather\",\"arguments\":\"{\\\"ci\"}}]}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"tool_calls\":[{\"index\":0,\"function\":{\"arguments\":\"ty\\\":\\\"Oslo\\\"}\"}}]}}]}\n\n",
            "data: [DONE]\n\n",
        );
        let events = parse_sse_stream(body);
        let calls: Vec<&ToolCall> = events
            .iter()
            .filter_map(|e| match e {
                StreamEvent::ToolCall { call } => Some(call),
                _ => None,
            })
            .collect();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].name, "weather");
        assert_eq!(calls[1].name, "weather");
        let joined: String = calls.iter().map(|c| c.arguments_json.as_str()).collect();
        assert_eq!(joined, r#"{"city":"Oslo"}"#);
    }

    #[test]
    fn sse_comment_lines_are_ignored()  {
        let body = ": keep-alive\n\ndata: {\"choices\":[{\"delta\":{\"content\":\"x\"}}]}\n\ndata: [DONE]\n\n";
        let events = parse_sse_stream(body);
        assert_eq!(events[0], StreamEvent::delta("x"));
    }
}
