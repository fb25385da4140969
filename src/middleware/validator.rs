//! Validator middleware: JSON-mode and tool-call response checks.

use super::{EventStream, Middleware, Next};
use crate::context::{keys, LlmContext};
use crate::types::{ChatRequest, ChatResponse, StreamEvent, ToolCall};
use crate::{Error, ErrorContext, Result};
use async_trait::async_trait;
use futures::StreamExt;
use serde_json::Value;
use std::sync::Arc;

/// Two validation layers over the terminal's result.
///
/// JSON mode: when the request asked for `json_object`, the response content
/// must parse as a JSON value whose top level is an object. Tool calls: every
/// call must name a declared tool (case-sensitive), carry parseable JSON
/// arguments, and supply each property the schema lists as `required`.
///
/// Strict mode (`throw_on_invalid_json`) fails with a `validation` error.
/// Lenient mode annotates the response `raw` map (`json_invalid`,
/// `tool_mismatch`), or on the streaming path publishes the equivalent
/// context items.
pub struct ValidatorMiddleware;

enum ToolRule {
    UnknownTool(String),
    BadArguments(String),
    MissingRequired { tool: String, property: String },
}

impl ValidatorMiddleware {
    fn json_object_problem(content: &str) -> Option<&'static str> {
        match serde_json::from_str::<Value>(content) {
            Ok(Value::Object(_)) => None,
            Ok(_) => Some("top-level value is not an object"),
            Err(_) => Some("content does not parse"),
        }
    }

    fn first_tool_violation(request: &ChatRequest, calls: &[ToolCall]) -> Option<ToolRule> {
        for call in calls {
            let Some(def) = request.tools.as_ref().and_then(|t| t.get(&call.name)) else {
                return Some(ToolRule::UnknownTool(call.name.clone()));
            };
            let args: Value = match serde_json::from_str(&call.arguments_json) {
                Ok(v) => v,
                Err(_) => return Some(ToolRule::BadArguments(call.name.clone())),
            };
            for property in def.required_properties() {
                let present = args
                    .as_object()
                    .map(|o| o.contains_key(property))
                    .unwrap_or(false);
                if !present {
                    return Some(ToolRule::MissingRequired {
                        tool: call.name.clone(),
                        property: property.to_string(),
                    });
                }
            }
        }
        None
    }

    fn tool_error(rule: &ToolRule) -> Error {
        match rule {
            ToolRule::UnknownTool(name) => Error::validation(format!(
                "tool call '{}' is not part of the declared tool collection",
                name
            )),
            ToolRule::BadArguments(name) => Error::validation(format!(
                "tool call '{}' carries arguments that are not valid JSON",
                name
            )),
            ToolRule::MissingRequired { tool, property } => Error::validation(format!(
                "tool call '{}' is missing required argument '{}'",
                tool, property
            )),
        }
    }
}

#[async_trait]
impl Middleware for ValidatorMiddleware {
    fn name(&self) -> &'static str {
        "validator"
    }

    async fn handle(&self, ctx: Arc<LlmContext>, next: Next<'_>) -> Result<ChatResponse> {
        let mut response = next.run(ctx.clone()).await?;
        let request = ctx.request_snapshot();
        let strict = ctx.options.throw_on_invalid_json;

        if request.wants_json() {
            if let Some(problem) = Self::json_object_problem(response.content()) {
                if strict {
                    return Err(Error::validation(format!(
                        "response content is not valid JSON object output ({})",
                        problem
                    ))
                    .with_context(ErrorContext::new().with_request_id(ctx.request_id())));
                }
                response.raw.insert("json_invalid".into(), Value::Bool(true));
            }
        }

        if !response.tool_calls.is_empty() {
            if let Some(rule) = Self::first_tool_violation(&request, &response.tool_calls) {
                if strict {
                    return Err(Self::tool_error(&rule)
                        .with_context(ErrorContext::new().with_request_id(ctx.request_id())));
                }
                response.raw.insert("tool_mismatch".into(), Value::Bool(true));
            }
        }

        Ok(response)
    }

    async fn handle_stream(&self, ctx: Arc<LlmContext>, next: Next<'_>) -> Result<EventStream> {
        let wants_json = ctx.with_request(|r| r.wants_json());
        let has_tools = ctx.with_request(|r| r.tools.is_some());
        let inner = next.stream(ctx.clone()).await?;
        if !wants_json && !has_tools {
            return Ok(inner);
        }

        struct State {
            inner: EventStream,
            ctx: Arc<LlmContext>,
            wants_json: bool,
            buffer: String,
            calls: Vec<ToolCall>,
        }

        impl State {
            /// Fragments with the same tool name coalesce: argument pieces
            /// concatenate in arrival order.
            fn absorb_call(&mut self, call: &ToolCall) {
                if let Some(idx) = self.calls.iter().position(|c| c.name == call.name) {
                    self.calls[idx].arguments_json.push_str(&call.arguments_json);
                } else {
                    self.calls.push(call.clone());
                }
            }

            /// Terminal-time checks. Returns the strict-mode error, if any.
            fn validate_at_terminal(&self) -> Option<Error> {
                let strict = self.ctx.options.throw_on_invalid_json;
                if self.wants_json {
                    if let Some(problem) =
                        ValidatorMiddleware::json_object_problem(&self.buffer)
                    {
                        if strict {
                            return Some(
                                Error::validation(format!(
                                    "streamed content is not valid JSON object output ({})",
                                    problem
                                ))
                                .with_context(
                                    ErrorContext::new()
                                        .with_request_id(self.ctx.request_id()),
                                ),
                            );
                        }
                        self.ctx
                            .call
                            .set_item(keys::VALIDATION_JSON_INVALID, true);
                    }
                }
                if !self.calls.is_empty() {
                    let request = self.ctx.request_snapshot();
                    if let Some(rule) =
                        ValidatorMiddleware::first_tool_violation(&request, &self.calls)
                    {
                        if strict {
                            return Some(ValidatorMiddleware::tool_error(&rule).with_context(
                                ErrorContext::new().with_request_id(self.ctx.request_id()),
                            ));
                        }
                        self.ctx
                            .call
                            .set_item(keys::VALIDATION_TOOL_MISMATCH, true);
                    }
                }
                None
            }
        }

        let events = futures::stream::unfold(
            State {
                inner,
                ctx,
                wants_json,
                buffer: String::new(),
                calls: Vec::new(),
            },
            |mut st| async move {
                let ev = st.inner.next().await?;
                match ev {
                    Ok(StreamEvent::Delta { text }) => {
                        if st.wants_json {
                            st.buffer.push_str(&text);
                        }
                        Some((Ok(StreamEvent::Delta { text }), st))
                    }
                    Ok(StreamEvent::ToolCall { call }) => {
                        st.absorb_call(&call);
                        Some((Ok(StreamEvent::ToolCall { call }), st))
                    }
                    Ok(ev @ StreamEvent::Complete { .. }) => match st.validate_at_terminal() {
                        Some(err) => Some((Err(err), st)),
                        None => Some((Ok(ev), st)),
                    },
                    other => Some((other, st)),
                }
            },
        );

        Ok(Box::pin(events))
    }
}
