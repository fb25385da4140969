//! Redaction middleware: masks sensitive content before anything can log it.

use super::{EventStream, Middleware, Next};
use crate::context::{keys, LlmContext};
use crate::types::{ChatResponse, Message};
use crate::Result;
use async_trait::async_trait;
use regex::Regex;
use std::sync::Arc;

const PREVIEW_MAX_CHARS: usize = 160;
const EMAIL_MASK: &str = "***@***";
const DIGITS_MASK: &str = "***-***-****";
const CREDENTIAL_MASK: &str = "[credential]";

/// Applies an ordered set of masking rules to message content.
///
/// When redaction is enabled, a masked copy of the message list is published
/// under `llm.redacted.messages`. A masked preview of the last one-or-two
/// messages is always published under `llm.redacted.preview`; middlewares
/// that log content must use it. The original request is never mutated.
pub struct RedactionMiddleware {
    email: Regex,
    digit_run: Regex,
    credential: Regex,
}

impl RedactionMiddleware {
    pub fn new() -> Self {
        Self {
            email: Regex::new(r"[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}").unwrap(),
            digit_run: Regex::new(r"\+?\d[\d\s().-]{7,}\d").unwrap(),
            credential: Regex::new(
                r"(?i)\b(?:api[_-]?key|secret|token|password)\b\s*[:=]\s*\S+|\bsk-[A-Za-z0-9]{16,}\b",
            )
            .unwrap(),
        }
    }

    /// Rules apply in order: emails, long digit runs, credential patterns.
    fn mask(&self, content: &str) -> String {
        let masked = self.email.replace_all(content, EMAIL_MASK);
        let masked = self.digit_run.replace_all(&masked, DIGITS_MASK);
        self.credential
            .replace_all(&masked, CREDENTIAL_MASK)
            .into_owned()
    }

    /// Last one-or-two message contents, masked, whitespace-normalized,
    /// joined with " | " and trimmed to 160 chars.
    fn preview(&self, messages: &[Message]) -> String {
        let tail = messages.iter().rev().take(2).collect::<Vec<_>>();
        let joined = tail
            .iter()
            .rev()
            .map(|m| {
                self.mask(&m.content)
                    .split_whitespace()
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .collect::<Vec<_>>()
            .join(" | ");
        match joined.char_indices().nth(PREVIEW_MAX_CHARS) {
            Some((idx, _)) => joined[..idx].to_string(),
            None => joined,
        }
    }

    fn publish(&self, ctx: &LlmContext) {
        ctx.with_request(|request| {
            if ctx.options.enable_redaction {
                let masked: Vec<Message> = request
                    .messages
                    .iter()
                    .map(|m| Message::new(m.role, self.mask(&m.content)))
                    .collect();
                if let Ok(value) = serde_json::to_value(&masked) {
                    ctx.call.set_item(keys::REDACTED_MESSAGES, value);
                }
            }
            ctx.call
                .set_item(keys::REDACTED_PREVIEW, self.preview(&request.messages));
        });
    }
}

impl Default for RedactionMiddleware {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Middleware for RedactionMiddleware {
    fn name(&self) -> &'static str {
        "redaction"
    }

    async fn handle(&self, ctx: Arc<LlmContext>, next: Next<'_>) -> Result<ChatResponse> {
        self.publish(&ctx);
        next.run(ctx).await
    }

    async fn handle_stream(&self, ctx: Arc<LlmContext>, next: Next<'_>) -> Result<EventStream> {
        self.publish(&ctx);
        next.stream(ctx).await
    }
}
