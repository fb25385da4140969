//! Cache middleware: unary response caching with hint-driven TTLs.

use super::{Middleware, Next};
use crate::cache::ResponseCache;
use crate::context::{keys, LlmContext};
use crate::types::{ChatRequest, ChatResponse};
use crate::utils::hashing::request_hash;
use crate::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_TTL: Duration = Duration::from_secs(300);

/// Caches unary responses under `<provider>:<model>:<request-hash>`.
///
/// The streaming path passes through untouched. A `no_cache` provider hint
/// (bool, `"true"`, or non-zero int) bypasses the cache entirely without
/// setting any `llm.cache.*` item. Responses carrying tool calls are never
/// stored: tool results are side-effecting by contract.
pub struct CacheMiddleware {
    cache: Arc<dyn ResponseCache>,
    default_ttl: Duration,
}

impl CacheMiddleware {
    pub fn new(cache: Arc<dyn ResponseCache>) -> Self {
        Self {
            cache,
            default_ttl: DEFAULT_TTL,
        }
    }

    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    fn bypassed(request: &ChatRequest) -> bool {
        match request.hint("no_cache") {
            Some(Value::Bool(b)) => *b,
            Some(Value::String(s)) => s == "true",
            Some(Value::Number(n)) => n.as_i64().map(|v| v != 0).unwrap_or(false),
            _ => false,
        }
    }

    fn positive_seconds(value: &Value) -> Option<Duration> {
        match value {
            Value::Number(n) => {
                if let Some(v) = n.as_u64() {
                    (v > 0).then(|| Duration::from_secs(v))
                } else {
                    n.as_f64()
                        .filter(|v| *v > 0.0)
                        .map(Duration::from_secs_f64)
                }
            }
            Value::String(s) => s
                .parse::<u64>()
                .ok()
                .filter(|v| *v > 0)
                .map(Duration::from_secs),
            _ => None,
        }
    }

    /// TTL precedence: `cache_ttl_seconds` hint, then `cache_ttl`, then the
    /// construction-time default.
    fn resolve_ttl(&self, request: &ChatRequest) -> Duration {
        request
            .hint("cache_ttl_seconds")
            .and_then(Self::positive_seconds)
            .or_else(|| request.hint("cache_ttl").and_then(Self::positive_seconds))
            .unwrap_or(self.default_ttl)
    }

    fn key(ctx: &LlmContext, request: &ChatRequest) -> String {
        format!(
            "{}:{}:{}",
            ctx.provider.name(),
            ctx.model.id,
            request_hash(request)
        )
    }
}

#[async_trait]
impl Middleware for CacheMiddleware {
    fn name(&self) -> &'static str {
        "cache"
    }

    async fn handle(&self, ctx: Arc<LlmContext>, next: Next<'_>) -> Result<ChatResponse> {
        let request = ctx.request_snapshot();
        if Self::bypassed(&request) {
            return next.run(ctx).await;
        }

        let key = Self::key(&ctx, &request);
        if let Some(hit) = self.cache.get(&key).await {
            ctx.call.set_item(keys::CACHE_HIT, true);
            return Ok(hit);
        }

        let response = next.run(ctx.clone()).await?;
        let ttl = self.resolve_ttl(&request);
        if response.tool_calls.is_empty() && !ttl.is_zero() {
            self.cache.set(&key, &response, ttl).await;
            ctx.call.set_item(keys::CACHE_STORED, true);
        }
        Ok(response)
    }

    // Streaming inherits the pass-through default: only unary responses are
    // cached.
}
