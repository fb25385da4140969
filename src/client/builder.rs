//! Client builder: assembles the middleware chain once, snapshots options.

use super::core::LlmClient;
use crate::cache::{InMemoryResponseCache, ResponseCache};
use crate::context::ClientOptions;
use crate::middleware::{
    CacheMiddleware, ChainBuilder, LoggingMiddleware, MetricsMiddleware, Middleware,
    RedactionMiddleware, TerminalMiddleware, TracingMiddleware, ValidatorMiddleware,
};
use crate::providers::ProviderAdapter;
use crate::resilience::CompositePolicy;
use crate::{Error, Result};
use std::sync::Arc;
use std::time::Duration;

/// Builds an [`LlmClient`] with the default pipeline:
/// Tracing → Redaction → Logging → Metrics → custom… → Validator → Cache →
/// Terminal. Custom middlewares slot in between Metrics and the validation/
/// cache tail, in registration order.
pub struct LlmClientBuilder {
    provider: Option<Arc<dyn ProviderAdapter>>,
    model_id: Option<String>,
    options: ClientOptions,
    cache: Option<Arc<dyn ResponseCache>>,
    cache_ttl: Option<Duration>,
    custom: Vec<Arc<dyn Middleware>>,
    resilience: Option<CompositePolicy>,
}

impl LlmClientBuilder {
    pub fn new() -> Self {
        Self {
            provider: None,
            model_id: None,
            options: ClientOptions::default(),
            cache: None,
            cache_ttl: None,
            custom: Vec::new(),
            resilience: None,
        }
    }

    pub fn provider(mut self, provider: Arc<dyn ProviderAdapter>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn model(mut self, id: impl Into<String>) -> Self {
        self.model_id = Some(id.into());
        self
    }

    pub fn options(mut self, options: ClientOptions) -> Self {
        self.options = options;
        self
    }

    /// Replace the default in-memory cache backend.
    pub fn cache(mut self, cache: Arc<dyn ResponseCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Default TTL for cached responses (5 minutes if unset).
    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = Some(ttl);
        self
    }

    /// Register a custom middleware. Registration order is preserved.
    pub fn middleware(mut self, middleware: Arc<dyn Middleware>) -> Self {
        self.custom.push(middleware);
        self
    }

    /// Wrap the unary path in resilience policies (outer-first).
    pub fn resilience(mut self, policy: CompositePolicy) -> Self {
        self.resilience = Some(policy);
        self
    }

    pub fn build(self) -> Result<LlmClient> {
        let provider = self
            .provider
            .ok_or_else(|| Error::validation("client requires a provider adapter"))?;
        let model_id = self
            .model_id
            .ok_or_else(|| Error::validation("client requires a model id"))?;
        let model = provider.create_model(&model_id);

        let cache: Arc<dyn ResponseCache> = self
            .cache
            .unwrap_or_else(|| Arc::new(InMemoryResponseCache::new()));
        let mut cache_mw = CacheMiddleware::new(cache);
        if let Some(ttl) = self.cache_ttl {
            cache_mw = cache_mw.with_default_ttl(ttl);
        }

        let mut chain = ChainBuilder::new()
            .add(Arc::new(TracingMiddleware))
            .add(Arc::new(RedactionMiddleware::new()))
            .add(Arc::new(LoggingMiddleware))
            .add(Arc::new(MetricsMiddleware));
        for middleware in self.custom {
            chain = chain.add(middleware);
        }
        let chain = chain
            .add(Arc::new(ValidatorMiddleware))
            .add(Arc::new(cache_mw))
            .add(Arc::new(TerminalMiddleware))
            .build()?;

        Ok(LlmClient::assemble(
            provider,
            model,
            Arc::new(chain),
            self.options,
            self.resilience,
        ))
    }
}

impl Default for LlmClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}
