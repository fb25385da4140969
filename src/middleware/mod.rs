//! 中间件管道：按注册顺序组合的拦截器链，以终端中间件收尾。
//!
//! # Middleware Pipeline
//!
//! The pipeline is an ordered list of interceptors terminating in exactly one
//! terminal middleware. Non-terminal layers receive the shared context and a
//! [`Next`] continuation; they may short-circuit (return without calling it),
//! or call it at most once and observe/transform the result. Calling `next`
//! more than once is impossible: `Next` consumes itself.
//!
//! Assembly is a right-fold: the innermost continuation invokes the terminal,
//! which calls the provider adapter.
//!
//! ## Default order (outer → inner)
//!
//! Tracing → Redaction → Logging → Metrics → custom… → Validator → Cache →
//! Terminal. Tracing wraps everything; redaction runs before anything logs
//! content; logging and metrics observe final outcomes; the validator
//! annotates before the cache stores; the cache short-circuits only validated
//! results; the terminal performs the actual call.
//!
//! ## Streaming
//!
//! The streaming path mirrors the unary one but yields an ordered event
//! sequence. Middlewares must preserve provider-emitted event order; they may
//! observe or inject, never reorder.

mod cache;
mod logging;
mod metrics;
mod redaction;
mod terminal;
mod trace;
mod validator;

pub use cache::CacheMiddleware;
pub use logging::LoggingMiddleware;
pub use metrics::MetricsMiddleware;
pub use redaction::RedactionMiddleware;
pub use terminal::TerminalMiddleware;
pub use trace::TracingMiddleware;
pub use validator::ValidatorMiddleware;

use crate::context::LlmContext;
use crate::types::{ChatResponse, StreamEvent};
use crate::{BoxStream, Error, Result};
use async_trait::async_trait;
use std::sync::Arc;

/// Ordered sequence of stream events produced by the streaming path.
pub type EventStream = BoxStream<'static, StreamEvent>;

/// A layered interceptor in the request pipeline.
#[async_trait]
pub trait Middleware: Send + Sync {
    fn name(&self) -> &'static str;

    /// Terminal middlewares replace any previously registered terminal and
    /// never call their continuation.
    fn is_terminal(&self) -> bool {
        false
    }

    /// Unary path. Thrown errors propagate unchanged unless a layer catches
    /// them (tracing/logging/metrics observe and re-throw).
    async fn handle(&self, ctx: Arc<LlmContext>, next: Next<'_>) -> Result<ChatResponse>;

    /// Streaming path. The default is a pass-through for layers that only
    /// act on the unary path.
    async fn handle_stream(&self, ctx: Arc<LlmContext>, next: Next<'_>) -> Result<EventStream> {
        next.stream(ctx).await
    }
}

/// Continuation handle for the remaining chain. Consuming `run`/`stream`
/// enforces the at-most-once contract.
pub struct Next<'a> {
    chain: &'a [Arc<dyn Middleware>],
}

impl<'a> Next<'a> {
    pub async fn run(self, ctx: Arc<LlmContext>) -> Result<ChatResponse> {
        match self.chain.split_first() {
            Some((head, rest)) => head.handle(ctx, Next { chain: rest }).await,
            None => Err(Error::llm("middleware chain ran past its terminal")),
        }
    }

    pub async fn stream(self, ctx: Arc<LlmContext>) -> Result<EventStream> {
        match self.chain.split_first() {
            Some((head, rest)) => head.handle_stream(ctx, Next { chain: rest }).await,
            None => Err(Error::llm("middleware chain ran past its terminal")),
        }
    }
}

/// Built pipeline: all middlewares in invocation order, terminal last.
pub struct Chain {
    middlewares: Vec<Arc<dyn Middleware>>,
}

impl std::fmt::Debug for Chain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Chain")
            .field("middlewares", &self.middlewares.iter().map(|m| m.name()).collect::<Vec<_>>())
            .finish()
    }
}

impl Chain {
    pub async fn execute(&self, ctx: Arc<LlmContext>) -> Result<ChatResponse> {
        Next {
            chain: &self.middlewares,
        }
        .run(ctx)
        .await
    }

    pub async fn execute_stream(&self, ctx: Arc<LlmContext>) -> Result<EventStream> {
        Next {
            chain: &self.middlewares,
        }
        .stream(ctx)
        .await
    }

    pub fn len(&self) -> usize {
        self.middlewares.len()
    }

    pub fn is_empty(&self) -> bool {
        self.middlewares.is_empty()
    }
}

/// Chain builder: middlewares in registration order plus one designated
/// terminal. Adding a middleware that claims the terminal role replaces any
/// prior terminal; building without one fails.
#[derive(Default)]
pub struct ChainBuilder {
    middlewares: Vec<Arc<dyn Middleware>>,
    terminal: Option<Arc<dyn Middleware>>,
}

impl ChainBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(mut self, middleware: Arc<dyn Middleware>) -> Self {
        if middleware.is_terminal() {
            self.terminal = Some(middleware);
        } else {
            self.middlewares.push(middleware);
        }
        self
    }

    pub fn build(self) -> Result<Chain> {
        let terminal = self
            .terminal
            .ok_or_else(|| Error::validation("middleware pipeline requires a terminal middleware"))?;
        let mut middlewares = self.middlewares;
        middlewares.push(terminal);
        Ok(Chain { middlewares })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{CallContext, ClientOptions, LlmContext};
    use crate::providers::ProviderAdapter;
    use crate::types::{
        ChatRequest, Message, ProviderCapabilities, ProviderModel, Usage,
    };
    use futures::StreamExt;
    use std::sync::Mutex;
    use tokio_util::sync::CancellationToken;

    struct NullAdapter;

    #[async_trait]
    impl ProviderAdapter for NullAdapter {
        fn name(&self) -> &'static str {
            "null"
        }

        fn capabilities(&self) -> ProviderCapabilities {
            ProviderCapabilities::new().with_streaming()
        }

        fn create_model(&self, id: &str) -> ProviderModel {
            ProviderModel::chat(id)
        }

        async fn send(
            &self,
            _model: &ProviderModel,
            _request: &ChatRequest,
            _call: &CallContext,
            _cancel: &CancellationToken,
        ) -> Result<ChatResponse> {
            Ok(ChatResponse::new(
                Message::assistant("leaf"),
                Usage::new(1, 1, 2),
            ))
        }

        async fn stream(
            &self,
            _model: &ProviderModel,
            _request: &ChatRequest,
            _call: &CallContext,
            _cancel: &CancellationToken,
        ) -> Result<EventStream> {
            let events = vec![
                Ok(StreamEvent::delta("a")),
                Ok(StreamEvent::delta("b")),
                Ok(StreamEvent::complete(None)),
            ];
            Ok(Box::pin(futures::stream::iter(events)))
        }
    }

    fn test_ctx() -> Arc<LlmContext> {
        Arc::new(LlmContext::new(
            Arc::new(NullAdapter),
            ProviderModel::chat("m"),
            ChatRequest::new(vec![Message::user("hi")]),
            CallContext::new("00000000000000000000000000000000"),
            ClientOptions::default(),
            CancellationToken::new(),
        ))
    }

    struct Recorder {
        label: &'static str,
        log: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl Middleware for Recorder {
        fn name(&self) -> &'static str {
            self.label
        }

        async fn handle(&self, ctx: Arc<LlmContext>, next: Next<'_>) -> Result<ChatResponse> {
            self.log.lock().unwrap().push(format!("enter {}", self.label));
            let out = next.run(ctx).await;
            self.log.lock().unwrap().push(format!("exit {}", self.label));
            out
        }
    }

    struct ShortCircuit;

    #[async_trait]
    impl Middleware for ShortCircuit {
        fn name(&self) -> &'static str {
            "short_circuit"
        }

        async fn handle(&self, _ctx: Arc<LlmContext>, _next: Next<'_>) -> Result<ChatResponse> {
            Ok(ChatResponse::new(
                Message::assistant("short"),
                Usage::default(),
            ))
        }
    }

    #[tokio::test]
    async fn entry_and_exit_interleave_in_lifo_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let chain = ChainBuilder::new()
            .add(Arc::new(Recorder {
                label: "outer",
                log: log.clone(),
            }))
            .add(Arc::new(Recorder {
                label: "inner",
                log: log.clone(),
            }))
            .add(Arc::new(TerminalMiddleware))
            .build()
            .unwrap();

        let resp = chain.execute(test_ctx()).await.unwrap();
        assert_eq!(resp.content(), "leaf");
        assert_eq!(
            *log.lock().unwrap(),
            vec!["enter outer", "enter inner", "exit inner", "exit outer"]
        );
    }

    #[tokio::test]
    async fn short_circuit_skips_inner_layers() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let chain = ChainBuilder::new()
            .add(Arc::new(ShortCircuit))
            .add(Arc::new(Recorder {
                label: "inner",
                log: log.clone(),
            }))
            .add(Arc::new(TerminalMiddleware))
            .build()
            .unwrap();

        let resp = chain.execute(test_ctx()).await.unwrap();
        assert_eq!(resp.content(), "short");
        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn build_fails_without_a_terminal() {
        let err = ChainBuilder::new().add(Arc::new(ShortCircuit)).build().unwrap_err();
        assert_eq!(err.kind(), "validation");
    }

    #[tokio::test]
    async fn later_terminal_replaces_prior_terminal() {
        struct CountingTerminal(Arc<Mutex<u32>>);

        #[async_trait]
        impl Middleware for CountingTerminal {
            fn name(&self) -> &'static str {
                "counting_terminal"
            }

            fn is_terminal(&self) -> bool {
                true
            }

            async fn handle(
                &self,
                _ctx: Arc<LlmContext>,
                _next: Next<'_>,
            ) -> Result<ChatResponse> {
                *self.0.lock().unwrap() += 1;
                Ok(ChatResponse::new(
                    Message::assistant("replacement"),
                    Usage::default(),
                ))
            }
        }

        let calls = Arc::new(Mutex::new(0));
        let chain = ChainBuilder::new()
            .add(Arc::new(TerminalMiddleware))
            .add(Arc::new(CountingTerminal(calls.clone())))
            .build()
            .unwrap();

        assert_eq!(chain.len(), 1);
        let resp = chain.execute(test_ctx()).await.unwrap();
        assert_eq!(resp.content(), "replacement");
        assert_eq!(*calls.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn streaming_passes_events_through_in_order() {
        let chain = ChainBuilder::new()
            .add(Arc::new(ShortCircuitNever))
            .add(Arc::new(TerminalMiddleware))
            .build()
            .unwrap();

        let mut stream = chain.execute_stream(test_ctx()).await.unwrap();
        let mut seen = Vec::new();
        while let Some(ev) = stream.next().await {
            seen.push(ev.unwrap());
        }
        assert_eq!(
            seen,
            vec![
                StreamEvent::delta("a"),
                StreamEvent::delta("b"),
                StreamEvent::complete(None),
            ]
        );
    }

    /// Pass-through layer exercising the default `handle_stream`.
    struct ShortCircuitNever;

    #[async_trait]
    impl Middleware for ShortCircuitNever {
        fn name(&self) -> &'static str {
            "pass_through"
        }

        async fn handle(&self, ctx: Arc<LlmContext>, next: Next<'_>) -> Result<ChatResponse> {
            next.run(ctx).await
        }
    }
}
