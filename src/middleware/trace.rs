//! Tracing middleware: one client-kind span per invocation.

use super::{EventStream, Middleware, Next};
use crate::context::LlmContext;
use crate::types::{ChatResponse, StreamEvent, Usage};
use crate::Result;
use async_trait::async_trait;
use futures::StreamExt;
use std::sync::Arc;
use tracing::field::Empty;
use tracing::{Instrument, Span};

/// Starts a span named `llm.<provider>.<model>`. Span names are static in
/// `tracing`, so the dynamic name rides on the `otel.name` field, which OTel
/// layers read back as the span name. Tags: provider, model, request id,
/// streaming flag, and the
/// sampling knobs when set. On success the finish reason and token counts are
/// recorded; on failure the error kind and message. The request id rides on
/// the span for baggage-style propagation.
pub struct TracingMiddleware;

impl TracingMiddleware {
    fn span(ctx: &LlmContext, streaming: bool) -> Span {
        let span = tracing::info_span!(
            "llm.request",
            otel.name = %format!("llm.{}.{}", ctx.provider.name(), ctx.model.id),
            otel.kind = "client",
            otel.status_code = Empty,
            provider = %ctx.provider.name(),
            model = %ctx.model.id,
            request_id = %ctx.request_id(),
            streaming = streaming,
            temperature = Empty,
            max_output_tokens = Empty,
            finish_reason = Empty,
            prompt_tokens = Empty,
            completion_tokens = Empty,
            total_tokens = Empty,
            error.kind = Empty,
            error.message = Empty,
        );
        ctx.with_request(|request| {
            if let Some(t) = request.temperature {
                span.record("temperature", t);
            }
            if let Some(m) = request.max_output_tokens {
                span.record("max_output_tokens", u64::from(m));
            }
        });
        span
    }

    fn record_usage(span: &Span, usage: &Usage) {
        span.record("prompt_tokens", u64::from(usage.prompt_tokens));
        span.record("completion_tokens", u64::from(usage.completion_tokens));
        span.record("total_tokens", u64::from(usage.total_tokens));
    }
}

#[async_trait]
impl Middleware for TracingMiddleware {
    fn name(&self) -> &'static str {
        "tracing"
    }

    async fn handle(&self, ctx: Arc<LlmContext>, next: Next<'_>) -> Result<ChatResponse> {
        let span = Self::span(&ctx, false);
        let result = next.run(ctx).instrument(span.clone()).await;
        match &result {
            Ok(resp) => {
                if let Some(reason) = resp.finish_reason {
                    span.record("finish_reason", reason.as_str());
                }
                Self::record_usage(&span, &resp.usage);
                span.record("otel.status_code", "OK");
            }
            Err(err) => {
                span.record("otel.status_code", "ERROR");
                span.record("error.kind", err.kind());
                span.record("error.message", tracing::field::display(err));
            }
        }
        result
    }

    async fn handle_stream(&self, ctx: Arc<LlmContext>, next: Next<'_>) -> Result<EventStream> {
        let span = Self::span(&ctx, true);
        let inner = next.stream(ctx).instrument(span.clone()).await?;

        struct State {
            inner: EventStream,
            span: Span,
            usage: Usage,
            failed: bool,
        }

        let events = futures::stream::unfold(
            State {
                inner,
                span,
                usage: Usage::default(),
                failed: false,
            },
            |mut st| async move {
                match st.inner.next().await {
                    Some(Ok(ev)) => {
                        match &ev {
                            StreamEvent::Complete {
                                usage: Some(u), ..
                            } => st.usage.accumulate(u),
                            StreamEvent::Error { kind, .. } => {
                                st.failed = true;
                                st.span.record("error.kind", kind.as_str());
                            }
                            _ => {}
                        }
                        Some((Ok(ev), st))
                    }
                    Some(Err(err)) => {
                        st.failed = true;
                        st.span.record("error.kind", err.kind());
                        st.span
                            .record("error.message", tracing::field::display(&err));
                        Some((Err(err), st))
                    }
                    None => {
                        TracingMiddleware::record_usage(&st.span, &st.usage);
                        st.span.record(
                            "otel.status_code",
                            if st.failed { "ERROR" } else { "OK" },
                        );
                        None
                    }
                }
            },
        );

        Ok(Box::pin(events))
    }
}
