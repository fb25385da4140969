//! Metrics middleware: request, duration, and token instruments.

use super::{EventStream, Middleware, Next};
use crate::context::LlmContext;
use crate::types::{ChatResponse, FinishReason, StreamEvent, Usage};
use crate::Result;
use async_trait::async_trait;
use futures::StreamExt;
use once_cell::sync::Lazy;
use opentelemetry::metrics::{Counter, Histogram};
use opentelemetry::{global, KeyValue};
use std::sync::Arc;
use std::time::Instant;

const METER_NAME: &str = "LlmComms";

struct Instruments {
    requests: Counter<u64>,
    duration: Histogram<f64>,
    prompt_tokens: Histogram<u64>,
    completion_tokens: Histogram<u64>,
    total_tokens: Histogram<u64>,
}

// Process-global so every client in the process shares telemetry; creation is
// lazy and idempotent.
static INSTRUMENTS: Lazy<Instruments> = Lazy::new(|| {
    let meter = global::meter(METER_NAME);
    Instruments {
        requests: meter
            .u64_counter("llm.requests.total")
            .with_description("Number of LLM requests")
            .with_unit("requests")
            .build(),
        duration: meter
            .f64_histogram("llm.request.duration")
            .with_description("LLM request duration")
            .with_unit("ms")
            .build(),
        prompt_tokens: meter
            .u64_histogram("llm.tokens.prompt")
            .with_description("Prompt tokens per request")
            .with_unit("tokens")
            .build(),
        completion_tokens: meter
            .u64_histogram("llm.tokens.completion")
            .with_description("Completion tokens per request")
            .with_unit("tokens")
            .build(),
        total_tokens: meter
            .u64_histogram("llm.tokens.total")
            .with_description("Total tokens per request")
            .with_unit("tokens")
            .build(),
    }
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Success,
    Failure,
    Warning,
}

impl Outcome {
    fn as_str(self) -> &'static str {
        match self {
            Outcome::Success => "success",
            Outcome::Failure => "failure",
            Outcome::Warning => "warning",
        }
    }
}

/// Records exactly one request count and one duration sample per invocation,
/// tagged with provider, model, streaming flag, outcome, finish reason and
/// error type where applicable. Token histograms are recorded only for
/// positive counts, and only when token usage events are enabled.
pub struct MetricsMiddleware;

struct Sample {
    outcome: Outcome,
    finish_reason: Option<FinishReason>,
    error_type: Option<&'static str>,
    usage: Option<Usage>,
}

impl MetricsMiddleware {
    fn record(ctx: &LlmContext, streaming: bool, duration_ms: f64, sample: Sample) {
        let mut tags = vec![
            KeyValue::new("provider", ctx.provider.name().to_string()),
            KeyValue::new("model", ctx.model.id.clone()),
            KeyValue::new("streaming", streaming),
            KeyValue::new("outcome", sample.outcome.as_str()),
        ];
        if let Some(reason) = sample.finish_reason {
            tags.push(KeyValue::new("finish_reason", reason.as_str()));
        }
        if let Some(error_type) = sample.error_type {
            tags.push(KeyValue::new("error_type", error_type));
        }

        let instruments = &*INSTRUMENTS;
        instruments.requests.add(1, &tags);
        instruments.duration.record(duration_ms, &tags);

        if !ctx.options.enable_token_usage_events {
            return;
        }
        if let Some(usage) = sample.usage {
            if usage.prompt_tokens > 0 {
                instruments
                    .prompt_tokens
                    .record(u64::from(usage.prompt_tokens), &tags);
            }
            if usage.completion_tokens > 0 {
                instruments
                    .completion_tokens
                    .record(u64::from(usage.completion_tokens), &tags);
            }
            if usage.total_tokens > 0 {
                instruments
                    .total_tokens
                    .record(u64::from(usage.total_tokens), &tags);
            }
        }
    }
}

#[async_trait]
impl Middleware for MetricsMiddleware {
    fn name(&self) -> &'static str {
        "metrics"
    }

    async fn handle(&self, ctx: Arc<LlmContext>, next: Next<'_>) -> Result<ChatResponse> {
        let started = Instant::now();
        let result = next.run(ctx.clone()).await;
        let duration_ms = started.elapsed().as_secs_f64() * 1000.0;
        let sample = match &result {
            Ok(resp) => Sample {
                outcome: Outcome::Success,
                finish_reason: resp.finish_reason,
                error_type: None,
                usage: Some(resp.usage),
            },
            Err(err) => Sample {
                outcome: Outcome::Failure,
                finish_reason: None,
                error_type: Some(err.kind()),
                usage: None,
            },
        };
        Self::record(&ctx, false, duration_ms, sample);
        result
    }

    async fn handle_stream(&self, ctx: Arc<LlmContext>, next: Next<'_>) -> Result<EventStream> {
        let started = Instant::now();
        let inner = match next.stream(ctx.clone()).await {
            Ok(inner) => inner,
            Err(err) => {
                let duration_ms = started.elapsed().as_secs_f64() * 1000.0;
                Self::record(
                    &ctx,
                    true,
                    duration_ms,
                    Sample {
                        outcome: Outcome::Failure,
                        finish_reason: None,
                        error_type: Some(err.kind()),
                        usage: None,
                    },
                );
                return Err(err);
            }
        };

        struct State {
            inner: EventStream,
            ctx: Arc<LlmContext>,
            started: Instant,
            usage: Usage,
            finish_reason: Option<FinishReason>,
            saw_error_event: bool,
            error_type: Option<&'static str>,
        }

        let events = futures::stream::unfold(
            State {
                inner,
                ctx,
                started,
                usage: Usage::default(),
                finish_reason: None,
                saw_error_event: false,
                error_type: None,
            },
            |mut st| async move {
                match st.inner.next().await {
                    Some(Ok(ev)) => {
                        match &ev {
                            StreamEvent::Complete {
                                usage: Some(u), ..
                            } => {
                                st.usage.accumulate(u);
                                if st.finish_reason.is_none() {
                                    st.finish_reason = Some(FinishReason::Stop);
                                }
                            }
                            StreamEvent::Error { .. } => st.saw_error_event = true,
                            _ => {}
                        }
                        Some((Ok(ev), st))
                    }
                    Some(Err(err)) => {
                        st.error_type = Some(err.kind());
                        Some((Err(err), st))
                    }
                    None => {
                        let duration_ms = st.started.elapsed().as_secs_f64() * 1000.0;
                        let outcome = if st.error_type.is_some() {
                            Outcome::Failure
                        } else if st.saw_error_event {
                            Outcome::Warning
                        } else {
                            Outcome::Success
                        };
                        MetricsMiddleware::record(
                            &st.ctx,
                            true,
                            duration_ms,
                            Sample {
                                outcome,
                                finish_reason: st.finish_reason,
                                error_type: st.error_type,
                                usage: Some(st.usage),
                            },
                        );
                        None
                    }
                }
            },
        );

        Ok(Box::pin(events))
    }
}
