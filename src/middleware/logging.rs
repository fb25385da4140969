//! Logging middleware: structured request lifecycle events.

use super::{EventStream, Middleware, Next};
use crate::context::{keys, LlmContext};
use crate::types::{ChatResponse, StreamEvent, Usage};
use crate::utils::hashing::request_hash;
use crate::Result;
use async_trait::async_trait;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

// Stable event ids so downstream consumers can filter by kind.
const EVENT_REQUEST_START: u32 = 1001;
const EVENT_REQUEST_SUCCESS: u32 = 1002;
const EVENT_REQUEST_FAILURE: u32 = 1003;
const EVENT_REQUEST_WARNING: u32 = 1004;
const EVENT_REQUEST_PREVIEW: u32 = 1005;

/// Emits `request.start` on entry with the request id, target, message count
/// and the deterministic request hash; on completion, `request.success` /
/// `request.failure` with duration and outcome fields. Streams that carried
/// an `error` event end with `request.warning` instead of success. Content is
/// only ever logged through the redacted preview, at debug level.
pub struct LoggingMiddleware;

impl LoggingMiddleware {
    fn log_start(ctx: &LlmContext, streaming: bool) {
        let (message_count, hash) =
            ctx.with_request(|req| (req.messages.len(), request_hash(req)));
        info!(
            event_id = EVENT_REQUEST_START,
            request_id = %ctx.request_id(),
            provider = %ctx.provider.name(),
            model = %ctx.model.id,
            streaming,
            message_count,
            request_hash = %hash,
            "request.start"
        );
        if tracing::enabled!(tracing::Level::DEBUG) {
            if let Some(preview) = ctx.call.item(keys::REDACTED_PREVIEW) {
                if let Some(preview) = preview.as_str() {
                    debug!(
                        event_id = EVENT_REQUEST_PREVIEW,
                        request_id = %ctx.request_id(),
                        preview = %preview,
                        "request.preview"
                    );
                }
            }
        }
    }
}

#[async_trait]
impl Middleware for LoggingMiddleware {
    fn name(&self) -> &'static str {
        "logging"
    }

    async fn handle(&self, ctx: Arc<LlmContext>, next: Next<'_>) -> Result<ChatResponse> {
        Self::log_start(&ctx, false);
        let started = Instant::now();
        let result = next.run(ctx.clone()).await;
        let duration_ms = started.elapsed().as_millis() as u64;
        match &result {
            Ok(resp) => {
                info!(
                    event_id = EVENT_REQUEST_SUCCESS,
                    request_id = %ctx.request_id(),
                    duration_ms,
                    finish_reason = resp.finish_reason.map(|r| r.as_str()),
                    prompt_tokens = resp.usage.prompt_tokens,
                    completion_tokens = resp.usage.completion_tokens,
                    total_tokens = resp.usage.total_tokens,
                    "request.success"
                );
            }
            Err(err) => {
                warn!(
                    event_id = EVENT_REQUEST_FAILURE,
                    request_id = %ctx.request_id(),
                    duration_ms,
                    error_kind = err.kind(),
                    "request.failure"
                );
            }
        }
        result
    }

    async fn handle_stream(&self, ctx: Arc<LlmContext>, next: Next<'_>) -> Result<EventStream> {
        Self::log_start(&ctx, true);
        let started = Instant::now();
        let inner = next.stream(ctx.clone()).await.map_err(|err| {
            warn!(
                event_id = EVENT_REQUEST_FAILURE,
                request_id = %ctx.request_id(),
                duration_ms = started.elapsed().as_millis() as u64,
                error_kind = err.kind(),
                "request.failure"
            );
            err
        })?;

        struct State {
            inner: EventStream,
            ctx: Arc<LlmContext>,
            started: Instant,
            usage: Usage,
            saw_terminal: bool,
            saw_error_event: bool,
            failed: bool,
        }

        let events = futures::stream::unfold(
            State {
                inner,
                ctx,
                started,
                usage: Usage::default(),
                saw_terminal: false,
                saw_error_event: false,
                failed: false,
            },
            |mut st| async move {
                match st.inner.next().await {
                    Some(Ok(ev)) => {
                        if ev.is_terminal() {
                            st.saw_terminal = true;
                        }
                        match &ev {
                            StreamEvent::Complete {
                                usage: Some(u), ..
                            } => st.usage.accumulate(u),
                            StreamEvent::Error { .. } => st.saw_error_event = true,
                            _ => {}
                        }
                        Some((Ok(ev), st))
                    }
                    Some(Err(err)) => {
                        st.failed = true;
                        warn!(
                            event_id = EVENT_REQUEST_FAILURE,
                            request_id = %st.ctx.request_id(),
                            duration_ms = st.started.elapsed().as_millis() as u64,
                            error_kind = err.kind(),
                            "request.failure"
                        );
                        Some((Err(err), st))
                    }
                    None => {
                        let duration_ms = st.started.elapsed().as_millis() as u64;
                        if st.failed {
                            // Failure already logged when the error surfaced.
                        } else if st.saw_error_event {
                            warn!(
                                event_id = EVENT_REQUEST_WARNING,
                                request_id = %st.ctx.request_id(),
                                duration_ms,
                                "request.warning"
                            );
                        } else {
                            info!(
                                event_id = EVENT_REQUEST_SUCCESS,
                                request_id = %st.ctx.request_id(),
                                duration_ms,
                                saw_terminal = st.saw_terminal,
                                prompt_tokens = st.usage.prompt_tokens,
                                completion_tokens = st.usage.completion_tokens,
                                total_tokens = st.usage.total_tokens,
                                "request.success"
                            );
                        }
                        None
                    }
                }
            },
        );

        Ok(Box::pin(events))
    }
}
