//! Terminal middleware: the pipeline leaf that invokes the provider adapter.

use super::{EventStream, Middleware, Next};
use crate::context::LlmContext;
use crate::types::ChatResponse;
use crate::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// Fixed leaf with no continuation. Results and errors pass through
/// unchanged; translation into the error taxonomy already happened at the
/// adapter boundary.
pub struct TerminalMiddleware;

#[async_trait]
impl Middleware for TerminalMiddleware {
    fn name(&self) -> &'static str {
        "terminal"
    }

    fn is_terminal(&self) -> bool {
        true
    }

    async fn handle(&self, ctx: Arc<LlmContext>, _next: Next<'_>) -> Result<ChatResponse> {
        let request = ctx.request_snapshot();
        ctx.provider
            .send(&ctx.model, &request, &ctx.call, &ctx.cancel)
            .await
    }

    async fn handle_stream(&self, ctx: Arc<LlmContext>, _next: Next<'_>) -> Result<EventStream> {
        let request = ctx.request_snapshot();
        ctx.provider
            .stream(&ctx.model, &request, &ctx.call, &ctx.cancel)
            .await
    }
}
