//! Client entry points: per-request context seeding and chain invocation.

use crate::context::{CallContext, ClientOptions, LlmContext};
use crate::middleware::{Chain, EventStream};
use crate::providers::ProviderAdapter;
use crate::resilience::{CompositePolicy, PolicyAction};
use crate::types::{ChatRequest, ChatResponse, ProviderModel, StreamEvent};
use crate::utils::ids;
use crate::{Error, Result};
use futures::StreamExt;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// One configured provider/model pair behind the middleware pipeline.
///
/// The chain is constructed once at build time; each call seeds a fresh
/// request id and call context, applies the default output-token limit, and
/// invokes the chain. Clients are cheap to clone and safe to share.
#[derive(Clone)]
pub struct LlmClient {
    provider: Arc<dyn ProviderAdapter>,
    model: ProviderModel,
    chain: Arc<Chain>,
    options: ClientOptions,
    resilience: Option<CompositePolicy>,
}

impl LlmClient {
    pub(crate) fn assemble(
        provider: Arc<dyn ProviderAdapter>,
        model: ProviderModel,
        chain: Arc<Chain>,
        options: ClientOptions,
        resilience: Option<CompositePolicy>,
    ) -> Self {
        Self {
            provider,
            model,
            chain,
            options,
            resilience,
        }
    }

    pub fn provider(&self) -> &Arc<dyn ProviderAdapter> {
        &self.provider
    }

    pub fn model(&self) -> &ProviderModel {
        &self.model
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    fn apply_defaults(&self, mut request: ChatRequest) -> ChatRequest {
        if request.max_output_tokens.is_none() {
            request.max_output_tokens = Some(self.options.default_max_output_tokens);
        }
        request
    }

    /// Preflight guard: reject requests needing capabilities the provider
    /// does not advertise before any network work happens.
    fn check_capabilities(&self, request: &ChatRequest) -> Result<()> {
        let caps = self.provider.capabilities();
        let uses_tools = request.tools.as_ref().map(|t| !t.is_empty()).unwrap_or(false);
        if uses_tools && !caps.tools {
            return Err(Error::not_supported(format!(
                "provider '{}' does not support tool calling",
                self.provider.name()
            )));
        }
        if request.wants_json() && !caps.json_mode {
            return Err(Error::not_supported(format!(
                "provider '{}' does not support JSON mode",
                self.provider.name()
            )));
        }
        Ok(())
    }

    fn context_for(
        &self,
        request: ChatRequest,
        request_id: &str,
        cancel: CancellationToken,
    ) -> Arc<LlmContext> {
        Arc::new(LlmContext::new(
            self.provider.clone(),
            self.model.clone(),
            request,
            CallContext::new(request_id),
            self.options.clone(),
            cancel,
        ))
    }

    /// Unary request.
    pub async fn ask(&self, request: ChatRequest) -> Result<ChatResponse> {
        self.ask_with_cancel(request, CancellationToken::new()).await
    }

    pub async fn ask_with_cancel(
        &self,
        request: ChatRequest,
        cancel: CancellationToken,
    ) -> Result<ChatResponse> {
        request.validate()?;
        self.check_capabilities(&request)?;
        let request_id = ids::request_id();
        let request = self.apply_defaults(request);

        match &self.resilience {
            None => {
                let ctx = self.context_for(request, &request_id, cancel);
                self.chain.execute(ctx).await
            }
            Some(policy) => {
                // Each attempt gets a fresh context (the item bag is per
                // invocation); the request id stays stable across attempts.
                let client = self.clone();
                let rid = request_id.clone();
                let action: PolicyAction<ChatResponse> = Arc::new(move |token| {
                    let ctx = client.context_for(request.clone(), &rid, token);
                    let chain = client.chain.clone();
                    Box::pin(async move { chain.execute(ctx).await })
                });
                policy
                    .execute(cancel, action)
                    .await
                    .map_err(|e| e.ensure_request_id(&request_id))
            }
        }
    }

    /// Streaming request. Rejected at the entry boundary, before any per-call
    /// state exists, when the provider does not advertise streaming.
    pub async fn stream(&self, request: ChatRequest) -> Result<EventStream> {
        self.stream_with_cancel(request, CancellationToken::new())
            .await
    }

    pub async fn stream_with_cancel(
        &self,
        request: ChatRequest,
        cancel: CancellationToken,
    ) -> Result<EventStream> {
        if !self.provider.capabilities().streaming {
            return Err(Error::not_supported(format!(
                "provider '{}' does not support streaming",
                self.provider.name()
            )));
        }
        request.validate()?;
        self.check_capabilities(&request)?;
        let request_id = ids::request_id();
        let request = self.apply_defaults(request);
        let ctx = self.context_for(request, &request_id, cancel);
        let stream = self.chain.execute_stream(ctx).await?;

        if self.options.coalesce_final_stream_text {
            Ok(coalesce_text(stream))
        } else {
            Ok(stream)
        }
    }
}

/// Hold back text deltas and emit one concatenated delta immediately before
/// the terminal event. Non-delta events pass through in order.
fn coalesce_text(inner: EventStream) -> EventStream {
    struct State {
        inner: EventStream,
        text: String,
        pending: VecDeque<Result<StreamEvent>>,
        done: bool,
    }

    let events = futures::stream::unfold(
        State {
            inner,
            text: String::new(),
            pending: VecDeque::new(),
            done: false,
        },
        |mut st| async move {
            loop {
                if let Some(queued) = st.pending.pop_front() {
                    return Some((queued, st));
                }
                if st.done {
                    return None;
                }
                match st.inner.next().await {
                    Some(Ok(StreamEvent::Delta { text })) => {
                        st.text.push_str(&text);
                    }
                    Some(Ok(ev)) if ev.is_terminal() => {
                        if !st.text.is_empty() {
                            let full = std::mem::take(&mut st.text);
                            st.pending.push_back(Ok(StreamEvent::delta(full)));
                        }
                        st.pending.push_back(Ok(ev));
                    }
                    Some(other) => st.pending.push_back(other),
                    None => {
                        st.done = true;
                        if !st.text.is_empty() {
                            let full = std::mem::take(&mut st.text);
                            st.pending.push_back(Ok(StreamEvent::delta(full)));
                        }
                    }
                }
            }
        },
    );
    Box::pin(events)
}
