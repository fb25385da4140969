//! Azure OpenAI adapter.
//!
//! Speaks the OpenAI chat-completions dialect against the deployment-scoped
//! Azure path, authenticating with either an `api-key` header or a bearer
//! token, and forwards the request id as `x-ms-client-request-id`.

use super::openai::{build_chat_body, parse_chat_response, parse_sse_stream};
use super::{apply_hint_overrides, translate_error_response, ProviderAdapter};
use crate::context::CallContext;
use crate::middleware::EventStream;
use crate::transport::{Transport, TransportRequest};
use crate::types::{ChatRequest, ChatResponse, ProviderCapabilities, ProviderModel};
use crate::{Error, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Adapter for Azure-hosted OpenAI deployments.
pub struct AzureOpenAiAdapter {
    transport: Arc<dyn Transport>,
    endpoint: String,
    deployment: String,
    api_version: String,
    api_key: Option<String>,
    bearer_token: Option<String>,
}

impl AzureOpenAiAdapter {
    pub fn new(
        transport: Arc<dyn Transport>,
        endpoint: impl Into<String>,
        deployment: impl Into<String>,
        api_version: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            endpoint: endpoint.into(),
            deployment: deployment.into(),
            api_version: api_version.into(),
            api_key: None,
            bearer_token: None,
        }
    }

    /// Authenticate with the `api-key` header.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Authenticate with an AAD bearer token instead of an api-key.
    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }

    fn url(&self) -> String {
        format!(
            "{}/openai/deployments/{}/chat/completions?api-version={}",
            self.endpoint.trim_end_matches('/'),
            self.deployment,
            self.api_version
        )
    }

    fn request_for(&self, body: &Value, call: &CallContext) -> TransportRequest {
        let mut req = TransportRequest::post(self.url(), body.to_string())
            .with_header("content-type", "application/json")
            .with_header("x-ms-client-request-id", call.request_id());
        if let Some(key) = &self.api_key {
            req = req.with_header("api-key", key);
        } else if let Some(token) = &self.bearer_token {
            req = req.with_header("authorization", format!("Bearer {}", token));
        }
        req
    }
}

#[async_trait]
impl ProviderAdapter for AzureOpenAiAdapter {
    fn name(&self) -> &'static str {
        "azure"
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities::new()
            .with_streaming()
            .with_json_mode()
            .with_tools()
            .with_vision()
    }

    fn create_model(&self, id: &str) -> ProviderModel {
        ProviderModel::chat(id)
    }

    async fn send(
        &self,
        model: &ProviderModel,
        request: &ChatRequest,
        call: &CallContext,
        cancel: &CancellationToken,
    ) -> Result<ChatResponse> {
        let mut body = build_chat_body(model, request, false);
        apply_hint_overrides(&mut body, request, self.name());

        let resp = self
            .transport
            .send(self.request_for(&body, call), cancel)
            .await?;
        if !resp.is_success() {
            return Err(translate_error_response(&resp, call.request_id()));
        }

        let value: Value = serde_json::from_str(&resp.body)
            .map_err(Error::Serialization)
            .map_err(|e| e.ensure_request_id(call.request_id()))?;
        parse_chat_response(&value).map_err(|e| e.ensure_request_id(call.request_id()))
    }

    async fn stream(
        &self,
        model: &ProviderModel,
        request: &ChatRequest,
        call: &CallContext,
        cancel: &CancellationToken,
    ) -> Result<EventStream> {
        let mut body = build_chat_body(model, request, true);
        apply_hint_overrides(&mut body, request, self.name());

        let resp = self
            .transport
            .send(self.request_for(&body, call), cancel)
            .await?;
        if !resp.is_success() {
            return Err(translate_error_response(&resp, call.request_id()));
        }

        let events = parse_sse_stream(&resp.body);
        Ok(Box::pin(futures::stream::iter(events.into_iter().map(Ok))))
    }
}
