//! Retry/timeout scenarios against a scripted transport, through the client.

use async_trait::async_trait;
use llm_comms::providers::OpenAiAdapter;
use llm_comms::resilience::{CompositePolicy, RetryPolicy, TimeoutPolicy};
use llm_comms::transport::{Transport, TransportRequest, TransportResponse};
use llm_comms::{ChatRequest, LlmClientBuilder, Message, Result};
use serde_json::json;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

struct ScriptedTransport {
    responses: Mutex<VecDeque<TransportResponse>>,
    calls: AtomicU32,
}

impl ScriptedTransport {
    fn replaying(responses: Vec<TransportResponse>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into()),
            calls: AtomicU32::new(0),
        })
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(
        &self,
        _request: TransportRequest,
        _cancel: &CancellationToken,
    ) -> Result<TransportResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .expect("scripted response available"))
    }
}

/// Transport that never answers until cancelled.
struct HangingTransport;

#[async_trait]
impl Transport for HangingTransport {
    async fn send(
        &self,
        _request: TransportRequest,
        cancel: &CancellationToken,
    ) -> Result<TransportResponse> {
        cancel.cancelled().await;
        Err(llm_comms::Error::cancelled("transport cancelled"))
    }
}

fn throttled() -> TransportResponse {
    TransportResponse::new(429, r#"{"error":{"message":"slow down"}}"#)
        .with_header("retry-after", "1")
}

fn ok_body() -> TransportResponse {
    TransportResponse::new(
        200,
        json!({
            "choices": [{
                "message": {"content": "recovered"},
                "finish_reason": "stop"
            }],
            "usage": {"prompt_tokens": 2, "completion_tokens": 2, "total_tokens": 4}
        })
        .to_string(),
    )
}

fn client_over(transport: Arc<ScriptedTransport>, policy: CompositePolicy) -> llm_comms::LlmClient {
    LlmClientBuilder::new()
        .provider(Arc::new(OpenAiAdapter::new(transport, "http://localhost:1")))
        .model("gpt-test")
        .resilience(policy)
        .build()
        .unwrap()
}

#[tokio::test(start_paused = true)]
async fn s6_retry_after_hint_drives_the_backoff() {
    let transport = ScriptedTransport::replaying(vec![throttled(), throttled(), ok_body()]);
    let policy = CompositePolicy::new().then_retry(RetryPolicy::new().with_max_retries(2));
    let client = client_over(transport.clone(), policy);

    let started = tokio::time::Instant::now();
    let response = client
        .ask(ChatRequest::new(vec![Message::user("Hello")]))
        .await
        .unwrap();

    assert_eq!(response.content(), "recovered");
    assert_eq!(transport.calls(), 3);
    // Two hinted 1s sleeps, nothing from the jitter schedule.
    assert_eq!(started.elapsed(), Duration::from_secs(2));
}

#[tokio::test(start_paused = true)]
async fn s6_exhausted_retries_surface_rate_limited() {
    let transport = ScriptedTransport::replaying(vec![throttled(), throttled(), throttled()]);
    let policy = CompositePolicy::new().then_retry(RetryPolicy::new().with_max_retries(2));
    let client = client_over(transport.clone(), policy);

    let err = client
        .ask(ChatRequest::new(vec![Message::user("Hello")]))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), "rate_limited");
    assert_eq!(transport.calls(), 3);
    assert!(err.context().and_then(|c| c.request_id.clone()).is_some());
}

#[tokio::test(start_paused = true)]
async fn validation_errors_do_not_retry() {
    let transport = ScriptedTransport::replaying(vec![TransportResponse::new(
        400,
        r#"{"error":{"message":"bad request","code":"invalid_request_error"}}"#,
    )]);
    let policy = CompositePolicy::new().then_retry(RetryPolicy::new().with_max_retries(2));
    let client = client_over(transport.clone(), policy);

    let err = client
        .ask(ChatRequest::new(vec![Message::user("Hello")]))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), "validation");
    assert_eq!(transport.calls(), 1);
    assert_eq!(
        err.context().and_then(|c| c.provider_code.clone()).as_deref(),
        Some("invalid_request_error")
    );
}

#[tokio::test(start_paused = true)]
async fn per_attempt_timeout_surfaces_timeout_kind() {
    let client = LlmClientBuilder::new()
        .provider(Arc::new(OpenAiAdapter::new(
            Arc::new(HangingTransport),
            "http://localhost:1",
        )))
        .model("gpt-test")
        .resilience(
            CompositePolicy::new().then_timeout(TimeoutPolicy::new(Duration::from_millis(50))),
        )
        .build()
        .unwrap();

    let err = client
        .ask(ChatRequest::new(vec![Message::user("Hello")]))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "timeout");
}

#[tokio::test]
async fn server_errors_map_to_provider_unavailable_and_retry() {
    let transport = ScriptedTransport::replaying(vec![
        TransportResponse::new(503, "unavailable"),
        ok_body(),
    ]);
    let policy = CompositePolicy::new()
        .then_retry(RetryPolicy::new().with_max_retries(2).with_base(Duration::from_millis(1)).with_cap(Duration::from_millis(2)));
    let client = client_over(transport.clone(), policy);

    let response = client
        .ask(ChatRequest::new(vec![Message::user("Hello")]))
        .await
        .unwrap();
    assert_eq!(response.content(), "recovered");
    assert_eq!(transport.calls(), 2);
}
