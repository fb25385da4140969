//! Retry policy with decorrelated-jitter backoff.

use super::PolicyAction;
use crate::{Error, Result};
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const DEFAULT_MAX_RETRIES: u32 = 2;
const DEFAULT_BASE: Duration = Duration::from_millis(250);
const DEFAULT_CAP: Duration = Duration::from_secs(4);

/// Wraps an action with up to `max_retries` re-attempts.
///
/// Retryable kinds are `rate_limited`, `provider_unavailable`, and transport
/// I/O failures; everything else fails immediately. Backoff is decorrelated
/// jitter, `next = min(cap, uniform(base, prev * 3))` with `prev` seeded to
/// `base` (the first sleep is uniform(base, 3·base)). A `retry_after` carried
/// by a rate-limit error replaces the jitter for that attempt. Sleeps honor
/// cancellation.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_retries: u32,
    base: Duration,
    cap: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base: DEFAULT_BASE,
            cap: DEFAULT_CAP,
        }
    }
}

impl RetryPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_base(mut self, base: Duration) -> Self {
        self.base = base;
        self
    }

    pub fn with_cap(mut self, cap: Duration) -> Self {
        self.cap = cap;
        self
    }

    /// Next sleep given the previous one. Exposed for backoff-law tests.
    fn next_delay(&self, prev: Duration) -> Duration {
        let base_ms = self.base.as_millis() as u64;
        let upper_ms = (prev.as_millis() as u64).saturating_mul(3);
        let chosen = if upper_ms <= base_ms {
            base_ms
        } else {
            rand::thread_rng().gen_range(base_ms..=upper_ms)
        };
        Duration::from_millis(chosen.min(self.cap.as_millis() as u64))
    }

    pub async fn run<T, F, Fut>(&self, cancel: &CancellationToken, mut f: F) -> Result<T>
    where
        F: FnMut(CancellationToken) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut prev = self.base;
        let mut attempt: u32 = 0;
        loop {
            match f(cancel.child_token()).await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    if attempt >= self.max_retries || !err.is_retryable() {
                        return Err(err);
                    }
                    let delay = match err.retry_after() {
                        Some(hinted) => hinted,
                        None => self.next_delay(prev),
                    };
                    prev = delay;
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = cancel.cancelled() => {
                            return Err(Error::cancelled("cancelled during retry backoff"));
                        }
                    }
                    attempt += 1;
                }
            }
        }
    }

    pub(super) fn wrap<T: Send + 'static>(self, inner: PolicyAction<T>) -> PolicyAction<T> {
        std::sync::Arc::new(move |cancel: CancellationToken| {
            let policy = self.clone();
            let inner = inner.clone();
            Box::pin(async move {
                policy
                    .run(&cancel, move |child| {
                        let inner = inner.clone();
                        inner(child)
                    })
                    .await
            })
        })
    }
}
