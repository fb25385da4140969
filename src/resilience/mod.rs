//! 弹性策略模块：超时、重试与组合策略。
//!
//! # Resilience Policies
//!
//! Policies wrap an action (a re-invocable async closure taking a
//! cancellation token) and compose outer-first: `Composite(Retry, Timeout)`
//! gives every retry attempt a fresh timeout.
//!
//! Policies apply to the unary path only; a half-consumed stream cannot be
//! meaningfully retried, so streaming requests are always a single attempt.

mod retry;
mod timeout;

pub use retry::RetryPolicy;
pub use timeout::TimeoutPolicy;

use crate::Result;
use futures::future::BoxFuture;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// A re-invocable action under policy control. Each invocation receives the
/// cancellation token it must honor (policies derive child tokens).
pub type PolicyAction<T> =
    Arc<dyn Fn(CancellationToken) -> BoxFuture<'static, Result<T>> + Send + Sync>;

/// One policy layer.
#[derive(Debug, Clone)]
pub enum Policy {
    Timeout(TimeoutPolicy),
    Retry(RetryPolicy),
}

impl Policy {
    fn wrap<T: Send + 'static>(&self, inner: PolicyAction<T>) -> PolicyAction<T> {
        match self {
            Policy::Timeout(p) => p.clone().wrap(inner),
            Policy::Retry(p) => p.clone().wrap(inner),
        }
    }
}

/// Ordered chain of policies applied outer-first: the first policy added is
/// the outermost layer around the action.
#[derive(Debug, Clone, Default)]
pub struct CompositePolicy {
    policies: Vec<Policy>,
}

impl CompositePolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then(mut self, policy: Policy) -> Self {
        self.policies.push(policy);
        self
    }

    pub fn then_retry(self, policy: RetryPolicy) -> Self {
        self.then(Policy::Retry(policy))
    }

    pub fn then_timeout(self, policy: TimeoutPolicy) -> Self {
        self.then(Policy::Timeout(policy))
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }

    /// Right-fold the layers around the action and run it.
    pub async fn execute<T: Send + 'static>(
        &self,
        cancel: CancellationToken,
        action: PolicyAction<T>,
    ) -> Result<T> {
        let mut wrapped = action;
        for policy in self.policies.iter().rev() {
            wrapped = policy.wrap(wrapped);
        }
        wrapped(cancel).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn flaky_action(
        attempts: Arc<AtomicU32>,
        fail_first: u32,
        per_attempt_delay: Duration,
    ) -> PolicyAction<u32> {
        Arc::new(move |_cancel| {
            let attempts = attempts.clone();
            Box::pin(async move {
                let n = attempts.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(per_attempt_delay).await;
                if n < fail_first {
                    Err(Error::provider_unavailable("transient"))
                } else {
                    Ok(n)
                }
            })
        })
    }

    #[tokio::test(start_paused = true)]
    async fn retry_outside_timeout_gives_each_attempt_a_fresh_deadline() {
        let attempts = Arc::new(AtomicU32::new(0));
        // Each attempt takes 50ms against a 200ms per-attempt deadline; with
        // a shared deadline three attempts plus backoff would exceed it.
        let action = flaky_action(attempts.clone(), 2, Duration::from_millis(50));
        let composite = CompositePolicy::new()
            .then_retry(RetryPolicy::new().with_max_retries(2))
            .then_timeout(TimeoutPolicy::new(Duration::from_millis(200)));

        let out = composite
            .execute(CancellationToken::new(), action)
            .await
            .unwrap();
        assert_eq!(out, 2);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_composite_just_runs_the_action() {
        let attempts = Arc::new(AtomicU32::new(0));
        let action = flaky_action(attempts.clone(), 0, Duration::ZERO);
        let out = CompositePolicy::new()
            .execute(CancellationToken::new(), action)
            .await
            .unwrap();
        assert_eq!(out, 0);
    }
}
