//! Deadline policy.

use super::PolicyAction;
use crate::{Error, Result};
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Wraps an action with a deadline. A child cancellation token derived from
/// the caller's token is handed to the action; on deadline it is cancelled
/// and the call fails with `timeout`. Caller-initiated cancellation
/// re-surfaces as `cancelled`, never `timeout`.
#[derive(Debug, Clone, Copy)]
pub struct TimeoutPolicy {
    deadline: Duration,
}

impl TimeoutPolicy {
    pub fn new(deadline: Duration) -> Self {
        Self { deadline }
    }

    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    pub async fn run<T, F, Fut>(&self, cancel: &CancellationToken, f: F) -> Result<T>
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let child = cancel.child_token();
        let action = f(child.clone());
        tokio::select! {
            result = action => result,
            _ = tokio::time::sleep(self.deadline) => {
                child.cancel();
                Err(Error::timeout(format!(
                    "deadline of {:?} exceeded",
                    self.deadline
                )))
            }
            _ = cancel.cancelled() => {
                child.cancel();
                Err(Error::cancelled("cancelled by caller"))
            }
        }
    }

    pub(super) fn wrap<T: Send + 'static>(self, inner: PolicyAction<T>) -> PolicyAction<T> {
        std::sync::Arc::new(move |cancel: CancellationToken| {
            let inner = inner.clone();
            Box::pin(async move { self.run(&cancel, move |child| inner(child)).await })
        })
    }
}
