//! Response cache contract and the in-memory reference implementation.
//!
//! The cache stores normalized responses keyed by
//! `<provider>:<model>:<request-hash>`. Stored responses are defensively
//! copied on both write and read, so callers may freely mutate what they get
//! back. Expired entries are treated as absent and removed lazily on read.

mod memory;

pub use memory::InMemoryResponseCache;

use crate::types::ChatResponse;
use async_trait::async_trait;
use std::time::Duration;

/// Storage contract for cached unary responses.
///
/// Implementations must be safe for any number of concurrent readers and
/// writers. `set` with a zero TTL is a no-op.
#[async_trait]
pub trait ResponseCache: Send + Sync {
    async fn get(&self, key: &str) -> Option<ChatResponse>;
    async fn set(&self, key: &str, response: &ChatResponse, ttl: Duration);
    async fn remove(&self, key: &str);
}
