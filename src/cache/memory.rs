//! In-memory TTL cache.

use super::ResponseCache;
use crate::types::ChatResponse;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

struct CacheEntry {
    /// Serialized response. Round-tripping through bytes gives defensive
    /// copies on both write and read.
    data: Vec<u8>,
    expires_at: Instant,
}

impl CacheEntry {
    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// Reference cache backend: a single locked map with lazy expiry.
#[derive(Default)]
pub struct InMemoryResponseCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl InMemoryResponseCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count of unexpired entries (test/diagnostic aid).
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap()
            .values()
            .filter(|e| !e.is_expired())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ResponseCache for InMemoryResponseCache {
    async fn get(&self, key: &str) -> Option<ChatResponse> {
        {
            let entries = self.entries.read().unwrap();
            match entries.get(key) {
                Some(entry) if !entry.is_expired() => {
                    return serde_json::from_slice(&entry.data).ok();
                }
                Some(_) => {}
                None => return None,
            }
        }
        // Expired: upgrade to a write lock and drop it.
        self.entries.write().unwrap().remove(key);
        None
    }

    async fn set(&self, key: &str, response: &ChatResponse, ttl: Duration) {
        if ttl.is_zero() {
            return;
        }
        let Ok(data) = serde_json::to_vec(response) else {
            return;
        };
        let entry = CacheEntry {
            data,
            expires_at: Instant::now() + ttl,
        };
        self.entries.write().unwrap().insert(key.to_string(), entry);
    }

    async fn remove(&self, key: &str) {
        self.entries.write().unwrap().remove(key);
    }
}
