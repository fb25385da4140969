//! Request normalization and content hashing.
//!
//! The hash keys the response cache and tags log events, so it must be stable
//! across processes: canonical JSON (struct fields serialize in declaration
//! order, map keys in BTreeMap order, `None` fields omitted) hashed with
//! SHA-256 and hex-encoded lowercase.

use crate::types::ChatRequest;
use sha2::{Digest, Sha256};

/// Copy of the request with volatile, non-semantic fields stripped:
/// `provider_hints` is always `None`. Everything else is preserved exactly.
/// Idempotent.
pub fn normalize(request: &ChatRequest) -> ChatRequest {
    ChatRequest {
        provider_hints: None,
        ..request.clone()
    }
}

/// SHA-256 of the canonical JSON encoding of the normalized request,
/// lowercase hex (64 chars).
pub fn request_hash(request: &ChatRequest) -> String {
    let normalized = normalize(request);
    // ChatRequest serialization cannot fail: no non-string map keys, no
    // non-finite floats introduced by construction.
    let canonical = serde_json::to_vec(&normalized).unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(&canonical);
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}
