//! Request id generation.

use uuid::Uuid;

/// A fresh opaque request id: 32 lowercase hex chars (UUIDv4 without dashes).
pub fn request_id() -> String {
    Uuid::new_v4().simple().to_string()
}
