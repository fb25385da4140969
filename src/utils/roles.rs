//! Canonical role mapping between the data model and vendor wire formats.

use crate::types::Role;

/// Wire name for a role. Total over the role enum; the function/tool role
/// serializes as `tool` on every supported vendor.
pub fn wire_role(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Tool => "tool",
    }
}

/// Parse a wire role. Unknown roles fall back to `user`.
pub fn role_from_wire(value: &str) -> Role {
    match value {
        "system" => Role::System,
        "user" => Role::User,
        "assistant" => Role::Assistant,
        "tool" | "function" => Role::Tool,
        _ => Role::User,
    }
}
