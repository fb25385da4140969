//! 错误处理模块：统一的错误分类与关联上下文。
//!
//! # Error Handling Module
//!
//! Every surfaced error carries a stable kind (used as a telemetry tag and by
//! the retry policy), a human-readable message, and an [`ErrorContext`] with
//! the originating request id plus, where known, the HTTP status code and the
//! provider-specific error code.
//!
//! ## Error kinds
//!
//! | Kind | Meaning |
//! |------|---------|
//! | `validation` | Request/response failed a structural check |
//! | `authorization` | Credentials missing or rejected (401) |
//! | `permission_denied` | Authenticated but forbidden (403) |
//! | `quota_exceeded` | Billing/quota limit reached (402) |
//! | `rate_limited` | Throttled (429), may carry a retry-after |
//! | `provider_unavailable` | Transient upstream failure (409, 5xx) |
//! | `provider_unknown` | Unknown model/deployment/route (404) |
//! | `timeout` | Deadline exceeded (local policy or 408) |
//! | `not_supported` | Capability not advertised by the provider |
//! | `cancelled` | Caller-initiated cancellation |
//! | `llm` | Generic fallthrough carrying the raw status |

use crate::transport::TransportError;
use std::time::Duration;
use thiserror::Error;

/// Correlation fields attached to every error kind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorContext {
    /// Request id generated at client entry (32-char lowercase hex).
    pub request_id: Option<String>,
    /// HTTP status code when the error originated at the wire.
    pub status_code: Option<u16>,
    /// Provider-specific error code parsed from the response body.
    pub provider_code: Option<String>,
}

impl ErrorContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_request_id(mut self, id: impl Into<String>) -> Self {
        self.request_id = Some(id.into());
        self
    }

    pub fn with_status_code(mut self, code: u16) -> Self {
        self.status_code = Some(code);
        self
    }

    pub fn with_provider_code(mut self, code: impl Into<String>) -> Self {
        self.provider_code = Some(code.into());
        self
    }
}

/// Unified error type for the library.
#[derive(Debug, Error)]
pub enum Error {
    #[error("validation error: {message}{}", format_context(.context))]
    Validation {
        message: String,
        context: ErrorContext,
    },

    #[error("authorization error: {message}{}", format_context(.context))]
    Authorization {
        message: String,
        context: ErrorContext,
    },

    #[error("permission denied: {message}{}", format_context(.context))]
    PermissionDenied {
        message: String,
        context: ErrorContext,
    },

    #[error("quota exceeded: {message}{}", format_context(.context))]
    QuotaExceeded {
        message: String,
        context: ErrorContext,
    },

    #[error("rate limited: {message}{}", format_context(.context))]
    RateLimited {
        message: String,
        retry_after: Option<Duration>,
        context: ErrorContext,
    },

    #[error("provider unavailable: {message}{}", format_context(.context))]
    ProviderUnavailable {
        message: String,
        context: ErrorContext,
    },

    #[error("unknown provider target: {message}{}", format_context(.context))]
    ProviderUnknown {
        message: String,
        context: ErrorContext,
    },

    #[error("timed out: {message}{}", format_context(.context))]
    Timeout {
        message: String,
        context: ErrorContext,
    },

    #[error("not supported: {message}{}", format_context(.context))]
    NotSupported {
        message: String,
        context: ErrorContext,
    },

    #[error("cancelled: {message}{}", format_context(.context))]
    Cancelled {
        message: String,
        context: ErrorContext,
    },

    /// Generic fallthrough for provider errors that fit no narrower kind.
    #[error("llm error: {message}{}", format_context(.context))]
    Llm {
        message: String,
        context: ErrorContext,
    },

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

fn format_context(ctx: &ErrorContext) -> String {
    let mut parts = Vec::new();
    if let Some(ref id) = ctx.request_id {
        parts.push(format!("request_id: {}", id));
    }
    if let Some(code) = ctx.status_code {
        parts.push(format!("status: {}", code));
    }
    if let Some(ref code) = ctx.provider_code {
        parts.push(format!("provider_code: {}", code));
    }
    if parts.is_empty() {
        String::new()
    } else {
        format!(" [{}]", parts.join(", "))
    }
}

macro_rules! simple_ctor {
    ($fn_name:ident, $variant:ident) => {
        pub fn $fn_name(message: impl Into<String>) -> Self {
            Error::$variant {
                message: message.into(),
                context: ErrorContext::new(),
            }
        }
    };
}

impl Error {
    simple_ctor!(validation, Validation);
    simple_ctor!(authorization, Authorization);
    simple_ctor!(permission_denied, PermissionDenied);
    simple_ctor!(quota_exceeded, QuotaExceeded);
    simple_ctor!(provider_unavailable, ProviderUnavailable);
    simple_ctor!(provider_unknown, ProviderUnknown);
    simple_ctor!(timeout, Timeout);
    simple_ctor!(not_supported, NotSupported);
    simple_ctor!(cancelled, Cancelled);
    simple_ctor!(llm, Llm);

    pub fn rate_limited(message: impl Into<String>, retry_after: Option<Duration>) -> Self {
        Error::RateLimited {
            message: message.into(),
            retry_after,
            context: ErrorContext::new(),
        }
    }

    /// Stable snake_case kind string, used as the `error_type` telemetry tag.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Validation { .. } => "validation",
            Error::Authorization { .. } => "authorization",
            Error::PermissionDenied { .. } => "permission_denied",
            Error::QuotaExceeded { .. } => "quota_exceeded",
            Error::RateLimited { .. } => "rate_limited",
            Error::ProviderUnavailable { .. } => "provider_unavailable",
            Error::ProviderUnknown { .. } => "provider_unknown",
            Error::Timeout { .. } => "timeout",
            Error::NotSupported { .. } => "not_supported",
            Error::Cancelled { .. } => "cancelled",
            Error::Llm { .. } => "llm",
            Error::Transport(_) => "transport",
            Error::Serialization(_) => "serialization",
        }
    }

    /// Whether the retry policy may re-attempt after this error.
    ///
    /// Retryable: throttling, transient upstream failures, and network I/O.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::RateLimited { .. } | Error::ProviderUnavailable { .. } | Error::Transport(_)
        )
    }

    /// Provider-supplied retry-after, present on `rate_limited` only.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Error::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            Error::Validation { context, .. }
            | Error::Authorization { context, .. }
            | Error::PermissionDenied { context, .. }
            | Error::QuotaExceeded { context, .. }
            | Error::RateLimited { context, .. }
            | Error::ProviderUnavailable { context, .. }
            | Error::ProviderUnknown { context, .. }
            | Error::Timeout { context, .. }
            | Error::NotSupported { context, .. }
            | Error::Cancelled { context, .. }
            | Error::Llm { context, .. } => Some(context),
            Error::Transport(_) | Error::Serialization(_) => None,
        }
    }

    /// Replace the context wholesale. No-op on wrapped infrastructure errors.
    pub fn with_context(mut self, new_ctx: ErrorContext) -> Self {
        if let Some(ctx) = self.context_mut() {
            *ctx = new_ctx;
        }
        self
    }

    /// Attach the request id without clobbering one that is already set.
    pub fn ensure_request_id(mut self, request_id: &str) -> Self {
        if let Some(ctx) = self.context_mut() {
            if ctx.request_id.is_none() {
                ctx.request_id = Some(request_id.to_string());
            }
        }
        self
    }

    fn context_mut(&mut self) -> Option<&mut ErrorContext> {
        match self {
            Error::Validation { context, .. }
            | Error::Authorization { context, .. }
            | Error::PermissionDenied { context, .. }
            | Error::QuotaExceeded { context, .. }
            | Error::RateLimited { context, .. }
            | Error::ProviderUnavailable { context, .. }
            | Error::ProviderUnknown { context, .. }
            | Error::Timeout { context, .. }
            | Error::NotSupported { context, .. }
            | Error::Cancelled { context, .. }
            | Error::Llm { context, .. } => Some(context),
            Error::Transport(_) | Error::Serialization(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_strings_are_stable() {
        assert_eq!(Error::validation("x").kind(), "validation");
        assert_eq!(Error::rate_limited("x", None).kind(), "rate_limited");
        assert_eq!(Error::cancelled("x").kind(), "cancelled");
        assert_eq!(Error::timeout("x").kind(), "timeout");
    }

    #[test]
    fn retryability_classification() {
        assert!(Error::rate_limited("x", None).is_retryable());
        assert!(Error::provider_unavailable("x").is_retryable());
        assert!(Error::Transport(TransportError::Other("io".into())).is_retryable());

        assert!(!Error::validation("x").is_retryable());
        assert!(!Error::authorization("x").is_retryable());
        assert!(!Error::permission_denied("x").is_retryable());
        assert!(!Error::quota_exceeded("x").is_retryable());
        assert!(!Error::cancelled("x").is_retryable());
    }

    #[test]
    fn display_includes_context() {
        let err = Error::validation("bad request")
            .with_context(ErrorContext::new().with_request_id("abc").with_status_code(422));
        let msg = err.to_string();
        assert!(msg.contains("bad request"));
        assert!(msg.contains("request_id: abc"));
        assert!(msg.contains("status: 422"));
    }

    #[test]
    fn ensure_request_id_does_not_overwrite() {
        let err = Error::timeout("late")
            .with_context(ErrorContext::new().with_request_id("original"))
            .ensure_request_id("other");
        assert_eq!(
            err.context().and_then(|c| c.request_id.as_deref()),
            Some("original")
        );
    }
}
