//! HTTP status to error-kind mapping.

use crate::{Error, ErrorContext};
use std::time::Duration;

/// Translate an HTTP status into the error taxonomy. Total over the status
/// domain; unmatched statuses become the generic `llm` error carrying the
/// status code.
///
/// | Status | Kind |
/// |--------|------|
/// | 400, 422 | `validation` |
/// | 401 | `authorization` |
/// | 402 | `quota_exceeded` |
/// | 403 | `permission_denied` |
/// | 404 | `provider_unknown` |
/// | 408 | `timeout` |
/// | 409, 5xx | `provider_unavailable` |
/// | 429 | `rate_limited` (with optional retry-after) |
pub fn error_from_status(
    status: u16,
    message: impl Into<String>,
    retry_after: Option<Duration>,
    request_id: Option<&str>,
) -> Error {
    let message = message.into();
    let mut context = ErrorContext::new().with_status_code(status);
    if let Some(id) = request_id {
        context = context.with_request_id(id);
    }

    let error = match status {
        400 | 422 => Error::validation(message),
        401 => Error::authorization(message),
        402 => Error::quota_exceeded(message),
        403 => Error::permission_denied(message),
        404 => Error::provider_unknown(message),
        408 => Error::timeout(message),
        409 => Error::provider_unavailable(message),
        429 => Error::rate_limited(message, retry_after),
        500..=599 => Error::provider_unavailable(message),
        _ => Error::llm(message),
    };
    error.with_context(context)
}

/// Parse a `Retry-After` header value. Only the delta-seconds form is
/// supported; HTTP-date values are ignored.
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}
