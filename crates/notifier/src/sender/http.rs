//! Failure classification shared by the reqwest-based transports.

use reqwest::StatusCode;

use super::retry::Attempt;
use crate::message::{MessageResponse, codes};

/// Map a transport-level reqwest error (no HTTP response) to an attempt result.
///
/// `fallback` is the transport's own code for anything not otherwise classified.
pub(crate) fn transport_error(err: &reqwest::Error, fallback: &'static str) -> Attempt {
    if err.is_timeout() {
        Attempt::Retry(MessageResponse::failure(
            codes::TIMEOUT,
            format!("Request timed out: {err}"),
        ))
    } else if err.is_connect() {
        Attempt::Retry(MessageResponse::failure(
            codes::CONNECTION_FAILED,
            format!("Connection failed: {err}"),
        ))
    } else {
        Attempt::Done(MessageResponse::failure(fallback, err.to_string()))
    }
}

/// Error code for a non-success HTTP status.
pub(crate) fn status_error_code(status: StatusCode, fallback: &'static str) -> &'static str {
    match status.as_u16() {
        401 | 403 => codes::AUTHENTICATION_FAILED,
        400 => codes::INVALID_REQUEST,
        429 => codes::RATE_LIMIT_EXCEEDED,
        500..=599 => codes::SERVER_ERROR,
        _ => fallback,
    }
}

/// Only rate limiting and server errors are worth another attempt.
pub(crate) fn is_retryable_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// Wrap a non-success HTTP status into an attempt result.
pub(crate) fn status_failure(status: StatusCode, body: &str, fallback: &'static str) -> Attempt {
    let response = MessageResponse::failure(
        status_error_code(status, fallback),
        format!("HTTP {}: {}", status.as_u16(), truncate(body, 512)),
    );
    if is_retryable_status(status) {
        Attempt::Retry(response)
    } else {
        Attempt::Done(response)
    }
}

/// Cut `s` to at most `max_bytes` bytes without splitting a character.
pub(crate) fn truncate(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_error_codes() {
        let code = |status| status_error_code(status, codes::MAIL_SEND_FAILED);
        assert_eq!(code(StatusCode::UNAUTHORIZED), "AUTHENTICATION_FAILED");
        assert_eq!(code(StatusCode::FORBIDDEN), "AUTHENTICATION_FAILED");
        assert_eq!(code(StatusCode::BAD_REQUEST), "INVALID_REQUEST");
        assert_eq!(code(StatusCode::TOO_MANY_REQUESTS), "RATE_LIMIT_EXCEEDED");
        assert_eq!(code(StatusCode::BAD_GATEWAY), "SERVER_ERROR");
        assert_eq!(code(StatusCode::NOT_FOUND), "MAIL_SEND_FAILED");
        assert_eq!(
            status_error_code(StatusCode::NOT_FOUND, codes::DINGTALK_API_ERROR),
            "DINGTALK_API_ERROR"
        );
    }

    #[test]
    fn test_retryable_statuses() {
        assert!(is_retryable_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(is_retryable_status(StatusCode::SERVICE_UNAVAILABLE));
        assert!(!is_retryable_status(StatusCode::UNAUTHORIZED));
        assert!(!is_retryable_status(StatusCode::BAD_REQUEST));
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("hello", 10), "hello");
        assert_eq!(truncate("héllo", 2), "h");
        assert_eq!(truncate("日本語", 4), "日");
    }
}
