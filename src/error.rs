//! Normalized error taxonomy for the dispatch pipeline.
//!
//! Every transport failure is mapped into one [`ApiError`] variant at the
//! HTTP-client boundary, so policy code never inspects raw client errors.

use std::time::Duration;

use thiserror::Error;

/// A normalized dispatch error.
///
/// The first three variants come from the transport layer; the rest are
/// produced by the middleware itself (debounce, queueing, sign-out).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ApiError {
    /// Connection-level failure: DNS, refused, reset, no connectivity.
    #[error("network error: {0}")]
    Network(String),

    /// The request timed out at the transport layer.
    #[error("request timed out")]
    Timeout,

    /// The server answered with a non-success status code.
    #[error("HTTP {status}: {message}")]
    Http {
        status: u16,
        message: String,
        /// Parsed `Retry-After` hint, when the server sent one.
        retry_after: Option<Duration>,
    },

    /// The response body could not be decoded.
    #[error("invalid response body: {0}")]
    Decode(String),

    /// An identical request was dispatched within the debounce window.
    #[error("duplicate request suppressed")]
    Debounced,

    /// The request waited too long for a free concurrency slot.
    #[error("request timed out waiting for a free slot")]
    QueueTimeout,

    /// The request was dropped because the middleware entered safe state.
    #[error("request dropped: middleware entered safe state")]
    QueueDropped,

    /// The session could not be refreshed; the user was signed out.
    #[error("session expired: sign-in required")]
    SignedOut,
}

/// Retry class of an error, as seen by the policy loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Network failures, transport timeouts and HTTP 408: retried with a
    /// fixed delay.
    Transient,
    /// HTTP 401/403: triggers refresh-and-replay.
    Auth,
    /// HTTP 429: retried after the server's Retry-After hint.
    RateLimited,
    /// HTTP 5xx: retried with exponential backoff.
    Server,
    /// Remaining 4xx: passed through unmodified.
    Client,
    /// Middleware-internal conditions; never retried.
    Internal,
}

impl ApiError {
    /// Classify the error for retry-policy purposes.
    pub fn class(&self) -> ErrorClass {
        match self {
            ApiError::Network(_) | ApiError::Timeout => ErrorClass::Transient,
            ApiError::Http { status, .. } => match status {
                401 | 403 => ErrorClass::Auth,
                408 => ErrorClass::Transient,
                429 => ErrorClass::RateLimited,
                500..=599 => ErrorClass::Server,
                400..=499 => ErrorClass::Client,
                _ => ErrorClass::Internal,
            },
            _ => ErrorClass::Internal,
        }
    }

    /// HTTP status code, when the error carries one.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Server-provided Retry-After hint, when present.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            ApiError::Http { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return ApiError::Timeout;
        }
        if let Some(status) = err.status() {
            return ApiError::Http {
                status: status.as_u16(),
                message: err.to_string(),
                retry_after: None,
            };
        }
        ApiError::Network(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn http(status: u16) -> ApiError {
        ApiError::Http {
            status,
            message: String::new(),
            retry_after: None,
        }
    }

    #[test]
    fn test_auth_statuses_classify_as_auth() {
        assert_eq!(http(401).class(), ErrorClass::Auth);
        assert_eq!(http(403).class(), ErrorClass::Auth);
    }

    #[test]
    fn test_retriable_client_statuses() {
        assert_eq!(http(408).class(), ErrorClass::Transient);
        assert_eq!(http(429).class(), ErrorClass::RateLimited);
    }

    #[test]
    fn test_server_and_client_split() {
        assert_eq!(http(500).class(), ErrorClass::Server);
        assert_eq!(http(503).class(), ErrorClass::Server);
        assert_eq!(http(400).class(), ErrorClass::Client);
        assert_eq!(http(404).class(), ErrorClass::Client);
        assert_eq!(http(422).class(), ErrorClass::Client);
    }

    #[test]
    fn test_transport_errors_are_transient() {
        assert_eq!(
            ApiError::Network("connection refused".into()).class(),
            ErrorClass::Transient
        );
        assert_eq!(ApiError::Timeout.class(), ErrorClass::Transient);
    }

    #[test]
    fn test_middleware_errors_are_internal() {
        assert_eq!(ApiError::Debounced.class(), ErrorClass::Internal);
        assert_eq!(ApiError::QueueTimeout.class(), ErrorClass::Internal);
        assert_eq!(ApiError::SignedOut.class(), ErrorClass::Internal);
    }

    #[test]
    fn test_retry_after_only_on_http() {
        let err = ApiError::Http {
            status: 429,
            message: String::new(),
            retry_after: Some(Duration::from_secs(7)),
        };
        assert_eq!(err.retry_after(), Some(Duration::from_secs(7)));
        assert_eq!(ApiError::Timeout.retry_after(), None);
    }
}
