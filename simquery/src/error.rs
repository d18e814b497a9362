//! Error types for the request pipeline.
//!
//! Every failure is classified exactly once, at the transport boundary, into a
//! [`FetchError`]. Downstream components (retry, scheduler, orchestrator)
//! switch on [`FetchError::kind`] instead of inspecting response shapes.

use std::time::Duration;
use thiserror::Error;

/// Message shown to users when nothing more specific is available.
pub const GENERIC_ERROR_MESSAGE: &str = "An unexpected error occurred while loading data";

/// Coarse classification of a [`FetchError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// 4xx response. Never retried.
    Client,
    /// 5xx response or an unreadable body. Retryable.
    Server,
    /// Transport failure or timeout. Retryable.
    Network,
    /// Well-formed envelope with `success: false`. Never retried.
    Application,
    /// Cooperative cancellation. Never retried, never shown to users.
    Cancelled,
    /// Failure inside the client itself (e.g. scheduler shut down).
    Internal,
}

/// Errors produced by the fetch pipeline.
///
/// Cloneable so a single outcome can be broadcast to every consumer waiting
/// on a coalesced request.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FetchError {
    /// The backend rejected the request (4xx).
    #[error("client error (HTTP {status})")]
    Client {
        status: u16,
        detail: Option<String>,
        message: Option<String>,
    },

    /// The backend failed to serve the request (5xx).
    #[error("server error (HTTP {status})")]
    Server {
        status: u16,
        detail: Option<String>,
        message: Option<String>,
    },

    /// Connection, DNS or body-read failure.
    #[error("network error: {0}")]
    Network(String),

    /// The transport-level timeout elapsed.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// The response body could not be decoded.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// The backend answered with `success: false`.
    #[error("backend reported failure: {}", .message.as_deref().unwrap_or("no message"))]
    Application { message: Option<String> },

    /// The operation was cancelled before it settled.
    #[error("request cancelled")]
    Cancelled,

    /// The scheduler dropped the request without running it.
    #[error("scheduler shut down before the request completed")]
    SchedulerClosed,
}

impl FetchError {
    /// Returns the classification used by retry and state handling.
    pub fn kind(&self) -> ErrorKind {
        match self {
            FetchError::Client { .. } => ErrorKind::Client,
            FetchError::Server { .. } | FetchError::InvalidResponse(_) => ErrorKind::Server,
            FetchError::Network(_) | FetchError::Timeout(_) => ErrorKind::Network,
            FetchError::Application { .. } => ErrorKind::Application,
            FetchError::Cancelled => ErrorKind::Cancelled,
            FetchError::SchedulerClosed => ErrorKind::Internal,
        }
    }

    /// Returns true if a retry could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Server | ErrorKind::Network)
    }

    /// Returns true if this is a cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, FetchError::Cancelled)
    }

    /// Builds the text shown to the consumer.
    ///
    /// Precedence: backend `detail` field, backend `message` field, the
    /// transport-level message, then [`GENERIC_ERROR_MESSAGE`].
    pub fn user_message(&self) -> String {
        match self {
            FetchError::Client {
                status,
                detail,
                message,
            }
            | FetchError::Server {
                status,
                detail,
                message,
            } => non_empty(detail)
                .or_else(|| non_empty(message))
                .unwrap_or_else(|| format!("Request failed with status code {}", status)),
            FetchError::Application { message } => {
                non_empty(message).unwrap_or_else(|| GENERIC_ERROR_MESSAGE.to_string())
            }
            FetchError::Network(msg) if !msg.trim().is_empty() => msg.clone(),
            FetchError::Timeout(_) | FetchError::InvalidResponse(_) => self.to_string(),
            _ => GENERIC_ERROR_MESSAGE.to_string(),
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        let not_found = FetchError::Client {
            status: 404,
            detail: None,
            message: None,
        };
        assert_eq!(not_found.kind(), ErrorKind::Client);
        assert!(!not_found.is_retryable());

        let unavailable = FetchError::Server {
            status: 503,
            detail: None,
            message: None,
        };
        assert!(unavailable.is_retryable());
        assert!(FetchError::Network("connection reset".into()).is_retryable());
        assert!(FetchError::Timeout(Duration::from_secs(30)).is_retryable());
        assert!(!FetchError::Application { message: None }.is_retryable());
        assert!(!FetchError::Cancelled.is_retryable());
        assert!(!FetchError::SchedulerClosed.is_retryable());
    }

    #[test]
    fn test_user_message_prefers_detail() {
        let err = FetchError::Server {
            status: 500,
            detail: Some("Scenario has no results".into()),
            message: Some("Internal error".into()),
        };
        assert_eq!(err.user_message(), "Scenario has no results");
    }

    #[test]
    fn test_user_message_falls_back_to_message() {
        let err = FetchError::Client {
            status: 422,
            detail: Some("  ".into()),
            message: Some("Unknown scenario".into()),
        };
        assert_eq!(err.user_message(), "Unknown scenario");
    }

    #[test]
    fn test_user_message_falls_back_to_status() {
        let err = FetchError::Client {
            status: 404,
            detail: None,
            message: None,
        };
        assert_eq!(err.user_message(), "Request failed with status code 404");
    }

    #[test]
    fn test_user_message_generic_fallback() {
        assert_eq!(
            FetchError::Application { message: None }.user_message(),
            GENERIC_ERROR_MESSAGE
        );
        assert_eq!(
            FetchError::Network(String::new()).user_message(),
            GENERIC_ERROR_MESSAGE
        );
        assert_eq!(
            FetchError::SchedulerClosed.user_message(),
            GENERIC_ERROR_MESSAGE
        );
    }

    #[test]
    fn test_display() {
        let err = FetchError::Timeout(Duration::from_secs(30));
        assert_eq!(format!("{}", err), "request timed out after 30s");

        let err = FetchError::Application {
            message: Some("file not processed".into()),
        };
        assert_eq!(
            format!("{}", err),
            "backend reported failure: file not processed"
        );
    }
}
