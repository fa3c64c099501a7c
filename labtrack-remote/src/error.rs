//! Error types for labtrack-remote.

use std::time::Duration;

use thiserror::Error;

/// All errors that can arise from document store operations.
///
/// Variants are classified, not transport-shaped: callers branch on what
/// happened (missing item, concurrent create, throttling) rather than on
/// status codes. `Unknown` carries the raw status for anything that does
/// not classify.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RemoteError {
    /// The addressed item does not exist.
    #[error("remote item not found: {path}")]
    NotFound { path: String },

    /// A concurrent writer created the item first.
    #[error("remote item already exists: {path}")]
    Conflict { path: String },

    /// The service is throttling; retry no sooner than `retry_after`.
    #[error("rate limited; retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },

    /// The access token was rejected as expired. The client layer refreshes
    /// and retries once; callers above it never see this variant.
    #[error("access token expired")]
    AuthExpired,

    /// Credentials cannot be acquired at all (bad client config, identity
    /// provider down). Not retryable.
    #[error("credentials unavailable: {message}")]
    AuthUnavailable { message: String },

    /// Transient transport failure (timeout, connection reset, 5xx).
    #[error("transient remote failure: {message}")]
    Transient { message: String },

    /// Anything else, with the raw status preserved.
    #[error("remote call failed (status {status}): {message}")]
    Unknown { status: u16, message: String },
}

impl RemoteError {
    /// Whether a retry with backoff could plausibly succeed.
    ///
    /// `Conflict` and `NotFound` are workflow signals handled by the caller,
    /// and `AuthUnavailable` needs operator intervention.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RemoteError::RateLimited { .. } | RemoteError::Transient { .. }
        )
    }

    /// The throttle delay, when the service supplied one.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            RemoteError::RateLimited { retry_after } => Some(*retry_after),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        assert!(RemoteError::RateLimited {
            retry_after: Duration::from_secs(2)
        }
        .is_retryable());
        assert!(RemoteError::Transient {
            message: "timeout".into()
        }
        .is_retryable());

        assert!(!RemoteError::NotFound {
            path: "/x".into()
        }
        .is_retryable());
        assert!(!RemoteError::Conflict {
            path: "/x".into()
        }
        .is_retryable());
        assert!(!RemoteError::AuthUnavailable {
            message: "bad client secret".into()
        }
        .is_retryable());
    }

    #[test]
    fn retry_after_only_on_rate_limit() {
        let limited = RemoteError::RateLimited {
            retry_after: Duration::from_secs(7),
        };
        assert_eq!(limited.retry_after(), Some(Duration::from_secs(7)));
        assert_eq!(
            RemoteError::Transient {
                message: "reset".into()
            }
            .retry_after(),
            None
        );
    }
}
