//! Provider Errors
//!
//! Typed failures surfaced by every fallible contract method. Callers branch
//! on the variant to decide presentation; the library never decides for them.
//!
//! `is_available` and `status` never return these: they collapse failures
//! into `false` / an offline snapshot instead.

use std::time::Duration;

use thiserror::Error;

/// A failure below the HTTP application layer
///
/// These are the only failures the retrying transport will retry.
#[derive(Debug, Error)]
pub enum TransportFailure {
    /// The HTTP client could not complete the request (refused, reset, DNS...)
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The attempt did not finish within the per-call timeout
    #[error("attempt timed out after {0:?}")]
    TimedOut(Duration),

    /// The response body was cut off mid-read
    #[error("stream interrupted: {0}")]
    Interrupted(String),
}

/// Errors returned by provider clients
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Backend unreachable, or every retry attempt failed at the transport level
    #[error("backend unreachable after {attempts} attempt(s): {source}")]
    Connection {
        /// Number of attempts made before giving up
        attempts: u32,
        /// The last underlying failure
        #[source]
        source: TransportFailure,
    },

    /// Backend was reached but reported a failure
    #[error("generation failed: {0}")]
    Generation(String),

    /// The named model does not exist on the backend
    #[error("model not found: {0}")]
    ModelNotFound(String),

    /// Operation unsupported by this backend, or malformed caller input
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// A streaming read stalled longer than the configured timeout
    #[error("timed out after {0:?} waiting for the backend")]
    Timeout(Duration),

    /// The call was cancelled through the request registry
    #[error("request cancelled")]
    Cancelled,
}

impl ProviderError {
    /// Shorthand for an operation the backend does not implement
    pub(crate) fn unsupported(backend: &str, operation: &str) -> Self {
        Self::InvalidRequest(format!("{backend} does not support {operation}"))
    }

    /// Whether re-issuing the same call might succeed
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Connection { .. } | Self::Timeout(_))
    }

    /// Whether this error is an explicit cancellation rather than a failure
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Convenience alias used throughout the crate
pub type Result<T> = std::result::Result<T, ProviderError>;
