//! Retrying Transport
//!
//! One wrapper around `reqwest` shared by every provider client. Each attempt
//! races against the per-call timeout and the request's cancellation token;
//! transport-level failures are retried with capped exponential backoff.
//!
//! An HTTP response is never retried, whatever its status. A completed
//! response with a non-success status is an application-level rejection and
//! goes straight back to the caller.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::{ProviderError, TransportFailure};

/// Default number of attempts per call
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default delay before the first retry
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(250);

/// Default ceiling for a single backoff delay
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(8);

// ============================================================================
// Retry Policy
// ============================================================================

/// Bounded exponential backoff
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total tries per call, first attempt included (0 is treated as 1)
    pub max_attempts: u32,

    /// Delay before the first retry
    pub base_delay: Duration,

    /// Maximum delay between two attempts
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries
    #[must_use]
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Backoff to wait after failed attempt N (0-indexed): `base * 2^N`, capped
    #[must_use]
    pub fn backoff_for_attempt(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }

    fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

// ============================================================================
// Transport
// ============================================================================

/// HTTP client plus timeout and retry policy
#[derive(Clone, Debug)]
pub struct RetryingTransport {
    http: reqwest::Client,
    timeout: Duration,
    policy: RetryPolicy,
    backend: &'static str,
}

impl RetryingTransport {
    /// Create a transport for one backend
    ///
    /// `backend` only labels log lines.
    #[must_use]
    pub fn new(backend: &'static str, timeout: Duration, policy: RetryPolicy) -> Self {
        // Local runtimes are reached directly, never through a system proxy
        let http = reqwest::Client::builder()
            .no_proxy()
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(backend, error = %e, "Falling back to default HTTP client");
                reqwest::Client::new()
            });

        Self {
            http,
            timeout,
            policy,
            backend,
        }
    }

    /// Underlying HTTP client
    #[must_use]
    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// Per-attempt timeout
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Change the per-attempt timeout
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    /// Retry policy
    #[must_use]
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Replace the retry policy
    pub fn set_policy(&mut self, policy: RetryPolicy) {
        self.policy = policy;
    }

    /// Send one request built by `build`, retrying transport failures
    ///
    /// `build` is called once per attempt. Returns the response as soon as one
    /// arrives, whether or not its status is a success.
    ///
    /// # Errors
    ///
    /// - `Cancelled` if `cancel` fires during an attempt or a backoff wait
    /// - `Connection` once every attempt has failed
    pub async fn send<F>(
        &self,
        cancel: &CancellationToken,
        build: F,
    ) -> Result<reqwest::Response, ProviderError>
    where
        F: Fn(&reqwest::Client) -> reqwest::RequestBuilder,
    {
        self.execute(cancel, |_| {
            let request = build(&self.http);
            async move { request.send().await.map_err(TransportFailure::from) }
        })
        .await
    }

    /// Run `op` under the timeout/retry/cancellation policy
    ///
    /// `op` receives the 0-indexed attempt number.
    ///
    /// # Errors
    ///
    /// - `Cancelled` if `cancel` fires during an attempt or a backoff wait
    /// - `Connection` wrapping the last failure once every attempt has failed
    pub async fn execute<T, F, Fut>(
        &self,
        cancel: &CancellationToken,
        mut op: F,
    ) -> Result<T, ProviderError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, TransportFailure>>,
    {
        let attempts = self.policy.attempts();
        let mut attempt = 0;

        loop {
            let outcome = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(ProviderError::Cancelled),
                result = tokio::time::timeout(self.timeout, op(attempt)) => result,
            };

            let failure = match outcome {
                Ok(Ok(value)) => {
                    if attempt > 0 {
                        tracing::info!(
                            backend = self.backend,
                            attempt = attempt + 1,
                            "Request succeeded after retry"
                        );
                    }
                    return Ok(value);
                }
                Ok(Err(failure)) => failure,
                Err(_) => TransportFailure::TimedOut(self.timeout),
            };

            attempt += 1;
            if attempt >= attempts {
                tracing::warn!(
                    backend = self.backend,
                    attempts,
                    error = %failure,
                    "Giving up after exhausting retries"
                );
                return Err(ProviderError::Connection {
                    attempts,
                    source: failure,
                });
            }

            // Exponential backoff before the next retry
            let backoff = self.policy.backoff_for_attempt(attempt - 1);
            tracing::warn!(
                backend = self.backend,
                attempt,
                max_attempts = attempts,
                backoff_ms = u64::try_from(backoff.as_millis()).unwrap_or(u64::MAX),
                error = %failure,
                "Transport failure, retrying"
            );

            tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(ProviderError::Cancelled),
                () = tokio::time::sleep(backoff) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use super::*;

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(4),
        }
    }

    #[test]
    fn test_backoff_is_exponential_and_capped() {
        let policy = RetryPolicy {
            max_attempts: 10,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(1_000),
        };

        assert_eq!(policy.backoff_for_attempt(0), Duration::from_millis(100));
        assert_eq!(policy.backoff_for_attempt(1), Duration::from_millis(200));
        assert_eq!(policy.backoff_for_attempt(2), Duration::from_millis(400));
        assert_eq!(policy.backoff_for_attempt(3), Duration::from_millis(800));
        assert_eq!(policy.backoff_for_attempt(4), Duration::from_millis(1_000));
        assert_eq!(policy.backoff_for_attempt(40), Duration::from_millis(1_000));
    }

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.backoff_for_attempt(0), DEFAULT_BASE_DELAY);
        assert_eq!(RetryPolicy::no_retry().max_attempts, 1);
    }

    #[tokio::test]
    async fn test_exhausts_exactly_max_attempts() {
        let transport = RetryingTransport::new("test", Duration::from_secs(1), fast_policy(3));
        let calls = Arc::new(AtomicU32::new(0));
        let token = CancellationToken::new();

        let result: Result<(), _> = transport
            .execute(&token, |_| {
                let calls = Arc::clone(&calls);
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(TransportFailure::Interrupted("connection refused".into()))
                }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        match result {
            Err(ProviderError::Connection { attempts, source }) => {
                assert_eq!(attempts, 3);
                assert!(matches!(source, TransportFailure::Interrupted(_)));
            }
            other => panic!("Expected Connection error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_zero_attempts_still_tries_once() {
        let transport = RetryingTransport::new("test", Duration::from_secs(1), fast_policy(0));
        let calls = Arc::new(AtomicU32::new(0));
        let token = CancellationToken::new();

        let result: Result<(), _> = transport
            .execute(&token, |_| {
                let calls = Arc::clone(&calls);
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(TransportFailure::Interrupted("reset".into()))
                }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(
            result,
            Err(ProviderError::Connection { attempts: 1, .. })
        ));
    }

    #[tokio::test]
    async fn test_recovers_after_transient_failure() {
        let transport = RetryingTransport::new("test", Duration::from_secs(1), fast_policy(3));
        let token = CancellationToken::new();

        let result = transport
            .execute(&token, |attempt| async move {
                if attempt < 2 {
                    Err(TransportFailure::Interrupted("flaky".into()))
                } else {
                    Ok(attempt)
                }
            })
            .await;

        assert_eq!(result.unwrap(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_counts_as_transport_failure() {
        let transport =
            RetryingTransport::new("test", Duration::from_millis(50), fast_policy(2));
        let token = CancellationToken::new();

        let result: Result<(), _> = transport
            .execute(&token, |_| std::future::pending())
            .await;

        match result {
            Err(ProviderError::Connection { attempts, source }) => {
                assert_eq!(attempts, 2);
                assert!(matches!(source, TransportFailure::TimedOut(_)));
            }
            other => panic!("Expected Connection error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_cancellation_during_attempt() {
        let transport = RetryingTransport::new("test", Duration::from_secs(30), fast_policy(3));
        let token = CancellationToken::new();
        let canceller = token.clone();

        let handle = tokio::spawn(async move {
            transport
                .execute(&token, |_| std::future::pending::<Result<(), TransportFailure>>())
                .await
        });

        canceller.cancel();
        let result = handle.await.unwrap();
        assert!(matches!(result, Err(ProviderError::Cancelled)));
    }

    #[tokio::test]
    async fn test_already_cancelled_makes_no_attempt() {
        let transport = RetryingTransport::new("test", Duration::from_secs(1), fast_policy(3));
        let token = CancellationToken::new();
        token.cancel();
        let calls = Arc::new(AtomicU32::new(0));

        let result: Result<(), _> = transport
            .execute(&token, |_| {
                let calls = Arc::clone(&calls);
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            })
            .await;

        assert!(matches!(result, Err(ProviderError::Cancelled)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
