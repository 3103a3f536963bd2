//! HTTP Transport for Provider Clients
//!
//! Both backend clients reach their runtime through the same
//! [`RetryingTransport`], so timeout, retry and cancellation behave
//! identically whichever protocol sits on top.
//!
//! # Retry Rules
//!
//! - Connection refused, timeouts and interrupted bodies are retried
//! - Any completed HTTP response is final, including 4xx/5xx
//! - Backoff doubles per attempt from `base_delay` up to `max_delay`

pub mod response;
pub mod retry;

pub use response::{check_status, error_message, read_json, status_error};
pub use retry::{
    RetryPolicy, RetryingTransport, DEFAULT_BASE_DELAY, DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_DELAY,
};
