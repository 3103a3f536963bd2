//! Response Handling
//!
//! Status mapping and body reads shared by both clients. Body reads happen
//! after the transport has handed back a response, so they are not retried;
//! they still honour the request's cancellation token and timeout.

use std::time::Duration;

use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;

use crate::error::{ProviderError, TransportFailure};

/// Turn a non-success response into the matching typed error
///
/// `subject` names the model the call was about and is used for
/// `ModelNotFound`; calls not about a model pass `None`. The error body is
/// read under the same cancellation token and timeout as a success body. If
/// it does not arrive in time the bare status is reported.
///
/// # Errors
///
/// - `Cancelled` if `cancel` fires while the error body is read
/// - `ModelNotFound` for 404 with a subject
/// - `InvalidRequest` for 400 and 422
/// - `Generation` for every other non-success status
pub async fn check_status(
    response: reqwest::Response,
    subject: Option<&str>,
    cancel: &CancellationToken,
    timeout: Duration,
) -> Result<reqwest::Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let read = tokio::select! {
        biased;
        () = cancel.cancelled() => return Err(ProviderError::Cancelled),
        result = tokio::time::timeout(timeout, response.text()) => result,
    };

    let body = match read {
        Ok(Ok(body)) => body,
        Ok(Err(e)) => {
            tracing::debug!(status = status.as_u16(), error = %e, "Error body unreadable");
            String::new()
        }
        Err(_) => {
            tracing::debug!(status = status.as_u16(), "Error body timed out");
            String::new()
        }
    };
    let message = error_message(&body).unwrap_or_else(|| body.trim().to_string());
    tracing::debug!(status = status.as_u16(), subject, message = %message, "Backend rejected request");

    Err(status_error(status, subject, message))
}

/// Map a status code and backend message to an error
#[must_use]
pub fn status_error(status: StatusCode, subject: Option<&str>, message: String) -> ProviderError {
    match (status, subject) {
        (StatusCode::NOT_FOUND, Some(subject)) => ProviderError::ModelNotFound(subject.to_string()),
        (StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY, _) => {
            ProviderError::InvalidRequest(message)
        }
        _ if message.is_empty() => ProviderError::Generation(format!("backend returned {status}")),
        _ => ProviderError::Generation(format!("backend returned {status}: {message}")),
    }
}

/// Extract the message from `{"error": "..."}` or `{"error": {"message": "..."}}`
#[must_use]
pub fn error_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    let error = value.get("error")?;
    error
        .as_str()
        .or_else(|| error.get("message").and_then(serde_json::Value::as_str))
        .map(str::to_string)
}

/// Read and decode a whole JSON body
///
/// # Errors
///
/// - `Cancelled` if the token fires first
/// - `Timeout` if the body does not arrive within `timeout`
/// - `Connection` if the body read fails
/// - `Generation` if the body is not the expected JSON
pub async fn read_json<T: DeserializeOwned>(
    response: reqwest::Response,
    cancel: &CancellationToken,
    timeout: Duration,
) -> Result<T, ProviderError> {
    let read = tokio::select! {
        biased;
        () = cancel.cancelled() => return Err(ProviderError::Cancelled),
        result = tokio::time::timeout(timeout, response.bytes()) => result,
    };

    let bytes = match read {
        Err(_) => return Err(ProviderError::Timeout(timeout)),
        Ok(Err(e)) => {
            return Err(ProviderError::Connection {
                attempts: 1,
                source: TransportFailure::Request(e),
            })
        }
        Ok(Ok(bytes)) => bytes,
    };

    serde_json::from_slice(&bytes)
        .map_err(|e| ProviderError::Generation(format!("malformed response body: {e}")))
}
