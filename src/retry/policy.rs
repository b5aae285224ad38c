//! Failure classifier and backoff computation

use std::time::Duration;

use reqwest::header::RETRY_AFTER;
use reqwest::StatusCode;
use serde::Deserialize;

use crate::config::RetryConfig;
use crate::error::{HttpFailure, QuotaKind, UploadError};
use crate::transport::{HttpResponse, TransportError};

/// Message fragment Google uses when the daily request quota is spent
const DAILY_QUOTA_MARKER: &str = "all requests per day";

/// Message fragments reported when the account storage is full
const STORAGE_QUOTA_MARKERS: &[&str] = &[
    "remaining storage in the user's account is not enough",
    "storage quota",
];

/// Observed outcome of one failed HTTP attempt
#[derive(Debug)]
pub enum AttemptFailure {
    /// Response with a non-2xx status
    Status(HttpResponse),
    /// No response at all
    Transport(TransportError),
}

/// What the engine should do after a failed attempt
#[derive(Debug)]
pub enum RetryDecision {
    Retry { wait: Duration, cause: UploadError },
    Terminal(UploadError),
}

impl RetryDecision {
    pub fn should_retry(&self) -> bool {
        matches!(self, Self::Retry { .. })
    }

    pub fn wait(&self) -> Option<Duration> {
        match self {
            Self::Retry { wait, .. } => Some(*wait),
            Self::Terminal(_) => None,
        }
    }
}

/// Google JSON error envelope: {"error": {"code": .., "message": .., "status": ..}}
#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
}

/// Stateless retry classifier
#[derive(Debug, Clone, Default)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Classify a failed attempt.
    ///
    /// `attempt` is the 1-based number of the attempt that just failed and
    /// `cancelled` reports whether the caller has already aborted. The result
    /// depends only on these inputs.
    pub fn classify(&self, failure: AttemptFailure, attempt: u32, cancelled: bool) -> RetryDecision {
        if cancelled {
            return RetryDecision::Terminal(UploadError::Cancelled);
        }

        let (cause, wait) = match failure {
            AttemptFailure::Transport(err) => {
                if err.is_permanent() {
                    return RetryDecision::Terminal(UploadError::Transport(err));
                }
                (UploadError::Transport(err), self.backoff(attempt))
            }
            AttemptFailure::Status(response) => {
                let failure = http_failure(response);
                match self.classify_status(failure, attempt) {
                    Ok(retryable) => retryable,
                    Err(terminal) => return RetryDecision::Terminal(terminal),
                }
            }
        };

        if attempt >= self.config.max_attempts {
            return RetryDecision::Terminal(UploadError::RetriesExhausted {
                attempts: attempt,
                last: Box::new(cause),
            });
        }

        RetryDecision::Retry { wait, cause }
    }

    /// Ok carries a retryable cause and its wait; Err is terminal
    fn classify_status(
        &self,
        failure: HttpFailure,
        attempt: u32,
    ) -> Result<(UploadError, Duration), UploadError> {
        let status = failure.status;

        if let Some(kind) = quota_kind(status, &failure.message) {
            return Err(UploadError::QuotaExhausted { kind, failure });
        }

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after =
                parse_retry_after(&failure.headers).unwrap_or(self.config.rate_limit_wait);
            return Ok((
                UploadError::RateLimited {
                    failure,
                    retry_after,
                },
                retry_after,
            ));
        }

        if status.is_server_error() {
            if status == StatusCode::NOT_IMPLEMENTED {
                return Err(UploadError::Server(failure));
            }
            let wait = self.backoff(attempt);
            return Ok((UploadError::Server(failure), wait));
        }

        Err(UploadError::Client(failure))
    }

    /// Exponential delay after the given failed attempt, capped at max_backoff
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let delay = self
            .config
            .base_backoff
            .saturating_mul(1u32 << exponent);
        delay.min(self.config.max_backoff)
    }
}

/// Build the diagnostic context for a non-2xx response
pub fn http_failure(response: HttpResponse) -> HttpFailure {
    let message = error_message(&response.body);
    HttpFailure {
        status: response.status,
        headers: response.headers,
        message,
    }
}

/// Extract the envelope message, falling back to the raw body text
fn error_message(body: &[u8]) -> String {
    match serde_json::from_slice::<ErrorEnvelope>(body) {
        Ok(envelope) if !envelope.error.message.is_empty() => envelope.error.message,
        _ => String::from_utf8_lossy(body).trim().to_string(),
    }
}

/// Detect daily-quota and storage exhaustion from the server message.
// Substring matching on free text: breaks if the service rewords its messages.
fn quota_kind(status: StatusCode, message: &str) -> Option<QuotaKind> {
    let lower = message.to_lowercase();

    if status.is_client_error() && lower.contains(DAILY_QUOTA_MARKER) {
        return Some(QuotaKind::DailyRequests);
    }

    if (status.is_client_error() || status.is_server_error())
        && STORAGE_QUOTA_MARKERS.iter().any(|m| lower.contains(m))
    {
        return Some(QuotaKind::Storage);
    }

    None
}

/// Retry-After as a positive number of seconds
fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .filter(|secs| *secs > 0)
        .map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::{HeaderMap, HeaderValue};

    fn policy() -> RetryPolicy {
        RetryPolicy::new(RetryConfig {
            max_attempts: 4,
            base_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(500),
            rate_limit_wait: Duration::from_secs(30),
        })
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let p = policy();
        assert_eq!(p.backoff(1), Duration::from_millis(100));
        assert_eq!(p.backoff(2), Duration::from_millis(200));
        assert_eq!(p.backoff(3), Duration::from_millis(400));
        assert_eq!(p.backoff(4), Duration::from_millis(500));
        assert_eq!(p.backoff(40), Duration::from_millis(500));
    }

    #[test]
    fn test_error_message_prefers_envelope() {
        let body = br#"{"error":{"code":429,"message":"Quota exceeded","status":"RESOURCE_EXHAUSTED"}}"#;
        assert_eq!(error_message(body), "Quota exceeded");
        assert_eq!(error_message(b"  plain text \n"), "plain text");
    }

    #[test]
    fn test_parse_retry_after_rejects_zero_and_dates() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static("0"));
        assert_eq!(parse_retry_after(&headers), None);
        headers.insert(
            RETRY_AFTER,
            HeaderValue::from_static("Wed, 21 Oct 2015 07:28:00 GMT"),
        );
        assert_eq!(parse_retry_after(&headers), None);
        headers.insert(RETRY_AFTER, HeaderValue::from_static("12"));
        assert_eq!(parse_retry_after(&headers), Some(Duration::from_secs(12)));
    }

    #[test]
    fn test_quota_kind_requires_error_status() {
        assert_eq!(
            quota_kind(
                StatusCode::TOO_MANY_REQUESTS,
                "Quota exceeded for quota metric 'All requests' and limit 'All requests per day'"
            ),
            Some(QuotaKind::DailyRequests)
        );
        assert_eq!(
            quota_kind(StatusCode::INTERNAL_SERVER_ERROR, "All requests per day"),
            None
        );
        assert_eq!(
            quota_kind(
                StatusCode::FORBIDDEN,
                "The remaining storage in the user's account is not enough to perform this operation."
            ),
            Some(QuotaKind::Storage)
        );
    }
}
