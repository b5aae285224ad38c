//! Upload error taxonomy

use std::time::Duration;

use reqwest::header::HeaderMap;
use reqwest::StatusCode;

use crate::transport::TransportError;

/// Why the service refuses further uploads until a reset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaKind {
    /// "All requests per day" limit reached
    DailyRequests,
    /// The account has no storage left
    Storage,
}

impl std::fmt::Display for QuotaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DailyRequests => write!(f, "daily request quota exceeded"),
            Self::Storage => write!(f, "storage quota exceeded"),
        }
    }
}

/// Diagnostic context of a non-2xx response
#[derive(Debug, Clone)]
pub struct HttpFailure {
    pub status: StatusCode,
    pub headers: HeaderMap,
    /// Server message from the JSON error envelope, or the raw body
    pub message: String,
}

impl std::fmt::Display for HttpFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.message.is_empty() {
            write!(f, "HTTP {}", self.status)
        } else {
            write!(f, "HTTP {}: {}", self.status, self.message)
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("rate limited ({failure}), retry after {}s", .retry_after.as_secs())]
    RateLimited {
        failure: HttpFailure,
        retry_after: Duration,
    },

    #[error("{kind}: {failure}")]
    QuotaExhausted { kind: QuotaKind, failure: HttpFailure },

    #[error("server error: {0}")]
    Server(HttpFailure),

    #[error("client error: {0}")]
    Client(HttpFailure),

    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("upload cancelled")]
    Cancelled,

    #[error("retries exhausted after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        last: Box<UploadError>,
    },

    #[error("stream error: {0}")]
    Io(#[from] std::io::Error),
}

impl UploadError {
    /// True when the caller should stop uploading for the rest of the batch
    pub fn is_quota_exhausted(&self) -> bool {
        matches!(self, Self::QuotaExhausted { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// HTTP status behind this error, looking through retry exhaustion
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::RateLimited { failure, .. }
            | Self::QuotaExhausted { failure, .. }
            | Self::Server(failure)
            | Self::Client(failure) => Some(failure.status),
            Self::RetriesExhausted { last, .. } => last.status(),
            _ => None,
        }
    }
}
