//! HTTP transport boundary
//!
//! The upload engine only talks to the network through [`HttpTransport`], so
//! tests and alternate backends can substitute their own implementation.

mod client;

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::StatusCode;

use crate::upload::ByteSource;

pub use client::ReqwestTransport;

/// Request payload, streamed from its source rather than held in memory
pub enum RequestBody {
    Empty,
    /// Exactly `len` bytes read from the current position of `source`
    Stream {
        source: Box<dyn ByteSource>,
        len: u64,
    },
}

impl RequestBody {
    pub fn len(&self) -> u64 {
        match self {
            Self::Empty => 0,
            Self::Stream { len, .. } => *len,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for RequestBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => write!(f, "Empty"),
            Self::Stream { len, .. } => write!(f, "Stream({} bytes)", len),
        }
    }
}

/// A POST request against the upload endpoint or a session URL.
///
/// Not `Clone`: a streamed body is consumed by the send, so every attempt
/// builds a fresh request.
#[derive(Debug)]
pub struct HttpRequest {
    pub url: String,
    pub headers: Vec<(&'static str, String)>,
    pub body: RequestBody,
}

impl HttpRequest {
    /// Look up a header value by name (case-insensitive)
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// A complete HTTP response, body already buffered
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Header value as a trimmed string, if present and valid UTF-8
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
    }

    /// Body decoded as UTF-8, lossily
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Connection-level failure categories
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    TooManyRedirects,
    UnsupportedScheme,
    UnknownAuthority,
    Timeout,
    Connect,
    Other,
}

impl std::fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TooManyRedirects => write!(f, "too many redirects"),
            Self::UnsupportedScheme => write!(f, "unsupported scheme"),
            Self::UnknownAuthority => write!(f, "unknown certificate authority"),
            Self::Timeout => write!(f, "timeout"),
            Self::Connect => write!(f, "connect"),
            Self::Other => write!(f, "network"),
        }
    }
}

/// Failure with no HTTP response
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind} error: {message}")]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Retrying cannot fix redirect loops, bad schemes or untrusted certificates
    pub fn is_permanent(&self) -> bool {
        matches!(
            self.kind,
            TransportErrorKind::TooManyRedirects
                | TransportErrorKind::UnsupportedScheme
                | TransportErrorKind::UnknownAuthority
        )
    }
}

/// Capability to execute one HTTP POST round-trip
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permanent_transport_errors() {
        assert!(TransportError::new(TransportErrorKind::TooManyRedirects, "x").is_permanent());
        assert!(TransportError::new(TransportErrorKind::UnsupportedScheme, "x").is_permanent());
        assert!(TransportError::new(TransportErrorKind::UnknownAuthority, "x").is_permanent());
        assert!(!TransportError::new(TransportErrorKind::Connect, "x").is_permanent());
        assert!(!TransportError::new(TransportErrorKind::Timeout, "x").is_permanent());
        assert!(!TransportError::new(TransportErrorKind::Other, "x").is_permanent());
    }

    #[test]
    fn test_request_header_lookup_is_case_insensitive() {
        let request = HttpRequest {
            url: "https://example.com".to_string(),
            headers: vec![("X-Goog-Upload-Command", "query".to_string())],
            body: RequestBody::Empty,
        };
        assert_eq!(request.header("x-goog-upload-command"), Some("query"));
        assert_eq!(request.header("X-Goog-Upload-Offset"), None);
    }

    #[test]
    fn test_body_length() {
        assert!(RequestBody::Empty.is_empty());
        let body = RequestBody::Stream {
            source: Box::new(std::io::Cursor::new(vec![0u8; 8])),
            len: 5,
        };
        assert_eq!(body.len(), 5);
        assert_eq!(format!("{:?}", body), "Stream(5 bytes)");
    }
}
