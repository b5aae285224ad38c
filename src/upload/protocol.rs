//! Upload wire protocol - header names and request construction

use crate::transport::{HttpRequest, HttpResponse, RequestBody};

pub const HEADER_COMMAND: &str = "X-Goog-Upload-Command";
pub const HEADER_PROTOCOL: &str = "X-Goog-Upload-Protocol";
pub const HEADER_CONTENT_TYPE: &str = "X-Goog-Upload-Content-Type";
pub const HEADER_FILE_NAME: &str = "X-Goog-Upload-File-Name";
pub const HEADER_RAW_SIZE: &str = "X-Goog-Upload-Raw-Size";
pub const HEADER_OFFSET: &str = "X-Goog-Upload-Offset";
pub const HEADER_UPLOAD_URL: &str = "X-Goog-Upload-URL";
pub const HEADER_STATUS: &str = "X-Goog-Upload-Status";
pub const HEADER_SIZE_RECEIVED: &str = "X-Goog-Upload-Size-Received";

pub const COMMAND_START: &str = "start";
pub const COMMAND_QUERY: &str = "query";
pub const COMMAND_UPLOAD_FINALIZE: &str = "upload, finalize";

pub const PROTOCOL_RESUMABLE: &str = "resumable";
pub const PROTOCOL_RAW: &str = "raw";

const OCTET_STREAM: &str = "application/octet-stream";

/// Remote state of a resumable session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Active,
    Final,
    Cancelled,
    Unknown(String),
}

impl SessionState {
    fn parse(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "active" => Self::Active,
            "final" => Self::Final,
            "cancelled" => Self::Cancelled,
            other => Self::Unknown(other.to_string()),
        }
    }

    /// The session can no longer accept bytes
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Final | Self::Cancelled)
    }
}

/// Answer to a "query" command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStatus {
    pub state: SessionState,
    /// Bytes durably received; None when missing or unparseable
    pub received: Option<u64>,
}

impl SessionStatus {
    /// Offset to resume from, if the session is active and the offset fits the item
    pub fn resume_offset(&self, size: u64) -> Option<u64> {
        match (&self.state, self.received) {
            (SessionState::Active, Some(received)) if received <= size => Some(received),
            _ => None,
        }
    }
}

/// Session state advertised on a response, if any
pub fn session_state(response: &HttpResponse) -> Option<SessionState> {
    response.header(HEADER_STATUS).map(SessionState::parse)
}

/// Parse the status headers of a successful query response
pub fn parse_session_status(response: &HttpResponse) -> Option<SessionStatus> {
    let state = session_state(response)?;
    let received = response
        .header(HEADER_SIZE_RECEIVED)
        .and_then(|v| v.parse::<u64>().ok());
    Some(SessionStatus { state, received })
}

/// "start" request opening a resumable session
pub fn start_request(endpoint: &str, name: &str, size: u64, content_type: &str) -> HttpRequest {
    HttpRequest {
        url: endpoint.to_string(),
        headers: vec![
            ("Content-Length", "0".to_string()),
            (HEADER_COMMAND, COMMAND_START.to_string()),
            (HEADER_PROTOCOL, PROTOCOL_RESUMABLE.to_string()),
            (HEADER_CONTENT_TYPE, content_type.to_string()),
            (HEADER_FILE_NAME, name.to_string()),
            (HEADER_RAW_SIZE, size.to_string()),
        ],
        body: RequestBody::Empty,
    }
}

/// "query" request asking how many bytes the session holds
pub fn query_request(session_url: &str) -> HttpRequest {
    HttpRequest {
        url: session_url.to_string(),
        headers: vec![
            ("Content-Length", "0".to_string()),
            (HEADER_COMMAND, COMMAND_QUERY.to_string()),
        ],
        body: RequestBody::Empty,
    }
}

/// "upload, finalize" request carrying the bytes from `offset` to the end.
///
/// Streamed bodies carry no size hint, so Content-Length is always declared.
pub fn finalize_request(session_url: &str, offset: u64, body: RequestBody) -> HttpRequest {
    HttpRequest {
        url: session_url.to_string(),
        headers: vec![
            ("Content-Length", body.len().to_string()),
            (HEADER_COMMAND, COMMAND_UPLOAD_FINALIZE.to_string()),
            (HEADER_OFFSET, offset.to_string()),
        ],
        body,
    }
}

/// Single-shot raw upload of the full content
pub fn raw_request(endpoint: &str, name: &str, content_type: &str, body: RequestBody) -> HttpRequest {
    HttpRequest {
        url: endpoint.to_string(),
        headers: vec![
            ("Content-Type", OCTET_STREAM.to_string()),
            ("Content-Length", body.len().to_string()),
            (HEADER_PROTOCOL, PROTOCOL_RAW.to_string()),
            (HEADER_CONTENT_TYPE, content_type.to_string()),
            (HEADER_FILE_NAME, name.to_string()),
        ],
        body,
    }
}
