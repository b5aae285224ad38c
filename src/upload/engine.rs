//! Upload engine - session handling, offset recovery and the shared retry loop

use std::io::SeekFrom;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncSeekExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::error::UploadError;
use crate::retry::{AttemptFailure, RetryDecision, RetryPolicy};
use crate::session::SessionStore;
use crate::transport::{
    HttpRequest, HttpResponse, HttpTransport, RequestBody, TransportError, TransportErrorKind,
};

use super::fingerprint::fingerprint;
use super::item::{content_type_of, UploadItem};
use super::protocol::{self, SessionStatus, HEADER_STATUS, HEADER_UPLOAD_URL};

/// Opaque token returned by the service once all bytes are received
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UploadToken(String);

impl UploadToken {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl std::fmt::Display for UploadToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Upload protocol variant
#[derive(Clone)]
pub enum Strategy {
    /// One raw request with the full content, no session state
    Simple,
    /// Resumable sessions remembered in the given store
    Resumable(Arc<dyn SessionStore>),
}

/// Uploads items to the configured endpoint
pub struct Uploader {
    config: Arc<Config>,
    transport: Arc<dyn HttpTransport>,
    policy: RetryPolicy,
    strategy: Strategy,
}

impl Uploader {
    pub fn new(config: Arc<Config>, transport: Arc<dyn HttpTransport>, strategy: Strategy) -> Self {
        let policy = RetryPolicy::new(config.retry.clone());
        Self {
            config,
            transport,
            policy,
            strategy,
        }
    }

    /// Resumable uploader backed by `store`
    pub fn resumable(
        config: Arc<Config>,
        transport: Arc<dyn HttpTransport>,
        store: Arc<dyn SessionStore>,
    ) -> Self {
        Self::new(config, transport, Strategy::Resumable(store))
    }

    /// Single-shot uploader
    pub fn simple(config: Arc<Config>, transport: Arc<dyn HttpTransport>) -> Self {
        Self::new(config, transport, Strategy::Simple)
    }

    pub fn is_resumable(&self) -> bool {
        matches!(self.strategy, Strategy::Resumable(_))
    }

    /// Upload one item and return its upload token.
    ///
    /// Concurrent calls for items with the same fingerprint must be serialized
    /// by the caller, otherwise they may open divergent remote sessions.
    pub async fn upload(
        &self,
        item: &dyn UploadItem,
        cancel: &CancellationToken,
    ) -> Result<UploadToken, UploadError> {
        if cancel.is_cancelled() {
            return Err(UploadError::Cancelled);
        }

        match &self.strategy {
            Strategy::Simple => self.upload_simple(item, cancel).await,
            Strategy::Resumable(store) => self.upload_resumable(store.as_ref(), item, cancel).await,
        }
    }

    async fn upload_simple(
        &self,
        item: &dyn UploadItem,
        cancel: &CancellationToken,
    ) -> Result<UploadToken, UploadError> {
        let size = item.size();
        let content_type = content_type_of(item);
        let mut attempt = 0;

        loop {
            attempt += 1;
            let body = open_body(item, 0, size).await?;
            let request =
                protocol::raw_request(&self.config.endpoint, item.name(), &content_type, body);

            match self.execute(request, cancel).await {
                Ok(response) => {
                    let token = token_from(&response)?;
                    info!("Uploaded {} ({} bytes)", item.name(), size);
                    return Ok(token);
                }
                Err(failure) => self.retry_step("raw upload", failure, attempt, cancel).await?,
            }
        }
    }

    async fn upload_resumable(
        &self,
        store: &dyn SessionStore,
        item: &dyn UploadItem,
        cancel: &CancellationToken,
    ) -> Result<UploadToken, UploadError> {
        let size = item.size();
        let fp = fingerprint(item);

        let (mut session_url, mut offset) = self.prepare_session(store, &fp, item, cancel).await?;
        let mut attempt = 0;

        loop {
            attempt += 1;
            let body = open_body(item, offset, size).await?;
            let request = protocol::finalize_request(&session_url, offset, body);

            let failure = match self.execute(request, cancel).await {
                Ok(response) => {
                    // A 2xx finalize closes the session whatever the body holds
                    forget_session(store, &fp).await;
                    let token = token_from(&response)?;
                    info!(
                        "Uploaded {} ({} bytes, resumed at {})",
                        item.name(),
                        size,
                        offset
                    );
                    return Ok(token);
                }
                Err(failure) => failure,
            };

            if reports_closed_session(&failure) {
                forget_session(store, &fp).await;
            }

            self.retry_step("upload", failure, attempt, cancel).await?;

            // Bytes may have landed before the failure; ask where the remote stands
            match self.execute(protocol::query_request(&session_url), cancel).await {
                Ok(response) => {
                    let status = protocol::parse_session_status(&response);
                    match status.as_ref().and_then(|s| s.resume_offset(size)) {
                        Some(remote_offset) => {
                            offset = remote_offset;
                            debug!("Retrying upload of {} from offset {}", item.name(), offset);
                        }
                        None => {
                            warn!(
                                "Upload session for {} is no longer usable ({:?}), starting a new one",
                                item.name(),
                                status
                            );
                            forget_session(store, &fp).await;
                            (session_url, offset) =
                                self.open_session(store, &fp, item, cancel).await?;
                        }
                    }
                }
                Err(_) if cancel.is_cancelled() => return Err(UploadError::Cancelled),
                Err(failure) => {
                    debug!(
                        "Offset re-query for {} failed ({:?}), retrying from offset {}",
                        item.name(),
                        failure,
                        offset
                    );
                }
            }
        }
    }

    /// Resume a remembered session when the remote still accepts it, else open a new one
    async fn prepare_session(
        &self,
        store: &dyn SessionStore,
        fp: &str,
        item: &dyn UploadItem,
        cancel: &CancellationToken,
    ) -> Result<(String, u64), UploadError> {
        let size = item.size();

        if let Some(url) = lookup_session(store, fp).await {
            match self.query_status(&url, cancel).await {
                Ok(status) => match status.resume_offset(size) {
                    Some(offset) => {
                        info!(
                            "Resuming upload of {} at offset {}/{}",
                            item.name(),
                            offset,
                            size
                        );
                        return Ok((url, offset));
                    }
                    None => {
                        warn!(
                            "Discarding stale upload session for {} (state {:?}, received {:?})",
                            item.name(),
                            status.state,
                            status.received
                        );
                        forget_session(store, fp).await;
                    }
                },
                Err(UploadError::Cancelled) => return Err(UploadError::Cancelled),
                Err(e) => {
                    // The remote may still hold the session; a restart is the safe choice
                    warn!(
                        "Could not query upload session for {}, starting over: {}",
                        item.name(),
                        e
                    );
                }
            }
        }

        self.open_session(store, fp, item, cancel).await
    }

    /// Start a session, remember it, and confirm its offset with the remote
    async fn open_session(
        &self,
        store: &dyn SessionStore,
        fp: &str,
        item: &dyn UploadItem,
        cancel: &CancellationToken,
    ) -> Result<(String, u64), UploadError> {
        let size = item.size();
        let content_type = content_type_of(item);
        let start = || {
            protocol::start_request(&self.config.endpoint, item.name(), size, &content_type)
        };
        let response = self.send_with_retry("session start", start, cancel).await?;

        let url = response
            .header(HEADER_UPLOAD_URL)
            .filter(|u| !u.is_empty())
            .map(str::to_string)
            .ok_or_else(|| {
                UploadError::ProtocolViolation(format!(
                    "start response missing {} header",
                    HEADER_UPLOAD_URL
                ))
            })?;

        remember_session(store, fp, &url).await;
        info!("Opened upload session for {} ({} bytes)", item.name(), size);

        let offset = match self.query_status(&url, cancel).await {
            Ok(status) => status.resume_offset(size).unwrap_or_else(|| {
                warn!(
                    "New session for {} reported {:?}, uploading from 0",
                    item.name(),
                    status
                );
                0
            }),
            Err(UploadError::Cancelled) => return Err(UploadError::Cancelled),
            Err(e) => {
                warn!(
                    "Offset query for new session of {} failed, uploading from 0: {}",
                    item.name(),
                    e
                );
                0
            }
        };

        Ok((url, offset))
    }

    async fn query_status(
        &self,
        session_url: &str,
        cancel: &CancellationToken,
    ) -> Result<SessionStatus, UploadError> {
        let query = || protocol::query_request(session_url);
        let response = self.send_with_retry("offset query", query, cancel).await?;
        protocol::parse_session_status(&response).ok_or_else(|| {
            UploadError::ProtocolViolation(format!(
                "query response missing {} header",
                HEADER_STATUS
            ))
        })
    }

    /// Send a bodiless request built by `make_request` until it succeeds or
    /// the retry policy gives up
    async fn send_with_retry(
        &self,
        what: &str,
        make_request: impl Fn() -> HttpRequest,
        cancel: &CancellationToken,
    ) -> Result<HttpResponse, UploadError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.execute(make_request(), cancel).await {
                Ok(response) => return Ok(response),
                Err(failure) => self.retry_step(what, failure, attempt, cancel).await?,
            }
        }
    }

    /// One round-trip raced against cancellation; non-2xx responses are failures
    async fn execute(
        &self,
        request: HttpRequest,
        cancel: &CancellationToken,
    ) -> Result<HttpResponse, AttemptFailure> {
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(AttemptFailure::Transport(TransportError::new(
                    TransportErrorKind::Other,
                    "request aborted by caller",
                )));
            }
            result = self.transport.send(request) => result,
        };

        match result {
            Ok(response) if response.status.is_success() => Ok(response),
            Ok(response) => Err(AttemptFailure::Status(response)),
            Err(err) => Err(AttemptFailure::Transport(err)),
        }
    }

    /// Classify a failure; Ok means the backoff was waited out and the caller should retry
    async fn retry_step(
        &self,
        what: &str,
        failure: AttemptFailure,
        attempt: u32,
        cancel: &CancellationToken,
    ) -> Result<(), UploadError> {
        match self.policy.classify(failure, attempt, cancel.is_cancelled()) {
            RetryDecision::Retry { wait, cause } => {
                debug!(
                    "{} failed (attempt {}/{}): {}, retrying in {}ms",
                    what,
                    attempt,
                    self.policy.config().max_attempts,
                    cause,
                    wait.as_millis()
                );
                sleep_or_cancel(wait, cancel).await
            }
            RetryDecision::Terminal(err) => {
                match &err {
                    UploadError::RetriesExhausted { .. } => error!("{} gave up: {}", what, err),
                    UploadError::Cancelled => debug!("{} cancelled", what),
                    _ => warn!("{} failed: {}", what, err),
                }
                Err(err)
            }
        }
    }
}

/// Backoff sleep that aborts as soon as the caller cancels
async fn sleep_or_cancel(wait: Duration, cancel: &CancellationToken) -> Result<(), UploadError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(UploadError::Cancelled),
        _ = tokio::time::sleep(wait) => Ok(()),
    }
}

/// Open a fresh source positioned at `offset` for the bytes `[offset, size)`.
///
/// Every attempt reopens the item, so nothing is buffered between retries.
async fn open_body(item: &dyn UploadItem, offset: u64, size: u64) -> std::io::Result<RequestBody> {
    let len = size.saturating_sub(offset);
    if len == 0 {
        return Ok(RequestBody::Empty);
    }

    let mut source = item.open().await?;
    if offset > 0 {
        source.seek(SeekFrom::Start(offset)).await?;
    }
    Ok(RequestBody::Stream { source, len })
}

fn token_from(response: &HttpResponse) -> Result<UploadToken, UploadError> {
    let token = response.text().trim().to_string();
    if token.is_empty() {
        return Err(UploadError::ProtocolViolation(
            "upload response carried no token".to_string(),
        ));
    }
    Ok(UploadToken(token))
}

/// The failed response says the session is final or cancelled
fn reports_closed_session(failure: &AttemptFailure) -> bool {
    match failure {
        AttemptFailure::Status(response) => {
            protocol::session_state(response).is_some_and(|state| state.is_closed())
        }
        AttemptFailure::Transport(_) => false,
    }
}

// Store failures only cost resumability, so they are logged and swallowed.

async fn lookup_session(store: &dyn SessionStore, fp: &str) -> Option<String> {
    match store.get(fp).await {
        Ok(url) => url,
        Err(e) => {
            warn!("Session store lookup failed, starting a new session: {}", e);
            None
        }
    }
}

async fn remember_session(store: &dyn SessionStore, fp: &str, url: &str) {
    if let Err(e) = store.set(fp, url).await {
        warn!("Failed to remember upload session: {}", e);
    }
}

async fn forget_session(store: &dyn SessionStore, fp: &str) {
    if let Err(e) = store.delete(fp).await {
        warn!("Failed to forget upload session: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upload::item::{BytesItem, FileItem};
    use tokio::io::AsyncReadExt;

    async fn read_body(body: RequestBody) -> Vec<u8> {
        let mut data = Vec::new();
        if let RequestBody::Stream { source, len } = body {
            source.take(len).read_to_end(&mut data).await.unwrap();
        }
        data
    }

    #[tokio::test]
    async fn test_open_body_from_start_and_offset() {
        let item = BytesItem::new("a.bin", b"0123456789".to_vec());

        let full = open_body(&item, 0, 10).await.unwrap();
        assert_eq!(full.len(), 10);
        assert_eq!(read_body(full).await, b"0123456789");

        let tail = open_body(&item, 4, 10).await.unwrap();
        assert_eq!(tail.len(), 6);
        assert_eq!(read_body(tail).await, b"456789");
    }

    #[tokio::test]
    async fn test_open_body_at_end_is_empty() {
        let item = BytesItem::new("a.bin", b"0123456789".to_vec());
        assert!(matches!(
            open_body(&item, 10, 10).await.unwrap(),
            RequestBody::Empty
        ));
    }

    #[tokio::test]
    async fn test_open_body_reports_missing_source() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("gone.jpg");
        std::fs::write(&path, b"abc").unwrap();
        let item = FileItem::from_path(&path).await.unwrap();
        std::fs::remove_file(&path).unwrap();

        let err = open_body(&item, 0, 3).await.unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::NotFound);
    }

    #[test]
    fn test_token_from_trims_body() {
        let response = HttpResponse {
            status: reqwest::StatusCode::OK,
            headers: reqwest::header::HeaderMap::new(),
            body: b"  tok-123\n".to_vec(),
        };
        assert_eq!(token_from(&response).unwrap().as_str(), "tok-123");

        let empty = HttpResponse {
            body: Vec::new(),
            ..response
        };
        assert!(matches!(
            token_from(&empty),
            Err(UploadError::ProtocolViolation(_))
        ));
    }

    #[tokio::test]
    async fn test_sleep_or_cancel_aborts_promptly() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = tokio::time::timeout(
            Duration::from_secs(1),
            sleep_or_cancel(Duration::from_secs(3600), &cancel),
        )
        .await
        .unwrap();
        assert!(matches!(result, Err(UploadError::Cancelled)));
    }
}
