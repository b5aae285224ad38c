//! gphotos-uploader library - resumable media uploads to the Google Photos upload endpoint

pub mod config;
pub mod error;
pub mod http_logger;
pub mod retry;
pub mod session;
pub mod transport;
pub mod upload;

// Re-export commonly used types
pub use config::{Config, ConfigOptions, RetryConfig};
pub use error::{HttpFailure, QuotaKind, UploadError};
pub use retry::{AttemptFailure, RetryDecision, RetryPolicy};
pub use session::{FileSessionStore, MemorySessionStore, SessionStore, SessionStoreError};
pub use transport::{
    HttpRequest, HttpResponse, HttpTransport, ReqwestTransport, RequestBody, TransportError,
};
pub use upload::{BatchOutcome, BytesItem, FileItem, Strategy, UploadItem, UploadToken, Uploader};
