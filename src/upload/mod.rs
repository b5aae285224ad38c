//! Upload engine - resumable and single-shot uploads

mod batch;
mod engine;
pub mod fingerprint;
pub mod item;
pub mod protocol;

pub use batch::{BatchOutcome, BatchStats};
pub use engine::{Strategy, UploadToken, Uploader};
pub use fingerprint::{fingerprint, fingerprint_parts};
pub use item::{content_type_of, ByteSource, BytesItem, FileItem, UploadItem, DEFAULT_CONTENT_TYPE};
pub use protocol::{SessionState, SessionStatus};
