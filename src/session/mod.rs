//! Session stores - fingerprint to resumable session URL
//!
//! The store is only a cache of where to resume: losing a record costs a
//! restart from zero, never corrupted data.

mod file;
mod memory;

use async_trait::async_trait;

pub use file::FileSessionStore;
pub use memory::MemorySessionStore;

#[derive(Debug, thiserror::Error)]
pub enum SessionStoreError {
    #[error("session store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("session store encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// Map from upload fingerprint to remote session URL.
///
/// Implementations must tolerate concurrent calls for different fingerprints.
/// Per fingerprint the last write wins.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get(&self, fingerprint: &str) -> Result<Option<String>, SessionStoreError>;

    async fn set(&self, fingerprint: &str, url: &str) -> Result<(), SessionStoreError>;

    async fn delete(&self, fingerprint: &str) -> Result<(), SessionStoreError>;
}
