//! JSON file-backed session store

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::{SessionStore, SessionStoreError};

/// One persisted resumable session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub url: String,
    pub created_at: DateTime<Utc>,
}

/// Store persisted as a JSON object keyed by fingerprint.
///
/// The whole map is rewritten on every change; writes go to a sibling temp
/// file first and are renamed into place.
pub struct FileSessionStore {
    path: PathBuf,
    sessions: Mutex<HashMap<String, SessionRecord>>,
}

impl FileSessionStore {
    /// Open (or lazily create) the store at `path`
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, SessionStoreError> {
        let path = path.into();
        let sessions = load_sessions(&path).await?;
        debug!(
            "Loaded {} upload session(s) from {:?}",
            sessions.len(),
            path
        );
        Ok(Self {
            path,
            sessions: Mutex::new(sessions),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Full record for a fingerprint, including when it was created
    pub async fn record(&self, fingerprint: &str) -> Option<SessionRecord> {
        self.sessions.lock().await.get(fingerprint).cloned()
    }

    async fn persist(&self, sessions: &HashMap<String, SessionRecord>) -> Result<(), SessionStoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let content = serde_json::to_string_pretty(sessions)?;
        let tmp_path = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, content).await?;
        tokio::fs::rename(&tmp_path, &self.path).await?;
        Ok(())
    }
}

/// Read the session map; a corrupt file is discarded rather than fatal
async fn load_sessions(path: &Path) -> Result<HashMap<String, SessionRecord>, SessionStoreError> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(HashMap::new()),
        Err(e) => return Err(e.into()),
    };

    match serde_json::from_str(&content) {
        Ok(sessions) => Ok(sessions),
        Err(e) => {
            warn!("Failed to parse session file {:?}, starting empty: {}", path, e);
            Ok(HashMap::new())
        }
    }
}

#[async_trait]
impl SessionStore for FileSessionStore {
    async fn get(&self, fingerprint: &str) -> Result<Option<String>, SessionStoreError> {
        let sessions = self.sessions.lock().await;
        Ok(sessions.get(fingerprint).map(|r| r.url.clone()))
    }

    async fn set(&self, fingerprint: &str, url: &str) -> Result<(), SessionStoreError> {
        let mut sessions = self.sessions.lock().await;
        sessions.insert(
            fingerprint.to_string(),
            SessionRecord {
                url: url.to_string(),
                created_at: Utc::now(),
            },
        );
        self.persist(&sessions).await
    }

    async fn delete(&self, fingerprint: &str) -> Result<(), SessionStoreError> {
        let mut sessions = self.sessions.lock().await;
        if sessions.remove(fingerprint).is_none() {
            return Ok(());
        }
        self.persist(&sessions).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_missing_file_opens_empty() {
        let dir = TempDir::new().unwrap();
        let store = FileSessionStore::open(dir.path().join("sessions.json"))
            .await
            .unwrap();
        assert_eq!(store.get("anything").await.unwrap(), None);
        assert!(!store.path().exists());
    }

    #[tokio::test]
    async fn test_corrupt_file_is_discarded() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sessions.json");
        std::fs::write(&path, "{not json").unwrap();

        let store = FileSessionStore::open(&path).await.unwrap();
        assert_eq!(store.get("fp").await.unwrap(), None);

        store.set("fp", "https://upload/1").await.unwrap();
        let reopened = FileSessionStore::open(&path).await.unwrap();
        assert_eq!(
            reopened.get("fp").await.unwrap().as_deref(),
            Some("https://upload/1")
        );
    }

    #[tokio::test]
    async fn test_record_has_creation_time() {
        let dir = TempDir::new().unwrap();
        let store = FileSessionStore::open(dir.path().join("nested/sessions.json"))
            .await
            .unwrap();
        let before = Utc::now();
        store.set("fp", "https://upload/1").await.unwrap();
        let record = store.record("fp").await.unwrap();
        assert!(record.created_at >= before);
        assert_eq!(record.url, "https://upload/1");
    }
}
