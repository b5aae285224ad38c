//! In-memory session store

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use super::{SessionStore, SessionStoreError};

/// Process-local store; records vanish with the process
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<String, String>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored sessions
    pub fn len(&self) -> usize {
        self.sessions
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn get(&self, fingerprint: &str) -> Result<Option<String>, SessionStoreError> {
        let sessions = self.sessions.read().unwrap_or_else(|e| e.into_inner());
        Ok(sessions.get(fingerprint).cloned())
    }

    async fn set(&self, fingerprint: &str, url: &str) -> Result<(), SessionStoreError> {
        let mut sessions = self.sessions.write().unwrap_or_else(|e| e.into_inner());
        sessions.insert(fingerprint.to_string(), url.to_string());
        Ok(())
    }

    async fn delete(&self, fingerprint: &str) -> Result<(), SessionStoreError> {
        let mut sessions = self.sessions.write().unwrap_or_else(|e| e.into_inner());
        sessions.remove(fingerprint);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_set_get_delete() {
        let store = MemorySessionStore::new();
        assert_eq!(store.get("fp").await.unwrap(), None);

        store.set("fp", "https://upload/1").await.unwrap();
        assert_eq!(
            store.get("fp").await.unwrap().as_deref(),
            Some("https://upload/1")
        );

        store.set("fp", "https://upload/2").await.unwrap();
        assert_eq!(
            store.get("fp").await.unwrap().as_deref(),
            Some("https://upload/2")
        );

        store.delete("fp").await.unwrap();
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_writers_on_distinct_keys() {
        let store = Arc::new(MemorySessionStore::new());
        let mut handles = Vec::new();
        for i in 0..32 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let key = format!("fp-{}", i);
                store.set(&key, &format!("url-{}", i)).await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(store.len(), 32);
        assert_eq!(store.get("fp-7").await.unwrap().as_deref(), Some("url-7"));
    }
}
