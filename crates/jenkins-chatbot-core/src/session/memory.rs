//! In-memory [`SessionStore`].
//!
//! The outer `RwLock` guards only the id → session map; each session's
//! history has its own `Mutex`, so writers to different sessions never
//! contend. No lock is held across an `.await`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use tracing::debug;
use uuid::Uuid;

use super::SessionStore;
use crate::models::Turn;

type History = Arc<Mutex<Vec<Turn>>>;

#[derive(Default)]
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<String, History>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn session(&self, session_id: &str) -> Result<Option<History>> {
        let sessions = self
            .sessions
            .read()
            .map_err(|_| anyhow!("session map lock poisoned"))?;
        Ok(sessions.get(session_id).cloned())
    }

    fn with_history<T>(&self, session_id: &str, f: impl FnOnce(&mut Vec<Turn>) -> T) -> Result<Option<T>> {
        let Some(history) = self.session(session_id)? else {
            return Ok(None);
        };
        let mut turns = history
            .lock()
            .map_err(|_| anyhow!("session '{}' lock poisoned", session_id))?;
        Ok(Some(f(&mut turns)))
    }

    pub fn len(&self) -> usize {
        self.sessions.read().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn create(&self) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        self.sessions
            .write()
            .map_err(|_| anyhow!("session map lock poisoned"))?
            .insert(id.clone(), History::default());
        debug!(session_id = %id, "session created");
        Ok(id)
    }

    async fn exists(&self, session_id: &str) -> Result<bool> {
        Ok(self.session(session_id)?.is_some())
    }

    async fn history(&self, session_id: &str) -> Result<Option<Vec<Turn>>> {
        self.with_history(session_id, |turns| turns.clone())
    }

    async fn append(&self, session_id: &str, turn: Turn) -> Result<bool> {
        Ok(self.with_history(session_id, |turns| turns.push(turn))?.is_some())
    }

    async fn append_exchange(&self, session_id: &str, user: Turn, assistant: Turn) -> Result<bool> {
        let appended = self.with_history(session_id, |turns| {
            turns.push(user);
            turns.push(assistant);
        })?;
        Ok(appended.is_some())
    }

    async fn delete(&self, session_id: &str) -> Result<bool> {
        let removed = self
            .sessions
            .write()
            .map_err(|_| anyhow!("session map lock poisoned"))?
            .remove(session_id)
            .is_some();
        if removed {
            debug!(session_id, "session deleted");
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;

    #[tokio::test]
    async fn test_session_lifecycle() {
        let store = InMemorySessionStore::new();
        let id = store.create().await.unwrap();
        assert!(Uuid::parse_str(&id).is_ok());
        assert!(store.exists(&id).await.unwrap());
        assert_eq!(store.history(&id).await.unwrap(), Some(vec![]));

        assert!(store
            .append_exchange(&id, Turn::user("q"), Turn::assistant("a"))
            .await
            .unwrap());
        let history = store.history(&id).await.unwrap().unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].role, Role::User);
        assert_eq!(history[1].role, Role::Assistant);

        assert!(store.delete(&id).await.unwrap());
        assert!(!store.exists(&id).await.unwrap());
        assert!(!store.delete(&id).await.unwrap());
    }

    #[tokio::test]
    async fn test_missing_session() {
        let store = InMemorySessionStore::new();
        assert_eq!(store.history("nope").await.unwrap(), None);
        assert!(!store.append("nope", Turn::user("x")).await.unwrap());
        assert!(!store
            .append_exchange("nope", Turn::user("x"), Turn::assistant("y"))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_concurrent_exchanges_keep_pairs_together() {
        let store = Arc::new(InMemorySessionStore::new());
        let id = store.create().await.unwrap();

        let mut handles = Vec::new();
        for i in 0..16 {
            let store = store.clone();
            let id = id.clone();
            handles.push(tokio::spawn(async move {
                store
                    .append_exchange(&id, Turn::user(format!("q{}", i)), Turn::assistant(format!("a{}", i)))
                    .await
                    .unwrap()
            }));
        }
        for h in handles {
            assert!(h.await.unwrap());
        }

        let history = store.history(&id).await.unwrap().unwrap();
        assert_eq!(history.len(), 32);
        for pair in history.chunks(2) {
            assert_eq!(pair[0].role, Role::User);
            assert_eq!(pair[1].role, Role::Assistant);
            assert_eq!(pair[0].text[1..], pair[1].text[1..]);
        }
    }
}
