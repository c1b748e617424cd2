//! Session storage abstraction.
//!
//! A session is an id plus an append-only history of turns. The pipeline
//! only reads history and appends one user/assistant pair per exchange.
//! Implementations must serialize writers per session id; different
//! sessions are independent.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::Turn;

/// Abstract session store.
///
/// | Method | Missing session |
/// |--------|-----------------|
/// | [`history`](SessionStore::history) | `Ok(None)` |
/// | [`append`](SessionStore::append) | `Ok(false)` |
/// | [`delete`](SessionStore::delete) | `Ok(false)` |
///
/// `Err` is reserved for backend failures.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Create an empty session and return its id.
    async fn create(&self) -> Result<String>;

    async fn exists(&self, session_id: &str) -> Result<bool>;

    /// Snapshot of the history, oldest first.
    async fn history(&self, session_id: &str) -> Result<Option<Vec<Turn>>>;

    async fn append(&self, session_id: &str, turn: Turn) -> Result<bool>;

    /// Append a user turn followed by an assistant turn.
    ///
    /// The default appends them one at a time; stores that can should
    /// override this to write both under a single lock.
    async fn append_exchange(&self, session_id: &str, user: Turn, assistant: Turn) -> Result<bool> {
        if !self.append(session_id, user).await? {
            return Ok(false);
        }
        self.append(session_id, assistant).await
    }

    /// Remove a session and its history.
    async fn delete(&self, session_id: &str) -> Result<bool>;
}
