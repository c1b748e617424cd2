//! Errors surfaced by the answer pipeline.
//!
//! Model output problems never appear here: they are absorbed by fallbacks
//! inside the pipeline. Only caller mistakes and storage failures escape.

/// Error returned by [`AnswerOrchestrator`](crate::AnswerOrchestrator).
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    /// The session id does not exist (never created, or deleted).
    #[error("session '{0}' not found")]
    SessionNotFound(String),

    /// The user message was empty or whitespace only.
    #[error("message must not be empty")]
    EmptyMessage,

    /// The session store failed.
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}
