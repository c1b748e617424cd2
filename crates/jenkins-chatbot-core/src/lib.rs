//! # Jenkins Chatbot Core
//!
//! The agentic retrieval-and-answer pipeline behind the Jenkins chatbot:
//! data models, score fusion, retrieval tools, tool-call planning,
//! relevance judging, query decomposition, and the answer orchestrator.
//!
//! This crate contains no database, HTTP, or filesystem I/O. Every external
//! capability (text generation, embeddings, dense/sparse indices, session
//! storage) is consumed through a trait and injected at construction time.
//!
//! ```text
//! AnswerOrchestrator
//!   ├─ QueryDecomposer ── classify / split
//!   └─ per sub-query, at most R+1 rounds:
//!        ToolCallPlanner ─▶ ToolRegistry ─▶ SearchIndex ─▶ fusion ─▶ RelevanceJudge
//!   ─▶ prompts::build_prompt ─▶ Generator
//! ```

pub mod context;
pub mod decomposer;
pub mod embedding;
pub mod error;
pub mod fusion;
pub mod generation;
pub mod index;
pub mod judge;
pub mod models;
pub mod orchestrator;
pub mod planner;
pub mod prompts;
pub mod session;
pub mod tools;

#[cfg(test)]
mod test_logs;

pub use error::ChatError;
pub use orchestrator::{AnswerOrchestrator, PipelineSettings};
