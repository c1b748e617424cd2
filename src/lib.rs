//! # Jenkins Chatbot
//!
//! A retrieval-augmented assistant for Jenkins questions. The agentic
//! pipeline (planning, retrieval, relevance judging, decomposition) lives
//! in [`jenkins_chatbot_core`]; this crate supplies the concrete backends
//! and the outer surfaces.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌───────────┐
//! │ Chunk files  │──▶│   Ingest     │──▶│  SQLite   │
//! │ JSON / JSONL │   │ Hash+Embed   │   │ FTS5+Vec  │
//! └──────────────┘   └──────────────┘   └─────┬─────┘
//!                                             │
//!                     ┌───────────────────────┤
//!                     ▼                       ▼
//!              ┌─────────────┐        ┌──────────────┐   ┌───────────┐
//!              │ CLI search  │        │ Orchestrator │──▶│ LLM (HTTP)│
//!              │  (chatbot)  │        │ CLI ask/HTTP │   └───────────┘
//!              └─────────────┘        └──────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! chatbot init
//! chatbot ingest plugin_docs ./data/plugin_docs_chunks.jsonl
//! chatbot search "configure git credentials" --tool search_plugin_docs --plugin git
//! chatbot ask "How do I install a plugin offline?"
//! chatbot serve
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema creation |
//! | [`sqlite_index`] | FTS5 + vector [`SearchIndex`](jenkins_chatbot_core::index::SearchIndex) |
//! | [`ingest`] | Chunk file ingestion |
//! | [`http`] | Retrying JSON client shared by providers |
//! | [`embedding`] | Embedding providers |
//! | [`llm`] | Generation provider |
//! | [`chat`] | Component wiring and `ask` |
//! | [`search`] | Direct tool invocation |
//! | [`server`] | HTTP API |
//! | [`logging`] | Subscriber setup |

pub mod chat;
pub mod config;
pub mod db;
pub mod embedding;
pub mod http;
pub mod ingest;
pub mod llm;
pub mod logging;
pub mod migrate;
pub mod search;
pub mod server;
pub mod sqlite_index;
