//! Wiring: turns a [`Config`] into a ready [`AnswerOrchestrator`].
//!
//! ```text
//! Config ─▶ SqliteIndex ─┐
//!        ─▶ Embedder ────┼─▶ RetrievalBackend ─▶ ToolRegistry ─┐
//!        ─▶ PluginCatalog┘                                     ├─▶ AnswerOrchestrator
//!        ─▶ Generator ─────────────────────────────────────────┤
//!        ─▶ InMemorySessionStore ──────────────────────────────┘
//! ```

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use jenkins_chatbot_core::session::memory::InMemorySessionStore;
use jenkins_chatbot_core::session::SessionStore;
use jenkins_chatbot_core::tools::{PluginCatalog, RetrievalBackend, ToolRegistry};
use jenkins_chatbot_core::AnswerOrchestrator;

use crate::config::Config;
use crate::db;
use crate::embedding::create_embedder;
use crate::llm::create_generator;
use crate::sqlite_index::SqliteIndex;

/// Parse a plugin-name list: a JSON array of strings, or one name per line
/// (blank lines and `#` comments ignored).
pub fn parse_plugin_names(content: &str) -> Result<Vec<String>> {
    let trimmed = content.trim_start();
    if trimmed.starts_with('[') {
        return serde_json::from_str(trimmed).context("Failed to parse plugin name array");
    }
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(str::to_string)
        .collect())
}

/// Known plugins from `retrieval.plugin_names_path`, or the titles of the
/// ingested plugin docs when no list is configured.
pub async fn load_plugin_catalog(config: &Config, index: &SqliteIndex) -> Result<PluginCatalog> {
    let names = match &config.retrieval.plugin_names_path {
        Some(path) => read_plugin_names(path)?,
        None => index.plugin_titles().await?,
    };

    let catalog = PluginCatalog::new(names);
    if catalog.is_empty() {
        warn!("no known plugin names; plugin_name filters will be ignored");
    }
    Ok(catalog)
}

/// Retrieval backend over the configured database.
pub async fn build_backend(config: &Config) -> Result<RetrievalBackend> {
    let index = SqliteIndex::new(db::connect(config).await?);
    let plugins = load_plugin_catalog(config, &index).await?;
    let embedder = create_embedder(&config.embedding)?;

    info!(
        embedding = embedder.model_name(),
        plugins = plugins.len(),
        "retrieval backend ready"
    );

    Ok(RetrievalBackend {
        index: Arc::new(index),
        embedder,
        settings: Arc::new(config.retrieval.to_settings()),
        plugins: Arc::new(plugins),
    })
}

/// Orchestrator with the four corpus tools and a fresh in-memory session store.
pub async fn build_orchestrator(config: &Config) -> Result<Arc<AnswerOrchestrator>> {
    let backend = build_backend(config).await?;
    let tools = Arc::new(ToolRegistry::with_corpus_tools(backend));
    let generator = create_generator(&config.llm)?;
    if !config.llm.is_enabled() {
        warn!("llm.provider is disabled; every generated reply will be an apology");
    }
    let sessions: Arc<dyn SessionStore> = Arc::new(InMemorySessionStore::new());
    let settings = config.pipeline.to_settings(&config.llm, &config.retrieval);

    Ok(Arc::new(AnswerOrchestrator::new(generator, tools, sessions, settings)))
}

/// `chatbot ask`: answer one question in a throwaway session.
pub async fn run_ask(config: &Config, question: &str) -> Result<()> {
    let orchestrator = build_orchestrator(config).await?;
    let session_id = orchestrator.sessions().create().await?;
    let reply = orchestrator.answer(&session_id, question).await?;
    println!("{}", reply);
    Ok(())
}

pub fn read_plugin_names(path: &Path) -> Result<Vec<String>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read plugin names: {}", path.display()))?;
    parse_plugin_names(&content)
}
