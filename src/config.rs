//! TOML configuration.
//!
//! See `config/chatbot.example.toml` for every key with its default.
//! `[db]` and `[pipeline].max_reformulations` are required; every other
//! section may be omitted.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use jenkins_chatbot_core::models::RelevanceLabel;
use jenkins_chatbot_core::tools::RetrievalSettings;
use jenkins_chatbot_core::PipelineSettings;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
    #[serde(default = "default_db_connections")]
    pub max_connections: u32,
    /// How long a writer waits on a locked database before failing.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

fn default_db_connections() -> u32 {
    5
}
fn default_busy_timeout_ms() -> u64 {
    5_000
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_disabled")]
    pub provider: String,
    #[serde(default = "default_llm_url")]
    pub base_url: String,
    #[serde(default)]
    pub model: Option<String>,
    /// Name of the environment variable holding the API key, if any.
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default = "default_answer_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_llm_retries")]
    pub max_retries: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_disabled(),
            base_url: default_llm_url(),
            model: None,
            api_key_env: None,
            max_tokens: default_answer_tokens(),
            temperature: default_temperature(),
            timeout_secs: default_llm_timeout(),
            max_retries: default_llm_retries(),
        }
    }
}

impl LlmConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_disabled() -> String {
    "disabled".to_string()
}
fn default_llm_url() -> String {
    "http://localhost:8080".to_string()
}
fn default_answer_tokens() -> u32 {
    1024
}
fn default_temperature() -> f32 {
    0.2
}
fn default_llm_timeout() -> u64 {
    120
}
fn default_llm_retries() -> u32 {
    2
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_disabled")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Base URL for the Ollama provider.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_disabled(),
            model: None,
            dims: None,
            url: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_semantic_weight")]
    pub semantic_weight: f64,
    #[serde(default = "default_candidate_k")]
    pub dense_top_k: usize,
    #[serde(default = "default_candidate_k")]
    pub sparse_top_k: usize,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default)]
    pub keyword_threshold: f64,
    #[serde(default = "default_empty_context")]
    pub empty_context_message: String,
    /// JSON array or newline-separated list of known plugin names.
    #[serde(default)]
    pub plugin_names_path: Option<PathBuf>,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            semantic_weight: default_semantic_weight(),
            dense_top_k: default_candidate_k(),
            sparse_top_k: default_candidate_k(),
            top_k: default_top_k(),
            keyword_threshold: 0.0,
            empty_context_message: default_empty_context(),
            plugin_names_path: None,
        }
    }
}

impl RetrievalConfig {
    pub fn to_settings(&self) -> RetrievalSettings {
        RetrievalSettings {
            semantic_weight: self.semantic_weight,
            dense_top_k: self.dense_top_k,
            sparse_top_k: self.sparse_top_k,
            top_k: self.top_k,
            keyword_threshold: self.keyword_threshold,
            empty_context_message: self.empty_context_message.clone(),
        }
    }
}

fn default_semantic_weight() -> f64 {
    0.5
}
fn default_candidate_k() -> usize {
    20
}
fn default_top_k() -> usize {
    5
}
fn default_empty_context() -> String {
    "No context available.".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct PipelineConfig {
    /// Extra retrieval rounds after the first. Required.
    pub max_reformulations: u32,
    #[serde(default = "default_label")]
    pub relevance_threshold: u8,
    #[serde(default = "default_label")]
    pub max_relevance_label: u8,
    #[serde(default = "default_classifier_tokens")]
    pub classifier_max_tokens: u32,
    #[serde(default = "default_stage_tokens")]
    pub splitter_max_tokens: u32,
    #[serde(default = "default_planner_tokens")]
    pub planner_max_tokens: u32,
    #[serde(default = "default_stage_tokens")]
    pub judge_max_tokens: u32,
    /// Reply when nothing relevant was found; `{query}` is substituted.
    #[serde(default)]
    pub cannot_answer_message: Option<String>,
}

impl PipelineConfig {
    pub fn to_settings(&self, llm: &LlmConfig, retrieval: &RetrievalConfig) -> PipelineSettings {
        let mut settings = PipelineSettings::new(self.max_reformulations);
        settings.relevance_threshold = RelevanceLabel(self.relevance_threshold);
        settings.max_relevance_label = RelevanceLabel(self.max_relevance_label);
        settings.answer_max_tokens = llm.max_tokens;
        settings.classifier_max_tokens = self.classifier_max_tokens;
        settings.splitter_max_tokens = self.splitter_max_tokens;
        settings.planner_max_tokens = self.planner_max_tokens;
        settings.judge_max_tokens = self.judge_max_tokens;
        settings.no_context_message = retrieval.empty_context_message.clone();
        if let Some(template) = &self.cannot_answer_message {
            settings.cannot_answer_template = template.clone();
        }
        settings
    }
}

fn default_label() -> u8 {
    1
}
fn default_classifier_tokens() -> u32 {
    10
}
fn default_stage_tokens() -> u32 {
    256
}
fn default_planner_tokens() -> u32 {
    512
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_api_prefix")]
    pub api_prefix: String,
    /// Empty means any origin.
    #[serde(default)]
    pub cors_allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            api_prefix: default_api_prefix(),
            cors_allowed_origins: Vec::new(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8000".to_string()
}
fn default_api_prefix() -> String {
    "/api/chatbot".to_string()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

/// Parse and validate configuration text.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;

    if config.db.max_connections == 0 {
        bail!("db.max_connections must be >= 1");
    }

    // Retrieval
    if !(0.0..=1.0).contains(&config.retrieval.semantic_weight) {
        bail!("retrieval.semantic_weight must be in [0.0, 1.0]");
    }
    if config.retrieval.top_k == 0 {
        bail!("retrieval.top_k must be >= 1");
    }
    if config.retrieval.dense_top_k == 0 || config.retrieval.sparse_top_k == 0 {
        bail!("retrieval.dense_top_k and retrieval.sparse_top_k must be >= 1");
    }

    // Pipeline
    let pipeline = &config.pipeline;
    if pipeline.max_relevance_label == 0 {
        bail!("pipeline.max_relevance_label must be >= 1");
    }
    if pipeline.relevance_threshold == 0 || pipeline.relevance_threshold > pipeline.max_relevance_label {
        bail!(
            "pipeline.relevance_threshold must be in [1, {}]",
            pipeline.max_relevance_label
        );
    }

    // Embedding
    match config.embedding.provider.as_str() {
        "disabled" | "openai" | "ollama" | "local" => {}
        other => bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, ollama, or local.",
            other
        ),
    }
    if config.embedding.is_enabled() && config.embedding.provider != "local" {
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.model.is_none() {
            bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
    }

    // LLM
    match config.llm.provider.as_str() {
        "disabled" => {}
        "openai" => {
            if config.llm.model.is_none() {
                bail!("llm.model must be specified when provider is 'openai'");
            }
        }
        other => bail!("Unknown llm provider: '{}'. Must be disabled or openai.", other),
    }

    if !config.server.api_prefix.is_empty() && !config.server.api_prefix.starts_with('/') {
        bail!("server.api_prefix must start with '/'");
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
[db]
path = "./data/chatbot.sqlite"

[pipeline]
max_reformulations = 2
"#;

    #[test]
    fn test_minimal_config_takes_defaults() {
        let config = parse_config(MINIMAL).unwrap();
        assert_eq!(config.pipeline.max_reformulations, 2);
        assert_eq!(config.db.max_connections, 5);
        assert_eq!(config.db.busy_timeout_ms, 5_000);
        assert_eq!(config.retrieval.semantic_weight, 0.5);
        assert_eq!(config.server.api_prefix, "/api/chatbot");
        assert!(!config.llm.is_enabled());
        assert!(!config.embedding.is_enabled());

        let settings = config
            .pipeline
            .to_settings(&config.llm, &config.retrieval);
        assert_eq!(settings.max_reformulations, 2);
        assert_eq!(settings.relevance_threshold, RelevanceLabel::RELEVANT);
        assert_eq!(settings.no_context_message, "No context available.");
    }

    #[test]
    fn test_max_reformulations_is_required() {
        let err = parse_config("[db]\npath = \"x.db\"\n\n[pipeline]\n").unwrap_err();
        assert!(format!("{:#}", err).contains("max_reformulations"), "{:#}", err);
    }

    #[test]
    fn test_rejects_out_of_range_values() {
        let weight = format!("{}\n[retrieval]\nsemantic_weight = 1.5\n", MINIMAL);
        assert!(parse_config(&weight).is_err());

        let pool = MINIMAL.replace("path = \"./data/chatbot.sqlite\"", "path = \"x.db\"\nmax_connections = 0");
        assert!(parse_config(&pool).is_err());

        let threshold = MINIMAL.replace("max_reformulations = 2", "max_reformulations = 2\nrelevance_threshold = 2");
        assert!(parse_config(&threshold).is_err());

        let scale = MINIMAL.replace(
            "max_reformulations = 2",
            "max_reformulations = 2\nrelevance_threshold = 2\nmax_relevance_label = 2",
        );
        assert!(parse_config(&scale).is_ok());
    }

    #[test]
    fn test_provider_validation() {
        let embedding = format!("{}\n[embedding]\nprovider = \"openai\"\n", MINIMAL);
        assert!(parse_config(&embedding).is_err());

        let llm = format!("{}\n[llm]\nprovider = \"openai\"\n", MINIMAL);
        assert!(parse_config(&llm).is_err());

        let unknown = format!("{}\n[llm]\nprovider = \"magic\"\n", MINIMAL);
        assert!(parse_config(&unknown).is_err());
    }
}
