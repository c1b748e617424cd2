//! Embedding providers implementing the core [`Embedder`] trait.
//!
//! - **[`DisabledEmbedder`]**: always errors; corpus tools then fall back to keyword-only search.
//! - **[`OpenAiEmbedder`]**: `POST /v1/embeddings` with retry and backoff.
//! - **[`OllamaEmbedder`]**: a local Ollama instance's `/api/embed` endpoint.
//! - **`LocalEmbedder`**: fastembed, in-process; no network calls after model download.
//!
//! # Provider Selection
//!
//! ```rust,no_run
//! # use jenkins_chatbot::config::EmbeddingConfig;
//! # use jenkins_chatbot::embedding::create_embedder;
//! let config = EmbeddingConfig::default(); // provider = "disabled"
//! let embedder = create_embedder(&config).unwrap();
//! assert_eq!(embedder.model_name(), "disabled");
//! ```

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

use jenkins_chatbot_core::embedding::Embedder;

use crate::config::EmbeddingConfig;
use crate::http::{build_client, post_json_with_retry};

// ============ Disabled ============

/// Embedder used when `embedding.provider = "disabled"`.
pub struct DisabledEmbedder;

#[async_trait]
impl Embedder for DisabledEmbedder {
    fn model_name(&self) -> &str {
        "disabled"
    }
    fn dims(&self) -> usize {
        0
    }
    async fn embed_batch(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        bail!("Embedding provider is disabled")
    }
}

// ============ OpenAI ============

/// OpenAI embeddings. Requires `OPENAI_API_KEY`.
pub struct OpenAiEmbedder {
    model: String,
    dims: usize,
    api_key: String,
    client: reqwest::Client,
    max_retries: u32,
}

impl OpenAiEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow!("embedding.model required for OpenAI provider"))?;
        let dims = config
            .dims
            .ok_or_else(|| anyhow!("embedding.dims required for OpenAI provider"))?;
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow!("OPENAI_API_KEY environment variable not set"))?;

        Ok(Self {
            model,
            dims,
            api_key,
            client: build_client(config.timeout_secs)?,
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let body = serde_json::json!({ "model": self.model, "input": texts });
        let json = post_json_with_retry(
            &self.client,
            "https://api.openai.com/v1/embeddings",
            Some(&self.api_key),
            &body,
            self.max_retries,
            "OpenAI",
        )
        .await?;
        parse_openai_response(&json)
    }
}

/// Extract `data[].embedding`, ordered by `data[].index` when present.
fn parse_openai_response(json: &Value) -> Result<Vec<Vec<f32>>> {
    let data = json
        .get("data")
        .and_then(Value::as_array)
        .ok_or_else(|| anyhow!("Invalid OpenAI response: missing data array"))?;

    let mut indexed = Vec::with_capacity(data.len());
    for (position, item) in data.iter().enumerate() {
        let embedding = item
            .get("embedding")
            .and_then(Value::as_array)
            .ok_or_else(|| anyhow!("Invalid OpenAI response: missing embedding"))?;
        let index = item
            .get("index")
            .and_then(Value::as_u64)
            .map_or(position, |i| i as usize);
        indexed.push((index, to_f32_vec(embedding)));
    }

    indexed.sort_by_key(|(index, _)| *index);
    Ok(indexed.into_iter().map(|(_, v)| v).collect())
}

// ============ Ollama ============

/// Ollama embeddings (default URL `http://localhost:11434`).
pub struct OllamaEmbedder {
    model: String,
    dims: usize,
    url: String,
    client: reqwest::Client,
    max_retries: u32,
}

impl OllamaEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow!("embedding.model required for Ollama provider"))?;
        let dims = config
            .dims
            .ok_or_else(|| anyhow!("embedding.dims required for Ollama provider"))?;
        let url = config
            .url
            .clone()
            .unwrap_or_else(|| "http://localhost:11434".to_string());

        Ok(Self {
            model,
            dims,
            url,
            client: build_client(config.timeout_secs)?,
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let body = serde_json::json!({ "model": self.model, "input": texts });
        let json = post_json_with_retry(
            &self.client,
            &format!("{}/api/embed", self.url.trim_end_matches('/')),
            None,
            &body,
            self.max_retries,
            "Ollama",
        )
        .await?;
        parse_ollama_response(&json)
    }
}

fn parse_ollama_response(json: &Value) -> Result<Vec<Vec<f32>>> {
    let embeddings = json
        .get("embeddings")
        .and_then(Value::as_array)
        .ok_or_else(|| anyhow!("Invalid Ollama response: missing embeddings array"))?;

    embeddings
        .iter()
        .map(|embedding| {
            embedding
                .as_array()
                .map(|values| to_f32_vec(values))
                .ok_or_else(|| anyhow!("Invalid Ollama response: embedding is not an array"))
        })
        .collect()
}

fn to_f32_vec(values: &[Value]) -> Vec<f32> {
    values
        .iter()
        .map(|v| v.as_f64().unwrap_or(0.0) as f32)
        .collect()
}

// ============ Local (fastembed) ============

#[cfg(feature = "local-embeddings-fastembed")]
mod local {
    use super::*;
    use std::sync::Mutex;

    /// In-process embeddings via fastembed. The model is downloaded and
    /// loaded on first use, then reused.
    pub struct LocalEmbedder {
        model_name: String,
        dims: usize,
        batch_size: usize,
        model: Arc<Mutex<Option<fastembed::TextEmbedding>>>,
    }

    impl LocalEmbedder {
        pub fn new(config: &EmbeddingConfig) -> Result<Self> {
            let (model_name, dims) = resolve_local_model(config);
            config_to_fastembed_model(&model_name)?;
            Ok(Self {
                model_name,
                dims,
                batch_size: config.batch_size,
                model: Arc::new(Mutex::new(None)),
            })
        }
    }

    #[async_trait]
    impl Embedder for LocalEmbedder {
        fn model_name(&self) -> &str {
            &self.model_name
        }
        fn dims(&self) -> usize {
            self.dims
        }
        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            let model_name = self.model_name.clone();
            let batch_size = self.batch_size;
            let slot = self.model.clone();
            let texts = texts.to_vec();

            tokio::task::spawn_blocking(move || {
                let mut guard = slot
                    .lock()
                    .map_err(|_| anyhow!("local embedding model lock poisoned"))?;
                if guard.is_none() {
                    let model = fastembed::TextEmbedding::try_new(
                        fastembed::InitOptions::new(config_to_fastembed_model(&model_name)?)
                            .with_show_download_progress(true),
                    )
                    .map_err(|e| anyhow!("Failed to initialize local embedding model: {}", e))?;
                    *guard = Some(model);
                }
                let model = guard
                    .as_mut()
                    .ok_or_else(|| anyhow!("local embedding model unavailable"))?;
                model
                    .embed(texts, Some(batch_size))
                    .map_err(|e| anyhow!("Local embedding failed: {}", e))
            })
            .await?
        }
    }

    fn config_to_fastembed_model(name: &str) -> Result<fastembed::EmbeddingModel> {
        match name {
            "all-minilm-l6-v2" => Ok(fastembed::EmbeddingModel::AllMiniLML6V2),
            "bge-small-en-v1.5" => Ok(fastembed::EmbeddingModel::BGESmallENV15),
            "bge-base-en-v1.5" => Ok(fastembed::EmbeddingModel::BGEBaseENV15),
            "nomic-embed-text-v1.5" => Ok(fastembed::EmbeddingModel::NomicEmbedTextV15),
            other => bail!(
                "Unknown local embedding model: '{}'. Supported models: \
                 all-minilm-l6-v2, bge-small-en-v1.5, bge-base-en-v1.5, nomic-embed-text-v1.5",
                other
            ),
        }
    }
}

#[cfg(feature = "local-embeddings-fastembed")]
pub use local::LocalEmbedder;

/// Model name and dimensionality for the local provider.
pub fn resolve_local_model(config: &EmbeddingConfig) -> (String, usize) {
    let model_name = config
        .model
        .clone()
        .unwrap_or_else(|| "all-minilm-l6-v2".to_string());

    let dims = config.dims.unwrap_or(match model_name.as_str() {
        "bge-base-en-v1.5" | "nomic-embed-text-v1.5" => 768,
        _ => 384,
    });

    (model_name, dims)
}

/// Create the configured embedder.
///
/// | Config Value | Embedder |
/// |-------------|----------|
/// | `"disabled"` | [`DisabledEmbedder`] |
/// | `"openai"` | [`OpenAiEmbedder`] |
/// | `"ollama"` | [`OllamaEmbedder`] |
/// | `"local"` | `LocalEmbedder` (feature `local-embeddings-fastembed`) |
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledEmbedder)),
        "openai" => Ok(Arc::new(OpenAiEmbedder::new(config)?)),
        "ollama" => Ok(Arc::new(OllamaEmbedder::new(config)?)),
        #[cfg(feature = "local-embeddings-fastembed")]
        "local" => Ok(Arc::new(LocalEmbedder::new(config)?)),
        #[cfg(not(feature = "local-embeddings-fastembed"))]
        "local" => bail!("Local embedding provider requires --features local-embeddings-fastembed"),
        other => bail!("Unknown embedding provider: {}", other),
    }
}
