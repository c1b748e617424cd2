//! Retrieval tools and the registry the planner chooses from.
//!
//! A [`Tool`] is a named capability with a declared parameter signature.
//! The [`ToolRegistry`] is built once and injected into the orchestrator;
//! nothing is looked up from global state.
//!
//! # Built-in tools
//!
//! | Name | Partition | Search | Signature |
//! |------|-----------|--------|-----------|
//! | `search_jenkins_docs` | [`Partition::JenkinsDocs`] | hybrid | `query, keywords?` |
//! | `search_plugin_docs` | [`Partition::PluginDocs`] | hybrid + plugin filter | `query, plugin_name, keywords?` |
//! | `search_stackoverflow_threads` | [`Partition::StackOverflow`] | dense | `query` |
//! | `search_community_threads` | [`Partition::CommunityThreads`] | hybrid | `query, keywords?` |

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use crate::context::render_context;
use crate::embedding::Embedder;
use crate::fusion::{fuse, DEFAULT_SEMANTIC_WEIGHT};
use crate::index::{Partition, SearchIndex};
use crate::models::RankedChunk;

pub const SEARCH_JENKINS_DOCS: &str = "search_jenkins_docs";
pub const SEARCH_PLUGIN_DOCS: &str = "search_plugin_docs";
pub const SEARCH_STACKOVERFLOW_THREADS: &str = "search_stackoverflow_threads";
pub const SEARCH_COMMUNITY_THREADS: &str = "search_community_threads";

// ═══════════════════════════════════════════════════════════════════════
// Parameters
// ═══════════════════════════════════════════════════════════════════════

/// How a declared parameter may appear in a model-produced call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    /// Must be present and a string.
    Text,
    /// Must be present; a string or `null`.
    NullableText,
    /// May be absent; if present, a string or `null`.
    OptionalText,
}

/// One declared parameter of a tool signature.
#[derive(Debug, Clone, Copy)]
pub struct ParamSpec {
    pub name: &'static str,
    pub kind: ParamKind,
}

const QUERY_ONLY_PARAMS: &[ParamSpec] = &[ParamSpec {
    name: "query",
    kind: ParamKind::Text,
}];

const SEARCH_PARAMS: &[ParamSpec] = &[
    ParamSpec {
        name: "query",
        kind: ParamKind::Text,
    },
    ParamSpec {
        name: "keywords",
        kind: ParamKind::OptionalText,
    },
];

const PLUGIN_SEARCH_PARAMS: &[ParamSpec] = &[
    ParamSpec {
        name: "query",
        kind: ParamKind::Text,
    },
    ParamSpec {
        name: "plugin_name",
        kind: ParamKind::NullableText,
    },
    ParamSpec {
        name: "keywords",
        kind: ParamKind::OptionalText,
    },
];

/// Parameter shape a tool accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolSignature {
    /// `{query, keywords?}`
    Search,
    /// `{query}`, for dense-only tools with no use for keywords.
    QueryOnly,
    /// `{query, plugin_name, keywords?}`
    PluginSearch,
}

/// Why a raw parameter mapping did not fit a signature.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParamError {
    #[error("missing parameter '{0}'")]
    Missing(&'static str),
    #[error("parameter '{name}' must be {expected}")]
    WrongType {
        name: &'static str,
        expected: &'static str,
    },
}

/// Validated, typed parameters of one tool call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolParams {
    Search {
        query: String,
        keywords: Option<String>,
    },
    PluginSearch {
        query: String,
        keywords: Option<String>,
        plugin_name: Option<String>,
    },
}

impl ToolParams {
    pub fn query(&self) -> &str {
        match self {
            ToolParams::Search { query, .. } | ToolParams::PluginSearch { query, .. } => query,
        }
    }

    pub fn keywords(&self) -> Option<&str> {
        match self {
            ToolParams::Search { keywords, .. } | ToolParams::PluginSearch { keywords, .. } => {
                keywords.as_deref()
            }
        }
    }

    pub fn plugin_name(&self) -> Option<&str> {
        match self {
            ToolParams::Search { .. } => None,
            ToolParams::PluginSearch { plugin_name, .. } => plugin_name.as_deref(),
        }
    }

    /// JSON form, as the planner prompt describes it.
    pub fn to_json(&self) -> Value {
        let mut map = Map::new();
        map.insert("query".into(), json!(self.query()));
        if let ToolParams::PluginSearch { plugin_name, .. } = self {
            map.insert("plugin_name".into(), json!(plugin_name));
        }
        if let Some(k) = self.keywords() {
            map.insert("keywords".into(), json!(k));
        }
        Value::Object(map)
    }
}

impl ToolSignature {
    pub fn params(self) -> &'static [ParamSpec] {
        match self {
            ToolSignature::Search => SEARCH_PARAMS,
            ToolSignature::QueryOnly => QUERY_ONLY_PARAMS,
            ToolSignature::PluginSearch => PLUGIN_SEARCH_PARAMS,
        }
    }

    /// Coerce a raw JSON mapping into typed parameters.
    ///
    /// Every declared parameter must be present with its declared type,
    /// except [`ParamKind::OptionalText`] ones which may be absent.
    /// Undeclared keys are ignored.
    pub fn parse(self, raw: &Map<String, Value>) -> Result<ToolParams, ParamError> {
        let mut query = String::new();
        let mut keywords = None;
        let mut plugin_name = None;

        for spec in self.params() {
            let value = match (raw.get(spec.name), spec.kind) {
                (None, ParamKind::OptionalText) => None,
                (None, _) => return Err(ParamError::Missing(spec.name)),
                (Some(Value::String(s)), _) => Some(s.clone()),
                (Some(Value::Null), ParamKind::NullableText | ParamKind::OptionalText) => None,
                (Some(_), ParamKind::Text) => {
                    return Err(ParamError::WrongType {
                        name: spec.name,
                        expected: "a string",
                    })
                }
                (Some(_), _) => {
                    return Err(ParamError::WrongType {
                        name: spec.name,
                        expected: "a string or null",
                    })
                }
            };
            match spec.name {
                "query" => query = value.unwrap_or_default(),
                "keywords" => keywords = value,
                "plugin_name" => plugin_name = value,
                _ => {}
            }
        }

        Ok(match self {
            ToolSignature::Search | ToolSignature::QueryOnly => ToolParams::Search { query, keywords },
            ToolSignature::PluginSearch => ToolParams::PluginSearch {
                query,
                keywords,
                plugin_name,
            },
        })
    }

    /// Parameters used by the default plan: the raw query, nothing else.
    pub fn defaults(self, query: &str) -> ToolParams {
        match self {
            ToolSignature::Search | ToolSignature::QueryOnly => ToolParams::Search {
                query: query.to_string(),
                keywords: None,
            },
            ToolSignature::PluginSearch => ToolParams::PluginSearch {
                query: query.to_string(),
                keywords: None,
                plugin_name: None,
            },
        }
    }

    /// Argument list as shown in the planner's tool catalog.
    pub fn describe(self) -> String {
        self.params()
            .iter()
            .map(|p| match p.kind {
                ParamKind::OptionalText => format!("{}?", p.name),
                _ => p.name.to_string(),
            })
            .collect::<Vec<_>>()
            .join(", ")
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Tool trait and registry
// ═══════════════════════════════════════════════════════════════════════

/// A retrieval capability the planner can call.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Registry key, e.g. `"search_plugin_docs"`.
    fn name(&self) -> &str;

    /// When the planner should pick this tool.
    fn description(&self) -> &str;

    fn signature(&self) -> ToolSignature;

    /// Run the tool and return prompt-ready text.
    ///
    /// Errors are backend failures; the orchestrator degrades them into the
    /// "no context" text for this tool.
    async fn execute(&self, params: &ToolParams) -> Result<String>;
}

/// Ordered set of tools. Order is registration order and defines the
/// default plan and catalog order.
pub struct ToolRegistry {
    tools: Vec<Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self { tools: Vec::new() }
    }

    /// Registry with the four corpus search tools.
    pub fn with_corpus_tools(backend: RetrievalBackend) -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(CorpusSearchTool::jenkins_docs(backend.clone())));
        registry.register(Box::new(CorpusSearchTool::plugin_docs(backend.clone())));
        registry.register(Box::new(CorpusSearchTool::stackoverflow_threads(backend.clone())));
        registry.register(Box::new(CorpusSearchTool::community_threads(backend)));
        registry
    }

    /// Register a tool. A tool with the same name is replaced in place.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        match self.tools.iter().position(|t| t.name() == tool.name()) {
            Some(i) => self.tools[i] = tool,
            None => self.tools.push(tool),
        }
    }

    pub fn tools(&self) -> &[Box<dyn Tool>] {
        &self.tools
    }

    pub fn find(&self, name: &str) -> Option<&dyn Tool> {
        self.tools
            .iter()
            .find(|t| t.name() == name)
            .map(|t| t.as_ref())
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Numbered catalog of tools for the planner prompt.
    pub fn catalog(&self) -> String {
        self.tools
            .iter()
            .enumerate()
            .map(|(i, t)| {
                format!(
                    "{}. {}({}) - {}",
                    i + 1,
                    t.name(),
                    t.signature().describe(),
                    t.description()
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Tag a tool's output so the judge can see where each block came from.
pub fn format_tool_result(tool: &str, text: &str) -> String {
    format!("[Result of the search tool {}]:\n{}", tool, text)
}

// ═══════════════════════════════════════════════════════════════════════
// Corpus search tools
// ═══════════════════════════════════════════════════════════════════════

/// Retrieval tuning shared by the corpus tools.
#[derive(Debug, Clone)]
pub struct RetrievalSettings {
    /// Dense weight in fusion: `(1-w)*sparse + w*dense`.
    pub semantic_weight: f64,
    /// Dense candidates fetched per search.
    pub dense_top_k: usize,
    /// Sparse candidates fetched per search.
    pub sparse_top_k: usize,
    /// Chunks kept after fusion.
    pub top_k: usize,
    /// Sparse results scoring below this are dropped.
    pub keyword_threshold: f64,
    /// Returned when no chunk survives.
    pub empty_context_message: String,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            semantic_weight: DEFAULT_SEMANTIC_WEIGHT,
            dense_top_k: 20,
            sparse_top_k: 20,
            top_k: 5,
            keyword_threshold: 0.0,
            empty_context_message: "No context available.".to_string(),
        }
    }
}

/// Known plugin names, compared after [`normalize_plugin_name`].
#[derive(Debug, Clone, Default)]
pub struct PluginCatalog {
    names: HashSet<String>,
}

impl PluginCatalog {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            names: names
                .into_iter()
                .map(|n| normalize_plugin_name(n.as_ref()))
                .filter(|n| !n.is_empty())
                .collect(),
        }
    }

    /// Normalized form of `name` if it is a known plugin.
    pub fn resolve(&self, name: &str) -> Option<String> {
        let normalized = normalize_plugin_name(name);
        self.names.contains(&normalized).then_some(normalized)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Lower-case and strip whitespace and hyphens: `"Blue Ocean"` → `"blueocean"`.
pub fn normalize_plugin_name(name: &str) -> String {
    name.chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .flat_map(char::to_lowercase)
        .collect()
}

/// Everything a corpus tool needs to search. Cheap to clone.
#[derive(Clone)]
pub struct RetrievalBackend {
    pub index: Arc<dyn SearchIndex>,
    pub embedder: Arc<dyn Embedder>,
    pub settings: Arc<RetrievalSettings>,
    pub plugins: Arc<PluginCatalog>,
}

/// Which indices a corpus tool consults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchMode {
    Hybrid,
    DenseOnly,
}

/// Hybrid (or dense-only) search over one partition.
pub struct CorpusSearchTool {
    name: &'static str,
    description: &'static str,
    partition: Partition,
    mode: SearchMode,
    signature: ToolSignature,
    backend: RetrievalBackend,
}

impl CorpusSearchTool {
    pub fn new(
        name: &'static str,
        description: &'static str,
        partition: Partition,
        mode: SearchMode,
        signature: ToolSignature,
        backend: RetrievalBackend,
    ) -> Self {
        Self {
            name,
            description,
            partition,
            mode,
            signature,
            backend,
        }
    }

    pub fn jenkins_docs(backend: RetrievalBackend) -> Self {
        Self::new(
            SEARCH_JENKINS_DOCS,
            "Retrieves information from the official Jenkins documentation. Use this for core Jenkins concepts, features, configuration, and usage.",
            Partition::JenkinsDocs,
            SearchMode::Hybrid,
            ToolSignature::Search,
            backend,
        )
    }

    pub fn plugin_docs(backend: RetrievalBackend) -> Self {
        Self::new(
            SEARCH_PLUGIN_DOCS,
            "Retrieves information from the documentation of Jenkins plugins. Use this when the query involves a known or suspected plugin; pass null for plugin_name if it is unclear.",
            Partition::PluginDocs,
            SearchMode::Hybrid,
            ToolSignature::PluginSearch,
            backend,
        )
    }

    pub fn stackoverflow_threads(backend: RetrievalBackend) -> Self {
        Self::new(
            SEARCH_STACKOVERFLOW_THREADS,
            "Retrieves StackOverflow discussions about Jenkins. Ideal for troubleshooting specific errors, unexpected behavior, or edge cases.",
            Partition::StackOverflow,
            SearchMode::DenseOnly,
            ToolSignature::QueryOnly,
            backend,
        )
    }

    pub fn community_threads(backend: RetrievalBackend) -> Self {
        Self::new(
            SEARCH_COMMUNITY_THREADS,
            "Retrieves Jenkins community forum posts. Ideal for troubleshooting, user workarounds, or undocumented use cases.",
            Partition::CommunityThreads,
            SearchMode::Hybrid,
            ToolSignature::Search,
            backend,
        )
    }

    pub fn partition(&self) -> Partition {
        self.partition
    }

    async fn dense_candidates(&self, query: &str) -> Result<Vec<RankedChunk>> {
        let settings = &self.backend.settings;
        let query_vec = match self.backend.embedder.embed_query(query).await {
            Ok(v) => v,
            Err(e) => {
                warn!(tool = self.name, error = %e, "query embedding failed, skipping dense search");
                return Ok(Vec::new());
            }
        };
        self.backend
            .index
            .vector_search(self.partition, &query_vec, settings.dense_top_k)
            .await
    }

    async fn sparse_candidates(&self, keywords: &str) -> Result<Vec<RankedChunk>> {
        let settings = &self.backend.settings;
        let mut results = self
            .backend
            .index
            .keyword_search(self.partition, keywords, settings.sparse_top_k)
            .await?;
        results.retain(|r| r.score >= settings.keyword_threshold);
        Ok(results)
    }
}

#[async_trait]
impl Tool for CorpusSearchTool {
    fn name(&self) -> &str {
        self.name
    }

    fn description(&self) -> &str {
        self.description
    }

    fn signature(&self) -> ToolSignature {
        self.signature
    }

    async fn execute(&self, params: &ToolParams) -> Result<String> {
        let settings = &self.backend.settings;
        let query = params.query();
        if query.trim().is_empty() {
            warn!(tool = self.name, "empty query received");
            return Ok(settings.empty_context_message.clone());
        }

        let mut dense = self.dense_candidates(query).await?;
        let mut sparse = match self.mode {
            SearchMode::Hybrid => {
                self.sparse_candidates(params.keywords().unwrap_or(query))
                    .await?
            }
            SearchMode::DenseOnly => Vec::new(),
        };

        if let Some(requested) = params.plugin_name() {
            match self.backend.plugins.resolve(requested) {
                Some(plugin) => {
                    let matches = |r: &RankedChunk| normalize_plugin_name(&r.chunk.metadata.title) == plugin;
                    dense.retain(matches);
                    sparse.retain(matches);
                }
                None => debug!(
                    tool = self.name,
                    plugin = requested,
                    "unknown plugin name, searching all plugins"
                ),
            }
        }

        let chunks = fuse(&dense, &sparse, settings.semantic_weight, settings.top_k);
        debug!(
            tool = self.name,
            partition = %self.partition,
            dense = dense.len(),
            sparse = sparse.len(),
            kept = chunks.len(),
            "corpus search complete"
        );

        Ok(render_context(&chunks, &settings.empty_context_message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::memory::InMemoryIndex;
    use crate::models::{Chunk, SourceMetadata};

    struct NoEmbedder;

    #[async_trait]
    impl Embedder for NoEmbedder {
        fn model_name(&self) -> &str {
            "none"
        }
        fn dims(&self) -> usize {
            0
        }
        async fn embed_batch(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
            anyhow::bail!("embeddings disabled")
        }
    }

    fn plugin_chunk(id: &str, title: &str, text: &str) -> Chunk {
        Chunk {
            id: id.to_string(),
            text: text.to_string(),
            metadata: SourceMetadata {
                data_source: "jenkins_plugins_documentation".to_string(),
                title: title.to_string(),
                ..Default::default()
            },
            code_blocks: vec!["git clone repo".to_string()],
        }
    }

    fn backend(index: InMemoryIndex) -> RetrievalBackend {
        RetrievalBackend {
            index: Arc::new(index),
            embedder: Arc::new(NoEmbedder),
            settings: Arc::new(RetrievalSettings::default()),
            plugins: Arc::new(PluginCatalog::new(["Git", "Blue Ocean"])),
        }
    }

    fn params(raw: Value) -> Map<String, Value> {
        raw.as_object().unwrap().clone()
    }

    #[test]
    fn test_parse_search_params() {
        let p = ToolSignature::Search
            .parse(&params(json!({"query": "install jenkins"})))
            .unwrap();
        assert_eq!(
            p,
            ToolParams::Search {
                query: "install jenkins".into(),
                keywords: None
            }
        );
    }

    #[test]
    fn test_parse_plugin_params_require_plugin_name_key() {
        let missing = ToolSignature::PluginSearch.parse(&params(json!({"query": "q"})));
        assert_eq!(missing, Err(ParamError::Missing("plugin_name")));

        let null = ToolSignature::PluginSearch
            .parse(&params(json!({"query": "q", "plugin_name": null})))
            .unwrap();
        assert_eq!(null.plugin_name(), None);

        let named = ToolSignature::PluginSearch
            .parse(&params(json!({"query": "q", "plugin_name": "git", "keywords": "clone"})))
            .unwrap();
        assert_eq!(named.plugin_name(), Some("git"));
        assert_eq!(named.keywords(), Some("clone"));
    }

    #[test]
    fn test_parse_rejects_wrong_types() {
        assert!(matches!(
            ToolSignature::Search.parse(&params(json!({"query": 3}))),
            Err(ParamError::WrongType { name: "query", .. })
        ));
        assert!(matches!(
            ToolSignature::Search.parse(&params(json!({"query": null}))),
            Err(ParamError::WrongType { name: "query", .. })
        ));
        assert!(matches!(
            ToolSignature::PluginSearch.parse(&params(json!({"query": "q", "plugin_name": ["git"]}))),
            Err(ParamError::WrongType { name: "plugin_name", .. })
        ));
    }

    #[test]
    fn test_normalize_plugin_name() {
        assert_eq!(normalize_plugin_name("Blue Ocean"), "blueocean");
        assert_eq!(normalize_plugin_name("blue-ocean"), "blueocean");
        assert_eq!(normalize_plugin_name("  GIT "), "git");
    }

    #[test]
    fn test_catalog_lists_tools_in_order() {
        let registry = ToolRegistry::with_corpus_tools(backend(InMemoryIndex::new()));
        let catalog = registry.catalog();
        let lines: Vec<&str> = catalog.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with("1. search_jenkins_docs(query, keywords?)"));
        assert!(lines[1].starts_with("2. search_plugin_docs(query, plugin_name, keywords?)"));
        assert!(lines[2].starts_with("3. search_stackoverflow_threads(query)"));
        assert!(lines[3].starts_with("4. search_community_threads(query, keywords?)"));
    }

    #[test]
    fn test_query_only_drops_keywords() {
        let p = ToolSignature::QueryOnly
            .parse(&params(json!({"query": "slack plugin fails", "keywords": "slack"})))
            .unwrap();
        assert_eq!(p.keywords(), None);
        assert_eq!(p.to_json(), json!({"query": "slack plugin fails"}));
        assert_eq!(
            ToolSignature::QueryOnly.parse(&params(json!({}))),
            Err(ParamError::Missing("query"))
        );
    }

    #[tokio::test]
    async fn test_plugin_filter_keeps_matching_titles() {
        let index = InMemoryIndex::new();
        index
            .insert(
                Partition::PluginDocs,
                plugin_chunk("g1", "git", "Clone with [[CODE_BLOCK_0]] using git"),
                None,
            )
            .unwrap();
        index
            .insert(
                Partition::PluginDocs,
                plugin_chunk("b1", "blue-ocean", "Blue Ocean also talks to git"),
                None,
            )
            .unwrap();

        let tool = CorpusSearchTool::plugin_docs(backend(index));
        let out = tool
            .execute(&ToolParams::PluginSearch {
                query: "git".into(),
                keywords: None,
                plugin_name: Some("GIT".into()),
            })
            .await
            .unwrap();
        assert_eq!(out, "Clone with git clone repo using git");
    }

    #[tokio::test]
    async fn test_unknown_plugin_does_not_filter() {
        let index = InMemoryIndex::new();
        index
            .insert(Partition::PluginDocs, plugin_chunk("g1", "git", "git basics"), None)
            .unwrap();
        let tool = CorpusSearchTool::plugin_docs(backend(index));
        let out = tool
            .execute(&ToolParams::PluginSearch {
                query: "git".into(),
                keywords: None,
                plugin_name: Some("not-a-plugin".into()),
            })
            .await
            .unwrap();
        assert_eq!(out, "git basics");
    }

    #[tokio::test]
    async fn test_no_results_returns_empty_message() {
        let tool = CorpusSearchTool::jenkins_docs(backend(InMemoryIndex::new()));
        let out = tool
            .execute(&ToolSignature::Search.defaults("anything"))
            .await
            .unwrap();
        assert_eq!(out, "No context available.");
    }
}
