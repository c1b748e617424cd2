//! Core data models shared by every stage of the pipeline.
//!
//! Chunks are produced once by the offline corpus preparation and are
//! read-only at serve time. Everything else here is ephemeral per query.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Provenance of a chunk: which corpus it came from and what it is called.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceMetadata {
    /// Data source name (e.g. `"jenkins_plugins_documentation"`).
    #[serde(default)]
    pub data_source: String,
    /// Document title. For plugin docs this is the plugin name.
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    /// Remaining fields (tags, scores, dates) kept verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Atomic retrievable unit of the corpus.
///
/// `text` may contain `[[CODE_BLOCK_<n>]]` / `[[CODE_SNIPPET_<n>]]`
/// placeholders where `n` indexes into `code_blocks`. An index past the end
/// of `code_blocks` is a known data-quality issue and is tolerated; see
/// [`crate::context::reconstruct_code_blocks`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    #[serde(default)]
    pub id: String,
    #[serde(default, rename = "chunk_text", alias = "text")]
    pub text: String,
    #[serde(default)]
    pub metadata: SourceMetadata,
    #[serde(default)]
    pub code_blocks: Vec<String>,
}

/// A chunk paired with the score one retrieval method gave it.
///
/// Dense results carry a distance (lower is better); sparse results carry a
/// relevance score (higher is better). Which family a list belongs to is
/// fixed by the method that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedChunk {
    pub chunk: Chunk,
    pub score: f64,
}

impl RankedChunk {
    pub fn new(chunk: Chunk, score: f64) -> Self {
        Self { chunk, score }
    }
}

/// Speaker of a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    /// Label used when rendering history into a prompt.
    pub fn prompt_label(self) -> &'static str {
        match self {
            Role::User => "User",
            Role::Assistant => "Jenkins Assistant",
        }
    }
}

/// One entry of a session's history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub text: String,
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            text: text.into(),
        }
    }
}

/// Ordinal relevance of a block of context to a query.
///
/// `0` is always "not relevant". The top of the scale and the threshold the
/// retry loop must reach are configuration, not constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct RelevanceLabel(pub u8);

impl RelevanceLabel {
    pub const NOT_RELEVANT: RelevanceLabel = RelevanceLabel(0);
    pub const RELEVANT: RelevanceLabel = RelevanceLabel(1);

    /// Whether this label reaches `threshold`.
    pub fn meets(self, threshold: RelevanceLabel) -> bool {
        self >= threshold
    }
}

impl fmt::Display for RelevanceLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Whether a user query carries one intent or several.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKind {
    Simple,
    Multi,
}

impl QueryKind {
    pub fn as_str(self) -> &'static str {
        match self {
            QueryKind::Simple => "SIMPLE",
            QueryKind::Multi => "MULTI",
        }
    }
}
