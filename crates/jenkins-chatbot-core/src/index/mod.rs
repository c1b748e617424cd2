//! Search index abstraction over the partitioned corpus.
//!
//! The [`SearchIndex`] trait is the contract the retrieval tools need from
//! the dense and sparse indices, enabling pluggable backends (SQLite in the
//! app crate, [`memory::InMemoryIndex`] here).
//!
//! Implementations must be `Send + Sync` and safe to query concurrently;
//! from the pipeline's point of view indices are read-only.

pub mod memory;

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::models::RankedChunk;

/// A corpus partition. Each retrieval tool searches exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Partition {
    PluginDocs,
    JenkinsDocs,
    StackOverflow,
    CommunityThreads,
}

impl Partition {
    pub const ALL: [Partition; 4] = [
        Partition::PluginDocs,
        Partition::JenkinsDocs,
        Partition::StackOverflow,
        Partition::CommunityThreads,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Partition::PluginDocs => "plugin_docs",
            Partition::JenkinsDocs => "jenkins_docs",
            Partition::StackOverflow => "stack_overflow",
            Partition::CommunityThreads => "community_threads",
        }
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Partition {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "plugin_docs" | "plugins" => Ok(Partition::PluginDocs),
            "jenkins_docs" | "docs" => Ok(Partition::JenkinsDocs),
            "stack_overflow" | "stackoverflow" => Ok(Partition::StackOverflow),
            "community_threads" | "discourse" => Ok(Partition::CommunityThreads),
            other => bail!(
                "Unknown partition: '{}'. Use plugin_docs, jenkins_docs, stack_overflow, or community_threads.",
                other
            ),
        }
    }
}

/// Dense and sparse search over one partition at a time.
///
/// | Method | Score | Order |
/// |--------|-------|-------|
/// | [`vector_search`](SearchIndex::vector_search) | distance | ascending (best first) |
/// | [`keyword_search`](SearchIndex::keyword_search) | relevance | descending (best first) |
///
/// An empty partition returns an empty list, never an error.
#[async_trait]
pub trait SearchIndex: Send + Sync {
    /// Nearest neighbours of `query_vec`, at most `limit`.
    async fn vector_search(
        &self,
        partition: Partition,
        query_vec: &[f32],
        limit: usize,
    ) -> Result<Vec<RankedChunk>>;

    /// Keyword matches for `query`, at most `limit`. Callers apply any
    /// minimum-score cutoff themselves.
    async fn keyword_search(
        &self,
        partition: Partition,
        query: &str,
        limit: usize,
    ) -> Result<Vec<RankedChunk>>;
}

/// Lower-cased alphanumeric terms of `text`, used by keyword indices.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}
