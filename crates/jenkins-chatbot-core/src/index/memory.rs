//! In-memory [`SearchIndex`] implementation for tests and embedded use.
//!
//! Chunks live in per-partition `Vec`s behind a `std::sync::RwLock`.
//! Vector search is brute-force L2 distance; keyword search is Okapi BM25
//! over [`tokenize`]d chunk text.

use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::embedding::l2_distance;
use crate::models::{Chunk, RankedChunk};

use super::{tokenize, Partition, SearchIndex};

const BM25_K1: f64 = 1.5;
const BM25_B: f64 = 0.75;

struct StoredChunk {
    chunk: Chunk,
    vector: Option<Vec<f32>>,
    terms: Vec<String>,
}

/// In-memory partitioned index.
pub struct InMemoryIndex {
    partitions: RwLock<HashMap<Partition, Vec<StoredChunk>>>,
}

impl InMemoryIndex {
    pub fn new() -> Self {
        Self {
            partitions: RwLock::new(HashMap::new()),
        }
    }

    /// Add a chunk (and optionally its embedding) to a partition.
    ///
    /// A chunk with the same id in the same partition is replaced.
    pub fn insert(&self, partition: Partition, chunk: Chunk, vector: Option<Vec<f32>>) -> Result<()> {
        let terms = tokenize(&chunk.text);
        let mut partitions = self
            .partitions
            .write()
            .map_err(|_| anyhow!("in-memory index lock poisoned"))?;
        let stored = partitions.entry(partition).or_default();
        stored.retain(|s| s.chunk.id != chunk.id);
        stored.push(StoredChunk {
            chunk,
            vector,
            terms,
        });
        Ok(())
    }

    /// Number of chunks stored in `partition`.
    pub fn len(&self, partition: Partition) -> usize {
        self.partitions
            .read()
            .map(|p| p.get(&partition).map_or(0, Vec::len))
            .unwrap_or(0)
    }

    pub fn is_empty(&self, partition: Partition) -> bool {
        self.len(partition) == 0
    }
}

impl Default for InMemoryIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SearchIndex for InMemoryIndex {
    async fn vector_search(
        &self,
        partition: Partition,
        query_vec: &[f32],
        limit: usize,
    ) -> Result<Vec<RankedChunk>> {
        let partitions = self
            .partitions
            .read()
            .map_err(|_| anyhow!("in-memory index lock poisoned"))?;
        let Some(stored) = partitions.get(&partition) else {
            return Ok(Vec::new());
        };

        let mut results: Vec<RankedChunk> = stored
            .iter()
            .filter_map(|s| {
                let vector = s.vector.as_deref()?;
                let distance = l2_distance(query_vec, vector)?;
                Some(RankedChunk::new(s.chunk.clone(), distance))
            })
            .collect();

        results.sort_by(|a, b| a.score.total_cmp(&b.score));
        results.truncate(limit);
        Ok(results)
    }

    async fn keyword_search(
        &self,
        partition: Partition,
        query: &str,
        limit: usize,
    ) -> Result<Vec<RankedChunk>> {
        let query_terms = tokenize(query);
        if query_terms.is_empty() {
            return Ok(Vec::new());
        }

        let partitions = self
            .partitions
            .read()
            .map_err(|_| anyhow!("in-memory index lock poisoned"))?;
        let Some(stored) = partitions.get(&partition) else {
            return Ok(Vec::new());
        };
        if stored.is_empty() {
            return Ok(Vec::new());
        }

        let n = stored.len() as f64;
        let avg_len = stored.iter().map(|s| s.terms.len() as f64).sum::<f64>() / n;

        let mut doc_freq: HashMap<&str, usize> = HashMap::new();
        for term in &query_terms {
            if doc_freq.contains_key(term.as_str()) {
                continue;
            }
            let df = stored
                .iter()
                .filter(|s| s.terms.iter().any(|t| t == term))
                .count();
            doc_freq.insert(term.as_str(), df);
        }

        let mut results: Vec<RankedChunk> = stored
            .iter()
            .filter_map(|s| {
                let len = s.terms.len() as f64;
                let score: f64 = doc_freq
                    .iter()
                    .filter(|(_, df)| **df > 0)
                    .map(|(term, df)| {
                        let tf = s.terms.iter().filter(|t| t == term).count() as f64;
                        if tf == 0.0 {
                            return 0.0;
                        }
                        let df = *df as f64;
                        let idf = ((n - df + 0.5) / (df + 0.5) + 1.0).ln();
                        let norm = if avg_len > 0.0 { len / avg_len } else { 1.0 };
                        idf * tf * (BM25_K1 + 1.0) / (tf + BM25_K1 * (1.0 - BM25_B + BM25_B * norm))
                    })
                    .sum();
                (score > 0.0).then(|| RankedChunk::new(s.chunk.clone(), score))
            })
            .collect();

        results.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.chunk.id.cmp(&b.chunk.id))
        });
        results.truncate(limit);
        Ok(results)
    }
}
