//! Hybrid score fusion of dense (semantic) and sparse (keyword) rankings.
//!
//! The two result families use opposite conventions: dense scores are
//! distances (lower is better), sparse scores are relevances (higher is
//! better). Fusion brings both onto a common `[0, 1]` "higher is better"
//! scale and blends them.
//!
//! # Algorithm
//!
//! 1. Build an id → score map per side (first occurrence wins).
//! 2. Take the union of ids, dense order first, then sparse-only ids.
//! 3. Fill gaps with the worst observed score of that side: the maximum
//!    distance for dense, the minimum relevance for sparse. An empty side
//!    uses [`DEFAULT_DENSE_SCORE`] / [`DEFAULT_SPARSE_SCORE`].
//! 4. Min-max normalize sparse scores; invert dense distances
//!    (`max - d`) and min-max normalize those.
//! 5. `fused = -((1 - w) × sparse + w × dense)`, with `w` clamped to `[0, 1]`.
//!    The negation makes a min-heap pop the best item first.
//! 6. Pop `top_k` entries and resolve each id back to its [`Chunk`].

use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashMap, HashSet};

use tracing::warn;

use crate::models::{Chunk, RankedChunk};

/// Substitute distance when the dense side returned nothing.
///
/// An out-of-range sentinel larger than any plausible distance between
/// normalized embeddings. Empirically chosen; tune against real score
/// distributions before relying on it.
pub const DEFAULT_DENSE_SCORE: f64 = 1.5;

/// Substitute relevance when the sparse side returned nothing.
pub const DEFAULT_SPARSE_SCORE: f64 = 0.0;

/// Default weight of the dense side in the blend.
pub const DEFAULT_SEMANTIC_WEIGHT: f64 = 0.5;

/// One fused entry. `score` is already negated: smaller is better.
#[derive(Debug, Clone, PartialEq)]
pub struct FusedEntry {
    pub score: f64,
    pub id: String,
}

impl Eq for FusedEntry {}

impl PartialOrd for FusedEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FusedEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.score
            .total_cmp(&other.score)
            .then_with(|| self.id.cmp(&other.id))
    }
}

/// Blend two ranked id lists into fused entries.
///
/// Ids and scores are paired positionally; extra elements on the longer
/// slice of a pair are ignored. The result is a heap-ready list in union
/// order, not sorted; use [`pop_top_k`] to extract the best entries.
pub fn combine_scores(
    dense_ids: &[String],
    dense_scores: &[f64],
    sparse_ids: &[String],
    sparse_scores: &[f64],
    semantic_weight: f64,
) -> Vec<FusedEntry> {
    let w = clamp_weight(semantic_weight);

    let mut dense_map: HashMap<&str, f64> = HashMap::new();
    for (id, score) in dense_ids.iter().zip(dense_scores) {
        dense_map.entry(id.as_str()).or_insert(*score);
    }
    let mut sparse_map: HashMap<&str, f64> = HashMap::new();
    for (id, score) in sparse_ids.iter().zip(sparse_scores) {
        sparse_map.entry(id.as_str()).or_insert(*score);
    }

    let mut seen: HashSet<&str> = HashSet::new();
    let union: Vec<&str> = dense_ids
        .iter()
        .chain(sparse_ids.iter())
        .map(String::as_str)
        .filter(|id| dense_map.contains_key(id) || sparse_map.contains_key(id))
        .filter(|id| seen.insert(*id))
        .collect();

    if union.is_empty() {
        return Vec::new();
    }

    let default_dense = dense_map
        .values()
        .copied()
        .reduce(f64::max)
        .unwrap_or(DEFAULT_DENSE_SCORE);
    let default_sparse = sparse_map
        .values()
        .copied()
        .reduce(f64::min)
        .unwrap_or(DEFAULT_SPARSE_SCORE);

    let dense: Vec<f64> = union
        .iter()
        .map(|id| dense_map.get(id).copied().unwrap_or(default_dense))
        .collect();
    let sparse: Vec<f64> = union
        .iter()
        .map(|id| sparse_map.get(id).copied().unwrap_or(default_sparse))
        .collect();

    let dense_max = dense.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let inverted: Vec<f64> = dense.iter().map(|d| dense_max - d).collect();

    let sparse_norm = min_max_normalize(&sparse);
    let dense_norm = min_max_normalize(&inverted);

    union
        .iter()
        .zip(sparse_norm.iter().zip(dense_norm.iter()))
        .map(|(id, (s, d))| FusedEntry {
            score: -((1.0 - w) * s + w * d),
            id: (*id).to_string(),
        })
        .collect()
}

/// Pop the `k` best entries from a min-heap built over `entries`.
///
/// Ties on score are broken by id (ascending) so the order is deterministic.
pub fn pop_top_k(entries: Vec<FusedEntry>, k: usize) -> Vec<FusedEntry> {
    let mut heap: BinaryHeap<Reverse<FusedEntry>> = entries.into_iter().map(Reverse).collect();
    let mut out = Vec::with_capacity(k.min(heap.len()));
    while out.len() < k {
        match heap.pop() {
            Some(Reverse(entry)) => out.push(entry),
            None => break,
        }
    }
    out
}

/// Fuse dense and sparse result lists into the top `top_k` chunks.
///
/// Both lists empty yields an empty ranking. Ids that cannot be resolved
/// back to a chunk are skipped with a warning.
pub fn fuse(
    dense: &[RankedChunk],
    sparse: &[RankedChunk],
    semantic_weight: f64,
    top_k: usize,
) -> Vec<Chunk> {
    let (dense_ids, dense_scores) = split_ranked(dense);
    let (sparse_ids, sparse_scores) = split_ranked(sparse);

    let entries = combine_scores(
        &dense_ids,
        &dense_scores,
        &sparse_ids,
        &sparse_scores,
        semantic_weight,
    );

    let mut lookup: HashMap<&str, &Chunk> = HashMap::new();
    for ranked in dense.iter().chain(sparse.iter()) {
        lookup.entry(ranked.chunk.id.as_str()).or_insert(&ranked.chunk);
    }

    pop_top_k(entries, top_k)
        .into_iter()
        .filter_map(|entry| match lookup.get(entry.id.as_str()) {
            Some(chunk) => Some((*chunk).clone()),
            None => {
                warn!(chunk_id = %entry.id, "fused id has no matching chunk, skipping");
                None
            }
        })
        .collect()
}

/// Min-max normalize to `[0.0, 1.0]`. All-equal inputs normalize to `1.0`.
pub fn min_max_normalize(values: &[f64]) -> Vec<f64> {
    if values.is_empty() {
        return Vec::new();
    }

    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);

    values
        .iter()
        .map(|v| {
            if (max - min).abs() < f64::EPSILON {
                1.0
            } else {
                (v - min) / (max - min)
            }
        })
        .collect()
}

fn clamp_weight(weight: f64) -> f64 {
    if weight.is_nan() {
        warn!("semantic weight is NaN, using default {}", DEFAULT_SEMANTIC_WEIGHT);
        return DEFAULT_SEMANTIC_WEIGHT;
    }
    if !(0.0..=1.0).contains(&weight) {
        warn!(weight, "semantic weight out of [0, 1], clamping");
    }
    weight.clamp(0.0, 1.0)
}

fn split_ranked(results: &[RankedChunk]) -> (Vec<String>, Vec<f64>) {
    results
        .iter()
        .map(|r| (r.chunk.id.clone(), r.score))
        .unzip()
}
