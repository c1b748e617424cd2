//! Corpus ingestion.
//!
//! Loads chunk records produced by the offline chunking scripts into one
//! partition of the SQLite index: parse → hash → embed (non-fatal) → upsert.
//! Unchanged chunks that already have a vector are skipped, so re-running
//! an ingest is cheap.

use anyhow::{bail, Context, Result};
use sha2::{Digest, Sha256};
use std::path::Path;
use tracing::{debug, info, warn};

use jenkins_chatbot_core::embedding::Embedder;
use jenkins_chatbot_core::index::Partition;
use jenkins_chatbot_core::models::Chunk;

use crate::config::Config;
use crate::db;
use crate::embedding::create_embedder;
use crate::sqlite_index::{SqliteIndex, StoredVector};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IngestStats {
    pub read: usize,
    pub invalid: usize,
    pub unchanged: usize,
    pub written: usize,
    pub embedded: usize,
    pub embed_pending: usize,
}

/// Parse a JSON array of chunk records, or JSON Lines (one record per line).
pub fn parse_chunk_records(content: &str) -> Result<Vec<Chunk>> {
    let trimmed = content.trim_start();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    if trimmed.starts_with('[') {
        return serde_json::from_str(trimmed).context("Failed to parse chunk array");
    }

    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            serde_json::from_str(line).with_context(|| format!("Invalid chunk record on line {}", i + 1))
        })
        .collect()
}

/// SHA-256 over the chunk text and its code blocks.
pub fn chunk_hash(chunk: &Chunk) -> String {
    let mut hasher = Sha256::new();
    hasher.update(chunk.text.as_bytes());
    for block in &chunk.code_blocks {
        hasher.update([0u8]);
        hasher.update(block.as_bytes());
    }
    format!("{:x}", hasher.finalize())
}

/// Store `chunks` in `partition`, embedding them in batches when an
/// embedder is given. Embedding failures leave chunks without vectors.
pub async fn ingest_chunks(
    index: &SqliteIndex,
    embedder: Option<&dyn Embedder>,
    partition: Partition,
    chunks: Vec<Chunk>,
    batch_size: usize,
) -> Result<IngestStats> {
    let mut stats = IngestStats {
        read: chunks.len(),
        ..Default::default()
    };

    let mut pending: Vec<(Chunk, String)> = Vec::new();
    for chunk in chunks {
        if chunk.id.trim().is_empty() || chunk.text.trim().is_empty() {
            warn!(partition = %partition, chunk_id = %chunk.id, "skipping chunk without id or text");
            stats.invalid += 1;
            continue;
        }

        let hash = chunk_hash(&chunk);
        if let Some((existing_hash, has_vector)) = index.existing(partition, &chunk.id).await? {
            if existing_hash == hash && (has_vector || embedder.is_none()) {
                stats.unchanged += 1;
                continue;
            }
        }
        pending.push((chunk, hash));
    }

    for batch in pending.chunks(batch_size.max(1)) {
        let vectors = match embedder {
            Some(embedder) => {
                let texts: Vec<String> = batch.iter().map(|(c, _)| c.text.clone()).collect();
                match embedder.embed_batch(&texts).await {
                    Ok(vectors) if vectors.len() == batch.len() => Some(vectors),
                    Ok(vectors) => {
                        warn!(expected = batch.len(), got = vectors.len(), "embedding count mismatch, storing without vectors");
                        None
                    }
                    Err(e) => {
                        warn!(error = %e, "embedding failed, storing without vectors");
                        None
                    }
                }
            }
            None => None,
        };

        for (i, (chunk, hash)) in batch.iter().enumerate() {
            let vector = vectors.as_ref().map(|v| StoredVector {
                embedding: &v[i],
                model: embedder.map_or("", |e| e.model_name()),
            });
            match vector {
                Some(_) => stats.embedded += 1,
                None if embedder.is_some() => stats.embed_pending += 1,
                None => {}
            }
            index.upsert_chunk(partition, chunk, hash, vector).await?;
            stats.written += 1;
        }
        debug!(partition = %partition, batch = batch.len(), "batch stored");
    }

    Ok(stats)
}

pub async fn run_ingest(config: &Config, partition: &str, path: &Path) -> Result<()> {
    let partition: Partition = partition.parse()?;
    if !path.exists() {
        bail!("Chunk file not found: {}", path.display());
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let chunks = parse_chunk_records(&content)?;

    let embedder = if config.embedding.is_enabled() {
        Some(create_embedder(&config.embedding)?)
    } else {
        None
    };

    let pool = db::connect(config).await?;
    let index = SqliteIndex::new(pool);
    let stats = ingest_chunks(
        &index,
        embedder.as_deref(),
        partition,
        chunks,
        config.embedding.batch_size,
    )
    .await?;
    let total = index.count(partition).await?;

    info!(partition = %partition, written = stats.written, total, "ingest complete");
    println!("ingest {}", partition);
    println!("  read: {}", stats.read);
    println!("  invalid: {}", stats.invalid);
    println!("  unchanged: {}", stats.unchanged);
    println!("  written: {}", stats.written);
    if embedder.is_some() {
        println!("  embeddings written: {}", stats.embedded);
        println!("  embeddings pending: {}", stats.embed_pending);
    }
    println!("  partition total: {}", total);
    println!("ok");

    index.pool().close().await;
    Ok(())
}
