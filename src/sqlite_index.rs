//! SQLite-backed [`SearchIndex`] implementation.
//!
//! Keyword search runs FTS5 BM25 over `chunks_fts`; vector search is a
//! brute-force L2 scan over the partition's rows in `chunk_vectors`.
//! Both are scoped to one partition per query.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{Map, Value};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use jenkins_chatbot_core::embedding::{blob_to_vec, l2_distance, vec_to_blob};
use jenkins_chatbot_core::index::{tokenize, Partition, SearchIndex};
use jenkins_chatbot_core::models::{Chunk, RankedChunk, SourceMetadata};

/// A stored embedding together with the model that produced it.
pub struct StoredVector<'a> {
    pub embedding: &'a [f32],
    pub model: &'a str,
}

pub struct SqliteIndex {
    pool: SqlitePool,
}

impl SqliteIndex {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Insert or replace one chunk, its FTS row, and its vector.
    ///
    /// Passing `vector: None` drops any previously stored vector so a
    /// changed chunk never keeps a stale embedding.
    pub async fn upsert_chunk(
        &self,
        partition: Partition,
        chunk: &Chunk,
        hash: &str,
        vector: Option<StoredVector<'_>>,
    ) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        let metadata_json = serde_json::to_string(&chunk.metadata.extra)?;
        let code_blocks_json = serde_json::to_string(&chunk.code_blocks)?;

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO chunks (id, partition, text, title, data_source, source_url,
                                metadata_json, code_blocks_json, hash, ingested_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(partition, id) DO UPDATE SET
                text = excluded.text,
                title = excluded.title,
                data_source = excluded.data_source,
                source_url = excluded.source_url,
                metadata_json = excluded.metadata_json,
                code_blocks_json = excluded.code_blocks_json,
                hash = excluded.hash,
                ingested_at = excluded.ingested_at
            "#,
        )
        .bind(&chunk.id)
        .bind(partition.as_str())
        .bind(&chunk.text)
        .bind(&chunk.metadata.title)
        .bind(&chunk.metadata.data_source)
        .bind(&chunk.metadata.source_url)
        .bind(&metadata_json)
        .bind(&code_blocks_json)
        .bind(hash)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM chunks_fts WHERE chunk_id = ? AND partition = ?")
            .bind(&chunk.id)
            .bind(partition.as_str())
            .execute(&mut *tx)
            .await?;

        sqlx::query("INSERT INTO chunks_fts (chunk_id, partition, text) VALUES (?, ?, ?)")
            .bind(&chunk.id)
            .bind(partition.as_str())
            .bind(&chunk.text)
            .execute(&mut *tx)
            .await?;

        match vector {
            Some(v) => {
                sqlx::query(
                    r#"
                    INSERT INTO chunk_vectors (chunk_id, partition, embedding, model, dims)
                    VALUES (?, ?, ?, ?, ?)
                    ON CONFLICT(partition, chunk_id) DO UPDATE SET
                        embedding = excluded.embedding,
                        model = excluded.model,
                        dims = excluded.dims
                    "#,
                )
                .bind(&chunk.id)
                .bind(partition.as_str())
                .bind(vec_to_blob(v.embedding))
                .bind(v.model)
                .bind(v.embedding.len() as i64)
                .execute(&mut *tx)
                .await?;
            }
            None => {
                sqlx::query("DELETE FROM chunk_vectors WHERE chunk_id = ? AND partition = ?")
                    .bind(&chunk.id)
                    .bind(partition.as_str())
                    .execute(&mut *tx)
                    .await?;
            }
        }

        tx.commit().await?;
        Ok(())
    }

    /// Stored content hash of a chunk and whether it has a vector.
    pub async fn existing(&self, partition: Partition, id: &str) -> Result<Option<(String, bool)>> {
        let row = sqlx::query(
            r#"
            SELECT c.hash,
                   EXISTS(SELECT 1 FROM chunk_vectors cv
                          WHERE cv.chunk_id = c.id AND cv.partition = c.partition) AS has_vector
            FROM chunks c
            WHERE c.partition = ? AND c.id = ?
            "#,
        )
        .bind(partition.as_str())
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| (r.get("hash"), r.get::<bool, _>("has_vector"))))
    }

    pub async fn count(&self, partition: Partition) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks WHERE partition = ?")
            .bind(partition.as_str())
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Distinct non-empty titles of the plugin-docs partition.
    pub async fn plugin_titles(&self) -> Result<Vec<String>> {
        let titles: Vec<String> = sqlx::query_scalar(
            "SELECT DISTINCT title FROM chunks WHERE partition = ? AND title != '' ORDER BY title",
        )
        .bind(Partition::PluginDocs.as_str())
        .fetch_all(&self.pool)
        .await?;
        Ok(titles)
    }
}

/// Turn free text into an FTS5 query: every term quoted, OR-ed together.
/// `None` when the text has no searchable terms.
pub fn fts_query(text: &str) -> Option<String> {
    let terms = tokenize(text);
    if terms.is_empty() {
        return None;
    }
    Some(
        terms
            .iter()
            .map(|t| format!("\"{}\"", t))
            .collect::<Vec<_>>()
            .join(" OR "),
    )
}

fn row_to_chunk(row: &SqliteRow) -> Chunk {
    let metadata_json: String = row.get("metadata_json");
    let code_blocks_json: String = row.get("code_blocks_json");

    Chunk {
        id: row.get("id"),
        text: row.get("text"),
        metadata: SourceMetadata {
            data_source: row.get("data_source"),
            title: row.get("title"),
            source_url: row.get("source_url"),
            extra: serde_json::from_str::<Map<String, Value>>(&metadata_json).unwrap_or_default(),
        },
        code_blocks: serde_json::from_str(&code_blocks_json).unwrap_or_default(),
    }
}

#[async_trait]
impl SearchIndex for SqliteIndex {
    async fn vector_search(
        &self,
        partition: Partition,
        query_vec: &[f32],
        limit: usize,
    ) -> Result<Vec<RankedChunk>> {
        let rows = sqlx::query(
            r#"
            SELECT c.id, c.text, c.title, c.data_source, c.source_url,
                   c.metadata_json, c.code_blocks_json, cv.embedding
            FROM chunk_vectors cv
            JOIN chunks c ON c.id = cv.chunk_id AND c.partition = cv.partition
            WHERE cv.partition = ?
            "#,
        )
        .bind(partition.as_str())
        .fetch_all(&self.pool)
        .await?;

        let mut ranked: Vec<RankedChunk> = rows
            .iter()
            .filter_map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                let distance = l2_distance(query_vec, &blob_to_vec(&blob))?;
                Some(RankedChunk::new(row_to_chunk(row), distance))
            })
            .collect();

        ranked.sort_by(|a, b| {
            a.score
                .partial_cmp(&b.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        ranked.truncate(limit);

        Ok(ranked)
    }

    async fn keyword_search(
        &self,
        partition: Partition,
        query: &str,
        limit: usize,
    ) -> Result<Vec<RankedChunk>> {
        let Some(fts) = fts_query(query) else {
            return Ok(Vec::new());
        };

        let rows = sqlx::query(
            r#"
            SELECT c.id, c.text, c.title, c.data_source, c.source_url,
                   c.metadata_json, c.code_blocks_json, chunks_fts.rank AS rank
            FROM chunks_fts
            JOIN chunks c ON c.id = chunks_fts.chunk_id AND c.partition = chunks_fts.partition
            WHERE chunks_fts MATCH ? AND chunks_fts.partition = ?
            ORDER BY chunks_fts.rank
            LIMIT ?
            "#,
        )
        .bind(&fts)
        .bind(partition.as_str())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| {
                let rank: f64 = row.get("rank");
                RankedChunk::new(row_to_chunk(row), -rank)
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrate::apply_schema;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn index() -> SqliteIndex {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        apply_schema(&pool).await.unwrap();
        SqliteIndex::new(pool)
    }

    fn chunk(id: &str, title: &str, text: &str) -> Chunk {
        Chunk {
            id: id.into(),
            text: text.into(),
            metadata: SourceMetadata {
                title: title.into(),
                data_source: "jenkins_plugins_documentation".into(),
                ..Default::default()
            },
            code_blocks: vec!["git url: 'x'".into()],
        }
    }

    #[test]
    fn test_fts_query_quotes_terms() {
        assert_eq!(
            fts_query("git-plugin: \"checkout\"?").as_deref(),
            Some("\"git\" OR \"plugin\" OR \"checkout\"")
        );
        assert_eq!(fts_query(" ?! "), None);
    }

    #[tokio::test]
    async fn test_keyword_search_scoped_to_partition() {
        let index = index().await;
        index
            .upsert_chunk(Partition::PluginDocs, &chunk("a", "git", "Git checkout step [[CODE_BLOCK_0]]"), "h1", None)
            .await
            .unwrap();
        index
            .upsert_chunk(Partition::PluginDocs, &chunk("b", "docker", "Docker agents"), "h2", None)
            .await
            .unwrap();
        index
            .upsert_chunk(Partition::JenkinsDocs, &chunk("c", "Pipeline", "Checkout in pipelines"), "h3", None)
            .await
            .unwrap();

        let hits = index
            .keyword_search(Partition::PluginDocs, "how to checkout", 10)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].chunk.id, "a");
        assert_eq!(hits[0].chunk.code_blocks, vec!["git url: 'x'".to_string()]);
        assert!(hits[0].score > 0.0);

        assert!(index
            .keyword_search(Partition::StackOverflow, "checkout", 10)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_vector_search_orders_by_distance() {
        let index = index().await;
        let near = [1.0f32, 0.0];
        let far = [0.0f32, 3.0];
        index
            .upsert_chunk(
                Partition::JenkinsDocs,
                &chunk("far", "", "far"),
                "h1",
                Some(StoredVector { embedding: &far, model: "m" }),
            )
            .await
            .unwrap();
        index
            .upsert_chunk(
                Partition::JenkinsDocs,
                &chunk("near", "", "near"),
                "h2",
                Some(StoredVector { embedding: &near, model: "m" }),
            )
            .await
            .unwrap();

        let hits = index
            .vector_search(Partition::JenkinsDocs, &[1.0, 0.0], 5)
            .await
            .unwrap();
        let ids: Vec<&str> = hits.iter().map(|h| h.chunk.id.as_str()).collect();
        assert_eq!(ids, vec!["near", "far"]);
        assert_eq!(hits[0].score, 0.0);
    }

    #[tokio::test]
    async fn test_upsert_replaces_and_drops_stale_vector() {
        let index = index().await;
        let v = [0.5f32, 0.5];
        index
            .upsert_chunk(
                Partition::CommunityThreads,
                &chunk("t", "", "old text"),
                "h1",
                Some(StoredVector { embedding: &v, model: "m" }),
            )
            .await
            .unwrap();
        assert_eq!(
            index.existing(Partition::CommunityThreads, "t").await.unwrap(),
            Some(("h1".to_string(), true))
        );

        index
            .upsert_chunk(Partition::CommunityThreads, &chunk("t", "", "new text"), "h2", None)
            .await
            .unwrap();
        assert_eq!(index.count(Partition::CommunityThreads).await.unwrap(), 1);
        assert_eq!(
            index.existing(Partition::CommunityThreads, "t").await.unwrap(),
            Some(("h2".to_string(), false))
        );
        assert!(index
            .keyword_search(Partition::CommunityThreads, "old", 5)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_plugin_titles() {
        let index = index().await;
        for (id, title) in [("1", "git"), ("2", "git"), ("3", "blueocean"), ("4", "")] {
            index
                .upsert_chunk(Partition::PluginDocs, &chunk(id, title, "text"), "h", None)
                .await
                .unwrap();
        }
        assert_eq!(index.plugin_titles().await.unwrap(), vec!["blueocean", "git"]);
    }
}
