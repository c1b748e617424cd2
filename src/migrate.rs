use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    apply_schema(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Create every table and index. Safe to run repeatedly.
pub async fn apply_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chunks (
            id TEXT NOT NULL,
            partition TEXT NOT NULL,
            text TEXT NOT NULL,
            title TEXT NOT NULL DEFAULT '',
            data_source TEXT NOT NULL DEFAULT '',
            source_url TEXT,
            metadata_json TEXT NOT NULL DEFAULT '{}',
            code_blocks_json TEXT NOT NULL DEFAULT '[]',
            hash TEXT NOT NULL,
            ingested_at INTEGER NOT NULL,
            PRIMARY KEY (partition, id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chunk_vectors (
            chunk_id TEXT NOT NULL,
            partition TEXT NOT NULL,
            embedding BLOB NOT NULL,
            model TEXT NOT NULL,
            dims INTEGER NOT NULL,
            PRIMARY KEY (partition, chunk_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // FTS5 CREATE has no IF NOT EXISTS guard on every SQLite build
    let fts_exists: bool = sqlx::query_scalar(
        "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name='chunks_fts'",
    )
    .fetch_one(pool)
    .await?;

    if !fts_exists {
        sqlx::query(
            r#"
            CREATE VIRTUAL TABLE chunks_fts USING fts5(
                chunk_id UNINDEXED,
                partition UNINDEXED,
                text
            )
            "#,
        )
        .execute(pool)
        .await?;
    }

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_partition_title ON chunks(partition, title)")
        .execute(pool)
        .await?;

    Ok(())
}
