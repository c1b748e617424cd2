//! SQLite connection pool for the corpus index.
//!
//! Ingest writes while `serve` reads, so every connection runs in WAL mode
//! with a busy timeout instead of failing fast on `SQLITE_BUSY`.

use anyhow::{Context, Result};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use std::time::Duration;

use crate::config::{Config, DbConfig};

/// Per-connection settings derived from `[db]`.
pub fn connect_options(db: &DbConfig) -> SqliteConnectOptions {
    SqliteConnectOptions::new()
        .filename(&db.path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .busy_timeout(Duration::from_millis(db.busy_timeout_ms))
        .foreign_keys(true)
}

/// Open the corpus database, creating the file and parent directory if needed.
pub async fn connect(config: &Config) -> Result<SqlitePool> {
    let db = &config.db;

    if let Some(parent) = db.path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    SqlitePoolOptions::new()
        .max_connections(db.max_connections)
        .connect_with(connect_options(db))
        .await
        .with_context(|| format!("Failed to open database {}", db.path.display()))
}
