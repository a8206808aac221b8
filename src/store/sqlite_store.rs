//! Embedded SQLite store for flush progress.
use anyhow::Context;
use async_trait::async_trait;
use rusqlite::{params, Connection};
use std::path::PathBuf;
use tokio::task;

use crate::store::Store;

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS state (
        key   TEXT PRIMARY KEY,
        value TEXT NOT NULL
    );
"#;

/// Simple key/value table:
///   state(key TEXT PRIMARY KEY, value TEXT NOT NULL)
///
/// Keys used:
///  - last_flushed_height : u32 decimal string
///  - flushed_rows        : u64 decimal string, cumulative
pub struct SqliteStore {
    path: PathBuf,
}

impl SqliteStore {
    /// Creates/initializes the SQLite file at `path`.
    pub fn new(path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let path = path.into();
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("create store dir {}", dir.display()))?;
        }
        let conn = Connection::open(&path)
            .with_context(|| format!("open sqlite at {}", path.display()))?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { path })
    }

    fn kv_get(conn: &Connection, key: &str) -> anyhow::Result<Option<String>> {
        let mut stmt = conn.prepare("SELECT value FROM state WHERE key = ?1")?;
        let mut rows = stmt.query(params![key])?;
        if let Some(row) = rows.next()? {
            let v: String = row.get(0)?;
            Ok(Some(v))
        } else {
            Ok(None)
        }
    }

    fn kv_set(conn: &Connection, key: &str, val: &str) -> anyhow::Result<()> {
        conn.execute(
            "INSERT INTO state(key,value) VALUES(?1,?2)
             ON CONFLICT(key) DO UPDATE SET value=excluded.value",
            params![key, val],
        )?;
        Ok(())
    }

    fn rows_total(conn: &Connection) -> anyhow::Result<u64> {
        Self::kv_get(conn, "flushed_rows")?
            .map(|s| s.parse::<u64>().context("parse flushed_rows"))
            .transpose()
            .map(|n| n.unwrap_or(0))
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn last_flushed_height(&self) -> anyhow::Result<Option<u32>> {
        let path = self.path.clone();
        task::spawn_blocking(move || {
            let conn = Connection::open(path)?;
            Self::kv_get(&conn, "last_flushed_height")?
                .map(|s| s.parse::<u32>().context("parse last_flushed_height"))
                .transpose()
        })
        .await?
    }

    async fn record_flush(&self, height: u32, rows: usize) -> anyhow::Result<()> {
        let path = self.path.clone();
        task::spawn_blocking(move || {
            let conn = Connection::open(path)?;
            let tx = conn.unchecked_transaction()?;
            let total = Self::rows_total(&conn)? + rows as u64;
            Self::kv_set(&conn, "last_flushed_height", &height.to_string())?;
            Self::kv_set(&conn, "flushed_rows", &total.to_string())?;
            tx.commit()?;
            Ok(())
        })
        .await?
    }

    async fn flushed_rows(&self) -> anyhow::Result<u64> {
        let path = self.path.clone();
        task::spawn_blocking(move || {
            let conn = Connection::open(path)?;
            Self::rows_total(&conn)
        })
        .await?
    }
}
