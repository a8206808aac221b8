//! Persistence of flush progress, so an operator can see where ingestion stopped
//! after a fatal gap and resynchronize from there.
use async_trait::async_trait;

/// Minimal persistence interface. Only progress markers, no fee data.
#[async_trait]
pub trait Store: Send + Sync {
    /// Height of the last window that was flushed, if any.
    async fn last_flushed_height(&self) -> anyhow::Result<Option<u32>>;

    /// Record that the window at `height` was flushed with `rows` report rows.
    async fn record_flush(&self, height: u32, rows: usize) -> anyhow::Result<()>;

    /// Report rows written across all flushes.
    async fn flushed_rows(&self) -> anyhow::Result<u64>;
}

// submodules / concrete stores live here
#[cfg(feature = "store-sqlite")]
pub mod sqlite_store;
#[cfg(feature = "store-sqlite")]
pub use sqlite_store::SqliteStore;
