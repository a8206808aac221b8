//! Per-block report rows for fee-bump families that were replaced often enough to matter.
use std::path::PathBuf;

use anyhow::Context;
use async_trait::async_trait;
use chrono::SecondsFormat;
use serde::Serialize;
use tokio::task;
use tracing::debug;

use crate::correlator::FeeBumpRecord;

/// Records need strictly more observations than this to be reported.
pub const DEFAULT_MIN_HISTORY: usize = 3;

/// One CSV line. Field names are the report header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportRow {
    /// Txid of the family's final replacement.
    pub external_transaction_id: String,
    /// Group key hex. Weaker than the txid; do not join on it across runs.
    pub internal_transaction_id: String,
    /// Fee of this observation in satoshis.
    pub gas_fee: i64,
    /// Observation time, RFC 3339.
    pub timestamp: String,
    /// Height of the window the row was flushed from.
    pub block_id: u32,
}

/// Destination for report rows.
#[async_trait]
pub trait ReportSink: Send + Sync {
    /// Persist `rows` after everything previously appended.
    async fn append(&self, rows: Vec<ReportRow>) -> anyhow::Result<()>;
}

/// Turns a window's records into rows and hands them to a [`ReportSink`].
pub struct ReportEmitter<K> {
    sink: K,
    min_history: usize,
}

impl<K: ReportSink> ReportEmitter<K> {
    /// Emitter with the default threshold of [`DEFAULT_MIN_HISTORY`].
    pub fn new(sink: K) -> Self {
        Self {
            sink,
            min_history: DEFAULT_MIN_HISTORY,
        }
    }

    /// Only report records with more than `min` observations.
    pub fn with_min_history(mut self, min: usize) -> Self {
        self.min_history = min;
        self
    }

    /// Current threshold.
    pub fn min_history(&self) -> usize {
        self.min_history
    }

    /// The underlying sink.
    pub fn sink(&self) -> &K {
        &self.sink
    }

    /// One row per observation of every record above the threshold.
    pub fn rows(&self, records: &[FeeBumpRecord], height: u32) -> Vec<ReportRow> {
        records
            .iter()
            .filter(|r| r.len() > self.min_history)
            .flat_map(|record| {
                let external = record.final_txid().to_string();
                let internal = record.key().to_string();
                record.entries().map(move |(_, fee, at)| ReportRow {
                    external_transaction_id: external.clone(),
                    internal_transaction_id: internal.clone(),
                    gas_fee: fee,
                    timestamp: at.to_rfc3339_opts(SecondsFormat::AutoSi, true),
                    block_id: height,
                })
            })
            .collect()
    }

    /// Write the rows for one window. Returns the number of rows written.
    pub async fn flush(&self, records: &[FeeBumpRecord], height: u32) -> anyhow::Result<usize> {
        let rows = self.rows(records, height);
        let n = rows.len();
        if n == 0 {
            debug!(height, records = records.len(), "nothing to report");
            return Ok(0);
        }
        self.sink.append(rows).await?;
        Ok(n)
    }
}

/// CSV file sink. Creates the file with a header on first use and appends afterwards.
#[derive(Debug, Clone)]
pub struct CsvFileSink {
    path: PathBuf,
}

impl CsvFileSink {
    /// Sink writing to `path`. Nothing is touched until the first append.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl ReportSink for CsvFileSink {
    async fn append(&self, rows: Vec<ReportRow>) -> anyhow::Result<()> {
        let path = self.path.clone();
        task::spawn_blocking(move || {
            // a missing or empty file (e.g. pre-created by an operator) gets the header
            let needs_header = std::fs::metadata(&path).map_or(true, |m| m.len() == 0);
            if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
                std::fs::create_dir_all(dir)
                    .with_context(|| format!("create report dir {}", dir.display()))?;
            }
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .with_context(|| format!("open report {}", path.display()))?;
            let mut writer = csv::WriterBuilder::new()
                .has_headers(needs_header)
                .from_writer(file);
            for row in &rows {
                writer.serialize(row)?;
            }
            writer.flush()?;
            Ok(())
        })
        .await?
    }
}
