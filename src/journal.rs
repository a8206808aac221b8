//! Line-oriented text form of [`Event`], used to dump a live stream and replay it later.
//!
//! ```text
//! RawTransaction(sequence=564091, raw_tx=0100..., timestamp=2024-03-01T10:00:00Z)
//! TransactionHash(sequence=564091, tx_hash=6620..., timestamp=2024-03-01T10:00:00Z)
//! BlockHash(sequence=12, block_hash=0000..., timestamp=2024-03-01T10:00:00Z)
//! SequenceNumber(sequence=-1, seq_hash=00ab..., label=A, mempool_sequence=77, timestamp=...)
//! ```
//!
//! No field value contains `", "` or `)`, so splitting on them is positional and safe.
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWriteExt};

use crate::error::MalformedEventError;
use crate::event::{
    BlockHashEvent, Event, RawTransactionEvent, SequenceLabel, SequenceSignalEvent,
    TransactionHashEvent, HASH_LEN,
};
use crate::source::{EventSource, Pulled};

const RAW_TX: &str = "RawTransaction";
const TX_HASH: &str = "TransactionHash";
const BLOCK_HASH: &str = "BlockHash";
const SEQUENCE: &str = "SequenceNumber";

const NONE: &str = "None";

fn ts(t: &DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

impl fmt::Display for SequenceLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SequenceLabel::Unlabeled(b) => write!(f, "0x{b:02x}"),
            known => write!(f, "{}", known.to_byte() as char),
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::RawTransaction(e) => write!(
                f,
                "{RAW_TX}(sequence={}, raw_tx={}, timestamp={})",
                e.sequence,
                hex::encode(&e.tx_bytes),
                ts(&e.timestamp)
            ),
            Event::TransactionHash(e) => write!(
                f,
                "{TX_HASH}(sequence={}, tx_hash={}, timestamp={})",
                e.sequence,
                hex::encode(e.tx_hash),
                ts(&e.timestamp)
            ),
            Event::BlockHash(e) => write!(
                f,
                "{BLOCK_HASH}(sequence={}, block_hash={}, timestamp={})",
                e.sequence,
                hex::encode(e.block_hash),
                ts(&e.timestamp)
            ),
            Event::SequenceSignal(e) => {
                let mempool = e
                    .mempool_sequence
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| NONE.to_string());
                write!(
                    f,
                    "{SEQUENCE}(sequence={}, seq_hash={}, label={}, mempool_sequence={}, timestamp={})",
                    e.sequence,
                    hex::encode(e.hash),
                    e.label,
                    mempool,
                    ts(&e.timestamp)
                )
            }
        }
    }
}

/// Field values of one line, checked against the type's field names.
struct Fields<'a>(Vec<&'a str>);

impl<'a> Fields<'a> {
    fn expect(
        kind: &'static str,
        pairs: Vec<(&'a str, &'a str)>,
        names: &'static [&'static str],
    ) -> Result<Self, MalformedEventError> {
        if pairs.len() != names.len() {
            return Err(MalformedEventError::FieldCount {
                kind,
                expected: names.len(),
                got: pairs.len(),
            });
        }
        let mut values = Vec::with_capacity(names.len());
        for ((key, value), name) in pairs.into_iter().zip(names) {
            if key != *name {
                return Err(field(name, format!("found `{key}` in its position")));
            }
            values.push(value);
        }
        Ok(Self(values))
    }

    fn sequence(&self) -> Result<i64, MalformedEventError> {
        self.0[0]
            .parse()
            .map_err(|e| field("sequence", format!("{e}")))
    }

    fn timestamp(&self) -> Result<DateTime<Utc>, MalformedEventError> {
        let raw = self.0[self.0.len() - 1];
        DateTime::parse_from_rfc3339(raw)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|e| field("timestamp", format!("{e}")))
    }
}

fn field(name: &'static str, reason: impl Into<String>) -> MalformedEventError {
    MalformedEventError::Field {
        field: name,
        reason: reason.into(),
    }
}

fn hash_field(name: &'static str, raw: &str) -> Result<[u8; HASH_LEN], MalformedEventError> {
    let bytes = hex::decode(raw).map_err(|e| field(name, format!("{e}")))?;
    let len = bytes.len();
    bytes
        .try_into()
        .map_err(|_| field(name, format!("expected {HASH_LEN} bytes, got {len}")))
}

fn label_field(raw: &str) -> Result<SequenceLabel, MalformedEventError> {
    match raw.as_bytes() {
        [b] => Ok(SequenceLabel::from_byte(*b)),
        _ => raw
            .strip_prefix("0x")
            .and_then(|h| u8::from_str_radix(h, 16).ok())
            .map(SequenceLabel::from_byte)
            .ok_or_else(|| field("label", format!("`{raw}` is not a label"))),
    }
}

impl FromStr for Event {
    type Err = MalformedEventError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        let syntax = || MalformedEventError::Syntax(line.to_string());
        let (kind, rest) = line.split_once('(').ok_or_else(syntax)?;
        let inner = rest.strip_suffix(')').ok_or_else(syntax)?;
        let pairs = inner
            .split(", ")
            .map(|kv| kv.split_once('=').ok_or_else(syntax))
            .collect::<Result<Vec<_>, _>>()?;

        match kind {
            RAW_TX => {
                let f = Fields::expect(RAW_TX, pairs, &["sequence", "raw_tx", "timestamp"])?;
                let tx_bytes = hex::decode(f.0[1]).map_err(|e| field("raw_tx", format!("{e}")))?;
                if tx_bytes.is_empty() {
                    return Err(field("raw_tx", "empty transaction"));
                }
                Ok(Event::RawTransaction(RawTransactionEvent {
                    sequence: f.sequence()?,
                    tx_bytes,
                    timestamp: f.timestamp()?,
                }))
            }
            TX_HASH => {
                let f = Fields::expect(TX_HASH, pairs, &["sequence", "tx_hash", "timestamp"])?;
                Ok(Event::TransactionHash(TransactionHashEvent {
                    sequence: f.sequence()?,
                    tx_hash: hash_field("tx_hash", f.0[1])?,
                    timestamp: f.timestamp()?,
                }))
            }
            BLOCK_HASH => {
                let f =
                    Fields::expect(BLOCK_HASH, pairs, &["sequence", "block_hash", "timestamp"])?;
                Ok(Event::BlockHash(BlockHashEvent {
                    sequence: f.sequence()?,
                    block_hash: hash_field("block_hash", f.0[1])?,
                    timestamp: f.timestamp()?,
                }))
            }
            SEQUENCE => {
                let f = Fields::expect(
                    SEQUENCE,
                    pairs,
                    &["sequence", "seq_hash", "label", "mempool_sequence", "timestamp"],
                )?;
                let mempool_sequence = match f.0[3] {
                    NONE => None,
                    n => Some(
                        n.parse()
                            .map_err(|e| field("mempool_sequence", format!("{e}")))?,
                    ),
                };
                Ok(Event::SequenceSignal(SequenceSignalEvent {
                    sequence: f.sequence()?,
                    hash: hash_field("seq_hash", f.0[1])?,
                    label: label_field(f.0[2])?,
                    mempool_sequence,
                    timestamp: f.timestamp()?,
                }))
            }
            other => Err(MalformedEventError::UnknownTopic(other.to_string())),
        }
    }
}

/// Appends events to a journal file, one line each, flushed per line.
pub struct JournalWriter {
    path: PathBuf,
    file: tokio::fs::File,
}

impl JournalWriter {
    /// Open `path` for appending, creating it and its parent directories.
    pub async fn open(path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let path = path.into();
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir)
                .await
                .with_context(|| format!("create journal dir {}", dir.display()))?;
        }
        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .with_context(|| format!("open journal {}", path.display()))?;
        Ok(Self { path, file })
    }

    /// Path being written.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one event.
    pub async fn append(&mut self, event: &Event) -> anyhow::Result<()> {
        let line = format!("{event}\n");
        self.file
            .write_all(line.as_bytes())
            .await
            .with_context(|| format!("append to journal {}", self.path.display()))?;
        self.file.flush().await?;
        Ok(())
    }
}

/// Replays a journal as an [`EventSource`]. Blank lines are skipped; a line that is not
/// UTF-8 is reported as malformed like any other bad line.
pub struct JournalReader<R> {
    reader: R,
    buf: Vec<u8>,
    line_no: usize,
}

impl<R: AsyncBufRead + Unpin + Send> JournalReader<R> {
    /// Read journal lines from any buffered reader (a file, stdin, a byte slice).
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: Vec::new(),
            line_no: 0,
        }
    }

    /// Number of lines consumed so far.
    pub fn line_no(&self) -> usize {
        self.line_no
    }
}

impl JournalReader<tokio::io::BufReader<tokio::fs::File>> {
    /// Open a journal file for replay.
    pub async fn open(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let file = tokio::fs::File::open(path)
            .await
            .with_context(|| format!("open journal {}", path.display()))?;
        Ok(Self::new(tokio::io::BufReader::new(file)))
    }
}

#[async_trait]
impl<R: AsyncBufRead + Unpin + Send> EventSource for JournalReader<R> {
    async fn next_event(&mut self) -> anyhow::Result<Pulled> {
        loop {
            self.buf.clear();
            let n = self
                .reader
                .read_until(b'\n', &mut self.buf)
                .await
                .with_context(|| format!("read journal line {}", self.line_no + 1))?;
            if n == 0 {
                return Ok(None);
            }
            self.line_no += 1;

            let line = match std::str::from_utf8(&self.buf) {
                Ok(line) => line,
                Err(e) => {
                    return Ok(Some(Err(MalformedEventError::Syntax(format!(
                        "line {} is not UTF-8: {e}",
                        self.line_no
                    )))))
                }
            };
            if line.trim().is_empty() {
                continue;
            }
            return Ok(Some(line.parse()));
        }
    }
}
