//! Error taxonomy for the decode -> correlate -> flush pipeline.
//!
//! Decode-level errors ([`MalformedEventError`], [`TransactionParseError`]) drop a single
//! message. [`UpstreamLookupError`] drops a single transaction. [`NonSequentialBlockError`]
//! stops ingestion.
use bitcoin::{OutPoint, Txid};
use thiserror::Error;

/// A framed message or journal line that does not match any event shape.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MalformedEventError {
    /// Topic tag (wire) or type name (journal) is not one of the known kinds.
    #[error("unknown event topic `{0}`")]
    UnknownTopic(String),

    /// The sequence field was neither absent nor exactly 4 bytes.
    #[error("sequence field must be 0 or 4 bytes, got {0}")]
    SequenceLength(usize),

    /// Payload length does not fit the topic.
    #[error("`{topic}` payload has {got} bytes, expected {expected}")]
    PayloadLength {
        /// Topic being decoded.
        topic: &'static str,
        /// Actual payload length.
        got: usize,
        /// Human readable description of the accepted lengths.
        expected: &'static str,
    },

    /// Journal line is not of the form `Name(k=v, ...)`.
    #[error("journal line is not of the form Name(field=value, ...): {0}")]
    Syntax(String),

    /// Journal line has the wrong number of fields for its type.
    #[error("`{kind}` expects {expected} fields, got {got}")]
    FieldCount {
        /// Event type name.
        kind: &'static str,
        /// Arity of the event type.
        expected: usize,
        /// Fields found on the line.
        got: usize,
    },

    /// A field is missing, out of order, or its value does not parse.
    #[error("field `{field}`: {reason}")]
    Field {
        /// Expected field name.
        field: &'static str,
        /// What went wrong.
        reason: String,
    },
}

/// A raw transaction payload that cannot be turned into a transaction.
#[derive(Debug, Error)]
pub enum TransactionParseError {
    /// Truncated, trailing or otherwise invalid consensus encoding.
    #[error("invalid transaction encoding: {0}")]
    Encoding(#[from] bitcoin::consensus::encode::Error),

    /// Decoded fine, but with a version this engine does not track.
    #[error("unsupported transaction version {0}")]
    UnsupportedVersion(i32),

    /// Input or output values do not fit a signed satoshi total.
    #[error("transaction {0} carries values outside the satoshi range")]
    ValueOverflow(Txid),
}

/// The node could not supply data needed for fee attribution.
#[derive(Debug, Error)]
pub enum UpstreamLookupError {
    /// `getTransaction` failed.
    #[error("fetching transaction {txid} failed: {source:#}")]
    Fetch {
        /// Transaction that was requested.
        txid: Txid,
        /// Underlying collaborator error.
        source: anyhow::Error,
    },

    /// The fetched transaction has no output at the requested index.
    #[error("transaction {} has {outputs} outputs, no index {}", .outpoint.txid, .outpoint.vout)]
    MissingOutput {
        /// Outpoint that was being resolved.
        outpoint: OutPoint,
        /// Number of outputs in the fetched transaction.
        outputs: usize,
    },

    /// `getChainHeight` failed.
    #[error("querying chain height failed: {0:#}")]
    ChainHeight(anyhow::Error),
}

/// The node reported a height that is not exactly one past the tracked height.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("non-sequential block: tracking height {current}, node reports {latest}")]
pub struct NonSequentialBlockError {
    /// Height the controller was tracking.
    pub current: u32,
    /// Height reported by the node.
    pub latest: u32,
}

/// Everything the engine can fail with while handling one event.
#[derive(Debug, Error)]
pub enum EngineError {
    /// See [`MalformedEventError`].
    #[error(transparent)]
    Malformed(#[from] MalformedEventError),

    /// See [`TransactionParseError`].
    #[error(transparent)]
    TransactionParse(#[from] TransactionParseError),

    /// See [`UpstreamLookupError`].
    #[error(transparent)]
    Upstream(#[from] UpstreamLookupError),

    /// See [`NonSequentialBlockError`].
    #[error(transparent)]
    NonSequentialBlock(#[from] NonSequentialBlockError),

    /// The chain height could not be queried at a block boundary.
    #[error("block boundary: {0}")]
    BoundaryLookup(#[source] UpstreamLookupError),

    /// Report rows could not be persisted.
    #[error("writing report for block {height} failed: {source:#}")]
    Report {
        /// Height whose window was being flushed.
        height: u32,
        /// Underlying sink error.
        source: anyhow::Error,
    },

    /// Progress store or journal I/O failed.
    #[error("persistence: {0:#}")]
    Persistence(anyhow::Error),

    /// The event source itself failed (not a single bad message).
    #[error("event source: {0:#}")]
    Transport(anyhow::Error),
}

impl EngineError {
    /// Whether ingestion must stop. Everything else drops one message and continues.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            EngineError::NonSequentialBlock(_)
                | EngineError::BoundaryLookup(_)
                | EngineError::Report { .. }
                | EngineError::Persistence(_)
                | EngineError::Transport(_)
        )
    }
}
