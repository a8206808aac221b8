//! Typed node notifications and the wire decoder.
//!
//! A node publishes `(topic, payload, sequence)` frames. [`Event::decode`] is the single
//! entry point turning one frame into one [`Event`] variant; consumers `match` on it.
use bitcoin::{consensus, Transaction};
use chrono::{DateTime, Utc};

use crate::error::{MalformedEventError, TransactionParseError};

/// Length of every hash carried by the notifications.
pub const HASH_LEN: usize = 32;

/// `sequence` payload without the optional mempool counter.
const SEQUENCE_SHORT: usize = HASH_LEN + 1;
/// `sequence` payload with the 8-byte mempool counter.
const SEQUENCE_LONG: usize = HASH_LEN + 1 + 8;

/// Value of the sequence field when the frame carries none.
pub const NO_SEQUENCE: i64 = -1;

/// One framed message as delivered by the pub-sub transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Topic tag, e.g. `b"rawtx"`.
    pub topic: Vec<u8>,
    /// Topic specific body.
    pub payload: Vec<u8>,
    /// Little-endian u32 publisher sequence, or empty.
    pub sequence: Vec<u8>,
}

impl Frame {
    /// Build a frame from its three parts.
    pub fn new(
        topic: impl Into<Vec<u8>>,
        payload: impl Into<Vec<u8>>,
        sequence: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
            sequence: sequence.into(),
        }
    }
}

/// Topics the decoder accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    /// `hashtx`
    HashTx,
    /// `rawtx`
    RawTx,
    /// `hashblock`
    HashBlock,
    /// `sequence`
    Sequence,
}

impl Topic {
    /// Wire tag of the topic.
    pub fn as_str(self) -> &'static str {
        match self {
            Topic::HashTx => "hashtx",
            Topic::RawTx => "rawtx",
            Topic::HashBlock => "hashblock",
            Topic::Sequence => "sequence",
        }
    }

    /// Parse a wire tag.
    pub fn from_bytes(tag: &[u8]) -> Result<Self, MalformedEventError> {
        match tag {
            b"hashtx" => Ok(Topic::HashTx),
            b"rawtx" => Ok(Topic::RawTx),
            b"hashblock" => Ok(Topic::HashBlock),
            b"sequence" => Ok(Topic::Sequence),
            other => Err(MalformedEventError::UnknownTopic(
                String::from_utf8_lossy(other).into_owned(),
            )),
        }
    }
}

/// Label byte of a `sequence` notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SequenceLabel {
    /// `C`: block connected.
    BlockConnected,
    /// `D`: block disconnected.
    BlockDisconnected,
    /// `R`: transaction removed from the mempool for a non-block reason.
    TxRemoved,
    /// `A`: transaction added to the mempool.
    TxAdded,
    /// Any other byte, kept verbatim.
    Unlabeled(u8),
}

impl SequenceLabel {
    /// Map a label byte; unknown bytes become [`SequenceLabel::Unlabeled`].
    pub fn from_byte(b: u8) -> Self {
        match b {
            b'C' => SequenceLabel::BlockConnected,
            b'D' => SequenceLabel::BlockDisconnected,
            b'R' => SequenceLabel::TxRemoved,
            b'A' => SequenceLabel::TxAdded,
            other => SequenceLabel::Unlabeled(other),
        }
    }

    /// The wire byte.
    pub fn to_byte(self) -> u8 {
        match self {
            SequenceLabel::BlockConnected => b'C',
            SequenceLabel::BlockDisconnected => b'D',
            SequenceLabel::TxRemoved => b'R',
            SequenceLabel::TxAdded => b'A',
            SequenceLabel::Unlabeled(b) => b,
        }
    }
}

/// `rawtx`: a full serialized transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawTransactionEvent {
    /// Publisher sequence or [`NO_SEQUENCE`].
    pub sequence: i64,
    /// Consensus-encoded transaction.
    pub tx_bytes: Vec<u8>,
    /// Time the event was observed.
    pub timestamp: DateTime<Utc>,
}

/// Transaction versions this engine tracks.
const SUPPORTED_VERSIONS: std::ops::RangeInclusive<i32> = 1..=3;

impl RawTransactionEvent {
    /// Parse the payload. Truncated input, trailing bytes and unknown versions are errors.
    pub fn deserialize(&self) -> Result<Transaction, TransactionParseError> {
        let tx: Transaction = consensus::deserialize(&self.tx_bytes)?;
        if !SUPPORTED_VERSIONS.contains(&tx.version.0) {
            return Err(TransactionParseError::UnsupportedVersion(tx.version.0));
        }
        Ok(tx)
    }
}

/// `hashtx`: txid of a transaction entering the mempool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionHashEvent {
    /// Publisher sequence or [`NO_SEQUENCE`].
    pub sequence: i64,
    /// Hash bytes in the order the node emitted them.
    pub tx_hash: [u8; HASH_LEN],
    /// Time the event was observed.
    pub timestamp: DateTime<Utc>,
}

/// `hashblock`: a new tip was connected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockHashEvent {
    /// Publisher sequence or [`NO_SEQUENCE`].
    pub sequence: i64,
    /// Hash bytes in the order the node emitted them.
    pub block_hash: [u8; HASH_LEN],
    /// Time the event was observed.
    pub timestamp: DateTime<Utc>,
}

/// `sequence`: mempool / chain lifecycle signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceSignalEvent {
    /// Publisher sequence or [`NO_SEQUENCE`].
    pub sequence: i64,
    /// Block or transaction hash the label refers to.
    pub hash: [u8; HASH_LEN],
    /// What happened.
    pub label: SequenceLabel,
    /// Mempool counter; only present on the 41-byte form.
    pub mempool_sequence: Option<u64>,
    /// Time the event was observed.
    pub timestamp: DateTime<Utc>,
}

/// Every notification kind the engine understands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// See [`RawTransactionEvent`].
    RawTransaction(RawTransactionEvent),
    /// See [`TransactionHashEvent`].
    TransactionHash(TransactionHashEvent),
    /// See [`BlockHashEvent`].
    BlockHash(BlockHashEvent),
    /// See [`SequenceSignalEvent`].
    SequenceSignal(SequenceSignalEvent),
}

impl Event {
    /// Decode one wire frame, stamping it with `timestamp`.
    pub fn decode(frame: &Frame, timestamp: DateTime<Utc>) -> Result<Self, MalformedEventError> {
        let topic = Topic::from_bytes(&frame.topic)?;
        let sequence = decode_sequence(&frame.sequence)?;
        let body = frame.payload.as_slice();

        let event = match topic {
            Topic::RawTx => {
                if body.is_empty() {
                    return Err(MalformedEventError::PayloadLength {
                        topic: topic.as_str(),
                        got: 0,
                        expected: "at least 1",
                    });
                }
                Event::RawTransaction(RawTransactionEvent {
                    sequence,
                    tx_bytes: body.to_vec(),
                    timestamp,
                })
            }
            Topic::HashTx => Event::TransactionHash(TransactionHashEvent {
                sequence,
                tx_hash: hash_payload(topic, body)?,
                timestamp,
            }),
            Topic::HashBlock => Event::BlockHash(BlockHashEvent {
                sequence,
                block_hash: hash_payload(topic, body)?,
                timestamp,
            }),
            Topic::Sequence => {
                let mempool_sequence = match body.len() {
                    SEQUENCE_SHORT => None,
                    SEQUENCE_LONG => {
                        let mut counter = [0u8; 8];
                        counter.copy_from_slice(&body[SEQUENCE_SHORT..]);
                        Some(u64::from_le_bytes(counter))
                    }
                    got => {
                        return Err(MalformedEventError::PayloadLength {
                            topic: topic.as_str(),
                            got,
                            expected: "33 or 41",
                        })
                    }
                };
                let mut hash = [0u8; HASH_LEN];
                hash.copy_from_slice(&body[..HASH_LEN]);
                Event::SequenceSignal(SequenceSignalEvent {
                    sequence,
                    hash,
                    label: SequenceLabel::from_byte(body[HASH_LEN]),
                    mempool_sequence,
                    timestamp,
                })
            }
        };
        Ok(event)
    }

    /// Re-encode as the frame the node would have published.
    ///
    /// A sequence outside the u32 range is written as absent.
    pub fn to_frame(&self) -> Frame {
        let (topic, payload) = match self {
            Event::RawTransaction(e) => (Topic::RawTx, e.tx_bytes.clone()),
            Event::TransactionHash(e) => (Topic::HashTx, e.tx_hash.to_vec()),
            Event::BlockHash(e) => (Topic::HashBlock, e.block_hash.to_vec()),
            Event::SequenceSignal(e) => {
                let mut body = Vec::with_capacity(SEQUENCE_LONG);
                body.extend_from_slice(&e.hash);
                body.push(e.label.to_byte());
                if let Some(counter) = e.mempool_sequence {
                    body.extend_from_slice(&counter.to_le_bytes());
                }
                (Topic::Sequence, body)
            }
        };
        let sequence = u32::try_from(self.sequence())
            .map(|s| s.to_le_bytes().to_vec())
            .unwrap_or_default();
        Frame::new(topic.as_str(), payload, sequence)
    }

    /// Topic this event came from.
    pub fn topic(&self) -> Topic {
        match self {
            Event::RawTransaction(_) => Topic::RawTx,
            Event::TransactionHash(_) => Topic::HashTx,
            Event::BlockHash(_) => Topic::HashBlock,
            Event::SequenceSignal(_) => Topic::Sequence,
        }
    }

    /// Publisher sequence or [`NO_SEQUENCE`].
    pub fn sequence(&self) -> i64 {
        match self {
            Event::RawTransaction(e) => e.sequence,
            Event::TransactionHash(e) => e.sequence,
            Event::BlockHash(e) => e.sequence,
            Event::SequenceSignal(e) => e.sequence,
        }
    }

    /// Observation time.
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Event::RawTransaction(e) => e.timestamp,
            Event::TransactionHash(e) => e.timestamp,
            Event::BlockHash(e) => e.timestamp,
            Event::SequenceSignal(e) => e.timestamp,
        }
    }
}

fn decode_sequence(raw: &[u8]) -> Result<i64, MalformedEventError> {
    match raw.len() {
        0 => Ok(NO_SEQUENCE),
        4 => {
            let mut le = [0u8; 4];
            le.copy_from_slice(raw);
            Ok(i64::from(u32::from_le_bytes(le)))
        }
        n => Err(MalformedEventError::SequenceLength(n)),
    }
}

fn hash_payload(topic: Topic, body: &[u8]) -> Result<[u8; HASH_LEN], MalformedEventError> {
    body.try_into()
        .map_err(|_| MalformedEventError::PayloadLength {
            topic: topic.as_str(),
            got: body.len(),
            expected: "32",
        })
}
