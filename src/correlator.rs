//! Groups mempool transactions by the outpoints they spend and keeps each group's fee history.
//!
//! A replacement (BIP-125 style) spends the same inputs with different outputs, so the
//! identity of a fee-bump family is its input list, not its outputs.
use std::collections::HashMap;
use std::fmt;

use bitcoin::hashes::{sha256, Hash};
use bitcoin::{consensus, Transaction, Txid};
use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::error::{EngineError, TransactionParseError};
use crate::resolver::PrevoutResolver;
use crate::rpc::NodeRpc;

/// SHA-256 over the consensus encoding of a transaction's input outpoints, in input order.
///
/// Two transactions spending the same outpoints in a different order get different keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GroupKey(sha256::Hash);

impl GroupKey {
    /// Key of `tx`'s spent-outpoint sequence.
    pub fn of(tx: &Transaction) -> Self {
        let mut buf = Vec::with_capacity(tx.input.len() * 36);
        for input in &tx.input {
            buf.extend_from_slice(&consensus::serialize(&input.previous_output));
        }
        GroupKey(sha256::Hash::hash(&buf))
    }

    /// Raw digest bytes.
    pub fn to_byte_array(self) -> [u8; 32] {
        self.0.to_byte_array()
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Whether any input opts into replacement (sequence below `0xffffffff`).
pub fn signals_replaceable(tx: &Transaction) -> bool {
    tx.input.iter().any(|input| !input.sequence.is_final())
}

/// Fee history of one group: the original broadcast followed by its replacements.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeeBumpRecord {
    key: GroupKey,
    transactions: Vec<Transaction>,
    fees: Vec<i64>,
    timestamps: Vec<DateTime<Utc>>,
}

impl FeeBumpRecord {
    fn new(key: GroupKey, tx: Transaction, fee: i64, at: DateTime<Utc>) -> Self {
        Self {
            key,
            transactions: vec![tx],
            fees: vec![fee],
            timestamps: vec![at],
        }
    }

    fn push(&mut self, tx: Transaction, fee: i64, at: DateTime<Utc>) {
        self.transactions.push(tx);
        self.fees.push(fee);
        self.timestamps.push(at);
    }

    /// Group this record belongs to.
    pub fn key(&self) -> GroupKey {
        self.key
    }

    /// Observations so far (always at least 1).
    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    /// Never true; records are created with their first observation.
    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    /// Replaced at least once.
    pub fn is_bumped(&self) -> bool {
        self.len() > 1
    }

    /// Transactions in observation order.
    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    /// Fees in satoshis, parallel to [`Self::transactions`].
    pub fn fees(&self) -> &[i64] {
        &self.fees
    }

    /// Observation times, parallel to [`Self::transactions`].
    pub fn timestamps(&self) -> &[DateTime<Utc>] {
        &self.timestamps
    }

    /// Id of the latest replacement.
    pub fn final_txid(&self) -> Txid {
        self.transactions[self.transactions.len() - 1].compute_txid()
    }

    /// `(transaction, fee, timestamp)` triples in observation order.
    pub fn entries(&self) -> impl Iterator<Item = (&Transaction, i64, DateTime<Utc>)> + '_ {
        self.transactions
            .iter()
            .zip(self.fees.iter().copied())
            .zip(self.timestamps.iter().copied())
            .map(|((tx, fee), at)| (tx, fee, at))
    }
}

/// What [`Correlator::ingest`] did with a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// New group opened.
    Started {
        /// Fee of the first observation.
        fee: i64,
    },
    /// Appended to an existing group.
    Bumped {
        /// Fee of this replacement.
        fee: i64,
        /// History length after appending.
        len: usize,
    },
    /// Unseen group without a replacement signal; discarded.
    NotReplaceable,
    /// Unseen group while the window is at its record cap; discarded.
    Capped,
}

/// Per-window correlation state. Created once; cleared by the block boundary.
pub struct Correlator<R> {
    resolver: PrevoutResolver<R>,
    index: HashMap<GroupKey, usize>,
    records: Vec<FeeBumpRecord>,
    max_records: Option<usize>,
}

impl<R: NodeRpc> Correlator<R> {
    /// Correlator backed by `resolver`.
    pub fn new(resolver: PrevoutResolver<R>) -> Self {
        Self {
            resolver,
            index: HashMap::new(),
            records: Vec::new(),
            max_records: None,
        }
    }

    /// Stop opening new groups once `cap` records exist in a window.
    pub fn with_max_records(mut self, cap: usize) -> Self {
        self.max_records = Some(cap);
        self
    }

    /// Fold one mempool transaction into the window.
    ///
    /// # Errors
    /// [`EngineError::Upstream`] if an input value cannot be resolved,
    /// [`EngineError::TransactionParse`] if the value totals overflow. Either way the
    /// window is unchanged and the error is recoverable.
    pub async fn ingest(
        &mut self,
        tx: Transaction,
        at: DateTime<Utc>,
    ) -> Result<IngestOutcome, EngineError> {
        let key = GroupKey::of(&tx);
        let existing = self.index.get(&key).copied();

        if existing.is_none() {
            if !signals_replaceable(&tx) {
                debug!(%key, "all inputs final, not tracked");
                return Ok(IngestOutcome::NotReplaceable);
            }
            if self.max_records.is_some_and(|cap| self.records.len() >= cap) {
                warn!(%key, records = self.records.len(), "record cap reached, group dropped");
                return Ok(IngestOutcome::Capped);
            }
        }

        let fee = self.fee(&tx).await?;

        let outcome = match existing {
            Some(i) => {
                let record = &mut self.records[i];
                record.push(tx, fee, at);
                IngestOutcome::Bumped {
                    fee,
                    len: record.len(),
                }
            }
            None => {
                self.index.insert(key, self.records.len());
                self.records.push(FeeBumpRecord::new(key, tx, fee, at));
                IngestOutcome::Started { fee }
            }
        };
        debug!(%key, ?outcome, "ingested");
        Ok(outcome)
    }

    /// Inputs minus outputs. Negative values are kept so resolver bugs stay visible.
    ///
    /// Outputs are summed first so an out-of-range transaction costs no lookup.
    async fn fee(&mut self, tx: &Transaction) -> Result<i64, EngineError> {
        let overflow = || TransactionParseError::ValueOverflow(tx.compute_txid());

        let mut outputs: i64 = 0;
        for output in &tx.output {
            outputs = add_sats(outputs, output.value.to_sat()).ok_or_else(overflow)?;
        }
        let mut inputs: i64 = 0;
        for input in &tx.input {
            let value = self.resolver.resolve(input.previous_output).await?;
            inputs = add_sats(inputs, value).ok_or_else(overflow)?;
        }
        Ok(inputs.checked_sub(outputs).ok_or_else(overflow)?)
    }

    /// Copy of every record in the window, in first-seen order.
    pub fn snapshot(&self) -> Vec<FeeBumpRecord> {
        self.records.clone()
    }

    /// Record for `key`, if the group is tracked.
    pub fn record(&self, key: &GroupKey) -> Option<&FeeBumpRecord> {
        self.index.get(key).map(|&i| &self.records[i])
    }

    /// Records in the window.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// No records in the window.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Drop all records and both resolver caches.
    pub fn reset(&mut self) {
        self.index.clear();
        self.records.clear();
        self.resolver.clear();
    }

    /// The prevout resolver (for cache inspection).
    pub fn resolver(&self) -> &PrevoutResolver<R> {
        &self.resolver
    }
}

fn add_sats(total: i64, sats: u64) -> Option<i64> {
    i64::try_from(sats).ok().and_then(|v| total.checked_add(v))
}
