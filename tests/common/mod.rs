#![allow(dead_code)]
//! Shared in-memory collaborators and transaction builders for the integration tests.
use async_trait::async_trait;
use bitcoin::hashes::Hash;
use bitcoin::{
    absolute::LockTime, transaction::Version, Amount, OutPoint, ScriptBuf, Sequence,
    Transaction, TxIn, TxOut, Txid, Witness,
};
use rebid_tracker::{NodeRpc, ReportRow, ReportSink, Store, TxMetadata};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// ------- Node RPC with canned transactions and a settable tip -------
pub struct MockRpc {
    txs: Mutex<HashMap<Txid, Transaction>>,
    failing: Mutex<HashSet<Txid>>,
    height: AtomicU32,
    height_fails: Mutex<bool>,
    pub fetches: Arc<AtomicUsize>,
}

impl MockRpc {
    pub fn new(height: u32) -> Self {
        Self {
            txs: Mutex::new(HashMap::new()),
            failing: Mutex::new(HashSet::new()),
            height: AtomicU32::new(height),
            height_fails: Mutex::new(false),
            fetches: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Make `tx` fetchable; returns its id.
    pub fn add(&self, tx: Transaction) -> Txid {
        let txid = tx.compute_txid();
        self.txs.lock().unwrap().insert(txid, tx);
        txid
    }

    pub fn fail(&self, txid: Txid) {
        self.failing.lock().unwrap().insert(txid);
    }

    pub fn heal(&self, txid: Txid) {
        self.failing.lock().unwrap().remove(&txid);
    }

    pub fn set_height(&self, h: u32) {
        self.height.store(h, Ordering::SeqCst);
    }

    pub fn fail_height(&self, fails: bool) {
        *self.height_fails.lock().unwrap() = fails;
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NodeRpc for MockRpc {
    async fn get_transaction(&self, txid: Txid) -> anyhow::Result<TxMetadata> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if self.failing.lock().unwrap().contains(&txid) {
            anyhow::bail!("node unreachable");
        }
        let tx = self
            .txs
            .lock()
            .unwrap()
            .get(&txid)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no such transaction {txid}"))?;
        Ok(TxMetadata {
            transaction: tx,
            confirmations: 0,
            block_hash: None,
        })
    }

    async fn get_chain_height(&self) -> anyhow::Result<u32> {
        if *self.height_fails.lock().unwrap() {
            anyhow::bail!("node unreachable");
        }
        Ok(self.height.load(Ordering::SeqCst))
    }
}

/// ------- Report sink that keeps rows in memory -------
#[derive(Clone, Default)]
pub struct MemSink {
    pub rows: Arc<Mutex<Vec<ReportRow>>>,
    pub fail: Arc<Mutex<bool>>,
}

#[async_trait]
impl ReportSink for MemSink {
    async fn append(&self, rows: Vec<ReportRow>) -> anyhow::Result<()> {
        if *self.fail.lock().unwrap() {
            anyhow::bail!("disk full");
        }
        self.rows.lock().unwrap().extend(rows);
        Ok(())
    }
}

/// ------- Minimal in-memory Store -------
#[derive(Default)]
pub struct MemStore {
    pub last: Mutex<Option<u32>>,
    pub rows: Mutex<u64>,
    pub fail: Mutex<bool>,
}

#[async_trait]
impl Store for MemStore {
    async fn last_flushed_height(&self) -> anyhow::Result<Option<u32>> {
        Ok(*self.last.lock().unwrap())
    }
    async fn record_flush(&self, height: u32, rows: usize) -> anyhow::Result<()> {
        if *self.fail.lock().unwrap() {
            anyhow::bail!("database is locked");
        }
        *self.last.lock().unwrap() = Some(height);
        *self.rows.lock().unwrap() += rows as u64;
        Ok(())
    }
    async fn flushed_rows(&self) -> anyhow::Result<u64> {
        Ok(*self.rows.lock().unwrap())
    }
}

/// A confirmed-looking parent paying `values`; `tag` keeps txids distinct.
pub fn funding_tx(tag: u8, values: &[u64]) -> Transaction {
    Transaction {
        version: Version::TWO,
        lock_time: LockTime::ZERO,
        input: vec![TxIn {
            previous_output: OutPoint {
                txid: Txid::from_byte_array([tag; 32]),
                vout: 0,
            },
            script_sig: ScriptBuf::new(),
            sequence: Sequence::MAX,
            witness: Witness::new(),
        }],
        output: values
            .iter()
            .map(|v| TxOut {
                value: Amount::from_sat(*v),
                script_pubkey: ScriptBuf::new(),
            })
            .collect(),
    }
}

/// Spend `prevouts` with a single `sequence` on every input into `outputs`.
pub fn spend(prevouts: &[OutPoint], outputs: &[u64], sequence: Sequence) -> Transaction {
    Transaction {
        version: Version::TWO,
        lock_time: LockTime::ZERO,
        input: prevouts
            .iter()
            .map(|op| TxIn {
                previous_output: *op,
                script_sig: ScriptBuf::new(),
                sequence,
                witness: Witness::new(),
            })
            .collect(),
        output: outputs
            .iter()
            .map(|v| TxOut {
                value: Amount::from_sat(*v),
                script_pubkey: ScriptBuf::new(),
            })
            .collect(),
    }
}

pub fn outpoint(txid: Txid, vout: u32) -> OutPoint {
    OutPoint { txid, vout }
}

/// Opt-in RBF sequence.
pub const RBF: Sequence = Sequence::ENABLE_RBF_NO_LOCKTIME;
/// Final sequence.
pub const FINAL: Sequence = Sequence::MAX;
