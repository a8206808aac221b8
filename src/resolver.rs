//! Resolves the value of a spent outpoint with two window-scoped caches in front of the node.
use std::collections::HashMap;
use std::sync::Arc;

use bitcoin::{OutPoint, Txid};
use tracing::debug;

use crate::error::UpstreamLookupError;
use crate::rpc::{NodeRpc, TxMetadata};

/// Outpoint value lookup: prevout cache, then metadata cache, then one node fetch per txid.
pub struct PrevoutResolver<R> {
    rpc: Arc<R>,
    prevout_values: HashMap<OutPoint, u64>,
    tx_metadata: HashMap<Txid, TxMetadata>,
}

impl<R: NodeRpc> PrevoutResolver<R> {
    /// Empty caches in front of `rpc`.
    pub fn new(rpc: Arc<R>) -> Self {
        Self {
            rpc,
            prevout_values: HashMap::new(),
            tx_metadata: HashMap::new(),
        }
    }

    /// Value in satoshis of the output `outpoint` refers to.
    ///
    /// # Errors
    /// [`UpstreamLookupError`] when the fetch fails or the transaction lacks the output.
    /// Nothing is cached for the failing outpoint.
    pub async fn resolve(&mut self, outpoint: OutPoint) -> Result<u64, UpstreamLookupError> {
        if let Some(value) = self.prevout_values.get(&outpoint) {
            return Ok(*value);
        }

        if !self.tx_metadata.contains_key(&outpoint.txid) {
            let meta = self
                .rpc
                .get_transaction(outpoint.txid)
                .await
                .map_err(|source| UpstreamLookupError::Fetch {
                    txid: outpoint.txid,
                    source,
                })?;
            debug!(txid = %outpoint.txid, confirmations = meta.confirmations, "fetched prevout tx");
            self.tx_metadata.insert(outpoint.txid, meta);
        }

        let outputs = self
            .tx_metadata
            .get(&outpoint.txid)
            .map(|meta| meta.transaction.output.as_slice())
            .unwrap_or_default();
        let value = outputs
            .get(outpoint.vout as usize)
            .map(|out| out.value.to_sat())
            .ok_or(UpstreamLookupError::MissingOutput {
                outpoint,
                outputs: outputs.len(),
            })?;

        self.prevout_values.insert(outpoint, value);
        Ok(value)
    }

    /// Drop both caches.
    pub fn clear(&mut self) {
        self.prevout_values.clear();
        self.tx_metadata.clear();
    }

    /// Number of cached outpoint values.
    pub fn cached_prevouts(&self) -> usize {
        self.prevout_values.len()
    }

    /// Number of cached node transactions.
    pub fn cached_transactions(&self) -> usize {
        self.tx_metadata.len()
    }

    /// The node collaborator.
    pub fn rpc(&self) -> &Arc<R> {
        &self.rpc
    }
}
