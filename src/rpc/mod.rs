//! The narrow node interface the engine needs: previous transactions and the tip height.
use async_trait::async_trait;
use bitcoin::{BlockHash, Transaction, Txid};

/// What the node knows about one transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxMetadata {
    /// The full transaction; its outputs carry the values inputs spend.
    pub transaction: Transaction,
    /// Confirmations, 0 while still in the mempool.
    pub confirmations: u32,
    /// Block containing the transaction, if confirmed.
    pub block_hash: Option<BlockHash>,
}

/// Node RPC collaborator. Every failure surfaces as an `UpstreamLookupError` upstream.
#[async_trait]
pub trait NodeRpc: Send + Sync {
    /// Fetch a transaction and its confirmation status by id.
    async fn get_transaction(&self, txid: Txid) -> anyhow::Result<TxMetadata>;

    /// Height of the node's best chain.
    async fn get_chain_height(&self) -> anyhow::Result<u32>;
}

#[cfg(feature = "rpc-bitcoind")]
pub mod bitcoind;
