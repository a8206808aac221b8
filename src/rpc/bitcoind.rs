//! [`NodeRpc`] over bitcoind's JSON-RPC interface.
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use bitcoin::{consensus, BlockHash, Transaction, Txid};
use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::{json, Value};
use tracing::trace;

use super::{NodeRpc, TxMetadata};

/// bitcoind JSON-RPC client. A stalled node fails the call after the configured timeout.
#[derive(Debug, Clone)]
pub struct BitcoindRpc {
    client: Client,
    url: String,
    user: String,
    password: String,
}

#[derive(Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcErrorBody>,
}

#[derive(Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

#[derive(Deserialize)]
struct VerboseTx {
    hex: String,
    #[serde(default)]
    confirmations: u32,
    blockhash: Option<String>,
}

impl BitcoindRpc {
    /// Client for `url` authenticating with `user`/`password`.
    pub fn new(
        url: &str,
        user: impl Into<String>,
        password: impl Into<String>,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("build http client")?;
        Ok(Self {
            client,
            url: url.trim_end_matches('/').to_string(),
            user: user.into(),
            password: password.into(),
        })
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> anyhow::Result<T> {
        trace!(method, %params, "bitcoind call");
        let body = json!({
            "jsonrpc": "1.0",
            "id": "rebid-tracker",
            "method": method,
            "params": params,
        });
        let resp = self
            .client
            .post(&self.url)
            .basic_auth(&self.user, Some(&self.password))
            .json(&body)
            .send()
            .await
            .with_context(|| format!("{method}: request"))?;

        // bitcoind answers RPC errors with a 500 and a JSON body, so parse before checking status
        let status = resp.status();
        let parsed: RpcResponse<T> = resp
            .json()
            .await
            .with_context(|| format!("{method}: decode response (http {status})"))?;
        if let Some(err) = parsed.error {
            return Err(anyhow!("{method}: rpc error {}: {}", err.code, err.message));
        }
        parsed
            .result
            .ok_or_else(|| anyhow!("{method}: empty result (http {status})"))
    }
}

#[async_trait]
impl NodeRpc for BitcoindRpc {
    async fn get_transaction(&self, txid: Txid) -> anyhow::Result<TxMetadata> {
        let verbose: VerboseTx = self
            .call("getrawtransaction", json!([txid.to_string(), true]))
            .await?;
        let raw = hex::decode(&verbose.hex).context("getrawtransaction: hex")?;
        let transaction: Transaction =
            consensus::deserialize(&raw).context("getrawtransaction: decode")?;
        let block_hash = verbose
            .blockhash
            .as_deref()
            .map(BlockHash::from_str)
            .transpose()
            .context("getrawtransaction: blockhash")?;
        Ok(TxMetadata {
            transaction,
            confirmations: verbose.confirmations,
            block_hash,
        })
    }

    async fn get_chain_height(&self) -> anyhow::Result<u32> {
        self.call("getblockcount", json!([])).await
    }
}
