//! JSON-RPC chain client for Ethereum endpoints.

use std::time::Duration;

use alloy_core::primitives::{Address, B256, U64, U256};
use anyhow::Context;
use backon::{ExponentialBuilder, Retryable};
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::Value;
use url::Url;

use crate::{
    chain::{ChainClient, ConfirmationStatus, confirmation_status},
    error::TxFailure,
    types::{TxReceipt, TxRequest},
};

/// Default timeout for RPC requests.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default interval between receipt polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Maximum retries for idempotent read calls.
const MAX_READ_RETRIES: usize = 3;

/// Create an HTTP client configured for JSON-RPC requests.
pub fn create_client() -> Result<reqwest::Client, anyhow::Error> {
    reqwest::Client::builder()
        .timeout(DEFAULT_TIMEOUT)
        .build()
        .context("Failed to create HTTP client")
}

/// Make a JSON-RPC call and deserialize the result.
///
/// # Arguments
/// * `client` - The HTTP client to use
/// * `url` - The RPC endpoint URL
/// * `method` - The RPC method name
/// * `params` - The method parameters
///
/// # Returns
/// The deserialized result, or an error if the request failed or returned an error response.
pub async fn json_rpc_call<T: DeserializeOwned>(
    client: &reqwest::Client,
    url: &str,
    method: &str,
    params: Vec<Value>,
) -> Result<T, anyhow::Error> {
    let response = client
        .post(url)
        .json(&serde_json::json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": 1
        }))
        .send()
        .await
        .with_context(|| format!("Failed to send {} request", method))?;

    let result: Value = response
        .json()
        .await
        .with_context(|| format!("Failed to parse {} response", method))?;

    if let Some(error) = result.get("error") {
        anyhow::bail!(
            "RPC error: {}",
            error
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or("unknown")
        );
    }

    let result_value = result
        .get("result")
        .context("No result in response")?
        .clone();

    serde_json::from_value(result_value)
        .with_context(|| format!("Failed to deserialize {} result", method))
}

/// Receipt as returned by `eth_getTransactionReceipt`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcReceipt {
    transaction_hash: B256,
    block_number: U64,
    status: Option<U64>,
    contract_address: Option<Address>,
}

impl From<RpcReceipt> for TxReceipt {
    fn from(receipt: RpcReceipt) -> Self {
        Self {
            transaction_hash: receipt.transaction_hash,
            block_number: receipt.block_number.to(),
            // Pre-byzantium receipts carry no status; treat them as successful.
            success: receipt.status.is_none_or(|status| status == U64::from(1)),
            contract_address: receipt.contract_address,
        }
    }
}

/// Build the `eth_sendTransaction` parameter object.
fn transaction_object(tx: &TxRequest) -> Value {
    let mut object = serde_json::json!({
        "from": tx.from,
        "value": format!("{:#x}", tx.value),
        "data": tx.data,
    });
    if let Some(to) = tx.to {
        object["to"] = serde_json::json!(to);
    }
    object
}

/// Chain client talking to a node that manages the deployer account.
///
/// Transactions are submitted with `eth_sendTransaction`, so the endpoint must be able to sign
/// for the sender (a local dev node or a signing proxy).
#[derive(Debug, Clone)]
pub struct JsonRpcClient {
    client: reqwest::Client,
    url: Url,
    poll_interval: Duration,
}

impl JsonRpcClient {
    pub fn new(url: Url) -> anyhow::Result<Self> {
        Ok(Self {
            client: create_client()?,
            url,
            poll_interval: DEFAULT_POLL_INTERVAL,
        })
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Read-only call, retried with exponential backoff on failure.
    async fn read<T: DeserializeOwned>(&self, method: &str, params: Vec<Value>) -> anyhow::Result<T> {
        (|| json_rpc_call(&self.client, self.url.as_str(), method, params.clone()))
            .retry(ExponentialBuilder::default().with_max_times(MAX_READ_RETRIES))
            .notify(|err, delay| {
                tracing::debug!(method, error = %err, ?delay, "RPC read failed, retrying");
            })
            .await
    }

    pub async fn chain_id(&self) -> anyhow::Result<u64> {
        let chain_id: U64 = self.read("eth_chainId", vec![]).await?;
        Ok(chain_id.to())
    }

    /// Fail if the endpoint serves a different chain than expected.
    pub async fn verify_chain_id(&self, expected: u64) -> anyhow::Result<()> {
        let actual = self.chain_id().await?;
        if actual != expected {
            anyhow::bail!(
                "RPC endpoint {} serves chain {}, expected {}",
                self.url,
                actual,
                expected
            );
        }
        Ok(())
    }

    async fn block_number(&self) -> anyhow::Result<u64> {
        let number: U64 = self.read("eth_blockNumber", vec![]).await?;
        Ok(number.to())
    }
}

impl ChainClient for JsonRpcClient {
    async fn send_transaction(&self, tx: TxRequest) -> anyhow::Result<B256> {
        // Never retried: a resubmission could land twice.
        json_rpc_call(
            &self.client,
            self.url.as_str(),
            "eth_sendTransaction",
            vec![transaction_object(&tx)],
        )
        .await
    }

    async fn wait_for_confirmation(
        &self,
        tx_hash: B256,
        confirmations: u64,
    ) -> Result<TxReceipt, TxFailure> {
        loop {
            let receipt: Option<RpcReceipt> = self
                .read("eth_getTransactionReceipt", vec![serde_json::json!(tx_hash)])
                .await?;
            let receipt = receipt.map(TxReceipt::from);

            let status = match &receipt {
                Some(receipt) => {
                    let head = self.block_number().await?;
                    confirmation_status(Some(receipt.block_number), true, head, confirmations)
                }
                None => {
                    let pending: Option<Value> = self
                        .read("eth_getTransactionByHash", vec![serde_json::json!(tx_hash)])
                        .await?;
                    confirmation_status(None, pending.is_some(), 0, confirmations)
                }
            };

            match (status, receipt) {
                (ConfirmationStatus::Confirmed, Some(receipt)) => return Ok(receipt),
                (ConfirmationStatus::Dropped, _) => return Err(TxFailure::Dropped(tx_hash)),
                (ConfirmationStatus::Waiting { depth }, _) => {
                    tracing::trace!(%tx_hash, depth, confirmations, "Waiting for confirmations");
                }
                _ => tracing::trace!(%tx_hash, "Transaction pending"),
            }

            tokio::time::sleep(self.poll_interval).await;
        }
    }

    async fn get_balance(&self, address: Address) -> anyhow::Result<U256> {
        self.read(
            "eth_getBalance",
            vec![serde_json::json!(address), serde_json::json!("latest")],
        )
        .await
    }

    async fn deployer_address(&self) -> anyhow::Result<Address> {
        let accounts: Vec<Address> = self.read("eth_accounts", vec![]).await?;
        accounts
            .into_iter()
            .next()
            .context("RPC endpoint exposes no accounts; configure a deployer address")
    }
}
