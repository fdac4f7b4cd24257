//! Ethereum JSON-RPC transport.
//!
//! Reads go through `eth_call`. Writes are handed to the node's wallet with
//! `eth_sendTransaction` and awaited by polling for the receipt.

use crate::abi::{self, Address};
use crate::error::{Error, Result};
use log::{debug, info, warn};
use rand::Rng;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::{Instant, sleep};

const RECEIPT_POLL_INTERVAL: Duration = Duration::from_secs(2);
const RECEIPT_TIMEOUT: Duration = Duration::from_secs(180);

#[derive(Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Value,
    error: Option<RpcErrorBody>,
}

#[derive(Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct Receipt {
    status: Option<String>,
    #[serde(rename = "blockNumber")]
    block_number: Option<String>,
}

pub struct RpcClient {
    client: Client,
    url: String,
    next_id: AtomicU64,
    base_delay: Duration,
    max_retries: u32,
}

impl RpcClient {
    pub fn new(url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("plantsoul/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Config(format!("failed to create HTTP client: {e}")))?;
        info!("RPC client using {}", url);

        Ok(Self {
            client,
            url: url.to_string(),
            next_id: AtomicU64::new(1),
            base_delay: Duration::from_millis(500),
            max_retries: 0,
        })
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn with_delay(mut self, delay_ms: u64) -> Self {
        self.base_delay = Duration::from_millis(delay_ms);
        self
    }

    async fn request(&self, method: &str, params: Value) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = RpcRequest {
            jsonrpc: "2.0",
            id,
            method,
            params,
        };
        debug!("rpc {} #{}", method, id);

        let response = self.client.post(&self.url).json(&body).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::Rpc(format!("{method}: HTTP {status}")));
        }
        let parsed: RpcResponse = response.json().await?;
        unwrap_response(method, parsed)
    }

    /// Read-only contract call; returns the raw ABI return data.
    pub async fn eth_call(&self, to: &Address, data: &[u8]) -> Result<Vec<u8>> {
        let params = json!([{ "to": to.as_str(), "data": abi::encode_hex(data) }, "latest"]);
        let result = self.request("eth_call", params).await?;
        let hex = result
            .as_str()
            .ok_or_else(|| Error::Decode("eth_call result is not a string".into()))?;
        abi::decode_hex(hex)
    }

    /// Submit a transaction signed by the wallet behind `from` and wait for it
    /// to be mined. Only the submission itself is retried, up to `max_retries`
    /// times with exponential backoff and jitter; once the node has accepted
    /// the transaction it is never resubmitted.
    pub async fn send_transaction(&self, from: &Address, to: &Address, data: &[u8]) -> Result<String> {
        let mut attempt = 0;
        let tx_hash = loop {
            match self.submit(from, to, data).await {
                Ok(tx_hash) => {
                    if attempt > 0 {
                        info!("Transaction {} accepted on attempt {}", tx_hash, attempt + 1);
                    }
                    break tx_hash;
                }
                Err(e) if e.is_transient() && attempt < self.max_retries => {
                    attempt += 1;
                    let delay = self.backoff(attempt);
                    warn!(
                        "Transaction submission failed, retrying (attempt {}) after {}ms: {}",
                        attempt + 1,
                        delay.as_millis(),
                        e
                    );
                    sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        };
        self.wait_for_receipt(&tx_hash).await?;
        Ok(tx_hash)
    }

    async fn submit(&self, from: &Address, to: &Address, data: &[u8]) -> Result<String> {
        let params = json!([{
            "from": from.as_str(),
            "to": to.as_str(),
            "data": abi::encode_hex(data),
        }]);
        let result = self.request("eth_sendTransaction", params).await?;
        let tx_hash = result
            .as_str()
            .ok_or_else(|| Error::Decode("eth_sendTransaction result is not a string".into()))?
            .to_string();
        info!("Submitted transaction {}", tx_hash);
        Ok(tx_hash)
    }

    async fn wait_for_receipt(&self, tx_hash: &str) -> Result<()> {
        let deadline = Instant::now() + RECEIPT_TIMEOUT;
        loop {
            let result = self
                .request("eth_getTransactionReceipt", json!([tx_hash]))
                .await?;
            if !result.is_null() {
                let receipt: Receipt = serde_json::from_value(result)
                    .map_err(|e| Error::Decode(format!("receipt for {tx_hash}: {e}")))?;
                return check_receipt(tx_hash, &receipt);
            }
            if Instant::now() >= deadline {
                return Err(Error::Timeout {
                    what: format!("receipt for {tx_hash}"),
                    secs: RECEIPT_TIMEOUT.as_secs(),
                });
            }
            sleep(RECEIPT_POLL_INTERVAL).await;
        }
    }

    fn backoff(&self, attempt: u32) -> Duration {
        let base = self.base_delay.as_millis() as u64;
        Duration::from_millis(2_u64.pow(attempt) * base + rand::rng().random_range(0..base.max(1)))
    }
}

fn unwrap_response(method: &str, response: RpcResponse) -> Result<Value> {
    if let Some(err) = response.error {
        return Err(Error::Rpc(format!("{method}: {} (code {})", err.message, err.code)));
    }
    // Null is a valid result: a receipt for a transaction not yet mined.
    Ok(response.result)
}

fn check_receipt(tx_hash: &str, receipt: &Receipt) -> Result<()> {
    match receipt.status.as_deref() {
        Some("0x1") => {
            info!(
                "Transaction {} confirmed in block {}",
                tx_hash,
                receipt.block_number.as_deref().unwrap_or("?")
            );
            Ok(())
        }
        Some("0x0") => Err(Error::Reverted {
            tx_hash: tx_hash.to_string(),
        }),
        other => Err(Error::Decode(format!(
            "receipt for {tx_hash} has unexpected status {other:?}"
        ))),
    }
}
