//! JSON-RPC ledger client.
//!
//! Speaks the standard HTTP JSON-RPC interface of a Solana-compatible node:
//! `getLatestBlockhash`, `sendTransaction`, `getSignatureStatuses` and
//! `getBlockHeight`.

use crate::config::LedgerConfig;
use crate::domain::ports::{Confirmation, LedgerClient};
use crate::domain::transaction::{BlockReference, Commitment, SignedTransaction};
use crate::error::{PaymentError, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Nominal block production interval, used to bound confirmation polling.
const BLOCK_TIME_MS: u64 = 400;

#[derive(Serialize)]
struct JsonRpcRequest<T> {
    jsonrpc: &'static str,
    method: &'static str,
    params: T,
    id: u64,
}

#[derive(Deserialize)]
struct JsonRpcResponse<T> {
    result: Option<T>,
    error: Option<JsonRpcError>,
}

#[derive(Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

/// `{ context, value }` wrapper used by most node responses.
#[derive(Deserialize)]
struct WithContext<T> {
    value: T,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct LatestBlockhash {
    blockhash: String,
    last_valid_block_height: u64,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SignatureStatus {
    #[serde(default)]
    pub confirmation_status: Option<Commitment>,
    #[serde(default)]
    pub err: Option<serde_json::Value>,
}

/// Maps one status poll to a final answer, or `None` while still pending.
pub fn classify_status(
    status: Option<&SignatureStatus>,
    commitment: Commitment,
) -> Option<Confirmation> {
    let status = status?;
    if let Some(err) = status.err.as_ref().filter(|err| !err.is_null()) {
        return Some(Confirmation::Failed(err.to_string()));
    }
    match status.confirmation_status {
        Some(reached) if reached >= commitment => Some(Confirmation::Confirmed),
        _ => None,
    }
}

pub struct JsonRpcLedgerClient {
    client: reqwest::Client,
    url: String,
    commitment: Commitment,
    poll_interval: Duration,
    max_poll_failures: u32,
}

impl JsonRpcLedgerClient {
    pub fn new(config: &LedgerConfig) -> Result<Self> {
        info!("Using ledger RPC at {}", config.rpc_url);
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .map_err(|e| PaymentError::Transport(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url: config.rpc_url.clone(),
            commitment: config.commitment,
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            max_poll_failures: config.max_poll_failures.max(1),
        })
    }

    async fn rpc_call<T, R>(&self, method: &'static str, params: T) -> Result<R>
    where
        T: Serialize,
        R: DeserializeOwned,
    {
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            method,
            params,
            id: 1,
        };

        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|e| PaymentError::Transport(format!("{} request failed: {}", method, e)))?;

        let rpc_response: JsonRpcResponse<R> = response.json().await.map_err(|e| {
            PaymentError::Transport(format!("Failed to parse {} response: {}", method, e))
        })?;

        if let Some(error) = rpc_response.error {
            return Err(PaymentError::Transport(format!(
                "RPC error {}: {}",
                error.code, error.message
            )));
        }

        rpc_response
            .result
            .ok_or_else(|| PaymentError::Transport(format!("No result in {} response", method)))
    }

    async fn signature_status(&self, signature: &str) -> Result<Option<SignatureStatus>> {
        let statuses: WithContext<Vec<Option<SignatureStatus>>> = self
            .rpc_call(
                "getSignatureStatuses",
                json!([[signature], { "searchTransactionHistory": true }]),
            )
            .await?;
        Ok(statuses.value.into_iter().next().flatten())
    }

    async fn block_height(&self, commitment: Commitment) -> Result<u64> {
        self.rpc_call("getBlockHeight", json!([{ "commitment": commitment }]))
            .await
    }

    /// Wall-clock time for `blocks` more blocks, plus the failure allowance.
    fn expiry_window(&self, blocks: u64) -> Duration {
        Duration::from_millis(blocks.saturating_mul(BLOCK_TIME_MS))
            + self.poll_interval * self.max_poll_failures
    }

    async fn final_check(&self, signature: &str, commitment: Commitment) -> Option<Confirmation> {
        match self.signature_status(signature).await {
            Ok(status) => classify_status(status.as_ref(), commitment),
            Err(_) => None,
        }
    }
}

#[async_trait]
impl LedgerClient for JsonRpcLedgerClient {
    async fn latest_block_reference(&self) -> Result<BlockReference> {
        let latest: WithContext<LatestBlockhash> = self
            .rpc_call(
                "getLatestBlockhash",
                json!([{ "commitment": self.commitment }]),
            )
            .await?;
        Ok(BlockReference {
            blockhash: latest.value.blockhash.parse()?,
            last_valid_block_height: latest.value.last_valid_block_height,
        })
    }

    async fn submit(&self, transaction: &SignedTransaction) -> Result<String> {
        let signature: String = self
            .rpc_call(
                "sendTransaction",
                json!([
                    transaction.to_base64(),
                    { "encoding": "base64", "preflightCommitment": self.commitment }
                ]),
            )
            .await?;
        debug!(%signature, "transaction accepted by node");
        Ok(signature)
    }

    async fn confirm(
        &self,
        signature: &str,
        reference: &BlockReference,
        commitment: Commitment,
    ) -> Result<Confirmation> {
        let timeout = || PaymentError::ConfirmationTimeout {
            signature: signature.to_string(),
            expiry_height: reference.last_valid_block_height,
        };
        let mut failures = 0;
        let mut deadline: Option<Instant> = None;

        loop {
            let mut round_failed = false;

            match self.signature_status(signature).await {
                Ok(status) => {
                    if let Some(outcome) = classify_status(status.as_ref(), commitment) {
                        return Ok(outcome);
                    }
                }
                Err(e) => {
                    round_failed = true;
                    warn!(%signature, error = %e, "signature status poll failed");
                }
            }

            match self.block_height(commitment).await {
                Ok(height) if height > reference.last_valid_block_height => {
                    debug!(%signature, height, "block reference expired");
                    return match self.final_check(signature, commitment).await {
                        Some(outcome) => Ok(outcome),
                        None => Err(timeout()),
                    };
                }
                Ok(height) => {
                    deadline.get_or_insert_with(|| {
                        Instant::now()
                            + self.expiry_window(reference.last_valid_block_height - height)
                    });
                }
                Err(e) => {
                    round_failed = true;
                    warn!(%signature, error = %e, "block height poll failed");
                }
            }

            if round_failed {
                failures += 1;
                if failures >= self.max_poll_failures {
                    warn!(%signature, failures, "giving up on confirmation polling");
                    return Err(timeout());
                }
            } else {
                failures = 0;
            }

            if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                warn!(%signature, "block reference outlived its expected validity window");
                return match self.final_check(signature, commitment).await {
                    Some(outcome) => Ok(outcome),
                    None => Err(timeout()),
                };
            }

            tokio::time::sleep(self.poll_interval).await;
        }
    }
}
