//! Upstream balance lookups over JSON-RPC.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use crate::error::Error;

/// Fetches the raw balance (in lamports) held by a wallet.
///
/// Implementations are cancelled by dropping the returned future.
#[async_trait]
pub trait BalanceClient: Send + Sync {
    async fn fetch_balance(&self, wallet: &str) -> Result<u64, Error>;
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    result: Option<BalanceValue>,
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct BalanceValue {
    value: u64,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

/// `getBalance` client for a Solana-compatible RPC endpoint
pub struct RpcBalanceClient {
    http: reqwest::Client,
    endpoint: String,
    commitment: String,
}

impl RpcBalanceClient {
    pub fn new(
        endpoint: impl Into<String>,
        commitment: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, Error> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Configuration(format!("failed to build RPC client: {}", e)))?;

        Ok(Self {
            http,
            endpoint: endpoint.into(),
            commitment: commitment.into(),
        })
    }
}

#[async_trait]
impl BalanceClient for RpcBalanceClient {
    async fn fetch_balance(&self, wallet: &str) -> Result<u64, Error> {
        let payload = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "getBalance",
            "params": [wallet, { "commitment": self.commitment }]
        });

        let response = self
            .http
            .post(&self.endpoint)
            .header("Content-Type", "application/json")
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::UpstreamUnavailable(format!(
                "RPC endpoint returned HTTP {}",
                status
            )));
        }

        let body: RpcResponse = response.json().await?;
        match (body.result, body.error) {
            (_, Some(err)) => Err(Error::UpstreamUnavailable(format!(
                "RPC error {}: {}",
                err.code, err.message
            ))),
            (Some(result), None) => Ok(result.value),
            (None, None) => Err(Error::UpstreamUnavailable(
                "RPC response carried neither result nor error".to_string(),
            )),
        }
    }
}
