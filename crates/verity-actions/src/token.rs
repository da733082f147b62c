//! Token allowance/balance reads.
//!
//! These go straight to the ledger through the wallet's read RPC, not
//! through the relay: pre-flight checks must not depend on relay
//! availability.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use verity_types::{hex_to_bytes, Address, Result, VerityError};

/// ERC-20 read interface, in wei.
#[async_trait]
pub trait TokenReader: Send + Sync {
    async fn allowance(&self, owner: &Address, spender: &Address) -> Result<u128>;
    async fn balance(&self, owner: &Address) -> Result<u128>;
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    result: Option<String>,
    error: Option<serde_json::Value>,
}

/// `TokenReader` over JSON-RPC `eth_call`.
pub struct RpcTokenReader {
    rpc_url: String,
    token: Address,
    client: reqwest::Client,
    timeout: Duration,
}

impl RpcTokenReader {
    pub fn new(rpc_url: &str, token: &Address, timeout_ms: Option<u64>) -> Self {
        let timeout_ms = timeout_ms.unwrap_or(10_000);
        Self {
            rpc_url: rpc_url.to_string(),
            token: token.clone(),
            client: reqwest::Client::builder()
                .timeout(Duration::from_millis(timeout_ms))
                .build()
                .unwrap_or_default(),
            timeout: Duration::from_millis(timeout_ms),
        }
    }

    async fn eth_call(&self, data: &str) -> Result<u128> {
        let body = serde_json::json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "eth_call",
            "params": [{ "to": self.token, "data": data }, "latest"],
        });

        let resp = self
            .client
            .post(&self.rpc_url)
            .json(&body)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| VerityError::Other(format!("rpc request failed: {}", e)))?;

        if !resp.status().is_success() {
            return Err(VerityError::Other(format!(
                "rpc returned status {}",
                resp.status()
            )));
        }

        let body: RpcResponse = resp
            .json()
            .await
            .map_err(|e| VerityError::Other(format!("bad rpc response: {}", e)))?;

        if let Some(err) = body.error {
            return Err(VerityError::Other(format!("rpc error: {}", err)));
        }
        let result = body
            .result
            .ok_or_else(|| VerityError::Other("rpc response missing result".into()))?;
        parse_uint_word(&result)
    }
}

/// Parse a 32-byte ABI word as u128, saturating above u128::MAX.
fn parse_uint_word(word: &str) -> Result<u128> {
    let bytes = hex_to_bytes(word)?;
    if bytes.len() > 32 {
        return Err(VerityError::InvalidHex(format!(
            "uint word too long: {} bytes",
            bytes.len()
        )));
    }
    let mut padded = [0u8; 32];
    padded[32 - bytes.len()..].copy_from_slice(&bytes);
    if padded[..16].iter().any(|&b| b != 0) {
        return Ok(u128::MAX);
    }
    Ok(u128::from_be_bytes(padded[16..].try_into().unwrap()))
}

#[async_trait]
impl TokenReader for RpcTokenReader {
    async fn allowance(&self, owner: &Address, spender: &Address) -> Result<u128> {
        let data = verity_relay::calldata::allowance(owner, spender)?;
        self.eth_call(&data).await
    }

    async fn balance(&self, owner: &Address) -> Result<u128> {
        let data = verity_relay::calldata::balance_of(owner)?;
        self.eth_call(&data).await
    }
}
