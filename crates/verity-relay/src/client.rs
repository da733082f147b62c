//! HTTP client for the relay service.
//!
//! Endpoints:
//! - GET /relay/nonce/{address}
//! - POST /relay

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;
use verity_types::{Address, ForwardRequest, Hex, Result, VerityError};

use crate::{now_secs, RelayReceipt};

#[derive(Debug, Clone, Deserialize)]
struct NonceResponse {
    nonce: u64,
}

/// Structured error payload on non-2xx relay responses.
#[derive(Debug, Clone, Deserialize)]
struct RelayErrorBody {
    detail: Option<String>,
}

#[derive(Debug, Serialize)]
struct SubmitBody<'a> {
    request: &'a ForwardRequest,
    signature: &'a str,
}

/// Relay client: nonce source plus single-attempt envelope submission.
pub struct RelayClient {
    base_url: String,
    client: reqwest::Client,
    timeout: Duration,
}

impl RelayClient {
    pub fn new(base_url: &str, timeout_ms: Option<u64>) -> Self {
        let timeout_ms = timeout_ms.unwrap_or(30_000);
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::builder()
                .timeout(Duration::from_millis(timeout_ms))
                .build()
                .unwrap_or_default(),
            timeout: Duration::from_millis(timeout_ms),
        }
    }

    /// Fetch the next replay-protection nonce for an address.
    ///
    /// Must be called fresh immediately before signing; nonces are never
    /// cached across pending submissions.
    ///
    /// GET /relay/nonce/{address}
    pub async fn fetch_nonce(&self, address: &Address) -> Result<u64> {
        let url = format!("{}/relay/nonce/{}", self.base_url, address);

        let resp = self
            .client
            .get(&url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| VerityError::NonceUnavailable(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(VerityError::NonceUnavailable(format!(
                "relay returned status {}",
                resp.status()
            )));
        }

        let body: NonceResponse = resp
            .json()
            .await
            .map_err(|e| VerityError::NonceUnavailable(e.to_string()))?;

        Ok(body.nonce)
    }

    /// Submit a signed envelope. One HTTP attempt, no retry: a resent
    /// envelope would carry a consumed nonce or stale deadline and be
    /// rejected anyway. A logical retry re-runs the whole pipeline.
    ///
    /// POST /relay
    pub async fn submit(&self, request: &ForwardRequest, signature: &Hex) -> Result<RelayReceipt> {
        // The envelope is invalid past its deadline; refuse it ourselves
        // rather than relying on the server.
        if now_secs() > request.deadline {
            return Err(VerityError::RelayRejected(format!(
                "deadline {} already passed, envelope discarded",
                request.deadline
            )));
        }

        let url = format!("{}/relay", self.base_url);
        debug!(to = %request.to, nonce = request.nonce, "submitting forward request");

        let resp = self
            .client
            .post(&url)
            .json(&SubmitBody { request, signature })
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| VerityError::RelayUnavailable(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            let detail = serde_json::from_str::<RelayErrorBody>(&text)
                .ok()
                .and_then(|b| b.detail)
                .unwrap_or_else(|| {
                    if text.is_empty() {
                        status.to_string()
                    } else {
                        text.clone()
                    }
                });
            // 4xx means the envelope itself was refused (bad signature,
            // stale nonce, expired deadline); 5xx is a relay-side fault.
            return if status.is_client_error() {
                Err(VerityError::RelayRejected(detail))
            } else {
                Err(VerityError::RelayUnavailable(detail))
            };
        }

        let receipt: RelayReceipt = resp
            .json()
            .await
            .map_err(|e| VerityError::RelayUnavailable(format!("bad relay response: {}", e)))?;

        debug!(tx_hash = %receipt.tx_hash, "relay accepted request");
        Ok(receipt)
    }
}
