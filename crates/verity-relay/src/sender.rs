//! The three-step relay pipeline: nonce, sign, submit.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use verity_signer::{Signer, TypedDomain};
use verity_types::{Address, ForwardRequest, Hex, Result, VerityError};

use crate::{now_secs, RelayClient, RelayReceipt, DEADLINE_WINDOW_SECS};

/// Submission seam for action hooks: one relayed call per invocation.
#[async_trait]
pub trait Relayer: Send + Sync {
    /// The account submissions are attributed to.
    fn from_address(&self) -> Address;

    /// Build, sign, and submit one forwarded call.
    async fn send(&self, target: &Address, data: Hex, gas_limit: u64) -> Result<RelayReceipt>;
}

/// Builds, signs, and submits forward requests.
///
/// The nonce fetch, signature, and submission for one address run inside
/// a single critical section, so the sender never holds two outstanding
/// signed-but-unsubmitted envelopes for the same nonce. Independent
/// senders (other users) are unaffected.
pub struct MetaTxSender {
    signer: Arc<dyn Signer>,
    client: RelayClient,
    domain: TypedDomain,
    // address -> highest nonce consumed by a successful submission
    consumed: tokio::sync::Mutex<HashMap<Address, u64>>,
}

impl MetaTxSender {
    pub fn new(signer: Arc<dyn Signer>, client: RelayClient, domain: TypedDomain) -> Self {
        Self {
            signer,
            client,
            domain,
            consumed: tokio::sync::Mutex::new(HashMap::new()),
        }
    }

    /// Run the full pipeline for one call. A failed attempt leaves no
    /// state behind; a logical retry starts over with a fresh nonce.
    async fn send_inner(&self, target: &Address, data: Hex, gas_limit: u64) -> Result<RelayReceipt> {
        let from = self.signer.address();

        // Hold the lock across sign and submit: the signature wait can be
        // arbitrarily long and a second fetch meanwhile would hand us the
        // same nonce.
        let mut consumed = self.consumed.lock().await;

        let nonce = self.client.fetch_nonce(&from).await?;
        if let Some(&last) = consumed.get(&from) {
            if nonce <= last {
                return Err(VerityError::NonceUnavailable(format!(
                    "relay issued nonce {} but {} was already consumed",
                    nonce, last
                )));
            }
        }

        let request = ForwardRequest {
            from: from.clone(),
            to: target.clone(),
            value: 0,
            gas: gas_limit,
            nonce,
            deadline: now_secs() + DEADLINE_WINDOW_SECS,
            data,
        };

        let signature = self.signer.sign_forward_request(&self.domain, &request).await?;
        let receipt = self.client.submit(&request, &signature).await?;

        consumed.insert(from, nonce);
        debug!(nonce, tx_hash = %receipt.tx_hash, "meta-transaction accepted");
        Ok(receipt)
    }
}

#[async_trait]
impl Relayer for MetaTxSender {
    fn from_address(&self) -> Address {
        self.signer.address()
    }

    async fn send(&self, target: &Address, data: Hex, gas_limit: u64) -> Result<RelayReceipt> {
        self.send_inner(target, data, gas_limit).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use verity_signer::LocalSigner;

    const SECRET: &str =
        "0x4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318";
    const TARGET: &str = "0x2222222222222222222222222222222222222222";

    fn sender_for(server: &MockServer) -> MetaTxSender {
        let signer = Arc::new(LocalSigner::from_secret_hex(SECRET).unwrap());
        let domain = TypedDomain::new(
            "VerityForwarder",
            43113,
            "0x00000000000000000000000000000000000000f0",
        );
        MetaTxSender::new(signer, RelayClient::new(&server.base_url(), None), domain)
    }

    #[tokio::test]
    async fn pipeline_fetches_signs_and_submits() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path_contains("/relay/nonce/");
                then.status(200).json_body(serde_json::json!({ "nonce": 5 }));
            })
            .await;
        let submit = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/relay")
                    .json_body_partial(r#"{ "request": { "nonce": 5, "gas": 400000 } }"#);
                then.status(200)
                    .json_body(serde_json::json!({ "ok": true, "tx_hash": "0xfeed" }));
            })
            .await;

        let sender = sender_for(&server);
        let receipt = sender
            .send(&TARGET.to_string(), "0xdeadbeef".into(), 400_000)
            .await
            .unwrap();
        assert_eq!(receipt.tx_hash, "0xfeed");
        submit.assert_hits_async(1).await;
    }

    #[tokio::test]
    async fn rejects_replayed_nonce_from_relay() {
        let server = MockServer::start_async().await;
        // Relay hands out nonce 5 forever.
        server
            .mock_async(|when, then| {
                when.method(GET).path_contains("/relay/nonce/");
                then.status(200).json_body(serde_json::json!({ "nonce": 5 }));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/relay");
                then.status(200)
                    .json_body(serde_json::json!({ "ok": true, "tx_hash": "0x01" }));
            })
            .await;

        let sender = sender_for(&server);
        sender
            .send(&TARGET.to_string(), "0x01".into(), 100_000)
            .await
            .unwrap();

        // Nonce 5 was consumed; being issued it again is a relay fault.
        let err = sender
            .send(&TARGET.to_string(), "0x02".into(), 100_000)
            .await
            .unwrap_err();
        assert!(matches!(err, VerityError::NonceUnavailable(_)));
    }

    #[tokio::test]
    async fn failed_submission_does_not_consume_nonce() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path_contains("/relay/nonce/");
                then.status(200).json_body(serde_json::json!({ "nonce": 9 }));
            })
            .await;
        let reject = server
            .mock_async(|when, then| {
                when.method(POST).path("/relay");
                then.status(400)
                    .json_body(serde_json::json!({ "detail": "bad signature" }));
            })
            .await;

        let sender = sender_for(&server);
        let err = sender
            .send(&TARGET.to_string(), "0x01".into(), 100_000)
            .await
            .unwrap_err();
        assert!(matches!(err, VerityError::RelayRejected(_)));
        reject.delete_async().await;

        // The relay may legitimately issue nonce 9 again for the retry.
        server
            .mock_async(|when, then| {
                when.method(POST).path("/relay");
                then.status(200)
                    .json_body(serde_json::json!({ "ok": true, "tx_hash": "0x02" }));
            })
            .await;
        let receipt = sender
            .send(&TARGET.to_string(), "0x01".into(), 100_000)
            .await
            .unwrap();
        assert_eq!(receipt.tx_hash, "0x02");
    }
}
