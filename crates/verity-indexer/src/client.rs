//! HTTP client for the indexer service.
//!
//! Endpoints:
//! - GET /claim-status/{text}[?user=address]
//! - GET /claims/{post_id}/edges

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;
use verity_types::{Address, ClaimSnapshot, Result, VerityError};

use crate::PollConfig;

/// A directed link between two committed claims.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    pub claim_post_id: u64,
    pub link_post_id: u64,
    pub is_challenge: bool,
    #[serde(default)]
    pub claim_text: Option<String>,
    #[serde(default)]
    pub claim_support: Option<f64>,
    #[serde(default)]
    pub claim_challenge: Option<f64>,
}

/// Incoming and outgoing links for one claim.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EdgeSet {
    #[serde(default)]
    pub incoming: Vec<Edge>,
    #[serde(default)]
    pub outgoing: Vec<Edge>,
}

/// Indexer client.
pub struct IndexerClient {
    base_url: String,
    client: reqwest::Client,
    timeout: Duration,
}

impl IndexerClient {
    pub fn new(base_url: &str, timeout_ms: Option<u64>) -> Self {
        let timeout_ms = timeout_ms.unwrap_or(20_000);
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::builder()
                .timeout(Duration::from_millis(timeout_ms))
                .build()
                .unwrap_or_default(),
            timeout: Duration::from_millis(timeout_ms),
        }
    }

    /// Fetch the authoritative state of a claim by its text. `user` adds
    /// the caller's own stake positions to the snapshot.
    ///
    /// GET /claim-status/{text}[?user=address]
    pub async fn claim_status(
        &self,
        text: &str,
        user: Option<&Address>,
    ) -> Result<ClaimSnapshot> {
        let mut url = reqwest::Url::parse(&format!("{}/", self.base_url))
            .map_err(|e| VerityError::IndexerUnavailable(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| VerityError::IndexerUnavailable("bad base url".into()))?
            .pop_if_empty()
            .push("claim-status")
            .push(text);
        if let Some(user) = user {
            url.query_pairs_mut().append_pair("user", user);
        }

        let resp = self
            .client
            .get(url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| VerityError::IndexerUnavailable(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(VerityError::IndexerUnavailable(format!(
                "indexer returned status {}",
                resp.status()
            )));
        }

        resp.json()
            .await
            .map_err(|e| VerityError::IndexerUnavailable(format!("bad status payload: {}", e)))
    }

    /// Fetch the link graph around a committed claim.
    ///
    /// GET /claims/{post_id}/edges
    pub async fn edges(&self, post_id: u64) -> Result<EdgeSet> {
        let url = format!("{}/claims/{}/edges", self.base_url, post_id);

        let resp = self
            .client
            .get(&url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| VerityError::IndexerUnavailable(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(VerityError::IndexerUnavailable(format!(
                "indexer returned status {}",
                resp.status()
            )));
        }

        resp.json()
            .await
            .map_err(|e| VerityError::IndexerUnavailable(format!("bad edges payload: {}", e)))
    }

    /// Poll until the indexer reports a post id for this text, within the
    /// configured attempt budget. Gives up with `PollTimeout` rather than
    /// polling indefinitely; the caller re-checks on its next refresh.
    pub async fn wait_for_commit(
        &self,
        text: &str,
        user: Option<&Address>,
        poll: &PollConfig,
    ) -> Result<ClaimSnapshot> {
        for attempt in 0..poll.attempts {
            tokio::time::sleep(Duration::from_millis(poll.interval_ms)).await;
            match self.claim_status(text, user).await {
                Ok(snap) if snap.post_id().is_some() => {
                    debug!(attempt, post_id = snap.post_id(), "claim observed on-chain");
                    return Ok(snap);
                }
                Ok(_) => {
                    debug!(attempt, "claim not yet indexed");
                }
                Err(e) => {
                    // Transient indexer hiccups spend an attempt; the
                    // budget still bounds total work.
                    debug!(attempt, error = %e, "status poll failed");
                }
            }
        }
        Err(VerityError::PollTimeout(poll.attempts))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    fn fast_poll(attempts: u32) -> PollConfig {
        PollConfig {
            attempts,
            interval_ms: 5,
        }
    }

    #[tokio::test]
    async fn fetches_status_with_encoded_text_and_user() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/claim-status/Water%20boils%20at%20100%C2%B0C")
                    .query_param("user", "0xabc");
                then.status(200).json_body(serde_json::json!({
                    "on_chain": { "post_id": 42, "creator": "0xdef" },
                    "stake_support": 3.5,
                    "stake_challenge": 1.0,
                    "verity_score": 44.0,
                    "user_support": 0.5,
                    "user_challenge": 0.0
                }));
            })
            .await;

        let client = IndexerClient::new(&server.base_url(), None);
        let snap = client
            .claim_status("Water boils at 100°C", Some(&"0xabc".to_string()))
            .await
            .unwrap();
        assert_eq!(snap.post_id(), Some(42));
        assert_eq!(snap.user_support, 0.5);
    }

    #[tokio::test]
    async fn uncommitted_claim_has_no_post_id() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path_contains("/claim-status/");
                then.status(200).json_body(serde_json::json!({ "on_chain": null }));
            })
            .await;

        let client = IndexerClient::new(&server.base_url(), None);
        let snap = client.claim_status("new claim", None).await.unwrap();
        assert_eq!(snap.post_id(), None);
    }

    #[tokio::test]
    async fn fetches_edges() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/claims/42/edges");
                then.status(200).json_body(serde_json::json!({
                    "incoming": [
                        { "claim_post_id": 7, "link_post_id": 99, "is_challenge": true }
                    ],
                    "outgoing": []
                }));
            })
            .await;

        let client = IndexerClient::new(&server.base_url(), None);
        let edges = client.edges(42).await.unwrap();
        assert_eq!(edges.incoming.len(), 1);
        assert!(edges.incoming[0].is_challenge);
        assert!(edges.outgoing.is_empty());
    }

    #[tokio::test]
    async fn wait_for_commit_stops_when_post_id_appears() {
        let server = MockServer::start_async().await;
        let pending = server
            .mock_async(|when, then| {
                when.method(GET).path_contains("/claim-status/");
                then.status(200).json_body(serde_json::json!({ "on_chain": null }));
            })
            .await;

        let client = IndexerClient::new(&server.base_url(), None);
        let handle = tokio::spawn(async move {
            client
                .wait_for_commit("pending claim", None, &fast_poll(20))
                .await
        });

        // A few uncommitted polls, then the indexer catches up.
        tokio::time::sleep(Duration::from_millis(25)).await;
        pending.delete_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path_contains("/claim-status/");
                then.status(200).json_body(serde_json::json!({
                    "on_chain": { "post_id": 7, "creator": "0x01" }
                }));
            })
            .await;

        let snap = handle.await.unwrap().unwrap();
        assert_eq!(snap.post_id(), Some(7));
    }

    #[tokio::test]
    async fn wait_for_commit_exhausts_budget() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET).path_contains("/claim-status/");
                then.status(200).json_body(serde_json::json!({ "on_chain": null }));
            })
            .await;

        let client = IndexerClient::new(&server.base_url(), None);
        let err = client
            .wait_for_commit("slow claim", None, &fast_poll(3))
            .await
            .unwrap_err();
        assert!(matches!(err, VerityError::PollTimeout(3)));
        mock.assert_hits_async(3).await;
    }
}
