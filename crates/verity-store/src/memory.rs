//! In-memory store implementations.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Mutex;

use verity_types::normalize_text;

use crate::{ActionLog, ActionRecord, SessionMarkers};

/// In-memory session marker set.
#[derive(Default)]
pub struct MemoryMarkers {
    texts: Mutex<HashSet<String>>,
}

impl MemoryMarkers {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionMarkers for MemoryMarkers {
    async fn mark(&self, text: &str) {
        let mut texts = self.texts.lock().unwrap();
        texts.insert(normalize_text(text));
    }

    async fn contains(&self, text: &str) -> bool {
        let texts = self.texts.lock().unwrap();
        texts.contains(&normalize_text(text))
    }

    async fn clear(&self) {
        let mut texts = self.texts.lock().unwrap();
        texts.clear();
    }
}

/// In-memory action history.
#[derive(Default)]
pub struct MemoryActionLog {
    records: Mutex<Vec<ActionRecord>>,
}

impl MemoryActionLog {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ActionLog for MemoryActionLog {
    async fn record(&self, record: ActionRecord) {
        let mut records = self.records.lock().unwrap();
        records.push(record);
    }

    async fn list(&self) -> Vec<ActionRecord> {
        let records = self.records.lock().unwrap();
        records.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ActionKind;

    #[tokio::test]
    async fn markers_key_on_normalized_text() {
        let markers = MemoryMarkers::new();
        markers.mark("  Water boils  at 100°C ").await;
        assert!(markers.contains("Water boils at 100°C").await);
        assert!(!markers.contains("Water freezes at 0°C").await);
    }

    #[tokio::test]
    async fn clear_resets_between_cases() {
        let markers = MemoryMarkers::new();
        markers.mark("a claim").await;
        markers.clear().await;
        assert!(!markers.contains("a claim").await);
    }

    #[tokio::test]
    async fn action_log_preserves_order() {
        let log = MemoryActionLog::new();
        log.record(ActionRecord {
            kind: ActionKind::CreateClaim,
            subject: "a claim".into(),
            tx_hash: Some("0x01".into()),
            error: None,
            created_at: 1,
        })
        .await;
        log.record(ActionRecord {
            kind: ActionKind::Stake,
            subject: "42".into(),
            tx_hash: None,
            error: Some("relay rejected request: stale nonce".into()),
            created_at: 2,
        })
        .await;

        let records = log.list().await;
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].kind, ActionKind::CreateClaim);
        assert!(records[1].error.is_some());
    }
}
