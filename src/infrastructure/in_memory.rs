use crate::domain::attempt::AttemptReceipt;
use crate::domain::ports::ReceiptStore;
use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// A thread-safe in-memory receipt journal.
///
/// Receipts are grouped per payment link in recording order. Nothing survives
/// the process; use the RocksDB store when support follow-up matters.
#[derive(Default, Clone)]
pub struct InMemoryReceiptStore {
    receipts: Arc<RwLock<HashMap<String, Vec<AttemptReceipt>>>>,
}

impl InMemoryReceiptStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ReceiptStore for InMemoryReceiptStore {
    async fn record(&self, receipt: AttemptReceipt) -> Result<()> {
        let mut receipts = self.receipts.write().await;
        receipts
            .entry(receipt.link_id.clone())
            .or_default()
            .push(receipt);
        Ok(())
    }

    async fn get(&self, link_id: &str) -> Result<Vec<AttemptReceipt>> {
        let receipts = self.receipts.read().await;
        Ok(receipts.get(link_id).cloned().unwrap_or_default())
    }

    async fn all_receipts(&self) -> Result<Vec<AttemptReceipt>> {
        let receipts = self.receipts.read().await;
        let mut all: Vec<AttemptReceipt> = receipts.values().flatten().cloned().collect();
        all.sort_by_key(|r| r.recorded_at);
        Ok(all)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn receipt(link_id: &str, outcome: &str, offset_secs: i64) -> AttemptReceipt {
        AttemptReceipt {
            link_id: link_id.to_string(),
            outcome: outcome.to_string(),
            error_kind: None,
            signature: None,
            amount_units: Some(1_000),
            recorded_at: Utc::now() + Duration::seconds(offset_secs),
            message: String::new(),
        }
    }

    #[tokio::test]
    async fn test_in_memory_receipt_store() {
        let store = InMemoryReceiptStore::new();
        store.record(receipt("abc", "failed", 0)).await.unwrap();
        store.record(receipt("abc", "succeeded", 1)).await.unwrap();

        let for_link = store.get("abc").await.unwrap();
        assert_eq!(for_link.len(), 2);
        assert_eq!(for_link[1].outcome, "succeeded");

        assert!(store.get("missing").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_all_receipts_in_time_order() {
        let store = InMemoryReceiptStore::new();
        store.record(receipt("b", "failed", 5)).await.unwrap();
        store.record(receipt("a", "succeeded", 1)).await.unwrap();

        let all = store.all_receipts().await.unwrap();
        let links: Vec<&str> = all.iter().map(|r| r.link_id.as_str()).collect();
        assert_eq!(links, vec!["a", "b"]);
    }
}
