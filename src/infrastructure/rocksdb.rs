use crate::domain::attempt::AttemptReceipt;
use crate::domain::ports::ReceiptStore;
use crate::error::{PaymentError, Result};
use async_trait::async_trait;
use rocksdb::{ColumnFamilyDescriptor, DB, Direction, IteratorMode, Options};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

/// Column Family holding attempt receipts.
pub const CF_RECEIPTS: &str = "receipts";

fn storage_error(context: &str, e: impl std::fmt::Display) -> PaymentError {
    PaymentError::Storage(format!("{}: {}", context, e))
}

/// A persistent receipt journal backed by RocksDB.
///
/// Keys are `link_id`, a NUL separator, the big-endian recording time in
/// nanoseconds and a per-process sequence number, so a prefix scan returns one
/// link's receipts in recording order.
///
/// This struct is thread-safe (`Clone` shares the underlying `Arc<DB>`).
#[derive(Clone)]
pub struct RocksDBReceiptStore {
    db: Arc<DB>,
    sequence: Arc<AtomicU32>,
}

impl RocksDBReceiptStore {
    /// Opens or creates a RocksDB instance at `path`, creating the receipts
    /// column family when missing.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_receipts = ColumnFamilyDescriptor::new(CF_RECEIPTS, Options::default());
        let db = DB::open_cf_descriptors(&opts, path, vec![cf_receipts])
            .map_err(|e| storage_error("Failed to open receipt database", e))?;

        Ok(Self {
            db: Arc::new(db),
            sequence: Arc::new(AtomicU32::new(0)),
        })
    }

    fn prefix(link_id: &str) -> Vec<u8> {
        let mut prefix = link_id.as_bytes().to_vec();
        prefix.push(0);
        prefix
    }

    fn key(&self, receipt: &AttemptReceipt) -> Vec<u8> {
        let mut key = Self::prefix(&receipt.link_id);
        let nanos = receipt.recorded_at.timestamp_nanos_opt().unwrap_or_default();
        key.extend_from_slice(&nanos.to_be_bytes());
        key.extend_from_slice(&self.sequence.fetch_add(1, Ordering::Relaxed).to_be_bytes());
        key
    }

    fn scan(&self, mode: IteratorMode<'_>, prefix: &[u8]) -> Result<Vec<AttemptReceipt>> {
        let cf = self
            .db
            .cf_handle(CF_RECEIPTS)
            .ok_or_else(|| PaymentError::Storage("Receipts column family not found".to_string()))?;

        let mut receipts = Vec::new();
        for item in self.db.iterator_cf(&cf, mode) {
            let (key, value) = item.map_err(|e| storage_error("RocksDB iteration error", e))?;
            if !key.starts_with(prefix) {
                break;
            }
            let receipt: AttemptReceipt = serde_json::from_slice(&value)
                .map_err(|e| storage_error("Failed to deserialize receipt", e))?;
            receipts.push(receipt);
        }
        Ok(receipts)
    }
}

#[async_trait]
impl ReceiptStore for RocksDBReceiptStore {
    async fn record(&self, receipt: AttemptReceipt) -> Result<()> {
        let cf = self
            .db
            .cf_handle(CF_RECEIPTS)
            .ok_or_else(|| PaymentError::Storage("Receipts column family not found".to_string()))?;

        let value = serde_json::to_vec(&receipt)?;
        self.db
            .put_cf(&cf, self.key(&receipt), value)
            .map_err(|e| storage_error("Failed to write receipt", e))
    }

    async fn get(&self, link_id: &str) -> Result<Vec<AttemptReceipt>> {
        let prefix = Self::prefix(link_id);
        self.scan(IteratorMode::From(&prefix, Direction::Forward), &prefix)
    }

    async fn all_receipts(&self) -> Result<Vec<AttemptReceipt>> {
        let mut all = self.scan(IteratorMode::Start, &[])?;
        all.sort_by_key(|r| r.recorded_at);
        Ok(all)
    }
}
