use time::OffsetDateTime;
use uuid::Uuid;

use crate::corpus::{FinalizedBatch, PartitionOutcome};

/// One finished corpus build as kept in the ledger.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchRecord {
    pub id: Uuid,
    pub recorded_at: OffsetDateTime,
    pub files_seen: u64,
    pub files_ingested: u64,
    pub duplicates: u64,
    pub errors: u64,
    pub examples: u64,
    pub boxes: u64,
    pub train: u64,
    pub val: u64,
}

impl BatchRecord {
    pub fn new(batch: &FinalizedBatch, outcome: PartitionOutcome) -> Self {
        let summary = batch.summary();
        Self {
            id: batch.id(),
            recorded_at: OffsetDateTime::now_utc(),
            files_seen: summary.files_seen as u64,
            files_ingested: summary.files_ingested as u64,
            duplicates: summary.duplicates as u64,
            errors: summary.error_count() as u64,
            examples: batch.len() as u64,
            boxes: batch.examples().iter().map(|e| e.boxes.len() as u64).sum(),
            train: outcome.train as u64,
            val: outcome.val as u64,
        }
    }
}

pub trait BatchRepository {
    fn record_batch(&self, record: &BatchRecord) -> impl Future<Output = anyhow::Result<()>>;
    /// Most recent first.
    fn recent_batches(&self, limit: u32) -> impl Future<Output = anyhow::Result<Vec<BatchRecord>>>;
}
