mod batch;
mod ocr;
mod partition;
mod state;

use std::{collections::HashMap, path::Path, sync::Arc};

use sqlx::Connection;
use state::LedgerState;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};
use tracing::debug;
use uuid::Uuid;

use crate::detection::ocr::PageTextReport;
use crate::models::{PageKey, Partition};

pub use batch::{BatchRecord, BatchRepository};
pub use ocr::OcrRepository;
pub use partition::PartitionRepository;

/// SQLite ledger that outlives individual batches: partition assignments,
/// build history and OCR page reports.
#[derive(Debug, Clone)]
pub struct LedgerDb {
    state: Arc<LedgerState>,
}

impl LedgerDb {
    pub async fn open<P: AsRef<Path>>(db_file: P) -> anyhow::Result<Self> {
        Ok(Self {
            state: Arc::new(LedgerState::new(db_file).await?),
        })
    }

    /// Checkpoint and close. The ledger is unusable afterwards.
    pub async fn close(&self) -> anyhow::Result<()> {
        self.state.close().await
    }
}

fn page_key(project_id: String, page_num: i64) -> anyhow::Result<PageKey> {
    let page_num = u32::try_from(page_num)
        .map_err(|_| anyhow::anyhow!("Stored page number out of range: {}", page_num))?;
    Ok(PageKey::new(project_id, page_num))
}

fn count(value: i64) -> anyhow::Result<u64> {
    u64::try_from(value).map_err(|_| anyhow::anyhow!("Negative count in ledger: {}", value))
}

impl PartitionRepository for LedgerDb {
    async fn load_partitions(&self) -> anyhow::Result<HashMap<PageKey, Partition>> {
        let mut conn = self.state.conn().await?;
        sqlx::query_as::<_, (String, i64, String)>(
            r#"SELECT project_id, page_num, partition FROM partition_assignment"#,
        )
        .fetch_all(&mut **conn)
        .await?
        .into_iter()
        .map(|(project_id, page_num, partition)| Ok((page_key(project_id, page_num)?, partition.parse()?)))
        .collect()
    }

    async fn save_partitions(&self, assignments: &[(PageKey, Partition)]) -> anyhow::Result<()> {
        let mut conn = self.state.conn().await?;
        let mut tx = conn.begin().await?;
        for (key, partition) in assignments {
            sqlx::query(
                r#"INSERT INTO partition_assignment (project_id, page_num, partition) VALUES ($1, $2, $3)
                ON CONFLICT (project_id, page_num) DO UPDATE SET partition = EXCLUDED.partition"#,
            )
            .bind(&key.project_id)
            .bind(i64::from(key.page_num))
            .bind(partition.as_str())
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        debug!(count = assignments.len(), "partition assignments saved");
        Ok(())
    }
}

type BatchRow = (String, String, i64, i64, i64, i64, i64, i64, i64, i64);

impl BatchRepository for LedgerDb {
    async fn record_batch(&self, record: &BatchRecord) -> anyhow::Result<()> {
        let mut conn = self.state.conn().await?;
        sqlx::query(
            r#"INSERT INTO batch
                (id, recorded_at, files_seen, files_ingested, duplicates, errors, examples, boxes, train, val)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)"#,
        )
        .bind(record.id.to_string())
        .bind(record.recorded_at.format(&Rfc3339)?)
        .bind(record.files_seen as i64)
        .bind(record.files_ingested as i64)
        .bind(record.duplicates as i64)
        .bind(record.errors as i64)
        .bind(record.examples as i64)
        .bind(record.boxes as i64)
        .bind(record.train as i64)
        .bind(record.val as i64)
        .execute(&mut **conn)
        .await?;
        Ok(())
    }

    async fn recent_batches(&self, limit: u32) -> anyhow::Result<Vec<BatchRecord>> {
        let mut conn = self.state.conn().await?;
        sqlx::query_as::<_, BatchRow>(
            r#"SELECT id, recorded_at, files_seen, files_ingested, duplicates, errors, examples, boxes, train, val
            FROM batch ORDER BY rowid DESC LIMIT $1"#,
        )
        .bind(i64::from(limit))
        .fetch_all(&mut **conn)
        .await?
        .into_iter()
        .map(|(id, recorded_at, files_seen, files_ingested, duplicates, errors, examples, boxes, train, val)| {
            Ok(BatchRecord {
                id: Uuid::parse_str(&id)?,
                recorded_at: OffsetDateTime::parse(&recorded_at, &Rfc3339)?,
                files_seen: count(files_seen)?,
                files_ingested: count(files_ingested)?,
                duplicates: count(duplicates)?,
                errors: count(errors)?,
                examples: count(examples)?,
                boxes: count(boxes)?,
                train: count(train)?,
                val: count(val)?,
            })
        })
        .collect()
    }
}

impl OcrRepository for LedgerDb {
    async fn save_page_report(&self, key: &PageKey, report: &PageTextReport) -> anyhow::Result<()> {
        let mut conn = self.state.conn().await?;
        let json = serde_json::to_string(report)?;
        sqlx::query(
            r#"INSERT INTO ocr_page_report (project_id, page_num, report, updated_at) VALUES ($1, $2, $3, $4)
            ON CONFLICT (project_id, page_num) DO UPDATE SET report = EXCLUDED.report, updated_at = EXCLUDED.updated_at"#,
        )
        .bind(&key.project_id)
        .bind(i64::from(key.page_num))
        .bind(json)
        .bind(OffsetDateTime::now_utc().format(&Rfc3339)?)
        .execute(&mut **conn)
        .await?;
        Ok(())
    }

    async fn page_reports(&self) -> anyhow::Result<Vec<(PageKey, PageTextReport)>> {
        let mut conn = self.state.conn().await?;
        sqlx::query_as::<_, (String, i64, String)>(
            r#"SELECT project_id, page_num, report FROM ocr_page_report ORDER BY project_id, page_num"#,
        )
        .fetch_all(&mut **conn)
        .await?
        .into_iter()
        .map(|(project_id, page_num, report)| Ok((page_key(project_id, page_num)?, serde_json::from_str(&report)?)))
        .collect()
    }
}
