//! Append-only ledger of terminal jobs

use crate::db::Database;
use crate::error::Result;
use crate::types::{HistoryEntry, JobId};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Append-only history of completed, failed and cancelled jobs
///
/// Entries are never edited or deleted. Appends are serialized so
/// concurrent workers finishing at the same moment land in a stable order.
#[derive(Clone)]
pub struct HistoryLedger {
    db: Arc<Database>,
    append_lock: Arc<Mutex<()>>,
}

impl HistoryLedger {
    /// Ledger backed by `db`
    pub fn new(db: Arc<Database>) -> Self {
        Self {
            db,
            append_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Record a terminal job
    pub async fn append(&self, entry: &HistoryEntry) -> Result<()> {
        let _guard = self.append_lock.lock().await;
        self.db.insert_history(entry).await?;
        tracing::debug!(
            job_id = entry.job_id.0,
            outcome = entry.outcome.as_str(),
            "History entry recorded"
        );
        Ok(())
    }

    /// Most recent entries first
    pub async fn query(&self, limit: usize, offset: usize) -> Result<Vec<HistoryEntry>> {
        self.db.query_history(limit, offset).await
    }

    /// Total number of entries
    pub async fn count(&self) -> Result<i64> {
        self.db.count_history().await
    }

    /// Entry recorded for `job_id`, if the job has finished
    pub async fn get(&self, job_id: JobId) -> Result<Option<HistoryEntry>> {
        self.db.get_history_entry(job_id).await
    }

    /// Highest job id present in the ledger (0 if empty)
    pub(crate) async fn max_job_id(&self) -> Result<i64> {
        self.db.max_history_job_id().await
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AudioFormat, Outcome};
    use chrono::Utc;
    use tempfile::NamedTempFile;

    fn entry(id: i64) -> HistoryEntry {
        HistoryEntry {
            job_id: JobId(id),
            source_url: "https://media.example/a".to_string(),
            format: AudioFormat::M4a,
            outcome: Outcome::Cancelled,
            timestamp: Utc::now(),
            file_path: None,
            error_detail: None,
        }
    }

    #[tokio::test]
    async fn concurrent_appends_all_land() {
        let temp_file = NamedTempFile::new().unwrap();
        let db = Arc::new(Database::new(temp_file.path()).await.unwrap());
        let ledger = HistoryLedger::new(db);

        let mut handles = Vec::new();
        for id in 1..=20 {
            let ledger = ledger.clone();
            handles.push(tokio::spawn(async move { ledger.append(&entry(id)).await }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(ledger.count().await.unwrap(), 20);
        assert_eq!(ledger.max_job_id().await.unwrap(), 20);
        assert_eq!(ledger.query(100, 0).await.unwrap().len(), 20);
    }

    #[tokio::test]
    async fn get_returns_recorded_entry() {
        let temp_file = NamedTempFile::new().unwrap();
        let db = Arc::new(Database::new(temp_file.path()).await.unwrap());
        let ledger = HistoryLedger::new(db);

        ledger.append(&entry(5)).await.unwrap();

        let found = ledger.get(JobId(5)).await.unwrap().unwrap();
        assert_eq!(found.outcome, Outcome::Cancelled);
        assert_eq!(found.format, AudioFormat::M4a);
        assert!(ledger.get(JobId(6)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn appending_same_job_twice_fails() {
        let temp_file = NamedTempFile::new().unwrap();
        let db = Arc::new(Database::new(temp_file.path()).await.unwrap());
        let ledger = HistoryLedger::new(db);

        ledger.append(&entry(1)).await.unwrap();
        assert!(ledger.append(&entry(1)).await.is_err());
        assert_eq!(ledger.count().await.unwrap(), 1);
    }
}
