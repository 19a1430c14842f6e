//! History ledger storage.

use crate::types::{HistoryEntry, JobId};
use crate::{Error, Result};

use super::{Database, HistoryRow};

impl Database {
    /// Insert a terminal job into history
    ///
    /// `job_id` is unique; recording the same job twice fails.
    pub async fn insert_history(&self, entry: &HistoryEntry) -> Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO history (
                job_id, source_url, format, outcome, file_path,
                error_detail, recorded_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(entry.job_id)
        .bind(&entry.source_url)
        .bind(entry.format.extension())
        .bind(entry.outcome.as_str())
        .bind(
            entry
                .file_path
                .as_ref()
                .and_then(|p| p.to_str().map(String::from)),
        )
        .bind(&entry.error_detail)
        .bind(entry.timestamp.timestamp_millis())
        .execute(&self.pool)
        .await
        .map_err(Error::Sqlx)?;

        Ok(result.last_insert_rowid())
    }

    /// Query history with pagination
    ///
    /// Returns history entries ordered by terminal time (most recent first).
    /// Entries recorded in the same millisecond come back in reverse insertion order.
    pub async fn query_history(&self, limit: usize, offset: usize) -> Result<Vec<HistoryEntry>> {
        let rows = sqlx::query_as::<_, HistoryRow>(
            r#"
            SELECT id, job_id, source_url, format, outcome, file_path,
                   error_detail, recorded_at
            FROM history
            ORDER BY recorded_at DESC, id DESC
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(limit as i64)
        .bind(offset as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Sqlx)?;

        Ok(rows.into_iter().map(HistoryEntry::from).collect())
    }

    /// Count history entries
    pub async fn count_history(&self) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM history")
            .fetch_one(&self.pool)
            .await
            .map_err(Error::Sqlx)?;

        Ok(count)
    }

    /// Get the history entry recorded for a job
    pub async fn get_history_entry(&self, job_id: JobId) -> Result<Option<HistoryEntry>> {
        let row = sqlx::query_as::<_, HistoryRow>(
            r#"
            SELECT id, job_id, source_url, format, outcome, file_path,
                   error_detail, recorded_at
            FROM history
            WHERE job_id = ?
            "#,
        )
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Sqlx)?;

        Ok(row.map(HistoryEntry::from))
    }

    /// Highest job id ever recorded (0 when history is empty)
    ///
    /// Used to seed the id counter so ids stay unique across restarts.
    pub async fn max_history_job_id(&self) -> Result<i64> {
        let max: Option<i64> = sqlx::query_scalar("SELECT MAX(job_id) FROM history")
            .fetch_one(&self.pool)
            .await
            .map_err(Error::Sqlx)?;

        Ok(max.unwrap_or(0))
    }
}
