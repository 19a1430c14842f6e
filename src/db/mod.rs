//! Database layer for audio-hub
//!
//! Handles SQLite persistence for user settings and job history.
//!
//! ## Submodules
//!
//! Methods on [`Database`] are organized by domain:
//! - [`migrations`] - Database lifecycle, schema migrations
//! - [`history`] - Append-only job history
//! - [`settings`] - Flat key/value settings document

use crate::types::{AudioFormat, HistoryEntry, JobId, Outcome};
use sqlx::{FromRow, sqlite::SqlitePool};
use std::path::PathBuf;

mod history;
mod migrations;
mod settings;

/// History record from database (raw from SQLite)
#[derive(Debug, Clone, FromRow)]
pub struct HistoryRow {
    /// Unique database ID
    pub id: i64,
    /// Job this record belongs to
    pub job_id: i64,
    /// Source URL
    pub source_url: String,
    /// Requested format extension
    pub format: String,
    /// Outcome string (`succeeded`, `failed`, `cancelled`)
    pub outcome: String,
    /// Output file for successful jobs
    pub file_path: Option<String>,
    /// Error message for failed jobs
    pub error_detail: Option<String>,
    /// Unix timestamp in milliseconds when the job reached its terminal phase
    pub recorded_at: i64,
}

impl From<HistoryRow> for HistoryEntry {
    fn from(row: HistoryRow) -> Self {
        use chrono::{TimeZone, Utc};

        HistoryEntry {
            job_id: JobId(row.job_id),
            source_url: row.source_url,
            format: row.format.parse().unwrap_or(AudioFormat::Mp3),
            outcome: Outcome::from_db(&row.outcome),
            timestamp: Utc
                .timestamp_millis_opt(row.recorded_at)
                .single()
                .unwrap_or_else(Utc::now),
            file_path: row.file_path.map(PathBuf::from),
            error_detail: row.error_detail,
        }
    }
}

/// Database handle for audio-hub
pub struct Database {
    pool: SqlitePool,
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
