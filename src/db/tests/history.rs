use crate::db::*;
use crate::types::{AudioFormat, HistoryEntry, JobId, Outcome};
use chrono::{Duration, TimeZone, Utc};
use std::path::PathBuf;
use tempfile::NamedTempFile;

fn entry(job_id: i64, outcome: Outcome, recorded_at_ms: i64) -> HistoryEntry {
    HistoryEntry {
        job_id: JobId(job_id),
        source_url: format!("https://media.example/watch?v={job_id}"),
        format: AudioFormat::Mp3,
        outcome,
        timestamp: Utc.timestamp_millis_opt(recorded_at_ms).unwrap(),
        file_path: (outcome == Outcome::Succeeded)
            .then(|| PathBuf::from(format!("/music/track-{job_id}.mp3"))),
        error_detail: (outcome == Outcome::Failed).then(|| "Private video".to_string()),
    }
}

#[tokio::test]
async fn test_insert_and_get_history() {
    let temp_file = NamedTempFile::new().unwrap();
    let db = Database::new(temp_file.path()).await.unwrap();

    let now = Utc::now().timestamp_millis();
    let original = HistoryEntry {
        format: AudioFormat::Flac,
        ..entry(7, Outcome::Succeeded, now)
    };

    let row_id = db.insert_history(&original).await.unwrap();
    assert!(row_id > 0);

    let retrieved = db.get_history_entry(JobId(7)).await.unwrap().unwrap();
    assert_eq!(retrieved, original);

    assert!(db.get_history_entry(JobId(8)).await.unwrap().is_none());

    db.close().await;
}

#[tokio::test]
async fn test_failed_entry_keeps_error_detail() {
    let temp_file = NamedTempFile::new().unwrap();
    let db = Database::new(temp_file.path()).await.unwrap();

    db.insert_history(&entry(3, Outcome::Failed, 1_000))
        .await
        .unwrap();

    let retrieved = db.get_history_entry(JobId(3)).await.unwrap().unwrap();
    assert_eq!(retrieved.outcome, Outcome::Failed);
    assert_eq!(retrieved.error_detail.as_deref(), Some("Private video"));
    assert_eq!(retrieved.file_path, None);

    db.close().await;
}

#[tokio::test]
async fn test_duplicate_job_id_is_rejected() {
    let temp_file = NamedTempFile::new().unwrap();
    let db = Database::new(temp_file.path()).await.unwrap();

    db.insert_history(&entry(1, Outcome::Succeeded, 1_000))
        .await
        .unwrap();
    let second = db.insert_history(&entry(1, Outcome::Failed, 2_000)).await;

    assert!(second.is_err(), "a job may only be recorded once");
    assert_eq!(db.count_history().await.unwrap(), 1);

    db.close().await;
}

#[tokio::test]
async fn test_query_history_most_recent_first_with_pagination() {
    let temp_file = NamedTempFile::new().unwrap();
    let db = Database::new(temp_file.path()).await.unwrap();

    let base = Utc::now() - Duration::hours(1);
    for i in 0..5 {
        let at = (base + Duration::seconds(i)).timestamp_millis();
        db.insert_history(&entry(i + 1, Outcome::Succeeded, at))
            .await
            .unwrap();
    }

    let page1 = db.query_history(2, 0).await.unwrap();
    let ids: Vec<i64> = page1.iter().map(|e| e.job_id.0).collect();
    assert_eq!(ids, vec![5, 4]);

    let page2 = db.query_history(2, 2).await.unwrap();
    let ids: Vec<i64> = page2.iter().map(|e| e.job_id.0).collect();
    assert_eq!(ids, vec![3, 2]);

    let page3 = db.query_history(2, 4).await.unwrap();
    let ids: Vec<i64> = page3.iter().map(|e| e.job_id.0).collect();
    assert_eq!(ids, vec![1]);

    assert_eq!(db.count_history().await.unwrap(), 5);

    db.close().await;
}

#[tokio::test]
async fn test_same_timestamp_orders_by_insertion() {
    let temp_file = NamedTempFile::new().unwrap();
    let db = Database::new(temp_file.path()).await.unwrap();

    for id in [10, 11, 12] {
        db.insert_history(&entry(id, Outcome::Cancelled, 5_000))
            .await
            .unwrap();
    }

    let all = db.query_history(10, 0).await.unwrap();
    let ids: Vec<i64> = all.iter().map(|e| e.job_id.0).collect();
    assert_eq!(ids, vec![12, 11, 10]);

    db.close().await;
}

#[tokio::test]
async fn test_max_history_job_id() {
    let temp_file = NamedTempFile::new().unwrap();
    let db = Database::new(temp_file.path()).await.unwrap();

    assert_eq!(db.max_history_job_id().await.unwrap(), 0);

    db.insert_history(&entry(4, Outcome::Succeeded, 1))
        .await
        .unwrap();
    db.insert_history(&entry(9, Outcome::Failed, 2))
        .await
        .unwrap();
    db.insert_history(&entry(6, Outcome::Cancelled, 3))
        .await
        .unwrap();

    assert_eq!(db.max_history_job_id().await.unwrap(), 9);

    db.close().await;
}
