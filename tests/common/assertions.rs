//! Custom test assertions for integration tests

use audio_hub::{JobId, JobState, MediaDownloader};
use std::time::Duration;

/// Wait for a job to reach a terminal phase
///
/// Returns the terminal state, or None on timeout.
pub async fn wait_for_terminal(
    downloader: &MediaDownloader,
    id: JobId,
    timeout: Duration,
) -> Option<JobState> {
    let mut rx = downloader.watch_job(id).await.ok()?;

    let result = tokio::time::timeout(timeout, async {
        rx.wait_for(|state| state.phase.is_terminal())
            .await
            .map(|state| state.clone())
            .ok()
    })
    .await;

    result.ok().flatten()
}

/// Poll until the history ledger holds `expected` entries
pub async fn wait_for_history(downloader: &MediaDownloader, expected: i64, timeout: Duration) -> bool {
    tokio::time::timeout(timeout, async {
        loop {
            if let Ok(count) = downloader.history_ledger().count().await
                && count >= expected
            {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .is_ok()
}
