//! Shutdown coordination.

use crate::error::Result;
use crate::types::Event;
use futures::future::join_all;
use std::time::Duration;

use super::MediaDownloader;
use super::job_task::JobOutcome;

/// Interval between checks while waiting for workers to finish
const ACTIVE_POLL_INTERVAL: Duration = Duration::from_millis(100);

impl MediaDownloader {
    /// Gracefully shut down the orchestrator
    ///
    /// This method performs a graceful shutdown sequence:
    /// 1. Stops accepting new jobs
    /// 2. Cancels every running job through its cancellation token
    /// 3. Finalizes every queued job as Cancelled
    /// 4. Waits for running jobs to reach a terminal phase, bounded by
    ///    `Config::shutdown_timeout`
    /// 5. Stops the queue processor and flushes pending settings
    /// 6. Emits [`Event::Shutdown`]
    ///
    /// # Errors
    ///
    /// Returns an error if the final settings write fails. Every other step
    /// runs regardless; problems are logged.
    pub async fn shutdown(&self) -> Result<()> {
        tracing::info!("Initiating graceful shutdown");

        // 1. Stop accepting new jobs
        self.queue_state
            .accepting_new
            .store(false, std::sync::atomic::Ordering::SeqCst);
        tracing::info!("Stopped accepting new jobs");

        // 2-3. Signal running jobs, finalize queued ones
        self.cancel_pending().await;

        // 4. Wait for running jobs with timeout
        let shutdown_timeout = self.config.shutdown_timeout;
        match tokio::time::timeout(shutdown_timeout, self.wait_for_active_jobs()).await {
            Ok(()) => tracing::info!("All running jobs finished"),
            Err(_) => tracing::warn!(
                timeout_secs = shutdown_timeout.as_secs(),
                "Timeout waiting for running jobs, proceeding with shutdown"
            ),
        }

        // 5. Stop the queue processor and persist settings
        self.queue_state.shutdown.cancel();
        // Catch submissions that raced the accepting_new flag
        self.cancel_pending().await;
        let flushed = self.settings.close().await;
        if let Err(e) = &flushed {
            tracing::error!(error = %e, "Failed to persist settings during shutdown");
        }

        // 6. Emit shutdown event
        self.emit_event(Event::Shutdown);

        tracing::info!("Graceful shutdown complete");
        flushed
    }

    /// Cancel every unfinished job and finalize the ones still queued
    async fn cancel_pending(&self) {
        self.cancel_all_tokens().await;

        // Queued jobs never reach a worker
        let queued = self.drain_queue().await;
        if queued.is_empty() {
            return;
        }

        let mut records = Vec::with_capacity(queued.len());
        for id in &queued {
            if let Some(record) = self.job(*id).await {
                records.push(record);
            }
        }
        join_all(
            records
                .iter()
                .map(|record| self.finalize_job(record, JobOutcome::Cancelled)),
        )
        .await;
        tracing::info!(count = records.len(), "Cancelled queued jobs");
    }

    /// Cancel the token of every job that has not finished
    async fn cancel_all_tokens(&self) {
        let jobs = self.queue_state.jobs.read().await;
        let mut signalled = 0usize;
        for record in jobs.values().filter(|record| !record.is_terminal()) {
            record.cancel.cancel();
            signalled += 1;
        }
        tracing::debug!(signalled, "Signalled cancellation to unfinished jobs");
    }

    /// Wait until no job holds a worker slot
    async fn wait_for_active_jobs(&self) {
        loop {
            let active_count = self.queue_state.active_jobs.lock().await.len();
            if active_count == 0 {
                return;
            }

            tracing::debug!(active_count, "Waiting for running jobs to finish");
            tokio::time::sleep(ACTIVE_POLL_INTERVAL).await;
        }
    }
}
