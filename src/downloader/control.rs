//! Job control - cancellation and state snapshots.

use crate::error::{Error, Result};
use crate::types::{JobId, JobState};
use tokio::sync::watch;

use super::MediaDownloader;
use super::job_task::JobOutcome;

impl MediaDownloader {
    /// Cancel a job
    ///
    /// A job still waiting in the queue is removed and finalized as
    /// Cancelled before this returns. A running job is signalled through its
    /// cancellation token; its worker stops the external tool, removes any
    /// partial files and finalizes the job as Cancelled.
    ///
    /// Cancelling a job that already reached a terminal phase does nothing.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if no job with this id was submitted.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// # use audio_hub::*;
    /// # async fn example(downloader: MediaDownloader, id: JobId) -> Result<()> {
    /// downloader.cancel(id).await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn cancel(&self, id: JobId) -> Result<()> {
        let Some(record) = self.job(id).await else {
            return match self.archived_state(id).await? {
                Some(_) => {
                    tracing::debug!(job_id = id.0, "Cancel ignored, job already finished");
                    Ok(())
                }
                None => Err(Error::NotFound(format!("job {id} not found"))),
            };
        };

        if record.is_terminal() {
            tracing::debug!(job_id = id.0, "Cancel ignored, job already finished");
            return Ok(());
        }

        record.cancel.cancel();

        if self.remove_from_queue(id).await {
            tracing::info!(job_id = id.0, "Cancelled queued job");
            self.finalize_job(&record, JobOutcome::Cancelled).await;
        } else {
            tracing::info!(job_id = id.0, "Signalled running job to cancel");
        }

        Ok(())
    }

    /// Current state of a job
    ///
    /// Finished jobs that were pruned from memory are answered from the
    /// history ledger.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if no job with this id was submitted.
    pub async fn progress(&self, id: JobId) -> Result<JobState> {
        if let Some(record) = self.job(id).await {
            return Ok(record.state.borrow().clone());
        }
        self.archived_state(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("job {id} not found")))
    }

    /// Subscribe to state changes of a single job
    ///
    /// The receiver starts with the current state marked as seen; every phase
    /// change and whole-percent progress step after that wakes `changed()`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if no job with this id was submitted.
    pub async fn watch_job(&self, id: JobId) -> Result<watch::Receiver<JobState>> {
        if let Some(record) = self.job(id).await {
            return Ok(record.state.subscribe());
        }
        // A pruned job never changes again; its receiver holds the final state
        let state = self
            .archived_state(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("job {id} not found")))?;
        let (_tx, rx) = watch::channel(state);
        Ok(rx)
    }

    /// Snapshots of unfinished jobs and the most recently finished ones,
    /// oldest first
    ///
    /// At most `retained_jobs` finished jobs are included; older ones are in
    /// the history ledger.
    pub async fn jobs(&self) -> Vec<JobState> {
        let jobs = self.queue_state.jobs.read().await;
        let mut states: Vec<JobState> = jobs
            .values()
            .map(|record| record.state.borrow().clone())
            .collect();
        states.sort_by_key(|state| state.id);
        states
    }
}
