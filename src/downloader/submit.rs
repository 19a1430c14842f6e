//! Job submission.

use crate::error::{Error, Result};
use crate::types::{Event, JobId, JobRequest, NewJob};
use crate::utils::validate_source_url;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use super::{JobRecord, MediaDownloader};

impl MediaDownloader {
    /// Submit a URL for fetching and conversion
    ///
    /// Validates the URL, fills in the format and output directory from the
    /// current settings when the request leaves them out, and queues the job.
    /// Returns immediately; progress and the outcome are reported through
    /// [`progress`](Self::progress), [`watch_job`](Self::watch_job) and events.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidRequest`] if the URL is empty or malformed
    /// - [`Error::ShuttingDown`] once [`shutdown`](Self::shutdown) has begun
    ///
    /// # Examples
    ///
    /// ```no_run
    /// # use audio_hub::*;
    /// # async fn example(downloader: MediaDownloader) -> Result<()> {
    /// let id = downloader
    ///     .submit(NewJob::new("https://media.example/watch?v=abc").with_format(AudioFormat::Flac))
    ///     .await?;
    /// println!("queued job {id}");
    /// # Ok(())
    /// # }
    /// ```
    pub async fn submit(&self, job: NewJob) -> Result<JobId> {
        if !self.queue_state.accepting_new.load(Ordering::SeqCst) {
            return Err(Error::ShuttingDown);
        }

        let url = validate_source_url(&job.url)?;

        let settings = self.settings.get().await;
        let id = JobId(self.queue_state.next_id.fetch_add(1, Ordering::SeqCst));
        let request = JobRequest {
            id,
            source_url: url.to_string(),
            requested_format: job.format.unwrap_or(settings.preferred_format),
            output_directory: job
                .output_directory
                .unwrap_or_else(|| settings.output_directory.clone()),
            created_at: chrono::Utc::now(),
        };

        tracing::info!(
            job_id = id.0,
            url = %request.source_url,
            format = %request.requested_format,
            output_directory = %request.output_directory.display(),
            "Job submitted"
        );

        let event = Event::JobQueued {
            id,
            url: request.source_url.clone(),
            format: request.requested_format,
        };

        self.queue_state
            .jobs
            .write()
            .await
            .insert(id, Arc::new(JobRecord::new(request)));
        self.emit_event(event);
        self.enqueue(id).await;

        Ok(id)
    }
}
