//! Runtime settings updates: preferences and worker pool size.

use crate::error::Result;
use crate::settings::{Settings, SettingsUpdate};
use crate::types::Event;
use std::sync::atomic::Ordering;

use super::MediaDownloader;

impl MediaDownloader {
    /// Current user settings
    pub async fn settings(&self) -> Settings {
        self.settings.get().await
    }

    /// Validate and apply a settings update
    ///
    /// The new values take effect immediately for jobs that start afterwards
    /// and are written to the database once the debounce window passes.
    /// Changing `maxConcurrentJobs` resizes the worker pool without touching
    /// running jobs: growing starts queued jobs right away, shrinking takes
    /// effect as running jobs finish. `Event::SettingsChanged` is only emitted
    /// when the update changed something.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Config`] naming the offending key if the
    /// resulting settings are invalid. Nothing is applied in that case.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// # use audio_hub::*;
    /// # async fn example(downloader: MediaDownloader) -> Result<()> {
    /// let settings = downloader
    ///     .update_settings(&SettingsUpdate {
    ///         max_concurrent_jobs: Some(4),
    ///         preferred_format: Some(AudioFormat::Flac),
    ///         ..Default::default()
    ///     })
    ///     .await?;
    /// assert_eq!(settings.max_concurrent_jobs, 4);
    /// # Ok(())
    /// # }
    /// ```
    pub async fn update_settings(&self, update: &SettingsUpdate) -> Result<Settings> {
        // Resize under the settings lock so concurrent updates leave the pool
        // at the size of whichever update was applied last
        let (settings, changed) = self
            .settings
            .update_with(update, |next| self.resize_pool(next.max_concurrent_jobs))
            .await?;

        if !changed {
            tracing::debug!("Settings update changed nothing");
            return Ok(settings);
        }

        self.emit_event(Event::SettingsChanged);

        tracing::info!(
            max_concurrent_jobs = settings.max_concurrent_jobs,
            max_retries = settings.max_retries,
            format = %settings.preferred_format,
            "Settings changed"
        );

        Ok(settings)
    }

    /// Tune the worker semaphore to `size` permits
    ///
    /// Permits held by running jobs are never revoked. When shrinking, the
    /// surplus is taken out of circulation as those permits come back.
    pub(crate) fn resize_pool(&self, size: usize) {
        let previous = self.queue_state.pool_size.swap(size, Ordering::SeqCst);
        if size == previous {
            return;
        }

        tracing::info!(from = previous, to = size, "Resizing worker pool");

        if size > previous {
            self.queue_state.concurrent_limit.add_permits(size - previous);
            self.queue_state.wakeup.notify_one();
            return;
        }

        let surplus = previous - size;
        let Ok(surplus) = u32::try_from(surplus) else {
            tracing::error!(surplus, "Pool shrink too large, ignoring");
            return;
        };

        let semaphore = self.queue_state.concurrent_limit.clone();
        let shutdown = self.queue_state.shutdown.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = shutdown.cancelled() => {}
                permits = semaphore.acquire_many_owned(surplus) => {
                    if let Ok(permits) = permits {
                        permits.forget();
                        tracing::debug!(surplus, "Worker pool shrink applied");
                    }
                }
            }
        });
    }
}
