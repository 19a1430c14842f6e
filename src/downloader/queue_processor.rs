//! Queue processor - hands queued jobs to the worker pool.

use std::time::Duration;

use super::MediaDownloader;
use super::job_task::{JobTaskContext, run_job_task};

/// Interval between queue polling attempts when the queue is empty
const QUEUE_POLL_INTERVAL: Duration = Duration::from_millis(100);

impl MediaDownloader {
    /// Start the queue processor task
    ///
    /// This spawns a background task that continuously:
    /// 1. Acquires a worker slot (respects `maxConcurrentJobs`)
    /// 2. Takes the oldest job from the queue
    /// 3. Spawns a job task that owns the slot until the job is finalized
    /// 4. Repeats until shutdown
    ///
    /// The slot is acquired before a job is dequeued, so a job that cannot
    /// start yet stays in the queue where cancellation can still find it.
    pub(crate) fn start_queue_processor(&self) -> tokio::task::JoinHandle<()> {
        let downloader = self.clone();
        let shutdown = self.queue_state.shutdown.clone();
        let concurrent_limit = self.queue_state.concurrent_limit.clone();

        tokio::spawn(async move {
            loop {
                let permit = tokio::select! {
                    _ = shutdown.cancelled() => break,
                    permit = concurrent_limit.clone().acquire_owned() => permit,
                };

                let Ok(permit) = permit else {
                    // Semaphore closed
                    break;
                };

                let next = {
                    let mut queue = downloader.queue_state.queue.lock().await;
                    let next = queue.pop_front();
                    if let Some(id) = next {
                        // Under the queue lock: a job is always queued or active
                        downloader.queue_state.active_jobs.lock().await.insert(id);
                    }
                    next
                };

                let Some(id) = next else {
                    // Queue is empty, release the slot and wait for work
                    drop(permit);
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = downloader.queue_state.wakeup.notified() => {}
                        _ = tokio::time::sleep(QUEUE_POLL_INTERVAL) => {}
                    }
                    continue;
                };

                let Some(record) = downloader.job(id).await else {
                    tracing::error!(job_id = id.0, "Queued job has no record, dropping");
                    downloader.queue_state.active_jobs.lock().await.remove(&id);
                    continue;
                };

                let ctx = JobTaskContext {
                    record,
                    downloader: downloader.clone(),
                };

                tokio::spawn(async move {
                    let _permit = permit;
                    run_job_task(ctx).await;
                });
            }

            tracing::debug!("Queue processor stopped");
        })
    }
}
