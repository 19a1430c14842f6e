//! FIFO queue management for job ordering.

use crate::types::JobId;

use super::MediaDownloader;

impl MediaDownloader {
    /// Append a job to the back of the queue and wake the queue processor
    pub(crate) async fn enqueue(&self, id: JobId) {
        self.queue_state.queue.lock().await.push_back(id);
        self.queue_state.wakeup.notify_one();
    }

    /// Remove a job from the queue without starting it
    ///
    /// Returns true if the job was still waiting and has been removed.
    pub(crate) async fn remove_from_queue(&self, id: JobId) -> bool {
        let mut queue = self.queue_state.queue.lock().await;
        match queue.iter().position(|queued| *queued == id) {
            Some(index) => queue.remove(index).is_some(),
            None => false,
        }
    }

    /// Take every waiting job out of the queue, oldest first
    pub(crate) async fn drain_queue(&self) -> Vec<JobId> {
        self.queue_state.queue.lock().await.drain(..).collect()
    }

    /// Jobs waiting for a worker, oldest first
    pub async fn queued_jobs(&self) -> Vec<JobId> {
        self.queue_state.queue.lock().await.iter().copied().collect()
    }
}
