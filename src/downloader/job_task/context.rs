//! Job task context -- shared state and progress reporting for a single job.

use crate::types::{Event, JobId, Phase};
use std::sync::Arc;

use super::super::{JobRecord, MediaDownloader};

/// Shared context for a single job task, reducing parameter passing between helpers.
pub(crate) struct JobTaskContext {
    pub(crate) record: Arc<JobRecord>,
    pub(crate) downloader: MediaDownloader,
}

impl JobTaskContext {
    pub(super) fn id(&self) -> JobId {
        self.record.request.id
    }

    /// Share of overall progress taken by the fetch phase (0.0 to 1.0)
    pub(super) fn fetch_share(&self) -> f32 {
        self.downloader.config.progress.fetch_share
    }

    /// Move to a non-terminal phase and emit the change.
    pub(super) fn set_phase(&self, phase: Phase) {
        let changed = self.record.state.send_if_modified(|state| {
            if state.phase.is_terminal() || state.phase == phase {
                return false;
            }
            state.phase = phase;
            true
        });

        if changed {
            tracing::debug!(job_id = self.id().0, ?phase, "Job phase changed");
            self.downloader
                .emit_event(Event::PhaseChanged { id: self.id(), phase });
        }
    }

    /// Record the fetch attempt about to start.
    pub(super) fn set_attempt(&self, attempt: u32) {
        self.record.state.send_if_modified(|state| {
            if state.attempts == attempt {
                return false;
            }
            state.attempts = attempt;
            true
        });
    }

    /// Raise overall progress to `percent`; lower values are ignored.
    ///
    /// A progress event goes out each time a whole percent is crossed.
    pub(super) fn report_progress(&self, percent: f32) {
        let percent = percent.clamp(0.0, 100.0);
        let mut crossed = None;

        self.record.state.send_if_modified(|state| {
            if state.phase.is_terminal() || percent <= state.progress_percent {
                return false;
            }
            if percent.floor() > state.progress_percent.floor() {
                crossed = Some(state.phase);
            }
            state.progress_percent = percent;
            true
        });

        if let Some(phase) = crossed {
            self.downloader.emit_event(Event::Progress {
                id: self.id(),
                phase,
                percent,
            });
        }
    }

    /// Release this job's entry in the active set.
    pub(super) async fn remove_from_active(&self) {
        let mut active = self.downloader.queue_state.active_jobs.lock().await;
        active.remove(&self.id());
    }
}
