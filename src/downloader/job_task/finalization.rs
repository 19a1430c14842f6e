//! Job finalization -- exactly one terminal state, notification and history entry per job.
//!
//! Once its history entry is written a job counts towards `retained_jobs`;
//! the oldest finished records beyond that are dropped from memory.

use crate::types::{
    Event, HistoryEntry, JobRequest, NotificationEvent, NotificationKind, Outcome, Phase,
};
use chrono::{DateTime, Utc};
use std::path::PathBuf;

use super::super::{JobRecord, MediaDownloader};

/// How a job ended
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum JobOutcome {
    /// Output file ready at this path
    Succeeded(PathBuf),
    /// Error detail shown to the user
    Failed(String),
    /// Stopped by the user or by shutdown
    Cancelled,
}

impl JobOutcome {
    fn phase(&self) -> Phase {
        match self {
            JobOutcome::Succeeded(_) => Phase::Succeeded,
            JobOutcome::Failed(_) => Phase::Failed,
            JobOutcome::Cancelled => Phase::Cancelled,
        }
    }
}

/// Notification for a finished job
pub(crate) fn notification_for(
    request: &JobRequest,
    outcome: &JobOutcome,
    timestamp: DateTime<Utc>,
) -> NotificationEvent {
    let (kind, title, detail) = match outcome {
        JobOutcome::Succeeded(path) => (
            NotificationKind::Completed,
            "Download complete",
            path.file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string()),
        ),
        JobOutcome::Failed(error) => (NotificationKind::Failed, "Download failed", error.clone()),
        JobOutcome::Cancelled => (
            NotificationKind::Cancelled,
            "Download cancelled",
            request.source_url.clone(),
        ),
    };

    NotificationEvent {
        job_id: request.id,
        kind,
        title: title.to_string(),
        detail,
        timestamp,
    }
}

impl MediaDownloader {
    /// Move a job to its terminal phase, then notify, then record history.
    ///
    /// Only the first call for a job has any effect; later calls (a cancel
    /// racing a worker, shutdown draining an already finished job) return
    /// false without emitting anything.
    pub(crate) async fn finalize_job(&self, record: &JobRecord, outcome: JobOutcome) -> bool {
        let request = &record.request;
        let id = request.id;
        let phase = outcome.phase();

        let won = record.state.send_if_modified(|state| {
            if state.phase.is_terminal() {
                return false;
            }
            state.phase = phase;
            match &outcome {
                JobOutcome::Succeeded(path) => {
                    state.progress_percent = 100.0;
                    state.result_path = Some(path.clone());
                    state.error_detail = None;
                }
                JobOutcome::Failed(error) => {
                    state.error_detail = Some(error.clone());
                    state.result_path = None;
                }
                JobOutcome::Cancelled => {
                    state.error_detail = None;
                    state.result_path = None;
                }
            }
            true
        });

        if !won {
            tracing::debug!(job_id = id.0, ?phase, "Job already finalized");
            return false;
        }

        self.emit_event(Event::PhaseChanged { id, phase });
        match &outcome {
            JobOutcome::Succeeded(path) => {
                tracing::info!(job_id = id.0, path = %path.display(), "Job succeeded");
                self.emit_event(Event::JobSucceeded {
                    id,
                    path: path.clone(),
                });
            }
            JobOutcome::Failed(error) => {
                tracing::error!(job_id = id.0, error = %error, "Job failed");
                self.emit_event(Event::JobFailed {
                    id,
                    error: error.clone(),
                });
            }
            JobOutcome::Cancelled => {
                tracing::info!(job_id = id.0, "Job cancelled");
                self.emit_event(Event::JobCancelled { id });
            }
        }

        let timestamp = Utc::now();
        self.processing
            .notifier
            .dispatch(notification_for(request, &outcome, timestamp));

        let (file_path, error_detail) = match outcome {
            JobOutcome::Succeeded(path) => (Some(path), None),
            JobOutcome::Failed(error) => (None, Some(error)),
            JobOutcome::Cancelled => (None, None),
        };
        let entry = HistoryEntry {
            job_id: id,
            source_url: request.source_url.clone(),
            format: request.requested_format,
            outcome: Outcome::from_phase(phase).unwrap_or(Outcome::Failed),
            timestamp,
            file_path,
            error_detail,
        };

        match self.history.append(&entry).await {
            Ok(()) => self.retire_job(id).await,
            // Kept in memory: the ledger cannot answer for it
            Err(e) => tracing::error!(job_id = id.0, error = %e, "Failed to record history entry"),
        }

        true
    }
}
