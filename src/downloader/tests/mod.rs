
use crate::types::{Event, JobId};

/// Ids of jobs a `Notification` event was published for, in order
fn notified_jobs(events: &[Event]) -> Vec<JobId> {
    events
        .iter()
        .filter_map(|event| match event {
            Event::Notification(n) => Some(n.job_id),
            _ => None,
        })
        .collect()
}
