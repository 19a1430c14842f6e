//! Job task execution -- fetch, optional conversion and finalization of one job.
//!
//! Split into focused submodules:
//! - [`context`] - Shared state and progress/phase reporting
//! - [`orchestration`] - Top-level job lifecycle with fetch retries
//! - [`finalization`] - Exactly-once terminal state, notification and history

mod context;
mod finalization;
mod orchestration;

pub(crate) use context::JobTaskContext;
pub(crate) use finalization::JobOutcome;
pub(crate) use orchestration::run_job_task;
