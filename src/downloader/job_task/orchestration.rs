//! Job task orchestration -- top-level lifecycle for a single job.

use crate::conversion::needs_conversion;
use crate::error::Error;
use crate::fetch::{FetchError, FetchProgress, FetchProgressFn, FetchRequest, FetchedMedia};
use crate::retry::with_retry;
use crate::settings::Settings;
use crate::types::{Event, Phase, duration_ms};

use super::context::JobTaskContext;
use super::finalization::JobOutcome;

/// Core job task -- orchestrates the full lifecycle of a single job.
///
/// Phases:
/// 1. Fetching, retrying transient failures with backoff
/// 2. Converting, when the fetched container is not the requested format
/// 3. Finalization: terminal state, notification, history entry
/// 4. Release of the worker slot (when the caller drops its permit)
pub(crate) async fn run_job_task(ctx: JobTaskContext) {
    let outcome = run_phases(&ctx).await;
    ctx.downloader.finalize_job(&ctx.record, outcome).await;
    ctx.remove_from_active().await;
}

async fn run_phases(ctx: &JobTaskContext) -> JobOutcome {
    let id = ctx.id();
    let cancel = ctx.record.cancel.clone();

    // Cancelled between dequeue and start
    if cancel.is_cancelled() {
        return JobOutcome::Cancelled;
    }

    let settings = ctx.downloader.settings.get().await;

    // Phase 1: Fetch
    ctx.set_phase(Phase::Fetching);
    let fetched = match fetch_with_retry(ctx, &settings).await.map_err(Error::from) {
        Ok(media) => media,
        Err(Error::Cancelled) => return JobOutcome::Cancelled,
        Err(e) => {
            tracing::warn!(job_id = id.0, code = e.code(), error = %e, "Fetch failed");
            return JobOutcome::Failed(failure_detail(e));
        }
    };

    tracing::info!(
        job_id = id.0,
        path = %fetched.path.display(),
        size_bytes = fetched.size_bytes,
        "Fetch complete"
    );

    if cancel.is_cancelled() {
        return JobOutcome::Cancelled;
    }

    // Phase 2: Convert if needed
    let format = ctx.record.request.requested_format;
    if !needs_conversion(&fetched.path, format) {
        return JobOutcome::Succeeded(fetched.path);
    }

    ctx.set_phase(Phase::Converting);
    let share = ctx.fetch_share();
    let on_progress = |percent: f32| {
        ctx.report_progress(share * 100.0 + percent * (1.0 - share));
    };

    match ctx
        .downloader
        .processing
        .conversion
        .convert(
            &fetched.path,
            format,
            settings.audio_bitrate_kbps,
            &on_progress,
            cancel.clone(),
        )
        .await
    {
        Ok(path) => JobOutcome::Succeeded(path),
        Err(Error::Cancelled) => JobOutcome::Cancelled,
        Err(_) if cancel.is_cancelled() => JobOutcome::Cancelled,
        Err(e) => {
            tracing::warn!(job_id = id.0, code = e.code(), error = %e, "Conversion failed");
            JobOutcome::Failed(e.to_string())
        }
    }
}

/// Error detail shown to the user for a failed fetch: the tool's own message
fn failure_detail(error: Error) -> String {
    match error {
        Error::TransientFetch(message) | Error::PermanentFetch(message) => message,
        other => other.to_string(),
    }
}

/// Run the fetcher, retrying transient failures up to `settings.max_retries` times.
async fn fetch_with_retry(
    ctx: &JobTaskContext,
    settings: &Settings,
) -> Result<FetchedMedia, FetchError> {
    let id = ctx.id();
    let request = FetchRequest {
        url: ctx.record.request.source_url.clone(),
        output_directory: ctx.record.request.output_directory.clone(),
        no_playlist: settings.no_playlist,
    };
    let max_retries = settings.max_retries;
    let share = ctx.fetch_share();
    let on_progress = |progress: FetchProgress| ctx.report_progress(progress.percent * share);
    let progress: FetchProgressFn<'_> = &on_progress;
    let fetcher = ctx.downloader.processing.fetcher.as_ref();
    let cancel = &ctx.record.cancel;
    let request = &request;

    with_retry(
        &ctx.downloader.config.retry,
        max_retries,
        cancel,
        |retry, delay, error: &FetchError| {
            ctx.downloader.emit_event(Event::Retrying {
                id,
                attempt: retry,
                max_retries,
                delay_ms: duration_ms(delay),
                error: error.to_string(),
            });
        },
        |attempt| {
            ctx.set_attempt(attempt);
            tracing::debug!(job_id = id.0, attempt, fetcher = fetcher.name(), "Fetch attempt");
            fetcher.fetch(request, progress, cancel.clone())
        },
    )
    .await
}
