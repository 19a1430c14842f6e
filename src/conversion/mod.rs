//! Conversion pipeline for fetched media
//!
//! Turns a fetched file into the requested [`AudioFormat`]:
//! 1. Resolve an output path next to the input (`<stem>.<ext>`, ` (n)` on collision)
//! 2. Transcode through the configured [`Transcoder`]
//! 3. Check that the output exists and is not empty
//! 4. Optionally remove the fetched source

use crate::config::ConversionConfig;
use crate::error::{Error, Result};
use crate::types::{AudioFormat, Event};
use crate::utils::reserve_unique_path;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

mod ffmpeg;

pub use ffmpeg::FfmpegTranscoder;

/// Callback receiving conversion progress (0.0 to 100.0)
pub type ConvertProgressFn<'a> = &'a (dyn Fn(f32) + Send + Sync);

/// Trait for transcoding one media file into an audio format
///
/// Implementations write exactly `output` and must remove it again when they
/// fail or are cancelled.
#[async_trait]
pub trait Transcoder: Send + Sync {
    /// Transcode `input` into `output`
    ///
    /// `bitrate_kbps` is ignored for lossless formats. Returns
    /// [`Error::Conversion`] on failure or cancellation.
    async fn transcode(
        &self,
        input: &Path,
        output: &Path,
        format: AudioFormat,
        bitrate_kbps: u32,
        progress: ConvertProgressFn<'_>,
        cancel: CancellationToken,
    ) -> Result<()>;

    /// Short name for logs
    fn name(&self) -> &'static str;
}

/// One input of a conversion batch
#[derive(Debug, Clone, PartialEq)]
pub struct BatchItem {
    /// File to convert
    pub input: PathBuf,
    /// Target format
    pub format: AudioFormat,
}

impl BatchItem {
    /// Batch item converting `input` to `format`
    pub fn new(input: impl Into<PathBuf>, format: AudioFormat) -> Self {
        Self {
            input: input.into(),
            format,
        }
    }
}

/// Result of one batch item
#[derive(Debug, Clone, PartialEq)]
pub struct BatchItemResult {
    /// File that was converted
    pub input: PathBuf,
    /// Output path when the item succeeded
    pub output: Option<PathBuf>,
    /// Error message when the item failed or was skipped
    pub error: Option<String>,
}

/// Results of a whole batch, in input order
#[derive(Debug, Clone, PartialEq)]
pub struct BatchReport {
    /// Batch identifier used in batch events
    pub batch: u64,
    /// Per-item results
    pub items: Vec<BatchItemResult>,
}

impl BatchReport {
    /// Number of items that produced an output file
    pub fn succeeded(&self) -> usize {
        self.items.iter().filter(|i| i.output.is_some()).count()
    }

    /// Number of items that failed or were skipped
    pub fn failed(&self) -> usize {
        self.items.len() - self.succeeded()
    }
}

/// Whether a fetched file must be transcoded to end up as `format`
pub fn needs_conversion(path: &Path, format: AudioFormat) -> bool {
    !path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(format.extension()))
}

/// Reserve the output path for converting `input` to `format`
///
/// Same directory and stem as the input with the format's extension. An
/// existing file is never overwritten; the returned path has been created
/// empty so no concurrent conversion can pick the same name.
pub async fn reserve_output_path(input: &Path, format: AudioFormat) -> Result<PathBuf> {
    if input.file_stem().is_none() {
        return Err(Error::InvalidPath {
            path: input.to_path_buf(),
            reason: "Cannot extract file stem".to_string(),
        });
    }
    reserve_unique_path(&input.with_extension(format.extension())).await
}

/// Conversion pipeline executor
#[derive(Clone)]
pub struct ConversionPipeline {
    /// Backend doing the actual transcoding
    transcoder: Arc<dyn Transcoder>,
    /// Keep the fetched source after a successful conversion
    keep_source: bool,
    /// Event channel for batch events
    event_tx: broadcast::Sender<Event>,
    /// Next batch identifier
    next_batch: Arc<AtomicU64>,
}

impl ConversionPipeline {
    /// Create a new conversion pipeline
    pub fn new(
        transcoder: Arc<dyn Transcoder>,
        config: &ConversionConfig,
        event_tx: broadcast::Sender<Event>,
    ) -> Self {
        Self {
            transcoder,
            keep_source: config.keep_source,
            event_tx,
            next_batch: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Convert `input` to `format`, returning the output path
    ///
    /// Progress is reported in the 0-100 range of this conversion alone.
    pub async fn convert(
        &self,
        input: &Path,
        format: AudioFormat,
        bitrate_kbps: u32,
        progress: ConvertProgressFn<'_>,
        cancel: CancellationToken,
    ) -> Result<PathBuf> {
        if !tokio::fs::try_exists(input).await.unwrap_or(false) {
            return Err(Error::Conversion {
                reason: format!("input file not found: {}", input.display()),
            });
        }

        let output = reserve_output_path(input, format).await?;
        info!(
            input = %input.display(),
            output = %output.display(),
            %format,
            transcoder = self.transcoder.name(),
            "starting conversion"
        );

        if let Err(e) = self
            .transcoder
            .transcode(input, &output, format, bitrate_kbps, progress, cancel)
            .await
        {
            let _ = tokio::fs::remove_file(&output).await;
            return Err(e);
        }

        match tokio::fs::metadata(&output).await {
            Ok(meta) if meta.len() > 0 => {}
            _ => {
                let _ = tokio::fs::remove_file(&output).await;
                return Err(Error::Conversion {
                    reason: format!("{} produced no output", self.transcoder.name()),
                });
            }
        }

        if !self.keep_source && input != output {
            match tokio::fs::remove_file(input).await {
                Ok(()) => debug!(path = %input.display(), "removed fetched source"),
                Err(e) => warn!(path = %input.display(), error = %e, "failed to remove fetched source"),
            }
        }

        progress(100.0);
        info!(output = %output.display(), "conversion complete");
        Ok(output)
    }

    /// Convert several files one after another
    ///
    /// Every item is reported through [`Event::BatchItemProgress`] and
    /// [`Event::BatchItemFinished`]. A failing item does not stop the batch;
    /// once `cancel` fires the remaining items are reported as cancelled.
    pub async fn convert_batch(
        &self,
        items: Vec<BatchItem>,
        bitrate_kbps: u32,
        cancel: CancellationToken,
    ) -> BatchReport {
        let batch = self.next_batch.fetch_add(1, Ordering::Relaxed);
        info!(batch, items = items.len(), "starting conversion batch");

        let mut results = Vec::with_capacity(items.len());
        for (index, item) in items.into_iter().enumerate() {
            let result = if cancel.is_cancelled() {
                Err("cancelled".to_string())
            } else {
                let event_tx = self.event_tx.clone();
                let on_progress = move |percent: f32| {
                    event_tx
                        .send(Event::BatchItemProgress {
                            batch,
                            index,
                            percent,
                        })
                        .ok();
                };
                self.convert(
                    &item.input,
                    item.format,
                    bitrate_kbps,
                    &on_progress,
                    cancel.clone(),
                )
                .await
                .map_err(|e| match e {
                    Error::Conversion { reason } => reason,
                    Error::Cancelled => "cancelled".to_string(),
                    other => other.to_string(),
                })
            };

            if let Err(error) = &result {
                warn!(batch, index, input = %item.input.display(), %error, "batch item failed");
            }

            let (output, error) = match result {
                Ok(path) => (Some(path), None),
                Err(error) => (None, Some(error)),
            };

            self.event_tx
                .send(Event::BatchItemFinished {
                    batch,
                    index,
                    output: output.clone(),
                    error: error.clone(),
                })
                .ok();

            results.push(BatchItemResult {
                input: item.input,
                output,
                error,
            });
        }

        let report = BatchReport {
            batch,
            items: results,
        };
        info!(
            batch,
            succeeded = report.succeeded(),
            failed = report.failed(),
            "conversion batch finished"
        );
        report
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
