//! Backend fixtures implementing the public extension traits

use async_trait::async_trait;
use audio_hub::conversion::ConvertProgressFn;
use audio_hub::fetch::{FetchProgress, FetchProgressFn, FetchRequest, FetchedMedia};
use audio_hub::{AudioFormat, FetchError, MediaFetcher, Transcoder};
use std::path::Path;
use tokio_util::sync::CancellationToken;

/// Payload written by [`StaticFetcher`]
pub const FETCHED_PAYLOAD: &[u8] = b"pretend this is an opus stream";

/// Fetcher that writes a fixed payload, or fails with a fixed error
pub struct StaticFetcher {
    pub extension: &'static str,
    pub error: Option<FetchError>,
}

impl StaticFetcher {
    pub fn writing(extension: &'static str) -> Self {
        Self {
            extension,
            error: None,
        }
    }

    pub fn failing(error: FetchError) -> Self {
        Self {
            extension: "webm",
            error: Some(error),
        }
    }
}

#[async_trait]
impl MediaFetcher for StaticFetcher {
    async fn fetch(
        &self,
        request: &FetchRequest,
        progress: FetchProgressFn<'_>,
        cancel: CancellationToken,
    ) -> Result<FetchedMedia, FetchError> {
        if cancel.is_cancelled() {
            return Err(FetchError::Cancelled);
        }
        if let Some(error) = &self.error {
            return Err(error.clone());
        }

        let stem = request.url.rsplit('/').next().unwrap_or("media");
        tokio::fs::create_dir_all(&request.output_directory)
            .await
            .map_err(|e| FetchError::Permanent(e.to_string()))?;
        let path = request
            .output_directory
            .join(format!("{stem}.{}", self.extension));
        tokio::fs::write(&path, FETCHED_PAYLOAD)
            .await
            .map_err(|e| FetchError::Permanent(e.to_string()))?;

        progress(FetchProgress {
            percent: 100.0,
            downloaded_bytes: Some(FETCHED_PAYLOAD.len() as u64),
            total_bytes: Some(FETCHED_PAYLOAD.len() as u64),
        });

        Ok(FetchedMedia {
            path,
            title: Some(stem.to_string()),
            size_bytes: FETCHED_PAYLOAD.len() as u64,
        })
    }

    fn name(&self) -> &'static str {
        "static"
    }
}

/// Transcoder that copies the input verbatim
pub struct CopyTranscoder;

#[async_trait]
impl Transcoder for CopyTranscoder {
    async fn transcode(
        &self,
        input: &Path,
        output: &Path,
        _format: AudioFormat,
        _bitrate_kbps: u32,
        progress: ConvertProgressFn<'_>,
        _cancel: CancellationToken,
    ) -> audio_hub::Result<()> {
        tokio::fs::copy(input, output).await?;
        progress(100.0);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "copy"
    }
}
