//! Media fetching through an external extractor
//!
//! The orchestrator only sees the [`MediaFetcher`] trait. The default
//! implementation drives `yt-dlp`; tests substitute scripted fetchers.

mod parser;
mod ytdlp;

pub use parser::{FILE_MARKER, OutputLine, classify_failure, parse_line, parse_size};
pub use ytdlp::YtDlpFetcher;

use crate::retry::{Cancelled, IsRetryable};
use async_trait::async_trait;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

/// What to fetch and where to put it
#[derive(Debug, Clone, PartialEq)]
pub struct FetchRequest {
    /// Validated source URL
    pub url: String,
    /// Directory the fetched file is written to
    pub output_directory: PathBuf,
    /// Fetch only the linked item, never the surrounding playlist
    pub no_playlist: bool,
}

/// Progress reported while fetching
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FetchProgress {
    /// Fetch progress (0.0 to 100.0)
    pub percent: f32,
    /// Bytes written so far, when the tool reports a size
    pub downloaded_bytes: Option<u64>,
    /// Expected total size, when the tool reports one
    pub total_bytes: Option<u64>,
}

/// Successfully fetched media file
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedMedia {
    /// Path of the fetched file
    pub path: PathBuf,
    /// Human-readable title (file stem when the tool reports none)
    pub title: Option<String>,
    /// Size on disk
    pub size_bytes: u64,
}

/// Why a fetch did not produce a file
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FetchError {
    /// Network/timeout class failure worth retrying
    #[error("{0}")]
    Transient(String),
    /// The resource cannot be fetched (unsupported URL, unavailable media, missing tool)
    #[error("{0}")]
    Permanent(String),
    /// Stopped because the job was cancelled
    #[error("fetch cancelled")]
    Cancelled,
}

impl IsRetryable for FetchError {
    fn is_retryable(&self) -> bool {
        matches!(self, FetchError::Transient(_))
    }
}

impl From<Cancelled> for FetchError {
    fn from(_: Cancelled) -> Self {
        FetchError::Cancelled
    }
}

impl From<FetchError> for crate::Error {
    fn from(e: FetchError) -> Self {
        match e {
            FetchError::Transient(msg) => crate::Error::TransientFetch(msg),
            FetchError::Permanent(msg) => crate::Error::PermanentFetch(msg),
            FetchError::Cancelled => crate::Error::Cancelled,
        }
    }
}

/// Callback receiving fetch progress updates
pub type FetchProgressFn<'a> = &'a (dyn Fn(FetchProgress) + Send + Sync);

/// Trait for fetching a media URL to a local file
///
/// Implementations must stop promptly once `cancel` fires and return
/// [`FetchError::Cancelled`], removing any partial output they created.
///
/// # Examples
///
/// ```no_run
/// use audio_hub::fetch::{FetchRequest, MediaFetcher, YtDlpFetcher};
/// use tokio_util::sync::CancellationToken;
/// use std::path::PathBuf;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let fetcher = YtDlpFetcher::from_path().expect("yt-dlp not found in PATH");
/// let request = FetchRequest {
///     url: "https://media.example/watch?v=abc".to_string(),
///     output_directory: PathBuf::from("/tmp"),
///     no_playlist: true,
/// };
/// let media = fetcher
///     .fetch(&request, &|p| println!("{:.1}%", p.percent), CancellationToken::new())
///     .await?;
/// println!("fetched {}", media.path.display());
/// # Ok(())
/// # }
/// ```
#[async_trait]
pub trait MediaFetcher: Send + Sync {
    /// Fetch `request.url` into `request.output_directory`
    async fn fetch(
        &self,
        request: &FetchRequest,
        progress: FetchProgressFn<'_>,
        cancel: CancellationToken,
    ) -> Result<FetchedMedia, FetchError>;

    /// Short name for logs
    fn name(&self) -> &'static str;
}
