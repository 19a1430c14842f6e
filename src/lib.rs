//! # audio-hub
//!
//! Job orchestration core for turning media URLs into local audio files.
//!
//! ## Design Philosophy
//!
//! audio-hub is designed to be:
//! - **Library-first** - No CLI or UI, purely a Rust crate for embedding in a front-end
//! - **Tool-driven** - Fetching and transcoding are delegated to `yt-dlp` and `ffmpeg`
//! - **Event-driven** - Consumers subscribe to events or watch single jobs, no polling required
//! - **Pluggable** - Fetcher, transcoder, notification channels and sound are trait objects
//!
//! ## Components
//!
//! - [`MediaDownloader`] - job queue, worker pool, retries, cancellation
//! - [`conversion::ConversionPipeline`] - transcodes fetched files, single or batch
//! - [`notifications::NotificationDispatcher`] - webhook, native toast and shell tiers
//! - [`SettingsStore`] - user preferences with debounced persistence
//! - [`HistoryLedger`] - append-only record of finished jobs
//!
//! ## Quick Start
//!
//! ```no_run
//! use audio_hub::{AudioFormat, Config, Event, MediaDownloader, NewJob};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let downloader = MediaDownloader::new(Config::default()).await?;
//!
//!     // Subscribe to events
//!     let mut events = downloader.subscribe();
//!
//!     let id = downloader
//!         .submit(NewJob::new("https://media.example/watch?v=abc").with_format(AudioFormat::Mp3))
//!         .await?;
//!
//!     while let Ok(event) = events.recv().await {
//!         match event {
//!             Event::JobSucceeded { id: done, path } if done == id => {
//!                 println!("saved to {}", path.display());
//!                 break;
//!             }
//!             Event::JobFailed { id: done, error } if done == id => {
//!                 eprintln!("failed: {error}");
//!                 break;
//!             }
//!             _ => {}
//!         }
//!     }
//!
//!     downloader.shutdown().await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Configuration types
pub mod config;
/// Conversion pipeline and transcoders
pub mod conversion;
/// Database persistence layer
pub mod db;
/// Job orchestrator (decomposed into focused submodules)
pub mod downloader;
/// Error types
pub mod error;
/// Media fetching through external extractors
pub mod fetch;
/// History ledger
pub mod history;
/// Notification dispatcher and channels
pub mod notifications;
/// Retry logic with exponential backoff
pub mod retry;
/// User settings store
pub mod settings;
/// Core types and events
pub mod types;
/// Utility functions
pub mod utils;

// Re-export commonly used types
pub use config::Config;
pub use conversion::{BatchItem, BatchItemResult, BatchReport, ConversionPipeline, Transcoder};
pub use db::Database;
pub use downloader::{Backends, MediaDownloader};
pub use error::{DatabaseError, Error, Result};
pub use fetch::{FetchError, MediaFetcher};
pub use history::HistoryLedger;
pub use notifications::{NotificationChannel, NotificationDispatcher, SoundKind, SoundPlayer};
pub use settings::{Settings, SettingsStore, SettingsUpdate};
pub use types::{
    AudioFormat, Event, HistoryEntry, JobId, JobRequest, JobState, NewJob, NotificationEvent,
    NotificationKind, Outcome, Phase,
};

/// Helper function to run the orchestrator with graceful signal handling.
///
/// Waits for a termination signal and then calls the orchestrator's `shutdown()` method.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use audio_hub::{Config, MediaDownloader, run_with_shutdown};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = Config::default();
///     let downloader = MediaDownloader::new(config).await?;
///
///     // Run with automatic signal handling
///     run_with_shutdown(downloader).await?;
///
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(downloader: MediaDownloader) -> Result<()> {
    wait_for_signal().await;
    downloader.shutdown().await
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Registration may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), Ok(mut sigint)) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            sigint.recv().await;
            tracing::info!("Received SIGINT signal (Ctrl+C)");
        }
        (Ok(mut sigterm), Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            sigterm.recv().await;
            tracing::info!("Received SIGTERM signal");
        }
        (Err(e), Err(_)) => {
            tracing::error!(error = %e, "Could not register any signal handlers, using ctrl_c fallback");
            tokio::signal::ctrl_c().await.ok();
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
