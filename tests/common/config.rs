//! Test configuration helpers for creating orchestrators on scratch directories

use audio_hub::notifications::NoOpSoundPlayer;
use audio_hub::{Backends, Config, MediaDownloader, MediaFetcher, NotificationChannel, Transcoder};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Config rooted at `dir`: scratch database, no PATH lookups, fast retries
pub fn scratch_config(dir: &Path) -> Config {
    let mut config = Config::default();
    config.persistence.database_path = dir.join("audio-hub.db");
    config.tools.search_path = false;
    config.retry.initial_delay = Duration::from_millis(10);
    config.retry.max_delay = Duration::from_millis(50);
    config.retry.jitter = false;
    config.settings.debounce = Duration::from_millis(50);
    config.settings.defaults.output_directory = dir.join("music");
    config.notifications.native_toasts = false;
    config.notifications.alert_duration = Duration::from_millis(50);
    config.shutdown_timeout = Duration::from_secs(5);
    config
}

/// Create an orchestrator on a fresh temp directory with the given backends
///
/// Returns the orchestrator and the tempdir (which must be kept alive).
pub async fn create_downloader(
    fetcher: Arc<dyn MediaFetcher>,
    transcoder: Arc<dyn Transcoder>,
    channels: Vec<Arc<dyn NotificationChannel>>,
    configure: impl FnOnce(&mut Config),
) -> (MediaDownloader, TempDir) {
    let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let mut config = scratch_config(temp_dir.path());
    configure(&mut config);

    let downloader = MediaDownloader::with_backends(
        config,
        Backends {
            fetcher,
            transcoder,
            channels,
            sound: Arc::new(NoOpSoundPlayer),
        },
    )
    .await
    .expect("Failed to create downloader");

    (downloader, temp_dir)
}
