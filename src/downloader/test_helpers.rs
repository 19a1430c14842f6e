//! Shared test helpers: scripted backends and a MediaDownloader wired to them.

use crate::config::Config;
use crate::conversion::{ConvertProgressFn, Transcoder};
use crate::downloader::{Backends, MediaDownloader};
use crate::error::{Error, Result};
use crate::fetch::{
    FetchError, FetchProgress, FetchProgressFn, FetchRequest, FetchedMedia, MediaFetcher,
};
use crate::notifications::{NotificationChannel, SoundKind, SoundPlayer};
use crate::types::{AudioFormat, Event, JobId, JobState, Phase};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

/// What one call of [`FakeFetcher::fetch`] does
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum FetchStep {
    /// Write `<last url segment>.<extension>` into the output directory
    Succeed(&'static str),
    /// Fail with a retryable error
    Transient(&'static str),
    /// Fail with a non-retryable error
    Permanent(&'static str),
    /// Block until cancelled
    Hang,
}

/// Fetcher that follows a script instead of running yt-dlp
pub(crate) struct FakeFetcher {
    steps: Mutex<VecDeque<FetchStep>>,
    fallback: FetchStep,
    delay: Duration,
    calls: Mutex<Vec<String>>,
    running: AtomicUsize,
    max_running: AtomicUsize,
}

impl FakeFetcher {
    /// Every call succeeds with a file of the given extension
    pub(crate) fn succeeding(extension: &'static str) -> Self {
        Self::scripted(Vec::new(), FetchStep::Succeed(extension))
    }

    /// Every call blocks until the job is cancelled
    pub(crate) fn hanging() -> Self {
        Self::scripted(Vec::new(), FetchStep::Hang)
    }

    /// Run `steps` in order, then `fallback` for every later call
    pub(crate) fn scripted(steps: Vec<FetchStep>, fallback: FetchStep) -> Self {
        Self {
            steps: Mutex::new(steps.into()),
            fallback,
            delay: Duration::ZERO,
            calls: Mutex::new(Vec::new()),
            running: AtomicUsize::new(0),
            max_running: AtomicUsize::new(0),
        }
    }

    /// Hold every call for `delay` (cancellable)
    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// URLs in the order fetch attempts started
    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Highest number of fetches that ran at the same time
    pub(crate) fn max_running(&self) -> usize {
        self.max_running.load(Ordering::SeqCst)
    }

    fn next_step(&self, url: &str) -> FetchStep {
        self.calls.lock().unwrap().push(url.to_string());
        self.steps
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone())
    }

    async fn run_step(
        &self,
        step: FetchStep,
        request: &FetchRequest,
        progress: FetchProgressFn<'_>,
        cancel: &CancellationToken,
    ) -> std::result::Result<FetchedMedia, FetchError> {
        progress(FetchProgress {
            percent: 10.0,
            ..Default::default()
        });

        if step == FetchStep::Hang {
            cancel.cancelled().await;
            return Err(FetchError::Cancelled);
        }

        tokio::select! {
            _ = cancel.cancelled() => return Err(FetchError::Cancelled),
            _ = tokio::time::sleep(self.delay) => {}
        }

        match step {
            FetchStep::Transient(msg) => Err(FetchError::Transient(msg.to_string())),
            FetchStep::Permanent(msg) => Err(FetchError::Permanent(msg.to_string())),
            FetchStep::Hang => Err(FetchError::Cancelled),
            FetchStep::Succeed(extension) => {
                let stem = request
                    .url
                    .rsplit('/')
                    .find(|segment| !segment.is_empty())
                    .unwrap_or("media");
                let path = request
                    .output_directory
                    .join(format!("{stem}.{extension}"));
                tokio::fs::create_dir_all(&request.output_directory)
                    .await
                    .unwrap();
                tokio::fs::write(&path, b"fake media payload").await.unwrap();
                progress(FetchProgress {
                    percent: 100.0,
                    downloaded_bytes: Some(18),
                    total_bytes: Some(18),
                });
                Ok(FetchedMedia {
                    path,
                    title: Some(stem.to_string()),
                    size_bytes: 18,
                })
            }
        }
    }
}

#[async_trait]
impl MediaFetcher for FakeFetcher {
    async fn fetch(
        &self,
        request: &FetchRequest,
        progress: FetchProgressFn<'_>,
        cancel: CancellationToken,
    ) -> std::result::Result<FetchedMedia, FetchError> {
        let step = self.next_step(&request.url);
        let running = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_running.fetch_max(running, Ordering::SeqCst);

        let result = self.run_step(step, request, progress, &cancel).await;

        self.running.fetch_sub(1, Ordering::SeqCst);
        result
    }

    fn name(&self) -> &'static str {
        "fake-fetcher"
    }
}

/// Transcoder that writes a small file instead of running ffmpeg
#[derive(Default)]
pub(crate) struct FakeTranscoder {
    fail: bool,
    empty_output: bool,
    fail_inputs_containing: Option<&'static str>,
    delay: Duration,
    calls: Mutex<Vec<(PathBuf, AudioFormat)>>,
}

impl FakeTranscoder {
    /// Every conversion succeeds
    pub(crate) fn working() -> Self {
        Self::default()
    }

    /// Every conversion fails
    pub(crate) fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    /// Conversions "succeed" but leave an empty file
    pub(crate) fn empty_output() -> Self {
        Self {
            empty_output: true,
            ..Default::default()
        }
    }

    /// Fail only inputs whose path contains `needle`
    pub(crate) fn failing_on(needle: &'static str) -> Self {
        Self {
            fail_inputs_containing: Some(needle),
            ..Default::default()
        }
    }

    /// Hold every conversion for `delay` (cancellable)
    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Inputs and formats in call order
    pub(crate) fn calls(&self) -> Vec<(PathBuf, AudioFormat)> {
        self.calls.lock().unwrap().clone()
    }

    fn should_fail(&self, input: &Path) -> bool {
        self.fail
            || self
                .fail_inputs_containing
                .is_some_and(|needle| input.to_string_lossy().contains(needle))
    }
}

#[async_trait]
impl Transcoder for FakeTranscoder {
    async fn transcode(
        &self,
        input: &Path,
        output: &Path,
        format: AudioFormat,
        _bitrate_kbps: u32,
        progress: ConvertProgressFn<'_>,
        cancel: CancellationToken,
    ) -> Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push((input.to_path_buf(), format));
        progress(25.0);

        tokio::select! {
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            _ = tokio::time::sleep(self.delay) => {}
        }

        if self.should_fail(input) {
            return Err(Error::Conversion {
                reason: "unsupported codec".to_string(),
            });
        }

        let payload: &[u8] = if self.empty_output { b"" } else { b"converted audio" };
        tokio::fs::write(output, payload).await?;
        progress(100.0);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "fake-transcoder"
    }
}

enum ChannelBehaviour {
    Working,
    Failing,
    Unavailable,
}

/// Notification channel that records what it was asked to show
pub(crate) struct RecordingChannel {
    name: &'static str,
    behaviour: ChannelBehaviour,
    shown: Mutex<Vec<(String, String)>>,
}

impl RecordingChannel {
    fn with(name: &'static str, behaviour: ChannelBehaviour) -> Arc<Self> {
        Arc::new(Self {
            name,
            behaviour,
            shown: Mutex::new(Vec::new()),
        })
    }

    /// Available and always delivers
    pub(crate) fn working(name: &'static str) -> Arc<Self> {
        Self::with(name, ChannelBehaviour::Working)
    }

    /// Available but every delivery fails
    pub(crate) fn failing(name: &'static str) -> Arc<Self> {
        Self::with(name, ChannelBehaviour::Failing)
    }

    /// Reports itself unavailable
    pub(crate) fn unavailable(name: &'static str) -> Arc<Self> {
        Self::with(name, ChannelBehaviour::Unavailable)
    }

    /// `(title, body)` of every delivery attempt
    pub(crate) fn shown(&self) -> Vec<(String, String)> {
        self.shown.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotificationChannel for RecordingChannel {
    fn name(&self) -> &str {
        self.name
    }

    async fn is_available(&self) -> bool {
        !matches!(self.behaviour, ChannelBehaviour::Unavailable)
    }

    async fn show(&self, title: &str, body: &str, _duration: Duration) -> Result<()> {
        self.shown
            .lock()
            .unwrap()
            .push((title.to_string(), body.to_string()));
        match self.behaviour {
            ChannelBehaviour::Failing => Err(Error::NotificationDelivery {
                channel: self.name.to_string(),
                reason: "simulated failure".to_string(),
            }),
            _ => Ok(()),
        }
    }
}

/// Sound player that records the sounds it was asked to play
#[derive(Default)]
pub(crate) struct RecordingSound {
    played: Mutex<Vec<SoundKind>>,
}

impl RecordingSound {
    pub(crate) fn played(&self) -> Vec<SoundKind> {
        self.played.lock().unwrap().clone()
    }
}

#[async_trait]
impl SoundPlayer for RecordingSound {
    async fn play(&self, kind: SoundKind) {
        self.played.lock().unwrap().push(kind);
    }
}

/// Drain every event currently buffered in `rx`
pub(crate) fn collect_events(rx: &mut broadcast::Receiver<Event>) -> Vec<Event> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// Config pointing at `dir` with fast retries and short debounce windows
pub(crate) fn test_config(dir: &Path) -> Config {
    let mut config = Config::default();
    config.persistence.database_path = dir.join("test.db");
    config.tools.search_path = false;
    config.retry.initial_delay = Duration::from_millis(10);
    config.retry.max_delay = Duration::from_millis(40);
    config.retry.backoff_multiplier = 2.0;
    config.retry.jitter = false;
    config.settings.debounce = Duration::from_millis(50);
    config.settings.defaults.output_directory = dir.join("out");
    config.settings.defaults.max_concurrent_jobs = 2;
    config.settings.defaults.max_retries = 3;
    config.notifications.webhook = None;
    config.notifications.alert_duration = Duration::from_millis(50);
    config.shutdown_timeout = Duration::from_secs(5);
    config
}

/// A MediaDownloader running on fake backends, plus handles to inspect them
pub(crate) struct TestHarness {
    pub(crate) downloader: MediaDownloader,
    pub(crate) fetcher: Arc<FakeFetcher>,
    pub(crate) transcoder: Arc<FakeTranscoder>,
    pub(crate) channel: Arc<RecordingChannel>,
    pub(crate) sound: Arc<RecordingSound>,
    /// Keeps the database and output directory alive
    pub(crate) temp_dir: TempDir,
}

impl TestHarness {
    /// Directory fetched and converted files land in
    pub(crate) fn output_dir(&self) -> PathBuf {
        self.temp_dir.path().join("out")
    }

    /// Wait until `id` reaches a terminal phase (panics after 10s)
    pub(crate) async fn wait_terminal(&self, id: JobId) -> JobState {
        let mut rx = self.downloader.watch_job(id).await.unwrap();
        let state = tokio::time::timeout(
            Duration::from_secs(10),
            rx.wait_for(|state| state.phase.is_terminal()),
        )
        .await
        .expect("job did not finish in time")
        .unwrap()
        .clone();
        state
    }

    /// Wait until `id` reaches `phase` (panics after 10s)
    pub(crate) async fn wait_phase(&self, id: JobId, phase: Phase) {
        let mut rx = self.downloader.watch_job(id).await.unwrap();
        tokio::time::timeout(Duration::from_secs(10), rx.wait_for(|state| state.phase == phase))
            .await
            .expect("job did not reach phase in time")
            .unwrap();
    }

    /// Wait until the history ledger holds `expected` entries (panics after 5s)
    pub(crate) async fn wait_history(&self, expected: i64) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while self.downloader.history_ledger().count().await.unwrap() < expected {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("history entries were not written in time");
    }

    /// Wait until the channel was asked to show `expected` notifications
    pub(crate) async fn wait_delivered(&self, expected: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while self.channel.shown().len() < expected {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("notifications were not delivered in time");
    }
}

/// Create a MediaDownloader on fake backends with a fresh temp directory
///
/// `configure` can adjust the config before the downloader starts.
pub(crate) async fn create_test_downloader(
    fetcher: FakeFetcher,
    transcoder: FakeTranscoder,
    configure: impl FnOnce(&mut Config),
) -> TestHarness {
    let temp_dir = tempfile::tempdir().unwrap();
    let mut config = test_config(temp_dir.path());
    configure(&mut config);

    let fetcher = Arc::new(fetcher);
    let transcoder = Arc::new(transcoder);
    let channel = RecordingChannel::working("recording");
    let sound = Arc::new(RecordingSound::default());

    let backends = Backends {
        fetcher: fetcher.clone(),
        transcoder: transcoder.clone(),
        channels: vec![channel.clone() as Arc<dyn NotificationChannel>],
        sound: sound.clone(),
    };

    let downloader = MediaDownloader::with_backends(config, backends)
        .await
        .unwrap();

    TestHarness {
        downloader,
        fetcher,
        transcoder,
        channel,
        sound,
        temp_dir,
    }
}
