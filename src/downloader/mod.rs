//! Job orchestrator split into focused submodules.
//!
//! The `MediaDownloader` struct and its methods are organized by domain:
//! - [`submit`] - Request validation and job creation
//! - [`queue`] - FIFO queue management
//! - [`queue_processor`] - Worker pool and job spawning
//! - [`job_task`] - Fetch, convert and finalize a single job
//! - [`control`] - Cancellation and state snapshots
//! - [`config_ops`] - Runtime settings updates and pool resizing
//! - [`lifecycle`] - Shutdown coordination

mod config_ops;
mod control;
mod job_task;
mod lifecycle;
mod queue;
mod queue_processor;
mod submit;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

use crate::config::Config;
use crate::conversion::{BatchItem, BatchReport, ConversionPipeline, FfmpegTranscoder, Transcoder};
use crate::db::Database;
use crate::error::Result;
use crate::fetch::{MediaFetcher, YtDlpFetcher};
use crate::history::HistoryLedger;
use crate::notifications::{
    NotificationChannel, NotificationDispatcher, SoundPlayer, SystemSoundPlayer, default_channels,
};
use crate::settings::SettingsStore;
use crate::types::{Event, HistoryEntry, JobId, JobRequest, JobState};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize};
use tokio::sync::{Mutex, Notify, RwLock, Semaphore, broadcast, watch};
use tokio_util::sync::CancellationToken;

/// A job known to the orchestrator, queued, running or finished
pub(crate) struct JobRecord {
    /// Immutable request
    pub(crate) request: JobRequest,
    /// Single writer of the job's state; readers subscribe
    pub(crate) state: watch::Sender<JobState>,
    /// Cooperative cancellation for this job
    pub(crate) cancel: CancellationToken,
}

impl JobRecord {
    pub(crate) fn new(request: JobRequest) -> Self {
        let (state, _rx) = watch::channel(JobState::queued(request.id));
        Self {
            request,
            state,
            cancel: CancellationToken::new(),
        }
    }

    /// Whether the job has reached a terminal phase
    pub(crate) fn is_terminal(&self) -> bool {
        self.state.borrow().phase.is_terminal()
    }
}

/// Queue and job state management
#[derive(Clone)]
pub(crate) struct QueueState {
    /// Jobs waiting for a worker, oldest first
    pub(crate) queue: Arc<Mutex<VecDeque<JobId>>>,
    /// Unfinished jobs plus the most recently finished ones
    pub(crate) jobs: Arc<RwLock<HashMap<JobId, Arc<JobRecord>>>>,
    /// Finished jobs still held in `jobs`, oldest first
    pub(crate) finished: Arc<Mutex<VecDeque<JobId>>>,
    /// Worker slots (permits = maxConcurrentJobs)
    pub(crate) concurrent_limit: Arc<Semaphore>,
    /// Current pool size the semaphore is tuned to
    pub(crate) pool_size: Arc<AtomicUsize>,
    /// Jobs holding a worker slot until their finalization is done
    pub(crate) active_jobs: Arc<Mutex<HashSet<JobId>>>,
    /// Flag to indicate whether new jobs are accepted (set to false during shutdown)
    pub(crate) accepting_new: Arc<AtomicBool>,
    /// Wakes the queue processor when a job is enqueued
    pub(crate) wakeup: Arc<Notify>,
    /// Stops the queue processor
    pub(crate) shutdown: CancellationToken,
    /// Next job id to hand out
    pub(crate) next_id: Arc<AtomicI64>,
}

/// Fetch, conversion and notification backends
#[derive(Clone)]
pub(crate) struct ProcessingPipeline {
    /// Media fetcher (trait object for pluggable implementations)
    pub(crate) fetcher: Arc<dyn MediaFetcher>,
    /// Conversion pipeline executor
    pub(crate) conversion: ConversionPipeline,
    /// Notification dispatcher
    pub(crate) notifier: NotificationDispatcher,
}

/// Pluggable backends for [`MediaDownloader::with_backends`]
pub struct Backends {
    /// Fetches media URLs to local files
    pub fetcher: Arc<dyn MediaFetcher>,
    /// Transcodes fetched files
    pub transcoder: Arc<dyn Transcoder>,
    /// Notification tiers, highest priority first
    pub channels: Vec<Arc<dyn NotificationChannel>>,
    /// Alert sound player
    pub sound: Arc<dyn SoundPlayer>,
}

impl Backends {
    /// External-tool backends (yt-dlp, ffmpeg, platform notifiers) for `config`
    pub fn from_config(config: &Config) -> Self {
        Self {
            fetcher: Arc::new(YtDlpFetcher::from_config(&config.tools)),
            transcoder: Arc::new(FfmpegTranscoder::from_config(&config.tools)),
            channels: default_channels(&config.notifications),
            sound: Arc::new(SystemSoundPlayer),
        }
    }
}

/// Main orchestrator instance (cloneable - all fields are Arc-wrapped)
#[derive(Clone)]
pub struct MediaDownloader {
    /// Database instance for persistence (wrapped in Arc for sharing across tasks)
    pub(crate) db: Arc<Database>,
    /// Event broadcast channel sender (multiple subscribers supported)
    pub(crate) event_tx: broadcast::Sender<Event>,
    /// Configuration (wrapped in Arc for sharing across tasks)
    pub(crate) config: Arc<Config>,
    /// Runtime-mutable user preferences
    pub(crate) settings: SettingsStore,
    /// Append-only record of finished jobs
    pub(crate) history: HistoryLedger,
    /// Queue and job state management
    pub(crate) queue_state: QueueState,
    /// Fetch, conversion and notification backends
    pub(crate) processing: ProcessingPipeline,
}

impl MediaDownloader {
    /// Create a new MediaDownloader using the external tools found for `config`
    ///
    /// This initializes all core components:
    /// - Opens/creates the SQLite database and runs migrations
    /// - Loads persisted settings on top of `config.settings.defaults`
    /// - Seeds job ids from the history ledger
    /// - Sets up the event broadcast channel
    /// - Starts the queue processor
    pub async fn new(config: Config) -> Result<Self> {
        let backends = Backends::from_config(&config);
        Self::with_backends(config, backends).await
    }

    /// Create a new MediaDownloader with explicit backends
    pub async fn with_backends(config: Config, backends: Backends) -> Result<Self> {
        config.validate()?;

        let db = Arc::new(Database::new(&config.persistence.database_path).await?);

        // Create broadcast channel with buffer size of 1000 events
        let (event_tx, _rx) = broadcast::channel(1000);

        let settings =
            SettingsStore::open(db.clone(), &config.settings.defaults, config.settings.debounce)
                .await?;
        let history = HistoryLedger::new(db.clone());

        // Ids stay unique across restarts
        let next_id = history.max_job_id().await? + 1;

        let pool_size = settings.get().await.max_concurrent_jobs;

        tracing::info!(
            fetcher = backends.fetcher.name(),
            transcoder = backends.transcoder.name(),
            channels = backends.channels.len(),
            pool_size,
            next_id,
            "Media downloader initialized"
        );

        let conversion =
            ConversionPipeline::new(backends.transcoder, &config.conversion, event_tx.clone());
        let notifier = NotificationDispatcher::new(
            backends.channels,
            backends.sound,
            settings.clone(),
            event_tx.clone(),
            config.notifications.alert_duration,
        );

        let queue_state = QueueState {
            queue: Arc::new(Mutex::new(VecDeque::new())),
            jobs: Arc::new(RwLock::new(HashMap::new())),
            finished: Arc::new(Mutex::new(VecDeque::new())),
            concurrent_limit: Arc::new(Semaphore::new(pool_size)),
            pool_size: Arc::new(AtomicUsize::new(pool_size)),
            active_jobs: Arc::new(Mutex::new(HashSet::new())),
            accepting_new: Arc::new(AtomicBool::new(true)),
            wakeup: Arc::new(Notify::new()),
            shutdown: CancellationToken::new(),
            next_id: Arc::new(AtomicI64::new(next_id)),
        };

        let downloader = Self {
            db,
            event_tx,
            config: Arc::new(config),
            settings,
            history,
            queue_state,
            processing: ProcessingPipeline {
                fetcher: backends.fetcher,
                conversion,
                notifier,
            },
        };

        downloader.start_queue_processor();

        Ok(downloader)
    }

    /// Subscribe to events
    ///
    /// Multiple subscribers are supported. Each subscriber receives all events independently.
    /// Events are buffered, but if a subscriber falls behind by more than 1000 events,
    /// it will receive a `RecvError::Lagged` error.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use audio_hub::{MediaDownloader, Config};
    ///
    /// #[tokio::main]
    /// async fn main() -> Result<(), Box<dyn std::error::Error>> {
    ///     let downloader = MediaDownloader::new(Config::default()).await?;
    ///
    ///     // UI subscriber
    ///     let mut ui_events = downloader.subscribe();
    ///     tokio::spawn(async move {
    ///         while let Ok(event) = ui_events.recv().await {
    ///             println!("UI: {:?}", event);
    ///         }
    ///     });
    ///
    ///     Ok(())
    /// }
    /// ```
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Events as a stream, skipping over any a slow consumer missed
    pub fn event_stream(&self) -> impl tokio_stream::Stream<Item = Event> + Send + 'static {
        use tokio_stream::StreamExt;
        tokio_stream::wrappers::BroadcastStream::new(self.subscribe()).filter_map(|r| r.ok())
    }

    /// Get the current configuration
    pub fn get_config(&self) -> Arc<Config> {
        Arc::clone(&self.config)
    }

    /// Most recent history entries first
    pub async fn history(&self, limit: usize, offset: usize) -> Result<Vec<HistoryEntry>> {
        self.history.query(limit, offset).await
    }

    /// The history ledger backing this orchestrator
    pub fn history_ledger(&self) -> &HistoryLedger {
        &self.history
    }

    /// Convert local files outside of any job
    ///
    /// Items are processed one after another with the current bitrate
    /// setting; see [`ConversionPipeline::convert_batch`].
    pub async fn convert_batch(
        &self,
        items: Vec<BatchItem>,
        cancel: CancellationToken,
    ) -> BatchReport {
        let bitrate = self.settings.get().await.audio_bitrate_kbps;
        self.processing
            .conversion
            .convert_batch(items, bitrate, cancel)
            .await
    }

    /// Emit an event to all subscribers
    ///
    /// If there are no active subscribers, the event is silently dropped.
    pub(crate) fn emit_event(&self, event: Event) {
        // send() returns Err if there are no receivers, which is fine - we just drop the event
        self.event_tx.send(event).ok();
    }

    /// Look up a job record
    pub(crate) async fn job(&self, id: JobId) -> Option<Arc<JobRecord>> {
        self.queue_state.jobs.read().await.get(&id).cloned()
    }

    /// Final state of a job no longer held in memory
    pub(crate) async fn archived_state(&self, id: JobId) -> Result<Option<JobState>> {
        Ok(self
            .history
            .get(id)
            .await?
            .map(|entry| JobState::from_history(&entry)))
    }

    /// Drop the oldest finished records beyond `retained_jobs`
    ///
    /// Only jobs whose history entry was written are passed in, so a pruned
    /// id can always be answered from the ledger.
    pub(crate) async fn retire_job(&self, id: JobId) {
        let evicted: Vec<JobId> = {
            let mut finished = self.queue_state.finished.lock().await;
            finished.push_back(id);
            let excess = finished.len().saturating_sub(self.config.retained_jobs);
            finished.drain(..excess).collect()
        };
        if evicted.is_empty() {
            return;
        }

        let mut jobs = self.queue_state.jobs.write().await;
        for id in &evicted {
            jobs.remove(id);
        }
        tracing::debug!(pruned = evicted.len(), retained = jobs.len(), "Pruned finished jobs");
    }
}
