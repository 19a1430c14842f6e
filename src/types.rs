//! Core types for audio-hub

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Unique identifier for a job
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub i64);

impl JobId {
    /// Create a new JobId
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    /// Get the inner i64 value
    pub fn get(&self) -> i64 {
        self.0
    }
}

impl From<i64> for JobId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl From<JobId> for i64 {
    fn from(id: JobId) -> Self {
        id.0
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for JobId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

// Implement sqlx Type, Encode, and Decode for database operations
impl sqlx::Type<sqlx::Sqlite> for JobId {
    fn type_info() -> sqlx::sqlite::SqliteTypeInfo {
        <i64 as sqlx::Type<sqlx::Sqlite>>::type_info()
    }

    fn compatible(ty: &sqlx::sqlite::SqliteTypeInfo) -> bool {
        <i64 as sqlx::Type<sqlx::Sqlite>>::compatible(ty)
    }
}

impl<'q> sqlx::Encode<'q, sqlx::Sqlite> for JobId {
    fn encode_by_ref(
        &self,
        buf: &mut Vec<sqlx::sqlite::SqliteArgumentValue<'q>>,
    ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
        sqlx::Encode::<sqlx::Sqlite>::encode_by_ref(&self.0, buf)
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Sqlite> for JobId {
    fn decode(value: sqlx::sqlite::SqliteValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let id = <i64 as sqlx::Decode<sqlx::Sqlite>>::decode(value)?;
        Ok(Self(id))
    }
}

/// Target audio format
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    /// MPEG-1 Layer III
    #[default]
    Mp3,
    /// AAC in an MPEG-4 container
    M4a,
    /// Uncompressed 16-bit PCM
    Wav,
    /// Free Lossless Audio Codec
    Flac,
    /// Vorbis in an Ogg container
    Ogg,
    /// Windows Media Audio
    Wma,
}

impl AudioFormat {
    /// Every supported format, in presentation order
    pub const ALL: [AudioFormat; 6] = [
        AudioFormat::Mp3,
        AudioFormat::M4a,
        AudioFormat::Wav,
        AudioFormat::Flac,
        AudioFormat::Ogg,
        AudioFormat::Wma,
    ];

    /// File extension (without the dot)
    pub fn extension(&self) -> &'static str {
        match self {
            AudioFormat::Mp3 => "mp3",
            AudioFormat::M4a => "m4a",
            AudioFormat::Wav => "wav",
            AudioFormat::Flac => "flac",
            AudioFormat::Ogg => "ogg",
            AudioFormat::Wma => "wma",
        }
    }

    /// ffmpeg audio encoder name
    pub fn codec(&self) -> &'static str {
        match self {
            AudioFormat::Mp3 => "libmp3lame",
            AudioFormat::M4a => "aac",
            AudioFormat::Wav => "pcm_s16le",
            AudioFormat::Flac => "flac",
            AudioFormat::Ogg => "libvorbis",
            AudioFormat::Wma => "wmav2",
        }
    }

    /// Lossless formats ignore the bitrate setting
    pub fn is_lossless(&self) -> bool {
        matches!(self, AudioFormat::Wav | AudioFormat::Flac)
    }

    /// Detect the format of an existing file from its extension
    pub fn from_path(path: &std::path::Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(|e| e.parse().ok())
    }
}

impl std::fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.extension())
    }
}

impl std::str::FromStr for AudioFormat {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mp3" => Ok(AudioFormat::Mp3),
            "m4a" | "aac" => Ok(AudioFormat::M4a),
            "wav" => Ok(AudioFormat::Wav),
            "flac" => Ok(AudioFormat::Flac),
            "ogg" | "vorbis" => Ok(AudioFormat::Ogg),
            "wma" => Ok(AudioFormat::Wma),
            other => Err(crate::Error::InvalidRequest(format!(
                "unsupported audio format: {other}"
            ))),
        }
    }
}

/// Job phase
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// Waiting for a worker slot
    Queued,
    /// External fetch tool is running
    Fetching,
    /// Transcoder is running
    Converting,
    /// Finished with an output file
    Succeeded,
    /// Finished with an error
    Failed,
    /// Stopped at the user's request
    Cancelled,
}

impl Phase {
    /// Whether this phase is terminal
    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Succeeded | Phase::Failed | Phase::Cancelled)
    }
}

/// Terminal outcome recorded in history
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    /// Output file produced
    Succeeded,
    /// Fetch or conversion failed
    Failed,
    /// Cancelled before finishing
    Cancelled,
}

impl Outcome {
    /// Stable string stored in the database
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Succeeded => "succeeded",
            Outcome::Failed => "failed",
            Outcome::Cancelled => "cancelled",
        }
    }

    /// Parse the stored string, defaulting to Failed for unknown values
    pub fn from_db(value: &str) -> Self {
        match value {
            "succeeded" => Outcome::Succeeded,
            "cancelled" => Outcome::Cancelled,
            _ => Outcome::Failed,
        }
    }

    /// The outcome a terminal phase maps to
    pub fn from_phase(phase: Phase) -> Option<Self> {
        match phase {
            Phase::Succeeded => Some(Outcome::Succeeded),
            Phase::Failed => Some(Outcome::Failed),
            Phase::Cancelled => Some(Outcome::Cancelled),
            Phase::Queued | Phase::Fetching | Phase::Converting => None,
        }
    }

    /// Terminal phase of this outcome
    pub fn phase(&self) -> Phase {
        match self {
            Outcome::Succeeded => Phase::Succeeded,
            Outcome::Failed => Phase::Failed,
            Outcome::Cancelled => Phase::Cancelled,
        }
    }
}

/// What the caller submits
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct NewJob {
    /// Source media URL
    pub url: String,
    /// Requested output format (None = `Settings::preferred_format`)
    #[serde(default)]
    pub format: Option<AudioFormat>,
    /// Output directory (None = `Settings::output_directory`)
    #[serde(default)]
    pub output_directory: Option<PathBuf>,
}

impl NewJob {
    /// Job for `url` using the current settings for everything else
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Override the output format
    pub fn with_format(mut self, format: AudioFormat) -> Self {
        self.format = Some(format);
        self
    }

    /// Override the output directory
    pub fn with_output_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_directory = Some(dir.into());
        self
    }
}

/// Immutable request owned by the orchestrator
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JobRequest {
    /// Job identifier assigned at submission
    pub id: JobId,
    /// Validated source URL
    pub source_url: String,
    /// Format the result must end up in
    pub requested_format: AudioFormat,
    /// Directory the fetched and converted files are written to
    pub output_directory: PathBuf,
    /// Submission time
    pub created_at: DateTime<Utc>,
}

/// Snapshot of a job's mutable state
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JobState {
    /// Job identifier
    pub id: JobId,
    /// Current phase
    pub phase: Phase,
    /// Overall progress (0.0 to 100.0)
    pub progress_percent: f32,
    /// Present iff `phase == Failed`
    pub error_detail: Option<String>,
    /// Present iff `phase == Succeeded`
    pub result_path: Option<PathBuf>,
    /// Fetch attempts made so far
    pub attempts: u32,
}

impl JobState {
    /// Initial state of a freshly submitted job
    pub fn queued(id: JobId) -> Self {
        Self {
            id,
            phase: Phase::Queued,
            progress_percent: 0.0,
            error_detail: None,
            result_path: None,
            attempts: 0,
        }
    }

    /// Final state of a job that is only known from the history ledger
    ///
    /// Progress and attempt counts are not recorded there; a succeeded job
    /// reports 100%, anything else 0%.
    pub fn from_history(entry: &HistoryEntry) -> Self {
        let phase = entry.outcome.phase();
        Self {
            id: entry.job_id,
            phase,
            progress_percent: if phase == Phase::Succeeded { 100.0 } else { 0.0 },
            error_detail: entry.error_detail.clone(),
            result_path: entry.file_path.clone(),
            attempts: 0,
        }
    }
}

/// Kind of a notification event
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    /// Job succeeded
    Completed,
    /// Job failed
    Failed,
    /// Job was cancelled by the user or by shutdown
    Cancelled,
}

/// Produced exactly once per terminal job state
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NotificationEvent {
    /// Job the notification is about
    pub job_id: JobId,
    /// What happened
    pub kind: NotificationKind,
    /// Short headline
    pub title: String,
    /// Body text (file name, error message, ...)
    pub detail: String,
    /// When the terminal state was reached
    pub timestamp: DateTime<Utc>,
}

/// History record of a terminal job
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Job identifier
    pub job_id: JobId,
    /// Source URL the job was submitted with
    pub source_url: String,
    /// Requested output format
    pub format: AudioFormat,
    /// Terminal outcome
    pub outcome: Outcome,
    /// When the job reached its terminal phase
    pub timestamp: DateTime<Utc>,
    /// Output file for successful jobs
    pub file_path: Option<PathBuf>,
    /// Error message for failed jobs
    pub error_detail: Option<String>,
}

/// Event emitted by the core
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Job accepted and queued
    JobQueued {
        /// Job ID
        id: JobId,
        /// Source URL
        url: String,
        /// Requested format
        format: AudioFormat,
    },

    /// Job changed phase
    PhaseChanged {
        /// Job ID
        id: JobId,
        /// New phase
        phase: Phase,
    },

    /// Job progress update
    Progress {
        /// Job ID
        id: JobId,
        /// Current phase
        phase: Phase,
        /// Overall progress (0.0 to 100.0)
        percent: f32,
    },

    /// Transient fetch failure, retry scheduled
    Retrying {
        /// Job ID
        id: JobId,
        /// Retry number (1-based)
        attempt: u32,
        /// Configured retry budget
        max_retries: u32,
        /// Backoff before the retry, in milliseconds
        delay_ms: u64,
        /// The transient error
        error: String,
    },

    /// Job finished with an output file
    JobSucceeded {
        /// Job ID
        id: JobId,
        /// Final output path
        path: PathBuf,
    },

    /// Job failed
    JobFailed {
        /// Job ID
        id: JobId,
        /// Error message
        error: String,
    },

    /// Job cancelled
    JobCancelled {
        /// Job ID
        id: JobId,
    },

    /// Terminal notification produced for a job
    Notification(NotificationEvent),

    /// A notification tier delivered the alert
    NotificationDelivered {
        /// Job ID
        job_id: JobId,
        /// Channel name
        channel: String,
    },

    /// Non-blocking in-app alert the UI should show
    VisualAlert {
        /// Job ID
        job_id: JobId,
        /// What happened
        kind: NotificationKind,
        /// Headline
        title: String,
        /// Body text
        detail: String,
        /// Time until the alert closes itself, in milliseconds
        dismiss_after_ms: u64,
    },

    /// A visual alert reached its display interval
    VisualAlertDismissed {
        /// Job ID
        job_id: JobId,
    },

    /// Progress of one item of a conversion batch
    BatchItemProgress {
        /// Batch identifier
        batch: u64,
        /// Item index within the batch
        index: usize,
        /// Item progress (0.0 to 100.0)
        percent: f32,
    },

    /// One item of a conversion batch finished
    BatchItemFinished {
        /// Batch identifier
        batch: u64,
        /// Item index within the batch
        index: usize,
        /// Output path when the item succeeded
        output: Option<PathBuf>,
        /// Error message when the item failed or was cancelled
        error: Option<String>,
    },

    /// Settings were updated
    SettingsChanged,

    /// Graceful shutdown initiated
    Shutdown,
}

/// Convert a Duration to whole milliseconds for event payloads
pub(crate) fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
