//! Configuration types for audio-hub
//!
//! [`Config`] is static for the lifetime of a [`MediaDownloader`](crate::MediaDownloader).
//! User preferences that change at runtime live in the
//! [`SettingsStore`](crate::settings::SettingsStore); `Config::settings.defaults`
//! only seeds it on first start.

use crate::error::{Error, Result};
use crate::settings::Settings;
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

/// External tool paths (yt-dlp, ffmpeg, ffprobe)
///
/// Groups settings for external binaries.
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Path to yt-dlp executable (auto-detected if None)
    #[serde(default)]
    pub yt_dlp_path: Option<PathBuf>,

    /// Path to ffmpeg executable (auto-detected if None)
    #[serde(default)]
    pub ffmpeg_path: Option<PathBuf>,

    /// Path to ffprobe executable (auto-detected if None)
    #[serde(default)]
    pub ffprobe_path: Option<PathBuf>,

    /// Whether to search PATH for external binaries if explicit paths not set (default: true)
    #[serde(default = "default_true")]
    pub search_path: bool,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            yt_dlp_path: None,
            ffmpeg_path: None,
            ffprobe_path: None,
            search_path: true,
        }
    }
}

impl ToolsConfig {
    /// Resolve a tool: explicit path first, then PATH lookup if allowed
    pub fn resolve(&self, explicit: Option<&PathBuf>, binary: &str) -> Option<PathBuf> {
        if let Some(path) = explicit {
            return Some(path.clone());
        }
        if self.search_path {
            which::which(binary).ok()
        } else {
            None
        }
    }
}

/// Retry configuration for transient fetch failures
///
/// The retry budget itself (`maxRetries`) is a user setting; this only shapes
/// the backoff curve.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Initial delay before first retry (default: 1 second)
    #[serde(default = "default_initial_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 30 seconds)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: false)
    ///
    /// With jitter enabled, consecutive delays are no longer guaranteed to be
    /// non-decreasing.
    #[serde(default)]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: false,
        }
    }
}

/// How fetch and conversion share a job's 0-100% progress range
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProgressConfig {
    /// Fraction of the range assigned to fetching (default: 0.7)
    #[serde(default = "default_fetch_share")]
    pub fetch_share: f32,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            fetch_share: default_fetch_share(),
        }
    }
}

/// Settings store configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SettingsConfig {
    /// Quiet period before a settings change is written to disk (default: 500ms)
    #[serde(default = "default_debounce", with = "duration_ms_serde")]
    pub debounce: Duration,

    /// Values used for keys that have never been persisted
    #[serde(default)]
    pub defaults: Settings,
}

impl Default for SettingsConfig {
    fn default() -> Self {
        Self {
            debounce: default_debounce(),
            defaults: Settings::default(),
        }
    }
}

/// Notification configuration (push webhook, native toasts, visual alerts)
///
/// Groups settings for the notification tiers.
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NotificationConfig {
    /// Application name shown as the notification source (default: "Audio Hub")
    #[serde(default = "default_app_name")]
    pub app_name: String,

    /// Push webhook (None = enhanced tier unavailable)
    #[serde(default)]
    pub webhook: Option<WebhookConfig>,

    /// Try the platform toast binary tier (default: true)
    #[serde(default = "default_true")]
    pub native_toasts: bool,

    /// How long OS notifications and visual alerts stay up (default: 3000ms)
    #[serde(default = "default_alert_duration", with = "duration_ms_serde")]
    pub alert_duration: Duration,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            app_name: default_app_name(),
            webhook: None,
            native_toasts: true,
            alert_duration: default_alert_duration(),
        }
    }
}

/// Push webhook configuration (ntfy, gotify, or any JSON endpoint)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WebhookConfig {
    /// URL to POST to
    pub url: String,

    /// Optional authentication header value
    #[serde(default)]
    pub auth_header: Option<String>,

    /// Timeout for webhook requests (default: 10 seconds)
    #[serde(default = "default_webhook_timeout", with = "duration_serde")]
    pub timeout: Duration,
}

/// Conversion pipeline configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConversionConfig {
    /// Keep the fetched source file after a successful conversion (default: true)
    #[serde(default = "default_true")]
    pub keep_source: bool,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self { keep_source: true }
    }
}

/// Data storage configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Database path (default: "./audio-hub.db")
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

/// Main configuration for MediaDownloader
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// Data storage
    #[serde(default)]
    pub persistence: PersistenceConfig,

    /// External tool paths
    #[serde(default)]
    pub tools: ToolsConfig,

    /// Backoff shape for transient fetch failures
    #[serde(default)]
    pub retry: RetryConfig,

    /// Progress weighting between fetch and conversion
    #[serde(default)]
    pub progress: ProgressConfig,

    /// Settings store behaviour and first-run defaults
    #[serde(default)]
    pub settings: SettingsConfig,

    /// Notification tiers
    #[serde(default)]
    pub notifications: NotificationConfig,

    /// Conversion pipeline
    #[serde(default)]
    pub conversion: ConversionConfig,

    /// Upper bound on how long shutdown waits for running jobs (default: 10 seconds)
    #[serde(default = "default_shutdown_timeout", with = "duration_serde")]
    pub shutdown_timeout: Duration,

    /// Finished jobs kept in memory for `progress`/`watch_job`/`jobs` (default: 256)
    ///
    /// Older finished jobs are dropped; their final state is then served from
    /// the history ledger.
    #[serde(default = "default_retained_jobs")]
    pub retained_jobs: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            persistence: PersistenceConfig::default(),
            tools: ToolsConfig::default(),
            retry: RetryConfig::default(),
            progress: ProgressConfig::default(),
            settings: SettingsConfig::default(),
            notifications: NotificationConfig::default(),
            conversion: ConversionConfig::default(),
            shutdown_timeout: default_shutdown_timeout(),
            retained_jobs: default_retained_jobs(),
        }
    }
}

impl Config {
    /// Check values that serde cannot constrain
    pub fn validate(&self) -> Result<()> {
        let share = self.progress.fetch_share;
        if !(share > 0.0 && share <= 1.0) {
            return Err(Error::Config {
                message: format!("fetch_share must be in (0, 1], got {share}"),
                key: Some("progress.fetch_share".to_string()),
            });
        }
        if self.retry.backoff_multiplier < 1.0 {
            return Err(Error::Config {
                message: "backoff_multiplier must be at least 1.0".to_string(),
                key: Some("retry.backoff_multiplier".to_string()),
            });
        }
        if let Some(webhook) = &self.notifications.webhook {
            url::Url::parse(&webhook.url).map_err(|e| Error::Config {
                message: format!("invalid webhook url: {e}"),
                key: Some("notifications.webhook.url".to_string()),
            })?;
        }
        self.settings.defaults.validate()
    }
}

fn default_true() -> bool {
    true
}

fn default_database_path() -> PathBuf {
    PathBuf::from("./audio-hub.db")
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(30)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_fetch_share() -> f32 {
    0.7
}

fn default_debounce() -> Duration {
    Duration::from_millis(500)
}

fn default_app_name() -> String {
    "Audio Hub".to_string()
}

fn default_alert_duration() -> Duration {
    Duration::from_secs(3)
}

fn default_webhook_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_shutdown_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_retained_jobs() -> usize {
    256
}

// Duration serialization helper
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

// Millisecond Duration serialization helper for sub-second windows
mod duration_ms_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(crate::types::duration_ms(*duration))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let ms = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(ms))
    }
}
