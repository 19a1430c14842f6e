//! User settings with debounced persistence
//!
//! [`SettingsStore`] holds the single shared [`Settings`] instance. Reads always
//! see the latest in-memory value; writes are validated, applied immediately
//! and persisted by a background task once no further change arrives within
//! the debounce window.
//!
//! On disk the settings are a flat key/value document: one row per camelCase
//! key, each value JSON-encoded. Loading is lenient. Unknown keys are ignored,
//! string-typed booleans (`"1"`, `"yes"`, `"on"`, ...) are accepted, and a value
//! that cannot be parsed falls back to the default for that key.

use crate::db::Database;
use crate::error::{Error, Result};
use crate::types::AudioFormat;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, Notify, RwLock};
use tokio_util::sync::CancellationToken;

/// Upper bound for `maxConcurrentJobs`
pub const MAX_CONCURRENT_JOBS_LIMIT: usize = 64;

/// Upper bound for `maxRetries`
pub const MAX_RETRIES_LIMIT: u32 = 10;

/// Accepted range for `audioBitrateKbps`
pub const BITRATE_RANGE_KBPS: std::ops::RangeInclusive<u32> = 32..=320;

/// Runtime-mutable user preferences
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    /// Where fetched and converted files land (default: `<home>/Downloads`)
    #[serde(default = "default_output_directory")]
    pub output_directory: PathBuf,

    /// Format used when a job does not request one (default: mp3)
    #[serde(default)]
    pub preferred_format: AudioFormat,

    /// Emit in-app visual alerts for finished jobs (default: true)
    #[serde(default = "default_true")]
    pub show_visual_alerts: bool,

    /// Play a sound for finished jobs (default: true)
    #[serde(default = "default_true")]
    pub play_sound_alerts: bool,

    /// Worker pool size (default: 2)
    #[serde(default = "default_max_concurrent_jobs")]
    pub max_concurrent_jobs: usize,

    /// Retries allowed for transient fetch failures (default: 3)
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Fetch only the linked item, never the surrounding playlist (default: true)
    #[serde(default = "default_true")]
    pub no_playlist: bool,

    /// Bitrate for lossy output formats (default: 192)
    #[serde(default = "default_bitrate")]
    pub audio_bitrate_kbps: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            output_directory: default_output_directory(),
            preferred_format: AudioFormat::default(),
            show_visual_alerts: true,
            play_sound_alerts: true,
            max_concurrent_jobs: default_max_concurrent_jobs(),
            max_retries: default_max_retries(),
            no_playlist: true,
            audio_bitrate_kbps: default_bitrate(),
        }
    }
}

impl Settings {
    /// Reject values the orchestrator cannot run with
    pub fn validate(&self) -> Result<()> {
        if !(1..=MAX_CONCURRENT_JOBS_LIMIT).contains(&self.max_concurrent_jobs) {
            return Err(Error::config_key(
                "maxConcurrentJobs",
                format!("maxConcurrentJobs must be between 1 and {MAX_CONCURRENT_JOBS_LIMIT}"),
            ));
        }
        if self.max_retries > MAX_RETRIES_LIMIT {
            return Err(Error::config_key(
                "maxRetries",
                format!("maxRetries must be at most {MAX_RETRIES_LIMIT}"),
            ));
        }
        if !BITRATE_RANGE_KBPS.contains(&self.audio_bitrate_kbps) {
            return Err(Error::config_key(
                "audioBitrateKbps",
                format!(
                    "audioBitrateKbps must be between {} and {}",
                    BITRATE_RANGE_KBPS.start(),
                    BITRATE_RANGE_KBPS.end()
                ),
            ));
        }
        if self.output_directory.as_os_str().is_empty() {
            return Err(Error::config_key(
                "outputDirectory",
                "outputDirectory must not be empty",
            ));
        }
        Ok(())
    }

    /// Flatten into `(camelCaseKey, jsonValue)` rows
    pub fn to_entries(&self) -> Result<Vec<(String, String)>> {
        let value = serde_json::to_value(self)?;
        let serde_json::Value::Object(map) = value else {
            return Err(Error::Config {
                message: "settings did not serialize to an object".to_string(),
                key: None,
            });
        };
        Ok(map.into_iter().map(|(k, v)| (k, v.to_string())).collect())
    }

    /// Rebuild from persisted rows on top of `defaults`
    ///
    /// Each row is applied on its own; a row that is unknown, unparseable or
    /// invalid is skipped with a warning and the default for that key stays.
    pub fn from_entries(defaults: &Settings, entries: &[(String, String)]) -> Settings {
        let mut current = defaults.clone();

        for (key, raw) in entries {
            let Ok(serde_json::Value::Object(mut map)) = serde_json::to_value(&current) else {
                return current;
            };
            let Some(default_value) = map.get(key) else {
                tracing::debug!(key = %key, "Ignoring unknown settings key");
                continue;
            };

            let value = decode_value(default_value, raw);
            map.insert(key.clone(), value);

            match serde_json::from_value::<Settings>(serde_json::Value::Object(map)) {
                Ok(candidate) if candidate.validate().is_ok() => current = candidate,
                Ok(_) | Err(_) => {
                    tracing::warn!(
                        key = %key,
                        value = %raw,
                        "Ignoring invalid persisted setting, keeping default"
                    );
                }
            }
        }

        current
    }
}

/// Decode a stored value, using the default's JSON type as a hint
fn decode_value(default_value: &serde_json::Value, raw: &str) -> serde_json::Value {
    let parsed = serde_json::from_str::<serde_json::Value>(raw)
        .unwrap_or_else(|_| serde_json::Value::String(raw.to_string()));

    let coerced = match (default_value, &parsed) {
        (serde_json::Value::Bool(_), serde_json::Value::String(s)) => {
            parse_bool_str(s).map(serde_json::Value::Bool)
        }
        (serde_json::Value::Bool(_), serde_json::Value::Number(n)) => {
            Some(serde_json::Value::Bool(n.as_i64().is_some_and(|v| v != 0)))
        }
        (serde_json::Value::Number(_), serde_json::Value::String(s)) => s
            .trim()
            .parse::<u64>()
            .ok()
            .map(|n| serde_json::Value::Number(n.into())),
        _ => None,
    };

    coerced.unwrap_or(parsed)
}

/// Lenient boolean parsing for values written by older front-ends
fn parse_bool_str(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}

/// Partial settings update; `None` leaves a field unchanged
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsUpdate {
    /// New output directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_directory: Option<PathBuf>,
    /// New default format
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_format: Option<AudioFormat>,
    /// Toggle visual alerts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub show_visual_alerts: Option<bool>,
    /// Toggle sound alerts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub play_sound_alerts: Option<bool>,
    /// Resize the worker pool
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_concurrent_jobs: Option<usize>,
    /// Change the retry budget
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,
    /// Toggle playlist suppression
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub no_playlist: Option<bool>,
    /// Change the lossy bitrate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_bitrate_kbps: Option<u32>,
}

impl SettingsUpdate {
    /// Produce the settings that result from applying this update to `base`
    pub fn apply(&self, base: &Settings) -> Settings {
        Settings {
            output_directory: self
                .output_directory
                .clone()
                .unwrap_or_else(|| base.output_directory.clone()),
            preferred_format: self.preferred_format.unwrap_or(base.preferred_format),
            show_visual_alerts: self.show_visual_alerts.unwrap_or(base.show_visual_alerts),
            play_sound_alerts: self.play_sound_alerts.unwrap_or(base.play_sound_alerts),
            max_concurrent_jobs: self.max_concurrent_jobs.unwrap_or(base.max_concurrent_jobs),
            max_retries: self.max_retries.unwrap_or(base.max_retries),
            no_playlist: self.no_playlist.unwrap_or(base.no_playlist),
            audio_bitrate_kbps: self.audio_bitrate_kbps.unwrap_or(base.audio_bitrate_kbps),
        }
    }
}

struct StoreInner {
    current: RwLock<Settings>,
    db: Arc<Database>,
    debounce: Duration,
    dirty: Notify,
    /// Bumped on every accepted change
    generation: AtomicU64,
    /// Generation most recently written to disk
    persisted_generation: AtomicU64,
    /// Serializes writers so an older snapshot never lands after a newer one
    write_lock: Mutex<()>,
    writes: AtomicU64,
    shutdown: CancellationToken,
}

/// Shared, lockable settings with debounced persistence (cheap to clone)
#[derive(Clone)]
pub struct SettingsStore {
    inner: Arc<StoreInner>,
}

impl SettingsStore {
    /// Load persisted settings on top of `defaults` and start the persister task
    pub async fn open(db: Arc<Database>, defaults: &Settings, debounce: Duration) -> Result<Self> {
        defaults.validate()?;
        let entries = db.load_settings().await?;
        let loaded = Settings::from_entries(defaults, &entries);

        tracing::info!(
            keys = entries.len(),
            output_directory = %loaded.output_directory.display(),
            format = %loaded.preferred_format,
            "Settings loaded"
        );

        let store = Self {
            inner: Arc::new(StoreInner {
                current: RwLock::new(loaded),
                db,
                debounce,
                dirty: Notify::new(),
                generation: AtomicU64::new(0),
                persisted_generation: AtomicU64::new(0),
                write_lock: Mutex::new(()),
                writes: AtomicU64::new(0),
                shutdown: CancellationToken::new(),
            }),
        };

        let persister = store.clone();
        tokio::spawn(async move {
            persister.run_persister().await;
        });

        Ok(store)
    }

    /// Snapshot of the current settings
    pub async fn get(&self) -> Settings {
        self.inner.current.read().await.clone()
    }

    /// Validate and apply an update, scheduling a debounced write
    ///
    /// Returns the settings now in effect. An update that changes nothing
    /// schedules no write.
    pub async fn update(&self, update: &SettingsUpdate) -> Result<Settings> {
        let (settings, _changed) = self.update_with(update, |_| {}).await?;
        Ok(settings)
    }

    /// Apply an update and run `on_change` while the write lock is still held
    ///
    /// `on_change` sees the new settings and only runs when something changed,
    /// so state mirrored from a setting is updated in the same order as the
    /// settings themselves. Returns the settings in effect and whether the
    /// update changed anything.
    pub(crate) async fn update_with<F>(
        &self,
        update: &SettingsUpdate,
        on_change: F,
    ) -> Result<(Settings, bool)>
    where
        F: FnOnce(&Settings),
    {
        let mut current = self.inner.current.write().await;
        let next = update.apply(&current);
        next.validate()?;

        if next == *current {
            return Ok((next, false));
        }

        *current = next.clone();
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        on_change(&next);
        drop(current);

        self.inner.dirty.notify_one();
        tracing::debug!("Settings updated, write scheduled");
        Ok((next, true))
    }

    /// Write pending changes immediately
    pub async fn flush(&self) -> Result<()> {
        self.persist().await
    }

    /// Flush and stop the persister task
    pub async fn close(&self) -> Result<()> {
        self.inner.shutdown.cancel();
        self.persist().await
    }

    /// Number of writes that reached the database
    pub(crate) fn write_count(&self) -> u64 {
        self.inner.writes.load(Ordering::SeqCst)
    }

    async fn persist(&self) -> Result<()> {
        let _guard = self.inner.write_lock.lock().await;

        let generation = self.inner.generation.load(Ordering::SeqCst);
        if generation == self.inner.persisted_generation.load(Ordering::SeqCst) {
            return Ok(());
        }

        let snapshot = self.inner.current.read().await.clone();
        self.inner.db.save_settings(&snapshot.to_entries()?).await?;

        self.inner
            .persisted_generation
            .store(generation, Ordering::SeqCst);
        self.inner.writes.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(generation, "Settings persisted");
        Ok(())
    }

    async fn run_persister(&self) {
        loop {
            tokio::select! {
                _ = self.inner.shutdown.cancelled() => return,
                _ = self.inner.dirty.notified() => {}
            }

            // Restart the quiet period on every further change
            loop {
                tokio::select! {
                    _ = self.inner.shutdown.cancelled() => return,
                    _ = self.inner.dirty.notified() => continue,
                    _ = tokio::time::sleep(self.inner.debounce) => break,
                }
            }

            if let Err(e) = self.persist().await {
                tracing::error!(error = %e, "Failed to persist settings");
            }
        }
    }
}

fn default_output_directory() -> PathBuf {
    std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .filter(|home| !home.is_empty())
        .map(|home| PathBuf::from(home).join("Downloads"))
        .unwrap_or_else(|| PathBuf::from("./downloads"))
}

fn default_true() -> bool {
    true
}

fn default_max_concurrent_jobs() -> usize {
    2
}

fn default_max_retries() -> u32 {
    3
}

fn default_bitrate() -> u32 {
    192
}
