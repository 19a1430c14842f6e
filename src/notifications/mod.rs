//! Notification dispatch for terminal job events
//!
//! A [`NotificationEvent`] is published on the event bus and then delivered
//! in the background:
//! 1. Visual layer: [`Event::VisualAlert`] plus a later [`Event::VisualAlertDismissed`]
//! 2. Sound layer: info or error sound
//! 3. Channel tiers: webhook, native toast, shell; first success wins
//!
//! Cancelled jobs are only published; they skip all three layers.

use crate::config::NotificationConfig;
use crate::settings::SettingsStore;
use crate::types::{Event, NotificationEvent, NotificationKind, duration_ms};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

mod channels;
mod sound;

pub use channels::{
    NativeToastNotifier, NotificationChannel, ShellNotifier, ToastTool, WebhookNotifier,
};
pub use sound::{NoOpSoundPlayer, SoundKind, SoundPlayer, SystemSoundPlayer};

/// Standard tier chain for `config`
///
/// Webhook (when configured), then the platform toast binary (when enabled),
/// then the shell fallback.
pub fn default_channels(config: &NotificationConfig) -> Vec<Arc<dyn NotificationChannel>> {
    let mut channels: Vec<Arc<dyn NotificationChannel>> = Vec::new();
    if let Some(webhook) = &config.webhook {
        channels.push(Arc::new(WebhookNotifier::new(
            webhook.clone(),
            config.app_name.clone(),
        )));
    }
    if config.native_toasts {
        channels.push(Arc::new(NativeToastNotifier::detect(
            config.app_name.clone(),
        )));
    }
    channels.push(Arc::new(ShellNotifier::new(config.app_name.clone())));
    channels
}

/// Turns terminal job events into user-visible alerts (cheap to clone)
#[derive(Clone)]
pub struct NotificationDispatcher {
    /// Channel tiers in priority order
    channels: Arc<Vec<Arc<dyn NotificationChannel>>>,
    /// Sound layer
    sound: Arc<dyn SoundPlayer>,
    /// Read for the visual/sound toggles at dispatch time
    settings: SettingsStore,
    /// Event channel for notification and alert events
    event_tx: broadcast::Sender<Event>,
    /// How long visual alerts stay up
    alert_duration: Duration,
}

impl NotificationDispatcher {
    /// Dispatcher with an explicit tier list and sound player
    pub fn new(
        channels: Vec<Arc<dyn NotificationChannel>>,
        sound: Arc<dyn SoundPlayer>,
        settings: SettingsStore,
        event_tx: broadcast::Sender<Event>,
        alert_duration: Duration,
    ) -> Self {
        Self {
            channels: Arc::new(channels),
            sound,
            settings,
            event_tx,
            alert_duration,
        }
    }

    /// Dispatcher using the standard tier chain for `config`
    pub fn from_config(
        config: &NotificationConfig,
        settings: SettingsStore,
        event_tx: broadcast::Sender<Event>,
    ) -> Self {
        Self::new(
            default_channels(config),
            Arc::new(SystemSoundPlayer),
            settings,
            event_tx,
            config.alert_duration,
        )
    }

    /// Names of the configured tiers, highest priority first
    pub fn channel_names(&self) -> Vec<String> {
        self.channels.iter().map(|c| c.name().to_string()).collect()
    }

    /// Publish `event` and deliver it in the background
    ///
    /// Never fails and never waits for delivery. The returned handle resolves
    /// once every tier has been tried.
    pub fn dispatch(&self, event: NotificationEvent) -> JoinHandle<()> {
        self.event_tx.send(Event::Notification(event.clone())).ok();

        let dispatcher = self.clone();
        tokio::spawn(async move {
            dispatcher.deliver(&event).await;
        })
    }

    async fn deliver(&self, event: &NotificationEvent) {
        if event.kind == NotificationKind::Cancelled {
            debug!(job_id = event.job_id.0, "cancelled job, skipping alert layers");
            return;
        }

        let settings = self.settings.get().await;

        if settings.show_visual_alerts {
            self.show_visual_alert(event);
        }

        if settings.play_sound_alerts {
            let kind = match event.kind {
                NotificationKind::Failed => SoundKind::Error,
                _ => SoundKind::Info,
            };
            self.sound.play(kind).await;
        }

        self.deliver_to_channels(event).await;
    }

    fn show_visual_alert(&self, event: &NotificationEvent) {
        self.event_tx
            .send(Event::VisualAlert {
                job_id: event.job_id,
                kind: event.kind,
                title: event.title.clone(),
                detail: event.detail.clone(),
                dismiss_after_ms: duration_ms(self.alert_duration),
            })
            .ok();

        let event_tx = self.event_tx.clone();
        let job_id = event.job_id;
        let after = self.alert_duration;
        tokio::spawn(async move {
            tokio::time::sleep(after).await;
            event_tx.send(Event::VisualAlertDismissed { job_id }).ok();
        });
    }

    async fn deliver_to_channels(&self, event: &NotificationEvent) {
        for channel in self.channels.iter() {
            if !channel.is_available().await {
                debug!(channel = channel.name(), "notification channel unavailable");
                continue;
            }

            match channel
                .show(&event.title, &event.detail, self.alert_duration)
                .await
            {
                Ok(()) => {
                    info!(
                        job_id = event.job_id.0,
                        channel = channel.name(),
                        "notification delivered"
                    );
                    self.event_tx
                        .send(Event::NotificationDelivered {
                            job_id: event.job_id,
                            channel: channel.name().to_string(),
                        })
                        .ok();
                    return;
                }
                Err(e) => {
                    warn!(
                        job_id = event.job_id.0,
                        channel = channel.name(),
                        error = %e,
                        "notification channel failed, falling back"
                    );
                }
            }
        }

        warn!(job_id = event.job_id.0, "no notification channel delivered");
    }
}
