//! Alert sounds

use async_trait::async_trait;
use std::process::Stdio;
use tokio::process::Command;

/// Which alert sound to play
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SoundKind {
    /// Informational chime (job completed)
    Info,
    /// Error sound (job failed)
    Error,
}

/// Trait for playing alert sounds
///
/// Playing is best effort: implementations swallow their own failures.
#[async_trait]
pub trait SoundPlayer: Send + Sync {
    /// Play the sound for `kind`
    async fn play(&self, kind: SoundKind);
}

/// Plays the platform's stock alert sounds through a system command
pub struct SystemSoundPlayer;

impl SystemSoundPlayer {
    /// Program and arguments for the current platform
    pub(crate) fn command(kind: SoundKind) -> (&'static str, Vec<&'static str>) {
        if cfg!(windows) {
            let script = match kind {
                SoundKind::Info => "[System.Media.SystemSounds]::Asterisk.Play()",
                SoundKind::Error => "[System.Media.SystemSounds]::Hand.Play()",
            };
            ("powershell", vec!["-NoProfile", "-NonInteractive", "-Command", script])
        } else if cfg!(target_os = "macos") {
            let file = match kind {
                SoundKind::Info => "/System/Library/Sounds/Glass.aiff",
                SoundKind::Error => "/System/Library/Sounds/Basso.aiff",
            };
            ("afplay", vec![file])
        } else {
            let id = match kind {
                SoundKind::Info => "dialog-information",
                SoundKind::Error => "dialog-error",
            };
            ("canberra-gtk-play", vec!["-i", id])
        }
    }
}

#[async_trait]
impl SoundPlayer for SystemSoundPlayer {
    async fn play(&self, kind: SoundKind) {
        let (program, args) = Self::command(kind);
        let result = Command::new(program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn();

        if let Err(e) = result {
            tracing::debug!(program, error = %e, "Failed to play alert sound");
        }
    }
}

/// Sound player that stays silent
///
/// Used when no audio output is wanted, such as in headless deployments.
pub struct NoOpSoundPlayer;

#[async_trait]
impl SoundPlayer for NoOpSoundPlayer {
    async fn play(&self, _kind: SoundKind) {}
}
