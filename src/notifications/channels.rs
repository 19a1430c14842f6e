//! Notification channels, from the richest provider down to the shell fallback

use crate::config::WebhookConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

/// How long a toast binary may take before the tier is considered failed
const TOAST_TIMEOUT: Duration = Duration::from_secs(5);

/// Trait for a user-visible notification channel
///
/// Channels are tried in order by the dispatcher. A channel that is not
/// available, or whose `show` fails, is skipped in favour of the next one.
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    /// Channel name, reported in [`Event::NotificationDelivered`](crate::Event::NotificationDelivered)
    fn name(&self) -> &str;

    /// Whether this channel can be used on this machine right now
    async fn is_available(&self) -> bool;

    /// Show a notification
    ///
    /// `duration` is a display hint; channels that cannot honour it ignore it.
    async fn show(&self, title: &str, body: &str, duration: Duration) -> Result<()>;
}

/// JSON body posted by [`WebhookNotifier`]
#[derive(Debug, Serialize)]
struct WebhookMessage<'a> {
    app: &'a str,
    title: &'a str,
    message: &'a str,
    timeout_ms: u64,
    timestamp: i64,
}

/// Push notifications through a configured HTTP endpoint (ntfy, gotify, ...)
pub struct WebhookNotifier {
    client: reqwest::Client,
    config: WebhookConfig,
    app_name: String,
}

impl WebhookNotifier {
    /// Notifier posting to `config.url`
    pub fn new(config: WebhookConfig, app_name: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
            app_name: app_name.into(),
        }
    }

    fn delivery_error(&self, reason: String) -> Error {
        Error::NotificationDelivery {
            channel: self.name().to_string(),
            reason,
        }
    }
}

#[async_trait]
impl NotificationChannel for WebhookNotifier {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn is_available(&self) -> bool {
        !self.config.url.trim().is_empty()
    }

    async fn show(&self, title: &str, body: &str, duration: Duration) -> Result<()> {
        let payload = WebhookMessage {
            app: &self.app_name,
            title,
            message: body,
            timeout_ms: crate::types::duration_ms(duration),
            timestamp: chrono::Utc::now().timestamp(),
        };

        let mut request = self
            .client
            .post(&self.config.url)
            .json(&payload)
            .timeout(self.config.timeout);

        // Add authentication header if configured
        if let Some(auth) = &self.config.auth_header {
            request = request.header("Authorization", auth);
        }

        let response = match tokio::time::timeout(self.config.timeout, request.send()).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => return Err(Error::Network(e)),
            Err(_) => {
                return Err(self.delivery_error(format!(
                    "Webhook timed out after {:?}",
                    self.config.timeout
                )));
            }
        };

        if !response.status().is_success() {
            return Err(self.delivery_error(format!(
                "Webhook returned status {}: {}",
                response.status(),
                response.text().await.unwrap_or_default()
            )));
        }

        tracing::debug!(url = %self.config.url, "webhook notification sent");
        Ok(())
    }
}

/// Platform toast binary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToastTool {
    /// `notify-send` (libnotify, Linux/BSD)
    NotifySend,
    /// `terminal-notifier` (macOS)
    TerminalNotifier,
    /// `snoretoast` (Windows)
    SnoreToast,
}

impl ToastTool {
    /// Toast tool conventionally used on the current platform
    pub fn for_platform() -> Self {
        if cfg!(target_os = "macos") {
            ToastTool::TerminalNotifier
        } else if cfg!(windows) {
            ToastTool::SnoreToast
        } else {
            ToastTool::NotifySend
        }
    }

    /// Executable name looked up on PATH
    pub fn binary_name(&self) -> &'static str {
        match self {
            ToastTool::NotifySend => "notify-send",
            ToastTool::TerminalNotifier => "terminal-notifier",
            ToastTool::SnoreToast => "snoretoast",
        }
    }

    /// Arguments showing one toast
    pub(crate) fn args(&self, app: &str, title: &str, body: &str, duration: Duration) -> Vec<String> {
        let owned = |parts: &[&str]| parts.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        match self {
            ToastTool::NotifySend => {
                let mut args = owned(&["-a", app, "-t"]);
                args.push(crate::types::duration_ms(duration).to_string());
                args.extend(owned(&["--", title, body]));
                args
            }
            ToastTool::TerminalNotifier => {
                owned(&["-title", title, "-message", body, "-group", app])
            }
            ToastTool::SnoreToast => owned(&["-t", title, "-m", body, "-appID", app]),
        }
    }
}

/// Native toast notifications through a platform binary found on PATH
pub struct NativeToastNotifier {
    tool: ToastTool,
    binary: Option<PathBuf>,
    app_name: String,
}

impl NativeToastNotifier {
    /// Notifier for an explicit tool and binary (None = unavailable)
    pub fn new(tool: ToastTool, binary: Option<PathBuf>, app_name: impl Into<String>) -> Self {
        Self {
            tool,
            binary,
            app_name: app_name.into(),
        }
    }

    /// Look up the platform's toast binary on PATH
    pub fn detect(app_name: impl Into<String>) -> Self {
        let tool = ToastTool::for_platform();
        Self::new(tool, which::which(tool.binary_name()).ok(), app_name)
    }
}

#[async_trait]
impl NotificationChannel for NativeToastNotifier {
    fn name(&self) -> &str {
        self.tool.binary_name()
    }

    async fn is_available(&self) -> bool {
        self.binary.is_some()
    }

    async fn show(&self, title: &str, body: &str, duration: Duration) -> Result<()> {
        let Some(binary) = &self.binary else {
            return Err(Error::NotificationDelivery {
                channel: self.name().to_string(),
                reason: "binary not found".to_string(),
            });
        };

        let mut command = Command::new(binary);
        command
            .args(self.tool.args(&self.app_name, title, body, duration))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = tokio::time::timeout(TOAST_TIMEOUT, command.output())
            .await
            .map_err(|_| {
                Error::ExternalTool(format!(
                    "{} timed out after {:?}",
                    binary.display(),
                    TOAST_TIMEOUT
                ))
            })?
            .map_err(|e| {
                Error::ExternalTool(format!("failed to execute {}: {}", binary.display(), e))
            })?;

        if !output.status.success() {
            return Err(Error::NotificationDelivery {
                channel: self.name().to_string(),
                reason: format!(
                    "exited with {}: {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }

        Ok(())
    }
}

/// Last-resort notifications through the OS shell
///
/// Always available. Delivery counts as successful once the shell process
/// has been spawned.
pub struct ShellNotifier {
    app_name: String,
}

impl ShellNotifier {
    /// Shell notifier labelling alerts with `app_name`
    pub fn new(app_name: impl Into<String>) -> Self {
        Self {
            app_name: app_name.into(),
        }
    }

    /// Program and arguments for the current platform
    pub(crate) fn command(&self, title: &str, body: &str) -> (String, Vec<String>) {
        if cfg!(windows) {
            let script = format!(
                "Add-Type -AssemblyName System.Windows.Forms; \
                 $n = New-Object System.Windows.Forms.NotifyIcon; \
                 $n.Icon = [System.Drawing.SystemIcons]::Information; \
                 $n.Visible = $true; \
                 $n.ShowBalloonTip(5000, '{}', '{}', 'Info'); \
                 Start-Sleep -Seconds 6; $n.Dispose()",
                powershell_quote(title),
                powershell_quote(body)
            );
            (
                "powershell".to_string(),
                vec![
                    "-NoProfile".to_string(),
                    "-NonInteractive".to_string(),
                    "-Command".to_string(),
                    script,
                ],
            )
        } else if cfg!(target_os = "macos") {
            let script = format!(
                "display notification \"{}\" with title \"{}\"",
                applescript_quote(body),
                applescript_quote(title)
            );
            ("osascript".to_string(), vec!["-e".to_string(), script])
        } else {
            // Positional parameters keep the text out of the script itself
            (
                "sh".to_string(),
                vec![
                    "-c".to_string(),
                    r#"notify-send -- "$1" "$2" 2>/dev/null || logger -t "$0" -- "$1: $2""#
                        .to_string(),
                    self.app_name.clone(),
                    title.to_string(),
                    body.to_string(),
                ],
            )
        }
    }
}

fn powershell_quote(s: &str) -> String {
    s.replace('\'', "''")
}

fn applescript_quote(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

#[async_trait]
impl NotificationChannel for ShellNotifier {
    fn name(&self) -> &str {
        "shell"
    }

    async fn is_available(&self) -> bool {
        true
    }

    async fn show(&self, title: &str, body: &str, _duration: Duration) -> Result<()> {
        let (program, args) = self.command(title, body);
        Command::new(&program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| Error::ExternalTool(format!("failed to execute {}: {}", program, e)))?;
        Ok(())
    }
}
