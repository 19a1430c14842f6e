//! ffmpeg-based transcoder using external ffmpeg/ffprobe binaries

use super::{ConvertProgressFn, Transcoder};
use crate::config::ToolsConfig;
use crate::error::{Error, Result};
use crate::types::AudioFormat;
use async_trait::async_trait;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

/// Output sample rate in Hz
const SAMPLE_RATE: &str = "44100";

/// Output channel count
const CHANNELS: &str = "2";

/// Number of trailing stderr lines kept for error messages
const STDERR_TAIL: usize = 5;

/// Transcoder that runs the external `ffmpeg` binary
///
/// The input duration is probed with `ffprobe` so that `-progress` output can
/// be turned into a percentage. Without `ffprobe` only 0% and 100% are
/// reported.
///
/// # Examples
///
/// ```no_run
/// use audio_hub::conversion::FfmpegTranscoder;
/// use std::path::PathBuf;
///
/// // Create with explicit paths
/// let transcoder = FfmpegTranscoder::new(
///     Some(PathBuf::from("/usr/bin/ffmpeg")),
///     Some(PathBuf::from("/usr/bin/ffprobe")),
/// );
///
/// // Or auto-discover from PATH
/// let transcoder = FfmpegTranscoder::from_path();
/// ```
pub struct FfmpegTranscoder {
    ffmpeg_path: Option<PathBuf>,
    ffprobe_path: Option<PathBuf>,
}

impl FfmpegTranscoder {
    /// Create a transcoder with explicit binary paths (None = unavailable)
    pub fn new(ffmpeg_path: Option<PathBuf>, ffprobe_path: Option<PathBuf>) -> Self {
        Self {
            ffmpeg_path,
            ffprobe_path,
        }
    }

    /// Attempt to find ffmpeg and ffprobe in PATH
    pub fn from_path() -> Self {
        Self::new(which::which("ffmpeg").ok(), which::which("ffprobe").ok())
    }

    /// Transcoder using the configured paths, falling back to a PATH search
    pub fn from_config(tools: &ToolsConfig) -> Self {
        Self::new(
            tools.resolve(tools.ffmpeg_path.as_ref(), "ffmpeg"),
            tools.resolve(tools.ffprobe_path.as_ref(), "ffprobe"),
        )
    }

    /// Command-line arguments for one conversion
    pub(crate) fn build_args(
        input: &Path,
        output: &Path,
        format: AudioFormat,
        bitrate_kbps: u32,
    ) -> Vec<OsString> {
        let mut args: Vec<OsString> = [
            "-hide_banner",
            "-nostats",
            "-nostdin",
            "-loglevel",
            "error",
            // The output path is a placeholder reserved for this conversion
            "-y",
            "-i",
        ]
        .iter()
        .map(OsString::from)
        .collect();

        args.push(input.as_os_str().to_owned());
        for arg in ["-vn", "-ar", SAMPLE_RATE, "-ac", CHANNELS, "-c:a", format.codec()] {
            args.push(arg.into());
        }
        if !format.is_lossless() {
            args.push("-b:a".into());
            args.push(format!("{bitrate_kbps}k").into());
        }
        args.push("-progress".into());
        args.push("pipe:1".into());
        args.push(output.as_os_str().to_owned());
        args
    }

    /// Duration of the input according to ffprobe
    async fn probe_duration(&self, input: &Path) -> Option<Duration> {
        let ffprobe = self.ffprobe_path.as_ref()?;

        let output = Command::new(ffprobe)
            .args([
                "-v",
                "error",
                "-show_entries",
                "format=duration",
                "-of",
                "default=noprint_wrappers=1:nokey=1",
            ])
            .arg(input)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| tracing::debug!(error = %e, "Failed to execute ffprobe"))
            .ok()?;

        if !output.status.success() {
            return None;
        }

        parse_duration(&String::from_utf8_lossy(&output.stdout))
    }
}

/// One parsed line of `-progress` output
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum ProgressLine {
    /// Output timestamp reached so far
    Time(Duration),
    /// `progress=end`
    End,
}

/// Parse ffprobe's duration output (seconds as a decimal)
pub(crate) fn parse_duration(stdout: &str) -> Option<Duration> {
    let secs: f64 = stdout.lines().next()?.trim().parse().ok()?;
    if secs.is_finite() && secs > 0.0 {
        Some(Duration::from_secs_f64(secs))
    } else {
        None
    }
}

/// Parse a `key=value` line of ffmpeg `-progress` output
///
/// `out_time_ms` carries microseconds despite its name, same as `out_time_us`.
pub(crate) fn parse_progress_line(line: &str) -> Option<ProgressLine> {
    let (key, value) = line.trim().split_once('=')?;
    match key {
        "out_time_us" | "out_time_ms" => value
            .trim()
            .parse::<u64>()
            .ok()
            .map(|us| ProgressLine::Time(Duration::from_micros(us))),
        "progress" if value.trim() == "end" => Some(ProgressLine::End),
        _ => None,
    }
}

/// Percent of `total` covered by `done`, kept below 100 until ffmpeg exits
pub(crate) fn percent_of(done: Duration, total: Duration) -> f32 {
    if total.is_zero() {
        return 0.0;
    }
    let ratio = done.as_secs_f64() / total.as_secs_f64();
    (ratio * 100.0).clamp(0.0, 99.0) as f32
}

async fn remove_if_exists(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => tracing::debug!(path = %path.display(), "Removed incomplete output"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Failed to remove incomplete output")
        }
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn transcode(
        &self,
        input: &Path,
        output: &Path,
        format: AudioFormat,
        bitrate_kbps: u32,
        progress: ConvertProgressFn<'_>,
        cancel: CancellationToken,
    ) -> Result<()> {
        let Some(ffmpeg) = &self.ffmpeg_path else {
            return Err(Error::Conversion {
                reason: "ffmpeg not found: install it or set tools.ffmpeg_path".to_string(),
            });
        };

        let duration = self.probe_duration(input).await;
        tracing::debug!(input = %input.display(), ?duration, "Probed input duration");
        progress(0.0);

        let mut child = Command::new(ffmpeg)
            .args(Self::build_args(input, output, format, bitrate_kbps))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::ExternalTool(format!("failed to execute ffmpeg: {}", e)))?;

        let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
            return Err(Error::Conversion {
                reason: "Failed to capture ffmpeg output".to_string(),
            });
        };

        let mut stdout = BufReader::new(stdout).lines();
        let mut stderr = BufReader::new(stderr).lines();
        let mut stderr_tail: Vec<String> = Vec::new();
        let mut last_percent = 0.0_f32;
        let mut stdout_open = true;
        let mut stderr_open = true;

        while stdout_open || stderr_open {
            tokio::select! {
                _ = cancel.cancelled() => {
                    if let Err(e) = child.kill().await {
                        tracing::warn!(error = %e, "Failed to kill ffmpeg");
                    }
                    remove_if_exists(output).await;
                    return Err(Error::Cancelled);
                }
                line = stdout.next_line(), if stdout_open => match line {
                    Ok(Some(line)) => {
                        if let (Some(ProgressLine::Time(done)), Some(total)) =
                            (parse_progress_line(&line), duration)
                        {
                            let percent = percent_of(done, total);
                            if percent > last_percent {
                                last_percent = percent;
                                progress(percent);
                            }
                        }
                    }
                    Ok(None) | Err(_) => stdout_open = false,
                },
                line = stderr.next_line(), if stderr_open => match line {
                    Ok(Some(line)) if !line.trim().is_empty() => {
                        if stderr_tail.len() == STDERR_TAIL {
                            stderr_tail.remove(0);
                        }
                        stderr_tail.push(line.trim().to_string());
                    }
                    Ok(Some(_)) => {}
                    Ok(None) | Err(_) => stderr_open = false,
                },
            }
        }

        let status = child.wait().await.map_err(|e| Error::Conversion {
            reason: format!("Failed to wait for ffmpeg: {}", e),
        })?;

        if !status.success() {
            remove_if_exists(output).await;
            let reason = stderr_tail.pop().unwrap_or_else(|| match status.code() {
                Some(code) => format!("ffmpeg exited with status {code}"),
                None => "ffmpeg terminated by signal".to_string(),
            });
            return Err(Error::Conversion { reason });
        }

        progress(100.0);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "ffmpeg"
    }
}
