//! yt-dlp backed fetcher

use super::parser::{FILE_MARKER, OutputLine, classify_failure, parse_line};
use super::{FetchError, FetchProgressFn, FetchRequest, FetchedMedia, MediaFetcher};
use crate::config::ToolsConfig;
use crate::utils::cleanup_partial_files;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

/// Fetcher that runs the external `yt-dlp` binary
///
/// Only the best audio stream is requested and written as
/// `<title> [<id>].<ext>` (filesystem-safe), so different videos sharing a
/// title never collide. Without a binary every fetch fails permanently.
///
/// # Examples
///
/// ```no_run
/// use audio_hub::fetch::YtDlpFetcher;
/// use std::path::PathBuf;
///
/// // Create with explicit path
/// let fetcher = YtDlpFetcher::new(Some(PathBuf::from("/usr/local/bin/yt-dlp")));
///
/// // Or auto-discover from PATH
/// let fetcher = YtDlpFetcher::from_path();
/// ```
pub struct YtDlpFetcher {
    binary_path: Option<PathBuf>,
}

impl YtDlpFetcher {
    /// Create a fetcher for a binary path (None = yt-dlp unavailable)
    pub fn new(binary_path: Option<PathBuf>) -> Self {
        Self { binary_path }
    }

    /// Attempt to find yt-dlp in PATH
    pub fn from_path() -> Option<Self> {
        which::which("yt-dlp").ok().map(|p| Self::new(Some(p)))
    }

    /// Fetcher using the configured path, falling back to a PATH search
    pub fn from_config(tools: &ToolsConfig) -> Self {
        Self::new(tools.resolve(tools.yt_dlp_path.as_ref(), "yt-dlp"))
    }

    /// Binary this fetcher runs, if any
    pub fn binary_path(&self) -> Option<&Path> {
        self.binary_path.as_deref()
    }

    /// Command-line arguments for a request
    pub(crate) fn build_args(request: &FetchRequest) -> Vec<String> {
        let template = request.output_directory.join(OUTPUT_TEMPLATE);
        let print = format!("after_move:{FILE_MARKER}%(filepath)s");

        let mut args: Vec<String> = [
            "-f",
            "bestaudio/best",
            "--newline",
            "--progress",
            "--no-overwrites",
            "--restrict-filenames",
            "--no-color",
            "--no-quiet",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        args.push("--print".to_string());
        args.push(print);
        args.push(if request.no_playlist {
            "--no-playlist".to_string()
        } else {
            "--yes-playlist".to_string()
        });
        args.push("-o".to_string());
        args.push(template.to_string_lossy().into_owned());
        args.push("--".to_string());
        args.push(request.url.clone());
        args
    }
}

/// Output file name template, relative to the request's output directory
const OUTPUT_TEMPLATE: &str = "%(title)s [%(id)s].%(ext)s";

/// Which pipe a line arrived on
#[derive(Clone, Copy, PartialEq)]
enum Stream {
    Stdout,
    Stderr,
}

/// What the run learned from the tool's output
#[derive(Default)]
struct RunState {
    destination: Option<PathBuf>,
    printed: Option<PathBuf>,
    errors: Vec<String>,
}

impl RunState {
    fn observe(&mut self, line: &str, stream: Stream, progress: FetchProgressFn<'_>) {
        match parse_line(line) {
            OutputLine::Progress(p) => progress(p),
            OutputLine::Destination(path) => {
                tracing::debug!(destination = %path.display(), "yt-dlp destination");
                self.destination = Some(path);
            }
            OutputLine::AlreadyDownloaded(path) => {
                tracing::debug!(path = %path.display(), "yt-dlp reports file already present");
                self.destination = Some(path);
            }
            OutputLine::Error(msg) => self.errors.push(msg),
            OutputLine::Printed(path) if stream == Stream::Stdout => {
                self.printed = Some(PathBuf::from(path))
            }
            OutputLine::Printed(_) => {}
            OutputLine::Other => {}
        }
    }

    async fn cleanup(&self) {
        if let Some(dest) = &self.destination {
            let removed = cleanup_partial_files(dest).await;
            if removed > 0 {
                tracing::info!(removed, target = %dest.display(), "Cleaned up partial download");
            }
        }
    }
}

/// Human title from a `<title> [<id>]` file stem
fn title_from_stem(stem: &str) -> String {
    let title = match stem.rsplit_once(" [") {
        Some((title, id)) if id.ends_with(']') && !title.is_empty() => title,
        _ => stem,
    };
    title.replace('_', " ")
}

#[async_trait]
impl MediaFetcher for YtDlpFetcher {
    async fn fetch(
        &self,
        request: &FetchRequest,
        progress: FetchProgressFn<'_>,
        cancel: CancellationToken,
    ) -> Result<FetchedMedia, FetchError> {
        let Some(binary) = &self.binary_path else {
            return Err(FetchError::Permanent(
                "yt-dlp not found: install it or set tools.yt_dlp_path".to_string(),
            ));
        };

        tokio::fs::create_dir_all(&request.output_directory)
            .await
            .map_err(|e| {
                FetchError::Permanent(format!(
                    "cannot create output directory {}: {}",
                    request.output_directory.display(),
                    e
                ))
            })?;

        let mut child = Command::new(binary)
            .args(Self::build_args(request))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| FetchError::Permanent(format!("Failed to execute yt-dlp: {}", e)))?;

        let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
            return Err(FetchError::Permanent(
                "Failed to capture yt-dlp output".to_string(),
            ));
        };

        let mut stdout = BufReader::new(stdout).lines();
        let mut stderr = BufReader::new(stderr).lines();
        let mut state = RunState::default();
        let mut stdout_open = true;
        let mut stderr_open = true;

        while stdout_open || stderr_open {
            tokio::select! {
                _ = cancel.cancelled() => {
                    if let Err(e) = child.kill().await {
                        tracing::warn!(error = %e, "Failed to kill yt-dlp");
                    }
                    state.cleanup().await;
                    return Err(FetchError::Cancelled);
                }
                line = stdout.next_line(), if stdout_open => match line {
                    Ok(Some(line)) => state.observe(&line, Stream::Stdout, progress),
                    Ok(None) | Err(_) => stdout_open = false,
                },
                line = stderr.next_line(), if stderr_open => match line {
                    Ok(Some(line)) => state.observe(&line, Stream::Stderr, progress),
                    Ok(None) | Err(_) => stderr_open = false,
                },
            }
        }

        let status = tokio::select! {
            _ = cancel.cancelled() => {
                let _ = child.kill().await;
                state.cleanup().await;
                return Err(FetchError::Cancelled);
            }
            status = child.wait() => status
                .map_err(|e| FetchError::Transient(format!("Failed to wait for yt-dlp: {}", e)))?,
        };

        if !status.success() {
            let error = classify_failure(&state.errors, status.code());
            tracing::warn!(
                url = %request.url,
                exit_code = ?status.code(),
                error = %error,
                "yt-dlp failed"
            );
            return Err(error);
        }

        let path = state
            .printed
            .or(state.destination)
            .ok_or_else(|| FetchError::Permanent("yt-dlp reported no output file".to_string()))?;

        let metadata = tokio::fs::metadata(&path).await.map_err(|e| {
            FetchError::Permanent(format!(
                "fetched file {} is missing: {}",
                path.display(),
                e
            ))
        })?;

        let title = path.file_stem().and_then(|s| s.to_str()).map(title_from_stem);

        Ok(FetchedMedia {
            path,
            title,
            size_bytes: metadata.len(),
        })
    }

    fn name(&self) -> &'static str {
        "yt-dlp"
    }
}
