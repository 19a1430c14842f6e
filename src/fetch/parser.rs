//! Parsing of yt-dlp console output

use super::{FetchError, FetchProgress};
use regex::Regex;
use std::path::PathBuf;
use std::sync::LazyLock;

// Patterns are literals exercised by the tests below
#[allow(clippy::expect_used)]
fn literal(pattern: &str) -> Regex {
    Regex::new(pattern).expect("literal regex must compile")
}

// [download]  12.3% of ~ 50.00MiB at  1.20MiB/s ETA 00:35 (frag 3/40)
static PROGRESS_RE: LazyLock<Regex> = LazyLock::new(|| {
    literal(r"^\[download\]\s+(\d+(?:\.\d+)?)%(?:\s+of\s+~?\s*(\d+(?:\.\d+)?\s*[KMGT]?i?B))?")
});
static DESTINATION_RE: LazyLock<Regex> =
    LazyLock::new(|| literal(r"^\[download\]\s+Destination:\s+(.+?)\s*$"));
static ALREADY_RE: LazyLock<Regex> =
    LazyLock::new(|| literal(r"^\[download\]\s+(.+?) has already been downloaded"));
static SIZE_RE: LazyLock<Regex> =
    LazyLock::new(|| literal(r"^(\d+(?:\.\d+)?)\s*([KMGT]?)(i?)B$"));
static HTTP_STATUS_RE: LazyLock<Regex> = LazyLock::new(|| literal(r"HTTP Error (\d{3})"));

/// Prefix of the line yt-dlp prints once the final file is in place
pub const FILE_MARKER: &str = "AUDIOHUB_FILE:";

/// One classified line of yt-dlp output
#[derive(Debug, Clone, PartialEq)]
pub enum OutputLine {
    /// `[download]  NN.N% of SIZE ...`
    Progress(FetchProgress),
    /// `[download] Destination: PATH`
    Destination(PathBuf),
    /// `[download] PATH has already been downloaded`
    AlreadyDownloaded(PathBuf),
    /// `ERROR: ...` (message without the prefix)
    Error(String),
    /// Final file path announced by `--print after_move:` ([`FILE_MARKER`] prefix)
    Printed(String),
    /// Anything else (`[youtube] ...`, `WARNING: ...`, blank lines)
    Other,
}

/// Classify a single line of yt-dlp output
pub fn parse_line(line: &str) -> OutputLine {
    let line = line.trim_end_matches(['\r', '\n']);
    let trimmed = line.trim();

    if trimmed.is_empty() {
        return OutputLine::Other;
    }

    if let Some(path) = trimmed.strip_prefix(FILE_MARKER) {
        return OutputLine::Printed(path.trim().to_string());
    }

    if let Some(msg) = trimmed.strip_prefix("ERROR:") {
        return OutputLine::Error(msg.trim().to_string());
    }

    if let Some(caps) = DESTINATION_RE.captures(trimmed) {
        return OutputLine::Destination(PathBuf::from(&caps[1]));
    }

    if let Some(caps) = ALREADY_RE.captures(trimmed) {
        return OutputLine::AlreadyDownloaded(PathBuf::from(&caps[1]));
    }

    if let Some(caps) = PROGRESS_RE.captures(trimmed) {
        let Ok(percent) = caps[1].parse::<f32>() else {
            return OutputLine::Other;
        };
        let percent = percent.clamp(0.0, 100.0);
        let total_bytes = caps.get(2).and_then(|m| parse_size(m.as_str()));
        let downloaded_bytes =
            total_bytes.map(|total| (total as f64 * f64::from(percent) / 100.0).round() as u64);
        return OutputLine::Progress(FetchProgress {
            percent,
            downloaded_bytes,
            total_bytes,
        });
    }

    OutputLine::Other
}

/// Parse a yt-dlp size string like `50.00MiB`, `3.2MB` or `812KiB`
pub fn parse_size(s: &str) -> Option<u64> {
    let caps = SIZE_RE.captures(s.trim())?;
    let value: f64 = caps[1].parse().ok()?;
    let binary = !caps[3].is_empty();
    let base: f64 = if binary { 1024.0 } else { 1000.0 };
    let exponent = match &caps[2] {
        "" => 0,
        "K" => 1,
        "M" => 2,
        "G" => 3,
        "T" => 4,
        _ => return None,
    };
    Some((value * base.powi(exponent)).round() as u64)
}

const PERMANENT_PATTERNS: [&str; 12] = [
    "unsupported url",
    "private video",
    "video unavailable",
    "is not available",
    "unavailable",
    "no video formats",
    "requested format is not available",
    "sign in to confirm",
    "members-only",
    "has been removed",
    "copyright",
    "drm protected",
];

const TRANSIENT_PATTERNS: [&str; 12] = [
    "timed out",
    "timeout",
    "connection reset",
    "connection refused",
    "connection aborted",
    "temporary failure",
    "network is unreachable",
    "remote end closed",
    "incompleteread",
    "too many requests",
    "unable to download webpage",
    "read error",
];

/// Classify a failed run from its `ERROR:` lines and exit code
///
/// HTTP 5xx and 429 are transient, other HTTP statuses permanent. Known
/// permanent patterns win over transient ones; anything unrecognised is
/// permanent.
pub fn classify_failure(errors: &[String], exit_code: Option<i32>) -> FetchError {
    let message = errors.last().cloned().unwrap_or_else(|| match exit_code {
        Some(code) => format!("yt-dlp exited with status {code}"),
        None => "yt-dlp terminated by signal".to_string(),
    });

    let joined = errors.join("\n");
    let lower = joined.to_lowercase();

    if let Some(caps) = HTTP_STATUS_RE.captures(&joined)
        && let Ok(status) = caps[1].parse::<u16>()
    {
        return if status == 429 || (500..600).contains(&status) {
            FetchError::Transient(message)
        } else {
            FetchError::Permanent(message)
        };
    }

    if PERMANENT_PATTERNS.iter().any(|p| lower.contains(p)) {
        return FetchError::Permanent(message);
    }

    if TRANSIENT_PATTERNS.iter().any(|p| lower.contains(p)) {
        return FetchError::Transient(message);
    }

    FetchError::Permanent(message)
}
