//! Utility functions for URL validation, file naming and partial-file cleanup

use crate::error::{Error, Result};
use std::path::{Path, PathBuf};

/// Maximum number of rename attempts when resolving file collisions
const MAX_RENAME_ATTEMPTS: u32 = 9999;

/// Suffixes yt-dlp leaves behind for an interrupted download
const PARTIAL_SUFFIXES: [&str; 2] = [".part", ".ytdl"];

/// Validate a user-supplied source URL
///
/// The URL must parse, use `http` or `https`, and name a host. Surrounding
/// whitespace is ignored.
///
/// # Examples
///
/// ```
/// use audio_hub::utils::validate_source_url;
///
/// assert!(validate_source_url("https://media.example/watch?v=abc").is_ok());
/// assert!(validate_source_url("").is_err());
/// assert!(validate_source_url("ftp://media.example/a.mp3").is_err());
/// ```
pub fn validate_source_url(raw: &str) -> Result<url::Url> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(Error::InvalidRequest("URL is empty".to_string()));
    }

    let parsed = url::Url::parse(trimmed)
        .map_err(|e| Error::InvalidRequest(format!("malformed URL '{trimmed}': {e}")))?;

    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(Error::InvalidRequest(format!(
            "unsupported URL scheme '{}'",
            parsed.scheme()
        )));
    }

    if parsed.host_str().is_none_or(str::is_empty) {
        return Err(Error::InvalidRequest(format!(
            "URL '{trimmed}' has no host"
        )));
    }

    Ok(parsed)
}

/// Claim a path that did not exist yet, adding ` (n)` before the extension
///
/// Each candidate is created with `create_new`, so two concurrent callers
/// asking for the same name always get different paths. The returned path
/// exists as an empty file owned by the caller.
///
/// # Examples
///
/// ```no_run
/// use audio_hub::utils::reserve_unique_path;
/// use std::path::Path;
///
/// # async fn example() -> audio_hub::Result<()> {
/// let path = Path::new("/tmp/song.mp3");
/// let reserved = reserve_unique_path(path).await?;
/// // /tmp/song.mp3 if it was free, otherwise /tmp/song (1).mp3, /tmp/song (2).mp3, ...
/// # Ok(())
/// # }
/// ```
pub async fn reserve_unique_path(path: &Path) -> Result<PathBuf> {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| Error::InvalidPath {
            path: path.to_path_buf(),
            reason: "Cannot extract file stem".to_string(),
        })?;

    let extension = path.extension().and_then(|e| e.to_str());

    let parent = path.parent().ok_or_else(|| Error::InvalidPath {
        path: path.to_path_buf(),
        reason: "Cannot extract parent directory".to_string(),
    })?;

    for i in 0..=MAX_RENAME_ATTEMPTS {
        let candidate = match (i, extension) {
            (0, _) => path.to_path_buf(),
            (_, Some(ext)) => parent.join(format!("{} ({}).{}", stem, i, ext)),
            (_, None) => parent.join(format!("{} ({})", stem, i)),
        };

        match tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&candidate)
            .await
        {
            Ok(_) => return Ok(candidate),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e.into()),
        }
    }

    Err(Error::InvalidPath {
        path: path.to_path_buf(),
        reason: format!("Could not find unique filename after {MAX_RENAME_ATTEMPTS} attempts"),
    })
}

/// Whether `file_name` is a leftover of an interrupted download of `target_name`
///
/// Matches `<target>.part`, `<target>.ytdl`, per-format intermediates such as
/// `<stem>.f251.webm.part` and fragment files like `<target>.part-Frag3`.
pub fn is_partial_of(file_name: &str, target_name: &str) -> bool {
    let target_stem = Path::new(target_name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(target_name);

    if !file_name.starts_with(&format!("{target_stem}.")) {
        return false;
    }

    PARTIAL_SUFFIXES
        .iter()
        .any(|suffix| file_name.ends_with(suffix) || file_name.contains(&format!("{suffix}-Frag")))
}

/// Remove leftovers of an interrupted download of `target`
///
/// Returns the number of files removed. Failures to remove individual files
/// are logged and skipped.
pub async fn cleanup_partial_files(target: &Path) -> usize {
    let Some(dir) = target.parent() else {
        return 0;
    };
    let Some(target_name) = target.file_name().and_then(|n| n.to_str()) else {
        return 0;
    };

    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) => {
            tracing::debug!(dir = %dir.display(), error = %e, "Cannot scan for partial files");
            return 0;
        }
    };

    let mut removed = 0;
    while let Ok(Some(entry)) = entries.next_entry().await {
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if !is_partial_of(name, target_name) {
            continue;
        }

        let path = entry.path();
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                tracing::debug!(path = %path.display(), "Removed partial file");
                removed += 1;
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Failed to remove partial file");
            }
        }
    }

    removed
}
