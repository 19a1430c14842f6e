//! Tests against the real external tools
//!
//! These tests need `ffmpeg`/`ffprobe` (and, for the fetch test, `yt-dlp` plus
//! network access) on PATH. They are feature-gated behind `live-tests`.
//!
//! # Running the tests
//!
//! ```bash
//! cargo test --features live-tests --test live_tools -- --ignored
//! ```

#![cfg(feature = "live-tests")]

mod common;

use audio_hub::conversion::FfmpegTranscoder;
use audio_hub::fetch::YtDlpFetcher;
use audio_hub::{AudioFormat, NewJob, Phase, Transcoder};
use common::{create_downloader, wait_for_terminal};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Generate a short sine tone with ffmpeg's lavfi source
async fn sine_wav(dir: &std::path::Path) -> std::path::PathBuf {
    let path = dir.join("tone.wav");
    let status = tokio::process::Command::new("ffmpeg")
        .args(["-hide_banner", "-loglevel", "error", "-f", "lavfi", "-i"])
        .arg("sine=frequency=440:duration=2")
        .arg(&path)
        .status()
        .await
        .expect("Failed to run ffmpeg");
    assert!(status.success());
    path
}

#[tokio::test]
#[ignore]
async fn test_ffmpeg_transcodes_wav_to_each_format() {
    if which::which("ffmpeg").is_err() {
        eprintln!("ffmpeg not on PATH, skipping");
        return;
    }

    let dir = tempfile::tempdir().unwrap();
    let input = sine_wav(dir.path()).await;
    let transcoder = FfmpegTranscoder::from_path();

    for format in [AudioFormat::Mp3, AudioFormat::Flac, AudioFormat::Ogg, AudioFormat::M4a] {
        let output = dir.path().join(format!("tone-out.{}", format.extension()));
        let last = std::sync::Mutex::new(0.0f32);
        transcoder
            .transcode(
                &input,
                &output,
                format,
                128,
                &|p: f32| *last.lock().unwrap() = p,
                CancellationToken::new(),
            )
            .await
            .unwrap_or_else(|e| panic!("{format} failed: {e}"));

        assert!(std::fs::metadata(&output).unwrap().len() > 0);
        assert_eq!(*last.lock().unwrap(), 100.0);
    }
}

#[tokio::test]
#[ignore]
async fn test_live_fetch_and_convert() {
    let Ok(url) = std::env::var("AUDIO_HUB_TEST_URL") else {
        eprintln!("AUDIO_HUB_TEST_URL not set, skipping");
        return;
    };
    let Some(fetcher) = YtDlpFetcher::from_path() else {
        eprintln!("yt-dlp not on PATH, skipping");
        return;
    };

    let (downloader, _temp_dir) = create_downloader(
        Arc::new(fetcher),
        Arc::new(FfmpegTranscoder::from_path()),
        Vec::new(),
        |_| {},
    )
    .await;

    let id = downloader
        .submit(NewJob::new(url).with_format(AudioFormat::Mp3))
        .await
        .unwrap();

    let state = wait_for_terminal(&downloader, id, Duration::from_secs(300))
        .await
        .expect("live job timed out");
    assert_eq!(state.phase, Phase::Succeeded, "{:?}", state.error_detail);
    assert!(state.result_path.unwrap().exists());

    downloader.shutdown().await.unwrap();
}
