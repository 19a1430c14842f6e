use super::*;
use crate::downloader::test_helpers::{FakeTranscoder, collect_events};
use std::sync::Mutex;
use std::time::Duration;
use tempfile::TempDir;

fn pipeline(
    transcoder: FakeTranscoder,
    keep_source: bool,
) -> (
    ConversionPipeline,
    Arc<FakeTranscoder>,
    broadcast::Receiver<Event>,
) {
    let (event_tx, rx) = broadcast::channel(100);
    let transcoder = Arc::new(transcoder);
    let pipeline = ConversionPipeline::new(
        transcoder.clone(),
        &ConversionConfig { keep_source },
        event_tx,
    );
    (pipeline, transcoder, rx)
}

fn source(dir: &TempDir, name: &str) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, b"fetched media").unwrap();
    path
}

fn no_progress(_: f32) {}

#[test]
fn test_needs_conversion_compares_extension() {
    assert!(needs_conversion(Path::new("/m/track.webm"), AudioFormat::Mp3));
    assert!(needs_conversion(Path::new("/m/track"), AudioFormat::Mp3));
    assert!(!needs_conversion(Path::new("/m/track.mp3"), AudioFormat::Mp3));
    assert!(!needs_conversion(Path::new("/m/track.FLAC"), AudioFormat::Flac));
    // Same codec family, different container
    assert!(needs_conversion(Path::new("/m/track.aac"), AudioFormat::M4a));
}

#[tokio::test]
async fn test_output_path_avoids_existing_files() {
    let dir = TempDir::new().unwrap();
    let input = source(&dir, "song.webm");

    assert_eq!(
        reserve_output_path(&input, AudioFormat::Mp3).await.unwrap(),
        dir.path().join("song.mp3")
    );

    // The first reservation holds its name
    assert_eq!(
        reserve_output_path(&input, AudioFormat::Mp3).await.unwrap(),
        dir.path().join("song (1).mp3")
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_conversions_of_same_stem_get_distinct_outputs() {
    let dir = TempDir::new().unwrap();
    let first = source(&dir, "Intro.webm");
    let second = source(&dir, "Intro.m4a");
    let (pipeline, _, _rx) =
        pipeline(FakeTranscoder::working().with_delay(Duration::from_millis(50)), true);

    let (a, b) = tokio::join!(
        pipeline.convert(&first, AudioFormat::Mp3, 192, &no_progress, CancellationToken::new()),
        pipeline.convert(&second, AudioFormat::Mp3, 192, &no_progress, CancellationToken::new()),
    );
    let (a, b) = (a.unwrap(), b.unwrap());

    assert_ne!(a, b);
    let mut outputs = vec![a, b];
    outputs.sort();
    assert_eq!(
        outputs,
        vec![dir.path().join("Intro (1).mp3"), dir.path().join("Intro.mp3")]
    );
}

#[tokio::test]
async fn test_convert_writes_output_and_keeps_source() {
    let dir = TempDir::new().unwrap();
    let input = source(&dir, "song.webm");
    let (pipeline, transcoder, _rx) = pipeline(FakeTranscoder::working(), true);

    let seen = Mutex::new(Vec::new());
    let on_progress = |p: f32| seen.lock().unwrap().push(p);

    let output = pipeline
        .convert(&input, AudioFormat::Flac, 192, &on_progress, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(output, dir.path().join("song.flac"));
    assert!(output.exists());
    assert!(input.exists());
    assert_eq!(transcoder.calls(), vec![(input.clone(), AudioFormat::Flac)]);
    assert_eq!(seen.lock().unwrap().last().copied(), Some(100.0));
}

#[tokio::test]
async fn test_convert_removes_source_when_configured() {
    let dir = TempDir::new().unwrap();
    let input = source(&dir, "song.webm");
    let (pipeline, _, _rx) = pipeline(FakeTranscoder::working(), false);

    let output = pipeline
        .convert(&input, AudioFormat::Mp3, 192, &no_progress, CancellationToken::new())
        .await
        .unwrap();

    assert!(output.exists());
    assert!(!input.exists());
}

#[tokio::test]
async fn test_failed_conversion_keeps_source() {
    let dir = TempDir::new().unwrap();
    let input = source(&dir, "song.webm");
    let (pipeline, _, _rx) = pipeline(FakeTranscoder::failing(), false);

    let err = pipeline
        .convert(&input, AudioFormat::Mp3, 192, &no_progress, CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Conversion { ref reason } if reason == "unsupported codec"));
    assert!(input.exists());
    assert!(!dir.path().join("song.mp3").exists());
}

#[tokio::test]
async fn test_empty_output_is_a_conversion_error() {
    let dir = TempDir::new().unwrap();
    let input = source(&dir, "song.webm");
    let (pipeline, _, _rx) = pipeline(FakeTranscoder::empty_output(), true);

    let err = pipeline
        .convert(&input, AudioFormat::Ogg, 192, &no_progress, CancellationToken::new())
        .await
        .unwrap_err();

    match err {
        Error::Conversion { reason } => assert!(reason.contains("produced no output")),
        other => panic!("unexpected error: {other}"),
    }
    assert!(!dir.path().join("song.ogg").exists());
}

#[tokio::test]
async fn test_missing_input_is_rejected_before_transcoding() {
    let dir = TempDir::new().unwrap();
    let (pipeline, transcoder, _rx) = pipeline(FakeTranscoder::working(), true);

    let err = pipeline
        .convert(
            &dir.path().join("absent.webm"),
            AudioFormat::Mp3,
            192,
            &no_progress,
            CancellationToken::new(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Conversion { .. }));
    assert!(transcoder.calls().is_empty());
}

#[tokio::test]
async fn test_batch_continues_after_failing_item() {
    let dir = TempDir::new().unwrap();
    let items = vec![
        BatchItem::new(source(&dir, "one.webm"), AudioFormat::Mp3),
        BatchItem::new(source(&dir, "broken.webm"), AudioFormat::Mp3),
        BatchItem::new(source(&dir, "three.wav"), AudioFormat::Flac),
    ];
    let (pipeline, transcoder, mut rx) = pipeline(FakeTranscoder::failing_on("broken"), true);

    let report = pipeline
        .convert_batch(items, 192, CancellationToken::new())
        .await;

    assert_eq!(report.items.len(), 3);
    assert_eq!(report.succeeded(), 2);
    assert_eq!(report.failed(), 1);
    assert_eq!(report.items[0].output, Some(dir.path().join("one.mp3")));
    assert_eq!(report.items[1].error.as_deref(), Some("unsupported codec"));
    assert_eq!(report.items[2].output, Some(dir.path().join("three.flac")));
    assert_eq!(transcoder.calls().len(), 3);

    let finished: Vec<(usize, bool)> = collect_events(&mut rx)
        .into_iter()
        .filter_map(|event| match event {
            Event::BatchItemFinished {
                batch,
                index,
                output,
                ..
            } if batch == report.batch => Some((index, output.is_some())),
            _ => None,
        })
        .collect();
    assert_eq!(finished, vec![(0, true), (1, false), (2, true)]);
}

#[tokio::test]
async fn test_batch_reports_progress_per_item() {
    let dir = TempDir::new().unwrap();
    let items = vec![BatchItem::new(source(&dir, "one.webm"), AudioFormat::Mp3)];
    let (pipeline, _, mut rx) = pipeline(FakeTranscoder::working(), true);

    pipeline
        .convert_batch(items, 128, CancellationToken::new())
        .await;

    let percents: Vec<f32> = collect_events(&mut rx)
        .into_iter()
        .filter_map(|event| match event {
            Event::BatchItemProgress { index: 0, percent, .. } => Some(percent),
            _ => None,
        })
        .collect();
    assert_eq!(percents.first().copied(), Some(25.0));
    assert_eq!(percents.last().copied(), Some(100.0));
}

#[tokio::test]
async fn test_cancelled_batch_skips_remaining_items() {
    let dir = TempDir::new().unwrap();
    let items = vec![
        BatchItem::new(source(&dir, "one.webm"), AudioFormat::Mp3),
        BatchItem::new(source(&dir, "two.webm"), AudioFormat::Mp3),
        BatchItem::new(source(&dir, "three.webm"), AudioFormat::Mp3),
    ];
    let (pipeline, transcoder, _rx) = pipeline(
        FakeTranscoder::working().with_delay(Duration::from_secs(5)),
        true,
    );

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let report = tokio::time::timeout(
        Duration::from_secs(2),
        pipeline.convert_batch(items, 192, cancel),
    )
    .await
    .expect("batch did not stop after cancellation");

    assert_eq!(report.succeeded(), 0);
    assert_eq!(report.items[0].error.as_deref(), Some("cancelled"));
    assert_eq!(report.items[1].error.as_deref(), Some("cancelled"));
    assert_eq!(report.items[2].error.as_deref(), Some("cancelled"));
    // Only the first item ever reached the transcoder
    assert_eq!(transcoder.calls().len(), 1);
}

#[tokio::test]
async fn test_batch_ids_increase() {
    let (pipeline, _, _rx) = pipeline(FakeTranscoder::working(), true);
    let first = pipeline
        .convert_batch(Vec::new(), 192, CancellationToken::new())
        .await;
    let second = pipeline
        .convert_batch(Vec::new(), 192, CancellationToken::new())
        .await;
    assert!(second.batch > first.batch);
    assert!(first.items.is_empty());
}
